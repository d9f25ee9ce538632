// Test Support - in-memory store fakes and fixtures
//
// MemoryCatalog, MemoryCollection, MemoryUsers: store traits without a database
// MemoryCollection::fail_writes: a store that reports zero affected rows
// MockChatModel: canned replies, records prompts

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::Utc;

use crate::auth::User;
use crate::chat::{ChatError, ChatModel};
use crate::pokemon::{NewUserPokemon, Pokemon, PokemonId, UserId, UserPokemon};
use crate::query::{Listing, PokemonQuery};
use crate::store::{CatalogStore, CollectionStore, EmailTaken, UserStore};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Bulbasaur and Charmander lines, ids 1-6, tiers filled in.
pub fn starter_pokemon() -> Vec<Pokemon> {
    let mut pokemon = vec![
        Pokemon::new(1, "Bulbasaur").with_types(&["Grass", "Poison"]),
        Pokemon::new(2, "Ivysaur")
            .with_types(&["Grass", "Poison"])
            .with_prev(1, "Level 16"),
        Pokemon::new(3, "Venusaur")
            .with_types(&["Grass", "Poison"])
            .with_prev(2, "Level 32"),
        Pokemon::new(4, "Charmander").with_types(&["Fire"]),
        Pokemon::new(5, "Charmeleon").with_types(&["Fire"]).with_prev(4, "Level 16"),
        Pokemon::new(6, "Charizard")
            .with_types(&["Fire", "Flying"])
            .with_prev(5, "Level 36"),
    ];
    for (entry, tier) in pokemon.iter_mut().zip([1, 2, 3, 1, 2, 3]) {
        entry.evolution_tier = tier;
    }
    pokemon
}

pub fn starter_catalog() -> MemoryCatalog {
    MemoryCatalog::new(starter_pokemon())
}

fn page_of(mut matching: Vec<Pokemon>, query: &PokemonQuery) -> Listing<Pokemon> {
    matching.sort_by_key(|p| p.id);
    let total = matching.len() as u64;
    let items = matching
        .into_iter()
        .skip(query.offset() as usize)
        .take(query.limit as usize)
        .collect();
    Listing { items, total }
}

// ============================================================================
// CATALOG
// ============================================================================

#[derive(Default)]
pub struct MemoryCatalog {
    pokemon: BTreeMap<PokemonId, Pokemon>,
    /// Needed only for `list_caught_by`
    collection: Option<Arc<MemoryCollection>>,
}

impl MemoryCatalog {
    pub fn new(pokemon: Vec<Pokemon>) -> Self {
        Self {
            pokemon: pokemon.into_iter().map(|p| (p.id, p)).collect(),
            collection: None,
        }
    }

    pub fn with_collection(mut self, collection: Arc<MemoryCollection>) -> Self {
        self.collection = Some(collection);
        self
    }
}

#[async_trait]
impl CatalogStore for MemoryCatalog {
    async fn find_by_id(&self, id: PokemonId) -> Result<Option<Pokemon>> {
        Ok(self.pokemon.get(&id).cloned())
    }

    async fn list(&self, query: &PokemonQuery) -> Result<Listing<Pokemon>> {
        let matching = self.pokemon.values().filter(|p| query.matches(p)).cloned().collect();
        Ok(page_of(matching, query))
    }

    async fn list_caught_by(&self, user_id: UserId, query: &PokemonQuery) -> Result<Listing<Pokemon>> {
        let Some(collection) = &self.collection else {
            bail!("MemoryCatalog has no collection attached");
        };
        let caught: BTreeSet<PokemonId> = collection.caught_ids(user_id).into_iter().collect();

        let matching = self
            .pokemon
            .values()
            .filter(|p| caught.contains(&p.id) && query.matches(p))
            .cloned()
            .collect();
        Ok(page_of(matching, query))
    }

    async fn all_types(&self) -> Result<Vec<String>> {
        let types: BTreeSet<String> = self.pokemon.values().flat_map(|p| p.types.iter().cloned()).collect();
        Ok(types.into_iter().collect())
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.pokemon.len() as u64)
    }
}

// ============================================================================
// COLLECTION
// ============================================================================

#[derive(Default)]
pub struct MemoryCollection {
    rows: Mutex<BTreeMap<(UserId, PokemonId), UserPokemon>>,
    last_batch: Mutex<Vec<PokemonId>>,
    fail_writes: AtomicBool,
}

impl MemoryCollection {
    /// Pre-populate a user's collection.
    pub fn seed(&self, user_id: UserId, pokemon_ids: &[PokemonId]) {
        let mut rows = lock(&self.rows);
        for &pokemon_id in pokemon_ids {
            rows.insert(
                (user_id, pokemon_id),
                UserPokemon {
                    user_id,
                    pokemon_id,
                    caught_at: Utc::now(),
                },
            );
        }
    }

    /// From now on, writes affect nothing and return no rows.
    pub fn fail_writes(&self) {
        self.fail_writes.store(true, Ordering::SeqCst);
    }

    pub fn caught_ids(&self, user_id: UserId) -> Vec<PokemonId> {
        lock(&self.rows)
            .keys()
            .filter(|(user, _)| *user == user_id)
            .map(|(_, pokemon)| *pokemon)
            .collect()
    }

    /// Pokémon ids of the most recent write batch, in the order given.
    pub fn last_batch(&self) -> Vec<PokemonId> {
        lock(&self.last_batch).clone()
    }
}

#[async_trait]
impl CollectionStore for MemoryCollection {
    async fn list_by_user(&self, user_id: UserId) -> Result<Vec<UserPokemon>> {
        Ok(lock(&self.rows)
            .values()
            .filter(|row| row.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn batch_add(&self, entries: &[NewUserPokemon]) -> Result<Vec<UserPokemon>> {
        *lock(&self.last_batch) = entries.iter().map(|e| e.pokemon_id).collect();
        if self.fail_writes.load(Ordering::SeqCst) {
            return Ok(Vec::new());
        }

        let mut rows = lock(&self.rows);
        let caught_at = Utc::now();
        let mut inserted = Vec::new();

        for entry in entries {
            let key = (entry.user_id, entry.pokemon_id);
            if rows.contains_key(&key) {
                continue;
            }
            let row = UserPokemon {
                user_id: entry.user_id,
                pokemon_id: entry.pokemon_id,
                caught_at,
            };
            rows.insert(key, row.clone());
            inserted.push(row);
        }

        Ok(inserted)
    }

    async fn batch_remove(&self, user_id: UserId, pokemon_ids: &[PokemonId]) -> Result<Vec<UserPokemon>> {
        *lock(&self.last_batch) = pokemon_ids.to_vec();
        if self.fail_writes.load(Ordering::SeqCst) {
            return Ok(Vec::new());
        }

        let mut rows = lock(&self.rows);
        Ok(pokemon_ids
            .iter()
            .filter_map(|&pokemon_id| rows.remove(&(user_id, pokemon_id)))
            .collect())
    }
}

// ============================================================================
// USERS
// ============================================================================

#[derive(Default)]
pub struct MemoryUsers {
    users: Mutex<Vec<User>>,
}

#[async_trait]
impl UserStore for MemoryUsers {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        Ok(lock(&self.users).iter().find(|u| u.email == email).cloned())
    }

    async fn create(&self, email: &str, username: &str, password_hash: &str) -> Result<User> {
        let mut users = lock(&self.users);
        if users.iter().any(|u| u.email == email) {
            return Err(EmailTaken(email.to_string()).into());
        }

        let user = User {
            id: users.len() as UserId + 1,
            email: email.to_string(),
            username: username.to_string(),
            password_hash: password_hash.to_string(),
            created_at: Utc::now(),
        };
        users.push(user.clone());
        Ok(user)
    }
}

// ============================================================================
// CHAT
// ============================================================================

pub struct MockChatModel {
    reply: String,
    prompts: Mutex<Vec<String>>,
}

impl MockChatModel {
    pub fn replying(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        lock(&self.prompts).clone()
    }
}

#[async_trait]
impl ChatModel for MockChatModel {
    async fn generate(&self, prompt: &str) -> Result<String, ChatError> {
        lock(&self.prompts).push(prompt.to_string());
        Ok(self.reply.clone())
    }
}
