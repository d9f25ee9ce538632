// SQLite adapter for the catalog, collection and user stores
//
// One connection behind a mutex, shared by all three stores. The lock is
// taken and released inside each method; no await happens while it is held.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};

use crate::auth::User;
use crate::db::{self, parse_timestamp, PokemonRow, POKEMON_COLUMNS};
use crate::pokemon::{NewUserPokemon, Pokemon, PokemonId, UserId, UserPokemon};
use crate::query::{Listing, PokemonQuery};
use crate::store::{CatalogStore, CollectionStore, EmailTaken, UserStore};

#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Wrap a connection, creating the schema if needed.
    pub fn new(conn: Connection) -> Result<Self> {
        db::setup_database(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open(path: &Path) -> Result<Self> {
        Self::new(db::open_database(path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::new(Connection::open_in_memory()?)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| anyhow!("database connection lock poisoned"))
    }

    pub fn insert_pokemon(&self, pokemon: &[Pokemon]) -> Result<usize> {
        db::insert_pokemon(&*self.lock()?, pokemon)
    }

    fn select_pokemon(&self, caught_by: Option<UserId>, query: &PokemonQuery) -> Result<Listing<Pokemon>> {
        let mut join = String::new();
        let mut clauses: Vec<&str> = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        if let Some(user_id) = caught_by {
            join.push_str(" JOIN user_pokemon up ON up.pokemon_id = p.id");
            clauses.push("up.user_id = ?");
            values.push(Value::Integer(user_id));
        }
        if let Some(name) = query.name_filter() {
            clauses.push("p.name LIKE ? ESCAPE '\\'");
            values.push(Value::Text(like_pattern(name)));
        }
        if let Some(description) = query.description_filter() {
            clauses.push("p.description LIKE ? ESCAPE '\\'");
            values.push(Value::Text(like_pattern(description)));
        }
        if let Some(pokemon_type) = query.type_filter() {
            clauses.push("EXISTS (SELECT 1 FROM json_each(p.types) t WHERE lower(t.value) = lower(?))");
            values.push(Value::Text(pokemon_type.to_string()));
        }
        if let Some(tier) = query.evolution_tier {
            clauses.push("p.evolution_tier = ?");
            values.push(Value::Integer(i64::from(tier)));
        }

        let filter = if clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", clauses.join(" AND "))
        };

        let conn = self.lock()?;

        let total: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM pokemon p{}{}", join, filter),
            params_from_iter(values.iter()),
            |row| row.get(0),
        )?;

        values.push(Value::Integer(i64::from(query.limit)));
        values.push(Value::Integer(query.offset() as i64));

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM pokemon p{}{} ORDER BY p.id LIMIT ? OFFSET ?",
            POKEMON_COLUMNS, join, filter
        ))?;
        let rows = stmt
            .query_map(params_from_iter(values.iter()), PokemonRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        let items = rows
            .into_iter()
            .map(PokemonRow::into_pokemon)
            .collect::<Result<Vec<_>>>()?;

        Ok(Listing {
            items,
            total: total as u64,
        })
    }
}

/// `%needle%` with LIKE wildcards in the needle escaped.
fn like_pattern(needle: &str) -> String {
    let escaped = needle
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

fn user_pokemon_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<(UserId, PokemonId, String)> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?))
}

fn into_user_pokemon((user_id, pokemon_id, caught_at): (UserId, PokemonId, String)) -> Result<UserPokemon> {
    Ok(UserPokemon {
        user_id,
        pokemon_id,
        caught_at: parse_timestamp(&caught_at)?,
    })
}

// ============================================================================
// CATALOG
// ============================================================================

#[async_trait]
impl CatalogStore for SqliteStore {
    async fn find_by_id(&self, id: PokemonId) -> Result<Option<Pokemon>> {
        let row = self
            .lock()?
            .query_row(
                &format!("SELECT {} FROM pokemon p WHERE p.id = ?1", POKEMON_COLUMNS),
                [id],
                PokemonRow::from_row,
            )
            .optional()?;

        row.map(PokemonRow::into_pokemon).transpose()
    }

    async fn list(&self, query: &PokemonQuery) -> Result<Listing<Pokemon>> {
        self.select_pokemon(None, query)
    }

    async fn list_caught_by(&self, user_id: UserId, query: &PokemonQuery) -> Result<Listing<Pokemon>> {
        self.select_pokemon(Some(user_id), query)
    }

    async fn all_types(&self) -> Result<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT DISTINCT t.value FROM pokemon p, json_each(p.types) t ORDER BY t.value",
        )?;
        let types = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;

        Ok(types)
    }

    async fn count(&self) -> Result<u64> {
        Ok(db::verify_count(&*self.lock()?)? as u64)
    }
}

// ============================================================================
// COLLECTION
// ============================================================================

#[async_trait]
impl CollectionStore for SqliteStore {
    async fn list_by_user(&self, user_id: UserId) -> Result<Vec<UserPokemon>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT user_id, pokemon_id, caught_at
             FROM user_pokemon
             WHERE user_id = ?1
             ORDER BY pokemon_id",
        )?;
        let rows = stmt
            .query_map([user_id], user_pokemon_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter().map(into_user_pokemon).collect()
    }

    async fn batch_add(&self, entries: &[NewUserPokemon]) -> Result<Vec<UserPokemon>> {
        if entries.is_empty() {
            return Ok(Vec::new());
        }

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let caught_at = Utc::now().to_rfc3339();
        let mut inserted = Vec::with_capacity(entries.len());

        {
            // OR IGNORE: an existing (user, pokemon) key is skipped, not an error
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO user_pokemon (user_id, pokemon_id, caught_at)
                 VALUES (?1, ?2, ?3)
                 RETURNING user_id, pokemon_id, caught_at",
            )?;

            for entry in entries {
                let row = stmt
                    .query_row(params![entry.user_id, entry.pokemon_id, caught_at], user_pokemon_from_row)
                    .optional()
                    .with_context(|| {
                        format!("Failed to add pokemon {} for user {}", entry.pokemon_id, entry.user_id)
                    })?;
                if let Some(row) = row {
                    inserted.push(into_user_pokemon(row)?);
                }
            }
        }

        tx.commit()?;
        Ok(inserted)
    }

    async fn batch_remove(&self, user_id: UserId, pokemon_ids: &[PokemonId]) -> Result<Vec<UserPokemon>> {
        if pokemon_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let mut removed = Vec::with_capacity(pokemon_ids.len());

        {
            let mut stmt = tx.prepare(
                "DELETE FROM user_pokemon
                 WHERE user_id = ?1 AND pokemon_id = ?2
                 RETURNING user_id, pokemon_id, caught_at",
            )?;

            for pokemon_id in pokemon_ids {
                let row = stmt
                    .query_row(params![user_id, pokemon_id], user_pokemon_from_row)
                    .optional()?;
                if let Some(row) = row {
                    removed.push(into_user_pokemon(row)?);
                }
            }
        }

        tx.commit()?;
        Ok(removed)
    }
}

// ============================================================================
// USERS
// ============================================================================

type UserRow = (UserId, String, String, String, String);

fn user_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
}

fn into_user((id, email, username, password_hash, created_at): UserRow) -> Result<User> {
    Ok(User {
        id,
        email,
        username,
        password_hash,
        created_at: parse_timestamp(&created_at)?,
    })
}

#[async_trait]
impl UserStore for SqliteStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let row = self
            .lock()?
            .query_row(
                "SELECT id, email, username, password_hash, created_at FROM users WHERE email = ?1",
                [email],
                user_from_row,
            )
            .optional()?;

        row.map(into_user).transpose()
    }

    async fn create(&self, email: &str, username: &str, password_hash: &str) -> Result<User> {
        let row = self
            .lock()?
            .query_row(
                "INSERT INTO users (email, username, password_hash, created_at)
                 VALUES (?1, ?2, ?3, ?4)
                 RETURNING id, email, username, password_hash, created_at",
                params![email, username, password_hash, Utc::now().to_rfc3339()],
                user_from_row,
            )
            .map_err(|err| match err {
                rusqlite::Error::SqliteFailure(cause, _)
                    if cause.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
                {
                    anyhow::Error::new(EmailTaken(email.to_string()))
                }
                other => anyhow::Error::new(other).context("Failed to create user"),
            })?;

        into_user(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::{CollectionService, ToggleAction};
    use crate::testing::starter_pokemon;

    async fn seeded_store() -> (SqliteStore, UserId) {
        let store = SqliteStore::open_in_memory().unwrap();
        store.insert_pokemon(&starter_pokemon()).unwrap();
        let user = store.create("ash@pallet.town", "ash", "hash").await.unwrap();
        (store, user.id)
    }

    fn caught(store: &SqliteStore, user_id: UserId) -> Vec<PokemonId> {
        let conn = store.lock().unwrap();
        let mut stmt = conn
            .prepare("SELECT pokemon_id FROM user_pokemon WHERE user_id = ?1 ORDER BY pokemon_id")
            .unwrap();
        let ids = stmt
            .query_map([user_id], |row| row.get(0))
            .unwrap()
            .collect::<Result<Vec<PokemonId>, _>>()
            .unwrap();
        ids
    }

    #[tokio::test]
    async fn test_find_by_id() {
        let (store, _) = seeded_store().await;

        let ivysaur = store.find_by_id(2).await.unwrap().unwrap();
        assert_eq!(ivysaur.name, "Ivysaur");
        assert_eq!(ivysaur.prev_id(), Some(1));
        assert!(store.find_by_id(151).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_batch_add_skips_existing_pairs() {
        let (store, ash) = seeded_store().await;

        let first = store
            .batch_add(&[NewUserPokemon::new(ash, 1), NewUserPokemon::new(ash, 2)])
            .await
            .unwrap();
        let second = store
            .batch_add(&[NewUserPokemon::new(ash, 2), NewUserPokemon::new(ash, 3)])
            .await
            .unwrap();

        assert_eq!(first.len(), 2);
        assert_eq!(second.iter().map(|r| r.pokemon_id).collect::<Vec<_>>(), vec![3]);
        assert_eq!(caught(&store, ash), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_batch_add_is_all_or_nothing() {
        let (store, ash) = seeded_store().await;

        // 999 violates the pokemon foreign key, so 1 must be rolled back too
        let result = store
            .batch_add(&[NewUserPokemon::new(ash, 1), NewUserPokemon::new(ash, 999)])
            .await;

        assert!(result.is_err());
        assert!(caught(&store, ash).is_empty());
    }

    #[tokio::test]
    async fn test_empty_batches_are_no_ops() {
        let (store, ash) = seeded_store().await;

        assert!(store.batch_add(&[]).await.unwrap().is_empty());
        assert!(store.batch_remove(ash, &[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_batch_remove_returns_removed_rows() {
        let (store, ash) = seeded_store().await;
        store
            .batch_add(&[NewUserPokemon::new(ash, 1), NewUserPokemon::new(ash, 4)])
            .await
            .unwrap();

        let removed = store.batch_remove(ash, &[4, 5]).await.unwrap();

        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].pokemon_id, 4);
        assert_eq!(caught(&store, ash), vec![1]);
    }

    #[tokio::test]
    async fn test_filters_and_pagination() {
        let (store, _) = seeded_store().await;

        let fire = store
            .list(&PokemonQuery {
                pokemon_type: Some("FIRE".to_string()),
                ..PokemonQuery::page(2, 2)
            })
            .await
            .unwrap();
        assert_eq!(fire.total, 3);
        assert_eq!(fire.items.iter().map(|p| p.id).collect::<Vec<_>>(), vec![6]);

        let tier_two = store
            .list(&PokemonQuery {
                evolution_tier: Some(2),
                ..PokemonQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(tier_two.items.iter().map(|p| p.id).collect::<Vec<_>>(), vec![2, 5]);

        let by_name = store
            .list(&PokemonQuery {
                name: Some("char".to_string()),
                ..PokemonQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(by_name.total, 3);

        let wildcard = store
            .list(&PokemonQuery {
                name: Some("%".to_string()),
                ..PokemonQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(wildcard.total, 0);
    }

    #[tokio::test]
    async fn test_types_and_count() {
        let (store, _) = seeded_store().await;

        assert_eq!(store.all_types().await.unwrap(), vec!["Fire", "Flying", "Grass", "Poison"]);
        assert_eq!(store.count().await.unwrap(), 6);
    }

    #[tokio::test]
    async fn test_users() {
        let (store, ash) = seeded_store().await;

        let found = store.find_by_email("ash@pallet.town").await.unwrap().unwrap();
        assert_eq!(found.id, ash);
        assert!(store.find_by_email("misty@cerulean.city").await.unwrap().is_none());
        let duplicate = store.create("ash@pallet.town", "ash2", "hash").await.unwrap_err();
        assert!(duplicate.is::<EmailTaken>());
    }

    #[tokio::test]
    async fn test_toggle_scenario_against_sqlite() {
        let (store, ash) = seeded_store().await;
        let store = Arc::new(store);
        let service = CollectionService::new(store.clone(), store.clone());

        let caught_outcome = service.toggle_catch(ash, 3).await.unwrap();
        assert_eq!(caught_outcome.action, ToggleAction::Catch);
        assert_eq!(caught_outcome.record.pokemon_id, 3);
        assert_eq!(caught(&store, ash), vec![1, 2, 3]);

        let page = service.collection_page(ash, &PokemonQuery::default()).await.unwrap();
        assert_eq!(page.pagination.total, 3);

        let released = service.toggle_catch(ash, 3).await.unwrap();
        assert_eq!(released.action, ToggleAction::Release);
        assert_eq!(caught(&store, ash), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_name_filter_agrees_with_in_memory_mirror() {
        let flabebe = Pokemon::new(669, "Flabébé").with_types(&["Fairy"]);
        let store = SqliteStore::open_in_memory().unwrap();
        store.insert_pokemon(std::slice::from_ref(&flabebe)).unwrap();

        for needle in ["FLAB", "flabébé", "FLABÉBÉ"] {
            let query = PokemonQuery {
                name: Some(needle.to_string()),
                ..PokemonQuery::default()
            };
            let listed = store.list(&query).await.unwrap().total == 1;
            assert_eq!(listed, query.matches(&flabebe), "name filter {:?}", needle);
        }
    }
}
