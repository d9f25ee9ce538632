// Catch/Release Coordinator
// Toggles a (user, pokemon) membership, cascading catches up the evolution chain
//
// Catch:   missing ancestors (base form first) + target, one batched insert
// Release: exactly the target, one batched delete
//
// Release never cascades. Ancestors caught alongside a Pokémon stay caught when
// that Pokémon is released; only catching walks the chain.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::evolution::{resolve_pre_evolution_chain, ResolveError};
use crate::pokemon::{NewUserPokemon, Pokemon, PokemonId, UserId, UserPokemon};
use crate::query::{Paginated, PokemonQuery};
use crate::store::{CatalogStore, CollectionStore};
use crate::validation::ValidationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ToggleAction {
    Catch,
    Release,
}

impl fmt::Display for ToggleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToggleAction::Catch => write!(f, "catch"),
            ToggleAction::Release => write!(f, "release"),
        }
    }
}

/// Result of a toggle: what happened and the record that was created or removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToggleOutcome {
    pub action: ToggleAction,
    pub record: UserPokemon,
}

#[derive(Debug, Error)]
pub enum CollectionError {
    /// The batched write affected zero rows.
    #[error("Failed to {action} pokemon {pokemon_id}: no rows affected")]
    OperationFailed {
        action: ToggleAction,
        pokemon_id: PokemonId,
    },

    /// Other rows of the batch were written but the target is neither
    /// inserted nor present, e.g. a concurrent release won the race.
    #[error("Failed to {action} pokemon {pokemon_id}: target row not present after write")]
    TargetMissing {
        action: ToggleAction,
        pokemon_id: PokemonId,
    },

    #[error(transparent)]
    Invalid(#[from] ValidationError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

pub struct CollectionService {
    catalog: Arc<dyn CatalogStore>,
    collection: Arc<dyn CollectionStore>,
}

impl CollectionService {
    pub fn new(catalog: Arc<dyn CatalogStore>, collection: Arc<dyn CollectionStore>) -> Self {
        Self { catalog, collection }
    }

    /// Catch the Pokémon if the user does not have it, release it otherwise.
    ///
    /// State is read fresh on each call. The snapshot and the write are not
    /// isolated from concurrent toggles; duplicate inserts are absorbed by the
    /// store's key. A target that a racing call already caught counts as
    /// caught, and a write that touches no rows is
    /// [`CollectionError::OperationFailed`].
    pub async fn toggle_catch(&self, user_id: UserId, pokemon_id: PokemonId) -> Result<ToggleOutcome, CollectionError> {
        let caught: HashSet<PokemonId> = self
            .collection
            .list_by_user(user_id)
            .await?
            .into_iter()
            .map(|entry| entry.pokemon_id)
            .collect();

        if caught.contains(&pokemon_id) {
            self.release(user_id, pokemon_id).await
        } else {
            self.catch(user_id, pokemon_id, &caught).await
        }
    }

    async fn catch(
        &self,
        user_id: UserId,
        pokemon_id: PokemonId,
        caught: &HashSet<PokemonId>,
    ) -> Result<ToggleOutcome, CollectionError> {
        let ancestors = resolve_pre_evolution_chain(pokemon_id, |id| self.catalog.find_by_id(id)).await?;

        let batch: Vec<NewUserPokemon> = ancestors
            .into_iter()
            .filter(|id| !caught.contains(id))
            .chain(std::iter::once(pokemon_id))
            .map(|id| NewUserPokemon::new(user_id, id))
            .collect();

        let inserted = self.collection.batch_add(&batch).await?;
        if inserted.is_empty() {
            warn!(user_id, pokemon_id, "catch inserted no rows");
            return Err(CollectionError::OperationFailed {
                action: ToggleAction::Catch,
                pokemon_id,
            });
        }

        let record = match inserted.iter().find(|row| row.pokemon_id == pokemon_id) {
            Some(row) => row.clone(),
            // Target skipped as a duplicate: a concurrent toggle caught it after our snapshot
            None => self.existing_record(user_id, pokemon_id).await?,
        };

        info!(user_id, pokemon_id, inserted = inserted.len(), "pokemon caught");
        Ok(ToggleOutcome {
            action: ToggleAction::Catch,
            record,
        })
    }

    async fn existing_record(&self, user_id: UserId, pokemon_id: PokemonId) -> Result<UserPokemon, CollectionError> {
        self.collection
            .list_by_user(user_id)
            .await?
            .into_iter()
            .find(|row| row.pokemon_id == pokemon_id)
            .ok_or_else(|| {
                warn!(user_id, pokemon_id, "catch target missing after batch insert");
                CollectionError::TargetMissing {
                    action: ToggleAction::Catch,
                    pokemon_id,
                }
            })
    }

    async fn release(&self, user_id: UserId, pokemon_id: PokemonId) -> Result<ToggleOutcome, CollectionError> {
        let removed = self.collection.batch_remove(user_id, &[pokemon_id]).await?;

        let Some(record) = removed.into_iter().next() else {
            warn!(user_id, pokemon_id, "release removed no rows");
            return Err(CollectionError::OperationFailed {
                action: ToggleAction::Release,
                pokemon_id,
            });
        };

        info!(user_id, pokemon_id, "pokemon released");
        Ok(ToggleOutcome {
            action: ToggleAction::Release,
            record,
        })
    }

    /// One page of the Pokémon the user has caught.
    pub async fn collection_page(&self, user_id: UserId, query: &PokemonQuery) -> Result<Paginated<Pokemon>, CollectionError> {
        query.validate()?;
        let listing = self.catalog.list_caught_by(user_id, query).await?;
        Ok(Paginated::new(listing, query))
    }
}
