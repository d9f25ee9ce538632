// Storage Contracts - ports the services hold as trait objects
//
// The SQLite adapter and the in-memory fakes in `testing` are interchangeable.

use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;

use crate::auth::User;
use crate::pokemon::{NewUserPokemon, Pokemon, PokemonId, UserId, UserPokemon};
use crate::query::{Listing, PokemonQuery};

/// Read-only access to the Pokémon catalog.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// `None` when the id does not exist.
    async fn find_by_id(&self, id: PokemonId) -> Result<Option<Pokemon>>;

    /// Filtered page of the whole catalog, ordered by id.
    async fn list(&self, query: &PokemonQuery) -> Result<Listing<Pokemon>>;

    /// Filtered page of the Pokémon a user has caught, ordered by id.
    async fn list_caught_by(&self, user_id: UserId, query: &PokemonQuery) -> Result<Listing<Pokemon>>;

    /// Distinct type names, sorted.
    async fn all_types(&self) -> Result<Vec<String>>;

    async fn count(&self) -> Result<u64>;
}

/// The user-collection join table.
#[async_trait]
pub trait CollectionStore: Send + Sync {
    /// Membership snapshot for one user.
    async fn list_by_user(&self, user_id: UserId) -> Result<Vec<UserPokemon>>;

    /// Insert all entries as one unit. Pairs that already exist are skipped
    /// without error and are absent from the returned rows. Input order is
    /// preserved in the output. An empty batch returns an empty result.
    async fn batch_add(&self, entries: &[NewUserPokemon]) -> Result<Vec<UserPokemon>>;

    /// Delete the given pairs as one unit and return the removed rows.
    /// An empty batch returns an empty result.
    async fn batch_remove(&self, user_id: UserId, pokemon_ids: &[PokemonId]) -> Result<Vec<UserPokemon>>;
}

/// Returned (inside `anyhow::Error`) by [`UserStore::create`] when the email
/// is already registered.
#[derive(Debug, Error)]
#[error("email {0} is already registered")]
pub struct EmailTaken(pub String);

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Fails with [`EmailTaken`] on a duplicate email, even when the
    /// duplicate was created concurrently.
    async fn create(&self, email: &str, username: &str, password_hash: &str) -> Result<User>;
}
