// Pokédex - Core Library
// Exposes all modules for use in CLI, API server, and tests

pub mod pokemon;
pub mod validation;
pub mod query;
pub mod store;
pub mod db;
pub mod sqlite;     // SQLite adapter for the store traits
pub mod evolution;  // Pre-evolution chain resolution
pub mod collection; // Catch/release toggle
pub mod catalog;
pub mod auth;
pub mod chat;       // AI chat proxy
pub mod seed;
pub mod config;
pub mod logging;
pub mod testing;    // In-memory fakes shared by unit and server tests

// Re-export commonly used types
pub use pokemon::{
    Ability, Evolution, EvolutionLink, NewUserPokemon, Pokemon, PokemonId, Sprites, Stats,
    UserId, UserPokemon,
};
pub use validation::{FieldIssue, ValidationError};
pub use query::{Listing, Paginated, PaginationMeta, PokemonQuery};
pub use store::{CatalogStore, CollectionStore, UserStore};
pub use db::{
    DatabaseStats,
    open_database, setup_database, insert_pokemon, verify_count, get_stats, clean_database,
};
pub use sqlite::SqliteStore;
pub use evolution::{resolve_pre_evolution_chain, ResolveError};
pub use collection::{CollectionError, CollectionService, ToggleAction, ToggleOutcome};
pub use catalog::{CatalogError, PokemonService};
pub use auth::{
    AuthError, AuthService, Claims, Credentials, LoginResponse, PublicUser, Registration,
    TokenSigner, User,
};
pub use chat::{ChatError, ChatModel, ChatRequest, ChatService, GeminiClient};
pub use seed::{assign_evolution_tiers, load_pokemon_json, parse_pokemon_json};
pub use config::{DatabaseConfig, ServerConfig};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
