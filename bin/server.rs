// Pokédex - Web Server
// REST API with Axum over the SQLite store

use axum::{
    async_trait,
    extract::{
        rejection::{JsonRejection, QueryRejection},
        FromRequestParts, Path, Query, State,
    },
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use clap::Parser;
use serde::Serialize;
use serde_json::json;
use std::path::Path as FsPath;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use pokedex::config::{load_dotenv, ServerConfig};
use pokedex::logging::init_tracing;
use pokedex::{
    AuthError, AuthService, CatalogError, ChatError, ChatRequest, ChatService, Claims, CollectionError,
    CollectionService, Credentials, GeminiClient, PokemonId, PokemonQuery, PokemonService, Registration,
    SqliteStore, TokenSigner, ValidationError,
};

/// Shared application state
#[derive(Clone)]
struct AppState {
    pokemon: Arc<PokemonService>,
    collection: Arc<CollectionService>,
    auth: Arc<AuthService>,
    /// None when no model API key is configured
    chat: Option<Arc<ChatService>>,
}

impl AppState {
    fn new(store: SqliteStore, signer: TokenSigner, bcrypt_cost: u32, chat: Option<ChatService>) -> Self {
        let store = Arc::new(store);

        Self {
            pokemon: Arc::new(PokemonService::new(store.clone())),
            collection: Arc::new(CollectionService::new(store.clone(), store.clone())),
            auth: Arc::new(AuthService::new(store, signer, bcrypt_cost)),
            chat: chat.map(Arc::new),
        }
    }
}

/// `{message, data}` envelope
#[derive(Serialize)]
struct MessageResponse<T> {
    message: &'static str,
    data: T,
}

impl<T> MessageResponse<T> {
    fn new(message: &'static str, data: T) -> Self {
        Self { message, data }
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug)]
enum ApiError {
    Invalid(ValidationError),
    Unauthorized(&'static str),
    NotFound(&'static str),
    Conflict(String),
    ChatDisabled,
    Upstream(ChatError),
    Internal(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind, message) = match self {
            ApiError::Invalid(err) => {
                let body = json!({
                    "error": "ValidationError",
                    "message": "Validation error",
                    "details": err.issues,
                });
                return (StatusCode::BAD_REQUEST, Json(body)).into_response();
            }
            ApiError::Unauthorized(message) => (StatusCode::UNAUTHORIZED, "Unauthorized", message.to_string()),
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, "NotFound", message.to_string()),
            ApiError::Conflict(message) => (StatusCode::CONFLICT, "Conflict", message),
            ApiError::ChatDisabled => (
                StatusCode::SERVICE_UNAVAILABLE,
                "ServiceUnavailable",
                "AI chat is not configured".to_string(),
            ),
            ApiError::Upstream(err) => {
                error!(error = %err, "chat upstream failure");
                (StatusCode::BAD_GATEWAY, "UpstreamError", "Failed to get AI response".to_string())
            }
            ApiError::Internal(err) => {
                error!(error = ?err, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "InternalServerError",
                    "Internal server error".to_string(),
                )
            }
        };

        (status, Json(json!({ "error": kind, "message": message }))).into_response()
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::Invalid(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Invalid(ValidationError::single("body", rejection.body_text()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::Invalid(ValidationError::single("query", rejection.body_text()))
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Invalid(err) => ApiError::Invalid(err),
            AuthError::UserExists => ApiError::Conflict("User already exists".to_string()),
            AuthError::InvalidCredentials => ApiError::Unauthorized("Invalid email or password"),
            AuthError::TokenExpired => ApiError::Unauthorized("Token expired"),
            AuthError::InvalidToken(_) => ApiError::Unauthorized("Invalid token"),
            other => ApiError::Internal(other.into()),
        }
    }
}

impl From<CatalogError> for ApiError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::Invalid(err) => ApiError::Invalid(err),
            CatalogError::Store(err) => ApiError::Internal(err),
        }
    }
}

impl From<CollectionError> for ApiError {
    fn from(err: CollectionError) -> Self {
        match err {
            CollectionError::Invalid(err) => ApiError::Invalid(err),
            err @ (CollectionError::OperationFailed { .. } | CollectionError::TargetMissing { .. }) => {
                ApiError::Conflict(err.to_string())
            }
            other => ApiError::Internal(other.into()),
        }
    }
}

impl From<ChatError> for ApiError {
    fn from(err: ChatError) -> Self {
        match err {
            ChatError::Invalid(err) => ApiError::Invalid(err),
            other => ApiError::Upstream(other),
        }
    }
}

/// Path ids must be positive integers.
fn parse_id(raw: &str, field: &str) -> Result<PokemonId, ApiError> {
    match raw.parse::<PokemonId>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(ValidationError::single(field, "Must be a positive integer").into()),
    }
}

// ============================================================================
// Authentication
// ============================================================================

/// Claims of a verified `Authorization: Bearer <token>` header.
struct AuthUser(Claims);

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or(ApiError::Unauthorized("No token provided"))?;

        let claims = state.auth.signer().verify(token)?;
        Ok(AuthUser(claims))
    }
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api - Health check
async fn health_check() -> impl IntoResponse {
    Json(json!({
        "message": "Pokédex API is running!",
        "version": pokedex::VERSION,
        "status": "healthy",
    }))
}

/// POST /api/auth/register
async fn register(
    State(state): State<AppState>,
    payload: Result<Json<Registration>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(registration) = payload?;
    let user = state.auth.register(registration).await?;

    Ok((
        StatusCode::CREATED,
        Json(MessageResponse::new("User registered successfully", user)),
    ))
}

/// POST /api/auth/login
async fn login(
    State(state): State<AppState>,
    payload: Result<Json<Credentials>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(credentials) = payload?;
    let session = state.auth.login(credentials).await?;

    Ok(Json(MessageResponse::new("Login successful", session)))
}

/// GET /api/pokemon - Filtered, paginated catalog
async fn list_pokemon(
    State(state): State<AppState>,
    query: Result<Query<PokemonQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Query(query) = query?;
    Ok(Json(state.pokemon.list(&query).await?))
}

/// GET /api/pokemon/types
async fn list_types(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let types = state.pokemon.types().await?;
    Ok(Json(json!({ "types": types })))
}

/// GET /api/pokemon/count
async fn count_pokemon(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let total = state.pokemon.count().await?;
    Ok(Json(json!({ "total": total })))
}

/// GET /api/pokemon/:id
async fn get_pokemon(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id, "id")?;
    let pokemon = state
        .pokemon
        .get(id)
        .await?
        .ok_or(ApiError::NotFound("Pokemon not found"))?;

    Ok(Json(json!({ "pokemon": pokemon })))
}

/// POST /api/pokemon/chat
async fn chat(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = payload?;
    let chat = state.chat.as_ref().ok_or(ApiError::ChatDisabled)?;

    let reply = chat.chat(&request).await?;
    info!(user_id = claims.id, "chat answered");

    Ok(Json(MessageResponse::new("AI response received", reply)))
}

/// GET /api/me/collection - The caller's caught Pokémon
async fn my_collection(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    query: Result<Query<PokemonQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Query(query) = query?;
    Ok(Json(state.collection.collection_page(claims.id, &query).await?))
}

/// POST /api/me/collection/:pokemon_id/toggle - Catch or release
async fn toggle_catch(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Path(pokemon_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let pokemon_id = parse_id(&pokemon_id, "pokemonId")?;

    if state.pokemon.get(pokemon_id).await?.is_none() {
        return Err(ApiError::NotFound("Pokemon not found"));
    }

    let outcome = state.collection.toggle_catch(claims.id, pokemon_id).await?;

    Ok(Json(json!({
        "message": outcome.record,
        "action": outcome.action,
    })))
}

// ============================================================================
// Router
// ============================================================================

fn app(state: AppState, static_dir: Option<&FsPath>) -> Router {
    let api = Router::new()
        .route("/api", get(health_check))
        .route("/api/auth/register", post(register))
        .route("/api/auth/login", post(login))
        .route("/api/pokemon", get(list_pokemon))
        .route("/api/pokemon/types", get(list_types))
        .route("/api/pokemon/count", get(count_pokemon))
        .route("/api/pokemon/chat", post(chat))
        .route("/api/pokemon/:id", get(get_pokemon))
        .route("/api/me/collection", get(my_collection))
        .route("/api/me/collection/:pokemon_id/toggle", post(toggle_catch));

    // Serve the built frontend for everything else
    let router = match static_dir {
        Some(dir) => api.fallback_service(ServeDir::new(dir).fallback(ServeFile::new(dir.join("index.html")))),
        None => api,
    };

    router
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();
    init_tracing();

    let config = ServerConfig::parse();

    info!(path = %config.database.database_path.display(), "opening database");
    let store = SqliteStore::open(&config.database.database_path)?;

    let chat = match &config.gemini_api_key {
        Some(key) => {
            let model = GeminiClient::new(key.clone(), config.gemini_model.clone())?;
            Some(ChatService::new(Arc::new(model)))
        }
        None => {
            warn!("GEMINI_API_KEY not set, chat endpoint disabled");
            None
        }
    };

    let signer = TokenSigner::new(&config.jwt_secret, config.token_ttl());
    let state = AppState::new(store, signer, config.bcrypt_cost, chat);
    let app = app(state, config.static_dir.as_deref());

    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    println!("🚀 Pokédex API running on http://{}", addr);
    println!("📊 API endpoints:");
    println!("   GET  /api");
    println!("   POST /api/auth/register");
    println!("   POST /api/auth/login");
    println!("   GET  /api/pokemon");
    println!("   GET  /api/pokemon/types");
    println!("   GET  /api/pokemon/count");
    println!("   GET  /api/pokemon/:id");
    println!("   POST /api/pokemon/chat");
    println!("   GET  /api/me/collection");
    println!("   POST /api/me/collection/:pokemon_id/toggle");

    axum::serve(listener, app).await?;

    Ok(())
}
