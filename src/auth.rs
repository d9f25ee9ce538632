// Authentication - bcrypt password hashes + signed bearer tokens (JWT, HS256)

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::task;
use tracing::{info, warn};

use crate::pokemon::UserId;
use crate::store::{EmailTaken, UserStore};
use crate::validation::{ValidationError, Validator};

// ============================================================================
// USER ENTITY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub username: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

/// What the API exposes about a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub id: UserId,
    pub email: String,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for PublicUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            username: user.username.clone(),
            created_at: user.created_at,
        }
    }
}

// ============================================================================
// PAYLOADS
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct Registration {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

impl Registration {
    pub fn validate(&self) -> Result<(), ValidationError> {
        Validator::new()
            .min_len(&self.username, 3, "username", "Username must be at least 3 characters long")
            .min_len(&self.email, 5, "email", "Email must be at least 5 characters long")
            .min_len(&self.password, 6, "password", "Password must be at least 6 characters long")
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

impl Credentials {
    pub fn validate(&self) -> Result<(), ValidationError> {
        Validator::new()
            .min_len(&self.email, 5, "email", "Email is required")
            .min_len(&self.password, 1, "password", "Password is required")
            .finish()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginResponse {
    pub id: UserId,
    pub email: String,
    pub username: String,
    pub token: String,
}

/// Token payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub id: UserId,
    pub email: String,
    pub username: String,
    pub exp: i64,
}

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum AuthError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),

    #[error("User already exists")]
    UserExists,

    /// Unknown email and wrong password are deliberately indistinguishable.
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Token expired")]
    TokenExpired,

    #[error("Invalid token")]
    InvalidToken(#[source] jsonwebtoken::errors::Error),

    #[error("failed to sign token")]
    Signing(#[source] jsonwebtoken::errors::Error),

    #[error("password hashing failed")]
    Hash(#[from] bcrypt::BcryptError),

    #[error("password hashing task failed")]
    Blocking(#[from] task::JoinError),

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

// ============================================================================
// TOKENS
// ============================================================================

/// Issues and verifies HS256 tokens with a shared secret.
#[derive(Clone)]
pub struct TokenSigner {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl TokenSigner {
    pub fn new(secret: &str, ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
        }
    }

    pub fn issue(&self, user: &User) -> Result<String, AuthError> {
        let claims = Claims {
            id: user.id,
            email: user.email.clone(),
            username: user.username.clone(),
            exp: (Utc::now() + self.ttl).timestamp(),
        };

        encode(&Header::default(), &claims, &self.encoding).map_err(AuthError::Signing)
    }

    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        decode::<Claims>(token, &self.decoding, &Validation::default())
            .map(|data| data.claims)
            .map_err(|err| match err.kind() {
                ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => AuthError::InvalidToken(err),
            })
    }
}

// ============================================================================
// SERVICE
// ============================================================================

pub struct AuthService {
    users: Arc<dyn UserStore>,
    signer: TokenSigner,
    bcrypt_cost: u32,
}

impl AuthService {
    pub fn new(users: Arc<dyn UserStore>, signer: TokenSigner, bcrypt_cost: u32) -> Self {
        Self {
            users,
            signer,
            bcrypt_cost,
        }
    }

    pub fn signer(&self) -> &TokenSigner {
        &self.signer
    }

    pub async fn register(&self, registration: Registration) -> Result<PublicUser, AuthError> {
        registration.validate()?;

        if self.users.find_by_email(&registration.email).await?.is_some() {
            return Err(AuthError::UserExists);
        }

        let cost = self.bcrypt_cost;
        let password = registration.password;
        let password_hash = task::spawn_blocking(move || bcrypt::hash(password, cost)).await??;

        // find_by_email above can race with another registration
        let user = match self
            .users
            .create(&registration.email, &registration.username, &password_hash)
            .await
        {
            Ok(user) => user,
            Err(err) if err.is::<EmailTaken>() => return Err(AuthError::UserExists),
            Err(err) => return Err(err.into()),
        };

        info!(user_id = user.id, "user registered");
        Ok(PublicUser::from(&user))
    }

    pub async fn login(&self, credentials: Credentials) -> Result<LoginResponse, AuthError> {
        credentials.validate()?;

        let Some(user) = self.users.find_by_email(&credentials.email).await? else {
            warn!("login attempt for unknown email");
            return Err(AuthError::InvalidCredentials);
        };

        let password = credentials.password;
        let hash = user.password_hash.clone();
        if !task::spawn_blocking(move || bcrypt::verify(password, &hash)).await?? {
            warn!(user_id = user.id, "login attempt with wrong password");
            return Err(AuthError::InvalidCredentials);
        }

        let token = self.signer.issue(&user)?;

        Ok(LoginResponse {
            id: user.id,
            email: user.email,
            username: user.username,
            token,
        })
    }
}
