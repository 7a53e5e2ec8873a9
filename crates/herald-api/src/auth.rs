use std::sync::Arc;

use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::{SaltString, rand_core::OsRng}};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use jsonwebtoken::{EncodingKey, Header, encode};
use tracing::info;
use uuid::Uuid;

use herald_db::Database;
use herald_dispatch::Dispatcher;
use herald_types::api::{Claims, LoginRequest, LoginResponse, RegisterRequest, RegisterResponse};

use crate::error::ApiError;
use crate::validation;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub jwt_secret: String,
    pub dispatcher: Dispatcher,
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    // Validate input
    let username = req.username.trim();
    if username.len() < 3 || username.len() > 32 {
        return Err(ApiError::BadRequest("username must be 3 to 32 characters".into()));
    }
    if req.password.len() < 8 {
        return Err(ApiError::BadRequest("password must be at least 8 characters".into()));
    }
    let email = match validation::optional(req.email.as_deref()) {
        Some(raw) => Some(validation::email(&raw)?),
        None => None,
    };

    // Check if username is taken
    if state.db.get_user_by_username(username)?.is_some() {
        return Err(ApiError::Conflict(format!("username '{}' is taken", username)));
    }

    let password_hash = hash_password(&req.password)?;
    let user_id = Uuid::new_v4();

    state
        .db
        .create_user(&user_id.to_string(), username, email.as_deref(), &password_hash)?;

    let token = create_token(&state.jwt_secret, user_id, username)?;

    info!("Registered user {} ({})", username, user_id);
    Ok((StatusCode::CREATED, Json(RegisterResponse { user_id, token })))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state
        .db
        .get_user_by_username(req.username.trim())?
        .ok_or(ApiError::Unauthorized)?;

    // Verify password
    let parsed_hash = PasswordHash::new(&user.password)
        .map_err(|e| anyhow::anyhow!("Stored password hash for {} is corrupt: {}", user.id, e))?;

    Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .map_err(|_| ApiError::Unauthorized)?;

    let user_id: Uuid = user
        .id
        .parse()
        .map_err(|e| anyhow::anyhow!("Corrupt user id '{}': {}", user.id, e))?;

    let token = create_token(&state.jwt_secret, user_id, &user.username)?;

    Ok(Json(LoginResponse {
        user_id,
        username: user.username,
        token,
    }))
}

/// Argon2id with a fresh random salt.
pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Password hashing failed: {}", e))?
        .to_string();
    Ok(hash)
}

fn create_token(secret: &str, user_id: Uuid, username: &str) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id,
        username: username.to_string(),
        exp: (chrono::Utc::now() + chrono::Duration::days(30)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}
