use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use axum::extract::State;
use axum::Json;
use serde::Deserialize;

use crate::db;
use crate::error::AppError;
use crate::middleware::auth::AuthUser;
use crate::models::user::CreateUser;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    pub display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

pub async fn register(
    State(state): State<AppState>,
    Json(input): Json<RegisterRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let username = input.username.trim();
    if username.is_empty() || username.chars().count() > 32 {
        return Err(AppError::BadRequest(
            "username must be between 1 and 32 characters".to_string(),
        ));
    }

    if input.password.len() < 8 || input.password.len() > 128 {
        return Err(AppError::BadRequest(
            "password must be between 8 and 128 characters".to_string(),
        ));
    }

    if db::users::find_by_username(&state.db, username).await?.is_some() {
        return Err(AppError::Conflict("username already taken".to_string()));
    }

    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(input.password.as_bytes(), &salt)
        .map_err(|e| AppError::Internal(format!("password hashing failed: {e}")))?
        .to_string();

    let display_name = input
        .display_name
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty());
    let user = db::users::create_user(
        &state.db,
        &CreateUser {
            username: username.to_string(),
            display_name,
        },
        &password_hash,
    )
    .await?;

    let token = db::tokens::issue_token(&state.db, &user.id, state.token_ttl_hours).await?;
    tracing::info!(user_id = %user.id, "user registered");

    Ok(Json(serde_json::json!({
        "data": {
            "user": user,
            "token": token
        }
    })))
}

pub async fn login(
    State(state): State<AppState>,
    Json(input): Json<LoginRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let (user_id, stored_hash) = db::users::get_credentials(&state.db, input.username.trim())
        .await?
        .ok_or_else(|| AppError::Unauthorized("invalid credentials".to_string()))?;

    let parsed_hash = PasswordHash::new(&stored_hash)
        .map_err(|e| AppError::Internal(format!("stored hash parse failed: {e}")))?;

    if Argon2::default()
        .verify_password(input.password.as_bytes(), &parsed_hash)
        .is_err()
    {
        return Err(AppError::Unauthorized("invalid credentials".to_string()));
    }

    let user = db::users::get_user(&state.db, &user_id).await?;
    let token = db::tokens::issue_token(&state.db, &user.id, state.token_ttl_hours).await?;

    Ok(Json(serde_json::json!({
        "data": {
            "user": user,
            "token": token
        }
    })))
}

/// Revokes the presented token. Open WebSocket sessions are not affected.
pub async fn logout(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<serde_json::Value>, AppError> {
    db::tokens::revoke_token(&state.db, &auth.token).await?;

    Ok(Json(serde_json::json!({
        "data": { "ok": true }
    })))
}
