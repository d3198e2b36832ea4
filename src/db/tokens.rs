use sqlx::SqlitePool;

use crate::error::AppError;
use crate::middleware::auth::{create_token_hash, generate_token};

/// Issue a bearer token for `user_id`. Only its digest is stored.
pub async fn issue_token(
    pool: &SqlitePool,
    user_id: &str,
    ttl_hours: i64,
) -> Result<String, AppError> {
    let token = generate_token();
    let token_hash = create_token_hash(&token);
    let expires_at = super::timestamp(chrono::Utc::now() + chrono::Duration::hours(ttl_hours));

    sqlx::query(
        "INSERT INTO user_tokens (token_hash, user_id, expires_at, created_at) VALUES (?, ?, ?, ?)",
    )
    .bind(&token_hash)
    .bind(user_id)
    .bind(&expires_at)
    .bind(super::now())
    .execute(pool)
    .await?;

    Ok(token)
}

/// User id behind a live token: known, not expired, not revoked.
pub async fn resolve_token(pool: &SqlitePool, token: &str) -> Result<Option<String>, AppError> {
    let user_id = sqlx::query_scalar::<_, String>(
        "SELECT ut.user_id FROM user_tokens ut \
         WHERE ut.token_hash = ? AND ut.expires_at > ? \
         AND NOT EXISTS (SELECT 1 FROM token_blacklist tb WHERE tb.token_hash = ut.token_hash)",
    )
    .bind(create_token_hash(token))
    .bind(super::now())
    .fetch_optional(pool)
    .await?;

    Ok(user_id)
}

pub async fn revoke_token(pool: &SqlitePool, token: &str) -> Result<(), AppError> {
    sqlx::query("INSERT OR IGNORE INTO token_blacklist (token_hash, revoked_at) VALUES (?, ?)")
        .bind(create_token_hash(token))
        .bind(super::now())
        .execute(pool)
        .await?;
    Ok(())
}
