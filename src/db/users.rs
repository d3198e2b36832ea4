use sqlx::{Row, SqlitePool};

use crate::error::AppError;
use crate::models::user::{CreateUser, User};

fn row_to_user(row: sqlx::sqlite::SqliteRow) -> User {
    User {
        id: row.get("id"),
        username: row.get("username"),
        display_name: row.get("display_name"),
        created_at: row.get("created_at"),
    }
}

const SELECT_USERS: &str = "SELECT id, username, display_name, created_at FROM users";

pub async fn get_user(pool: &SqlitePool, user_id: &str) -> Result<User, AppError> {
    let row = sqlx::query(&format!("{SELECT_USERS} WHERE id = ?"))
        .bind(user_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound("unknown_user".to_string()))?;

    Ok(row_to_user(row))
}

pub async fn find_by_username(pool: &SqlitePool, username: &str) -> Result<Option<User>, AppError> {
    let row = sqlx::query(&format!("{SELECT_USERS} WHERE username = ?"))
        .bind(username)
        .fetch_optional(pool)
        .await?;

    Ok(row.map(row_to_user))
}

pub async fn create_user(
    pool: &SqlitePool,
    input: &CreateUser,
    password_hash: &str,
) -> Result<User, AppError> {
    let id = super::new_id();
    let now = super::now();

    sqlx::query(
        "INSERT INTO users (id, username, display_name, password_hash, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(&input.username)
    .bind(&input.display_name)
    .bind(password_hash)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await
    .map_err(|e| match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            AppError::Conflict("username already taken".to_string())
        }
        _ => AppError::from(e),
    })?;

    get_user(pool, &id).await
}

/// User id and password hash for a login attempt.
pub async fn get_credentials(
    pool: &SqlitePool,
    username: &str,
) -> Result<Option<(String, String)>, AppError> {
    let row = sqlx::query_as::<_, (String, String)>(
        "SELECT id, password_hash FROM users WHERE username = ? AND password_hash IS NOT NULL",
    )
    .bind(username)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}
