use sqlx::{Row, SqlitePool};

use crate::error::AppError;
use crate::models::chat::{ChatMember, MemberRole};

fn row_to_member(row: sqlx::sqlite::SqliteRow) -> ChatMember {
    let role: String = row.get("role");
    ChatMember {
        chat_id: row.get("chat_id"),
        user_id: row.get("user_id"),
        username: row.get("username"),
        role: MemberRole::parse(&role),
        joined_at: row.get("joined_at"),
    }
}

const SELECT_MEMBERS: &str = "SELECT chat_id, user_id, username, role, joined_at FROM chat_members";

pub async fn list_members(pool: &SqlitePool, chat_id: &str) -> Result<Vec<ChatMember>, AppError> {
    let rows = sqlx::query(&format!(
        "{SELECT_MEMBERS} WHERE chat_id = ? ORDER BY joined_at ASC, rowid ASC"
    ))
    .bind(chat_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(row_to_member).collect())
}

pub async fn get_member(
    pool: &SqlitePool,
    chat_id: &str,
    user_id: &str,
) -> Result<Option<ChatMember>, AppError> {
    let row = sqlx::query(&format!("{SELECT_MEMBERS} WHERE chat_id = ? AND user_id = ?"))
        .bind(chat_id)
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

    Ok(row.map(row_to_member))
}

pub async fn is_member(pool: &SqlitePool, chat_id: &str, user_id: &str) -> Result<bool, AppError> {
    let found = sqlx::query_scalar::<_, i64>(
        "SELECT 1 FROM chat_members WHERE chat_id = ? AND user_id = ?",
    )
    .bind(chat_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    Ok(found.is_some())
}

pub async fn add_member(
    pool: &SqlitePool,
    chat_id: &str,
    user_id: &str,
    username: &str,
    role: MemberRole,
) -> Result<(), AppError> {
    sqlx::query(
        "INSERT OR IGNORE INTO chat_members (chat_id, user_id, username, role, joined_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(chat_id)
    .bind(user_id)
    .bind(username)
    .bind(role.as_str())
    .bind(super::now())
    .execute(pool)
    .await?;

    refresh_member_count(pool, chat_id).await
}

/// Returns false if the user was not a member.
pub async fn remove_member(pool: &SqlitePool, chat_id: &str, user_id: &str) -> Result<bool, AppError> {
    let result = sqlx::query("DELETE FROM chat_members WHERE chat_id = ? AND user_id = ?")
        .bind(chat_id)
        .bind(user_id)
        .execute(pool)
        .await?;

    refresh_member_count(pool, chat_id).await?;
    Ok(result.rows_affected() > 0)
}

async fn refresh_member_count(pool: &SqlitePool, chat_id: &str) -> Result<(), AppError> {
    sqlx::query(
        "UPDATE chats SET member_count = (SELECT COUNT(*) FROM chat_members WHERE chat_id = ?), updated_at = ? WHERE id = ?",
    )
    .bind(chat_id)
    .bind(super::now())
    .bind(chat_id)
    .execute(pool)
    .await?;
    Ok(())
}
