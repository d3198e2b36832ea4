use sqlx::{Row, SqlitePool};

use crate::error::AppError;
use crate::models::message::{Message, MessageKind, NewMessage};

fn row_to_message(row: sqlx::sqlite::SqliteRow) -> Message {
    let kind: String = row.get("type");
    Message {
        id: row.get("id"),
        chat_id: row.get("chat_id"),
        sender_id: row.get("sender_id"),
        username: row.get("username"),
        text: row.get("text"),
        kind: MessageKind::parse(&kind),
        timestamp: row.get("created_at"),
        reply_to: row.get("reply_to"),
    }
}

const SELECT_MESSAGES: &str =
    "SELECT id, chat_id, sender_id, username, text, type, reply_to, created_at FROM messages";

pub async fn get_message(pool: &SqlitePool, message_id: &str) -> Result<Message, AppError> {
    let row = sqlx::query(&format!("{SELECT_MESSAGES} WHERE id = ?"))
        .bind(message_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound("unknown_message".to_string()))?;

    Ok(row_to_message(row))
}

pub async fn create_message(pool: &SqlitePool, input: &NewMessage) -> Result<Message, AppError> {
    let id = super::new_id();
    let now = super::now();

    sqlx::query(
        "INSERT INTO messages (id, chat_id, sender_id, username, text, type, reply_to, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(&input.chat_id)
    .bind(&input.sender_id)
    .bind(&input.username)
    .bind(&input.text)
    .bind(input.kind.as_str())
    .bind(&input.reply_to)
    .bind(&now)
    .execute(pool)
    .await?;

    sqlx::query("UPDATE chats SET updated_at = ? WHERE id = ?")
        .bind(&now)
        .bind(&input.chat_id)
        .execute(pool)
        .await?;

    get_message(pool, &id).await
}

/// The `limit` newest messages older than `before` (by insertion order),
/// returned oldest first, and whether older ones remain.
pub async fn list_messages(
    pool: &SqlitePool,
    chat_id: &str,
    before: Option<&str>,
    limit: i64,
) -> Result<(Vec<Message>, bool), AppError> {
    let rows = if let Some(before_id) = before {
        sqlx::query(&format!(
            "{SELECT_MESSAGES} WHERE chat_id = ? AND rowid < (SELECT rowid FROM messages WHERE id = ?) ORDER BY rowid DESC LIMIT ?"
        ))
        .bind(chat_id)
        .bind(before_id)
        .bind(limit + 1)
        .fetch_all(pool)
        .await?
    } else {
        sqlx::query(&format!(
            "{SELECT_MESSAGES} WHERE chat_id = ? ORDER BY rowid DESC LIMIT ?"
        ))
        .bind(chat_id)
        .bind(limit + 1)
        .fetch_all(pool)
        .await?
    };

    let mut messages: Vec<Message> = rows.into_iter().map(row_to_message).collect();
    let has_more = messages.len() as i64 > limit;
    messages.truncate(limit as usize);
    messages.reverse();
    Ok((messages, has_more))
}

pub async fn latest_message(pool: &SqlitePool, chat_id: &str) -> Result<Option<Message>, AppError> {
    let row = sqlx::query(&format!(
        "{SELECT_MESSAGES} WHERE chat_id = ? ORDER BY rowid DESC LIMIT 1"
    ))
    .bind(chat_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(row_to_message))
}
