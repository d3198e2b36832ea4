use sqlx::{Row, SqlitePool};

use crate::error::AppError;
use crate::models::chat::{Chat, ChatType, MemberRole, UpdateChat};
use crate::models::user::User;

fn row_to_chat(row: sqlx::sqlite::SqliteRow) -> Chat {
    let chat_type: String = row.get("type");
    Chat {
        id: row.get("id"),
        name: row.get("name"),
        chat_type: ChatType::parse(&chat_type).unwrap_or(ChatType::Group),
        created_by: row.get("created_by"),
        description: row.get("description"),
        avatar: row.get("avatar"),
        member_count: row.get("member_count"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        last_message: None,
    }
}

const SELECT_CHATS: &str = "SELECT c.id, c.name, c.type, c.created_by, c.description, c.avatar, c.member_count, c.created_at, c.updated_at FROM chats c";

pub async fn get_chat(pool: &SqlitePool, chat_id: &str) -> Result<Chat, AppError> {
    let row = sqlx::query(&format!("{SELECT_CHATS} WHERE c.id = ?"))
        .bind(chat_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound("unknown_chat".to_string()))?;

    Ok(row_to_chat(row))
}

/// Create a chat with `creator` as admin and `members` as plain members.
pub async fn create_chat(
    pool: &SqlitePool,
    creator: &User,
    chat_type: ChatType,
    name: &str,
    description: Option<&str>,
    members: &[User],
) -> Result<Chat, AppError> {
    let id = super::new_id();
    let now = super::now();
    let mut tx = pool.begin().await?;

    sqlx::query(
        "INSERT INTO chats (id, name, type, created_by, description, member_count, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(name)
    .bind(chat_type.as_str())
    .bind(&creator.id)
    .bind(description)
    .bind(members.len() as i64 + 1)
    .bind(&now)
    .bind(&now)
    .execute(&mut *tx)
    .await?;

    let everyone = std::iter::once((creator, MemberRole::Admin))
        .chain(members.iter().map(|m| (m, MemberRole::Member)));
    for (user, role) in everyone {
        sqlx::query(
            "INSERT INTO chat_members (chat_id, user_id, username, role, joined_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(&user.id)
        .bind(&user.username)
        .bind(role.as_str())
        .bind(&now)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    get_chat(pool, &id).await
}

/// The existing private chat between two users, if any.
pub async fn find_private_chat(
    pool: &SqlitePool,
    user_a: &str,
    user_b: &str,
) -> Result<Option<Chat>, AppError> {
    let row = sqlx::query(&format!(
        "{SELECT_CHATS} \
         JOIN chat_members a ON a.chat_id = c.id AND a.user_id = ? \
         JOIN chat_members b ON b.chat_id = c.id AND b.user_id = ? \
         WHERE c.type = 'private' LIMIT 1"
    ))
    .bind(user_a)
    .bind(user_b)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(row_to_chat))
}

/// Chats `user_id` belongs to, most recently active first, with their
/// latest message.
pub async fn list_chats_for_user(pool: &SqlitePool, user_id: &str) -> Result<Vec<Chat>, AppError> {
    let rows = sqlx::query(&format!(
        "{SELECT_CHATS} JOIN chat_members m ON m.chat_id = c.id \
         WHERE m.user_id = ? ORDER BY c.updated_at DESC"
    ))
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    let mut chats = Vec::with_capacity(rows.len());
    for row in rows {
        let mut chat = row_to_chat(row);
        chat.last_message = super::messages::latest_message(pool, &chat.id).await?;
        chats.push(chat);
    }
    Ok(chats)
}

pub async fn update_chat(
    pool: &SqlitePool,
    chat_id: &str,
    input: &UpdateChat,
) -> Result<Chat, AppError> {
    let mut sets = Vec::new();
    let mut values: Vec<Option<String>> = Vec::new();

    if let Some(ref name) = input.name {
        sets.push("name = ?");
        values.push(Some(name.trim().to_string()));
    }
    if let Some(ref description) = input.description {
        sets.push("description = ?");
        values.push(Some(description.clone()).filter(|d| !d.is_empty()));
    }
    if let Some(ref avatar) = input.avatar {
        sets.push("avatar = ?");
        values.push(Some(avatar.clone()).filter(|a| !a.is_empty()));
    }

    if !sets.is_empty() {
        let sql = format!("UPDATE chats SET {}, updated_at = ? WHERE id = ?", sets.join(", "));
        let mut query = sqlx::query(&sql);
        for v in &values {
            query = query.bind(v);
        }
        query
            .bind(super::now())
            .bind(chat_id)
            .execute(pool)
            .await?;
    }

    get_chat(pool, chat_id).await
}

/// Members and messages go with it.
pub async fn delete_chat(pool: &SqlitePool, chat_id: &str) -> Result<(), AppError> {
    let result = sqlx::query("DELETE FROM chats WHERE id = ?")
        .bind(chat_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("unknown_chat".to_string()));
    }
    Ok(())
}
