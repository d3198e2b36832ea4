use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use crate::db;
use crate::error::AppError;
use crate::middleware::auth::AuthUser;
use crate::models::message::{MessagePage, SendMessageRequest};
use crate::state::AppState;

const DEFAULT_PAGE: i64 = 50;
const MAX_PAGE: i64 = 100;

#[derive(Debug, Deserialize)]
pub struct ListMessagesQuery {
    pub limit: Option<i64>,
    pub before: Option<String>,
}

fn page_size(requested: Option<i64>) -> i64 {
    requested
        .filter(|n| (1..=MAX_PAGE).contains(n))
        .unwrap_or(DEFAULT_PAGE)
}

pub async fn list_messages(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
    auth: AuthUser,
    Query(query): Query<ListMessagesQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    super::chats::require_member(&state, &chat_id, &auth.user_id).await?;

    let (messages, has_more) = db::messages::list_messages(
        &state.db,
        &chat_id,
        query.before.as_deref(),
        page_size(query.limit),
    )
    .await?;

    let page = MessagePage { messages, has_more };
    Ok(Json(serde_json::json!({ "data": page })))
}

/// Same path as the `send_message` socket command: subscribers of the room
/// receive the stored message as `new_message`.
pub async fn send_message(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
    auth: AuthUser,
    Json(input): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    db::chats::get_chat(&state.db, &chat_id).await?;

    let reply_to = input.reply_to.filter(|r| !r.trim().is_empty());
    let message = state
        .router
        .post_message(&auth.identity(), &chat_id, &input.text, reply_to)
        .await?;

    Ok((StatusCode::CREATED, Json(serde_json::json!({ "data": message }))))
}
