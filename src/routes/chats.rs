use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;

use crate::db;
use crate::error::AppError;
use crate::middleware::auth::AuthUser;
use crate::models::chat::{
    AddMember, Chat, ChatInfo, ChatMember, ChatType, CreateChat, MemberRole, UpdateChat,
};
use crate::models::user::User;
use crate::state::AppState;

/// The caller's membership row. 404 for an unknown chat, 403 for a stranger.
pub(super) async fn require_member(
    state: &AppState,
    chat_id: &str,
    user_id: &str,
) -> Result<(Chat, ChatMember), AppError> {
    let chat = db::chats::get_chat(&state.db, chat_id).await?;
    let member = db::members::get_member(&state.db, chat_id, user_id)
        .await?
        .ok_or_else(|| AppError::Forbidden("not a member of this chat".to_string()))?;
    Ok((chat, member))
}

async fn require_admin(
    state: &AppState,
    chat_id: &str,
    user_id: &str,
) -> Result<Chat, AppError> {
    let (chat, member) = require_member(state, chat_id, user_id).await?;
    if member.role != MemberRole::Admin {
        return Err(AppError::Forbidden("only chat admins can do this".to_string()));
    }
    Ok(chat)
}

/// Store and fan out a membership notice. The membership change has already
/// happened, so a failure here is only logged.
async fn announce(state: &AppState, chat_id: &str, text: String) {
    if let Err(e) = state.router.announce(chat_id, text).await {
        tracing::error!(chat_id = %chat_id, "failed to record membership notice: {e}");
    }
}

pub async fn create_chat(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(input): Json<CreateChat>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    let creator = db::users::get_user(&state.db, &auth.user_id).await?;

    let name = input.name.trim();
    let description = input
        .description
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty());

    match input.chat_type {
        ChatType::Group => {
            if name.is_empty() {
                return Err(AppError::BadRequest("group chats need a name".to_string()));
            }

            let mut members: Vec<User> = Vec::new();
            for username in &input.members {
                let Some(user) = db::users::find_by_username(&state.db, username.trim()).await?
                else {
                    continue;
                };
                if user.id != creator.id && !members.iter().any(|m| m.id == user.id) {
                    members.push(user);
                }
            }

            let chat = db::chats::create_chat(
                &state.db,
                &creator,
                ChatType::Group,
                name,
                description,
                &members,
            )
            .await?;
            for member in &members {
                announce(&state, &chat.id, format!("{} was added to the chat", member.username))
                    .await;
            }

            tracing::info!(chat_id = %chat.id, user_id = %creator.id, "group chat created");
            Ok((StatusCode::CREATED, Json(serde_json::json!({ "data": chat }))))
        }
        ChatType::Private => {
            let [other] = input.members.as_slice() else {
                return Err(AppError::BadRequest(
                    "private chat must have exactly one other member".to_string(),
                ));
            };
            let other = db::users::find_by_username(&state.db, other.trim())
                .await?
                .ok_or_else(|| AppError::NotFound(format!("user {other} not found")))?;
            if other.id == creator.id {
                return Err(AppError::BadRequest(
                    "private chat must have exactly one other member".to_string(),
                ));
            }

            if let Some(existing) =
                db::chats::find_private_chat(&state.db, &creator.id, &other.id).await?
            {
                return Ok((StatusCode::OK, Json(serde_json::json!({ "data": existing }))));
            }

            let chat = db::chats::create_chat(
                &state.db,
                &creator,
                ChatType::Private,
                "",
                description,
                std::slice::from_ref(&other),
            )
            .await?;
            Ok((StatusCode::CREATED, Json(serde_json::json!({ "data": chat }))))
        }
    }
}

pub async fn list_chats(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<serde_json::Value>, AppError> {
    let chats = db::chats::list_chats_for_user(&state.db, &auth.user_id).await?;
    Ok(Json(serde_json::json!({ "data": chats })))
}

pub async fn get_chat(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
    auth: AuthUser,
) -> Result<Json<serde_json::Value>, AppError> {
    let (chat, _) = require_member(&state, &chat_id, &auth.user_id).await?;
    let members = db::members::list_members(&state.db, &chat_id).await?;
    let info = ChatInfo { chat, members };
    Ok(Json(serde_json::json!({ "data": info })))
}

pub async fn update_chat(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
    auth: AuthUser,
    Json(input): Json<UpdateChat>,
) -> Result<Json<serde_json::Value>, AppError> {
    if input.is_empty() {
        return Err(AppError::BadRequest("nothing to update".to_string()));
    }
    if input.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
        return Err(AppError::BadRequest("name cannot be empty".to_string()));
    }

    require_admin(&state, &chat_id, &auth.user_id).await?;
    let chat = db::chats::update_chat(&state.db, &chat_id, &input).await?;
    Ok(Json(serde_json::json!({ "data": chat })))
}

pub async fn delete_chat(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
    auth: AuthUser,
) -> Result<StatusCode, AppError> {
    let chat = db::chats::get_chat(&state.db, &chat_id).await?;
    if chat.created_by != auth.user_id {
        return Err(AppError::Forbidden(
            "only the creator can delete a chat".to_string(),
        ));
    }

    db::chats::delete_chat(&state.db, &chat_id).await?;
    tracing::info!(chat_id = %chat_id, user_id = %auth.user_id, "chat deleted");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn add_member(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
    auth: AuthUser,
    Json(input): Json<AddMember>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    let chat = require_admin(&state, &chat_id, &auth.user_id).await?;
    if chat.chat_type != ChatType::Group {
        return Err(AppError::BadRequest(
            "members can only be added to group chats".to_string(),
        ));
    }

    let user = db::users::find_by_username(&state.db, input.username.trim())
        .await?
        .ok_or_else(|| AppError::NotFound("unknown_user".to_string()))?;
    if db::members::is_member(&state.db, &chat_id, &user.id).await? {
        return Err(AppError::Conflict("user is already a member".to_string()));
    }

    db::members::add_member(&state.db, &chat_id, &user.id, &user.username, MemberRole::Member)
        .await?;
    announce(&state, &chat_id, format!("{} was added to the chat", user.username)).await;

    let member = db::members::get_member(&state.db, &chat_id, &user.id)
        .await?
        .ok_or_else(|| AppError::Internal("member vanished after insert".to_string()))?;
    Ok((StatusCode::CREATED, Json(serde_json::json!({ "data": member }))))
}

pub async fn remove_member(
    State(state): State<AppState>,
    Path((chat_id, user_id)): Path<(String, String)>,
    auth: AuthUser,
) -> Result<StatusCode, AppError> {
    let chat = require_admin(&state, &chat_id, &auth.user_id).await?;
    if chat.chat_type != ChatType::Group {
        return Err(AppError::BadRequest(
            "members can only be removed from group chats".to_string(),
        ));
    }
    if user_id == chat.created_by {
        return Err(AppError::Forbidden(
            "the chat creator cannot be removed".to_string(),
        ));
    }

    let target = db::members::get_member(&state.db, &chat_id, &user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("member not found".to_string()))?;
    db::members::remove_member(&state.db, &chat_id, &user_id).await?;
    announce(&state, &chat_id, format!("{} was removed from the chat", target.username)).await;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn leave_chat(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
    auth: AuthUser,
) -> Result<StatusCode, AppError> {
    let (chat, member) = require_member(&state, &chat_id, &auth.user_id).await?;
    if chat.chat_type == ChatType::Group && chat.created_by == auth.user_id {
        return Err(AppError::Forbidden(
            "the creator cannot leave a group chat".to_string(),
        ));
    }

    db::members::remove_member(&state.db, &chat_id, &auth.user_id).await?;
    if chat.chat_type == ChatType::Group {
        announce(&state, &chat_id, format!("{} left the chat", member.username)).await;
    }

    Ok(StatusCode::NO_CONTENT)
}
