//! SQLite-backed implementations of the gateway collaborator traits.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::error::AppError;
use crate::gateway::access::{Authenticator, MembershipStore, MessageStore};
use crate::gateway::session::Identity;
use crate::models::message::{Message, NewMessage};

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Authenticator for SqliteStore {
    async fn authenticate(&self, credential: &str) -> Result<Identity, AppError> {
        let user_id = super::tokens::resolve_token(&self.pool, credential)
            .await?
            .ok_or_else(|| AppError::Unauthorized("invalid or missing authentication".into()))?;
        let user = super::users::get_user(&self.pool, &user_id).await?;

        Ok(Identity {
            display_name: user.visible_name().to_string(),
            user_id: user.id,
        })
    }
}

#[async_trait]
impl MembershipStore for SqliteStore {
    async fn is_member(&self, chat_id: &str, user_id: &str) -> Result<bool, AppError> {
        super::members::is_member(&self.pool, chat_id, user_id).await
    }
}

#[async_trait]
impl MessageStore for SqliteStore {
    async fn persist_message(&self, message: NewMessage) -> Result<Message, AppError> {
        super::messages::create_message(&self.pool, &message).await
    }
}
