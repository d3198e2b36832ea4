//! Collaborator contracts consumed by the gateway, and the membership gate
//! built on top of them.

use async_trait::async_trait;
use std::sync::Arc;

use super::session::Identity;
use crate::error::AppError;
use crate::models::message::{Message, NewMessage};

/// Resolves a bearer credential to the identity bound to a session.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, credential: &str) -> Result<Identity, AppError>;
}

/// Durable record of who may access a chat.
#[async_trait]
pub trait MembershipStore: Send + Sync {
    async fn is_member(&self, chat_id: &str, user_id: &str) -> Result<bool, AppError>;
}

/// Durable message storage. Assigns id and timestamp.
#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn persist_message(&self, message: NewMessage) -> Result<Message, AppError>;
}

/// Why the gate said no. Both variants look the same to the client.
#[derive(Debug, thiserror::Error)]
pub enum Denial {
    #[error("user is not a member of this chat")]
    NotMember,
    #[error("membership check failed: {0}")]
    CheckFailed(AppError),
}

/// Authorization check against persisted chat membership.
#[derive(Clone)]
pub struct AccessGate {
    membership: Arc<dyn MembershipStore>,
}

impl AccessGate {
    pub fn new(membership: Arc<dyn MembershipStore>) -> Self {
        Self { membership }
    }

    pub async fn check(&self, chat_id: &str, user_id: &str) -> Result<(), Denial> {
        match self.membership.is_member(chat_id, user_id).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(Denial::NotMember),
            Err(e) => Err(Denial::CheckFailed(e)),
        }
    }
}
