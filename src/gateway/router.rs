use std::sync::Arc;

use super::access::{AccessGate, MessageStore};
use super::events::{error_text, Command, Envelope};
use super::hub::Hub;
use super::session::{Identity, SessionId};
use super::GatewayError;
use crate::models::message::{Message, MessageKind, NewMessage};

/// Turns decoded envelopes into hub operations on behalf of one session.
pub struct CommandRouter {
    hub: Hub,
    gate: AccessGate,
    messages: Arc<dyn MessageStore>,
}

impl CommandRouter {
    pub fn new(hub: Hub, gate: AccessGate, messages: Arc<dyn MessageStore>) -> Self {
        Self {
            hub,
            gate,
            messages,
        }
    }

    /// Handle one inbound envelope. Failures that concern the sender become an
    /// error envelope delivered to that session only.
    pub async fn dispatch(&self, session_id: SessionId, identity: &Identity, envelope: Envelope) {
        let result = match Command::from_envelope(envelope) {
            Ok(command) => self.execute(session_id, identity, command).await,
            Err(e) => Err(e.into()),
        };

        let Err(e) = result else {
            return;
        };
        match &e {
            GatewayError::Authorization(denial) => tracing::warn!(
                session_id = %session_id,
                user_id = %identity.user_id,
                "command denied: {denial}"
            ),
            GatewayError::Persistence(err) => tracing::error!(
                session_id = %session_id,
                user_id = %identity.user_id,
                "message not stored: {err}"
            ),
            other => tracing::debug!(session_id = %session_id, "rejected command: {other}"),
        }
        if let Some(reply) = e.reply() {
            self.hub.deliver(session_id, reply).await;
        }
    }

    async fn execute(
        &self,
        session_id: SessionId,
        identity: &Identity,
        command: Command,
    ) -> Result<(), GatewayError> {
        tracing::trace!(session_id = %session_id, command = command.name(), "dispatch");
        match command {
            Command::JoinRoom { chat_id } => {
                self.gate.check(&chat_id, &identity.user_id).await?;
                self.hub.join_room(&chat_id, session_id).await;
                self.hub
                    .deliver(session_id, Envelope::joined_chat(&chat_id))
                    .await;
            }
            Command::LeaveRoom { chat_id } => {
                self.hub.leave_room(&chat_id, session_id).await;
                self.hub
                    .deliver(session_id, Envelope::left_chat(&chat_id))
                    .await;
            }
            Command::SendMessage {
                chat_id,
                text,
                reply_to,
            } => {
                self.post_message(identity, &chat_id, &text, reply_to)
                    .await?;
            }
            Command::Typing { chat_id } => {
                // No membership re-check for typing indicators.
                self.hub
                    .broadcast(Envelope::user_typing(
                        &chat_id,
                        &identity.user_id,
                        &identity.display_name,
                    ))
                    .await;
            }
        }
        Ok(())
    }

    /// Check access, store and fan out a user message. Shared by the socket
    /// command and the REST endpoint.
    pub async fn post_message(
        &self,
        identity: &Identity,
        chat_id: &str,
        text: &str,
        reply_to: Option<String>,
    ) -> Result<Message, GatewayError> {
        self.gate.check(chat_id, &identity.user_id).await?;

        let text = text.trim();
        if text.is_empty() {
            return Err(GatewayError::Validation(error_text::EMPTY_TEXT.into()));
        }

        let message = self
            .messages
            .persist_message(NewMessage {
                chat_id: chat_id.to_string(),
                sender_id: identity.user_id.clone(),
                username: identity.display_name.clone(),
                text: text.to_string(),
                reply_to,
                kind: MessageKind::Text,
            })
            .await
            .map_err(GatewayError::Persistence)?;

        self.hub.broadcast(Envelope::new_message(&message)).await;
        Ok(message)
    }

    /// Store a membership notice and fan it out to the room.
    pub async fn announce(&self, chat_id: &str, text: String) -> Result<Message, GatewayError> {
        let message = self
            .messages
            .persist_message(NewMessage::system(chat_id, text))
            .await
            .map_err(GatewayError::Persistence)?;
        self.hub.broadcast(Envelope::new_message(&message)).await;
        Ok(message)
    }
}
