use serde::{Deserialize, Serialize};

use crate::models::message::Message;

/// Event types emitted by the server.
pub mod event_type {
    pub const JOINED_CHAT: &str = "joined_chat";
    pub const LEFT_CHAT: &str = "left_chat";
    pub const NEW_MESSAGE: &str = "new_message";
    pub const USER_TYPING: &str = "user_typing";
    pub const ERROR: &str = "error";
}

/// Error strings sent back to the originating session.
pub mod error_text {
    pub const ACCESS_DENIED: &str = "Access denied";
    pub const UNKNOWN_TYPE: &str = "Unknown message type";
    pub const INVALID_FORMAT: &str = "Invalid message format";
    pub const INVALID_CHAT_ID: &str = "Invalid chat ID";
    pub const INVALID_MESSAGE_DATA: &str = "Invalid message data";
    pub const EMPTY_TEXT: &str = "Message text cannot be empty";
    pub const SEND_FAILED: &str = "Failed to send message";
}

/// Wire-level unit exchanged in both directions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(rename = "chatId", default, skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Envelope {
    fn new(kind: &str, chat_id: Option<&str>, data: Option<serde_json::Value>) -> Self {
        Self {
            kind: kind.to_string(),
            chat_id: chat_id.map(str::to_string),
            data,
            error: None,
        }
    }

    pub fn joined_chat(chat_id: &str) -> Self {
        Self::new(event_type::JOINED_CHAT, Some(chat_id), None)
    }

    pub fn left_chat(chat_id: &str) -> Self {
        Self::new(event_type::LEFT_CHAT, Some(chat_id), None)
    }

    pub fn new_message(message: &Message) -> Self {
        Self::new(
            event_type::NEW_MESSAGE,
            Some(&message.chat_id),
            serde_json::to_value(message).ok(),
        )
    }

    pub fn user_typing(chat_id: &str, user_id: &str, display_name: &str) -> Self {
        Self::new(
            event_type::USER_TYPING,
            Some(chat_id),
            Some(serde_json::json!({
                "userId": user_id,
                "displayName": display_name,
            })),
        )
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: event_type::ERROR.to_string(),
            chat_id: None,
            data: None,
            error: Some(message.into()),
        }
    }

    /// Decode a text frame. Anything that is not a JSON object with a string
    /// `type` is rejected.
    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// Inbound command vocabulary.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    JoinRoom {
        chat_id: String,
    },
    LeaveRoom {
        chat_id: String,
    },
    SendMessage {
        chat_id: String,
        text: String,
        reply_to: Option<String>,
    },
    Typing {
        chat_id: String,
    },
}

/// Why an envelope could not be turned into a [`Command`]. The display text is
/// what the sender sees.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CommandError {
    #[error("Unknown message type")]
    UnknownType(String),
    #[error("Invalid chat ID")]
    MissingChatId,
    #[error("Invalid message data")]
    InvalidMessageData,
}

#[derive(Deserialize)]
struct SendMessageData {
    #[serde(rename = "chatId", default)]
    chat_id: Option<String>,
    text: String,
    #[serde(rename = "replyTo", default)]
    reply_to: Option<String>,
}

impl Command {
    pub fn from_envelope(envelope: Envelope) -> Result<Self, CommandError> {
        match envelope.kind.as_str() {
            "join_room" | "join_chat" => Ok(Command::JoinRoom {
                chat_id: room_target(&envelope)?,
            }),
            "leave_room" | "leave_chat" => Ok(Command::LeaveRoom {
                chat_id: room_target(&envelope)?,
            }),
            "typing" => Ok(Command::Typing {
                chat_id: room_target(&envelope)?,
            }),
            "send_message" => {
                let data = envelope
                    .data
                    .clone()
                    .ok_or(CommandError::InvalidMessageData)?;
                let data: SendMessageData = serde_json::from_value(data)
                    .map_err(|_| CommandError::InvalidMessageData)?;
                let chat_id = non_empty(envelope.chat_id.clone())
                    .or_else(|| non_empty(data.chat_id))
                    .ok_or(CommandError::MissingChatId)?;
                Ok(Command::SendMessage {
                    chat_id,
                    text: data.text,
                    reply_to: non_empty(data.reply_to),
                })
            }
            other => Err(CommandError::UnknownType(other.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Command::JoinRoom { .. } => "join_room",
            Command::LeaveRoom { .. } => "leave_room",
            Command::SendMessage { .. } => "send_message",
            Command::Typing { .. } => "typing",
        }
    }
}

/// Room commands take the chat id from `chatId`, or from a bare string in `data`.
fn room_target(envelope: &Envelope) -> Result<String, CommandError> {
    non_empty(envelope.chat_id.clone())
        .or_else(|| match &envelope.data {
            Some(serde_json::Value::String(s)) => non_empty(Some(s.clone())),
            _ => None,
        })
        .ok_or(CommandError::MissingChatId)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}
