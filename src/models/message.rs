use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    System,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Text => "text",
            MessageKind::System => "system",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "system" => MessageKind::System,
            _ => MessageKind::Text,
        }
    }
}

/// A persisted chat message as delivered to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub chat_id: String,
    pub sender_id: String,
    pub username: String,
    pub text: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
}

/// Input to the message store. The store assigns `id` and `timestamp`.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub chat_id: String,
    pub sender_id: String,
    pub username: String,
    pub text: String,
    pub reply_to: Option<String>,
    pub kind: MessageKind,
}

/// Sender id and name used for membership notices.
pub const SYSTEM_SENDER_ID: &str = "system";
pub const SYSTEM_USERNAME: &str = "System";

impl NewMessage {
    pub fn system(chat_id: &str, text: String) -> Self {
        Self {
            chat_id: chat_id.to_string(),
            sender_id: SYSTEM_SENDER_ID.to_string(),
            username: SYSTEM_USERNAME.to_string(),
            text,
            reply_to: None,
            kind: MessageKind::System,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub text: String,
    pub reply_to: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePage {
    pub messages: Vec<Message>,
    pub has_more: bool,
}
