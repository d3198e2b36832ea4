use serde::{Deserialize, Serialize};

use super::message::Message;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatType {
    Private,
    Group,
}

impl ChatType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatType::Private => "private",
            ChatType::Group => "group",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "private" => Some(ChatType::Private),
            "group" => Some(ChatType::Group),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberRole {
    Admin,
    Member,
}

impl MemberRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemberRole::Admin => "admin",
            MemberRole::Member => "member",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "admin" => MemberRole::Admin,
            _ => MemberRole::Member,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub chat_type: ChatType,
    pub created_by: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    pub member_count: i64,
    pub created_at: String,
    pub updated_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_message: Option<Message>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMember {
    pub chat_id: String,
    pub user_id: String,
    pub username: String,
    pub role: MemberRole,
    pub joined_at: String,
}

#[derive(Debug, Serialize)]
pub struct ChatInfo {
    pub chat: Chat,
    pub members: Vec<ChatMember>,
}

#[derive(Debug, Deserialize)]
pub struct CreateChat {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub chat_type: ChatType,
    #[serde(default)]
    pub members: Vec<String>,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateChat {
    pub name: Option<String>,
    pub description: Option<String>,
    pub avatar: Option<String>,
}

impl UpdateChat {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.description.is_none() && self.avatar.is_none()
    }
}

#[derive(Debug, Deserialize)]
pub struct AddMember {
    pub username: String,
}
