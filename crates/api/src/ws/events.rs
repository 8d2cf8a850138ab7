use serde::{Deserialize, Serialize};
use vitalis_services::dao::message::AttachmentInput;

use crate::routes::message::MessageResponse;

/// Events a client may send over the socket. Frames are JSON objects of
/// the shape `{"type": "...", "data": {...}}`; unknown fields inside the
/// payloads are ignored, so legacy clients that echo sender identity are
/// accepted while the echoed identity itself is never trusted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum ClientEvent {
    Join(JoinPayload),
    JoinChat(JoinChatPayload),
    Message(MessagePayload),
    Typing(TypingPayload),
    Status(StatusPayload),
    Ping,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinPayload {
    pub tenant_id: String,
    pub user_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinChatPayload {
    pub chat_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePayload {
    pub chat_id: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub attachments: Vec<AttachmentInput>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingPayload {
    pub chat_id: String,
    pub is_typing: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusPayload {
    pub value: String,
}

/// Events the server pushes to clients, in the same `{"type", "data"}`
/// framing.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum ServerEvent {
    Connected(ConnectedPayload),
    Joined(JoinedPayload),
    NewMessage(MessageResponse),
    ChatUpdated(ChatUpdatedPayload),
    UserTyping(UserTypingPayload),
    UserStatus(UserStatusPayload),
    UserDisconnected(UserDisconnectedPayload),
    Pong(PongPayload),
    Error(ErrorPayload),
}

impl ClientEvent {
    /// Wire tag, for logging without payload contents.
    pub fn kind(&self) -> &'static str {
        match self {
            ClientEvent::Join(_) => "join",
            ClientEvent::JoinChat(_) => "joinChat",
            ClientEvent::Message(_) => "message",
            ClientEvent::Typing(_) => "typing",
            ClientEvent::Status(_) => "status",
            ClientEvent::Ping => "ping",
        }
    }
}

impl ServerEvent {
    pub fn error(message: impl Into<String>) -> Self {
        ServerEvent::Error(ErrorPayload {
            message: message.into(),
        })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectedPayload {
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinedPayload {
    pub tenant_id: String,
    pub general_chat_id: String,
}

/// Partial conversation update. Only the fields that changed are set, so
/// clients can patch their chat list without a refetch.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatUpdatedPayload {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub participants: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unread_count: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserTypingPayload {
    pub chat_id: String,
    pub user_id: String,
    pub is_typing: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStatusPayload {
    pub user_id: String,
    pub status: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDisconnectedPayload {
    pub user_id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PongPayload {
    pub timestamp: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    pub message: String,
}
