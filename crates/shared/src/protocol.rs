use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{ClientId, ConversationKey, ParticipantRole};

/// One chat message as seen on the wire and in history responses.
/// The timestamp is always server-assigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub sender: ParticipantRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// Server-to-client notice on a room socket. The only kind emitted
/// today tells the sender its message was not durably stored; a
/// fan-out miss is silent by design.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomNotice {
    #[serde(rename = "type")]
    pub kind: RoomNoticeKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomNoticeKind {
    Error,
}

impl RoomNotice {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: RoomNoticeKind::Error,
            message: message.into(),
        }
    }
}

/// Every frame a room socket can receive. A `ChatMessage` serializes
/// as the bare `{sender, content, timestamp}` object; notices carry a
/// `type` field, which is how the two are told apart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RoomFrame {
    Notice(RoomNotice),
    Message(ChatMessage),
}

/// Payload of the lawyer-wide monitor channel. Not persisted: a frame
/// missed while the socket is down is gone, and the conversation-list
/// poll is the recovery path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MonitorEvent {
    NewMessage {
        conversation: ConversationKey,
        message: ChatMessage,
    },
}

/// One entry of the lawyer's polled conversation list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub client_id: ClientId,
    pub messages: Vec<ChatMessage>,
    pub last_updated: DateTime<Utc>,
}
