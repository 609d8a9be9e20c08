use chrono::{serde::ts_milliseconds, DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{
    ConversationSummary, FriendEntry, FriendRequest, FriendRequestStatus, HistoricalMessage,
    PresenceStatus, UserId,
};

/// Separator between the peer id and the content of an outbound frame.
///
/// Content is not escaped; a reader can only recover it by splitting on the
/// first occurrence.
pub const OUTBOUND_DELIMITER: char = '|';

/// Common `{success, message}` header of every gateway HTTP response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialsForm {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginReply {
    pub token: String,
    pub user_id: UserId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterReply {
    pub user_id: UserId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddFriendForm {
    pub token: String,
    pub friend_id: UserId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandleRequestForm {
    pub token: String,
    /// The gateway keys pending requests by the sender's user id.
    pub request_id: UserId,
    pub accept: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FriendPayload {
    pub user_id: UserId,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<i64>,
}

impl From<FriendPayload> for FriendEntry {
    fn from(value: FriendPayload) -> Self {
        Self {
            user_id: value.user_id,
            username: value.username,
            presence: value.status.map(PresenceStatus::from_code),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FriendListReply {
    #[serde(default)]
    pub friends: Vec<FriendPayload>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FriendRequestPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<i64>,
    pub sender_id: UserId,
    pub sender_username: String,
}

impl From<FriendRequestPayload> for FriendRequest {
    fn from(value: FriendRequestPayload) -> Self {
        Self {
            sender_id: value.sender_id,
            sender_username: value.sender_username,
            status: FriendRequestStatus::Pending,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FriendRequestsReply {
    #[serde(default)]
    pub requests: Vec<FriendRequestPayload>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryMessagePayload {
    pub from: UserId,
    pub content: String,
    #[serde(with = "ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}

impl From<HistoryMessagePayload> for HistoricalMessage {
    fn from(value: HistoryMessagePayload) -> Self {
        Self {
            from: value.from,
            content: value.content,
            timestamp: value.timestamp,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoryReply {
    #[serde(default)]
    pub messages: Vec<HistoryMessagePayload>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionPayload {
    pub peer_id: UserId,
    pub last_msg: String,
    #[serde(with = "ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}

impl From<SessionPayload> for ConversationSummary {
    fn from(value: SessionPayload) -> Self {
        Self {
            peer_id: value.peer_id,
            last_message: value.last_msg,
            timestamp: value.timestamp,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionsReply {
    #[serde(default)]
    pub sessions: Vec<SessionPayload>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct InboundPayload {
    from: UserId,
    content: String,
}

/// One inbound realtime frame after decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Structured { from: UserId, content: String },
    /// Raw text of a frame that is not a `{from, content}` object.
    Opaque { text: String },
}

impl Frame {
    pub fn decode(raw: &str) -> Self {
        match serde_json::from_str::<InboundPayload>(raw) {
            Ok(payload) => Self::Structured {
                from: payload.from,
                content: payload.content,
            },
            Err(_) => Self::Opaque {
                text: raw.to_string(),
            },
        }
    }
}

pub fn encode_outbound(peer_id: UserId, content: &str) -> String {
    format!("{peer_id}{OUTBOUND_DELIMITER}{content}")
}
