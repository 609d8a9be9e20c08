use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_newtype!(UserId);

/// Authenticated identity. The same token backs every HTTP call and the
/// realtime handshake.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub token: String,
    pub user_id: UserId,
    pub username: String,
}

impl Credential {
    pub fn new(token: impl Into<String>, user_id: UserId, username: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            user_id,
            username: username.into(),
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"<redacted>")
            .field("user_id", &self.user_id)
            .field("username", &self.username)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceStatus {
    Offline,
    Online,
}

impl PresenceStatus {
    pub fn from_code(code: i64) -> Self {
        if code == 0 {
            Self::Offline
        } else {
            Self::Online
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FriendEntry {
    pub user_id: UserId,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presence: Option<PresenceStatus>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FriendRequestStatus {
    Pending,
}

/// Incoming friend request. Resolved requests are dropped from the local set,
/// so only `Pending` exists client-side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FriendRequest {
    pub sender_id: UserId,
    pub sender_username: String,
    pub status: FriendRequestStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoricalMessage {
    pub from: UserId,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveMessage {
    pub from: UserId,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub peer_id: UserId,
    pub last_message: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Author {
    /// Sent by the logged-in user.
    Me,
    Peer(UserId),
    /// Opaque realtime frame without sender attribution.
    Unattributed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub author: Author,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl TranscriptEntry {
    pub fn from_history(message: HistoricalMessage, me: UserId) -> Self {
        let author = if message.from == me {
            Author::Me
        } else {
            Author::Peer(message.from)
        };
        Self {
            author,
            content: message.content,
            timestamp: Some(message.timestamp),
        }
    }

    pub fn from_live(message: LiveMessage, received_at: DateTime<Utc>) -> Self {
        Self {
            author: Author::Peer(message.from),
            content: message.content,
            timestamp: Some(received_at),
        }
    }

    pub fn sent(content: impl Into<String>, sent_at: DateTime<Utc>) -> Self {
        Self {
            author: Author::Me,
            content: content.into(),
            timestamp: Some(sent_at),
        }
    }

    pub fn opaque(text: impl Into<String>) -> Self {
        Self {
            author: Author::Unattributed,
            content: text.into(),
            timestamp: None,
        }
    }
}
