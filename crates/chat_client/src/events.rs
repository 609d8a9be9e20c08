use chat_shared::{
    domain::{FriendEntry, FriendRequest, TranscriptEntry, UserId},
    error::ApiError,
};

use crate::{summaries::SummaryListState, transport::ConnectionState};

/// Everything the presentation layer needs to repaint. Delivered on the
/// broadcast channel returned by `ChatClient::subscribe_events`.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    SessionStarted {
        user_id: UserId,
        username: String,
    },
    /// Presentation-only status line ("Connected to server", ...).
    SystemNotice(String),
    ConnectionStateChanged(ConnectionState),
    /// The transcript was replaced wholesale (peer switch or history load).
    TranscriptReset {
        peer_id: Option<UserId>,
        entries: Vec<TranscriptEntry>,
    },
    TranscriptAppended {
        peer_id: Option<UserId>,
        entry: TranscriptEntry,
    },
    FriendListChanged(Vec<FriendEntry>),
    FriendRequestsChanged(Vec<FriendRequest>),
    SummariesChanged(SummaryListState),
    /// The credential is gone; the UI returns to its login state.
    AuthRequired,
    LoggedOut,
    Error(ApiError),
}
