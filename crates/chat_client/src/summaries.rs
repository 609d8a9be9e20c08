use chat_shared::{domain::ConversationSummary, protocol::SessionsReply};
use tokio::sync::RwLock;
use tracing::warn;

use crate::{error::Result, http::GatewayHttp};

/// Load state of the recent-conversation list.
///
/// An empty `Loaded` is a real answer and is kept apart from `NotLoaded`,
/// `Loading`, and `Failed`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SummaryListState {
    #[default]
    NotLoaded,
    Loading,
    Loaded(Vec<ConversationSummary>),
    Failed(String),
}

/// What the list view should paint for a given state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummaryDisplay<'a> {
    Blank,
    Spinner,
    NoRecentSessions,
    Entries(&'a [ConversationSummary]),
    Error(&'a str),
}

impl SummaryListState {
    pub fn display(&self) -> SummaryDisplay<'_> {
        match self {
            Self::NotLoaded => SummaryDisplay::Blank,
            Self::Loading => SummaryDisplay::Spinner,
            Self::Loaded(entries) if entries.is_empty() => SummaryDisplay::NoRecentSessions,
            Self::Loaded(entries) => SummaryDisplay::Entries(entries),
            Self::Failed(message) => SummaryDisplay::Error(message),
        }
    }
}

pub struct SessionSummaryClient {
    http: GatewayHttp,
    state: RwLock<SummaryListState>,
}

impl SessionSummaryClient {
    pub fn new(http: GatewayHttp) -> Self {
        Self {
            http,
            state: RwLock::new(SummaryListState::NotLoaded),
        }
    }

    pub async fn state(&self) -> SummaryListState {
        self.state.read().await.clone()
    }

    pub async fn reset(&self) {
        *self.state.write().await = SummaryListState::NotLoaded;
    }

    /// Summaries as delivered by the gateway (most recent first by contract).
    pub async fn fetch_summaries(&self) -> Result<Vec<ConversationSummary>> {
        *self.state.write().await = SummaryListState::Loading;
        match self.request_summaries().await {
            Ok(summaries) => {
                *self.state.write().await = SummaryListState::Loaded(summaries.clone());
                Ok(summaries)
            }
            Err(err) => {
                warn!("sessions: failed to load summaries: {err}");
                *self.state.write().await = SummaryListState::Failed(err.to_string());
                Err(err)
            }
        }
    }

    async fn request_summaries(&self) -> Result<Vec<ConversationSummary>> {
        let credential = self.http.credentials().require()?;
        let reply: SessionsReply = self
            .http
            .get("/api/sessions", &[("token", credential.token.as_str())])
            .await?;
        Ok(reply
            .sessions
            .into_iter()
            .map(ConversationSummary::from)
            .collect())
    }
}

#[cfg(test)]
#[path = "tests/summaries_tests.rs"]
mod tests;
