use chat_shared::{
    domain::{HistoricalMessage, UserId},
    protocol::HistoryReply,
};
use tracing::debug;

use crate::{error::Result, http::GatewayHttp};

#[derive(Debug, Clone)]
pub struct HistoryClient {
    http: GatewayHttp,
}

impl HistoryClient {
    pub fn new(http: GatewayHttp) -> Self {
        Self { http }
    }

    /// Durable log with `peer_id`, in the order the gateway returns it
    /// (ascending by timestamp). The sequence is not re-sorted here.
    pub async fn fetch_history(&self, peer_id: UserId) -> Result<Vec<HistoricalMessage>> {
        let credential = self.http.credentials().require()?;
        let reply: HistoryReply = self
            .http
            .get(
                "/api/history",
                &[
                    ("token", credential.token),
                    ("peer_id", peer_id.to_string()),
                ],
            )
            .await?;
        debug!(
            peer_id = peer_id.0,
            count = reply.messages.len(),
            "history: fetched"
        );
        Ok(reply
            .messages
            .into_iter()
            .map(HistoricalMessage::from)
            .collect())
    }
}
