use std::collections::HashSet;

use chat_shared::{
    domain::{FriendEntry, FriendRequest, UserId},
    protocol::{AddFriendForm, FriendListReply, FriendRequestsReply, HandleRequestForm},
};
use serde::de::IgnoredAny;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::{error::Result, http::GatewayHttp};

/// Last fetched friend graph. Each fetch replaces its half wholesale.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FriendGraph {
    pub friends: Vec<FriendEntry>,
    pub requests: Vec<FriendRequest>,
}

pub struct FriendGraphClient {
    http: GatewayHttp,
    graph: RwLock<FriendGraph>,
}

impl FriendGraphClient {
    pub fn new(http: GatewayHttp) -> Self {
        Self {
            http,
            graph: RwLock::new(FriendGraph::default()),
        }
    }

    pub async fn snapshot(&self) -> FriendGraph {
        self.graph.read().await.clone()
    }

    pub async fn reset(&self) {
        *self.graph.write().await = FriendGraph::default();
    }

    /// Accepted friends. Any failure is logged and yields an empty list.
    pub async fn list_friends(&self) -> Vec<FriendEntry> {
        match self.fetch_friends().await {
            Ok(friends) => {
                self.graph.write().await.friends = friends.clone();
                friends
            }
            Err(err) => {
                warn!("friends: failed to load friend list: {err}");
                Vec::new()
            }
        }
    }

    async fn fetch_friends(&self) -> Result<Vec<FriendEntry>> {
        let credential = self.http.credentials().require()?;
        let reply: FriendListReply = self
            .http
            .get("/api/friend/list", &[("token", credential.token.as_str())])
            .await?;
        Ok(unique_by(
            reply.friends.into_iter().map(FriendEntry::from),
            |entry| entry.user_id,
        ))
    }

    pub async fn list_pending_requests(&self) -> Result<Vec<FriendRequest>> {
        let credential = self.http.credentials().require()?;
        let reply: FriendRequestsReply = self
            .http
            .get("/api/friend/requests", &[("token", credential.token.as_str())])
            .await?;
        let requests = unique_by(
            reply.requests.into_iter().map(FriendRequest::from),
            |request| request.sender_id,
        );
        self.graph.write().await.requests = requests.clone();
        Ok(requests)
    }

    /// Sends a friend request. The target shows up in the friend list only
    /// after they accept and a later fetch confirms it.
    pub async fn add_friend(&self, target: UserId) -> Result<()> {
        let credential = self.http.credentials().require()?;
        let _: IgnoredAny = self
            .http
            .post_form(
                "/api/friend/add",
                &AddFriendForm {
                    token: credential.token,
                    friend_id: target,
                },
            )
            .await?;
        info!(target_user_id = target.0, "friends: request sent");
        Ok(())
    }

    /// Accepts or rejects a pending request. Local sets are left as they are;
    /// the caller refetches both lists on success.
    pub async fn respond_to_request(&self, sender: UserId, accept: bool) -> Result<()> {
        let credential = self.http.credentials().require()?;
        let _: IgnoredAny = self
            .http
            .post_form(
                "/api/friend/request/handle",
                &HandleRequestForm {
                    token: credential.token,
                    request_id: sender,
                    accept,
                },
            )
            .await?;
        info!(sender_id = sender.0, accept, "friends: request handled");
        Ok(())
    }
}

fn unique_by<T, K, F>(items: impl IntoIterator<Item = T>, key: F) -> Vec<T>
where
    K: std::hash::Hash + Eq,
    F: Fn(&T) -> K,
{
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(key(item)))
        .collect()
}

#[cfg(test)]
#[path = "tests/friends_tests.rs"]
mod tests;
