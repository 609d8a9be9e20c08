use std::sync::Arc;

use chat_shared::{
    domain::{Credential, FriendEntry, FriendRequest, TranscriptEntry, UserId},
    error::ApiError,
};
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
};
use tracing::{info, warn};

pub mod auth;
pub mod config;
pub mod conversation;
pub mod error;
pub mod events;
pub mod friends;
pub mod history;
pub mod http;
pub mod session;
pub mod summaries;
pub mod transport;

pub use auth::AuthClient;
pub use config::{load_settings, ClientSettings};
pub use conversation::{ConversationManager, ConversationPhase};
pub use error::{ClientError, Result};
pub use events::ClientEvent;
pub use friends::{FriendGraph, FriendGraphClient};
pub use history::HistoryClient;
pub use http::GatewayHttp;
pub use session::CredentialStore;
pub use summaries::{SessionSummaryClient, SummaryDisplay, SummaryListState};
pub use transport::{CloseReason, ConnectionState, RealtimeTransport, TransportEvent};

/// Owns one user session: the credential, the REST clients, the realtime
/// transport and the conversation pane. Presentation code drives it through
/// these methods and repaints from `subscribe_events`.
pub struct ChatClient {
    settings: ClientSettings,
    credentials: CredentialStore,
    auth: AuthClient,
    friends: FriendGraphClient,
    summaries: SessionSummaryClient,
    conversation: Arc<ConversationManager>,
    events: broadcast::Sender<ClientEvent>,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl ChatClient {
    pub fn new(settings: ClientSettings) -> Arc<Self> {
        let credentials = CredentialStore::new();
        let http = GatewayHttp::new(settings.gateway_url.clone(), credentials.clone());
        let (events, _) = broadcast::channel(settings.event_capacity.max(1));
        let conversation = Arc::new(ConversationManager::new(
            HistoryClient::new(http.clone()),
            credentials.clone(),
            events.clone(),
        ));
        Arc::new(Self {
            settings,
            credentials,
            auth: AuthClient::new(http.clone()),
            friends: FriendGraphClient::new(http.clone()),
            summaries: SessionSummaryClient::new(http),
            conversation,
            events,
            pump: Mutex::new(None),
        })
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    pub fn conversation(&self) -> &ConversationManager {
        &self.conversation
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    pub async fn friend_graph(&self) -> FriendGraph {
        self.friends.snapshot().await
    }

    pub async fn summary_state(&self) -> SummaryListState {
        self.summaries.state().await
    }

    /// Logs in, opens the realtime connection and loads the friend graph and
    /// recent sessions. An existing session is logged out first.
    pub async fn login(&self, username: &str, password: &str) -> Result<Credential> {
        if self.credentials.is_authenticated() {
            self.logout().await;
        }
        let credential = match self.auth.login(username, password).await {
            Ok(credential) => credential,
            Err(err) => {
                self.emit(ClientEvent::Error(ApiError::from(&err)));
                return Err(err);
            }
        };
        self.credentials.save(credential.clone());
        info!(user_id = credential.user_id.0, "client: logged in");
        self.emit(ClientEvent::SessionStarted {
            user_id: credential.user_id,
            username: credential.username.clone(),
        });

        if let Err(err) = self.start_transport(&credential.token).await {
            warn!("client: realtime connection unavailable: {err}");
            self.emit(ClientEvent::Error(ApiError::from(&err)));
        }

        self.refresh_friends().await;
        if self.credentials.is_authenticated() {
            let _ = self.refresh_requests().await;
        }
        if self.credentials.is_authenticated() {
            let _ = self.refresh_summaries().await;
        }
        Ok(credential)
    }

    pub async fn register(&self, username: &str, password: &str) -> Result<UserId> {
        match self.auth.register(username, password).await {
            Ok(user_id) => {
                self.emit(ClientEvent::SystemNotice(format!(
                    "Registered as user {user_id}"
                )));
                Ok(user_id)
            }
            Err(err) => {
                self.emit(ClientEvent::Error(ApiError::from(&err)));
                Err(err)
            }
        }
    }

    /// Ends the session. Calling it without a session is a no-op.
    pub async fn logout(&self) {
        if let Some(credential) = self.teardown_session().await {
            info!(user_id = credential.user_id.0, "client: logged out");
            self.emit(ClientEvent::LoggedOut);
        }
    }

    /// Failures leave the list empty; an expired credential also ends the
    /// session.
    pub async fn refresh_friends(&self) -> Vec<FriendEntry> {
        if let Err(err) = self.credentials.require() {
            self.report(&err).await;
            return Vec::new();
        }
        let friends = self.friends.list_friends().await;
        if !self.credentials.is_authenticated() {
            self.session_lost().await;
            return friends;
        }
        self.emit(ClientEvent::FriendListChanged(friends.clone()));
        friends
    }

    pub async fn refresh_requests(&self) -> Result<Vec<FriendRequest>> {
        match self.friends.list_pending_requests().await {
            Ok(requests) => {
                self.emit(ClientEvent::FriendRequestsChanged(requests.clone()));
                Ok(requests)
            }
            Err(err) => {
                self.report(&err).await;
                Err(err)
            }
        }
    }

    pub async fn add_friend(&self, target: UserId) -> Result<()> {
        match self.friends.add_friend(target).await {
            Ok(()) => {
                self.emit(ClientEvent::SystemNotice("Friend request sent".to_string()));
                Ok(())
            }
            Err(err) => {
                self.report(&err).await;
                Err(err)
            }
        }
    }

    /// Answers a pending request, then refetches both halves of the graph.
    pub async fn respond_to_friend_request(&self, sender: UserId, accept: bool) -> Result<()> {
        if let Err(err) = self.friends.respond_to_request(sender, accept).await {
            self.report(&err).await;
            return Err(err);
        }
        let notice = if accept {
            "Friend request accepted"
        } else {
            "Friend request rejected"
        };
        self.emit(ClientEvent::SystemNotice(notice.to_string()));
        self.refresh_friends().await;
        if self.credentials.is_authenticated() {
            let _ = self.refresh_requests().await;
        }
        Ok(())
    }

    /// The failure is carried by the `Failed` list state rather than an
    /// error event.
    pub async fn refresh_summaries(&self) -> Result<()> {
        self.emit(ClientEvent::SummariesChanged(SummaryListState::Loading));
        let fetched = self.summaries.fetch_summaries().await;
        self.emit(ClientEvent::SummariesChanged(self.summaries.state().await));
        match fetched {
            Ok(_) => Ok(()),
            Err(err) => {
                if err.is_auth_failure() {
                    self.session_lost().await;
                }
                Err(err)
            }
        }
    }

    pub async fn select_peer(&self, peer_id: UserId) -> Result<()> {
        let selected = self.conversation.select_peer(peer_id).await;
        if let Err(err) = &selected {
            if err.is_auth_failure() {
                self.session_lost().await;
            }
        }
        selected
    }

    pub async fn send(&self, peer_id: UserId, content: &str) -> Result<TranscriptEntry> {
        let sent = self.conversation.send(peer_id, content).await;
        if let Err(err) = &sent {
            self.report(err).await;
        }
        sent
    }

    async fn start_transport(&self, token: &str) -> Result<()> {
        let endpoint = self.settings.realtime_endpoint(token)?;
        let (transport, mut transport_events) = RealtimeTransport::open(endpoint);
        self.conversation.attach_transport(transport).await;
        self.emit(ClientEvent::ConnectionStateChanged(ConnectionState::Connecting));

        let conversation = Arc::clone(&self.conversation);
        let pump = tokio::spawn(async move {
            while let Some(event) = transport_events.recv().await {
                conversation.handle_transport_event(event).await;
            }
        });
        if let Some(previous) = self.pump.lock().await.replace(pump) {
            previous.abort();
        }
        Ok(())
    }

    async fn teardown_session(&self) -> Option<Credential> {
        let pump = self.pump.lock().await.take();
        if let Some(pump) = pump {
            pump.abort();
            // Nothing may reach the conversation once the reset below starts.
            let _ = pump.await;
        }
        self.conversation.reset().await;
        self.friends.reset().await;
        self.summaries.reset().await;
        self.credentials.clear()
    }

    async fn session_lost(&self) {
        warn!("client: session is no longer valid");
        self.teardown_session().await;
        self.emit(ClientEvent::AuthRequired);
    }

    async fn report(&self, err: &ClientError) {
        self.emit(ClientEvent::Error(ApiError::from(err)));
        if err.is_auth_failure() {
            self.session_lost().await;
        }
    }

    fn emit(&self, event: ClientEvent) {
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
#[path = "tests/support.rs"]
mod test_support;

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
