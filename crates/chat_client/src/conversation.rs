use chat_shared::{
    domain::{HistoricalMessage, LiveMessage, TranscriptEntry, UserId},
    protocol::Frame,
};
use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

use crate::{
    error::{ClientError, Result},
    events::ClientEvent,
    history::HistoryClient,
    session::CredentialStore,
    transport::{ConnectionState, RealtimeTransport, TransportEvent},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConversationPhase {
    #[default]
    Idle,
    HistoryLoading,
    /// History is in place but the connection is not open.
    HistoryLoaded,
    /// History is in place and the connection is open.
    Live,
}

/// Identifies one peer selection. History responses carrying an older ticket
/// are discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionTicket {
    pub peer_id: UserId,
    generation: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiveOutcome {
    Appended(TranscriptEntry),
    /// Sender is not the selected peer, or nothing is selected.
    Dropped,
}

/// Transcript for the selected peer and the selection state machine.
#[derive(Debug, Default)]
pub struct ConversationState {
    phase: ConversationPhase,
    selected: Option<UserId>,
    generation: u64,
    transcript: Vec<TranscriptEntry>,
    connected: bool,
}

impl ConversationState {
    pub fn phase(&self) -> ConversationPhase {
        self.phase
    }

    pub fn selected_peer(&self) -> Option<UserId> {
        self.selected
    }

    pub fn transcript(&self) -> &[TranscriptEntry] {
        &self.transcript
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    fn loaded_phase(&self) -> ConversationPhase {
        if self.connected {
            ConversationPhase::Live
        } else {
            ConversationPhase::HistoryLoaded
        }
    }

    /// Drops the previous transcript and starts loading `peer_id`.
    pub fn begin_selection(&mut self, peer_id: UserId) -> SelectionTicket {
        self.generation += 1;
        self.selected = Some(peer_id);
        self.transcript.clear();
        self.phase = ConversationPhase::HistoryLoading;
        SelectionTicket {
            peer_id,
            generation: self.generation,
        }
    }

    pub fn is_current(&self, ticket: SelectionTicket) -> bool {
        self.generation == ticket.generation
            && self.selected == Some(ticket.peer_id)
            && self.phase == ConversationPhase::HistoryLoading
    }

    /// Puts history in front of anything appended while it was loading.
    /// Returns `false` for a stale ticket, leaving state untouched.
    pub fn apply_history(
        &mut self,
        ticket: SelectionTicket,
        messages: Vec<HistoricalMessage>,
        me: UserId,
    ) -> bool {
        if !self.is_current(ticket) {
            return false;
        }
        let arrived_while_loading = std::mem::take(&mut self.transcript);
        self.transcript = messages
            .into_iter()
            .map(|message| TranscriptEntry::from_history(message, me))
            .collect();
        self.transcript.extend(arrived_while_loading);
        self.phase = self.loaded_phase();
        true
    }

    /// History failed; the conversation stays usable with whatever arrived
    /// live.
    pub fn fail_history(&mut self, ticket: SelectionTicket) -> bool {
        if !self.is_current(ticket) {
            return false;
        }
        self.phase = self.loaded_phase();
        true
    }

    /// The connection opened. A selection still loading history goes live
    /// once its history lands.
    pub fn go_live(&mut self) {
        self.connected = true;
        if self.phase == ConversationPhase::HistoryLoaded {
            self.phase = ConversationPhase::Live;
        }
    }

    pub fn pause_live(&mut self) {
        self.connected = false;
        if self.phase == ConversationPhase::Live {
            self.phase = ConversationPhase::HistoryLoaded;
        }
    }

    pub fn accept_live(
        &mut self,
        message: LiveMessage,
        received_at: DateTime<Utc>,
    ) -> LiveOutcome {
        let accepting = matches!(
            self.phase,
            ConversationPhase::HistoryLoading | ConversationPhase::Live
        );
        if !accepting || self.selected != Some(message.from) {
            return LiveOutcome::Dropped;
        }
        let entry = TranscriptEntry::from_live(message, received_at);
        self.transcript.push(entry.clone());
        LiveOutcome::Appended(entry)
    }

    pub fn append_opaque(&mut self, text: String) -> TranscriptEntry {
        let entry = TranscriptEntry::opaque(text);
        self.transcript.push(entry.clone());
        entry
    }

    pub fn record_sent(&mut self, content: &str, sent_at: DateTime<Utc>) -> TranscriptEntry {
        let entry = TranscriptEntry::sent(content, sent_at);
        self.transcript.push(entry.clone());
        entry
    }

    pub fn reset(&mut self) {
        self.generation += 1;
        self.selected = None;
        self.transcript.clear();
        self.phase = ConversationPhase::Idle;
        self.connected = false;
    }
}

/// Orchestrates history backfill, the live feed, and sends for the selected
/// peer. It is the only consumer of transport events.
pub struct ConversationManager {
    history: HistoryClient,
    credentials: CredentialStore,
    state: Mutex<ConversationState>,
    transport: Mutex<Option<RealtimeTransport>>,
    events: broadcast::Sender<ClientEvent>,
}

impl ConversationManager {
    pub fn new(
        history: HistoryClient,
        credentials: CredentialStore,
        events: broadcast::Sender<ClientEvent>,
    ) -> Self {
        Self {
            history,
            credentials,
            state: Mutex::new(ConversationState::default()),
            transport: Mutex::new(None),
            events,
        }
    }

    pub async fn phase(&self) -> ConversationPhase {
        self.state.lock().await.phase()
    }

    pub async fn selected_peer(&self) -> Option<UserId> {
        self.state.lock().await.selected_peer()
    }

    pub async fn transcript(&self) -> Vec<TranscriptEntry> {
        self.state.lock().await.transcript().to_vec()
    }

    pub async fn connection_state(&self) -> ConnectionState {
        self.transport
            .lock()
            .await
            .as_ref()
            .map(RealtimeTransport::state)
            .unwrap_or(ConnectionState::Closed)
    }

    /// Installs the session's transport, closing any previous one.
    pub async fn attach_transport(&self, transport: RealtimeTransport) {
        if let Some(previous) = self.transport.lock().await.replace(transport) {
            previous.close();
        }
    }

    /// Clears the selection and tears the transport down. The caller must
    /// have stopped feeding transport events, since the close is announced
    /// here.
    pub async fn reset(&self) {
        let closed_now = match self.transport.lock().await.take() {
            Some(transport) => {
                let was_closed = transport.state() == ConnectionState::Closed;
                transport.close();
                !was_closed
            }
            None => false,
        };
        self.state.lock().await.reset();
        if closed_now {
            info!("conversation: live feed closed by teardown");
            self.emit(ClientEvent::ConnectionStateChanged(ConnectionState::Closed));
            self.emit(ClientEvent::SystemNotice("Disconnected".to_string()));
        }
        self.emit(ClientEvent::TranscriptReset {
            peer_id: None,
            entries: Vec::new(),
        });
    }

    /// Selects `peer_id` and backfills its history. A response that arrives
    /// after another selection has been made is dropped.
    pub async fn select_peer(&self, peer_id: UserId) -> Result<()> {
        let me = self.credentials.require()?.user_id;
        let ticket = self.state.lock().await.begin_selection(peer_id);
        info!(peer_id = peer_id.0, "conversation: peer selected");
        self.emit(ClientEvent::TranscriptReset {
            peer_id: Some(peer_id),
            entries: Vec::new(),
        });

        let fetched = self.history.fetch_history(peer_id).await;

        let mut state = self.state.lock().await;
        match fetched {
            Ok(messages) => {
                if !state.apply_history(ticket, messages, me) {
                    debug!(peer_id = peer_id.0, "conversation: discarding stale history");
                    return Ok(());
                }
                self.emit(ClientEvent::TranscriptReset {
                    peer_id: Some(peer_id),
                    entries: state.transcript().to_vec(),
                });
                Ok(())
            }
            Err(err) => {
                if !state.fail_history(ticket) {
                    debug!(peer_id = peer_id.0, "conversation: discarding stale history failure");
                    return Ok(());
                }
                warn!(peer_id = peer_id.0, "conversation: history load failed: {err}");
                self.emit(ClientEvent::SystemNotice(format!(
                    "Failed to load history: {err}"
                )));
                Err(err)
            }
        }
    }

    /// Sends to the selected peer and appends the message right away, without
    /// waiting for any acknowledgement.
    pub async fn send(&self, peer_id: UserId, content: &str) -> Result<TranscriptEntry> {
        if content.is_empty() {
            return Err(ClientError::validation("message content is required"));
        }
        let mut state = self.state.lock().await;
        match state.selected_peer() {
            None => return Err(ClientError::validation("no conversation selected")),
            Some(selected) if selected != peer_id => {
                return Err(ClientError::validation(format!(
                    "user {peer_id} is not the selected conversation"
                )))
            }
            Some(_) => {}
        }

        {
            let transport = self.transport.lock().await;
            transport
                .as_ref()
                .ok_or(ClientError::TransportNotReady)?
                .send(peer_id, content)?;
        }

        let entry = state.record_sent(content, Utc::now());
        self.emit(ClientEvent::TranscriptAppended {
            peer_id: Some(peer_id),
            entry: entry.clone(),
        });
        Ok(entry)
    }

    pub async fn handle_transport_event(&self, event: TransportEvent) {
        match event {
            TransportEvent::Opened => {
                self.state.lock().await.go_live();
                self.emit(ClientEvent::ConnectionStateChanged(ConnectionState::Open));
                self.emit(ClientEvent::SystemNotice("Connected to server".to_string()));
            }
            TransportEvent::Frame(Frame::Structured { from, content }) => {
                let outcome = self
                    .state
                    .lock()
                    .await
                    .accept_live(LiveMessage { from, content }, Utc::now());
                match outcome {
                    LiveOutcome::Appended(entry) => self.emit(ClientEvent::TranscriptAppended {
                        peer_id: Some(from),
                        entry,
                    }),
                    LiveOutcome::Dropped => {
                        debug!(from = from.0, "conversation: live message outside selection");
                    }
                }
            }
            TransportEvent::Frame(Frame::Opaque { text }) => {
                let (peer_id, entry) = {
                    let mut state = self.state.lock().await;
                    (state.selected_peer(), state.append_opaque(text))
                };
                self.emit(ClientEvent::TranscriptAppended { peer_id, entry });
            }
            TransportEvent::Closed(reason) => {
                self.state.lock().await.pause_live();
                debug!(?reason, "conversation: live feed closed");
                self.emit(ClientEvent::ConnectionStateChanged(ConnectionState::Closed));
                self.emit(ClientEvent::SystemNotice("Disconnected".to_string()));
            }
        }
    }

    fn emit(&self, event: ClientEvent) {
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
#[path = "tests/conversation_tests.rs"]
mod tests;
