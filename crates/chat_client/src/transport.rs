use std::sync::Arc;

use chat_shared::{
    domain::UserId,
    protocol::{encode_outbound, Frame},
};
use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{ClientError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    ConnectFailed(String),
    ServerClosed,
    Error(String),
    LocalTeardown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Opened,
    Frame(Frame),
    /// Terminal for this connection instance.
    Closed(CloseReason),
}

enum Outbound {
    Text(String),
    Close,
}

/// One realtime connection to the gateway.
///
/// `open` returns immediately in `Connecting`; the handshake runs on a
/// background task. Inbound events go to the single receiver handed out by
/// `open`. A closed transport never reopens.
pub struct RealtimeTransport {
    state: Arc<watch::Sender<ConnectionState>>,
    outbound: mpsc::UnboundedSender<Outbound>,
    events: mpsc::UnboundedSender<TransportEvent>,
}

impl RealtimeTransport {
    pub fn open(endpoint: Url) -> (Self, mpsc::UnboundedReceiver<TransportEvent>) {
        let (state, _) = watch::channel(ConnectionState::Connecting);
        let state = Arc::new(state);
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        tokio::spawn(drive_connection(
            endpoint,
            Arc::clone(&state),
            outbound_rx,
            events_tx.clone(),
        ));

        (
            Self {
                state,
                outbound: outbound_tx,
                events: events_tx,
            },
            events_rx,
        )
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Queues `"{peer_id}|{content}"` as one text frame. Nothing is retried or
    /// held back for a later connection.
    pub fn send(&self, peer_id: UserId, content: &str) -> Result<()> {
        if !self.is_open() {
            return Err(ClientError::TransportNotReady);
        }
        self.outbound
            .send(Outbound::Text(encode_outbound(peer_id, content)))
            .map_err(|_| ClientError::TransportNotReady)
    }

    pub fn close(&self) {
        if mark_closed(&self.state, &self.events, CloseReason::LocalTeardown) {
            let _ = self.outbound.send(Outbound::Close);
        }
    }
}

impl Drop for RealtimeTransport {
    fn drop(&mut self) {
        self.close();
    }
}

/// Moves to `Closed` and emits the terminal event, once.
fn mark_closed(
    state: &watch::Sender<ConnectionState>,
    events: &mpsc::UnboundedSender<TransportEvent>,
    reason: CloseReason,
) -> bool {
    let changed = state.send_if_modified(|current| {
        if *current == ConnectionState::Closed {
            false
        } else {
            *current = ConnectionState::Closed;
            true
        }
    });
    if changed {
        info!(?reason, "transport: closed");
        let _ = events.send(TransportEvent::Closed(reason));
    }
    changed
}

async fn drive_connection(
    endpoint: Url,
    state: Arc<watch::Sender<ConnectionState>>,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    events: mpsc::UnboundedSender<TransportEvent>,
) {
    let host = endpoint.host_str().unwrap_or_default().to_string();
    let stream = match connect_async(endpoint.as_str()).await {
        Ok((stream, _)) => stream,
        Err(err) => {
            warn!(host = %host, "transport: connect failed: {err}");
            mark_closed(&state, &events, CloseReason::ConnectFailed(err.to_string()));
            return;
        }
    };

    let opened = state.send_if_modified(|current| {
        if *current == ConnectionState::Connecting {
            *current = ConnectionState::Open;
            true
        } else {
            false
        }
    });
    let (mut sink, mut inbound) = stream.split();
    if !opened {
        // Torn down while the handshake was in flight.
        let _ = sink.send(Message::Close(None)).await;
        return;
    }
    info!(host = %host, "transport: connected");
    let _ = events.send(TransportEvent::Opened);

    let reason = loop {
        tokio::select! {
            frame = inbound.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    let frame = Frame::decode(&text);
                    if let Frame::Opaque { .. } = &frame {
                        debug!("transport: inbound frame is not structured; passing raw text");
                    }
                    let _ = events.send(TransportEvent::Frame(frame));
                }
                Some(Ok(Message::Close(_))) | None => break CloseReason::ServerClosed,
                Some(Ok(_)) => {}
                Some(Err(err)) => break CloseReason::Error(err.to_string()),
            },
            command = outbound.recv() => match command {
                Some(Outbound::Text(text)) => {
                    if let Err(err) = sink.send(Message::Text(text)).await {
                        break CloseReason::Error(err.to_string());
                    }
                }
                Some(Outbound::Close) | None => {
                    let _ = sink.send(Message::Close(None)).await;
                    break CloseReason::LocalTeardown;
                }
            },
        }
    };

    mark_closed(&state, &events, reason);
}

#[cfg(test)]
#[path = "tests/transport_tests.rs"]
mod tests;
