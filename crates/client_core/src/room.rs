use std::{sync::Arc, time::Duration};

use chrono::Utc;
use shared::{
    domain::{ConversationKey, ParticipantRole},
    protocol::{ChatMessage, RoomFrame},
};
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, Mutex};
use tracing::warn;

use crate::rest::HistoryApi;
use crate::supervisor::{supervise, SupervisedChannel};
use crate::transport::{ConnectionState, Connector};

#[derive(Debug, Clone)]
pub enum ChatEvent {
    /// Timeline replaced from the History Store (initial open and
    /// every reconnect).
    HistoryLoaded(Vec<ChatMessage>),
    MessageReceived(ChatMessage),
    /// The gateway could not durably store our last send.
    SendRejected(String),
    ConnectionState(ConnectionState),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SendError {
    #[error("message is empty")]
    EmptyMessage,
    #[error("not connected")]
    NotConnected,
}

/// One open conversation: an ordered local timeline fed by the room
/// socket, hydrated from history on open and re-hydrated after every
/// reconnect. Used by both the visitor widget and the lawyer
/// dashboard; only the role differs.
pub struct RoomChannel {
    key: ConversationKey,
    role: ParticipantRole,
    timeline: Arc<Mutex<Vec<ChatMessage>>>,
    channel: SupervisedChannel,
    events: broadcast::Sender<ChatEvent>,
}

impl RoomChannel {
    pub async fn open(
        key: ConversationKey,
        role: ParticipantRole,
        history: Arc<dyn HistoryApi>,
        connector: Arc<dyn Connector>,
        reconnect_delay: Duration,
    ) -> Self {
        let (events, _) = broadcast::channel(256);
        let timeline = Arc::new(Mutex::new(Vec::new()));

        // History first, socket second. A fetch failure leaves an
        // empty timeline and is retried on the next open or reconnect,
        // never in the background.
        match history.fetch_history(&key).await {
            Ok(messages) => {
                *timeline.lock().await = messages.clone();
                let _ = events.send(ChatEvent::HistoryLoaded(messages));
            }
            Err(error) => {
                warn!(%error, "history fetch failed, starting with empty timeline");
            }
        }

        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let channel = supervise(connector, reconnect_delay, inbound_tx);

        tokio::spawn(pump_frames(
            inbound_rx,
            Arc::clone(&timeline),
            events.clone(),
        ));
        tokio::spawn(watch_reconnects(
            channel.state_changes(),
            key.clone(),
            history,
            Arc::clone(&timeline),
            events.clone(),
        ));

        Self {
            key,
            role,
            timeline,
            channel,
            events,
        }
    }

    pub fn key(&self) -> &ConversationKey {
        &self.key
    }

    pub fn state(&self) -> ConnectionState {
        self.channel.state()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ChatEvent> {
        self.events.subscribe()
    }

    pub async fn timeline(&self) -> Vec<ChatMessage> {
        self.timeline.lock().await.clone()
    }

    /// Sends one message. Empty input never leaves the client; sending
    /// is a precondition violation while the socket is not open. The
    /// sender does not receive its own message back, so the local echo
    /// is appended here with the local clock; the server's timestamp
    /// takes over on the next history fetch.
    pub async fn send(&self, text: &str) -> Result<(), SendError> {
        let content = text.trim();
        if content.is_empty() {
            return Err(SendError::EmptyMessage);
        }
        if self.channel.state() != ConnectionState::Open {
            return Err(SendError::NotConnected);
        }

        self.channel.send(content.to_string());

        let message = ChatMessage {
            sender: self.role,
            content: content.to_string(),
            timestamp: Utc::now(),
        };
        self.timeline.lock().await.push(message.clone());
        let _ = self.events.send(ChatEvent::MessageReceived(message));
        Ok(())
    }

    /// Closes the room socket for good; the monitor channel, if any,
    /// is unaffected.
    pub fn close(&self) {
        self.channel.close();
    }
}

async fn pump_frames(
    mut inbound_rx: mpsc::UnboundedReceiver<String>,
    timeline: Arc<Mutex<Vec<ChatMessage>>>,
    events: broadcast::Sender<ChatEvent>,
) {
    while let Some(text) = inbound_rx.recv().await {
        match serde_json::from_str::<RoomFrame>(&text) {
            Ok(RoomFrame::Message(message)) => {
                // Arrival order equals persistence order; append, never
                // re-order.
                timeline.lock().await.push(message.clone());
                let _ = events.send(ChatEvent::MessageReceived(message));
            }
            Ok(RoomFrame::Notice(notice)) => {
                warn!(reason = %notice.message, "gateway rejected a send");
                let _ = events.send(ChatEvent::SendRejected(notice.message));
            }
            Err(error) => {
                warn!(%error, "dropping malformed room frame");
            }
        }
    }
}

async fn watch_reconnects(
    mut state_rx: tokio::sync::watch::Receiver<ConnectionState>,
    key: ConversationKey,
    history: Arc<dyn HistoryApi>,
    timeline: Arc<Mutex<Vec<ChatMessage>>>,
    events: broadcast::Sender<ChatEvent>,
) {
    let mut opened_before = false;
    loop {
        let state = *state_rx.borrow_and_update();
        let _ = events.send(ChatEvent::ConnectionState(state));

        if state == ConnectionState::Open {
            if opened_before {
                // Reconnect: the authoritative order lives in history.
                // Replacing the timeline reconciles local echoes with
                // server timestamps.
                match history.fetch_history(&key).await {
                    Ok(messages) => {
                        *timeline.lock().await = messages.clone();
                        let _ = events.send(ChatEvent::HistoryLoaded(messages));
                    }
                    Err(error) => {
                        warn!(%error, "history refetch after reconnect failed");
                    }
                }
            }
            opened_before = true;
        }

        if state_rx.changed().await.is_err() {
            return;
        }
    }
}
