use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures::{stream::SplitSink, SinkExt, StreamExt};
use serde::Serialize;
use shared::{
    domain::{ConversationKey, LawyerId, ParticipantRole},
    protocol::{ChatMessage, MonitorEvent, RoomFrame, RoomNotice},
};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::AppState;

pub(crate) fn to_wire(stored: storage::StoredMessage) -> ChatMessage {
    ChatMessage {
        sender: stored.sender,
        content: stored.content,
        timestamp: stored.sent_at,
    }
}

/// One room socket: register, pump frames both ways, deregister on
/// disconnect. The writer task ends when the registry drops this
/// connection's sender (slot released or superseded), at which point
/// it closes the socket.
pub(crate) async fn room_connection(
    state: Arc<AppState>,
    socket: WebSocket,
    key: ConversationKey,
    role: ParticipantRole,
) {
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel::<RoomFrame>();
    let connection_id = state.registry.register_room(&key, role, outbound_tx).await;
    debug!(lawyer_id = %key.lawyer_id, client_id = %key.client_id, %role, "room socket open");

    let (sender, mut receiver) = socket.split();
    let writer = tokio::spawn(forward_outbound(sender, outbound_rx));

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(content)) => handle_send(&state, &key, role, &content).await,
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(error) => {
                debug!(%error, "room socket receive failed");
                break;
            }
        }
    }

    state.registry.deregister_room(&key, role, connection_id).await;
    let _ = writer.await;
    debug!(lawyer_id = %key.lawyer_id, client_id = %key.client_id, %role, "room socket closed");
}

/// One monitor socket per lawyer. Server-to-client only; inbound
/// frames are keepalives and are drained.
pub(crate) async fn monitor_connection(state: Arc<AppState>, socket: WebSocket, lawyer_id: LawyerId) {
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel::<MonitorEvent>();
    let connection_id = state.registry.register_monitor(&lawyer_id, outbound_tx).await;
    debug!(%lawyer_id, "monitor socket open");

    let (sender, mut receiver) = socket.split();
    let writer = tokio::spawn(forward_outbound(sender, outbound_rx));

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(error) => {
                debug!(%error, "monitor socket receive failed");
                break;
            }
        }
    }

    state.registry.deregister_monitor(&lawyer_id, connection_id).await;
    let _ = writer.await;
    debug!(%lawyer_id, "monitor socket closed");
}

async fn forward_outbound<T: Serialize>(
    mut sender: SplitSink<WebSocket, Message>,
    mut outbound: mpsc::UnboundedReceiver<T>,
) {
    while let Some(frame) = outbound.recv().await {
        let text = match serde_json::to_string(&frame) {
            Ok(text) => text,
            Err(error) => {
                warn!(%error, "dropping unserializable outbound frame");
                continue;
            }
        };
        if sender.send(Message::Text(text)).await.is_err() {
            return;
        }
    }
    // Slot released or superseded: tell the peer this socket is done.
    let _ = sender.send(Message::Close(None)).await;
}

/// Persist-then-fan-out. Persistence must succeed before any delivery
/// is attempted; a crash after persistence loses at most an alert,
/// never a message.
async fn handle_send(
    state: &Arc<AppState>,
    key: &ConversationKey,
    sender_role: ParticipantRole,
    content: &str,
) {
    let content = content.trim();
    if content.is_empty() {
        warn!(lawyer_id = %key.lawyer_id, client_id = %key.client_id, "dropping empty chat frame");
        return;
    }

    let stored = match state.storage.append_message(key, sender_role, content).await {
        Ok(stored) => stored,
        Err(error) => {
            warn!(%error, "failed to persist chat message");
            // The sender must learn the message was not stored; this
            // is distinct from a fan-out miss, which stays silent.
            if let Some(tx) = state.registry.room_sender(key, sender_role).await {
                let _ = tx.send(RoomFrame::Notice(RoomNotice::error(
                    "message was not stored, please retry",
                )));
            }
            return;
        }
    };

    let message = to_wire(stored);
    let recipient = sender_role.counterpart();

    // Live delivery to the counterpart's room socket wins; the sender
    // never receives its own message back.
    if let Some(tx) = state.registry.room_sender(key, recipient).await {
        let _ = tx.send(RoomFrame::Message(message));
        return;
    }

    // No room socket on the lawyer side: alert the monitor channel so
    // the dashboard hears about conversations it is not viewing.
    if recipient == ParticipantRole::Lawyer {
        if let Some(tx) = state.registry.monitor_sender(&key.lawyer_id).await {
            let _ = tx.send(MonitorEvent::NewMessage {
                conversation: key.clone(),
                message,
            });
        }
    }
}
