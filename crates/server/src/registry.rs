use std::{collections::HashMap, sync::Arc};

use shared::{
    domain::{ConversationKey, LawyerId, ParticipantRole},
    protocol::{MonitorEvent, RoomFrame},
};
use tokio::sync::{mpsc, Mutex};

pub(crate) type RoomSender = mpsc::UnboundedSender<RoomFrame>;
pub(crate) type MonitorSender = mpsc::UnboundedSender<MonitorEvent>;

/// Identifies one registration so a superseded socket's late
/// deregistration cannot evict its replacement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ConnectionId(u64);

struct Slot<T> {
    connection_id: ConnectionId,
    sender: T,
}

#[derive(Default)]
struct Inner {
    next_connection_id: u64,
    rooms: HashMap<(ConversationKey, ParticipantRole), Slot<RoomSender>>,
    monitors: HashMap<LawyerId, Slot<MonitorSender>>,
}

impl Inner {
    fn next_connection_id(&mut self) -> ConnectionId {
        self.next_connection_id += 1;
        ConnectionId(self.next_connection_id)
    }
}

/// Live socket registry: at most one room socket per
/// `(conversation, role)` and one monitor socket per lawyer.
/// Registering over an occupied slot replaces it (last-writer-wins);
/// dropping the previous sender ends that socket's writer task, which
/// closes the superseded connection. All mutations go through one
/// lock.
#[derive(Clone)]
pub(crate) struct SessionRegistry {
    inner: Arc<Mutex<Inner>>,
}

impl SessionRegistry {
    pub(crate) fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
        }
    }

    pub(crate) async fn register_room(
        &self,
        key: &ConversationKey,
        role: ParticipantRole,
        sender: RoomSender,
    ) -> ConnectionId {
        let mut inner = self.inner.lock().await;
        let connection_id = inner.next_connection_id();
        inner.rooms.insert(
            (key.clone(), role),
            Slot {
                connection_id,
                sender,
            },
        );
        connection_id
    }

    /// Releases the slot if it still belongs to `connection_id`.
    /// Idempotent.
    pub(crate) async fn deregister_room(
        &self,
        key: &ConversationKey,
        role: ParticipantRole,
        connection_id: ConnectionId,
    ) {
        let mut inner = self.inner.lock().await;
        let slot_key = (key.clone(), role);
        if inner
            .rooms
            .get(&slot_key)
            .is_some_and(|slot| slot.connection_id == connection_id)
        {
            inner.rooms.remove(&slot_key);
        }
    }

    pub(crate) async fn room_sender(
        &self,
        key: &ConversationKey,
        role: ParticipantRole,
    ) -> Option<RoomSender> {
        let inner = self.inner.lock().await;
        inner
            .rooms
            .get(&(key.clone(), role))
            .map(|slot| slot.sender.clone())
    }

    pub(crate) async fn register_monitor(
        &self,
        lawyer_id: &LawyerId,
        sender: MonitorSender,
    ) -> ConnectionId {
        let mut inner = self.inner.lock().await;
        let connection_id = inner.next_connection_id();
        inner.monitors.insert(
            lawyer_id.clone(),
            Slot {
                connection_id,
                sender,
            },
        );
        connection_id
    }

    pub(crate) async fn deregister_monitor(
        &self,
        lawyer_id: &LawyerId,
        connection_id: ConnectionId,
    ) {
        let mut inner = self.inner.lock().await;
        if inner
            .monitors
            .get(lawyer_id)
            .is_some_and(|slot| slot.connection_id == connection_id)
        {
            inner.monitors.remove(lawyer_id);
        }
    }

    pub(crate) async fn monitor_sender(&self, lawyer_id: &LawyerId) -> Option<MonitorSender> {
        let inner = self.inner.lock().await;
        inner
            .monitors
            .get(lawyer_id)
            .map(|slot| slot.sender.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::domain::ClientId;

    fn key() -> ConversationKey {
        ConversationKey::new(LawyerId::new("L1"), ClientId::new("C1"))
    }

    #[tokio::test]
    async fn replacement_closes_previous_room_slot() {
        let registry = SessionRegistry::new();
        let (first_tx, mut first_rx) = mpsc::unbounded_channel();
        let (second_tx, _second_rx) = mpsc::unbounded_channel();

        registry
            .register_room(&key(), ParticipantRole::Client, first_tx)
            .await;
        registry
            .register_room(&key(), ParticipantRole::Client, second_tx)
            .await;

        // The first sender was dropped by the replacement, so its
        // receiver sees end-of-stream.
        assert!(first_rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn stale_deregistration_does_not_evict_replacement() {
        let registry = SessionRegistry::new();
        let (first_tx, _first_rx) = mpsc::unbounded_channel();
        let (second_tx, mut second_rx) = mpsc::unbounded_channel();

        let first_id = registry
            .register_room(&key(), ParticipantRole::Lawyer, first_tx)
            .await;
        registry
            .register_room(&key(), ParticipantRole::Lawyer, second_tx)
            .await;

        registry
            .deregister_room(&key(), ParticipantRole::Lawyer, first_id)
            .await;

        let sender = registry
            .room_sender(&key(), ParticipantRole::Lawyer)
            .await
            .expect("replacement still registered");
        sender
            .send(RoomFrame::Notice(shared::protocol::RoomNotice::error("x")))
            .expect("send");
        assert!(second_rx.recv().await.is_some());
    }

    #[tokio::test]
    async fn deregistration_is_idempotent_and_synchronous() {
        let registry = SessionRegistry::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let id = registry
            .register_room(&key(), ParticipantRole::Client, tx)
            .await;

        registry
            .deregister_room(&key(), ParticipantRole::Client, id)
            .await;
        registry
            .deregister_room(&key(), ParticipantRole::Client, id)
            .await;

        assert!(registry
            .room_sender(&key(), ParticipantRole::Client)
            .await
            .is_none());

        // A same-identity reconnection is never rejected.
        let (tx, _rx) = mpsc::unbounded_channel();
        registry
            .register_room(&key(), ParticipantRole::Client, tx)
            .await;
        assert!(registry
            .room_sender(&key(), ParticipantRole::Client)
            .await
            .is_some());
    }

    #[tokio::test]
    async fn monitor_slot_is_per_lawyer_and_last_writer_wins() {
        let registry = SessionRegistry::new();
        let (first_tx, mut first_rx) = mpsc::unbounded_channel();
        let (second_tx, _second_rx) = mpsc::unbounded_channel();
        let lawyer = LawyerId::new("L1");

        registry.register_monitor(&lawyer, first_tx).await;
        registry.register_monitor(&lawyer, second_tx).await;

        assert!(first_rx.recv().await.is_none());
        assert!(registry.monitor_sender(&lawyer).await.is_some());
        assert!(registry
            .monitor_sender(&LawyerId::new("L2"))
            .await
            .is_none());
    }
}
