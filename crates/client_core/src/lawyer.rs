use std::{
    sync::{
        atomic::{AtomicBool, AtomicU32, Ordering},
        Arc,
    },
    time::Duration,
};

use shared::{
    domain::{ClientId, ConversationKey, LawyerId, ParticipantRole},
    protocol::{ConversationSummary, MonitorEvent},
};
use tokio::sync::{broadcast, mpsc, watch, Mutex};
use tracing::warn;

use crate::rest::HistoryApi;
use crate::room::RoomChannel;
use crate::supervisor::{supervise, SupervisedChannel, RECONNECT_DELAY};
use crate::transport::{ChannelFactory, ConnectionState};

/// How often the dashboard re-fetches the conversation list. The list
/// is pull-based; the monitor channel only drives the unread badge.
pub const CONVERSATION_POLL_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    pub reconnect_delay: Duration,
    pub poll_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            reconnect_delay: RECONNECT_DELAY,
            poll_interval: CONVERSATION_POLL_INTERVAL,
        }
    }
}

#[derive(Debug, Clone)]
pub enum DashboardEvent {
    /// A visitor message arrived in a conversation whose room the
    /// lawyer does not have open.
    NewMessageAlert {
        conversation: ConversationKey,
        unread: u32,
    },
    MonitorState(ConnectionState),
}

/// Unread badge: counts monitor alerts, frozen at zero while the
/// lawyer is looking at the dashboard.
struct UnreadCounter {
    count: AtomicU32,
    viewing: AtomicBool,
}

impl UnreadCounter {
    fn new() -> Self {
        Self {
            count: AtomicU32::new(0),
            viewing: AtomicBool::new(false),
        }
    }

    /// Returns the count after recording, for the event payload.
    fn record(&self) -> u32 {
        if self.viewing.load(Ordering::Acquire) {
            0
        } else {
            self.count.fetch_add(1, Ordering::AcqRel) + 1
        }
    }

    fn set_viewing(&self, viewing: bool) {
        self.viewing.store(viewing, Ordering::Release);
        if viewing {
            self.count.store(0, Ordering::Release);
        }
    }

    fn count(&self) -> u32 {
        self.count.load(Ordering::Acquire)
    }
}

/// The lawyer's dashboard session: one monitor channel for the whole
/// account, one optional room channel for the conversation being read,
/// and a fixed-interval poll of the conversation list.
pub struct LawyerSession {
    lawyer_id: LawyerId,
    history: Arc<dyn HistoryApi>,
    channels: Arc<dyn ChannelFactory>,
    config: SessionConfig,
    monitor: SupervisedChannel,
    open_room: Arc<Mutex<Option<Arc<RoomChannel>>>>,
    unread: Arc<UnreadCounter>,
    conversations: watch::Receiver<Vec<ConversationSummary>>,
    events: broadcast::Sender<DashboardEvent>,
    poll_shutdown: watch::Sender<bool>,
}

impl LawyerSession {
    pub fn start(
        lawyer_id: LawyerId,
        history: Arc<dyn HistoryApi>,
        channels: Arc<dyn ChannelFactory>,
        config: SessionConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(256);
        let unread = Arc::new(UnreadCounter::new());
        let open_room: Arc<Mutex<Option<Arc<RoomChannel>>>> = Arc::new(Mutex::new(None));

        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let monitor = supervise(
            channels.monitor(&lawyer_id),
            config.reconnect_delay,
            inbound_tx,
        );

        tokio::spawn(pump_monitor(
            inbound_rx,
            Arc::clone(&open_room),
            Arc::clone(&unread),
            events.clone(),
        ));
        tokio::spawn(forward_monitor_state(
            monitor.state_changes(),
            events.clone(),
        ));

        let (conversations_tx, conversations) = watch::channel(Vec::new());
        let (poll_shutdown, poll_shutdown_rx) = watch::channel(false);
        tokio::spawn(poll_conversations(
            lawyer_id.clone(),
            Arc::clone(&history),
            config.poll_interval,
            conversations_tx,
            poll_shutdown_rx,
        ));

        Self {
            lawyer_id,
            history,
            channels,
            config,
            monitor,
            open_room,
            unread,
            conversations,
            events,
            poll_shutdown,
        }
    }

    pub fn lawyer_id(&self) -> &LawyerId {
        &self.lawyer_id
    }

    /// Opens the room for one conversation, closing whichever room was
    /// open before. While this room is open the gateway routes the
    /// conversation's messages here instead of the monitor channel.
    pub async fn open_room(&self, client_id: ClientId) -> Arc<RoomChannel> {
        let key = ConversationKey::new(self.lawyer_id.clone(), client_id);
        let connector = self.channels.room(&key, ParticipantRole::Lawyer);
        let room = Arc::new(
            RoomChannel::open(
                key,
                ParticipantRole::Lawyer,
                Arc::clone(&self.history),
                connector,
                self.config.reconnect_delay,
            )
            .await,
        );

        let mut slot = self.open_room.lock().await;
        if let Some(previous) = slot.replace(Arc::clone(&room)) {
            previous.close();
        }
        room
    }

    pub async fn close_room(&self) {
        if let Some(room) = self.open_room.lock().await.take() {
            room.close();
        }
    }

    /// Marks the dashboard itself as visible or hidden. Becoming
    /// visible clears the unread badge; alerts arriving while visible
    /// do not accumulate.
    pub fn set_viewing(&self, viewing: bool) {
        self.unread.set_viewing(viewing);
    }

    pub fn unread_count(&self) -> u32 {
        self.unread.count()
    }

    pub fn conversations(&self) -> watch::Receiver<Vec<ConversationSummary>> {
        self.conversations.clone()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<DashboardEvent> {
        self.events.subscribe()
    }

    pub fn monitor_state(&self) -> ConnectionState {
        self.monitor.state()
    }

    /// Ends the session: monitor channel, open room, and poll loop.
    pub async fn shutdown(&self) {
        self.monitor.close();
        self.close_room().await;
        let _ = self.poll_shutdown.send(true);
    }
}

async fn pump_monitor(
    mut inbound_rx: mpsc::UnboundedReceiver<String>,
    open_room: Arc<Mutex<Option<Arc<RoomChannel>>>>,
    unread: Arc<UnreadCounter>,
    events: broadcast::Sender<DashboardEvent>,
) {
    while let Some(text) = inbound_rx.recv().await {
        let event = match serde_json::from_str::<MonitorEvent>(&text) {
            Ok(event) => event,
            Err(error) => {
                warn!(%error, "dropping malformed monitor event");
                continue;
            }
        };
        let MonitorEvent::NewMessage { conversation, .. } = event;

        // The gateway suppresses events for a conversation whose room
        // socket is registered; guard here as well in case an event
        // races an open_room.
        if let Some(room) = open_room.lock().await.as_ref() {
            if room.key() == &conversation {
                continue;
            }
        }

        let unread = unread.record();
        let _ = events.send(DashboardEvent::NewMessageAlert {
            conversation,
            unread,
        });
    }
}

async fn forward_monitor_state(
    mut state_rx: watch::Receiver<ConnectionState>,
    events: broadcast::Sender<DashboardEvent>,
) {
    loop {
        let state = *state_rx.borrow_and_update();
        let _ = events.send(DashboardEvent::MonitorState(state));
        if state_rx.changed().await.is_err() {
            return;
        }
    }
}

async fn poll_conversations(
    lawyer_id: LawyerId,
    history: Arc<dyn HistoryApi>,
    interval: Duration,
    conversations_tx: watch::Sender<Vec<ConversationSummary>>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        match history.list_conversations(&lawyer_id).await {
            Ok(list) => {
                let _ = conversations_tx.send(list);
            }
            Err(error) => {
                // Keep the last good list; the next tick retries.
                warn!(%error, "conversation list poll failed");
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = shutdown_rx.wait_for(|stop| *stop) => return,
        }
    }
}

#[cfg(test)]
mod unread_tests {
    use super::UnreadCounter;

    #[test]
    fn counts_while_hidden_and_resets_on_view() {
        let counter = UnreadCounter::new();
        assert_eq!(counter.record(), 1);
        assert_eq!(counter.record(), 2);
        assert_eq!(counter.record(), 3);
        assert_eq!(counter.count(), 3);

        counter.set_viewing(true);
        assert_eq!(counter.count(), 0);
    }

    #[test]
    fn alerts_do_not_accumulate_while_viewing() {
        let counter = UnreadCounter::new();
        counter.set_viewing(true);
        assert_eq!(counter.record(), 0);
        assert_eq!(counter.count(), 0);

        counter.set_viewing(false);
        assert_eq!(counter.record(), 1);
    }
}
