use std::{sync::Arc, time::Duration};

use tokio::sync::{mpsc, watch};
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::transport::{ConnectionState, Connector};

/// Fixed reconnect delay. No backoff growth and no retry cap: the
/// monitor channel is best-effort and the conversation-list poll
/// bounds how stale a disconnected dashboard can get.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(3);

/// Handle to a logical connection kept alive by the reconnect loop.
/// The owner sends outbound frames and observes state transitions;
/// it never sees individual connection failures.
pub struct SupervisedChannel {
    outbound: mpsc::UnboundedSender<String>,
    state: watch::Receiver<ConnectionState>,
    shutdown: watch::Sender<bool>,
}

impl SupervisedChannel {
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Queues a frame for the current connection. A frame sent while
    /// no connection is live is dropped, not buffered for the next
    /// one; callers gate sends on `state() == Open`.
    pub fn send(&self, text: String) {
        let _ = self.outbound.send(text);
    }

    /// Intentional close: the loop exits without reconnecting.
    pub fn close(&self) {
        let _ = self.shutdown.send(true);
    }
}

/// Keeps one logical connection alive across transient failures.
/// Inbound frames go to `inbound_sink`; the sink closing stops the
/// loop. Reconnection happens only after abnormal closure — a
/// `close()` on the handle ends the loop for good.
pub fn supervise(
    connector: Arc<dyn Connector>,
    delay: Duration,
    inbound_sink: mpsc::UnboundedSender<String>,
) -> SupervisedChannel {
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tokio::spawn(run(
        connector,
        delay,
        state_tx,
        inbound_sink,
        outbound_rx,
        shutdown_rx,
    ));

    SupervisedChannel {
        outbound: outbound_tx,
        state: state_rx,
        shutdown: shutdown_tx,
    }
}

async fn run(
    connector: Arc<dyn Connector>,
    delay: Duration,
    state_tx: watch::Sender<ConnectionState>,
    inbound_sink: mpsc::UnboundedSender<String>,
    mut outbound_rx: mpsc::UnboundedReceiver<String>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        let _ = state_tx.send(ConnectionState::Connecting);

        let connected = tokio::select! {
            result = connector.connect() => result,
            _ = shutdown_requested(&mut shutdown_rx) => {
                let _ = state_tx.send(ConnectionState::Closed);
                return;
            }
        };

        match connected {
            Ok(mut connection) => {
                // Anything still queued was sent while disconnected and
                // is stale; owners gate sends on observing Open.
                while outbound_rx.try_recv().is_ok() {
                    debug!("dropping frame sent while disconnected");
                }
                let _ = state_tx.send(ConnectionState::Open);
                loop {
                    tokio::select! {
                        inbound = connection.inbound.recv() => match inbound {
                            Some(frame) => {
                                if inbound_sink.send(frame).is_err() {
                                    return;
                                }
                            }
                            // Abnormal closure: fall through to retry.
                            None => break,
                        },
                        outbound = outbound_rx.recv() => match outbound {
                            Some(text) => {
                                let _ = connection.outbound.send(text);
                            }
                            // Owner dropped the handle.
                            None => return,
                        },
                        _ = shutdown_requested(&mut shutdown_rx) => {
                            let _ = state_tx.send(ConnectionState::Closed);
                            return;
                        }
                    }
                }
                let _ = state_tx.send(ConnectionState::Closed);
                warn!("connection lost, retrying after fixed delay");
            }
            Err(error) => {
                let _ = state_tx.send(ConnectionState::Closed);
                warn!(%error, "connect failed, retrying after fixed delay");
            }
        }

        // Fixed-interval wait. Frames arriving while disconnected are
        // dropped so a reconnect never replays stale buffered sends.
        let backoff = sleep(delay);
        tokio::pin!(backoff);
        loop {
            tokio::select! {
                _ = &mut backoff => break,
                _ = shutdown_requested(&mut shutdown_rx) => return,
                dropped = outbound_rx.recv() => match dropped {
                    Some(_) => debug!("dropping frame sent while disconnected"),
                    None => return,
                },
            }
        }
    }
}

async fn shutdown_requested(shutdown_rx: &mut watch::Receiver<bool>) {
    // Errors mean the handle is gone, which is also a stop signal.
    let _ = shutdown_rx.wait_for(|requested| *requested).await;
}
