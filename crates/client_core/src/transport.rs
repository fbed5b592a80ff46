use std::sync::Arc;

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use shared::domain::{ConversationKey, LawyerId, ParticipantRole};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::debug;

/// Observable lifecycle of a logical connection. Controllers only ever
/// see these transitions; connection errors never surface as errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
}

/// One live connection: text frames both ways. The inbound receiver
/// yielding `None` means the connection closed; dropping the outbound
/// sender closes it from this side.
pub struct Connection {
    pub outbound: mpsc::UnboundedSender<String>,
    pub inbound: mpsc::UnboundedReceiver<String>,
}

/// Factory for one fixed connection identity. The identity (URL, key,
/// role) is set at construction and never mutated; reconnecting means
/// asking the same connector for a fresh `Connection`.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Connection>;
}

/// WebSocket connector over tokio-tungstenite.
pub struct WsConnector {
    url: String,
}

impl WsConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self) -> Result<Connection> {
        let (stream, _) = connect_async(&self.url)
            .await
            .with_context(|| format!("failed to connect websocket: {}", self.url))?;
        let (mut ws_writer, mut ws_reader) = stream.split();

        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<String>();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<String>();

        tokio::spawn(async move {
            while let Some(text) = outbound_rx.recv().await {
                if ws_writer.send(Message::Text(text)).await.is_err() {
                    return;
                }
            }
            let _ = ws_writer.send(Message::Close(None)).await;
        });

        tokio::spawn(async move {
            while let Some(frame) = ws_reader.next().await {
                match frame {
                    Ok(Message::Text(text)) => {
                        if inbound_tx.send(text).is_err() {
                            return;
                        }
                    }
                    Ok(Message::Close(_)) => return,
                    Ok(_) => {}
                    Err(error) => {
                        debug!(%error, "websocket receive failed");
                        return;
                    }
                }
            }
        });

        Ok(Connection {
            outbound: outbound_tx,
            inbound: inbound_rx,
        })
    }
}

/// Builds connectors for the gateway's two endpoints. Controllers take
/// this as a seam so tests can substitute in-memory transports.
pub trait ChannelFactory: Send + Sync {
    fn room(&self, key: &ConversationKey, role: ParticipantRole) -> Arc<dyn Connector>;
    fn monitor(&self, lawyer_id: &LawyerId) -> Arc<dyn Connector>;
}

pub struct WsChannelFactory {
    ws_base_url: String,
}

impl WsChannelFactory {
    /// `ws_base_url` like `ws://127.0.0.1:8003`.
    pub fn new(ws_base_url: impl Into<String>) -> Self {
        let ws_base_url = ws_base_url.into().trim_end_matches('/').to_string();
        Self { ws_base_url }
    }
}

impl ChannelFactory for WsChannelFactory {
    fn room(&self, key: &ConversationKey, role: ParticipantRole) -> Arc<dyn Connector> {
        Arc::new(WsConnector::new(format!(
            "{}/ws/chat/{}/{}/{}",
            self.ws_base_url, key.lawyer_id, key.client_id, role
        )))
    }

    fn monitor(&self, lawyer_id: &LawyerId) -> Arc<dyn Connector> {
        Arc::new(WsConnector::new(format!(
            "{}/ws/monitor/{}",
            self.ws_base_url, lawyer_id
        )))
    }
}
