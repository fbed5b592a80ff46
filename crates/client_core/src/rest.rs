use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use shared::{
    domain::{ConversationKey, LawyerId},
    protocol::{ChatMessage, ConversationSummary},
};

/// Read side of the History Store, as consumed by the controllers.
/// A trait so tests can stub the collaborator.
#[async_trait]
pub trait HistoryApi: Send + Sync {
    /// Full ordered history of one conversation; used once per open
    /// and again after each reconnect.
    async fn fetch_history(&self, key: &ConversationKey) -> Result<Vec<ChatMessage>>;

    /// Every conversation under one lawyer; polled by the dashboard.
    async fn list_conversations(&self, lawyer_id: &LawyerId)
        -> Result<Vec<ConversationSummary>>;
}

pub struct RestHistoryApi {
    http: Client,
    base_url: String,
}

impl RestHistoryApi {
    /// `base_url` like `http://127.0.0.1:8003`.
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            http: Client::new(),
            base_url,
        }
    }
}

#[async_trait]
impl HistoryApi for RestHistoryApi {
    async fn fetch_history(&self, key: &ConversationKey) -> Result<Vec<ChatMessage>> {
        let url = format!(
            "{}/api/chats/{}/{}/messages",
            self.base_url, key.lawyer_id, key.client_id
        );
        let response = self.http.get(url).send().await?.error_for_status()?;
        Ok(response.json().await?)
    }

    async fn list_conversations(
        &self,
        lawyer_id: &LawyerId,
    ) -> Result<Vec<ConversationSummary>> {
        let url = format!("{}/api/lawyers/{}/chats", self.base_url, lawyer_id);
        let response = self.http.get(url).send().await?.error_for_status()?;
        Ok(response.json().await?)
    }
}
