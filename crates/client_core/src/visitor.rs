use std::{path::Path, sync::Arc};

use anyhow::Result;
use shared::domain::{ClientId, ConversationKey, LawyerId, ParticipantRole};

use crate::identity::load_or_create_client_id;
use crate::rest::HistoryApi;
use crate::room::{RoomChannel, SendError};
use crate::supervisor::RECONNECT_DELAY;
use crate::transport::ChannelFactory;

/// The visitor-side chat widget: one lazily opened room channel, no
/// monitor channel. The visitor's identity is generated once per
/// storage profile and reused across openings.
pub struct VisitorChat {
    client_id: ClientId,
    room: RoomChannel,
}

impl VisitorChat {
    pub async fn open(
        lawyer_id: LawyerId,
        identity_path: &Path,
        history: Arc<dyn HistoryApi>,
        channels: &dyn ChannelFactory,
    ) -> Result<Self> {
        let client_id = load_or_create_client_id(identity_path)?;
        let key = ConversationKey::new(lawyer_id, client_id.clone());
        let connector = channels.room(&key, ParticipantRole::Client);
        let room = RoomChannel::open(
            key,
            ParticipantRole::Client,
            history,
            connector,
            RECONNECT_DELAY,
        )
        .await;
        Ok(Self { client_id, room })
    }

    pub fn client_id(&self) -> &ClientId {
        &self.client_id
    }

    pub fn room(&self) -> &RoomChannel {
        &self.room
    }

    pub async fn send(&self, text: &str) -> Result<(), SendError> {
        self.room.send(text).await
    }

    pub fn close(&self) {
        self.room.close();
    }
}
