pub mod domain;
pub mod error;
pub mod protocol;

pub use domain::{ClientId, ConversationKey, LawyerId, ParticipantRole};
pub use error::{ApiError, ErrorCode};
pub use protocol::{ChatMessage, ConversationSummary, MonitorEvent, RoomFrame, RoomNotice};
