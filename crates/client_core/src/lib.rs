//! Client-side controllers for the consultation messaging core: the
//! visitor chat widget, the lawyer dashboard session (monitor channel,
//! conversation-list polling, unread counter), and the reconnection
//! supervisor both sides share.

pub mod identity;
pub mod lawyer;
pub mod rest;
pub mod room;
pub mod supervisor;
pub mod transport;
pub mod visitor;

pub use identity::load_or_create_client_id;
pub use lawyer::{DashboardEvent, LawyerSession, SessionConfig, CONVERSATION_POLL_INTERVAL};
pub use rest::{HistoryApi, RestHistoryApi};
pub use room::{ChatEvent, RoomChannel, SendError};
pub use supervisor::{supervise, SupervisedChannel, RECONNECT_DELAY};
pub use transport::{
    ChannelFactory, Connection, ConnectionState, Connector, WsChannelFactory, WsConnector,
};
pub use visitor::VisitorChat;

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
