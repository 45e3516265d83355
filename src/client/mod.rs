//! Async IRC client engine.
//!
//! [`Client`] owns one server connection. It registers (CAP, SASL, NICK,
//! USER), keeps the connection alive, reconnects with exponential
//! backoff and correlates requests with their replies. Everything the
//! server says is published as an [`Event`].

mod connection;
mod correlator;
mod handle;
pub mod history;
pub mod replies;

pub use self::handle::Client;
pub use self::history::{BatchResult, BouncerNetwork, HistoryPage, HistoryTarget};
pub use self::replies::{NamesMember, WhoReply, WhoisReply};
pub use crate::config::{ClientConfig, ConfigError};
pub use crate::error::{ClientError, IrcError};
pub use crate::state::{Context, Inbound, Status};

/// Something listeners are told about.
#[derive(Clone, Debug)]
pub enum Event {
    /// The connection status changed.
    StatusChanged(Status),
    /// A message was received and handled.
    Message(Inbound),
    /// Something went wrong; see [`ClientError`].
    Error(ClientError),
}
