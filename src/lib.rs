//! # slirc-client
//!
//! An IRCv3 client engine: message codec, capability and SASL
//! negotiation, ISUPPORT tracking, case-mapped name indexes, batches,
//! request/reply correlation and reconnection with exponential backoff.
//!
//! ## Features
//!
//! - IRC message parsing and serialization with IRCv3 tags
//! - `CAP LS 302` negotiation and SASL PLAIN, EXTERNAL and OAUTHBEARER
//! - Sans-IO connection state machine ([`state::Session`])
//! - Optional Tokio client ([`client::Client`]) over TCP, TLS or WebSocket
//! - Roundtrips for JOIN, WHO/WHOX, WHOIS, NAMES, CHATHISTORY and soju
//!   bouncer networks

#![deny(clippy::all)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! ## Quick Start
//!
//! ### Parsing and building messages
//!
//! ```rust
//! use slirc_client::{Message, prefix::Prefix};
//!
//! let privmsg = Message::privmsg("#rust", "Hello, world!")
//!     .with_tag("time", "2023-01-01T12:00:00.000Z")
//!     .with_prefix(Prefix::from("bot!bot@example.com"));
//! assert!(privmsg.to_string().ends_with("PRIVMSG #rust :Hello, world!\r\n"));
//!
//! let raw = "@time=2023-01-01T12:00:00Z :nick!user@host PRIVMSG #channel :Hello!";
//! let message: Message = raw.parse().expect("Valid IRC message");
//! assert_eq!(message.server_time(), Some("2023-01-01T12:00:00Z"));
//! assert_eq!(message.source_name(), Some("nick"));
//! ```
//!
//! ### Connecting
//!
//! ```no_run
//! use slirc_client::client::{Client, ClientConfig};
//!
//! # async fn demo() -> Result<(), slirc_client::client::ClientError> {
//! let config = ClientConfig::from_toml_str(
//!     r#"
//!     url = "ircs://irc.libera.chat"
//!     nick = "slirc-bot"
//!     "#,
//! )
//! .expect("valid config");
//! let client = Client::new(config);
//! client.connect();
//! client.join("#slirc", None).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Acknowledgments
//!
//! This project was inspired by the architectural patterns established by
//! [Aaron Weiss (aatxe)](https://github.com/aatxe) in the
//! [irc](https://github.com/aatxe/irc) crate. We are grateful for Aaron's
//! foundational work on IRC protocol handling in Rust.

pub mod backoff;
pub mod caps;
pub mod casemap;
pub mod config;
pub mod error;
pub mod ircv3;
pub mod isupport;
pub mod message;
pub mod prefix;
pub mod response;
pub mod sasl;
pub mod state;

#[cfg(feature = "tokio")]
#[cfg_attr(docsrs, doc(cfg(feature = "tokio")))]
pub mod client;
#[cfg(feature = "tokio")]
pub mod irc;
#[cfg(feature = "tokio")]
pub mod line;
#[cfg(feature = "tokio")]
pub mod transport;

pub use self::backoff::Backoff;
pub use self::caps::CapRegistry;
pub use self::casemap::{irc_eq, irc_to_lower, CaseMapMap, CaseMapping};
pub use self::config::ClientConfig;
pub use self::error::{ClientError, IrcError, MessageParseError, ProtocolError};
pub use self::ircv3::{Batch, BatchTracker};
pub use self::isupport::{ChanModes, Isupport, PrefixSpec};
pub use self::message::Message;
pub use self::prefix::Prefix;
pub use self::response::Response;
pub use self::sasl::{SaslCredentials, SaslMechanism, SaslState};
pub use self::state::{Inbound, Session, SessionAction, Status};

#[cfg(feature = "tokio")]
pub use self::client::{Client, Event};
#[cfg(feature = "tokio")]
pub use self::irc::IrcCodec;
#[cfg(feature = "tokio")]
pub use self::transport::{Connector, Transport, UrlConnector};
