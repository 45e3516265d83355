//! Error types for the IRC protocol layer.
//!
//! This module defines error types for framing-level failures, message
//! parsing failures, and the client-level errors listeners and roundtrip
//! callers see.

use std::fmt;
use std::io;
use std::sync::Arc;

use thiserror::Error;

use crate::message::Message;
use crate::sasl::SaslMechanism;

/// Convenience type alias for Results using [`ProtocolError`].
pub type Result<T, E = ProtocolError> = std::result::Result<T, E>;

/// Top-level protocol errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProtocolError {
    /// I/O error during reading or writing.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// UTF-8 decoding error.
    #[error("decode error: {0}")]
    Decode(#[from] std::string::FromUtf8Error),

    /// Line exceeded maximum allowed length.
    #[error("message too long: {actual} bytes (limit {limit})")]
    MessageTooLong {
        /// Length of the offending line.
        actual: usize,
        /// Configured limit.
        limit: usize,
    },

    /// Illegal control character in message.
    #[error("illegal control character: {0:?}")]
    IllegalControlChar(char),

    /// Failed to parse an IRC message.
    #[error("invalid message: {string}")]
    InvalidMessage {
        /// The raw message string.
        string: String,
        /// The underlying parse error.
        #[source]
        cause: MessageParseError,
    },
}

/// Errors encountered when parsing IRC messages.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum MessageParseError {
    /// Message was empty.
    #[error("empty message")]
    EmptyMessage,

    /// Command was invalid or missing.
    #[error("invalid command")]
    InvalidCommand,

    /// A tag block or prefix was not followed by a space.
    #[error("missing space after {0}")]
    MissingSeparator(&'static str),

    /// Invalid message prefix.
    #[error("invalid prefix: {0}")]
    InvalidPrefix(String),

    /// Text followed the parameters, such as a bare CR inside the line.
    #[error("unexpected data at position {0}")]
    UnexpectedData(usize),

    /// Parsing error with position information.
    #[error("parsing failed at position {position}: {context}")]
    ParseContext {
        /// Character position where parsing failed.
        position: usize,
        /// Description of what was being parsed.
        context: String,
    },
}

impl ProtocolError {
    /// Wrap a parse failure together with the offending line.
    pub(crate) fn invalid(line: &str, cause: MessageParseError) -> Self {
        ProtocolError::InvalidMessage {
            string: line.to_owned(),
            cause,
        }
    }
}

/// An error reply from the server (`FAIL`, or an error numeric).
///
/// Displays as the reply's human-readable text, which is its last
/// parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IrcError {
    message: Message,
}

impl IrcError {
    /// Wrap the offending reply.
    pub fn new(message: Message) -> Self {
        Self { message }
    }

    /// The offending reply.
    pub fn message(&self) -> &Message {
        &self.message
    }

    /// The reply's command or numeric.
    pub fn command(&self) -> &str {
        &self.message.command
    }
}

impl fmt::Display for IrcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.message.last_param() {
            Some(text) if self.message.params.len() > 1 || self.message.command == "ERROR" => {
                f.write_str(text)
            }
            _ => write!(f, "{} error", self.message.command),
        }
    }
}

impl std::error::Error for IrcError {}

/// Errors reported by the client engine.
///
/// `Clone` so one error can be broadcast to every listener.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum ClientError {
    /// The transport could not be opened.
    #[error("failed to connect: {0}")]
    Connect(Arc<io::Error>),

    /// The transport failed while open.
    #[error("transport error: {0}")]
    Transport(Arc<io::Error>),

    /// The connection closed before the operation completed.
    #[error("connection closed")]
    ConnectionClosed,

    /// A line could not be decoded; the connection cannot continue.
    #[error("failed to decode message: {0}")]
    Decode(Arc<ProtocolError>),

    /// The server answered with an error reply.
    #[error("{0}")]
    Irc(IrcError),

    /// The server sent a SASL challenge none of our mechanisms expects.
    #[error("unexpected SASL challenge")]
    UnexpectedChallenge,

    /// The transport delivered a payload that is not text.
    #[error("unsupported transport payload")]
    UnsupportedPayload,

    /// The server does not offer the configured SASL mechanism.
    #[error("server does not support SASL mechanism {0}")]
    SaslUnsupported(SaslMechanism),

    /// A forward chat history fetch would collect more messages than
    /// allowed.
    #[error("chat history fetch exceeded the budget of {0} messages")]
    HistoryBudgetExceeded(usize),

    /// A reply could not be interpreted.
    #[error("malformed reply: {0}")]
    MalformedReply(String),

    /// The configured server URL is not usable.
    #[error("invalid server URL: {0}")]
    InvalidUrl(String),

    /// The client task has stopped.
    #[error("client has shut down")]
    Shutdown,
}

impl ClientError {
    /// Build a [`ClientError::Irc`] from an error reply.
    pub fn irc(message: Message) -> Self {
        ClientError::Irc(IrcError::new(message))
    }

    /// The offending server reply, for [`ClientError::Irc`].
    pub fn irc_message(&self) -> Option<&Message> {
        match self {
            ClientError::Irc(err) => Some(err.message()),
            _ => None,
        }
    }
}
