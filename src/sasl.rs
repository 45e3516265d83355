//! SASL authentication helpers for IRC.
//!
//! The client sends the mechanism name and, without waiting for the
//! server's empty challenge, the whole initial response. Every supported
//! mechanism completes in that single step.
//!
//! # Supported Mechanisms
//!
//! - **PLAIN**: Simple username/password authentication (RFC 4616)
//! - **EXTERNAL**: Certificate-based authentication (client cert)
//! - **OAUTHBEARER**: Bearer token authentication (RFC 7628)
//!
//! # Reference
//! - IRCv3 SASL: <https://ircv3.net/specs/extensions/sasl-3.2>
//!
//! # Example
//!
//! ```
//! use slirc_client::sasl::{SaslCredentials, SaslMechanism};
//!
//! let creds = SaslCredentials::Plain {
//!     username: "myuser".into(),
//!     password: "mypassword".into(),
//! };
//! assert_eq!(creds.mechanism(), SaslMechanism::Plain);
//! let lines = creds.authenticate_messages();
//! assert_eq!(lines.len(), 1);
//! ```

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::Deserialize;

use crate::message::Message;

/// Maximum length of a single SASL message chunk (400 bytes).
///
/// SASL responses that exceed this length must be split into multiple
/// AUTHENTICATE commands.
pub const SASL_CHUNK_SIZE: usize = 400;

/// Supported SASL authentication mechanisms.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SaslMechanism {
    /// PLAIN mechanism (RFC 4616) - simple username/password.
    Plain,
    /// EXTERNAL mechanism - uses TLS client certificate.
    External,
    /// OAUTHBEARER mechanism (RFC 7628) - pre-obtained bearer token.
    OAuthBearer,
}

impl SaslMechanism {
    /// Parse a mechanism name string.
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "PLAIN" => Some(Self::Plain),
            "EXTERNAL" => Some(Self::External),
            "OAUTHBEARER" => Some(Self::OAuthBearer),
            _ => None,
        }
    }

    /// Returns the canonical name of this mechanism.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Plain => "PLAIN",
            Self::External => "EXTERNAL",
            Self::OAuthBearer => "OAUTHBEARER",
        }
    }
}

impl std::fmt::Display for SaslMechanism {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One configured set of SASL credentials.
///
/// Being an enum, at most one mechanism can be configured at a time. In
/// TOML it reads as a table tagged by `mechanism`:
///
/// ```toml
/// [sasl]
/// mechanism = "plain"
/// username = "alice"
/// password = "hunter2"
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(tag = "mechanism", rename_all = "lowercase")]
pub enum SaslCredentials {
    /// PLAIN username and password.
    Plain {
        /// Authentication identity.
        username: String,
        /// Password.
        password: String,
    },
    /// EXTERNAL; the TLS client certificate identifies us.
    External,
    /// OAUTHBEARER with an already-obtained token.
    #[serde(rename = "oauthbearer")]
    OAuthBearer {
        /// Bearer token.
        token: String,
    },
}

impl SaslCredentials {
    /// The mechanism these credentials use.
    pub fn mechanism(&self) -> SaslMechanism {
        match self {
            Self::Plain { .. } => SaslMechanism::Plain,
            Self::External => SaslMechanism::External,
            Self::OAuthBearer { .. } => SaslMechanism::OAuthBearer,
        }
    }

    /// The base64-encoded initial response, `+` when empty.
    pub fn initial_response(&self) -> String {
        match self {
            Self::Plain { username, password } => encode_plain(username, password),
            Self::External => encode_external(None),
            Self::OAuthBearer { token } => encode_oauthbearer(token),
        }
    }

    /// The `AUTHENTICATE` lines carrying the initial response.
    pub fn authenticate_messages(&self) -> Vec<Message> {
        authenticate_messages(&self.initial_response())
    }
}

/// Encode credentials for the PLAIN mechanism.
///
/// The PLAIN mechanism encodes: `authzid NUL authcid NUL password`, with
/// an empty authzid.
///
/// ```
/// use slirc_client::sasl::encode_plain;
///
/// assert_eq!(encode_plain("u", "p"), "AHUAcA==");
/// ```
pub fn encode_plain(username: &str, password: &str) -> String {
    let payload = format!("\0{}\0{}", username, password);
    BASE64.encode(payload.as_bytes())
}

/// Encode an EXTERNAL mechanism response.
///
/// Without an authorization identity the response is empty (`+`).
pub fn encode_external(authzid: Option<&str>) -> String {
    match authzid {
        Some(id) if !id.is_empty() => BASE64.encode(id.as_bytes()),
        _ => "+".to_owned(),
    }
}

/// Encode an OAUTHBEARER (RFC 7628) initial client response.
pub fn encode_oauthbearer(token: &str) -> String {
    let payload = format!("n,,\x01auth=Bearer {}\x01\x01", token);
    BASE64.encode(payload.as_bytes())
}

/// Split an encoded SASL response into chunks for transmission.
///
/// Base64 output is ASCII, so byte chunks are always valid UTF-8.
pub fn chunk_response(encoded: &str) -> impl Iterator<Item = &str> {
    encoded
        .as_bytes()
        .chunks(SASL_CHUNK_SIZE)
        .filter_map(|chunk| std::str::from_utf8(chunk).ok())
}

/// Build the `AUTHENTICATE` lines for an encoded response.
///
/// A response whose last chunk is exactly [`SASL_CHUNK_SIZE`] bytes is
/// followed by `AUTHENTICATE +` so the server knows it is complete.
pub fn authenticate_messages(encoded: &str) -> Vec<Message> {
    if encoded.is_empty() || encoded == "+" {
        return vec![Message::new("AUTHENTICATE", ["+"])];
    }
    let mut lines: Vec<Message> = chunk_response(encoded)
        .map(|chunk| Message::new("AUTHENTICATE", [chunk]))
        .collect();
    if encoded.len() % SASL_CHUNK_SIZE == 0 {
        lines.push(Message::new("AUTHENTICATE", ["+"]));
    }
    lines
}

/// Decode a base64-encoded SASL challenge or response.
pub fn decode_base64(encoded: &str) -> Result<Vec<u8>, base64::DecodeError> {
    if encoded == "+" {
        return Ok(Vec::new());
    }
    BASE64.decode(encoded)
}

/// SASL authentication progress of one connection.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum SaslState {
    /// Not attempted.
    #[default]
    Initial,
    /// Mechanism and initial response sent, waiting for the result.
    InProgress(SaslMechanism),
    /// Authentication succeeded.
    Success,
    /// Authentication failed.
    Failed(String),
    /// We aborted with `AUTHENTICATE *`.
    Aborted,
}

impl SaslState {
    /// Check if an exchange is outstanding.
    pub fn is_in_progress(&self) -> bool {
        matches!(self, Self::InProgress(_))
    }

    /// Check if authentication is complete (success or failure).
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Success | Self::Failed(_) | Self::Aborted)
    }

    /// Check if authentication succeeded.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}
