//! IRC message prefix types.
//!
//! A prefix identifies the origin of a message: either a server name or a
//! user's `nick!user@host` mask.
//!
//! # Reference
//! - RFC 2812 Section 2.3.1: Message format

use std::str::FromStr;

use crate::error::MessageParseError;

/// IRC message prefix - identifies the origin of a message.
///
/// `name` is always present. `user` and `host` are optional and only
/// meaningful alongside the name.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct Prefix {
    /// Nickname or server name.
    pub name: String,
    /// Username (ident), the part after `!`.
    pub user: Option<String>,
    /// Hostname, the part after `@`.
    pub host: Option<String>,
}

impl Prefix {
    /// Create a bare prefix with only a name (server or nick).
    pub fn new(name: impl Into<String>) -> Self {
        Prefix {
            name: name.into(),
            user: None,
            host: None,
        }
    }

    /// Create a full `nick!user@host` prefix.
    pub fn full(
        nick: impl Into<String>,
        user: impl Into<String>,
        host: impl Into<String>,
    ) -> Self {
        Prefix {
            name: nick.into(),
            user: Some(user.into()),
            host: Some(host.into()),
        }
    }

    /// Placeholder identity used for the server before registration tells
    /// us its real name.
    pub fn unknown_server() -> Self {
        Prefix::new("*")
    }
}

impl FromStr for Prefix {
    type Err = MessageParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || s.contains(' ') {
            return Err(MessageParseError::InvalidPrefix(s.to_owned()));
        }

        let (rest, host) = match s.split_once('@') {
            Some((rest, host)) => (rest, Some(host.to_owned())),
            None => (s, None),
        };
        let (name, user) = match rest.split_once('!') {
            Some((name, user)) => (name, Some(user.to_owned())),
            None => (rest, None),
        };

        if name.is_empty() {
            return Err(MessageParseError::InvalidPrefix(s.to_owned()));
        }

        Ok(Prefix {
            name: name.to_owned(),
            user,
            host,
        })
    }
}

impl From<&str> for Prefix {
    /// Lenient conversion; an unparseable string becomes a bare name.
    fn from(s: &str) -> Self {
        s.parse().unwrap_or_else(|_| Prefix::new(s))
    }
}
