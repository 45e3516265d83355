use std::collections::HashMap;

use crate::prefix::Prefix;

/// An owned IRC message.
///
/// Holds IRCv3 tags, an optional prefix (source), the command token and
/// its parameters. Parameter order is significant and reproduced verbatim
/// on serialization.
///
/// # Example
///
/// ```
/// use slirc_client::Message;
///
/// let msg: Message = ":nick!user@host PRIVMSG #channel :Hello!".parse().unwrap();
/// assert_eq!(msg.command, "PRIVMSG");
/// assert_eq!(msg.params, vec!["#channel", "Hello!"]);
///
/// let out = Message::new("JOIN", ["#rust"]);
/// assert_eq!(out.to_string(), "JOIN #rust\r\n");
/// ```
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct Message {
    /// IRCv3 message tags (e.g., `time`, `msgid`). Possibly empty.
    pub tags: HashMap<String, String>,
    /// Message prefix/source (e.g., `nick!user@host`).
    pub prefix: Option<Prefix>,
    /// The command token, numeric or alphabetic.
    pub command: String,
    /// Command parameters, the last one may contain spaces.
    pub params: Vec<String>,
}

impl Message {
    /// Build a message from a command and its parameters.
    #[must_use]
    pub fn new<C, I, P>(command: C, params: I) -> Self
    where
        C: Into<String>,
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        Message {
            tags: HashMap::new(),
            prefix: None,
            command: command.into(),
            params: params.into_iter().map(Into::into).collect(),
        }
    }

    /// Attach a tag, replacing any previous value for `key`.
    #[must_use]
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Attach a prefix.
    #[must_use]
    pub fn with_prefix(mut self, prefix: Prefix) -> Self {
        self.prefix = Some(prefix);
        self
    }

    /// Get parameter `index`, if present.
    pub fn param(&self, index: usize) -> Option<&str> {
        self.params.get(index).map(String::as_str)
    }

    /// The last parameter, conventionally the human-readable text.
    pub fn last_param(&self) -> Option<&str> {
        self.params.last().map(String::as_str)
    }

    /// Get the value of an IRCv3 tag by key.
    pub fn tag_value(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    /// Get the nickname (or server name) from the message prefix.
    pub fn source_name(&self) -> Option<&str> {
        self.prefix.as_ref().map(|p| p.name.as_str())
    }

    /// Get the server-time tag value.
    pub fn server_time(&self) -> Option<&str> {
        self.tag_value("time")
    }

    /// Get the labeled-response label tag.
    pub fn label(&self) -> Option<&str> {
        self.tag_value("label")
    }

    /// Get the batch reference tag.
    pub fn batch_ref(&self) -> Option<&str> {
        self.tag_value("batch")
    }

    /// Whether the command is a three-digit numeric reply.
    pub fn is_numeric(&self) -> bool {
        self.command.len() == 3 && self.command.bytes().all(|b| b.is_ascii_digit())
    }

    /// Create a PRIVMSG message to a target with text.
    #[must_use]
    pub fn privmsg(target: impl Into<String>, text: impl Into<String>) -> Self {
        Message::new("PRIVMSG", [target.into(), text.into()])
    }

    /// Create a PONG echoing `token`.
    #[must_use]
    pub fn pong(token: impl Into<String>) -> Self {
        Message::new("PONG", [token.into()])
    }
}
