//! Results of batch-based queries: chat history and bouncer networks.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::ircv3::{parse_server_time, Batch};
use crate::message::tags::parse_tags;
use crate::message::Message;

/// Batch type of CHATHISTORY message replies.
pub const CHATHISTORY_BATCH: &str = "chathistory";
/// Batch type of `CHATHISTORY TARGETS` replies.
pub const CHATHISTORY_TARGETS_BATCH: &str = "draft/chathistory-targets";
/// Batch type of `BOUNCER LISTNETWORKS` replies.
pub const BOUNCER_NETWORKS_BATCH: &str = "soju.im/bouncer-networks";

/// A completed batch and the messages it contained, in arrival order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatchResult {
    /// The batch as it was opened.
    pub batch: Arc<Batch>,
    /// Every message whose batch ancestry includes this batch.
    pub messages: Vec<Message>,
}

/// One page of chat history.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HistoryPage {
    /// Messages, oldest first.
    pub messages: Vec<Message>,
    /// The page was full, so older messages may exist.
    pub more: bool,
}

/// A conversation with recent activity, from `CHATHISTORY TARGETS`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HistoryTarget {
    /// Channel or nickname.
    pub name: String,
    /// Time of the latest message.
    pub latest: Option<DateTime<Utc>>,
}

impl HistoryTarget {
    /// Parse `CHATHISTORY TARGETS <name> <timestamp>`.
    pub fn from_message(msg: &Message) -> Option<Self> {
        if msg.command != "CHATHISTORY" || msg.param(0) != Some("TARGETS") {
            return None;
        }
        Some(HistoryTarget {
            name: msg.param(1)?.to_owned(),
            latest: msg.param(2).and_then(parse_server_time),
        })
    }
}

/// A network served by a soju bouncer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BouncerNetwork {
    /// Network id, as used by `BOUNCER BIND`.
    pub id: String,
    /// Attributes such as `name`, `host` and `state`.
    pub attributes: HashMap<String, String>,
}

impl BouncerNetwork {
    /// Parse `BOUNCER NETWORK <id> <attributes>`.
    ///
    /// Attributes use the message-tag encoding.
    pub fn from_message(msg: &Message) -> Option<Self> {
        if msg.command != "BOUNCER" || msg.param(0) != Some("NETWORK") {
            return None;
        }
        Some(BouncerNetwork {
            id: msg.param(1)?.to_owned(),
            attributes: msg.param(2).map(parse_tags).unwrap_or_default(),
        })
    }

    /// Display name.
    pub fn name(&self) -> Option<&str> {
        self.attributes.get("name").map(String::as_str)
    }

    /// Connection state (`connected`, `connecting`, `disconnected`).
    pub fn state(&self) -> Option<&str> {
        self.attributes.get("state").map(String::as_str)
    }
}
