//! IRCv3 capability negotiation support.
//!
//! [`CapRegistry`] tracks what the server advertises and what it has
//! acknowledged, and builds the `CAP REQ` the client sends once discovery
//! is complete.
//!
//! # Reference
//! - IRCv3 Capability Negotiation: <https://ircv3.net/specs/extensions/capability-negotiation>

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::message::Message;

/// Definition of a capability the client knows how to use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityDef {
    /// Capability name (e.g., "multi-prefix")
    pub name: &'static str,
    /// Human-readable description
    pub description: &'static str,
}

/// Capabilities requested whenever the server offers them.
pub const PERMANENT_CAPS: &[CapabilityDef] = &[
    CapabilityDef {
        name: "account-notify",
        description: "ACCOUNT command for login/logout",
    },
    CapabilityDef {
        name: "away-notify",
        description: "AWAY status changes of channel members",
    },
    CapabilityDef {
        name: "batch",
        description: "Multi-line response grouping",
    },
    CapabilityDef {
        name: "chghost",
        description: "CHGHOST notification on user/host changes",
    },
    CapabilityDef {
        name: "echo-message",
        description: "Copy of PRIVMSG/NOTICE sent back to us",
    },
    CapabilityDef {
        name: "extended-join",
        description: "JOIN includes account + realname",
    },
    CapabilityDef {
        name: "extended-monitor",
        description: "MONITOR targets receive away/account/chghost updates",
    },
    CapabilityDef {
        name: "invite-notify",
        description: "Notify channel members when someone is invited",
    },
    CapabilityDef {
        name: "labeled-response",
        description: "Echo label tag for request/response correlation",
    },
    CapabilityDef {
        name: "message-tags",
        description: "Client-only tags on messages",
    },
    CapabilityDef {
        name: "multi-prefix",
        description: "All membership prefixes in NAMES and WHO",
    },
    CapabilityDef {
        name: "sasl",
        description: "SASL authentication",
    },
    CapabilityDef {
        name: "server-time",
        description: "time tag on messages",
    },
    CapabilityDef {
        name: "setname",
        description: "SETNAME realname changes",
    },
    CapabilityDef {
        name: "draft/account-registration",
        description: "REGISTER/VERIFY commands",
    },
    CapabilityDef {
        name: "draft/chathistory",
        description: "CHATHISTORY command",
    },
    CapabilityDef {
        name: "draft/extended-monitor",
        description: "Pre-ratification name of extended-monitor",
    },
    CapabilityDef {
        name: "draft/read-marker",
        description: "MARKREAD command",
    },
    CapabilityDef {
        name: "soju.im/bouncer-networks",
        description: "BOUNCER network listing and binding",
    },
    CapabilityDef {
        name: "soju.im/no-implicit-names",
        description: "No automatic NAMES reply after JOIN",
    },
];

/// Only requested when no bouncer network is bound.
pub const BOUNCER_NETWORKS_NOTIFY: &str = "soju.im/bouncer-networks-notify";
/// Only requested when event playback is configured.
pub const EVENT_PLAYBACK: &str = "draft/event-playback";

/// The full list of capabilities to request for a given configuration.
pub fn wanted_caps(event_playback: bool, bouncer_bound: bool) -> Vec<&'static str> {
    let mut caps: Vec<&'static str> = PERMANENT_CAPS.iter().map(|cap| cap.name).collect();
    if !bouncer_bound {
        caps.push(BOUNCER_NETWORKS_NOTIFY);
    }
    if event_playback {
        caps.push(EVENT_PLAYBACK);
    }
    caps
}

/// Split a space-separated capability list into `(name, value)` pairs.
///
/// A capability without `=` gets an empty value.
pub fn parse_cap_list(list: &str) -> impl Iterator<Item = (&str, &str)> {
    list.split(' ')
        .filter(|s| !s.is_empty())
        .map(|token| token.split_once('=').unwrap_or((token, "")))
}

/// Whether a `CAP LS` reply is the last one of its listing.
///
/// Multi-line listings mark every line but the last with a `*` before the
/// capability list.
pub fn is_final_ls(msg: &Message) -> bool {
    msg.params.len() < 4 || msg.param(2) != Some("*")
}

/// Available vs. enabled capabilities of one connection.
#[derive(Debug, Clone, Default)]
pub struct CapRegistry {
    available: HashMap<String, String>,
    enabled: HashSet<String>,
}

impl CapRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a `CAP` message to the registry.
    ///
    /// Handles `LS`, `NEW`, `DEL` and `ACK`. `NAK` changes nothing here;
    /// the caller decides how negotiation proceeds.
    pub fn parse(&mut self, msg: &Message) {
        let Some(subcommand) = msg.param(1) else {
            return;
        };
        let list = msg.last_param().unwrap_or_default();

        match subcommand {
            "LS" | "NEW" => {
                for (name, value) in parse_cap_list(list) {
                    self.available.insert(name.to_owned(), value.to_owned());
                }
            }
            "DEL" => {
                for (name, _) in parse_cap_list(list) {
                    self.available.remove(name);
                    self.enabled.remove(name);
                }
            }
            "ACK" => {
                for (name, _) in parse_cap_list(list) {
                    match name.strip_prefix('-') {
                        Some(disabled) => {
                            self.enabled.remove(disabled);
                        }
                        None => {
                            self.enabled.insert(name.to_owned());
                        }
                    }
                }
            }
            _ => {}
        }
    }

    /// Build a `CAP REQ` for the wanted capabilities that are available but
    /// not yet enabled.
    ///
    /// Returns `None` when nothing new is wanted, so negotiation never
    /// stalls waiting on an empty request.
    pub fn request_available(&self, wanted: &[&str]) -> Option<Message> {
        let caps: Vec<&str> = wanted
            .iter()
            .copied()
            .filter(|cap| self.available.contains_key(*cap) && !self.enabled.contains(*cap))
            .collect();
        if caps.is_empty() {
            return None;
        }
        debug!(caps = %caps.join(" "), "requesting capabilities");
        Some(Message::new("CAP", ["REQ".to_owned(), caps.join(" ")]))
    }

    /// Whether the server offers SASL with `mechanism`.
    ///
    /// An empty `sasl` value means the server did not list mechanisms; that
    /// counts as supported.
    pub fn supports_sasl(&self, mechanism: &str) -> bool {
        match self.available.get("sasl") {
            None => false,
            Some(mechs) if mechs.is_empty() => true,
            Some(mechs) => mechs
                .split(',')
                .any(|m| m.eq_ignore_ascii_case(mechanism)),
        }
    }

    /// Whether `name` was acknowledged.
    pub fn is_enabled(&self, name: &str) -> bool {
        self.enabled.contains(name)
    }

    /// Whether the server advertises `name`.
    pub fn is_available(&self, name: &str) -> bool {
        self.available.contains_key(name)
    }

    /// The advertised value of `name`.
    pub fn value(&self, name: &str) -> Option<&str> {
        self.available.get(name).map(String::as_str)
    }

    /// Iterate over every advertised capability.
    pub fn available(&self) -> impl Iterator<Item = (&str, &str)> {
        self.available.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Iterate over every enabled capability.
    pub fn enabled(&self) -> impl Iterator<Item = &str> {
        self.enabled.iter().map(String::as_str)
    }

    /// Forget everything; used when the connection closes.
    pub fn clear(&mut self) {
        self.available.clear();
        self.enabled.clear();
    }
}
