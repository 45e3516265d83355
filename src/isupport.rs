//! ISUPPORT (`RPL_ISUPPORT`, numeric 005) registry.
//!
//! Servers advertise their features over several 005 lines. [`Isupport`]
//! keeps the raw tokens and derives typed values on access, so a derived
//! value always reflects the latest token seen.
//!
//! # Reference
//! - Modern IRC ISUPPORT: <https://modern.ircdocs.horse/#rplisupport-parameters>

use std::collections::HashMap;

use crate::casemap::CaseMapping;
use crate::message::{Message, STD_MEMBERSHIPS};

/// Default `CHANTYPES` when the server does not send one.
pub const DEFAULT_CHANTYPES: &str = "#&+!";

/// Default `LINELEN`.
pub const DEFAULT_LINELEN: usize = 512;

/// Decode the `\xHH` escapes allowed in ISUPPORT values.
///
/// Malformed escapes are kept verbatim.
pub fn unescape_value(value: &str) -> String {
    if !value.contains("\\x") {
        return value.to_owned();
    }

    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && bytes.get(i + 1) == Some(&b'x') {
            let decoded = value
                .get(i + 2..i + 4)
                .and_then(|hex| u8::from_str_radix(hex, 16).ok());
            if let Some(b) = decoded {
                out.push(b);
                i += 4;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Accumulated ISUPPORT tokens of one connection.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Isupport {
    raw: HashMap<String, String>,
}

impl Isupport {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge the tokens of one `RPL_ISUPPORT` message.
    ///
    /// The first parameter (our nick) and the trailing human-readable text
    /// are skipped. `-TOKEN` removes a previously advertised token.
    pub fn parse_message(&mut self, msg: &Message) {
        let params = &msg.params;
        if params.len() < 2 {
            return;
        }
        let tokens = &params[1..params.len() - 1];
        self.parse_tokens(tokens.iter().map(String::as_str));
    }

    /// Merge raw `KEY[=VALUE]` tokens.
    pub fn parse_tokens<'a>(&mut self, tokens: impl IntoIterator<Item = &'a str>) {
        for token in tokens {
            if token.is_empty() {
                continue;
            }
            if let Some(removed) = token.strip_prefix('-') {
                self.raw.remove(&removed.to_ascii_uppercase());
                continue;
            }
            let (key, value) = token.split_once('=').unwrap_or((token, ""));
            self.raw
                .insert(key.to_ascii_uppercase(), unescape_value(value));
        }
    }

    /// Raw value of `key`; `Some("")` for a token without value.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.raw
            .get(&key.to_ascii_uppercase())
            .map(String::as_str)
    }

    /// Whether `key` was advertised.
    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Number of tokens held.
    pub fn len(&self) -> usize {
        self.raw.len()
    }

    /// Whether no token has been received yet.
    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    /// Forget every token; used when the connection closes.
    pub fn clear(&mut self) {
        self.raw.clear();
    }

    /// The advertised case-mapping, if any and if known.
    pub fn casemapping(&self) -> Option<CaseMapping> {
        self.get("CASEMAPPING").and_then(CaseMapping::from_name)
    }

    /// MONITOR target limit: `0` when unsupported, `usize::MAX` when
    /// advertised without a limit.
    pub fn monitor(&self) -> usize {
        match self.get("MONITOR") {
            None => 0,
            Some("") => usize::MAX,
            Some(v) => v.parse().unwrap_or(0),
        }
    }

    /// CHATHISTORY page limit: `0` when unsupported, `usize::MAX` when the
    /// server sets no limit (`0` or no value).
    pub fn chathistory(&self) -> usize {
        match self.get("CHATHISTORY") {
            None => 0,
            Some(v) => match v.parse::<i64>() {
                Ok(n) if n > 0 => usize::try_from(n).unwrap_or(usize::MAX),
                _ => usize::MAX,
            },
        }
    }

    /// Whether extended WHO is supported.
    pub fn whox(&self) -> bool {
        self.contains("WHOX")
    }

    /// Channel type prefixes.
    pub fn chantypes(&self) -> &str {
        self.get("CHANTYPES").unwrap_or(DEFAULT_CHANTYPES)
    }

    /// Prefixes that may precede a channel name to target a membership
    /// level (e.g., `@#chan`).
    pub fn statusmsg(&self) -> &str {
        self.get("STATUSMSG").unwrap_or("")
    }

    /// Network name.
    pub fn network(&self) -> Option<&str> {
        self.get("NETWORK").filter(|v| !v.is_empty())
    }

    /// Bouncer network ID this connection is bound to.
    pub fn bouncer_netid(&self) -> Option<&str> {
        self.get("BOUNCER_NETID").filter(|v| !v.is_empty())
    }

    /// User mode marking bots.
    pub fn bot(&self) -> Option<char> {
        self.get("BOT").and_then(|v| v.chars().next())
    }

    /// Maximum line length in bytes.
    pub fn linelen(&self) -> usize {
        self.get("LINELEN")
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_LINELEN)
    }

    /// Membership prefix table.
    pub fn prefix(&self) -> Option<PrefixSpec> {
        self.get("PREFIX").and_then(PrefixSpec::parse)
    }

    /// Membership prefix characters, highest rank first, falling back to
    /// the common `~&@%+` set.
    pub fn memberships(&self) -> String {
        self.prefix()
            .map(|p| p.prefixes)
            .unwrap_or_else(|| STD_MEMBERSHIPS.to_owned())
    }

    /// Channel mode classes.
    pub fn chanmodes(&self) -> Option<ChanModes> {
        self.get("CHANMODES").and_then(ChanModes::parse)
    }

    /// Whether `name` starts with one of the channel type prefixes.
    pub fn is_channel(&self, name: &str) -> bool {
        name.chars()
            .next()
            .is_some_and(|c| self.chantypes().contains(c))
    }
}

/// Parsed `PREFIX` token: `(modes)prefixes`, paired by position.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PrefixSpec {
    /// Mode letters, e.g. `ov`.
    pub modes: String,
    /// Prefix characters, e.g. `@+`.
    pub prefixes: String,
}

impl PrefixSpec {
    /// Parse `(ov)@+`. A bare prefix list without modes is accepted.
    pub fn parse(s: &str) -> Option<Self> {
        if let Some(rest) = s.strip_prefix('(') {
            let (modes, prefixes) = rest.split_once(')')?;
            if modes.chars().count() != prefixes.chars().count() {
                return None;
            }
            return Some(PrefixSpec {
                modes: modes.to_owned(),
                prefixes: prefixes.to_owned(),
            });
        }
        if s.is_empty() {
            return None;
        }
        Some(PrefixSpec {
            modes: String::new(),
            prefixes: s.to_owned(),
        })
    }

    /// Prefix character for a mode letter.
    pub fn prefix_for_mode(&self, mode: char) -> Option<char> {
        let idx = self.modes.chars().position(|m| m == mode)?;
        self.prefixes.chars().nth(idx)
    }

    /// Mode letter for a prefix character.
    pub fn mode_for_prefix(&self, prefix: char) -> Option<char> {
        let idx = self.prefixes.chars().position(|p| p == prefix)?;
        self.modes.chars().nth(idx)
    }
}

/// Parsed `CHANMODES` token: four comma-separated mode classes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChanModes {
    /// Type A: list modes (always take a parameter).
    pub a: String,
    /// Type B: always take a parameter.
    pub b: String,
    /// Type C: take a parameter only when set.
    pub c: String,
    /// Type D: never take a parameter.
    pub d: String,
}

impl ChanModes {
    /// Parse `A,B,C,D`; extra classes beyond the fourth are ignored.
    pub fn parse(s: &str) -> Option<Self> {
        let mut parts = s.split(',');
        let (a, b, c, d) = (parts.next()?, parts.next()?, parts.next()?, parts.next()?);
        Some(ChanModes {
            a: a.to_owned(),
            b: b.to_owned(),
            c: c.to_owned(),
            d: d.to_owned(),
        })
    }
}
