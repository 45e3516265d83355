//! Typed views of aggregated WHO, WHOIS and NAMES replies.

use crate::error::ClientError;
use crate::message::parse_membership;
use crate::message::Message;
use crate::response::Response;

/// WHOX fields requested by [`crate::client::Client::who`], in reply order.
pub const WHOX_FIELDS: &str = "tcuihsnfdlaor";

/// One user from a WHO reply.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WhoReply {
    /// Channel the reply refers to, `None` for `*`.
    pub channel: Option<String>,
    /// Username (ident).
    pub username: String,
    /// Hostname.
    pub hostname: String,
    /// Server the user is connected to.
    pub server: String,
    /// Nickname.
    pub nick: String,
    /// Raw flags: `H`/`G`, `*` for operators, then membership prefixes.
    pub flags: String,
    /// Hop count, when the server reveals it.
    pub hops: Option<u32>,
    /// Real name.
    pub realname: String,
    /// Account name (WHOX only).
    pub account: Option<String>,
    /// IP address (WHOX only).
    pub ip: Option<String>,
    /// Idle seconds (WHOX only).
    pub idle: Option<u64>,
    /// Channel op level (WHOX only).
    pub oplevel: Option<String>,
}

impl WhoReply {
    /// Whether the user is marked away.
    pub fn is_away(&self) -> bool {
        self.flags.starts_with('G')
    }

    /// Whether the user is an IRC operator.
    pub fn is_operator(&self) -> bool {
        self.flags.contains('*')
    }

    /// Parse a classic `RPL_WHOREPLY` (352).
    pub fn from_classic(msg: &Message) -> Result<Self, ClientError> {
        let malformed = || ClientError::MalformedReply(msg.to_string().trim_end().to_owned());
        if msg.response() != Some(Response::RPL_WHOREPLY) || msg.params.len() < 8 {
            return Err(malformed());
        }
        let (hops, realname) = msg.params[7]
            .split_once(' ')
            .unwrap_or((msg.params[7].as_str(), ""));

        Ok(WhoReply {
            channel: optional(&msg.params[1], "*"),
            username: msg.params[2].clone(),
            hostname: msg.params[3].clone(),
            server: msg.params[4].clone(),
            nick: msg.params[5].clone(),
            flags: msg.params[6].clone(),
            hops: hops.parse().ok(),
            realname: realname.to_owned(),
            ..WhoReply::default()
        })
    }

    /// Parse a WHOX `RPL_WHOSPCRPL` (354) requested with [`WHOX_FIELDS`]
    /// and `token`.
    ///
    /// Returns `None` for a reply carrying another token or a different
    /// field count: it answers somebody else's query.
    pub fn from_whox(msg: &Message, token: &str) -> Option<Self> {
        if msg.response() != Some(Response::RPL_WHOSPCRPL)
            || msg.param(1) != Some(token)
            || msg.params.len() != 1 + WHOX_FIELDS.len()
        {
            return None;
        }
        let field = |name: char| {
            WHOX_FIELDS
                .find(name)
                .and_then(|idx| msg.param(1 + idx))
                .unwrap_or_default()
        };

        Some(WhoReply {
            channel: optional(field('c'), "*"),
            username: field('u').to_owned(),
            hostname: field('h').to_owned(),
            server: field('s').to_owned(),
            nick: field('n').to_owned(),
            flags: field('f').to_owned(),
            hops: field('d').parse().ok(),
            realname: field('r').to_owned(),
            account: optional(field('a'), "0"),
            ip: optional(field('i'), "255.255.255.255"),
            idle: field('l').parse().ok(),
            oplevel: optional(field('o'), "n/a"),
        })
    }
}

fn optional(value: &str, none: &str) -> Option<String> {
    (!value.is_empty() && value != none).then(|| value.to_owned())
}

/// Aggregated WHOIS information.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WhoisReply {
    /// Nickname.
    pub nick: String,
    /// Username (ident).
    pub username: String,
    /// Hostname.
    pub hostname: String,
    /// Real name.
    pub realname: String,
    /// Server the user is connected to.
    pub server: Option<String>,
    /// Logged-in account.
    pub account: Option<String>,
    /// Away message.
    pub away: Option<String>,
    /// Channels, with membership prefixes.
    pub channels: Vec<String>,
    /// Idle seconds.
    pub idle: Option<u64>,
    /// IRC operator.
    pub operator: bool,
    /// Marked as a bot.
    pub bot: bool,
    /// Connected over TLS.
    pub secure: bool,
    /// TLS certificate fingerprint.
    pub certfp: Option<String>,
}

impl WhoisReply {
    /// Build from the lines buffered before `RPL_ENDOFWHOIS`.
    pub fn from_lines(nick: &str, lines: &[Message]) -> Self {
        let mut reply = WhoisReply {
            nick: nick.to_owned(),
            ..WhoisReply::default()
        };
        for line in lines {
            let Some(resp) = line.response() else {
                continue;
            };
            match resp {
                Response::RPL_WHOISUSER if line.params.len() >= 6 => {
                    reply.nick = line.params[1].clone();
                    reply.username = line.params[2].clone();
                    reply.hostname = line.params[3].clone();
                    reply.realname = line.params[5].clone();
                }
                Response::RPL_WHOISSERVER => reply.server = line.param(2).map(str::to_owned),
                Response::RPL_WHOISACCOUNT => reply.account = line.param(2).map(str::to_owned),
                Response::RPL_AWAY => reply.away = line.last_param().map(str::to_owned),
                Response::RPL_WHOISCHANNELS => reply.channels.extend(
                    line.last_param()
                        .unwrap_or_default()
                        .split(' ')
                        .filter(|c| !c.is_empty())
                        .map(str::to_owned),
                ),
                Response::RPL_WHOISIDLE => reply.idle = line.param(2).and_then(|s| s.parse().ok()),
                Response::RPL_WHOISOPERATOR => reply.operator = true,
                Response::RPL_WHOISBOT => reply.bot = true,
                Response::RPL_WHOISSECURE => reply.secure = true,
                Response::RPL_WHOISCERTFP => reply.certfp = line.last_param().and_then(|s| {
                    s.rsplit(' ').next().map(str::to_owned)
                }),
                _ => {}
            }
        }
        reply
    }
}

/// One channel member from a NAMES reply.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NamesMember {
    /// Membership prefix characters, highest first (e.g. `@+`).
    pub prefixes: String,
    /// Nickname.
    pub nick: String,
}

/// Split the `RPL_NAMREPLY` lines buffered before `RPL_ENDOFNAMES` into
/// members, using `memberships` as the prefix character table.
pub fn parse_names(lines: &[Message], memberships: &str) -> Vec<NamesMember> {
    lines
        .iter()
        .filter(|line| line.response() == Some(Response::RPL_NAMREPLY))
        .flat_map(|line| line.last_param().unwrap_or_default().split(' '))
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (prefixes, nick) = parse_membership(entry, memberships);
            // userhost-in-names
            let nick = nick.split('!').next().unwrap_or(nick);
            NamesMember {
                prefixes: prefixes.to_owned(),
                nick: nick.to_owned(),
            }
        })
        .collect()
}
