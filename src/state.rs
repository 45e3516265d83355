//! Sans-IO connection state machine for IRC protocol handling.
//!
//! [`Session`] holds everything one connection learns about the server and
//! does not perform any I/O. The driver feeds it parsed messages and acts
//! on the [`SessionAction`]s it returns.
//!
//! # Example
//!
//! ```
//! use slirc_client::config::ClientConfig;
//! use slirc_client::state::{Session, SessionAction, Status};
//!
//! let config = ClientConfig::new("irc://irc.example.org", "testbot");
//! let mut session = Session::new(&config);
//!
//! // CAP LS 302, NICK, USER
//! let greeting = session.on_open();
//! assert_eq!(greeting[0].to_string(), "CAP LS :302\r\n");
//!
//! let ls = ":irc.example.org CAP * LS :multi-prefix".parse().unwrap();
//! let (_, actions) = session.handle(ls);
//! assert!(matches!(&actions[0], SessionAction::Send(m) if m.command == "CAP"));
//!
//! let welcome = ":irc.example.org 001 testbot :Welcome".parse().unwrap();
//! let (_, actions) = session.handle(welcome);
//! assert!(matches!(actions[0], SessionAction::Registered));
//! assert_eq!(session.status(), Status::Registered);
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::caps::{self, CapRegistry};
use crate::casemap::{CaseMapMap, CaseMapping};
use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::ircv3::{Batch, BatchTracker};
use crate::isupport::Isupport;
use crate::message::Message;
use crate::prefix::Prefix;
use crate::response::Response;
use crate::sasl::SaslState;

/// Case rule used before the server has told us its own.
const NEUTRAL_CASEMAPPING: CaseMapping = CaseMapping::Ascii;

/// Longest target list put in one MONITOR line.
const MONITOR_LINE_BUDGET: usize = 400;

/// Lifecycle of a connection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Status {
    /// No transport.
    #[default]
    Disconnected,
    /// Transport is being opened.
    Connecting,
    /// Transport open, waiting for `RPL_WELCOME`.
    Registering,
    /// Registration complete.
    Registered,
}

/// A dispatched message, with its resolved batch and aggregated list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Inbound {
    /// The message, with its prefix defaulted to the server's.
    pub message: Message,
    /// The batch the message belongs to, if any.
    pub batch: Option<Arc<Batch>>,
    /// The batch a `BATCH -ref` line closes.
    pub closing: Option<Arc<Batch>>,
    /// Lines buffered before an end-of-list reply (NAMES, WHOIS, WHO).
    pub list: Option<Vec<Message>>,
}

impl Inbound {
    /// Wrap a message that belongs to no batch or list.
    pub fn new(message: Message) -> Self {
        Self {
            message,
            batch: None,
            closing: None,
            list: None,
        }
    }

    /// The labeled-response label, from the message itself or from an
    /// enclosing batch.
    pub fn label(&self) -> Option<&str> {
        self.message
            .label()
            .or_else(|| self.batch.as_deref().and_then(Batch::label))
    }

    /// Whether the message is inside the batch `name`, directly or nested.
    pub fn in_batch(&self, name: &str) -> bool {
        self.batch.as_deref().is_some_and(|b| b.is_within(name))
    }
}

/// Actions produced by [`Session::handle`].
///
/// The caller is responsible for performing these.
#[derive(Clone, Debug)]
pub enum SessionAction {
    /// Send this message to the server.
    ///
    /// Boxed to reduce enum size variance (Message is large).
    Send(Box<Message>),
    /// Registration completed.
    Registered,
    /// Report an error to listeners.
    Error(ClientError),
    /// Tear the connection down.
    Disconnect,
}

impl SessionAction {
    fn send(msg: Message) -> Self {
        SessionAction::Send(Box::new(msg))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum ListKind {
    Names,
    Whois,
    Who,
}

/// Per-connection protocol state.
#[derive(Debug)]
pub struct Session {
    config: ClientConfig,
    status: Status,
    nick: String,
    server_prefix: Prefix,
    casemap: CaseMapping,
    caps: CapRegistry,
    isupport: Isupport,
    batches: BatchTracker,
    monitored: CaseMapMap<()>,
    sasl: SaslState,
    pending_lists: HashMap<(ListKind, String), Vec<Message>>,
    cap_end_sent: bool,
    /// The monitored set was re-announced after this registration's MOTD.
    monitor_announced: bool,
}

impl Session {
    /// Create a disconnected session.
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            config: config.clone(),
            status: Status::Disconnected,
            nick: config.nick.clone(),
            server_prefix: Prefix::unknown_server(),
            casemap: NEUTRAL_CASEMAPPING,
            caps: CapRegistry::new(),
            isupport: Isupport::new(),
            batches: BatchTracker::new(),
            monitored: CaseMapMap::new(NEUTRAL_CASEMAPPING),
            sasl: SaslState::Initial,
            pending_lists: HashMap::new(),
            cap_end_sent: false,
            monitor_announced: false,
        }
    }

    /// Current lifecycle status.
    pub fn status(&self) -> Status {
        self.status
    }

    /// Our nickname; authoritative once registered.
    pub fn nick(&self) -> &str {
        &self.nick
    }

    /// The server's identity, `*` until registration.
    pub fn server_prefix(&self) -> &Prefix {
        &self.server_prefix
    }

    /// Active case-mapping.
    pub fn casemapping(&self) -> CaseMapping {
        self.casemap
    }

    /// Capability state.
    pub fn caps(&self) -> &CapRegistry {
        &self.caps
    }

    /// ISUPPORT state.
    pub fn isupport(&self) -> &Isupport {
        &self.isupport
    }

    /// Open batches.
    pub fn batches(&self) -> &BatchTracker {
        &self.batches
    }

    /// Monitored names.
    pub fn monitored(&self) -> &CaseMapMap<()> {
        &self.monitored
    }

    /// SASL progress.
    pub fn sasl(&self) -> &SaslState {
        &self.sasl
    }

    /// Read-only view handed to roundtrip matchers.
    pub fn context(&self) -> Context<'_> {
        Context { session: self }
    }

    /// The transport is being opened.
    pub fn on_connecting(&mut self) {
        self.status = Status::Connecting;
    }

    /// The transport is open; returns the registration greeting.
    pub fn on_open(&mut self) -> Vec<Message> {
        self.status = Status::Registering;
        self.nick = self.config.nick.clone();
        self.cap_end_sent = false;
        self.monitor_announced = false;

        let mut greeting = vec![Message::new("CAP", ["LS", "302"])];
        if let Some(pass) = &self.config.password {
            greeting.push(Message::new("PASS", [pass.as_str()]));
        }
        greeting.push(Message::new("NICK", [self.nick.as_str()]));
        greeting.push(Message::new(
            "USER",
            [self.config.username(), "0", "*", self.config.realname()],
        ));
        greeting
    }

    /// The transport closed; forget everything tied to the connection.
    ///
    /// The monitored set survives, re-keyed to the neutral case rule.
    pub fn on_close(&mut self) {
        self.status = Status::Disconnected;
        self.server_prefix = Prefix::unknown_server();
        self.caps.clear();
        self.isupport.clear();
        self.batches.clear();
        self.pending_lists.clear();
        self.sasl = SaslState::Initial;
        self.cap_end_sent = false;
        self.monitor_announced = false;
        self.set_casemapping(NEUTRAL_CASEMAPPING);
    }

    /// Process one inbound message.
    ///
    /// Returns the message enriched for dispatch, and the protocol actions
    /// it triggers. Call [`Session::after_dispatch`] once listeners have
    /// seen it.
    pub fn handle(&mut self, mut msg: Message) -> (Inbound, Vec<SessionAction>) {
        if msg.prefix.is_none() {
            msg.prefix = Some(self.server_prefix.clone());
        }
        let batch = self.batches.batch_of(&msg);
        let mut actions = Vec::new();
        let mut list = None;
        let mut closing = None;

        match msg.command.as_str() {
            "CAP" => self.handle_cap(&msg, &mut actions),
            "AUTHENTICATE" => self.handle_authenticate(&msg, &mut actions),
            "PING" => actions.push(SessionAction::send(Message::new(
                "PONG",
                msg.params.iter().map(String::as_str),
            ))),
            "NICK" => {
                let own = msg
                    .source_name()
                    .is_some_and(|src| self.casemap.equals(src, &self.nick));
                if let (true, Some(new_nick)) = (own, msg.param(0)) {
                    debug!(old = %self.nick, new = %new_nick, "own nick changed");
                    self.nick = new_nick.to_owned();
                }
            }
            "BATCH" => {
                if msg.param(0).is_some_and(|r| r.starts_with('+')) {
                    self.batches.open(&msg);
                } else {
                    closing = self.batches.closing(&msg);
                }
            }
            "FAIL" => self.handle_fail(&msg, &mut actions),
            "ERROR" => {
                warn!(reason = msg.last_param().unwrap_or_default(), "server sent ERROR");
                actions.push(SessionAction::Error(ClientError::irc(msg.clone())));
                actions.push(SessionAction::Disconnect);
            }
            _ => {
                if let Some(resp) = msg.response() {
                    list = self.handle_numeric(resp, &msg, &mut actions);
                }
            }
        }

        (
            Inbound {
                message: msg,
                batch,
                closing,
                list,
            },
            actions,
        )
    }

    /// Finish dispatching a message: a closed batch is forgotten only now,
    /// so listeners could still resolve it.
    pub fn after_dispatch(&mut self, inbound: &Inbound) {
        let msg = &inbound.message;
        if msg.command != "BATCH" {
            return;
        }
        if let Some(name) = msg.param(0).and_then(|r| r.strip_prefix('-')) {
            self.batches.remove(name);
        }
    }

    /// Start monitoring `targets`; returns the MONITOR lines to send.
    ///
    /// Names beyond the server's MONITOR limit are remembered but not sent.
    pub fn monitor<'a>(&mut self, targets: impl IntoIterator<Item = &'a str>) -> Vec<Message> {
        let limit = self.isupport.monitor();
        let mut added = Vec::new();
        for target in targets {
            if self.monitored.contains_key(target) {
                continue;
            }
            self.monitored.insert(target, ());
            if self.status == Status::Registered && self.monitored.len() <= limit {
                added.push(target.to_owned());
            }
        }
        monitor_lines('+', &added)
    }

    /// Stop monitoring `targets`; returns the MONITOR lines to send.
    pub fn unmonitor<'a>(&mut self, targets: impl IntoIterator<Item = &'a str>) -> Vec<Message> {
        let supported = self.isupport.monitor() > 0;
        let mut removed = Vec::new();
        for target in targets {
            if self.monitored.remove(target).is_some()
                && supported
                && self.status == Status::Registered
            {
                removed.push(target.to_owned());
            }
        }
        monitor_lines('-', &removed)
    }

    fn set_casemapping(&mut self, mapping: CaseMapping) {
        if self.casemap != mapping {
            debug!(casemapping = mapping.name(), "case-mapping changed");
        }
        self.casemap = mapping;
        self.monitored.set_mapping(mapping);
        let old = std::mem::take(&mut self.pending_lists);
        for ((kind, key), lines) in old {
            self.pending_lists
                .entry((kind, mapping.to_lower(&key)))
                .or_default()
                .extend(lines);
        }
    }

    fn wanted_caps(&self) -> Vec<&'static str> {
        caps::wanted_caps(
            self.config.event_playback,
            self.config.bouncer_network.is_some(),
        )
    }

    fn request_caps(&self, actions: &mut Vec<SessionAction>) {
        if let Some(req) = self.caps.request_available(&self.wanted_caps()) {
            actions.push(SessionAction::send(req));
        }
    }

    fn handle_cap(&mut self, msg: &Message, actions: &mut Vec<SessionAction>) {
        self.caps.parse(msg);
        match msg.param(1).unwrap_or_default() {
            "LS" if caps::is_final_ls(msg) => {
                let mut available: Vec<&str> = self.caps.available().map(|(k, _)| k).collect();
                available.sort_unstable();
                debug!(caps = %available.join(" "), "available capabilities");
                if self.status == Status::Registered {
                    self.request_caps(actions);
                } else {
                    self.negotiate(actions);
                }
            }
            "NEW" => self.request_caps(actions),
            "NAK" if self.status != Status::Registered => self.send_cap_end(actions),
            _ => {}
        }
    }

    fn negotiate(&mut self, actions: &mut Vec<SessionAction>) {
        self.request_caps(actions);

        if let Some(creds) = &self.config.sasl {
            let mech = creds.mechanism();
            if self.caps.supports_sasl(mech.as_str()) {
                info!(mechanism = %mech, "starting SASL authentication");
                actions.push(SessionAction::send(Message::new(
                    "AUTHENTICATE",
                    [mech.as_str()],
                )));
                actions.extend(
                    creds
                        .authenticate_messages()
                        .into_iter()
                        .map(SessionAction::send),
                );
                self.sasl = SaslState::InProgress(mech);
                return;
            }
            warn!(mechanism = %mech, "server does not support the configured SASL mechanism");
            actions.push(SessionAction::Error(ClientError::SaslUnsupported(mech)));
        }

        self.finish_negotiation(actions);
    }

    fn finish_negotiation(&mut self, actions: &mut Vec<SessionAction>) {
        if let Some(netid) = &self.config.bouncer_network {
            if self.caps.is_available("soju.im/bouncer-networks") {
                actions.push(SessionAction::send(Message::new(
                    "BOUNCER",
                    ["BIND", netid.as_str()],
                )));
            }
        }
        self.send_cap_end(actions);
    }

    fn send_cap_end(&mut self, actions: &mut Vec<SessionAction>) {
        if !self.cap_end_sent {
            self.cap_end_sent = true;
            actions.push(SessionAction::send(Message::new("CAP", ["END"])));
        }
    }

    fn handle_authenticate(&mut self, msg: &Message, actions: &mut Vec<SessionAction>) {
        if !self.sasl.is_in_progress() || msg.param(0) == Some("+") {
            return;
        }
        warn!("unexpected SASL challenge, aborting authentication");
        self.sasl = SaslState::Aborted;
        actions.push(SessionAction::send(Message::new("AUTHENTICATE", ["*"])));
        actions.push(SessionAction::Error(ClientError::UnexpectedChallenge));
    }

    fn handle_fail(&mut self, msg: &Message, actions: &mut Vec<SessionAction>) {
        if self.status == Status::Registered {
            return;
        }
        let bind_failed = msg.param(0) == Some("BOUNCER") && msg.param(2) == Some("BIND");
        let account_required = msg.param(1) == Some("ACCOUNT_REQUIRED");
        if bind_failed || account_required {
            actions.push(SessionAction::Error(ClientError::irc(msg.clone())));
            actions.push(SessionAction::Disconnect);
        }
    }

    fn handle_numeric(
        &mut self,
        resp: Response,
        msg: &Message,
        actions: &mut Vec<SessionAction>,
    ) -> Option<Vec<Message>> {
        let registered = self.status == Status::Registered;
        match resp {
            Response::RPL_WELCOME => {
                if let Some(nick) = msg.param(0) {
                    self.nick = nick.to_owned();
                }
                if let Some(prefix) = &msg.prefix {
                    self.server_prefix = prefix.clone();
                }
                self.status = Status::Registered;
                info!(nick = %self.nick, server = %self.server_prefix, "registered");
                actions.push(SessionAction::Registered);
            }
            Response::RPL_ISUPPORT => {
                self.isupport.parse_message(msg);
                if let Some(mapping) = self.isupport.casemapping() {
                    self.set_casemapping(mapping);
                }
            }
            Response::RPL_ENDOFMOTD | Response::ERR_NOMOTD => {
                if !self.isupport.contains("CASEMAPPING") {
                    self.set_casemapping(CaseMapping::Rfc1459);
                }
                if std::mem::replace(&mut self.monitor_announced, true) {
                    return None;
                }
                let limit = self.isupport.monitor();
                let targets: Vec<String> = self
                    .monitored
                    .keys()
                    .take(limit)
                    .map(str::to_owned)
                    .collect();
                actions.extend(monitor_lines('+', &targets).into_iter().map(SessionAction::send));
            }
            Response::RPL_SASLSUCCESS => {
                info!("SASL authentication succeeded");
                self.sasl = SaslState::Success;
                if !registered {
                    self.finish_negotiation(actions);
                }
            }
            r if r.is_sasl_failure() => {
                let ours = matches!(self.sasl, SaslState::InProgress(_) | SaslState::Aborted);
                if !ours && registered {
                    return None;
                }
                warn!(numeric = %r, "SASL authentication failed");
                self.sasl = SaslState::Failed(msg.last_param().unwrap_or_default().to_owned());
                actions.push(SessionAction::Error(ClientError::irc(msg.clone())));
                if !registered {
                    actions.push(SessionAction::Disconnect);
                }
            }
            r if r.is_registration_fatal() && !registered => {
                warn!(numeric = %r, "registration failed");
                actions.push(SessionAction::Error(ClientError::irc(msg.clone())));
                actions.push(SessionAction::Disconnect);
            }
            Response::RPL_NAMREPLY => self.buffer_line(ListKind::Names, msg.param(2), msg),
            Response::RPL_ENDOFNAMES => return Some(self.take_list(ListKind::Names, msg.param(1))),
            Response::RPL_WHOREPLY | Response::RPL_WHOSPCRPL => {
                self.buffer_line(ListKind::Who, Some(""), msg)
            }
            Response::RPL_ENDOFWHO => return Some(self.take_list(ListKind::Who, Some(""))),
            Response::RPL_AWAY => {
                // Away replies also answer PRIVMSG; only keep them inside a WHOIS.
                let key = (ListKind::Whois, self.list_key(msg.param(1)));
                if let Some(lines) = self.pending_lists.get_mut(&key) {
                    lines.push(msg.clone());
                }
            }
            r if r.is_whois_related() => self.buffer_line(ListKind::Whois, msg.param(1), msg),
            Response::RPL_ENDOFWHOIS => return Some(self.take_list(ListKind::Whois, msg.param(1))),
            _ => {}
        }
        None
    }

    fn list_key(&self, key: Option<&str>) -> String {
        self.casemap.to_lower(key.unwrap_or_default())
    }

    fn buffer_line(&mut self, kind: ListKind, key: Option<&str>, msg: &Message) {
        let key = self.list_key(key);
        self.pending_lists
            .entry((kind, key))
            .or_default()
            .push(msg.clone());
    }

    fn take_list(&mut self, kind: ListKind, key: Option<&str>) -> Vec<Message> {
        let key = self.list_key(key);
        self.pending_lists.remove(&(kind, key)).unwrap_or_default()
    }
}

/// Build `MONITOR <sign> a,b,c` lines, splitting long target lists.
fn monitor_lines(sign: char, targets: &[String]) -> Vec<Message> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for target in targets {
        if !current.is_empty() && current.len() + 1 + target.len() > MONITOR_LINE_BUDGET {
            lines.push(Message::new("MONITOR", [sign.to_string(), std::mem::take(&mut current)]));
        }
        if !current.is_empty() {
            current.push(',');
        }
        current.push_str(target);
    }
    if !current.is_empty() {
        lines.push(Message::new("MONITOR", [sign.to_string(), current]));
    }
    lines
}

/// What roundtrip matchers may inspect about the connection.
#[derive(Clone, Copy, Debug)]
pub struct Context<'a> {
    session: &'a Session,
}

impl<'a> Context<'a> {
    /// Our nickname.
    pub fn nick(&self) -> &'a str {
        &self.session.nick
    }

    /// Active case-mapping.
    pub fn casemapping(&self) -> CaseMapping {
        self.session.casemap
    }

    /// Compare two names under the active case-mapping.
    pub fn names_equal(&self, a: &str, b: &str) -> bool {
        self.session.casemap.equals(a, b)
    }

    /// Whether `name` is our nickname.
    pub fn is_me(&self, name: &str) -> bool {
        self.names_equal(name, &self.session.nick)
    }

    /// ISUPPORT state.
    pub fn isupport(&self) -> &'a Isupport {
        &self.session.isupport
    }

    /// Capability state.
    pub fn caps(&self) -> &'a CapRegistry {
        &self.session.caps
    }

    /// An open batch; a batch being closed is still visible while its
    /// closing line is dispatched.
    pub fn batch(&self, name: &str) -> Option<&'a Arc<Batch>> {
        self.session.batches.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sasl::{SaslCredentials, SaslMechanism};

    fn msg(line: &str) -> Message {
        line.parse().unwrap()
    }

    fn sent(actions: &[SessionAction]) -> Vec<String> {
        actions
            .iter()
            .filter_map(|a| match a {
                SessionAction::Send(m) => Some(m.to_string().trim_end().to_owned()),
                _ => None,
            })
            .collect()
    }

    fn registered_session() -> Session {
        let mut session = Session::new(&ClientConfig::new("irc://h", "me"));
        session.on_open();
        session.handle(msg(":srv CAP * LS :multi-prefix"));
        session.handle(msg(":srv 001 me :Welcome"));
        session
    }

    #[test]
    fn test_greeting_order() {
        let mut config = ClientConfig::new("irc://h", "alice");
        config.password = Some("secret".into());
        config.realname = Some("Alice L".into());
        let mut session = Session::new(&config);
        let lines: Vec<String> = session
            .on_open()
            .iter()
            .map(|m| m.to_string().trim_end().to_owned())
            .collect();
        assert_eq!(
            lines,
            vec![
                "CAP LS :302",
                "PASS secret",
                "NICK alice",
                "USER alice 0 * :Alice L",
            ]
        );
        assert_eq!(session.status(), Status::Registering);
    }

    #[test]
    fn test_sasl_plain_negotiation() {
        let mut config = ClientConfig::new("irc://h", "alice");
        config.sasl = Some(SaslCredentials::Plain {
            username: "alice".into(),
            password: "pw".into(),
        });
        let mut session = Session::new(&config);
        session.on_open();

        let (_, actions) = session.handle(msg(":srv CAP * LS :sasl=PLAIN,EXTERNAL message-tags"));
        assert_eq!(
            sent(&actions),
            vec![
                "CAP REQ :message-tags sasl".to_owned(),
                "AUTHENTICATE PLAIN".to_owned(),
                format!("AUTHENTICATE {}", crate::sasl::encode_plain("alice", "pw")),
            ]
        );
        assert_eq!(session.sasl(), &SaslState::InProgress(SaslMechanism::Plain));

        let (_, actions) = session.handle(msg(":srv CAP alice ACK :sasl message-tags"));
        assert!(actions.is_empty());
        let (_, actions) = session.handle(msg("AUTHENTICATE +"));
        assert!(actions.is_empty());
        session.handle(msg(":srv 900 alice alice!a@h alice :You are now logged in"));

        let (_, actions) = session.handle(msg(":srv 903 alice :SASL authentication successful"));
        assert_eq!(sent(&actions), vec!["CAP END"]);
        assert!(session.sasl().is_success());

        let (_, actions) = session.handle(msg(":srv 001 alice :Welcome"));
        assert!(matches!(actions[..], [SessionAction::Registered]));
        assert_eq!(session.status(), Status::Registered);
        assert_eq!(session.server_prefix().name, "srv");
    }

    #[test]
    fn test_no_sasl_ends_immediately() {
        let mut session = Session::new(&ClientConfig::new("irc://h", "me"));
        session.on_open();
        let (_, actions) = session.handle(msg(":srv CAP * LS * :batch"));
        assert!(actions.is_empty());
        let (_, actions) = session.handle(msg(":srv CAP * LS :unknown-cap"));
        assert_eq!(sent(&actions), vec!["CAP REQ :batch", "CAP END"]);
        assert!(session.caps().is_available("batch"));
    }

    #[test]
    fn test_sasl_unsupported_mechanism() {
        let mut config = ClientConfig::new("irc://h", "me");
        config.sasl = Some(SaslCredentials::External);
        let mut session = Session::new(&config);
        session.on_open();
        let (_, actions) = session.handle(msg(":srv CAP * LS :sasl=PLAIN"));
        assert!(actions.iter().any(|a| matches!(
            a,
            SessionAction::Error(ClientError::SaslUnsupported(SaslMechanism::External))
        )));
        assert_eq!(sent(&actions), vec!["CAP REQ :sasl", "CAP END"]);
    }

    #[test]
    fn test_sasl_failure_disconnects_unregistered() {
        let mut config = ClientConfig::new("irc://h", "me");
        config.sasl = Some(SaslCredentials::External);
        let mut session = Session::new(&config);
        session.on_open();
        session.handle(msg(":srv CAP * LS :sasl"));
        let (_, actions) = session.handle(msg(":srv 904 me :SASL authentication failed"));
        assert!(matches!(actions[0], SessionAction::Error(ClientError::Irc(_))));
        assert!(matches!(actions[1], SessionAction::Disconnect));
    }

    #[test]
    fn test_unexpected_challenge_aborts() {
        let mut config = ClientConfig::new("irc://h", "me");
        config.sasl = Some(SaslCredentials::OAuthBearer { token: "t".into() });
        let mut session = Session::new(&config);
        session.on_open();
        session.handle(msg(":srv CAP * LS :sasl"));
        let (_, actions) = session.handle(msg("AUTHENTICATE Zm9v"));
        assert_eq!(sent(&actions), vec!["AUTHENTICATE *"]);
        assert!(matches!(
            actions[1],
            SessionAction::Error(ClientError::UnexpectedChallenge)
        ));
        assert_eq!(session.sasl(), &SaslState::Aborted);
    }

    #[test]
    fn test_nak_ends_negotiation_once() {
        let mut session = Session::new(&ClientConfig::new("irc://h", "me"));
        session.on_open();
        session.handle(msg(":srv CAP * LS :batch"));
        let (_, actions) = session.handle(msg(":srv CAP me NAK :batch"));
        assert!(actions.is_empty());
    }

    #[test]
    fn test_bouncer_bind_before_cap_end() {
        let mut config = ClientConfig::new("irc://h", "me");
        config.bouncer_network = Some("7".into());
        let mut session = Session::new(&config);
        session.on_open();
        let (_, actions) = session.handle(msg(":srv CAP * LS :soju.im/bouncer-networks soju.im/bouncer-networks-notify"));
        assert_eq!(
            sent(&actions),
            vec!["CAP REQ :soju.im/bouncer-networks", "BOUNCER BIND :7", "CAP END"]
        );
    }

    #[test]
    fn test_cap_new_after_registration() {
        let mut session = registered_session();
        let (_, actions) = session.handle(msg(":srv CAP me NEW :away-notify unknown"));
        assert_eq!(sent(&actions), vec!["CAP REQ :away-notify"]);
        let (_, actions) = session.handle(msg(":srv CAP me NEW :unknown2"));
        assert!(actions.is_empty());
    }

    #[test]
    fn test_fatal_numerics_only_before_registration() {
        let mut session = Session::new(&ClientConfig::new("irc://h", "me"));
        session.on_open();
        let (_, actions) = session.handle(msg(":srv 433 * me :Nickname is already in use"));
        assert!(matches!(actions[1], SessionAction::Disconnect));

        let mut session = registered_session();
        let (_, actions) = session.handle(msg(":srv 433 me other :Nickname is already in use"));
        assert!(actions.is_empty());
    }

    #[test]
    fn test_fail_account_required() {
        let mut session = Session::new(&ClientConfig::new("irc://h", "me"));
        session.on_open();
        let (_, actions) =
            session.handle(msg(":srv FAIL * ACCOUNT_REQUIRED :Authentication required"));
        assert!(matches!(actions[1], SessionAction::Disconnect));
    }

    #[test]
    fn test_error_disconnects() {
        let mut session = registered_session();
        let (_, actions) = session.handle(msg("ERROR :Closing link"));
        match &actions[0] {
            SessionAction::Error(err) => assert_eq!(err.to_string(), "Closing link"),
            other => panic!("unexpected action {:?}", other),
        }
        assert!(matches!(actions[1], SessionAction::Disconnect));
    }

    #[test]
    fn test_ping_pong_and_prefix_default() {
        let mut session = registered_session();
        let (inbound, actions) = session.handle(msg("PING :abc def"));
        assert_eq!(sent(&actions), vec!["PONG :abc def"]);
        assert_eq!(inbound.message.source_name(), Some("srv"));
    }

    #[test]
    fn test_own_nick_tracking() {
        let mut session = registered_session();
        session.handle(msg(":ME!u@h NICK newme"));
        assert_eq!(session.nick(), "newme");
        session.handle(msg(":other!u@h NICK x"));
        assert_eq!(session.nick(), "newme");
    }

    #[test]
    fn test_casemapping_rekey_and_fallback() {
        let mut session = Session::new(&ClientConfig::new("irc://h", "me"));
        session.monitor(["Nick[1]"]);
        assert!(!session.monitored().contains_key("nick{1}"));

        session.on_open();
        session.handle(msg(":srv 001 me :Welcome"));
        session.handle(msg(":srv 005 me MONITOR=10 :are supported"));
        let (_, actions) = session.handle(msg(":srv 376 me :End of MOTD"));
        assert_eq!(session.casemapping(), CaseMapping::Rfc1459);
        assert!(session.monitored().contains_key("nick{1}"));
        assert_eq!(sent(&actions), vec!["MONITOR + :Nick[1]"]);

        session.handle(msg(":srv 005 me CASEMAPPING=ascii :are supported"));
        assert_eq!(session.casemapping(), CaseMapping::Ascii);
    }

    #[test]
    fn test_monitor_respects_limit() {
        let mut session = registered_session();
        session.handle(msg(":srv 005 me MONITOR=1 :are supported"));
        let lines = session.monitor(["a", "b"]);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].params, vec!["+", "a"]);
        assert_eq!(session.monitored().len(), 2);

        let lines = session.unmonitor(["A"]);
        assert_eq!(lines[0].params, vec!["-", "A"]);
        assert!(session.unmonitor(["zzz"]).is_empty());
    }

    #[test]
    fn test_monitor_announced_once_per_registration() {
        let mut session = Session::new(&ClientConfig::new("irc://h", "me"));
        assert!(session.monitor(["alice"]).is_empty());

        for _ in 0..2 {
            session.on_open();
            session.handle(msg(":srv CAP * LS :multi-prefix"));
            session.handle(msg(":srv 001 me :Welcome"));
            session.handle(msg(":srv 005 me MONITOR=10 :are supported"));
            let (_, actions) = session.handle(msg(":srv 376 me :End of /MOTD"));
            assert_eq!(sent(&actions), vec!["MONITOR + :alice".to_owned()]);

            // A MOTD requested later does not resend the list
            let (_, actions) = session.handle(msg(":srv 376 me :End of /MOTD"));
            assert!(sent(&actions).is_empty());
            session.on_close();
        }
    }

    #[test]
    fn test_monitor_lines_split() {
        let targets: Vec<String> = (0..100).map(|i| format!("nickname{:03}", i)).collect();
        let lines = monitor_lines('+', &targets);
        assert!(lines.len() > 1);
        assert!(lines.iter().all(|l| l.params[1].len() <= MONITOR_LINE_BUDGET));
        let total: usize = lines.iter().map(|l| l.params[1].split(',').count()).sum();
        assert_eq!(total, 100);
    }

    #[test]
    fn test_batch_removed_after_dispatch() {
        let mut session = registered_session();
        session.handle(msg(":srv BATCH +abc chathistory #chan"));
        let (inbound, _) = session.handle(msg("@batch=abc :a!b@c PRIVMSG #chan :one"));
        assert!(inbound.in_batch("abc"));

        let (close, _) = session.handle(msg(":srv BATCH -abc"));
        let closed = close.closing.as_deref().expect("closing batch");
        assert_eq!(closed.kind, "chathistory");
        assert_eq!(closed.params, vec!["#chan"]);
        assert!(close.batch.is_none());
        assert!(session.context().batch("abc").is_some());
        session.after_dispatch(&close);
        assert!(session.context().batch("abc").is_none());
    }

    #[test]
    fn test_names_aggregation() {
        let mut session = registered_session();
        session.handle(msg(":srv 353 me = #Chan :@alice +bob"));
        session.handle(msg(":srv 353 me = #Chan :carol"));
        let (inbound, _) = session.handle(msg(":srv 366 me #chan :End of /NAMES list"));
        let list = inbound.list.unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[1].last_param(), Some("carol"));
    }

    #[test]
    fn test_whois_aggregation_ignores_stray_away() {
        let mut session = registered_session();
        session.handle(msg(":srv 301 me bob :gone fishing"));
        session.handle(msg(":srv 311 me bob b host * :Bob"));
        session.handle(msg(":srv 301 me bob :gone fishing"));
        let (inbound, _) = session.handle(msg(":srv 318 me bob :End of WHOIS"));
        let commands: Vec<String> = inbound.list.unwrap().into_iter().map(|m| m.command).collect();
        assert_eq!(commands, vec!["311", "301"]);
    }

    #[test]
    fn test_close_resets_connection_state() {
        let mut session = registered_session();
        session.handle(msg(":srv 005 me WHOX :are supported"));
        session.handle(msg(":srv BATCH +x chathistory #c"));
        session.on_close();
        assert_eq!(session.status(), Status::Disconnected);
        assert!(session.isupport().is_empty());
        assert!(session.batches().is_empty());
        assert!(!session.caps().is_available("multi-prefix"));
        assert_eq!(session.server_prefix().name, "*");
    }
}
