use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, mpsc, oneshot, watch};

use super::connection::{Driver, Request};
use super::correlator::{Family, Waiter};
use super::history::{
    BatchResult, BouncerNetwork, HistoryPage, HistoryTarget, BOUNCER_NETWORKS_BATCH,
    CHATHISTORY_BATCH, CHATHISTORY_TARGETS_BATCH,
};
use super::replies::{parse_names, NamesMember, WhoReply, WhoisReply, WHOX_FIELDS};
use super::Event;
use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::ircv3::{format_datetime, parse_server_time};
use crate::isupport::Isupport;
use crate::message::Message;
use crate::response::Response;
use crate::state::{Context, Inbound, Session, Status};
use crate::transport::{Connector, UrlConnector};

/// Listener channel capacity; slower receivers observe `Lagged`.
const EVENT_CAPACITY: usize = 1024;

/// WHOX tokens cycle through `0..WHOX_TOKEN_LIMIT`.
const WHOX_TOKEN_LIMIT: u16 = 1000;

/// Handle to a client connection.
///
/// Cloning is cheap; every clone drives the same connection. The
/// connection task stops once the last handle is dropped.
///
/// ```no_run
/// use slirc_client::client::{Client, ClientConfig, Event};
///
/// # async fn demo() -> Result<(), slirc_client::client::ClientError> {
/// let client = Client::new(ClientConfig::new("ircs://irc.libera.chat", "slirc-bot"));
/// let mut events = client.subscribe();
/// client.connect();
///
/// while let Ok(event) = events.recv().await {
///     if let Event::Message(inbound) = event {
///         println!("{}", inbound.message);
///     }
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Client {
    inner: Arc<Inner>,
}

struct Inner {
    requests: mpsc::UnboundedSender<Request>,
    events: broadcast::Sender<Event>,
    status: watch::Receiver<Status>,
    whox_token: AtomicU16,
    history_page_size: usize,
    history_budget: usize,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Create a client for `config.url`.
    ///
    /// Spawns the connection task, so it must be called from within a
    /// tokio runtime. Nothing connects until [`Client::connect`].
    pub fn new(config: ClientConfig) -> Self {
        let connector = UrlConnector::new(config.url.clone());
        Self::with_connector(config, connector)
    }

    /// Create a client that opens its transports with `connector`.
    pub fn with_connector(config: ClientConfig, connector: impl Connector) -> Self {
        let (requests, requests_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (status_tx, status) = watch::channel(Status::Disconnected);

        let inner = Arc::new(Inner {
            requests,
            events: events.clone(),
            status,
            whox_token: AtomicU16::new(0),
            history_page_size: config.history_page_size.max(1),
            history_budget: config.history_budget,
        });
        let driver = Driver::new(config, Arc::new(connector), requests_rx, events, status_tx);
        tokio::spawn(driver.run());

        Client { inner }
    }

    fn request(&self, request: Request) -> Result<(), ClientError> {
        self.inner
            .requests
            .send(request)
            .map_err(|_| ClientError::Shutdown)
    }

    /// Open the connection. Failures are reported as [`Event::Error`].
    pub fn connect(&self) {
        let _ = self.request(Request::Connect);
    }

    /// Close the connection and cancel any pending reconnect.
    pub fn disconnect(&self) {
        let _ = self.request(Request::Disconnect);
    }

    /// Report network availability. While offline, reconnects wait for the
    /// network to return instead of running the backoff timer.
    pub fn set_online(&self, online: bool) {
        let _ = self.request(Request::SetOnline(online));
    }

    /// Listen to status changes, messages and errors.
    ///
    /// Each call returns an independent receiver; drop it to unsubscribe.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.inner.events.subscribe()
    }

    /// Current connection status.
    pub fn status(&self) -> Status {
        *self.inner.status.borrow()
    }

    /// Watch the connection status.
    pub fn watch_status(&self) -> watch::Receiver<Status> {
        self.inner.status.clone()
    }

    /// Send a raw message.
    pub async fn send(&self, msg: Message) -> Result<(), ClientError> {
        let (tx, rx) = oneshot::channel();
        self.request(Request::Send(msg, tx))?;
        rx.await.map_err(|_| ClientError::Shutdown)?
    }

    async fn inspect<T, F>(&self, f: F) -> Result<T, ClientError>
    where
        T: Send + 'static,
        F: FnOnce(&Session) -> T + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.request(Request::Inspect(Box::new(move |session| {
            let _ = tx.send(f(session));
        })))?;
        rx.await.map_err(|_| ClientError::Shutdown)
    }

    /// Snapshot of the server's ISUPPORT tokens.
    pub async fn isupport(&self) -> Result<Isupport, ClientError> {
        self.inspect(|session| session.isupport().clone()).await
    }

    /// Our current nickname.
    pub async fn nick(&self) -> Result<String, ClientError> {
        self.inspect(|session| session.nick().to_owned()).await
    }

    /// Send `msg` and wait until `done` resolves it.
    ///
    /// `done` sees every message dispatched after `msg` was sent, and
    /// returns `Ok(None)` to keep waiting. Replies carrying another
    /// request's label are not offered. A `FAIL` or generic error numeric
    /// naming `msg`'s command rejects the request, as does the connection
    /// closing.
    pub async fn roundtrip<T, F>(&self, msg: Message, done: F) -> Result<T, ClientError>
    where
        T: Send + 'static,
        F: FnMut(&Inbound, &Context<'_>) -> Result<Option<T>, ClientError> + Send + 'static,
    {
        self.roundtrip_in(None, msg, done).await
    }

    async fn roundtrip_in<T, F>(
        &self,
        family: Option<Family>,
        msg: Message,
        done: F,
    ) -> Result<T, ClientError>
    where
        T: Send + 'static,
        F: FnMut(&Inbound, &Context<'_>) -> Result<Option<T>, ClientError> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.request(Request::Roundtrip {
            msg,
            family,
            pending: Box::new(Waiter::new(done, tx)),
        })?;
        rx.await.map_err(|_| ClientError::Shutdown)?
    }

    /// Join `channel`, resolving with our own JOIN echo.
    pub async fn join(&self, channel: &str, key: Option<&str>) -> Result<Message, ClientError> {
        let mut params = vec![channel.to_owned()];
        params.extend(key.map(str::to_owned));
        let channel = channel.to_owned();

        self.roundtrip(Message::new("JOIN", params), move |inbound, ctx| {
            let msg = &inbound.message;
            let for_channel = |idx| msg.param(idx).is_some_and(|c| ctx.names_equal(c, &channel));
            if msg.command == "JOIN" && msg.source_name().is_some_and(|s| ctx.is_me(s)) && for_channel(0) {
                return Ok(Some(msg.clone()));
            }
            match msg.response() {
                Some(r) if r.is_join_error() && for_channel(1) => Err(ClientError::irc(msg.clone())),
                _ => Ok(None),
            }
        })
        .await
    }

    /// List the users matching `mask`.
    ///
    /// Uses WHOX when the server advertises it. Only one WHO is in flight
    /// at a time; later calls wait their turn.
    pub async fn who(&self, mask: &str) -> Result<Vec<WhoReply>, ClientError> {
        let whox = self.inspect(|session| session.isupport().whox()).await?;
        let token = whox.then(|| self.next_whox_token().to_string());
        let msg = match &token {
            Some(token) => Message::new("WHO", [mask.to_owned(), format!("%{},{}", WHOX_FIELDS, token)]),
            None => Message::new("WHO", [mask]),
        };
        let mask = mask.to_owned();

        self.roundtrip_in(Some(Family::Who), msg, move |inbound, ctx| {
            let msg = &inbound.message;
            if msg.response() != Some(Response::RPL_ENDOFWHO)
                || !msg.param(1).is_some_and(|m| ctx.names_equal(m, &mask))
            {
                return Ok(None);
            }
            let lines = inbound.list.as_deref().unwrap_or_default();
            let replies: Vec<WhoReply> = match &token {
                Some(token) => lines
                    .iter()
                    .filter_map(|line| WhoReply::from_whox(line, token))
                    .collect(),
                None => lines
                    .iter()
                    .map(WhoReply::from_classic)
                    .collect::<Result<Vec<_>, _>>()?,
            };
            Ok(Some(replies))
        })
        .await
    }

    fn next_whox_token(&self) -> u16 {
        let prev = self
            .inner
            .whox_token
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |t| {
                Some((t + 1) % WHOX_TOKEN_LIMIT)
            });
        // The closure never returns None.
        prev.unwrap_or_else(|t| t)
    }

    /// Query WHOIS information about `nick`.
    pub async fn whois(&self, nick: &str) -> Result<WhoisReply, ClientError> {
        let target = nick.to_owned();
        self.roundtrip(Message::new("WHOIS", [nick]), move |inbound, ctx| {
            let msg = &inbound.message;
            let about_target = msg.param(1).is_some_and(|n| ctx.names_equal(n, &target));
            match msg.response() {
                Some(Response::RPL_ENDOFWHOIS) if about_target => Ok(Some(WhoisReply::from_lines(
                    &target,
                    inbound.list.as_deref().unwrap_or_default(),
                ))),
                Some(Response::ERR_NOSUCHNICK) if about_target => Err(ClientError::irc(msg.clone())),
                _ => Ok(None),
            }
        })
        .await
    }

    /// List the members of `channel`.
    pub async fn names(&self, channel: &str) -> Result<Vec<NamesMember>, ClientError> {
        let target = channel.to_owned();
        self.roundtrip(Message::new("NAMES", [channel]), move |inbound, ctx| {
            let msg = &inbound.message;
            if msg.response() != Some(Response::RPL_ENDOFNAMES)
                || !msg.param(1).is_some_and(|c| ctx.names_equal(c, &target))
            {
                return Ok(None);
            }
            let lines = inbound.list.as_deref().unwrap_or_default();
            Ok(Some(parse_names(lines, &ctx.isupport().memberships())))
        })
        .await
    }

    /// Send `msg` and collect the batch of type `kind` it produces.
    pub async fn fetch_batch(&self, msg: Message, kind: &str) -> Result<BatchResult, ClientError> {
        self.fetch_batch_in(None, msg, kind).await
    }

    async fn fetch_batch_in(
        &self,
        family: Option<Family>,
        msg: Message,
        kind: &str,
    ) -> Result<BatchResult, ClientError> {
        let kind = kind.to_owned();
        let mut name: Option<String> = None;
        let mut messages = Vec::new();

        self.roundtrip_in(family, msg, move |inbound, ctx| {
            let msg = &inbound.message;
            if msg.command == "BATCH" {
                let reference = msg.param(0).unwrap_or_default();
                if let Some(opened) = reference.strip_prefix('+') {
                    if name.is_none() && msg.param(1) == Some(kind.as_str()) {
                        name = Some(opened.to_owned());
                    }
                } else if let Some(closed) = reference.strip_prefix('-') {
                    if name.as_deref() == Some(closed) {
                        let batch = ctx.batch(closed).cloned().ok_or_else(|| {
                            ClientError::MalformedReply(format!("unknown batch {}", closed))
                        })?;
                        return Ok(Some(BatchResult {
                            batch,
                            messages: std::mem::take(&mut messages),
                        }));
                    }
                }
                return Ok(None);
            }
            if name.as_deref().is_some_and(|n| inbound.in_batch(n)) {
                messages.push(msg.clone());
            }
            Ok(None)
        })
        .await
    }

    async fn history_limit(&self) -> Result<usize, ClientError> {
        let max = self.inspect(|session| session.isupport().chathistory()).await?;
        let page = self.inner.history_page_size;
        // 0: the server did not advertise a limit.
        Ok(match max {
            0 => page,
            max => page.min(max),
        })
    }

    /// Fetch the page of messages in `target` sent before `before`.
    ///
    /// `more` is set when the page is full.
    pub async fn fetch_history_before(
        &self,
        target: &str,
        before: DateTime<Utc>,
    ) -> Result<HistoryPage, ClientError> {
        let limit = self.history_limit().await?;
        let msg = Message::new(
            "CHATHISTORY",
            [
                "BEFORE".to_owned(),
                target.to_owned(),
                format!("timestamp={}", format_datetime(&before)),
                limit.to_string(),
            ],
        );
        let result = self
            .fetch_batch_in(Some(Family::ChatHistory), msg, CHATHISTORY_BATCH)
            .await?;
        Ok(HistoryPage {
            more: result.messages.len() >= limit,
            messages: result.messages,
        })
    }

    /// Fetch every message in `target` between `after` and `before`,
    /// oldest first.
    ///
    /// Pages are requested until one comes back short, each starting at the
    /// last timestamp received. Fails with
    /// [`ClientError::HistoryBudgetExceeded`] once the configured budget is
    /// reached with more pages pending.
    pub async fn fetch_history_between(
        &self,
        target: &str,
        after: DateTime<Utc>,
        before: DateTime<Utc>,
    ) -> Result<Vec<Message>, ClientError> {
        let limit = self.history_limit().await?;
        let budget = self.inner.history_budget;
        let mut collected = Vec::new();
        let mut start = after;

        loop {
            let msg = Message::new(
                "CHATHISTORY",
                [
                    "BETWEEN".to_owned(),
                    target.to_owned(),
                    format!("timestamp={}", format_datetime(&start)),
                    format!("timestamp={}", format_datetime(&before)),
                    limit.to_string(),
                ],
            );
            let page = self
                .fetch_batch_in(Some(Family::ChatHistory), msg, CHATHISTORY_BATCH)
                .await?
                .messages;
            let full = page.len() >= limit;
            let last = page
                .last()
                .and_then(|m| m.server_time())
                .and_then(parse_server_time);
            collected.extend(page);

            let Some(last) = last.filter(|_| full) else {
                return Ok(collected);
            };
            if collected.len() >= budget {
                return Err(ClientError::HistoryBudgetExceeded(budget));
            }
            start = last;
        }
    }

    /// List conversations with activity between `from` and `to`.
    pub async fn fetch_history_targets(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<HistoryTarget>, ClientError> {
        let limit = self.history_limit().await?;
        let msg = Message::new(
            "CHATHISTORY",
            [
                "TARGETS".to_owned(),
                format!("timestamp={}", format_datetime(&from)),
                format!("timestamp={}", format_datetime(&to)),
                limit.to_string(),
            ],
        );
        let result = self
            .fetch_batch_in(Some(Family::ChatHistory), msg, CHATHISTORY_TARGETS_BATCH)
            .await?;
        Ok(result
            .messages
            .iter()
            .filter_map(HistoryTarget::from_message)
            .collect())
    }

    /// List the networks of a soju bouncer.
    pub async fn list_bouncer_networks(&self) -> Result<Vec<BouncerNetwork>, ClientError> {
        let result = self
            .fetch_batch(Message::new("BOUNCER", ["LISTNETWORKS"]), BOUNCER_NETWORKS_BATCH)
            .await?;
        Ok(result
            .messages
            .iter()
            .filter_map(BouncerNetwork::from_message)
            .collect())
    }

    /// Track `targets` with MONITOR; the list survives reconnects.
    pub fn monitor<I, S>(&self, targets: I) -> Result<(), ClientError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.request(Request::Monitor(targets.into_iter().map(Into::into).collect()))
    }

    /// Stop tracking `targets`.
    pub fn unmonitor<I, S>(&self, targets: I) -> Result<(), ClientError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.request(Request::Unmonitor(targets.into_iter().map(Into::into).collect()))
    }
}
