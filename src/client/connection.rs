//! The task that owns a connection.
//!
//! All protocol state lives in one [`Driver`], mutated only from its
//! `run` loop. [`crate::client::Client`] handles talk to it through a
//! request channel; it talks back through a broadcast channel of
//! [`Event`]s and a watch channel of [`Status`].

use std::pin::Pin;
use std::sync::Arc;

use chrono::Utc;
use futures_util::future::BoxFuture;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::{self, Instant, Interval, MissedTickBehavior, Sleep};
use tracing::{debug, info, warn};

use super::correlator::{Correlator, Family, Pending};
use super::Event;
use crate::backoff::Backoff;
use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::message::Message;
use crate::state::{Session, SessionAction, Status};
use crate::transport::{CloseReason, Connector, Transport};

/// Work handed to the driver by client handles.
pub(crate) enum Request {
    Connect,
    Disconnect,
    SetOnline(bool),
    Send(Message, oneshot::Sender<Result<(), ClientError>>),
    Roundtrip {
        msg: Message,
        family: Option<Family>,
        pending: Box<dyn Pending>,
    },
    Monitor(Vec<String>),
    Unmonitor(Vec<String>),
    Inspect(Box<dyn FnOnce(&Session) + Send>),
}

type Connecting = BoxFuture<'static, Result<Transport, ClientError>>;

pub(crate) struct Driver {
    config: ClientConfig,
    connector: Arc<dyn Connector>,
    session: Session,
    correlator: Correlator,
    requests: mpsc::UnboundedReceiver<Request>,
    events: broadcast::Sender<Event>,
    status: watch::Sender<Status>,
    transport: Option<Transport>,
    connecting: Option<Connecting>,
    reconnect: Option<Pin<Box<Sleep>>>,
    keepalive: Option<Interval>,
    backoff: Backoff,
    online: bool,
    /// Cleared by an explicit disconnect; reconnects only happen while set.
    wanted: bool,
    /// A reconnect is due as soon as the network comes back.
    awaiting_online: bool,
}

impl Driver {
    pub(crate) fn new(
        config: ClientConfig,
        connector: Arc<dyn Connector>,
        requests: mpsc::UnboundedReceiver<Request>,
        events: broadcast::Sender<Event>,
        status: watch::Sender<Status>,
    ) -> Self {
        Self {
            session: Session::new(&config),
            backoff: Backoff::new(config.reconnect_min(), config.reconnect_max()),
            config,
            connector,
            correlator: Correlator::new(),
            requests,
            events,
            status,
            transport: None,
            connecting: None,
            reconnect: None,
            keepalive: None,
            online: true,
            wanted: false,
            awaiting_online: false,
        }
    }

    pub(crate) async fn run(mut self) {
        loop {
            tokio::select! {
                request = self.requests.recv() => match request {
                    Some(request) => self.handle_request(request).await,
                    None => break,
                },
                result = connecting(&mut self.connecting) => {
                    self.connecting = None;
                    self.on_connect_result(result).await;
                }
                read = read(&mut self.transport) => match read {
                    Ok(msg) => self.on_message(msg).await,
                    Err(reason) => self.on_close(reason),
                },
                () = sleep(&mut self.reconnect) => {
                    self.reconnect = None;
                    self.start_connect();
                }
                () = tick(&mut self.keepalive) => {
                    let token = Utc::now().timestamp_millis().to_string();
                    let _ = self.write(Message::new("PING", [token])).await;
                }
            }
        }

        debug!("all client handles dropped, shutting down");
        self.wanted = false;
        self.teardown().await;
    }

    async fn handle_request(&mut self, request: Request) {
        match request {
            Request::Connect => {
                self.wanted = true;
                self.reconnect = None;
                self.start_connect();
            }
            Request::Disconnect => {
                info!("disconnect requested");
                self.wanted = false;
                self.teardown().await;
            }
            Request::SetOnline(online) => self.set_online(online),
            Request::Send(msg, reply) => {
                let result = self.write(msg).await;
                let _ = reply.send(result);
            }
            Request::Roundtrip {
                msg,
                family,
                pending,
            } => {
                if self.transport.is_none() {
                    pending.fail(ClientError::ConnectionClosed);
                    return;
                }
                let labeled = self.labeled();
                if let Some(msg) = self.correlator.submit(msg, family, pending, labeled) {
                    // A failed write closes the connection, which fails the pending request.
                    let _ = self.write(msg).await;
                }
            }
            Request::Monitor(targets) => {
                let lines = self.session.monitor(targets.iter().map(String::as_str));
                self.write_all(lines).await;
            }
            Request::Unmonitor(targets) => {
                let lines = self.session.unmonitor(targets.iter().map(String::as_str));
                self.write_all(lines).await;
            }
            Request::Inspect(f) => f(&self.session),
        }
    }

    fn labeled(&self) -> bool {
        self.session.caps().is_enabled("labeled-response")
    }

    fn set_status(&mut self, status: Status) {
        if *self.status.borrow() == status {
            return;
        }
        self.status.send_replace(status);
        self.emit(Event::StatusChanged(status));
    }

    fn emit(&self, event: Event) {
        // No subscribers is not an error.
        let _ = self.events.send(event);
    }

    fn start_connect(&mut self) {
        if self.transport.is_some() || self.connecting.is_some() {
            return;
        }
        info!(url = %self.config.url, "connecting");
        self.session.on_connecting();
        self.set_status(Status::Connecting);
        self.connecting = Some(self.connector.connect());
    }

    async fn on_connect_result(&mut self, result: Result<Transport, ClientError>) {
        match result {
            Ok(transport) => {
                info!(url = %self.config.url, "connection opened");
                self.transport = Some(transport);
                let greeting = self.session.on_open();
                self.set_status(Status::Registering);
                if let Some(period) = self.config.ping_interval() {
                    let mut interval = time::interval_at(Instant::now() + period, period);
                    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                    self.keepalive = Some(interval);
                }
                self.write_all(greeting).await;
            }
            Err(e) => {
                warn!(error = %e, "failed to connect");
                self.emit(Event::Error(e));
                self.session.on_close();
                self.set_status(Status::Disconnected);
                self.schedule_reconnect();
            }
        }
    }

    async fn on_message(&mut self, msg: Message) {
        let (inbound, actions) = self.session.handle(msg);

        let mut disconnect = false;
        for action in actions {
            match action {
                SessionAction::Send(msg) => {
                    let _ = self.write(*msg).await;
                }
                SessionAction::Registered => {
                    self.backoff.reset();
                    self.set_status(Status::Registered);
                }
                SessionAction::Error(e) => self.emit(Event::Error(e)),
                SessionAction::Disconnect => disconnect = true,
            }
        }

        let labeled = self.labeled();
        let ready = self
            .correlator
            .feed(&inbound, &self.session.context(), labeled);
        self.emit(Event::Message(inbound.clone()));
        self.session.after_dispatch(&inbound);
        self.write_all(ready).await;

        // A failed write above may already have closed the connection.
        if disconnect {
            if let Some(mut transport) = self.transport.take() {
                transport.close().await;
                self.on_close(CloseReason::Normal);
            }
        }
    }

    /// Handle the transport going away, whatever the cause.
    fn on_close(&mut self, reason: CloseReason) {
        self.transport = None;
        self.keepalive = None;
        match reason {
            CloseReason::Normal => info!("connection closed"),
            CloseReason::Abnormal(e) => {
                warn!(error = %e, "connection lost");
                self.emit(Event::Error(e));
            }
        }
        self.session.on_close();
        self.correlator.fail_all(&ClientError::ConnectionClosed);
        self.set_status(Status::Disconnected);
        self.schedule_reconnect();
    }

    fn schedule_reconnect(&mut self) {
        if !self.wanted || !self.config.auto_reconnect {
            return;
        }
        if !self.online {
            info!("network offline, waiting before reconnecting");
            self.awaiting_online = true;
            return;
        }
        let delay = self.backoff.next();
        info!(delay = ?delay, "reconnecting after delay");
        self.reconnect = Some(Box::pin(time::sleep(delay)));
    }

    fn set_online(&mut self, online: bool) {
        if self.online == online {
            return;
        }
        self.online = online;
        debug!(online, "network availability changed");
        if online {
            if std::mem::take(&mut self.awaiting_online) && self.wanted {
                self.start_connect();
            }
        } else if self.reconnect.take().is_some() {
            self.awaiting_online = true;
        }
    }

    /// Close everything without scheduling a reconnect.
    async fn teardown(&mut self) {
        self.reconnect = None;
        self.keepalive = None;
        self.connecting = None;
        self.awaiting_online = false;
        if let Some(mut transport) = self.transport.take() {
            transport.close().await;
            info!("connection closed");
        }
        self.session.on_close();
        self.correlator.fail_all(&ClientError::ConnectionClosed);
        self.set_status(Status::Disconnected);
    }

    /// Write one message; a failed write closes the connection.
    async fn write(&mut self, msg: Message) -> Result<(), ClientError> {
        let transport = self
            .transport
            .as_mut()
            .ok_or(ClientError::ConnectionClosed)?;
        if let Err(e) = transport.send(msg).await {
            self.on_close(CloseReason::Abnormal(e.clone()));
            return Err(e);
        }
        Ok(())
    }

    async fn write_all(&mut self, msgs: Vec<Message>) {
        for msg in msgs {
            if self.write(msg).await.is_err() {
                break;
            }
        }
    }
}

async fn connecting(slot: &mut Option<Connecting>) -> Result<Transport, ClientError> {
    match slot {
        Some(fut) => fut.await,
        None => std::future::pending().await,
    }
}

async fn read(slot: &mut Option<Transport>) -> Result<Message, CloseReason> {
    match slot {
        Some(transport) => transport.read_message().await,
        None => std::future::pending().await,
    }
}

async fn sleep(slot: &mut Option<Pin<Box<Sleep>>>) {
    match slot {
        Some(sleep) => sleep.as_mut().await,
        None => std::future::pending().await,
    }
}

async fn tick(slot: &mut Option<Interval>) {
    match slot {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
