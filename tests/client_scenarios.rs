//! End-to-end client scenarios against a scripted server.
//!
//! Every connection attempt gets one half of an in-memory duplex pipe; the
//! test plays the server on the other half. Time is paused, so reconnect
//! delays elapse as soon as the runtime goes idle.
//!
//! Run with: `cargo test --test client_scenarios`

use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use chrono::{TimeZone, Utc};
use futures_util::future::BoxFuture;
use futures_util::{SinkExt, StreamExt};
use slirc_client::client::{ClientConfig, Event, Status};
use slirc_client::sasl::encode_plain;
use slirc_client::{Client, ClientError, IrcCodec, Message, Response, SaslCredentials, Transport};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, DuplexStream, ReadBuf};
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;
use tokio_util::codec::Framed;

/// The server side of one connection.
struct Peer {
    framed: Framed<DuplexStream, IrcCodec>,
}

impl Peer {
    async fn recv(&mut self) -> Message {
        self.framed
            .next()
            .await
            .expect("client closed the connection")
            .expect("client sent a valid line")
    }

    async fn expect(&mut self, line: &str) {
        let msg = self.recv().await;
        assert_eq!(msg.to_string().trim_end(), line);
    }

    async fn send(&mut self, line: &str) {
        let msg: Message = line.parse().expect("scripted line parses");
        self.framed.send(msg).await.expect("client is reading");
    }

    async fn send_raw(&mut self, bytes: &[u8]) {
        let stream = self.framed.get_mut();
        stream.write_all(bytes).await.expect("client is reading");
        stream.flush().await.expect("client is reading");
    }

    /// Nothing more arrives within a second.
    async fn expect_silence(&mut self) {
        let next = tokio::time::timeout(Duration::from_secs(1), self.framed.next()).await;
        assert!(next.is_err(), "unexpected line: {:?}", next);
    }
}

/// The client's half of the pipe; writes fail once `broken` is set.
struct Breakable {
    inner: DuplexStream,
    broken: Arc<AtomicBool>,
}

impl AsyncRead for Breakable {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for Breakable {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        if this.broken.load(Ordering::SeqCst) {
            return Poll::Ready(Err(io::ErrorKind::BrokenPipe.into()));
        }
        Pin::new(&mut this.inner).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}

/// A client whose connection attempts are accepted through the returned
/// receiver.
fn scripted_client(config: ClientConfig) -> (Client, mpsc::UnboundedReceiver<Peer>) {
    breakable_client(config, Arc::new(AtomicBool::new(false)))
}

/// Like [`scripted_client`], with every connection's writes failing once
/// `broken` is set.
fn breakable_client(
    config: ClientConfig,
    broken: Arc<AtomicBool>,
) -> (Client, mpsc::UnboundedReceiver<Peer>) {
    let (accepted, incoming) = mpsc::unbounded_channel();
    let connector = move || -> BoxFuture<'static, Result<Transport, ClientError>> {
        let (client_side, server_side) = tokio::io::duplex(16 * 1024);
        let _ = accepted.send(Peer {
            framed: Framed::new(server_side, IrcCodec::new()),
        });
        let stream = Breakable {
            inner: client_side,
            broken: broken.clone(),
        };
        Box::pin(async move { Ok(Transport::from_stream(stream)) })
    };
    (Client::with_connector(config, connector), incoming)
}

async fn wait_for_status(events: &mut broadcast::Receiver<Event>, want: Status) {
    loop {
        match events.recv().await.expect("client is alive") {
            Event::StatusChanged(status) if status == want => return,
            _ => {}
        }
    }
}

/// Registration is over and the ISUPPORT tokens that preceded the end of
/// the MOTD have been applied.
async fn wait_for_motd(events: &mut broadcast::Receiver<Event>) {
    loop {
        match events.recv().await.expect("client is alive") {
            Event::Message(inbound) if inbound.message.command == "376" => return,
            _ => {}
        }
    }
}

/// Accept a connection and register without SASL, advertising `caps` and
/// the ISUPPORT `tokens`.
async fn register(incoming: &mut mpsc::UnboundedReceiver<Peer>, caps: &str, tokens: &str) -> Peer {
    let mut peer = incoming.recv().await.expect("client connects");
    peer.expect("CAP LS :302").await;
    peer.expect("NICK alice").await;
    peer.expect("USER alice 0 * :alice").await;

    peer.send(&format!(":srv CAP * LS :{}", caps)).await;
    peer.expect(&format!("CAP REQ :{}", caps)).await;
    peer.expect("CAP END").await;
    peer.send(&format!(":srv CAP alice ACK :{}", caps)).await;

    peer.send(":srv 001 alice :Welcome to the test network").await;
    peer.send(&format!(":srv 005 alice {} :are supported by this server", tokens)).await;
    peer.send(":srv 376 alice :End of /MOTD command.").await;
    peer
}

#[tokio::test(start_paused = true)]
async fn sasl_plain_registration() {
    let mut config = ClientConfig::new("irc://test", "alice");
    config.sasl = Some(SaslCredentials::Plain {
        username: "alice".into(),
        password: "hunter2".into(),
    });
    let (client, mut incoming) = scripted_client(config);
    let mut events = client.subscribe();
    client.connect();

    let mut peer = incoming.recv().await.expect("client connects");
    peer.expect("CAP LS :302").await;
    peer.expect("NICK alice").await;
    peer.expect("USER alice 0 * :alice").await;

    peer.send(":srv CAP * LS :sasl=PLAIN,EXTERNAL message-tags").await;
    peer.expect("CAP REQ :message-tags sasl").await;
    peer.expect("AUTHENTICATE PLAIN").await;
    peer.expect(&format!("AUTHENTICATE {}", encode_plain("alice", "hunter2")))
        .await;

    peer.send(":srv CAP alice ACK :message-tags sasl").await;
    peer.send("AUTHENTICATE +").await;
    peer.send(":srv 900 alice alice!alice@host alice :You are now logged in as alice").await;
    // Registration must not end before the server confirms authentication.
    peer.expect_silence().await;

    peer.send(":srv 903 alice :SASL authentication successful").await;
    peer.expect("CAP END").await;
    peer.send(":srv 001 alice :Welcome").await;

    wait_for_status(&mut events, Status::Registered).await;
    assert_eq!(client.status(), Status::Registered);
    assert_eq!(client.nick().await.expect("client is alive"), "alice");
}

#[tokio::test(start_paused = true)]
async fn who_requests_are_serialized() {
    let (client, mut incoming) = scripted_client(ClientConfig::new("irc://test", "alice"));
    let mut events = client.subscribe();
    client.connect();
    let mut peer = register(&mut incoming, "batch", "CASEMAPPING=ascii").await;
    wait_for_motd(&mut events).await;

    let first = tokio::spawn({
        let client = client.clone();
        async move { client.who("#a").await }
    });
    peer.expect("WHO #a").await;

    let second = tokio::spawn({
        let client = client.clone();
        async move { client.who("#b").await }
    });
    // The second WHO waits for the first to finish.
    peer.expect_silence().await;

    peer.send(":srv 352 alice #a ident host srv bob H :0 Bob Builder").await;
    peer.send(":srv 315 alice #a :End of WHO list").await;
    peer.expect("WHO #b").await;

    let replies = first.await.expect("task").expect("WHO #a");
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].nick, "bob");
    assert_eq!(replies[0].realname, "Bob Builder");
    assert!(!replies[0].is_away());

    peer.send(":srv 315 alice #B :End of WHO list").await;
    let replies = second.await.expect("task").expect("WHO #b");
    assert!(replies.is_empty());
}

#[tokio::test(start_paused = true)]
async fn whox_when_advertised() {
    let (client, mut incoming) = scripted_client(ClientConfig::new("irc://test", "alice"));
    let mut events = client.subscribe();
    client.connect();
    let mut peer = register(&mut incoming, "batch", "WHOX").await;
    wait_for_motd(&mut events).await;

    let who = tokio::spawn({
        let client = client.clone();
        async move { client.who("#a").await }
    });
    peer.expect("WHO #a :%tcuihsnfdlaor,0").await;

    // Another client's token is ignored.
    peer.send(":srv 354 alice 5 #a u 1.2.3.4 h srv carol H 0 0 carol :Carol").await;
    peer.send(":srv 354 alice 0 #a u 255.255.255.255 h srv bob G* 2 30 0 n/a :Bob").await;
    peer.send(":srv 315 alice #a :End of WHO list").await;

    let replies = who.await.expect("task").expect("WHO #a");
    assert_eq!(replies.len(), 1);
    let bob = &replies[0];
    assert_eq!(bob.nick, "bob");
    assert_eq!(bob.ip, None);
    assert_eq!(bob.account, None);
    assert!(bob.is_away());
    assert!(bob.is_operator());
}

#[tokio::test(start_paused = true)]
async fn reconnects_after_backoff() {
    let (client, mut incoming) = scripted_client(ClientConfig::new("irc://test", "alice"));
    let mut events = client.subscribe();
    client.connect();
    let mut peer = register(&mut incoming, "batch", "CASEMAPPING=rfc1459").await;
    wait_for_motd(&mut events).await;

    peer.send_raw(b"PRIVMSG alice :bad\0line\r\n").await;

    let error = loop {
        match events.recv().await.expect("client is alive") {
            Event::Error(e) => break e,
            Event::StatusChanged(status) => panic!("status {:?} before the error", status),
            Event::Message(_) => {}
        }
    };
    assert!(matches!(error, ClientError::Decode(_)));
    wait_for_status(&mut events, Status::Disconnected).await;

    let lost = Instant::now();
    let mut peer = incoming.recv().await.expect("client reconnects");
    assert!(lost.elapsed() >= Duration::from_secs(10));
    wait_for_status(&mut events, Status::Connecting).await;
    peer.expect("CAP LS :302").await;
}

#[tokio::test(start_paused = true)]
async fn explicit_disconnect_does_not_reconnect() {
    let (client, mut incoming) = scripted_client(ClientConfig::new("irc://test", "alice"));
    let mut events = client.subscribe();
    client.connect();
    let _peer = register(&mut incoming, "batch", "CASEMAPPING=ascii").await;
    wait_for_motd(&mut events).await;

    client.disconnect();
    wait_for_status(&mut events, Status::Disconnected).await;

    let next = tokio::time::timeout(Duration::from_secs(3600), incoming.recv()).await;
    assert!(next.is_err(), "client reconnected after disconnect");
}

#[tokio::test(start_paused = true)]
async fn chathistory_page_in_a_batch() {
    let (client, mut incoming) = scripted_client(ClientConfig::new("irc://test", "alice"));
    let mut events = client.subscribe();
    client.connect();
    let mut peer = register(
        &mut incoming,
        "batch server-time draft/chathistory",
        "CHATHISTORY=50",
    )
    .await;
    wait_for_motd(&mut events).await;

    let before = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
    let fetch = tokio::spawn({
        let client = client.clone();
        async move { client.fetch_history_before("#chan", before).await }
    });

    let request = peer.recv().await;
    assert_eq!(request.command, "CHATHISTORY");
    assert_eq!(request.param(0), Some("BEFORE"));
    assert_eq!(request.param(1), Some("#chan"));
    assert!(request.param(2).is_some_and(|p| p.starts_with("timestamp=2024-01-02T00:00:00")));
    assert_eq!(request.param(3), Some("50"));

    peer.send(":srv BATCH +h1 chathistory #chan").await;
    peer.send("@batch=h1;time=2024-01-01T10:00:00.000Z :bob!b@h PRIVMSG #chan :one").await;
    // Traffic outside the batch is not part of the page.
    peer.send("@time=2024-01-02T10:00:00.000Z :carol!c@h PRIVMSG #chan :live").await;
    peer.send("@batch=h1;time=2024-01-01T11:00:00.000Z :bob!b@h PRIVMSG #chan :two").await;
    peer.send(":srv BATCH -h1").await;

    let page = fetch.await.expect("task").expect("history page");
    assert!(!page.more);
    let texts: Vec<_> = page.messages.iter().filter_map(Message::last_param).collect();
    assert_eq!(texts, vec!["one", "two"]);
}

#[tokio::test(start_paused = true)]
async fn roundtrip_fails_when_connection_drops() {
    let (client, mut incoming) = scripted_client(ClientConfig::new("irc://test", "alice"));
    let mut events = client.subscribe();
    client.connect();
    let mut peer = register(&mut incoming, "batch", "CASEMAPPING=ascii").await;
    wait_for_motd(&mut events).await;

    let whois = tokio::spawn({
        let client = client.clone();
        async move { client.whois("bob").await }
    });
    peer.expect("WHOIS bob").await;
    drop(peer);

    let err = whois.await.expect("task").unwrap_err();
    assert!(matches!(err, ClientError::ConnectionClosed));
}

/// Answer one CHATHISTORY request with a batch of PRIVMSGs stamped at
/// the given hours of 2024-01-01.
async fn serve_history_page(peer: &mut Peer, batch: &str, hours: &[u32]) -> Message {
    let request = peer.recv().await;
    assert_eq!(request.command, "CHATHISTORY");
    peer.send(&format!(":srv BATCH +{} chathistory #chan", batch)).await;
    for hour in hours {
        peer.send(&format!(
            "@batch={};time=2024-01-01T{:02}:00:00.000Z :bob!b@h PRIVMSG #chan :at {}",
            batch, hour, hour
        ))
        .await;
    }
    peer.send(&format!(":srv BATCH -{}", batch)).await;
    request
}

fn history_config(budget: usize) -> ClientConfig {
    let mut config = ClientConfig::new("irc://test", "alice");
    config.history_page_size = 2;
    config.history_budget = budget;
    config
}

#[tokio::test(start_paused = true)]
async fn chathistory_between_follows_pages() {
    let (client, mut incoming) = scripted_client(history_config(100));
    let mut events = client.subscribe();
    client.connect();
    let mut peer = register(&mut incoming, "batch server-time", "CASEMAPPING=ascii").await;
    wait_for_motd(&mut events).await;

    let after = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let before = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
    let fetch = tokio::spawn({
        let client = client.clone();
        async move { client.fetch_history_between("#chan", after, before).await }
    });

    let first = serve_history_page(&mut peer, "p1", &[1, 2]).await;
    assert_eq!(first.param(0), Some("BETWEEN"));
    assert_eq!(first.param(2), Some("timestamp=2024-01-01T00:00:00.000Z"));
    assert_eq!(first.param(4), Some("2"));

    // The next page starts at the last timestamp received.
    let second = serve_history_page(&mut peer, "p2", &[3]).await;
    assert_eq!(second.param(2), Some("timestamp=2024-01-01T02:00:00.000Z"));

    let messages = fetch.await.expect("task").expect("history range");
    let texts: Vec<_> = messages.iter().filter_map(Message::last_param).collect();
    assert_eq!(texts, vec!["at 1", "at 2", "at 3"]);
}

#[tokio::test(start_paused = true)]
async fn chathistory_between_respects_budget() {
    let (client, mut incoming) = scripted_client(history_config(3));
    let mut events = client.subscribe();
    client.connect();
    let mut peer = register(&mut incoming, "batch server-time", "CASEMAPPING=ascii").await;
    wait_for_motd(&mut events).await;

    let after = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let before = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
    let fetch = tokio::spawn({
        let client = client.clone();
        async move { client.fetch_history_between("#chan", after, before).await }
    });

    serve_history_page(&mut peer, "p1", &[1, 2]).await;
    serve_history_page(&mut peer, "p2", &[3, 4]).await;

    let err = fetch.await.expect("task").unwrap_err();
    assert!(matches!(err, ClientError::HistoryBudgetExceeded(3)));
    // No third page is requested.
    peer.expect_silence().await;
}

#[tokio::test(start_paused = true)]
async fn closing_batch_reaches_subscribers() {
    let (client, mut incoming) = scripted_client(ClientConfig::new("irc://test", "alice"));
    let mut events = client.subscribe();
    client.connect();
    let mut peer = register(&mut incoming, "batch", "CASEMAPPING=ascii").await;
    wait_for_motd(&mut events).await;

    peer.send(":srv BATCH +h1 chathistory #chan").await;
    peer.send("@batch=h1 :bob!b@h PRIVMSG #chan :one").await;
    peer.send(":srv BATCH -h1").await;

    let close = loop {
        match events.recv().await.expect("client is alive") {
            Event::Message(inbound) if inbound.message.command == "BATCH" => {
                if inbound.message.param(0) == Some("-h1") {
                    break inbound;
                }
            }
            _ => {}
        }
    };
    let batch = close.closing.as_deref().expect("closed batch is attached");
    assert_eq!(batch.name, "h1");
    assert_eq!(batch.kind, "chathistory");
    assert_eq!(batch.params, vec!["#chan"]);
}

#[tokio::test(start_paused = true)]
async fn send_reports_a_failed_write() {
    let broken = Arc::new(AtomicBool::new(false));
    let (client, mut incoming) =
        breakable_client(ClientConfig::new("irc://test", "alice"), broken.clone());
    let mut events = client.subscribe();
    client.connect();
    let _peer = register(&mut incoming, "batch", "CASEMAPPING=ascii").await;
    wait_for_motd(&mut events).await;

    broken.store(true, Ordering::SeqCst);
    let err = client
        .send(Message::privmsg("#chan", "lost"))
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Transport(_)));
    wait_for_status(&mut events, Status::Disconnected).await;

    let err = client
        .send(Message::privmsg("#chan", "offline"))
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::ConnectionClosed));
}

#[tokio::test(start_paused = true)]
async fn join_resolves_on_casemapped_echo() {
    let (client, mut incoming) = scripted_client(ClientConfig::new("irc://test", "alice"));
    let mut events = client.subscribe();
    client.connect();
    let mut peer = register(&mut incoming, "batch", "CASEMAPPING=rfc1459").await;
    wait_for_motd(&mut events).await;

    let join = tokio::spawn({
        let client = client.clone();
        async move { client.join("#Chan[1]", None).await }
    });
    peer.expect("JOIN #Chan[1]").await;
    // Someone else joining does not resolve our request.
    peer.send(":bob!b@h JOIN #chan{1}").await;
    peer.send(":ALICE!a@h JOIN #chan{1}").await;

    let echo = join.await.expect("task").expect("joined");
    assert_eq!(echo.source_name(), Some("ALICE"));
    assert_eq!(echo.param(0), Some("#chan{1}"));
}

#[tokio::test(start_paused = true)]
async fn join_rejected_by_error_numeric() {
    let (client, mut incoming) = scripted_client(ClientConfig::new("irc://test", "alice"));
    let mut events = client.subscribe();
    client.connect();
    let mut peer = register(&mut incoming, "batch", "CASEMAPPING=ascii").await;
    wait_for_motd(&mut events).await;

    let join = tokio::spawn({
        let client = client.clone();
        async move { client.join("#secret", Some("key")).await }
    });
    peer.expect("JOIN #secret :key").await;
    peer.send(":srv 474 alice #other :Cannot join channel (+b)").await;
    peer.send(":srv 474 alice #SECRET :Cannot join channel (+b)").await;

    let err = join.await.expect("task").unwrap_err();
    let reply = err.irc_message().expect("error reply");
    assert_eq!(reply.response(), Some(Response::ERR_BANNEDFROMCHAN));
    assert_eq!(reply.param(1), Some("#SECRET"));
}

#[tokio::test(start_paused = true)]
async fn offline_close_waits_for_network() {
    let (client, mut incoming) = scripted_client(ClientConfig::new("irc://test", "alice"));
    let mut events = client.subscribe();
    client.connect();
    let peer = register(&mut incoming, "batch", "CASEMAPPING=ascii").await;
    wait_for_motd(&mut events).await;

    client.set_online(false);
    drop(peer);
    wait_for_status(&mut events, Status::Disconnected).await;

    // No backoff timer runs while offline.
    let next = tokio::time::timeout(Duration::from_secs(3600), incoming.recv()).await;
    assert!(next.is_err(), "client reconnected while offline");

    let back = Instant::now();
    client.set_online(true);
    let mut peer = incoming.recv().await.expect("client reconnects");
    assert!(back.elapsed() < Duration::from_secs(1));
    peer.expect("CAP LS :302").await;
}

#[tokio::test(start_paused = true)]
async fn keepalive_ping_follows_each_connection() {
    let mut config = ClientConfig::new("irc://test", "alice");
    config.ping_interval_secs = 30;
    let (client, mut incoming) = scripted_client(config);
    let mut events = client.subscribe();

    let opened = Instant::now();
    client.connect();
    let mut peer = register(&mut incoming, "batch", "CASEMAPPING=ascii").await;
    wait_for_motd(&mut events).await;

    let ping = peer.recv().await;
    assert_eq!(ping.command, "PING");
    assert!(ping.param(0).is_some_and(|t| t.parse::<i64>().is_ok()));
    assert!(opened.elapsed() >= Duration::from_secs(30));

    client.disconnect();
    wait_for_status(&mut events, Status::Disconnected).await;
    assert!(peer.framed.next().await.is_none());

    // A new connection starts its own schedule.
    let reopened = Instant::now();
    client.connect();
    let mut peer = register(&mut incoming, "batch", "CASEMAPPING=ascii").await;
    wait_for_motd(&mut events).await;
    assert_eq!(peer.recv().await.command, "PING");
    assert!(reopened.elapsed() >= Duration::from_secs(30));
}

#[tokio::test(start_paused = true)]
async fn labeled_reply_goes_to_its_request() {
    let (client, mut incoming) = scripted_client(ClientConfig::new("irc://test", "alice"));
    let mut events = client.subscribe();
    client.connect();
    let mut peer = register(&mut incoming, "batch labeled-response", "CASEMAPPING=ascii").await;
    wait_for_motd(&mut events).await;

    let time = tokio::spawn({
        let client = client.clone();
        async move {
            client
                .roundtrip(Message::new("TIME", ["srv"]), |inbound, _| {
                    let msg = &inbound.message;
                    Ok((msg.command == "391").then(|| msg.clone()))
                })
                .await
        }
    });
    peer.expect("@label=1 TIME srv").await;
    peer.send("@label=7 :srv 391 alice srv :not ours").await;
    peer.send("@label=1 :srv 391 alice srv :ours").await;

    let reply = time.await.expect("task").expect("TIME reply");
    assert_eq!(reply.last_param(), Some("ours"));
}

#[tokio::test(start_paused = true)]
async fn account_required_reconnects_after_backoff() {
    let (client, mut incoming) = scripted_client(ClientConfig::new("irc://test", "alice"));
    let mut events = client.subscribe();
    client.connect();

    let mut peer = incoming.recv().await.expect("client connects");
    peer.expect("CAP LS :302").await;
    peer.expect("NICK alice").await;
    peer.expect("USER alice 0 * :alice").await;
    peer.send(":srv CAP * LS :batch").await;
    peer.expect("CAP REQ :batch").await;
    peer.expect("CAP END").await;
    peer.send("FAIL * ACCOUNT_REQUIRED :You must authenticate").await;

    let error = loop {
        match events.recv().await.expect("client is alive") {
            Event::Error(e) => break e,
            Event::StatusChanged(Status::Disconnected) => panic!("closed before the error"),
            _ => {}
        }
    };
    let reply = error.irc_message().expect("error reply");
    assert_eq!(reply.param(1), Some("ACCOUNT_REQUIRED"));
    wait_for_status(&mut events, Status::Disconnected).await;

    let lost = Instant::now();
    let mut peer = incoming.recv().await.expect("client reconnects");
    assert!(lost.elapsed() >= Duration::from_secs(10));
    peer.expect("CAP LS :302").await;
}

#[tokio::test(start_paused = true)]
async fn failed_write_during_fatal_reply_closes_once() {
    let broken = Arc::new(AtomicBool::new(false));
    let (client, mut incoming) =
        breakable_client(ClientConfig::new("irc://test", "alice"), broken.clone());
    client.connect();

    let mut peer = incoming.recv().await.expect("client connects");
    peer.expect("CAP LS :302").await;
    peer.expect("NICK alice").await;
    peer.expect("USER alice 0 * :alice").await;

    let first = tokio::spawn({
        let client = client.clone();
        async move { client.who("#a").await }
    });
    peer.expect("WHO #a").await;
    let second = tokio::spawn({
        let client = client.clone();
        async move { client.who("#b").await }
    });
    peer.expect_silence().await;

    // Failing the first WHO promotes the second, whose write fails before
    // the fatal reply's own disconnect runs.
    broken.store(true, Ordering::SeqCst);
    let failed = Instant::now();
    peer.send("FAIL WHO ACCOUNT_REQUIRED :You must authenticate").await;

    assert!(first.await.expect("task").unwrap_err().irc_message().is_some());
    assert!(matches!(
        second.await.expect("task").unwrap_err(),
        ClientError::ConnectionClosed
    ));

    // Only one backoff step was taken.
    let _peer = incoming.recv().await.expect("client reconnects");
    let waited = failed.elapsed();
    assert!(waited >= Duration::from_secs(10));
    assert!(waited < Duration::from_secs(20));
}
