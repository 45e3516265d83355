//! Transports carrying IRC lines to and from a server.
//!
//! A [`Transport`] is one opened connection: either a byte stream framed
//! with [`IrcCodec`] (plain TCP, TLS, or anything else that is
//! `AsyncRead + AsyncWrite`) or a WebSocket carrying one line per text
//! frame. A [`Connector`] produces a fresh transport for every connection
//! attempt.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::{ClientConfig as TlsConfig, RootCertStore};
use tokio_rustls::TlsConnector;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::codec::Framed;
use tracing::{debug, trace, warn};

use crate::error::{ClientError, ProtocolError};
use crate::irc::IrcCodec;
use crate::message::Message;

/// Byte streams a [`Transport`] can be built on.
pub trait AsyncStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T> AsyncStream for T where T: AsyncRead + AsyncWrite + Unpin + Send {}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Why a transport stopped delivering messages.
#[derive(Clone, Debug)]
pub enum CloseReason {
    /// The peer closed the connection cleanly.
    Normal,
    /// The connection failed; the error is reported to listeners.
    Abnormal(ClientError),
}

/// One opened connection to a server.
pub enum Transport {
    /// A CRLF-framed byte stream.
    Stream(Framed<Box<dyn AsyncStream>, IrcCodec>),
    /// A WebSocket, one IRC line per text frame.
    WebSocket(Box<WsStream>),
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Transport::Stream(_) => f.write_str("Transport::Stream"),
            Transport::WebSocket(_) => f.write_str("Transport::WebSocket"),
        }
    }
}

impl Transport {
    /// Frame an arbitrary byte stream.
    pub fn from_stream<S: AsyncStream + 'static>(stream: S) -> Self {
        let boxed: Box<dyn AsyncStream> = Box::new(stream);
        Transport::Stream(Framed::new(boxed, IrcCodec::new()))
    }

    /// Frame a plain TCP socket, enabling TCP keep-alive.
    pub fn tcp(stream: TcpStream) -> Self {
        if let Err(e) = enable_keepalive(&stream) {
            warn!("failed to enable TCP keepalive: {}", e);
        }
        Self::from_stream(stream)
    }

    /// Wrap an established WebSocket.
    pub fn websocket(stream: WsStream) -> Self {
        Transport::WebSocket(Box::new(stream))
    }

    /// Whether lines travel as WebSocket frames.
    pub fn is_websocket(&self) -> bool {
        matches!(self, Transport::WebSocket(_))
    }

    /// Wait for the next message.
    ///
    /// Any error ends the connection: a line-oriented stream cannot be
    /// resynchronised after a framing failure.
    pub async fn read_message(&mut self) -> Result<Message, CloseReason> {
        let msg = match self {
            Transport::Stream(framed) => match framed.next().await {
                Some(Ok(msg)) => msg,
                Some(Err(e)) => return Err(CloseReason::Abnormal(protocol_error(e))),
                None => return Err(CloseReason::Normal),
            },
            Transport::WebSocket(ws) => read_websocket_message(ws).await?,
        };
        trace!("<< {}", msg.to_string().trim_end());
        Ok(msg)
    }

    /// Write one message.
    pub async fn send(&mut self, msg: Message) -> Result<(), ClientError> {
        trace!(">> {}", msg.to_string().trim_end());
        match self {
            Transport::Stream(framed) => framed.send(msg).await.map_err(protocol_error),
            Transport::WebSocket(ws) => {
                let line = IrcCodec::sanitize(msg.to_string())
                    .map_err(|e| ClientError::Decode(Arc::new(e)))?;
                let text = line.trim_end_matches(['\r', '\n']).to_owned();
                ws.send(WsMessage::Text(text)).await.map_err(ws_error)
            }
        }
    }

    /// Close the connection, ignoring errors.
    pub async fn close(&mut self) {
        let result = match self {
            Transport::Stream(framed) => SinkExt::<Message>::close(framed)
                .await
                .map_err(protocol_error),
            Transport::WebSocket(ws) => WebSocketStream::close(&mut **ws, None)
                .await
                .map_err(ws_error),
        };
        if let Err(e) = result {
            debug!("error while closing transport: {}", e);
        }
    }
}

async fn read_websocket_message(ws: &mut WsStream) -> Result<Message, CloseReason> {
    loop {
        match ws.next().await {
            Some(Ok(WsMessage::Text(text))) => {
                return text.parse::<Message>().map_err(|e| CloseReason::Abnormal(protocol_error(e)));
            }
            Some(Ok(WsMessage::Binary(_))) => {
                return Err(CloseReason::Abnormal(ClientError::UnsupportedPayload));
            }
            Some(Ok(WsMessage::Close(Some(frame)))) if frame.code != CloseCode::Normal => {
                let code = u16::from(frame.code);
                return Err(CloseReason::Abnormal(ClientError::Transport(Arc::new(
                    io::Error::new(
                        io::ErrorKind::ConnectionAborted,
                        format!("WebSocket closed with code {}: {}", code, frame.reason),
                    ),
                ))));
            }
            Some(Ok(WsMessage::Close(_))) | None => return Err(CloseReason::Normal),
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(CloseReason::Abnormal(ws_error(e))),
        }
    }
}

fn protocol_error(err: ProtocolError) -> ClientError {
    match err {
        ProtocolError::Io(e) => ClientError::Transport(Arc::new(e)),
        other => ClientError::Decode(Arc::new(other)),
    }
}

fn ws_error(err: tokio_tungstenite::tungstenite::Error) -> ClientError {
    ClientError::Transport(Arc::new(io::Error::other(err)))
}

fn connect_error(err: io::Error) -> ClientError {
    ClientError::Connect(Arc::new(err))
}

fn enable_keepalive(stream: &TcpStream) -> io::Result<()> {
    use socket2::{SockRef, TcpKeepalive};

    let sock = SockRef::from(stream);
    let keepalive = TcpKeepalive::new()
        .with_time(Duration::from_secs(120))
        .with_interval(Duration::from_secs(30));
    sock.set_tcp_keepalive(&keepalive)
}

/// Something that can open a fresh [`Transport`] on demand.
///
/// Called once per connection attempt, including every reconnect.
pub trait Connector: Send + Sync + 'static {
    /// Open a new transport.
    fn connect(&self) -> BoxFuture<'static, Result<Transport, ClientError>>;
}

impl<F> Connector for F
where
    F: Fn() -> BoxFuture<'static, Result<Transport, ClientError>> + Send + Sync + 'static,
{
    fn connect(&self) -> BoxFuture<'static, Result<Transport, ClientError>> {
        self()
    }
}

/// URL schemes understood by [`UrlConnector`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scheme {
    /// Plain TCP, default port 6667.
    Irc,
    /// TLS, default port 6697.
    Ircs,
    /// Plain WebSocket.
    Ws,
    /// WebSocket over TLS.
    Wss,
}

impl Scheme {
    fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "irc" => Some(Scheme::Irc),
            "ircs" => Some(Scheme::Ircs),
            "ws" => Some(Scheme::Ws),
            "wss" => Some(Scheme::Wss),
            _ => None,
        }
    }

    fn default_port(self) -> u16 {
        match self {
            Scheme::Irc => 6667,
            Scheme::Ircs => 6697,
            Scheme::Ws => 80,
            Scheme::Wss => 443,
        }
    }
}

/// A parsed server URL.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoint {
    /// Transport to use.
    pub scheme: Scheme,
    /// Host name or address, without IPv6 brackets.
    pub host: String,
    /// Port, defaulted from the scheme.
    pub port: u16,
}

impl Endpoint {
    /// Parse `scheme://host[:port][/path]`.
    pub fn parse(url: &str) -> Result<Self, ClientError> {
        let invalid = || ClientError::InvalidUrl(url.to_owned());
        let (scheme, rest) = url.split_once("://").ok_or_else(invalid)?;
        let scheme = Scheme::parse(scheme).ok_or_else(invalid)?;
        let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();

        let (host, port) = if let Some(bracketed) = authority.strip_prefix('[') {
            let (host, after) = bracketed.split_once(']').ok_or_else(invalid)?;
            (host, after.strip_prefix(':'))
        } else {
            match authority.rsplit_once(':') {
                Some((host, port)) => (host, Some(port)),
                None => (authority, None),
            }
        };
        if host.is_empty() {
            return Err(invalid());
        }
        let port = match port {
            Some(p) => p.parse().map_err(|_| invalid())?,
            None => scheme.default_port(),
        };

        Ok(Endpoint {
            scheme,
            host: host.to_owned(),
            port,
        })
    }
}

/// Opens transports for a configured server URL.
#[derive(Clone, Debug)]
pub struct UrlConnector {
    url: String,
}

impl UrlConnector {
    /// Create a connector for `url`; it is validated on every attempt.
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

impl Connector for UrlConnector {
    fn connect(&self) -> BoxFuture<'static, Result<Transport, ClientError>> {
        let url = self.url.clone();
        Box::pin(async move { connect_url(&url).await })
    }
}

/// Open a transport to `url`.
pub async fn connect_url(url: &str) -> Result<Transport, ClientError> {
    let endpoint = Endpoint::parse(url)?;
    debug!(url, "opening transport");

    match endpoint.scheme {
        Scheme::Ws | Scheme::Wss => {
            let (ws, _response) = tokio_tungstenite::connect_async(url)
                .await
                .map_err(|e| connect_error(io::Error::new(io::ErrorKind::ConnectionRefused, e)))?;
            Ok(Transport::websocket(ws))
        }
        Scheme::Irc => {
            let tcp = TcpStream::connect((endpoint.host.as_str(), endpoint.port))
                .await
                .map_err(connect_error)?;
            Ok(Transport::tcp(tcp))
        }
        Scheme::Ircs => {
            let tcp = TcpStream::connect((endpoint.host.as_str(), endpoint.port))
                .await
                .map_err(connect_error)?;
            if let Err(e) = enable_keepalive(&tcp) {
                warn!("failed to enable TCP keepalive: {}", e);
            }
            let server_name = ServerName::try_from(endpoint.host.clone())
                .map_err(|_| ClientError::InvalidUrl(url.to_owned()))?;
            let connector = TlsConnector::from(Arc::new(default_tls_config()));
            let tls = connector
                .connect(server_name, tcp)
                .await
                .map_err(connect_error)?;
            debug!(host = %endpoint.host, "TLS handshake complete");
            Ok(Transport::from_stream(tls))
        }
    }
}

fn default_tls_config() -> TlsConfig {
    let roots = RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    TlsConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth()
}
