//! WebSocket client transport.
//!
//! Each connection is split after the handshake: the agent's [`WsLink`]
//! writes, and a reader task turns inbound frames into
//! [`TransportEvent`]s. Both halves share the writer behind a mutex so the
//! reader can answer pings without involving the agent.
//!
//! ## Example
//!
//! ```rust,ignore
//! use wsload::transport::{Transport, WsTransport};
//! use wsload::TransportConfig;
//!
//! let transport = WsTransport::new(TransportConfig::default());
//! let url = url::Url::parse("http://localhost:3030")?;
//! let mut session = transport.connect(&url, 0).await?;
//! session.link.send(&wsload::transport::Emission::new(0)).await?;
//! ```

pub mod codec;
pub mod endpoint;
pub mod frame;
pub mod handshake;
pub mod stream;

pub use codec::{FrameReader, FrameWriter, Incoming, Role};
pub use endpoint::Endpoint;
pub use frame::{Frame, OpCode};
pub use stream::{MaybeTlsStream, TlsConnector};

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::io::{AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, mpsc};
use tokio::task::AbortHandle;
use tracing::{debug, trace};
use url::Url;

use crate::config::TransportConfig;
use crate::error::{Error, Result};
use crate::transport::socketio::{self, Packet};
use crate::transport::{Emission, Link, Session, Transport, TransportEvent};

/// Upper bound on the close sequence of one link.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

type Reader = FrameReader<ReadHalf<MaybeTlsStream>>;
type SharedWriter = Arc<Mutex<FrameWriter<WriteHalf<MaybeTlsStream>>>>;

/// WebSocket (optionally Socket.IO) client transport.
#[derive(Debug, Clone)]
pub struct WsTransport {
    config: TransportConfig,
    tls: TlsConnector,
}

impl WsTransport {
    /// Create a transport with the given settings.
    #[must_use]
    pub fn new(config: TransportConfig) -> Self {
        Self {
            config,
            tls: TlsConnector::with_webpki_roots(),
        }
    }

    /// Transport settings.
    #[must_use]
    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    async fn open(&self, endpoint: &Endpoint) -> Result<(Reader, SharedWriter)> {
        let (host, port) = endpoint.socket_addr();
        let tcp = TcpStream::connect((host.as_str(), port))
            .await
            .map_err(|e| Error::Connect(format!("{host}:{port}: {e}")))?;
        let _ = tcp.set_nodelay(true);
        let mut stream = self.tls.wrap(tcp, &host, endpoint.secure).await?;

        let key = handshake::generate_key()?;
        stream
            .write_all(handshake::build_request(endpoint, &key).as_bytes())
            .await?;
        let (head, leftover) = handshake::read_response(&mut stream, &self.config).await?;
        handshake::validate_response(&head, &key)?;

        let (rd, wr) = tokio::io::split(stream);
        let reader = FrameReader::new(rd, Role::Client, leftover, self.config.max_frame_size);
        let writer = Arc::new(Mutex::new(FrameWriter::new(wr, Role::Client)));
        Ok((reader, writer))
    }
}

impl Default for WsTransport {
    fn default() -> Self {
        Self::new(TransportConfig::default())
    }
}

impl Transport for WsTransport {
    type Link = WsLink;

    async fn connect(&self, url: &Url, index: usize) -> Result<Session<WsLink>> {
        let endpoint = Endpoint::from_url(url, self.config.protocol)?;
        let limit = self.config.connect_timeout;

        let (mut reader, writer) = tokio::time::timeout(limit, async {
            let (mut reader, writer) = self.open(&endpoint).await?;
            if let Some(namespace) = &endpoint.namespace {
                join_namespace(&mut reader, &writer, namespace).await?;
            }
            Ok::<_, Error>((reader, writer))
        })
        .await
        .map_err(|_| Error::ConnectTimeout(limit.as_millis() as u64))??;

        trace!(index, host = %endpoint.host, "connection ready");

        let (events_tx, events_rx) = mpsc::channel(self.config.event_buffer);
        let open = Arc::new(AtomicBool::new(true));
        let namespace = endpoint.namespace.clone();
        let task = tokio::spawn({
            let writer = writer.clone();
            let open = open.clone();
            async move {
                let reason = read_loop(&mut reader, &writer, &events_tx, namespace.as_deref()).await;
                open.store(false, Ordering::Release);
                debug!(index, %reason, "reader finished");
                let _ = events_tx.send(TransportEvent::Disconnected(reason)).await;
            }
        });

        let link = WsLink {
            writer,
            open,
            namespace: endpoint.namespace,
            reader: task.abort_handle(),
        };
        Ok(Session::new(link, events_rx))
    }
}

/// Complete the Socket.IO namespace handshake on a fresh WebSocket.
async fn join_namespace(reader: &mut Reader, writer: &SharedWriter, namespace: &str) -> Result<()> {
    loop {
        match reader.next_message().await? {
            Incoming::Text(text) => match Packet::parse(&text)? {
                Packet::Open(handshake) => {
                    trace!(sid = %handshake["sid"], "engine.io open");
                    writer
                        .lock()
                        .await
                        .send_text(socketio::encode_connect(namespace))
                        .await?;
                }
                Packet::Connect { namespace: ns } if ns == namespace => return Ok(()),
                Packet::Ping => writer.lock().await.send_text(socketio::PONG).await?,
                Packet::ConnectError { message } => {
                    return Err(Error::InvalidHandshake(format!(
                        "namespace {namespace} refused: {message}"
                    )));
                }
                Packet::Close => {
                    return Err(Error::InvalidHandshake(
                        "server closed during Socket.IO handshake".into(),
                    ));
                }
                _ => {}
            },
            Incoming::Ping(payload) => {
                writer
                    .lock()
                    .await
                    .write_frame(&Frame::new(OpCode::Pong, payload))
                    .await?;
            }
            Incoming::Close(_) => {
                return Err(Error::InvalidHandshake(
                    "server closed during Socket.IO handshake".into(),
                ));
            }
            Incoming::Binary(_) | Incoming::Pong => {}
        }
    }
}

enum Step {
    Emit(TransportEvent),
    Ignore,
    Close(String),
}

/// Pump inbound messages into `events` until the connection ends.
///
/// Returns the disconnect reason.
async fn read_loop(
    reader: &mut Reader,
    writer: &SharedWriter,
    events: &mpsc::Sender<TransportEvent>,
    namespace: Option<&str>,
) -> String {
    loop {
        let step = match reader.next_message().await {
            Ok(Incoming::Text(text)) => match namespace {
                Some(ns) => on_packet(&text, ns, writer).await,
                None => Step::Emit(TransportEvent::Message(text.into_bytes())),
            },
            Ok(Incoming::Binary(data)) => match namespace {
                Some(_) => Step::Ignore,
                None => Step::Emit(TransportEvent::Message(data.to_vec())),
            },
            Ok(Incoming::Ping(payload)) => {
                let pong = Frame::new(OpCode::Pong, payload);
                match writer.lock().await.write_frame(&pong).await {
                    Ok(()) => Step::Ignore,
                    Err(e) => Step::Close(format!("transport error: {e}")),
                }
            }
            Ok(Incoming::Pong) => Step::Ignore,
            Ok(Incoming::Close(close)) => {
                let (code, reason) = close.unwrap_or((1005, String::new()));
                let _ = writer.lock().await.send_close(code_for_reply(code), "").await;
                if reason.is_empty() {
                    Step::Close(format!("transport close ({code})"))
                } else {
                    Step::Close(format!("transport close ({code} {reason})"))
                }
            }
            Err(Error::ConnectionClosed) => Step::Close("transport close".into()),
            Err(e @ Error::Receive(_)) => Step::Emit(TransportEvent::Error(e.to_string())),
            Err(e) => Step::Close(format!("transport error: {e}")),
        };

        match step {
            Step::Emit(event) => {
                if events.send(event).await.is_err() {
                    return "io client disconnect".into();
                }
            }
            Step::Ignore => {}
            Step::Close(reason) => return reason,
        }
    }
}

async fn on_packet(text: &str, namespace: &str, writer: &SharedWriter) -> Step {
    match Packet::parse(text) {
        Ok(Packet::Ping) => match writer.lock().await.send_text(socketio::PONG).await {
            Ok(()) => Step::Ignore,
            Err(e) => Step::Close(format!("transport error: {e}")),
        },
        Ok(Packet::Event {
            namespace: ns,
            name,
            ..
        }) if ns == namespace && name == socketio::MESSAGE_EVENT => {
            Step::Emit(TransportEvent::Message(text.as_bytes().to_vec()))
        }
        Ok(Packet::Disconnect { namespace: ns }) if ns == namespace => {
            Step::Close("io server disconnect".into())
        }
        Ok(Packet::Close) => Step::Close("transport close".into()),
        Ok(_) => Step::Ignore,
        Err(e) => Step::Emit(TransportEvent::Error(e.to_string())),
    }
}

/// Status code to echo in our close reply.
fn code_for_reply(code: u16) -> u16 {
    match code {
        1005 | 1006 | 1015 => 1000,
        other => other,
    }
}

/// Outbound half of a [`WsTransport`] connection.
pub struct WsLink {
    writer: SharedWriter,
    open: Arc<AtomicBool>,
    namespace: Option<String>,
    reader: AbortHandle,
}

impl Link for WsLink {
    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    async fn send(&mut self, message: &Emission) -> Result<()> {
        if !self.is_open() {
            return Err(Error::ConnectionClosed);
        }
        let text = match &self.namespace {
            Some(ns) => socketio::encode_event(ns, socketio::MESSAGE_EVENT, message)?,
            None => serde_json::to_string(message)?,
        };
        self.writer
            .lock()
            .await
            .send_text(text)
            .await
            .map_err(|e| Error::Send(e.to_string()))
    }

    async fn close(&mut self) {
        if !self.open.swap(false, Ordering::AcqRel) {
            return;
        }
        let writer = self.writer.clone();
        let namespace = self.namespace.clone();
        let _ = tokio::time::timeout(CLOSE_TIMEOUT, async move {
            let mut writer = writer.lock().await;
            if let Some(ns) = namespace {
                let _ = writer.send_text(socketio::encode_disconnect(&ns)).await;
            }
            let _ = writer.send_close(1000, "").await;
            let _ = writer.shutdown().await;
        })
        .await;
    }
}

impl Drop for WsLink {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

impl std::fmt::Debug for WsLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsLink")
            .field("open", &self.is_open())
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}
