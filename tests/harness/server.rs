//! In-process WebSocket / Socket.IO echo server.
//!
//! Built on the crate's own frame codec in server role.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use wsload::transport::socketio::{self, Packet};
use wsload::transport::ws::handshake::compute_accept_key;
use wsload::transport::ws::{Frame, FrameReader, FrameWriter, Incoming, OpCode, Role};

const SOCKETIO_OPEN: &str =
    r#"0{"sid":"test","upgrades":[],"pingInterval":25000,"pingTimeout":20000,"maxPayload":1000000}"#;

/// Namespace the Socket.IO server refuses.
pub const FORBIDDEN_NAMESPACE: &str = "/forbidden";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerMode {
    /// Echo every data frame.
    WebSocket,
    /// Engine.IO handshake, ping after connect, echo `42` events.
    SocketIo,
}

#[derive(Debug, Clone, Copy)]
pub struct ServerOptions {
    pub mode: ServerMode,
    /// Drop each connection after this many inbound messages.
    pub disconnect_after: Option<usize>,
}

impl ServerOptions {
    pub fn new(mode: ServerMode) -> Self {
        Self {
            mode,
            disconnect_after: None,
        }
    }
}

#[derive(Debug, Default)]
struct ServerStats {
    connections: AtomicUsize,
    messages: AtomicUsize,
    pongs: AtomicUsize,
    closes: AtomicUsize,
}

pub struct TestServer {
    cancel: CancellationToken,
    task: JoinHandle<()>,
    stats: Arc<ServerStats>,
}

impl TestServer {
    pub async fn spawn(mode: ServerMode) -> (Self, SocketAddr) {
        Self::spawn_with(ServerOptions::new(mode)).await
    }

    pub async fn spawn_with(options: ServerOptions) -> (Self, SocketAddr) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let cancel = CancellationToken::new();
        let stats = Arc::new(ServerStats::default());

        let task = tokio::spawn({
            let cancel = cancel.clone();
            let stats = stats.clone();
            async move {
                let tracker = TaskTracker::new();
                loop {
                    tokio::select! {
                        () = cancel.cancelled() => break,
                        accepted = listener.accept() => {
                            let Ok((socket, _)) = accepted else { continue };
                            let cancel = cancel.clone();
                            let stats = stats.clone();
                            tracker.spawn(async move {
                                tokio::select! {
                                    () = cancel.cancelled() => {}
                                    () = serve(socket, options, stats) => {}
                                }
                            });
                        }
                    }
                }
                tracker.close();
                tracker.wait().await;
            }
        });

        (Self { cancel, task, stats }, addr)
    }

    /// Connections that completed the WebSocket handshake.
    pub fn connections(&self) -> usize {
        self.stats.connections.load(Ordering::SeqCst)
    }

    /// Data messages received.
    pub fn messages(&self) -> usize {
        self.stats.messages.load(Ordering::SeqCst)
    }

    /// Engine.IO pongs received.
    pub fn pongs(&self) -> usize {
        self.stats.pongs.load(Ordering::SeqCst)
    }

    /// Close frames received.
    pub fn closes(&self) -> usize {
        self.stats.closes.load(Ordering::SeqCst)
    }

    pub async fn shutdown(self) {
        self.cancel.cancel();
        let _ = self.task.await;
    }
}

async fn accept_upgrade(socket: &mut TcpStream) -> Option<BytesMut> {
    let mut buf = BytesMut::with_capacity(1024);
    let end = loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
        if socket.read_buf(&mut buf).await.ok()? == 0 {
            return None;
        }
    };
    let head = buf.split_to(end);
    let head = std::str::from_utf8(&head).ok()?;
    let key = head.lines().find_map(|line| {
        let (name, value) = line.split_once(':')?;
        name.trim()
            .eq_ignore_ascii_case("sec-websocket-key")
            .then(|| value.trim().to_string())
    })?;

    let response = format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Accept: {}\r\n\r\n",
        compute_accept_key(&key)
    );
    socket.write_all(response.as_bytes()).await.ok()?;
    Some(buf)
}

async fn serve(mut socket: TcpStream, options: ServerOptions, stats: Arc<ServerStats>) {
    let Some(leftover) = accept_upgrade(&mut socket).await else {
        return;
    };
    stats.connections.fetch_add(1, Ordering::SeqCst);

    let (rd, wr) = socket.into_split();
    let mut reader = FrameReader::new(rd, Role::Server, leftover, 1 << 20);
    let mut writer = FrameWriter::new(wr, Role::Server);

    if options.mode == ServerMode::SocketIo && writer.send_text(SOCKETIO_OPEN).await.is_err() {
        return;
    }

    let mut received = 0;
    let mut joined = String::from("/");
    while let Ok(message) = reader.next_message().await {
        let reply = match message {
            Incoming::Text(text) => match options.mode {
                ServerMode::WebSocket => {
                    received += 1;
                    stats.messages.fetch_add(1, Ordering::SeqCst);
                    vec![text]
                }
                ServerMode::SocketIo => match Packet::parse(&text) {
                    Ok(Packet::Connect { namespace }) if namespace == FORBIDDEN_NAMESPACE => {
                        vec![format!(
                            r#"44{namespace},{{"message":"Not authorized"}}"#
                        )]
                    }
                    Ok(Packet::Connect { namespace }) => {
                        let ack = socketio::encode_connect(&namespace);
                        joined = namespace;
                        vec![format!(r#"{ack}{{"sid":"s1"}}"#), "2".to_string()]
                    }
                    Ok(Packet::Pong) => {
                        stats.pongs.fetch_add(1, Ordering::SeqCst);
                        Vec::new()
                    }
                    Ok(Packet::Event { .. }) => {
                        received += 1;
                        stats.messages.fetch_add(1, Ordering::SeqCst);
                        vec![text]
                    }
                    _ => Vec::new(),
                },
            },
            Incoming::Binary(data) => {
                received += 1;
                stats.messages.fetch_add(1, Ordering::SeqCst);
                let _ = writer.write_frame(&Frame::new(OpCode::Binary, data)).await;
                Vec::new()
            }
            Incoming::Ping(payload) => {
                let _ = writer.write_frame(&Frame::new(OpCode::Pong, payload)).await;
                Vec::new()
            }
            Incoming::Pong => Vec::new(),
            Incoming::Close(_) => {
                stats.closes.fetch_add(1, Ordering::SeqCst);
                let _ = writer.send_close(1000, "").await;
                return;
            }
        };

        for text in reply {
            if writer.send_text(text).await.is_err() {
                return;
            }
        }

        if options.disconnect_after.is_some_and(|limit| received >= limit) {
            if options.mode == ServerMode::SocketIo {
                let _ = writer.send_text(socketio::encode_disconnect(&joined)).await;
            } else {
                let _ = writer.send_close(1001, "going away").await;
            }
            let _ = writer.shutdown().await;
            return;
        }
    }
}
