//! Scripted in-memory transport.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use tokio::sync::mpsc;
use url::Url;
use wsload::{Emission, Error, Link, Result, Session, Transport, TransportEvent};

#[derive(Debug, Default)]
struct Counters {
    connects: AtomicUsize,
    sends: AtomicUsize,
    closes: AtomicUsize,
    per_index: Mutex<HashMap<usize, usize>>,
}

struct Peer {
    events: mpsc::Sender<TransportEvent>,
    open: Arc<AtomicBool>,
}

/// In-memory transport.
///
/// Connects instantly unless the index is listed as failing. Echo mode
/// answers every send with one inbound message.
#[derive(Default)]
pub struct MockTransport {
    failing: HashSet<usize>,
    echo: bool,
    hang_on_close: bool,
    counters: Arc<Counters>,
    peers: Mutex<HashMap<usize, Peer>>,
}

impl MockTransport {
    /// Always connects and echoes.
    pub fn echo() -> Self {
        Self {
            echo: true,
            ..Default::default()
        }
    }

    /// Always connects, never sends anything back.
    pub fn silent() -> Self {
        Self::default()
    }

    /// Refuse connections for `indices`.
    pub fn failing(mut self, indices: impl IntoIterator<Item = usize>) -> Self {
        self.failing.extend(indices);
        self
    }

    /// Make `close` never complete.
    pub fn hanging_close(mut self) -> Self {
        self.hang_on_close = true;
        self
    }

    pub fn connect_attempts(&self) -> usize {
        self.counters.connects.load(Ordering::SeqCst)
    }

    pub fn sends(&self) -> usize {
        self.counters.sends.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.counters.closes.load(Ordering::SeqCst)
    }

    /// Sends recorded for connection `index`.
    pub fn sends_for(&self, index: usize) -> usize {
        self.counters
            .per_index
            .lock()
            .unwrap()
            .get(&index)
            .copied()
            .unwrap_or(0)
    }

    /// Simulate the server dropping connection `index`.
    pub async fn disconnect(&self, index: usize, reason: &str) -> bool {
        let events = {
            let peers = self.peers.lock().unwrap();
            let Some(peer) = peers.get(&index) else {
                return false;
            };
            peer.open.store(false, Ordering::SeqCst);
            peer.events.clone()
        };
        events
            .send(TransportEvent::Disconnected(reason.to_string()))
            .await
            .is_ok()
    }

    /// Deliver an inbound event to connection `index`.
    pub async fn inject(&self, index: usize, event: TransportEvent) -> bool {
        let events = match self.peers.lock().unwrap().get(&index) {
            Some(peer) => peer.events.clone(),
            None => return false,
        };
        events.send(event).await.is_ok()
    }
}

impl Transport for MockTransport {
    type Link = MockLink;

    async fn connect(&self, _url: &Url, index: usize) -> Result<Session<MockLink>> {
        self.counters.connects.fetch_add(1, Ordering::SeqCst);
        if self.failing.contains(&index) {
            return Err(Error::Connect(format!("connection {index} refused")));
        }

        let (tx, rx) = mpsc::channel(1024);
        let open = Arc::new(AtomicBool::new(true));
        self.peers.lock().unwrap().insert(
            index,
            Peer {
                events: tx.clone(),
                open: open.clone(),
            },
        );

        let link = MockLink {
            index,
            open,
            echo: self.echo.then_some(tx),
            hang_on_close: self.hang_on_close,
            counters: self.counters.clone(),
        };
        Ok(Session::new(link, rx))
    }
}

pub struct MockLink {
    index: usize,
    open: Arc<AtomicBool>,
    echo: Option<mpsc::Sender<TransportEvent>>,
    hang_on_close: bool,
    counters: Arc<Counters>,
}

impl Link for MockLink {
    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn send(&mut self, message: &Emission) -> Result<()> {
        if !self.is_open() {
            return Err(Error::ConnectionClosed);
        }
        self.counters.sends.fetch_add(1, Ordering::SeqCst);
        *self
            .counters
            .per_index
            .lock()
            .unwrap()
            .entry(self.index)
            .or_default() += 1;
        if let Some(echo) = &self.echo {
            let body = serde_json::to_vec(message).unwrap();
            let _ = echo.try_send(TransportEvent::Message(body));
        }
        Ok(())
    }

    async fn close(&mut self) {
        if self.hang_on_close {
            std::future::pending::<()>().await;
        }
        if self.open.swap(false, Ordering::SeqCst) {
            self.counters.closes.fetch_add(1, Ordering::SeqCst);
        }
    }
}
