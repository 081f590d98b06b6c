//! Transport boundary consumed by connection agents.
//!
//! A [`Transport`] opens one connection per agent and hands back a
//! [`Session`]: a [`Link`] for outbound traffic and a channel of
//! [`TransportEvent`]s for everything the peer does. The agent never sees
//! frames or packets; those stay behind this boundary.
//!
//! The built-in implementation is [`ws::WsTransport`], a WebSocket client that
//! optionally speaks Socket.IO on top.

pub mod socketio;
pub mod ws;

use std::future::Future;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tokio::sync::mpsc;
use url::Url;

use crate::error::Result;

pub use ws::WsTransport;

/// Something that can open connections to a target URL.
pub trait Transport: Send + Sync + 'static {
    /// Outbound half of an open connection.
    type Link: Link;

    /// Open a connection for agent `index`.
    ///
    /// Resolves once the connection is ready to carry messages; the returned
    /// session is the "connected" notification.
    fn connect(
        &self,
        url: &Url,
        index: usize,
    ) -> impl Future<Output = Result<Session<Self::Link>>> + Send;
}

/// Outbound half of an open connection.
pub trait Link: Send + 'static {
    /// Returns `true` while messages can be sent.
    fn is_open(&self) -> bool;

    /// Send one emission.
    fn send(&mut self, message: &Emission) -> impl Future<Output = Result<()>> + Send;

    /// Close the connection. Calling it more than once is a no-op.
    fn close(&mut self) -> impl Future<Output = ()> + Send;
}

/// An open connection.
pub struct Session<L> {
    /// Outbound half.
    pub link: L,
    /// Inbound events, closed when the connection is gone.
    pub events: mpsc::Receiver<TransportEvent>,
}

impl<L> Session<L> {
    /// Pair a link with its event channel.
    pub fn new(link: L, events: mpsc::Receiver<TransportEvent>) -> Self {
        Self { link, events }
    }
}

impl<L> std::fmt::Debug for Session<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session").finish_non_exhaustive()
    }
}

/// Something the peer did on an open connection.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum TransportEvent {
    /// An application message arrived.
    Message(Vec<u8>),
    /// The connection was closed by the peer or the network.
    Disconnected(String),
    /// An inbound message could not be processed.
    Error(String),
}

/// Payload emitted on every tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Emission {
    /// Human-readable body naming the connection.
    pub data: String,
    /// Milliseconds since the Unix epoch at creation.
    pub timestamp: u64,
}

impl Emission {
    /// Build the emission for connection `index`, stamped now.
    #[must_use]
    pub fn new(index: usize) -> Self {
        let timestamp = unix_millis();
        Self {
            data: format!("Message from connection {index} - {timestamp}"),
            timestamp,
        }
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
