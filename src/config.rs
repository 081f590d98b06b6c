//! Run and transport configuration.

use std::time::Duration;

use clap::ValueEnum;
use url::Url;

use crate::error::{Error, Result};

/// Default emission rate per connection (messages per second).
pub const DEFAULT_RATE: u32 = 1;

/// Wire protocol spoken on top of the WebSocket connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, ValueEnum)]
pub enum Protocol {
    /// Socket.IO v4 (Engine.IO v4 packets over WebSocket).
    #[default]
    #[value(name = "socketio")]
    SocketIo,
    /// Plain WebSocket text frames.
    #[value(name = "websocket")]
    WebSocket,
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Protocol::SocketIo => write!(f, "socketio"),
            Protocol::WebSocket => write!(f, "websocket"),
        }
    }
}

/// Validated parameters of one load test run.
///
/// The only way to obtain a `RunConfig` is [`RunConfig::new`], which rejects
/// zero counts, so an invalid configuration never reaches the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    url: Url,
    connections: usize,
    duration: Duration,
    rate: u32,
}

impl RunConfig {
    /// Validate and build a run configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `connections`, `duration_secs` or `rate`
    /// is zero, and [`Error::InvalidUrl`] if `url` does not parse or uses a
    /// scheme other than `ws`, `wss`, `http` or `https`.
    pub fn new(url: &str, connections: usize, duration_secs: u64, rate: u32) -> Result<Self> {
        if url.trim().is_empty() {
            return Err(Error::Config("server URL is required".into()));
        }
        let url = Url::parse(url.trim())?;
        if !matches!(url.scheme(), "ws" | "wss" | "http" | "https") {
            return Err(Error::InvalidUrl(format!(
                "unsupported scheme '{}' (expected ws, wss, http or https)",
                url.scheme()
            )));
        }
        if url.host_str().is_none() {
            return Err(Error::InvalidUrl(format!("missing host in '{url}'")));
        }
        if connections == 0 {
            return Err(Error::Config(
                "number of connections must be greater than 0".into(),
            ));
        }
        if duration_secs == 0 {
            return Err(Error::Config("duration must be greater than 0".into()));
        }
        if rate == 0 {
            return Err(Error::Config("rate must be greater than 0".into()));
        }

        Ok(Self {
            url,
            connections,
            duration: Duration::from_secs(duration_secs),
            rate,
        })
    }

    /// Target endpoint.
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Number of concurrent connections to open.
    #[must_use]
    pub fn connections(&self) -> usize {
        self.connections
    }

    /// Total run duration.
    #[must_use]
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Messages per second per connection.
    #[must_use]
    pub fn rate(&self) -> u32 {
        self.rate
    }

    /// Interval between two emissions of the same connection.
    #[must_use]
    pub fn emit_interval(&self) -> Duration {
        Duration::from_secs(1) / self.rate
    }
}

/// Transport-level settings for the built-in WebSocket client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    /// Protocol spoken on the socket.
    ///
    /// Default: [`Protocol::SocketIo`]
    pub protocol: Protocol,

    /// Limit for TCP connect, TLS and both handshakes together.
    ///
    /// Default: 5 seconds
    pub connect_timeout: Duration,

    /// Maximum size of a single inbound frame or reassembled message.
    ///
    /// Default: 16 MB (16 * 1024 * 1024)
    pub max_frame_size: usize,

    /// Maximum size of the HTTP upgrade response.
    ///
    /// Default: 8 KB (8192)
    pub max_handshake_size: usize,

    /// Capacity of each connection's event channel.
    ///
    /// Default: 256
    pub event_buffer: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            protocol: Protocol::default(),
            connect_timeout: Duration::from_secs(5),
            max_frame_size: 16 * 1024 * 1024, // 16 MB
            max_handshake_size: 8192,
            event_buffer: 256,
        }
    }
}

impl TransportConfig {
    /// Set the protocol.
    #[must_use]
    pub fn with_protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = protocol;
        self
    }

    /// Set the connect timeout.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the maximum inbound frame size.
    #[must_use]
    pub fn with_max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = size;
        self
    }

    /// Validate that a handshake response size is within limits.
    ///
    /// # Errors
    ///
    /// Returns [`Error::HandshakeTooLarge`] if `size` exceeds the configured maximum.
    pub const fn check_handshake_size(&self, size: usize) -> Result<()> {
        if size > self.max_handshake_size {
            Err(Error::HandshakeTooLarge {
                size,
                max: self.max_handshake_size,
            })
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_config_valid() {
        let config = RunConfig::new("http://localhost:3030", 500, 30, 2).unwrap();
        assert_eq!(config.connections(), 500);
        assert_eq!(config.duration(), Duration::from_secs(30));
        assert_eq!(config.rate(), 2);
        assert_eq!(config.url().host_str(), Some("localhost"));
    }

    #[test]
    fn test_run_config_rejects_zero_connections() {
        let err = RunConfig::new("ws://localhost:9001", 0, 10, 1).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_run_config_rejects_zero_duration_and_rate() {
        assert!(matches!(
            RunConfig::new("ws://localhost:9001", 1, 0, 1),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            RunConfig::new("ws://localhost:9001", 1, 1, 0),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_run_config_rejects_bad_urls() {
        assert!(matches!(RunConfig::new("", 1, 1, 1), Err(Error::Config(_))));
        assert!(matches!(
            RunConfig::new("localhost:3030", 1, 1, 1),
            Err(Error::InvalidUrl(_))
        ));
        assert!(matches!(
            RunConfig::new("ftp://example.com", 1, 1, 1),
            Err(Error::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_emit_interval() {
        let config = RunConfig::new("ws://localhost", 1, 1, 5).unwrap();
        assert_eq!(config.emit_interval(), Duration::from_millis(200));
        let config = RunConfig::new("ws://localhost", 1, 1, 1).unwrap();
        assert_eq!(config.emit_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_transport_config_default() {
        let config = TransportConfig::default();
        assert_eq!(config.protocol, Protocol::SocketIo);
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert_eq!(config.max_frame_size, 16 * 1024 * 1024);
        assert_eq!(config.max_handshake_size, 8192);
    }

    #[test]
    fn test_transport_config_checks() {
        let config = TransportConfig::default()
            .with_max_frame_size(100)
            .with_protocol(Protocol::WebSocket);
        assert_eq!(config.max_frame_size, 100);
        assert_eq!(config.protocol, Protocol::WebSocket);
        assert!(config.check_handshake_size(8192).is_ok());
        assert!(matches!(
            config.check_handshake_size(8193),
            Err(Error::HandshakeTooLarge { size: 8193, max: 8192 })
        ));
    }

    #[test]
    fn test_protocol_display() {
        assert_eq!(Protocol::SocketIo.to_string(), "socketio");
        assert_eq!(Protocol::WebSocket.to_string(), "websocket");
    }
}
