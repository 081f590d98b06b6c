//! Error types for the load-generation harness.
//!
//! Every failure a run can observe is one of these variants. Only
//! [`Error::Config`] is fatal; everything else is local to one agent and
//! ends up as a counter in the [`StatsRegistry`](crate::StatsRegistry).

use thiserror::Error;

/// Result type alias for harness operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while configuring or running a load test.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// Invalid or missing run parameter.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Target URL could not be parsed or uses an unsupported scheme.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// TCP connect or TLS setup failed.
    #[error("Connect failed: {0}")]
    Connect(String),

    /// Connect plus handshake did not finish within the configured timeout.
    #[error("Connect timed out after {0} ms")]
    ConnectTimeout(u64),

    /// WebSocket upgrade or Socket.IO namespace handshake rejected.
    #[error("Invalid handshake: {0}")]
    InvalidHandshake(String),

    /// Handshake response exceeded the header size cap.
    #[error("Handshake too large: {size} bytes (max: {max})")]
    HandshakeTooLarge {
        /// Bytes received so far.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// Outbound message could not be written.
    #[error("Send failed: {0}")]
    Send(String),

    /// Inbound message could not be processed.
    #[error("Receive failed: {0}")]
    Receive(String),

    /// Connection has been closed.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Frame or packet violated the wire protocol.
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// Frame size exceeds configured maximum.
    #[error("Frame too large: {size} bytes (max: {max})")]
    FrameTooLarge {
        /// Actual frame size.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// Invalid opcode value.
    #[error("Invalid opcode: {0:#x}")]
    InvalidOpcode(u8),

    /// TLS configuration or negotiation failure.
    #[error("TLS error: {0}")]
    Tls(String),

    /// I/O error occurred.
    #[error("I/O error: {0}")]
    Io(String),

    /// Payload could not be encoded or decoded as JSON.
    #[error("JSON error: {0}")]
    Json(String),

    /// Operation not valid in the current run phase.
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

/// Failure category used when counting and logging errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Fatal, detected before the run starts.
    Config,
    /// An agent could not establish its connection.
    Connect,
    /// An agent could not emit a message.
    Send,
    /// An inbound message could not be processed.
    Receive,
    /// The peer or the network closed the connection.
    Disconnect,
}

impl Error {
    /// Classify this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Error::Config(_) | Error::InvalidUrl(_) | Error::InvalidState(_) => ErrorKind::Config,
            Error::Connect(_)
            | Error::ConnectTimeout(_)
            | Error::InvalidHandshake(_)
            | Error::HandshakeTooLarge { .. }
            | Error::Tls(_) => ErrorKind::Connect,
            Error::Send(_) | Error::Json(_) => ErrorKind::Send,
            Error::Receive(_)
            | Error::ProtocolViolation(_)
            | Error::FrameTooLarge { .. }
            | Error::InvalidOpcode(_) => ErrorKind::Receive,
            Error::ConnectionClosed | Error::Io(_) => ErrorKind::Disconnect,
        }
    }

    /// Returns `true` if this error aborts the whole run.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self.kind(), ErrorKind::Config)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Error::InvalidUrl(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Json(err.to_string())
    }
}
