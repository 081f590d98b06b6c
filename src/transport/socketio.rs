//! Socket.IO v4 packets carried in Engine.IO v4 text frames.
//!
//! Only the text subset a load generator needs: handshake, heartbeat,
//! namespace connect/disconnect and events. Binary attachments are reported
//! as [`Packet::Unsupported`].

use serde::Serialize;
use serde_json::Value;

use crate::error::{Error, Result};

/// Engine.IO endpoint path.
pub const ENGINE_PATH: &str = "/socket.io/";

/// Query selecting Engine.IO v4 over a WebSocket from the first request.
pub const ENGINE_QUERY: &str = "EIO=4&transport=websocket";

/// Engine.IO pong, sent in reply to every server ping.
pub const PONG: &str = "3";

/// Event name the harness emits and counts.
pub const MESSAGE_EVENT: &str = "message";

/// One decoded text packet.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    /// Engine.IO open (`0`) with the handshake JSON.
    Open(Value),
    /// Engine.IO close (`1`).
    Close,
    /// Engine.IO ping (`2`).
    Ping,
    /// Engine.IO pong (`3`).
    Pong,
    /// Engine.IO noop (`6`) or upgrade (`5`).
    Noop,
    /// Namespace connect acknowledgement (`40`).
    Connect {
        /// Namespace.
        namespace: String,
    },
    /// Namespace disconnect (`41`).
    Disconnect {
        /// Namespace.
        namespace: String,
    },
    /// Event (`42`) or acknowledgement (`43`).
    Event {
        /// Namespace.
        namespace: String,
        /// First array element.
        name: String,
        /// Remaining array elements.
        args: Vec<Value>,
    },
    /// Namespace connect refused (`44`).
    ConnectError {
        /// Server-provided reason.
        message: String,
    },
    /// Binary events and acks.
    Unsupported(String),
}

impl Packet {
    /// Decode a text frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ProtocolViolation`] for unknown packet types or
    /// malformed JSON.
    pub fn parse(text: &str) -> Result<Self> {
        let mut chars = text.chars();
        let engine_type = chars
            .next()
            .ok_or_else(|| Error::ProtocolViolation("empty Engine.IO packet".into()))?;
        let rest = chars.as_str();

        match engine_type {
            '0' => Ok(Packet::Open(parse_json(rest)?)),
            '1' => Ok(Packet::Close),
            '2' => Ok(Packet::Ping),
            '3' => Ok(Packet::Pong),
            '4' => parse_socket_packet(rest),
            '5' | '6' => Ok(Packet::Noop),
            other => Err(Error::ProtocolViolation(format!(
                "unknown Engine.IO packet type '{other}'"
            ))),
        }
    }
}

fn parse_socket_packet(text: &str) -> Result<Packet> {
    let mut chars = text.chars();
    let socket_type = chars
        .next()
        .ok_or_else(|| Error::ProtocolViolation("empty Socket.IO packet".into()))?;
    let (namespace, body) = split_namespace(chars.as_str());
    // Ack ids precede the JSON body.
    let body = body.trim_start_matches(|c: char| c.is_ascii_digit());

    match socket_type {
        '0' => Ok(Packet::Connect { namespace }),
        '1' => Ok(Packet::Disconnect { namespace }),
        '2' | '3' => {
            let mut items = match parse_json(body)? {
                Value::Array(items) if !items.is_empty() => items,
                other => {
                    return Err(Error::ProtocolViolation(format!(
                        "event payload must be a non-empty array, got {other}"
                    )));
                }
            };
            let name = match items.remove(0) {
                Value::String(name) => name,
                other if socket_type == '3' => other.to_string(),
                other => {
                    return Err(Error::ProtocolViolation(format!(
                        "event name must be a string, got {other}"
                    )));
                }
            };
            Ok(Packet::Event {
                namespace,
                name,
                args: items,
            })
        }
        '4' => {
            let message = match parse_json(body) {
                Ok(Value::Object(map)) => map
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("connection refused")
                    .to_string(),
                Ok(Value::String(message)) => message,
                _ => "connection refused".to_string(),
            };
            Ok(Packet::ConnectError { message })
        }
        '5' | '6' => Ok(Packet::Unsupported(text.to_string())),
        other => Err(Error::ProtocolViolation(format!(
            "unknown Socket.IO packet type '{other}'"
        ))),
    }
}

fn split_namespace(text: &str) -> (String, &str) {
    if text.starts_with('/') {
        match text.split_once(',') {
            Some((ns, rest)) => (ns.to_string(), rest),
            None => (text.to_string(), ""),
        }
    } else {
        ("/".to_string(), text)
    }
}

fn parse_json(text: &str) -> Result<Value> {
    if text.is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(text).map_err(|e| Error::ProtocolViolation(format!("bad packet JSON: {e}")))
}

fn namespace_prefix(namespace: &str) -> String {
    if namespace == "/" {
        String::new()
    } else {
        format!("{namespace},")
    }
}

/// Encode a namespace connect request (`40`).
#[must_use]
pub fn encode_connect(namespace: &str) -> String {
    format!("40{}", namespace_prefix(namespace))
}

/// Encode a namespace disconnect (`41`).
#[must_use]
pub fn encode_disconnect(namespace: &str) -> String {
    format!("41{}", namespace_prefix(namespace))
}

/// Encode an event (`42`) carrying a single argument.
///
/// # Errors
///
/// Returns [`Error::Json`] if `arg` cannot be serialized.
pub fn encode_event<T: Serialize>(namespace: &str, event: &str, arg: &T) -> Result<String> {
    let body = serde_json::to_string(&(event, arg))?;
    Ok(format!("42{}{}", namespace_prefix(namespace), body))
}
