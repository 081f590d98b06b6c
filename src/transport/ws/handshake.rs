//! Client side of the WebSocket opening handshake (RFC 6455, section 4).

use std::collections::HashMap;

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use bytes::BytesMut;
use sha1::{Digest, Sha1};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::config::TransportConfig;
use crate::error::{Error, Result};
use crate::transport::ws::Endpoint;

/// The WebSocket GUID used in the Sec-WebSocket-Accept calculation.
pub const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

const HEADER_END: &[u8] = b"\r\n\r\n";

/// Generate a random, base64-encoded 16-byte `Sec-WebSocket-Key`.
///
/// # Errors
///
/// Returns [`Error::Connect`] if the OS random source is unavailable.
pub fn generate_key() -> Result<String> {
    let mut nonce = [0u8; 16];
    getrandom::getrandom(&mut nonce)
        .map_err(|e| Error::Connect(format!("random source unavailable: {e}")))?;
    Ok(BASE64.encode(nonce))
}

/// Computes the Sec-WebSocket-Accept value for a Sec-WebSocket-Key.
///
/// # Example
///
/// ```
/// use wsload::transport::ws::handshake::compute_accept_key;
///
/// let accept = compute_accept_key("dGhlIHNhbXBsZSBub25jZQ==");
/// assert_eq!(accept, "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
/// ```
pub fn compute_accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WS_GUID.as_bytes());
    BASE64.encode(hasher.finalize())
}

/// Build the HTTP/1.1 upgrade request for `endpoint`.
#[must_use]
pub fn build_request(endpoint: &Endpoint, key: &str) -> String {
    format!(
        "GET {} HTTP/1.1\r\n\
         Host: {}\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Key: {}\r\n\
         Sec-WebSocket-Version: 13\r\n\
         User-Agent: wsload/{}\r\n\
         \r\n",
        endpoint.resource(),
        endpoint.host_header(),
        key,
        env!("CARGO_PKG_VERSION"),
    )
}

/// Read the upgrade response head.
///
/// Returns the head (up to and including the blank line) and any bytes the
/// server sent after it, which belong to the first frames.
///
/// # Errors
///
/// - `Error::HandshakeTooLarge` if no blank line arrives within the size cap
/// - `Error::InvalidHandshake` if the server closes mid-response
/// - I/O errors from the underlying stream
pub async fn read_response<S>(stream: &mut S, config: &TransportConfig) -> Result<(Vec<u8>, BytesMut)>
where
    S: AsyncRead + Unpin,
{
    let mut buf = BytesMut::with_capacity(1024);
    loop {
        if let Some(pos) = find_header_end(&buf) {
            let head = buf.split_to(pos + HEADER_END.len()).to_vec();
            return Ok((head, buf));
        }
        config.check_handshake_size(buf.len())?;

        let n = stream.read_buf(&mut buf).await?;
        if n == 0 {
            return Err(Error::InvalidHandshake(
                "connection closed during handshake".into(),
            ));
        }
    }
}

fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(HEADER_END.len()).position(|w| w == HEADER_END)
}

/// Validate an upgrade response head against the key we sent.
///
/// # Errors
///
/// Returns [`Error::InvalidHandshake`] if:
/// - The data is not valid UTF-8 or the status line is malformed.
/// - The status is not `101`.
/// - `Upgrade` is not `websocket` or `Connection` lacks `upgrade`.
/// - `Sec-WebSocket-Accept` is missing or does not match `key`.
pub fn validate_response(head: &[u8], key: &str) -> Result<()> {
    let text = std::str::from_utf8(head)
        .map_err(|_| Error::InvalidHandshake("Invalid UTF-8".into()))?;
    let mut lines = text.split("\r\n");

    let status_line = lines
        .next()
        .ok_or_else(|| Error::InvalidHandshake("Empty response".into()))?;
    let mut parts = status_line.splitn(3, ' ');
    let version = parts.next().unwrap_or_default();
    let status = parts.next().unwrap_or_default();
    if !version.starts_with("HTTP/1.") {
        return Err(Error::InvalidHandshake(format!(
            "Invalid status line: {status_line}"
        )));
    }
    if status != "101" {
        return Err(Error::InvalidHandshake(format!(
            "Expected 101 Switching Protocols, got {}",
            status_line.trim_start_matches(version).trim()
        )));
    }

    let headers = parse_headers(lines);

    let upgrade = headers
        .get("upgrade")
        .ok_or_else(|| Error::InvalidHandshake("Missing Upgrade header".into()))?;
    if !upgrade.eq_ignore_ascii_case("websocket") {
        return Err(Error::InvalidHandshake(format!(
            "Invalid Upgrade header: {upgrade}"
        )));
    }

    let connection = headers
        .get("connection")
        .ok_or_else(|| Error::InvalidHandshake("Missing Connection header".into()))?;
    if !connection
        .split(',')
        .any(|token| token.trim().eq_ignore_ascii_case("upgrade"))
    {
        return Err(Error::InvalidHandshake(format!(
            "Invalid Connection header: {connection}"
        )));
    }

    let accept = headers
        .get("sec-websocket-accept")
        .ok_or_else(|| Error::InvalidHandshake("Missing Sec-WebSocket-Accept header".into()))?;
    if *accept != compute_accept_key(key) {
        return Err(Error::InvalidHandshake(
            "Sec-WebSocket-Accept does not match key".into(),
        ));
    }

    Ok(())
}

fn parse_headers<'a>(lines: impl Iterator<Item = &'a str>) -> HashMap<String, String> {
    lines
        .take_while(|line| !line.is_empty())
        .filter_map(|line| line.split_once(':'))
        .map(|(name, value)| (name.trim().to_ascii_lowercase(), value.trim().to_string()))
        .collect()
}
