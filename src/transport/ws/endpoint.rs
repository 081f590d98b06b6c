//! Resolve a target URL into what the socket and the handshake need.

use url::Url;

use crate::config::Protocol;
use crate::error::{Error, Result};
use crate::transport::socketio;

/// Where and how to open one WebSocket connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// `wss` / `https`.
    pub secure: bool,
    /// Host name or address.
    pub host: String,
    /// TCP port.
    pub port: u16,
    /// Request target (path plus query).
    pub path: String,
    /// Socket.IO namespace; `None` for plain WebSocket.
    pub namespace: Option<String>,
}

impl Endpoint {
    /// Resolve `url` for `protocol`.
    ///
    /// For Socket.IO the URL path names the namespace and the request goes to
    /// the Engine.IO endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUrl`] for unsupported schemes or a missing host.
    pub fn from_url(url: &Url, protocol: Protocol) -> Result<Self> {
        let secure = match url.scheme() {
            "ws" | "http" => false,
            "wss" | "https" => true,
            other => {
                return Err(Error::InvalidUrl(format!("unsupported scheme '{other}'")));
            }
        };
        let host = url
            .host_str()
            .ok_or_else(|| Error::InvalidUrl(format!("missing host in '{url}'")))?
            .to_string();
        let port = url
            .port_or_known_default()
            .unwrap_or(if secure { 443 } else { 80 });

        let (path, namespace) = match protocol {
            Protocol::WebSocket => {
                let mut path = url.path().to_string();
                if let Some(query) = url.query() {
                    path.push('?');
                    path.push_str(query);
                }
                (path, None)
            }
            Protocol::SocketIo => {
                let mut path = format!("{}?{}", socketio::ENGINE_PATH, socketio::ENGINE_QUERY);
                if let Some(query) = url.query() {
                    path.push('&');
                    path.push_str(query);
                }
                let namespace = match url.path() {
                    "" | "/" => "/".to_string(),
                    ns => ns.to_string(),
                };
                (path, Some(namespace))
            }
        };

        Ok(Self {
            secure,
            host,
            port,
            path,
            namespace,
        })
    }

    /// Request target for the upgrade request line.
    #[must_use]
    pub fn resource(&self) -> &str {
        if self.path.is_empty() { "/" } else { &self.path }
    }

    /// Value of the `Host` header.
    #[must_use]
    pub fn host_header(&self) -> String {
        let default_port = if self.secure { 443 } else { 80 };
        let host = if self.host.contains(':') {
            format!("[{}]", self.host.trim_matches(|c| c == '[' || c == ']'))
        } else {
            self.host.clone()
        };
        if self.port == default_port {
            host
        } else {
            format!("{}:{}", host, self.port)
        }
    }

    /// Address to dial.
    #[must_use]
    pub fn socket_addr(&self) -> (String, u16) {
        let host = self.host.trim_matches(|c| c == '[' || c == ']').to_string();
        (host, self.port)
    }
}
