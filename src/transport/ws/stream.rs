//! Plain or TLS byte stream under a WebSocket connection.

use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;

use crate::error::{Error, Result};

#[cfg(feature = "tls-rustls")]
use std::sync::Arc;

/// A connected socket, optionally wrapped in TLS.
pub enum MaybeTlsStream {
    /// `ws://`
    Plain(TcpStream),
    /// `wss://`
    #[cfg(feature = "tls-rustls")]
    Tls(Box<tokio_rustls::client::TlsStream<TcpStream>>),
}

impl AsyncRead for MaybeTlsStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            MaybeTlsStream::Plain(s) => Pin::new(s).poll_read(cx, buf),
            #[cfg(feature = "tls-rustls")]
            MaybeTlsStream::Tls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for MaybeTlsStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        match self.get_mut() {
            MaybeTlsStream::Plain(s) => Pin::new(s).poll_write(cx, buf),
            #[cfg(feature = "tls-rustls")]
            MaybeTlsStream::Tls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            MaybeTlsStream::Plain(s) => Pin::new(s).poll_flush(cx),
            #[cfg(feature = "tls-rustls")]
            MaybeTlsStream::Tls(s) => Pin::new(s.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            MaybeTlsStream::Plain(s) => Pin::new(s).poll_shutdown(cx),
            #[cfg(feature = "tls-rustls")]
            MaybeTlsStream::Tls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
        }
    }
}

/// Builds client TLS sessions for `wss://` targets.
#[derive(Clone)]
pub struct TlsConnector {
    #[cfg(feature = "tls-rustls")]
    inner: tokio_rustls::TlsConnector,
}

impl TlsConnector {
    /// Connector trusting the bundled webpki root certificates.
    #[cfg(feature = "tls-rustls")]
    #[must_use]
    pub fn with_webpki_roots() -> Self {
        let root_store =
            rustls::RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let config = rustls::ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth();
        Self {
            inner: tokio_rustls::TlsConnector::from(Arc::new(config)),
        }
    }

    /// Connector without TLS support; `wss://` targets fail to connect.
    #[cfg(not(feature = "tls-rustls"))]
    #[must_use]
    pub fn with_webpki_roots() -> Self {
        Self {}
    }

    /// Wrap `tcp` for `secure` endpoints.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Tls`] for an invalid server name, a failed TLS
    /// handshake, or a `wss://` target when TLS support is not compiled in.
    #[cfg_attr(not(feature = "tls-rustls"), allow(unused_variables))]
    pub async fn wrap(&self, tcp: TcpStream, domain: &str, secure: bool) -> Result<MaybeTlsStream> {
        if !secure {
            return Ok(MaybeTlsStream::Plain(tcp));
        }

        #[cfg(feature = "tls-rustls")]
        {
            let server_name = rustls::pki_types::ServerName::try_from(domain.to_string())
                .map_err(|_| Error::Tls(format!("invalid DNS name: {domain}")))?;
            let stream = self
                .inner
                .connect(server_name, tcp)
                .await
                .map_err(|e| Error::Tls(e.to_string()))?;
            Ok(MaybeTlsStream::Tls(Box::new(stream)))
        }

        #[cfg(not(feature = "tls-rustls"))]
        {
            Err(Error::Tls(
                "wss:// requires building with the tls-rustls feature".into(),
            ))
        }
    }
}

impl std::fmt::Debug for TlsConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsConnector")
            .field("enabled", &cfg!(feature = "tls-rustls"))
            .finish()
    }
}
