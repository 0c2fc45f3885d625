//! The byte stream under every transport: plain TCP or TLS, dialed from a
//! parsed server URL.

use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls;
use tokio_rustls::TlsConnector;
use url::Url;

use crate::config::Config;
use crate::errors::Error;

/// Minimum delay between two socket creations, to avoid flooding the server
/// with connections during the handshake/upgrade sequence.
const DIAL_GAP: Duration = Duration::from_millis(50);

static LAST_DIAL: Mutex<Option<Instant>> = Mutex::new(None);

/// Address material extracted from the caller's URL.
#[derive(Debug, Clone)]
pub struct ServerUrl {
    pub secure: bool,
    pub host: String,
    pub port: u16,
    /// Mount path of the Engine.IO endpoint, without trailing slash.
    pub path: String,
}

impl ServerUrl {
    pub fn parse(raw: &str) -> Result<Self, Error> {
        let url = Url::parse(raw).map_err(|e| Error::InvalidUrl(e.to_string()))?;
        let secure = match url.scheme() {
            "http" | "ws" => false,
            "https" | "wss" => true,
            s => return Err(Error::InvalidUrl(format!("unsupported scheme: {s}"))),
        };
        let host = url
            .host_str()
            .ok_or_else(|| Error::InvalidUrl("missing host".to_string()))?
            .to_string();
        let port = url.port().unwrap_or(if secure { 443 } else { 80 });
        let path = match url.path() {
            "" | "/" => "/socket.io".to_string(),
            p => p.trim_end_matches('/').to_string(),
        };
        Ok(Self {
            secure,
            host,
            port,
            path,
        })
    }

    /// `host:port`, for the `Host` header.
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// A bidirectional byte stream, TLS-transparent.
pub enum Stream {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl Stream {
    /// Dial the server, wrapping TLS when the URL calls for it. Dials closer
    /// than [`DIAL_GAP`] to the previous one are delayed.
    pub async fn connect(url: &ServerUrl, config: &Config) -> Result<Self, Error> {
        throttle().await;

        let tcp = TcpStream::connect((url.host.as_str(), url.port)).await?;
        tcp.set_nodelay(true)?;
        if !url.secure {
            return Ok(Stream::Plain(tcp));
        }

        let tls_config = match &config.tls {
            Some(tls) => tls.clone(),
            None => Arc::new(native_tls_config()?),
        };
        let domain = rustls::ServerName::try_from(url.host.as_str())
            .map_err(|_| Error::InvalidUrl(format!("invalid dns name: {}", url.host)))?;
        let stream = TlsConnector::from(tls_config).connect(domain, tcp).await?;
        Ok(Stream::Tls(Box::new(stream)))
    }
}

async fn throttle() {
    let delay = {
        let mut last = LAST_DIAL.lock().unwrap();
        let now = Instant::now();
        let delay = match *last {
            Some(prev) => (prev + DIAL_GAP).saturating_duration_since(now),
            None => Duration::ZERO,
        };
        *last = Some(now + delay);
        delay
    };
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

fn native_tls_config() -> Result<rustls::ClientConfig, Error> {
    let mut roots = rustls::RootCertStore::empty();
    for cert in rustls_native_certs::load_native_certs()? {
        // Certificates the store cannot represent are skipped, same as
        // browsers do with stale platform roots.
        let _ = roots.add(&rustls::Certificate(cert.0));
    }
    Ok(rustls::ClientConfig::builder()
        .with_safe_defaults()
        .with_root_certificates(roots)
        .with_no_client_auth())
}

impl AsyncRead for Stream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Stream::Plain(s) => Pin::new(s).poll_read(cx, buf),
            Stream::Tls(s) => Pin::new(s).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Stream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Stream::Plain(s) => Pin::new(s).poll_write(cx, buf),
            Stream::Tls(s) => Pin::new(s).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Stream::Plain(s) => Pin::new(s).poll_flush(cx),
            Stream::Tls(s) => Pin::new(s).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Stream::Plain(s) => Pin::new(s).poll_shutdown(cx),
            Stream::Tls(s) => Pin::new(s).poll_shutdown(cx),
        }
    }
}
