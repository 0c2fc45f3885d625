use std::sync::Arc;
use std::time::Duration;

use http::HeaderMap;
use tokio_rustls::rustls;

use crate::protocol::ProtocolVersion;
use crate::transport::TransportType;

/// Engine.IO client options.
///
/// Built with chained setters:
/// ```
/// # use std::time::Duration;
/// # use engineio_client::{Config, ProtocolVersion};
/// let config = Config::new(ProtocolVersion::V4)
///     .with_timeout(Duration::from_secs(5))
///     .with_persistent(false);
/// ```
#[derive(Clone)]
pub struct Config {
    /// Protocol revision spoken on the wire.
    pub version: ProtocolVersion,
    /// Transport requested by the caller. The handshake itself always runs
    /// over polling; this only records the caller's preference.
    pub transport: TransportType,
    /// Add `b64=1` to the polling query so v2/v3 servers encode binary
    /// packets as base64 text.
    pub use_b64: bool,
    /// Read timeout applied to every HTTP exchange and frame read.
    pub timeout: Duration,
    /// Pause applied after each user-initiated send, giving the server a
    /// beat to process before the next write lands.
    pub wait: Duration,
    /// Reuse the TCP stream across polling requests.
    pub persistent: bool,
    /// Extra headers added to every HTTP request, including the upgrade.
    pub headers: HeaderMap,
    /// `Origin` header value for the upgrade request. Defaults to `*`.
    pub origin: Option<String>,
    /// Upper bound in bytes for a single outgoing frame.
    pub max_payload: usize,
    /// TLS configuration for `https`/`wss` URLs. When absent, a client
    /// config backed by the platform root store is built on first use.
    pub tls: Option<Arc<rustls::ClientConfig>>,
}

impl Config {
    pub fn new(version: ProtocolVersion) -> Self {
        Self {
            version,
            ..Self::default()
        }
    }

    pub fn with_transport(mut self, transport: TransportType) -> Self {
        self.transport = transport;
        self
    }

    pub fn with_b64(mut self, use_b64: bool) -> Self {
        self.use_b64 = use_b64;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_wait(mut self, wait: Duration) -> Self {
        self.wait = wait;
        self
    }

    pub fn with_persistent(mut self, persistent: bool) -> Self {
        self.persistent = persistent;
        self
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    pub fn with_max_payload(mut self, max_payload: usize) -> Self {
        self.max_payload = max_payload;
        self
    }

    pub fn with_tls(mut self, tls: Arc<rustls::ClientConfig>) -> Self {
        self.tls = Some(tls);
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: ProtocolVersion::V4,
            transport: TransportType::Polling,
            use_b64: false,
            timeout: Duration::from_secs(30),
            wait: Duration::from_millis(50),
            persistent: true,
            headers: HeaderMap::new(),
            origin: None,
            max_payload: 100_000_000,
            tls: None,
        }
    }
}
