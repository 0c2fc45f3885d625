//! Engine.IO connection state machine, client side.
//!
//! Sequencing for one connection: polling handshake, then (for v4, driven by
//! the caller) the namespace connect on the same polling endpoint, then the
//! websocket upgrade.
//!
//! ```text
//! CLIENT                                                 SERVER
//!│                                                      │
//!│   GET /engine.io/?EIO=4&transport=polling&t=...      │
//!│ ───────────────────────────────────────────────────► │
//!│  ◄─────────────────────────────────────────────────┘ │
//!│        0{"sid":...,"upgrades":["websocket"],...}     │
//!│                                                      │
//!│   GET /engine.io/?EIO=4&transport=websocket&sid=...  │
//!│ ───────────────────────────────────────────────────► │
//!│  ◄─────────────────────────────────────────────────┘ │
//!│            HTTP 101 (WebSocket handshake)            │
//!│                                                      │
//!│            -----  WebSocket frames -----             │
//!│  ─────────────────────────────────────────────────►  │
//!│                         5                            │ (upgrade packet)
//!│                                                      │
//! ```
//!
//! There is no background task: the heartbeat is a clock check in
//! [`Engine::keep_alive`], run around every user-initiated send and at the
//! end of every drain cycle.

use std::time::Instant;

use base64::engine::general_purpose::STANDARD as b64;
use base64::Engine as _;
use http::header::SEC_WEBSOCKET_ACCEPT;
use http::{Method, StatusCode};
use sha1::{Digest, Sha1};

use crate::config::Config;
use crate::errors::Error;
use crate::packet::Packet;
use crate::protocol::ProtocolVersion;
use crate::request::{self, Request};
use crate::session::Session;
use crate::stream::{ServerUrl, Stream};
use crate::transport::polling::Polling;
use crate::ws::{Message, OpCode, WsSocket};
use crate::yeast::yeast;

const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// One Engine.IO connection.
///
/// Owns the current byte stream, the [`Session`] negotiated by the
/// handshake and the polling cookie jar. States are implicit: no session is
/// `DISCONNECTED`, a session without a websocket is `HANDSHAKEN`, both make
/// `CONNECTED`. A closed engine is terminal for its session; reconnecting
/// starts a fresh handshake.
pub struct Engine {
    config: Config,
    url: ServerUrl,
    polling: Polling,
    session: Option<Session>,
    ws: Option<WsSocket<Stream>>,
}

impl Engine {
    pub fn new(url: &str, config: Config) -> Result<Self, Error> {
        Ok(Self {
            config,
            url: ServerUrl::parse(url)?,
            polling: Polling::new(),
            session: None,
            ws: None,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn protocol(&self) -> ProtocolVersion {
        self.config.version
    }

    /// The negotiated session, if the handshake has run.
    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Whether the websocket transport is up.
    pub fn is_connected(&self) -> bool {
        self.ws.is_some()
    }

    /// Run the polling handshake. Idempotent once a session exists.
    ///
    /// Fails with [`Error::UnsupportedTransport`] when the server does not
    /// offer a websocket upgrade, and [`Error::ServerConnectionFailure`] on
    /// any other non-conforming answer.
    pub async fn handshake(&mut self) -> Result<(), Error> {
        if self.session.is_some() {
            return Ok(());
        }

        let packets = self.polling.open(&self.url, &self.config).await?;
        let open = match packets.into_iter().next() {
            Some(Packet::Open(open)) => open,
            _ => {
                return Err(Error::ServerConnectionFailure(
                    "handshake did not return an OPEN packet".to_string(),
                ))
            }
        };
        if open.sid.is_empty() {
            return Err(Error::ServerConnectionFailure(
                "handshake returned an empty sid".to_string(),
            ));
        }

        let session = Session::new(open);
        if !session.supports("websocket") {
            return Err(Error::UnsupportedTransport("websocket".to_string()));
        }

        #[cfg(feature = "tracing")]
        tracing::debug!("[sid={}] handshaken", session.sid);

        self.polling.set_sid(session.sid.clone());
        self.session = Some(session);
        Ok(())
    }

    /// POST one Engine.IO MESSAGE over the polling endpoint. Only meaningful
    /// between the handshake and the upgrade (the v4 namespace connect).
    pub async fn post_message(&mut self, data: String) -> Result<(), Error> {
        if self.session.is_none() {
            return Err(Error::NotConnected);
        }
        self.polling
            .post(&self.url, &self.config, Packet::Message(data))
            .await
    }

    /// One GET poll on the polling endpoint, pre-upgrade.
    pub async fn poll(&mut self) -> Result<Vec<Packet>, Error> {
        if self.session.is_none() {
            return Err(Error::NotConnected);
        }
        self.polling.poll(&self.url, &self.config).await
    }

    /// Upgrade the session to the websocket transport.
    ///
    /// Sends the UPGRADE packet right after the 101; for v2, the server's
    /// gratuitous connect message is drained and discarded here.
    pub async fn upgrade(&mut self) -> Result<(), Error> {
        let sid = match &self.session {
            Some(session) => session.sid.clone(),
            None => return Err(Error::NotConnected),
        };
        if self.ws.is_some() {
            return Ok(());
        }

        let mut stream = Stream::connect(&self.url, &self.config).await?;

        let key = b64.encode(rand::random::<[u8; 16]>());
        let accept = expected_accept(&key);

        let mut headers = vec![
            ("Upgrade".to_string(), "websocket".to_string()),
            ("Connection".to_string(), "Upgrade".to_string()),
            ("Sec-WebSocket-Key".to_string(), key),
            ("Sec-WebSocket-Version".to_string(), "13".to_string()),
            (
                "Origin".to_string(),
                self.config.origin.clone().unwrap_or_else(|| "*".to_string()),
            ),
        ];
        for (name, value) in &self.config.headers {
            if let Ok(value) = value.to_str() {
                headers.push((name.as_str().to_string(), value.to_string()));
            }
        }
        if !self.polling.cookies().is_empty() {
            headers.push(("Cookie".to_string(), self.polling.cookies().join("; ")));
        }

        let req = Request {
            method: Method::GET,
            target: format!(
                "{}/?EIO={}&transport=websocket&t={}&sid={}",
                self.url.path,
                self.config.version.eio(),
                yeast(),
                sid
            ),
            host: self.url.authority(),
            headers,
            body: None,
            keep_alive: false,
        };

        let resp = request::exchange(&mut stream, &req, true, self.config.timeout).await?;
        if resp.status != StatusCode::SWITCHING_PROTOCOLS {
            return Err(Error::ServerConnectionFailure(format!(
                "upgrade request returned {}",
                resp.status
            )));
        }
        match resp.headers.get(SEC_WEBSOCKET_ACCEPT) {
            Some(v) if v.as_bytes() == accept.as_bytes() => {}
            _ => {
                return Err(Error::ServerConnectionFailure(
                    "websocket accept key mismatch".to_string(),
                ))
            }
        }

        let mut ws = WsSocket::new(stream, &resp.body, self.config.max_payload);
        let upgrade: String = Packet::Upgrade.try_into()?;
        ws.send(OpCode::Text, upgrade.as_bytes()).await?;

        if self.config.version.drains_spurious_connect() {
            match ws.recv(self.config.timeout).await {
                Ok(_) => {}
                Err(e) if e.is_timeout() => {}
                Err(e) => return Err(e),
            }
        }

        #[cfg(feature = "tracing")]
        tracing::debug!("[sid={sid}] websocket upgrade complete");

        if let Some(session) = self.session.as_mut() {
            session.touch();
        }
        self.ws = Some(ws);
        Ok(())
    }

    /// Send one Engine.IO MESSAGE as a websocket text frame. Returns the
    /// bytes put on the wire.
    pub async fn send_message(&mut self, data: &str) -> Result<usize, Error> {
        self.send_packet(Packet::Message(data.to_string())).await
    }

    /// Send one binary attachment frame (v2/v3 get the `0x04` type prefix).
    pub async fn send_binary(&mut self, data: &[u8]) -> Result<usize, Error> {
        let ws = self.ws.as_mut().ok_or(Error::NotConnected)?;
        let written = if self.config.version.binary_type_prefix() {
            let mut prefixed = Vec::with_capacity(data.len() + 1);
            prefixed.push(0x04);
            prefixed.extend_from_slice(data);
            ws.send(OpCode::Binary, &prefixed).await?
        } else {
            ws.send(OpCode::Binary, data).await?
        };
        if let Some(session) = self.session.as_mut() {
            session.touch();
        }
        Ok(written)
    }

    /// One bounded read: the next packet, or `None` when the read timed out
    /// with no data. Websocket-level pings are answered transparently.
    pub async fn recv(&mut self) -> Result<Option<Packet>, Error> {
        let ws = self.ws.as_mut().ok_or(Error::NotConnected)?;
        let message = match ws.recv(self.config.timeout).await {
            Ok(message) => message,
            Err(e) if e.is_timeout() => return Ok(None),
            Err(Error::Closed) => {
                self.ws = None;
                self.session = None;
                return Err(Error::Closed);
            }
            Err(e) => return Err(e),
        };
        match message {
            Message::Text(text) => Ok(Some(Packet::try_from(text.as_str())?)),
            Message::Binary(mut data) => {
                if self.config.version.binary_type_prefix() && data.first() == Some(&0x04) {
                    data.remove(0);
                    Ok(Some(Packet::BinaryV3(data)))
                } else {
                    Ok(Some(Packet::Binary(data)))
                }
            }
            Message::Ping(payload) => {
                ws.send(OpCode::Pong, &payload).await?;
                Ok(None)
            }
            Message::Pong(_) => Ok(None),
            Message::Close(_code) => {
                #[cfg(feature = "tracing")]
                tracing::debug!("websocket closed by server: {_code:?}");
                self.ws = None;
                self.session = None;
                Err(Error::Closed)
            }
        }
    }

    /// Engine-level heartbeat: on v2/v3, send a PING when the session has
    /// been quiet for a full ping interval. Exactly one ping goes out per
    /// quiet period because sending resets the clock. v4 is a no-op, the
    /// server drives and [`Engine::pong`] answers.
    pub async fn keep_alive(&mut self) -> Result<(), Error> {
        if !self.config.version.client_initiates_ping() {
            return Ok(());
        }
        let due = match (&self.session, &self.ws) {
            (Some(session), Some(_)) => session.needs_heartbeat(Instant::now()),
            _ => false,
        };
        if due {
            self.send_packet(Packet::Ping).await?;
        }
        Ok(())
    }

    /// Answer a server PING (v4 heartbeat).
    pub async fn pong(&mut self) -> Result<(), Error> {
        self.send_packet(Packet::Pong).await.map(|_| ())
    }

    /// Answer a `2probe` the server sends around the upgrade.
    pub async fn pong_probe(&mut self) -> Result<(), Error> {
        self.send_packet(Packet::PongProbe).await.map(|_| ())
    }

    /// Send the CLOSE packet and drop the transport. Best-effort on the
    /// wire: the session is cleared even when the writes fail.
    pub async fn close(&mut self) -> Result<(), Error> {
        if let Some(ws) = self.ws.as_mut() {
            if let Ok(data) = String::try_from(Packet::Close) {
                let _ = ws.send(OpCode::Text, data.as_bytes()).await;
            }
            let _ = ws.close().await;
        }
        self.ws = None;
        self.session = None;
        self.polling = Polling::new();
        Ok(())
    }

    async fn send_packet(&mut self, packet: Packet) -> Result<usize, Error> {
        let data: String = packet.try_into()?;
        let ws = self.ws.as_mut().ok_or(Error::NotConnected)?;
        let written = ws.send(OpCode::Text, data.as_bytes()).await?;
        if let Some(session) = self.session.as_mut() {
            session.touch();
        }
        Ok(written)
    }
}

fn expected_accept(key: &str) -> String {
    let mut sha1 = Sha1::new();
    sha1.update(key.as_bytes());
    sha1.update(WS_GUID.as_bytes());
    b64.encode(sha1.finalize())
}
