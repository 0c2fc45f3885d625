//! The caller-facing Socket.IO session.
//!
//! One [`Client`] owns one engine, which owns the byte stream: all
//! operations run on the caller's task and suspend only on I/O. Waiting for
//! an event is a blocking call that consumes and answers transport
//! housekeeping (ping/pong/noop) on the way; there is no listener registry
//! and no dispatcher behind it.

use serde_json::Value;

use engineio_client::{Engine, Packet as EioPacket};

use crate::config::{ClientVersion, SocketIoConfig};
use crate::errors::Error;
use crate::packet::{Event, Packet, PacketData};
use crate::payload::PayloadValue;

pub struct Client {
    engine: Engine,
    version: ClientVersion,
    auth: Option<Value>,
    /// Current namespace, normalized to a leading `/`.
    ns: String,
    connected: bool,
}

impl Client {
    /// Build a client for `url` speaking the given protocol generation.
    pub fn new(
        version: ClientVersion,
        url: &str,
        mut config: SocketIoConfig,
    ) -> Result<Self, Error> {
        config.engine.version = version.protocol();
        let auth = config.auth.take();
        Ok(Self {
            engine: Engine::new(url, config.engine)?,
            version,
            auth,
            ns: "/".to_string(),
            connected: false,
        })
    }

    /// The negotiated engine session, once connected.
    pub fn session(&self) -> Option<&engineio_client::Session> {
        self.engine.session()
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Handshake, namespace connect and websocket upgrade. Idempotent: a
    /// connected client returns immediately.
    pub async fn connect(&mut self) -> Result<(), Error> {
        if self.connected {
            return Ok(());
        }
        self.engine.handshake().await?;
        if self.engine.protocol().connect_namespace_over_polling() {
            self.connect_namespace().await?;
        }
        self.engine.upgrade().await?;
        self.connected = true;
        Ok(())
    }

    /// v4 namespace connect, still on the polling endpoint: POST the
    /// CONNECT packet, then poll for the acknowledgment and its
    /// per-namespace sid.
    async fn connect_namespace(&mut self) -> Result<(), Error> {
        let packet = Packet::connect(self.ns.clone(), self.auth_payload());
        let data: String = (&packet).try_into()?;
        self.engine.post_message(data).await?;

        for packet in self.engine.poll().await? {
            let message = match packet {
                EioPacket::Message(message) => message,
                _ => continue,
            };
            match Packet::try_from(message.as_str())?.inner {
                PacketData::Connect(Some(ack)) => {
                    match ack.get("sid").and_then(Value::as_str) {
                        Some(sid) if !sid.is_empty() => {
                            #[cfg(feature = "tracing")]
                            tracing::debug!("[ns={}] connected with sid {sid}", self.ns);
                            return Ok(());
                        }
                        _ => {
                            return Err(Error::ServerConnectionFailure(
                                "connect acknowledgment without a sid".to_string(),
                            ))
                        }
                    }
                }
                PacketData::ConnectError(data) => {
                    return Err(Error::ServerConnectionFailure(data.to_string()))
                }
                _ => continue,
            }
        }
        Err(Error::ServerConnectionFailure(
            "namespace connect was not acknowledged".to_string(),
        ))
    }

    /// Switch the session to another namespace.
    ///
    /// Before [`Client::connect`] this only selects the namespace the
    /// connect will join. On a live session it sends the CONNECT packet and
    /// drains until the server acknowledges or refuses it.
    pub async fn of(&mut self, nsp: &str) -> Result<(), Error> {
        let nsp = normalize(nsp);
        if nsp == self.ns {
            return Ok(());
        }
        if !self.connected {
            self.ns = nsp;
            return Ok(());
        }

        self.engine.keep_alive().await?;
        let packet = Packet::connect(nsp.clone(), self.auth_payload());
        let data: String = (&packet).try_into()?;
        self.engine.send_message(&data).await?;

        loop {
            let packet = match self.drain().await? {
                Some(packet) => packet,
                None => continue,
            };
            if packet.ns != nsp {
                continue;
            }
            match packet.inner {
                PacketData::Connect(_) => break,
                PacketData::ConnectError(data) => {
                    return Err(Error::ServerConnectionFailure(data.to_string()))
                }
                _ => continue,
            }
        }
        self.ns = nsp;
        Ok(())
    }

    /// Emit one event with its payload. A payload holding binary leaves
    /// goes out as one text frame followed by the attachment frames, in
    /// placeholder order. Returns the total bytes put on the wire.
    pub async fn emit(
        &mut self,
        event: &str,
        data: impl Into<PayloadValue>,
    ) -> Result<usize, Error> {
        if !self.connected {
            return Err(Error::NotConnected);
        }
        if event.is_empty() {
            return Err(Error::InvalidArgument("empty event name".to_string()));
        }

        self.engine.keep_alive().await?;

        let packet = Packet::event(self.ns.clone(), event, data);
        let encoded: String = (&packet).try_into()?;
        let mut written = self.engine.send_message(&encoded).await?;
        if let PacketData::BinaryEvent(bin, _) = &packet.inner {
            for attachment in &bin.bin {
                written += self.engine.send_binary(attachment).await?;
            }
        }

        let pause = self.engine.config().wait;
        if !pause.is_zero() {
            tokio::time::sleep(pause).await;
        }
        Ok(written)
    }

    /// Block until an event with this name arrives on the session
    /// namespace. Everything else on the stream is consumed: housekeeping
    /// is answered, foreign events are discarded, read timeouts loop.
    pub async fn wait(&mut self, event: &str) -> Result<Event, Error> {
        loop {
            let packet = match self.drain().await? {
                Some(packet) => packet,
                None => continue,
            };
            if !self.matches_namespace(&packet.ns) {
                continue;
            }
            if let Some(delivered) = packet.into_event() {
                if delivered.name == event {
                    return Ok(delivered);
                }
                #[cfg(feature = "tracing")]
                tracing::debug!("discarding event {:?} while waiting for {event:?}", delivered.name);
            }
        }
    }

    /// One read-and-interpret cycle.
    ///
    /// Answers Engine.IO PINGs, swallows PONG/NOOP, collects the trailing
    /// attachment frames of a binary packet, and finishes with a heartbeat
    /// check. Returns `None` when the read timed out or only housekeeping
    /// was consumed.
    pub async fn drain(&mut self) -> Result<Option<Packet>, Error> {
        let result = match self.engine.recv().await? {
            None => None,
            Some(EioPacket::Ping) => {
                self.engine.pong().await?;
                None
            }
            Some(EioPacket::PingProbe) => {
                self.engine.pong_probe().await?;
                None
            }
            Some(EioPacket::Pong | EioPacket::PongProbe | EioPacket::Noop) => None,
            Some(EioPacket::Upgrade | EioPacket::Open(_)) => None,
            Some(EioPacket::Close) => {
                self.connected = false;
                return Err(Error::Engine(engineio_client::Error::Closed));
            }
            Some(EioPacket::Binary(_) | EioPacket::BinaryV3(_)) => {
                // An attachment with no binary header to claim it.
                #[cfg(feature = "tracing")]
                tracing::debug!("dropping unclaimed binary frame");
                None
            }
            Some(EioPacket::Message(message)) => {
                let packet = Packet::try_from(message.as_str())?;
                match packet.inner {
                    PacketData::BinaryEvent(_, _) | PacketData::BinaryAck(_, _) => {
                        Some(self.collect_attachments(packet).await?)
                    }
                    _ => Some(packet),
                }
            }
        };
        self.engine.keep_alive().await?;
        Ok(result)
    }

    /// Read the announced number of raw frames following a binary header.
    /// Transport pings are answered transparently; any other packet in the
    /// middle of the sequence is a protocol error.
    async fn collect_attachments(&mut self, mut packet: Packet) -> Result<Packet, Error> {
        {
            let bin = match &mut packet.inner {
                PacketData::BinaryEvent(bin, _) | PacketData::BinaryAck(bin, _) => bin,
                _ => return Ok(packet),
            };
            while !bin.is_complete() {
                match self.engine.recv().await? {
                    Some(EioPacket::Binary(payload) | EioPacket::BinaryV3(payload)) => {
                        bin.add_payload(payload);
                    }
                    Some(EioPacket::Ping) => self.engine.pong().await?,
                    None => continue,
                    Some(_) => return Err(Error::UnexpectedPacket),
                }
            }
        }
        Ok(packet)
    }

    /// Disconnect the namespace and tear the transport down. The session is
    /// terminal afterwards; a new [`Client::connect`] starts from scratch.
    pub async fn close(&mut self) -> Result<(), Error> {
        if self.connected {
            let packet = Packet::disconnect(self.ns.clone());
            if let Ok(data) = String::try_from(&packet) {
                let _ = self.engine.send_message(&data).await;
            }
        }
        self.engine.close().await?;
        self.connected = false;
        Ok(())
    }

    fn auth_payload(&self) -> Option<Value> {
        if self.version.sends_auth() {
            self.auth.clone()
        } else {
            None
        }
    }

    /// Exact namespace match, or the historical off-by-one-slash form
    /// where one side carries the leading `/` and the other does not.
    fn matches_namespace(&self, other: &str) -> bool {
        other == self.ns
            || other.strip_prefix('/') == Some(self.ns.as_str())
            || self.ns.strip_prefix('/') == Some(other)
    }
}

fn normalize(nsp: &str) -> String {
    if nsp.is_empty() {
        "/".to_string()
    } else if nsp.starts_with('/') {
        nsp.to_string()
    } else {
        format!("/{nsp}")
    }
}
