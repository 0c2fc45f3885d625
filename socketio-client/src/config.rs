use engineio_client::{Config as EngineConfig, ProtocolVersion};
use serde_json::Value;

/// Client generation constants, selecting the wire dialect.
///
/// Each constant pins the Engine.IO revision and the connect behavior of
/// the matching server generation: 0.x/1.x servers speak EIO 2, 2.x speaks
/// EIO 3, and 3.x/4.x speak EIO 4 where the auth payload rides the CONNECT
/// packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientVersion {
    V0X,
    V1X,
    V2X,
    V3X,
    V4X,
}

impl ClientVersion {
    /// The Engine.IO revision this generation negotiates.
    pub fn protocol(self) -> ProtocolVersion {
        match self {
            ClientVersion::V0X | ClientVersion::V1X => ProtocolVersion::V2,
            ClientVersion::V2X => ProtocolVersion::V3,
            ClientVersion::V3X | ClientVersion::V4X => ProtocolVersion::V4,
        }
    }

    /// Whether the CONNECT packet carries the auth payload.
    pub fn sends_auth(self) -> bool {
        matches!(self, ClientVersion::V3X | ClientVersion::V4X)
    }
}

/// Socket.IO client options on top of the engine configuration.
///
/// `engine.version` is overwritten from the [`ClientVersion`] handed to
/// [`crate::Client::new`]; everything else passes through untouched.
#[derive(Clone, Default)]
pub struct SocketIoConfig {
    pub engine: EngineConfig,
    /// Auth payload for the CONNECT packet (EIO v4 generations only).
    pub auth: Option<Value>,
}

impl SocketIoConfig {
    pub fn with_auth(mut self, auth: Value) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn with_engine(mut self, engine: EngineConfig) -> Self {
        self.engine = engine;
        self
    }
}
