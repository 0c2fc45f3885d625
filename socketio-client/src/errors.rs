use engineio_client::Error as EngineError;

/// Error type for the application layer.
///
/// Transport failures come wrapped in [`Error::Engine`]; the variants here
/// cover the Socket.IO grammar and the connect/refusal handshake on top.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),
    #[error("server connection failure: {0}")]
    ServerConnectionFailure(String),
    #[error("error serializing json packet: {0:?}")]
    Json(#[from] serde_json::Error),
    #[error("invalid packet type: {0:?}")]
    InvalidPacketType(Option<char>),
    #[error("invalid packet length")]
    InvalidPacketLength,
    #[error("event packet without an event name")]
    MissingEventName,
    #[error("unexpected packet while collecting binary attachments")]
    UnexpectedPacket,
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("client is not connected")]
    NotConnected,
}

impl Error {
    /// Whether this error only means "no data arrived in time".
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Engine(e) if e.is_timeout())
    }
}
