use std::io;

use crate::packet::Packet;

/// Error type for the whole transport layer.
///
/// [`Error::Timeout`] is the one recoverable case: a bounded read ran out of
/// time with no data. Callers treat it as "no packet now" and poll again,
/// everything else aborts the current operation.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("server connection failure: {0}")]
    ServerConnectionFailure(String),
    #[error("transport not supported by server: {0}")]
    UnsupportedTransport(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("read timed out")]
    Timeout,
    #[error("payload larger than the {0} byte limit")]
    PayloadTooLarge(usize),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("error serializing json packet: {0:?}")]
    Json(#[from] serde_json::Error),
    #[error("error decoding base64 packet: {0:?}")]
    Base64(#[from] base64::DecodeError),
    #[error("invalid packet length")]
    InvalidPacketLength,
    #[error("invalid packet type: {0:?}")]
    InvalidPacketType(Option<char>),
    #[error("bad packet received: {0:?}")]
    BadPacket(Packet),
    #[error("malformed http response: {0}")]
    MalformedResponse(&'static str),
    #[error("invalid utf-8 in text frame")]
    InvalidUtf8,
    #[error("invalid websocket opcode: {0}")]
    InvalidOpCode(u8),
    #[error("reserved frame bits are not zero")]
    ReservedBitsNotZero,
    #[error("masked frame received from server")]
    MaskedServerFrame,
    #[error("unexpected continuation frame")]
    UnexpectedFragment,
    #[error("fragmented control frame")]
    ControlFrameFragmented,
    #[error("connection closed by server")]
    Closed,
    #[error("transport is not connected")]
    NotConnected,
}

impl Error {
    /// Whether this error only means "no data arrived in time".
    pub fn is_timeout(&self) -> bool {
        match self {
            Error::Timeout => true,
            Error::Io(e) => {
                e.kind() == io::ErrorKind::WouldBlock || e.kind() == io::ErrorKind::TimedOut
            }
            _ => false,
        }
    }
}
