//! Engine.IO client transport layer.
//!
//! This crate drives the transport half of a Socket.IO connection:
//! * the HTTP long-polling handshake against `/<path>/?EIO=<v>&transport=polling`,
//! * the websocket upgrade on the same session id,
//! * the heartbeat, and
//! * the RFC 6455 client framing everything rides on after the upgrade.
//!
//! The entry point is [`Engine`]. A connection is driven sequentially by its
//! caller: there is no background task, no internal channel and no event
//! dispatcher. Reads are bounded by the configured timeout and a read that
//! yields nothing is not an error, so callers poll again at their own pace.
//! The heartbeat runs opportunistically from [`Engine::keep_alive`], which is
//! expected to be invoked around every user-initiated send.
//!
//! Protocol revisions 2, 3 and 4 of Engine.IO are supported from a single
//! code path: every behavioral difference is expressed as data on
//! [`ProtocolVersion`].

pub mod config;
pub mod engine;
pub mod errors;
pub mod packet;
pub mod protocol;
pub mod request;
pub mod session;
pub mod stream;
pub mod transport;
pub mod ws;
pub mod yeast;

pub use config::Config;
pub use engine::Engine;
pub use errors::Error;
pub use packet::{OpenPacket, Packet};
pub use protocol::ProtocolVersion;
pub use session::Session;
pub use transport::TransportType;
