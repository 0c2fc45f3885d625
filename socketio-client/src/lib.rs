//! Socket.IO client on top of [`engineio_client`].
//!
//! The application protocol rides Engine.IO MESSAGE frames: namespaces,
//! CONNECT/DISCONNECT, named events and acknowledgments, with binary event
//! arguments shipped as separate websocket frames and stitched back into
//! their JSON placeholders on arrival.
//!
//! The entry point is [`Client`]:
//!
//! ```no_run
//! use socketio_client::{Client, ClientVersion, PayloadValue, SocketIoConfig};
//!
//! # async fn run() -> Result<(), socketio_client::Error> {
//! let mut client = Client::new(
//!     ClientVersion::V4X,
//!     "http://localhost:8000",
//!     SocketIoConfig::default(),
//! )?;
//! client.connect().await?;
//! client.of("/chat").await?;
//! client.emit("message", PayloadValue::from("hello")).await?;
//! let answer = client.wait("message-back").await?;
//! println!("got {:?}", answer.args);
//! client.close().await?;
//! # Ok(())
//! # }
//! ```
//!
//! One connection belongs to one caller: every operation is a plain
//! `.await` with no background task behind it, and waiting for an event is
//! a blocking call rather than a callback subscription.

pub mod client;
pub mod config;
pub mod errors;
pub mod packet;
pub mod payload;

pub use client::Client;
pub use config::{ClientVersion, SocketIoConfig};
pub use errors::Error;
pub use packet::{Event, Packet, PacketData};
pub use payload::PayloadValue;
