//! **osckit** is an implementation of the [OSC 1.0/1.1](http://opensoundcontrol.org/spec-1_0)
//! protocol in pure Rust: the packet codec, SLIP stream framing,
//! address-pattern matching, tokio-based UDP/TCP transports, and an
//! optional key-exchange handshake that upgrades a TCP connection to an
//! encrypted channel.

/// Crate specific error types.
mod errors;
/// OSC data types, see [OSC 1.0 specification](https://opensoundcontrol.stanford.edu/spec-1_0.html) for details.
mod types;

pub use crate::errors::*;
pub use crate::types::*;

/// Address checking and matching methods.
pub mod address;
/// Provides a decoding method for OSC packets.
pub mod decoder;
/// Encodes an `OscPacket` to a byte vector.
pub mod encoder;
/// X25519 key agreement and the per-connection frame cipher.
pub mod encrypt;
/// The state machine negotiating session encryption over OSC messages.
pub mod handshake;
/// The QSC textual packet notation for diagnostics and tests.
pub mod qsc;
/// SLIP framing (RFC 1055) for stream transports.
pub mod slip;

/// Connecting, sending and receiving as a client.
pub mod client;
/// Listening and dispatching as a server.
pub mod server;
/// The TCP/UDP transport adapters and reply routing.
pub mod transport;

pub use crate::client::{ClientConfig, OscClient};
pub use crate::encrypt::Keypair;
pub use crate::server::{OscServer, PacketDestination, ServerConfig};
pub use crate::transport::{ReplyEndpoint, Transport};
