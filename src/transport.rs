//! Transport adapters. A [`Transport`] is either a TCP connection or a
//! UDP destination, never both; packet sends apply the framing and
//! encryption appropriate to the kind. Receiving is driven by the
//! server and client loops, which own the read halves.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::UdpSocket;

use crate::encoder;
use crate::encrypt::SessionCipher;
use crate::slip;
use crate::types::{OscPacket, Result};

/// The session cipher for one TCP connection, shared between its read
/// and write sides so both switch over in one step when the handshake
/// completes.
pub(crate) type CipherSlot = Arc<Mutex<Option<SessionCipher>>>;

pub(crate) fn new_cipher_slot() -> CipherSlot {
    Arc::new(Mutex::new(None))
}

pub(crate) fn active_cipher(slot: &CipherSlot) -> Option<SessionCipher> {
    slot.lock().expect("cipher lock poisoned").clone()
}

/// The write side of one TCP connection. Cheap to clone; all clones
/// share the underlying socket and cipher state.
#[derive(Debug, Clone)]
pub struct TcpTransport {
    writer: Arc<tokio::sync::Mutex<OwnedWriteHalf>>,
    cipher: CipherSlot,
    peer: SocketAddr,
}

impl TcpTransport {
    pub(crate) fn new(writer: OwnedWriteHalf, peer: SocketAddr) -> Self {
        TcpTransport {
            writer: Arc::new(tokio::sync::Mutex::new(writer)),
            cipher: new_cipher_slot(),
            peer,
        }
    }

    pub(crate) fn cipher_slot(&self) -> CipherSlot {
        Arc::clone(&self.cipher)
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    pub fn is_encrypting(&self) -> bool {
        self.cipher.lock().expect("cipher lock poisoned").is_some()
    }

    /// Seals (when the session cipher is active), SLIP-frames and
    /// writes one packet's bytes.
    pub(crate) async fn send_bytes(&self, payload: &[u8]) -> Result<()> {
        let framed = match active_cipher(&self.cipher) {
            Some(cipher) => slip::encode_frame(&cipher.seal(payload)),
            None => slip::encode_frame(payload),
        };

        let mut writer = self.writer.lock().await;
        writer.write_all(&framed).await?;
        Ok(())
    }
}

/// A UDP destination: the local socket plus the address packets are
/// sent to. One packet per datagram, no framing.
#[derive(Debug, Clone)]
pub struct UdpTransport {
    socket: Arc<UdpSocket>,
    dest: SocketAddr,
}

impl UdpTransport {
    pub(crate) fn new(socket: Arc<UdpSocket>, dest: SocketAddr) -> Self {
        UdpTransport { socket, dest }
    }

    pub fn dest_addr(&self) -> SocketAddr {
        self.dest
    }

    pub(crate) async fn send_bytes(&self, payload: &[u8]) -> Result<()> {
        self.socket.send_to(payload, self.dest).await?;
        Ok(())
    }
}

/// A transport is one of the two socket kinds.
#[derive(Debug, Clone)]
pub enum Transport {
    Tcp(TcpTransport),
    Udp(UdpTransport),
}

impl Transport {
    pub fn is_stream(&self) -> bool {
        matches!(self, Transport::Tcp(_))
    }

    pub fn is_datagram(&self) -> bool {
        matches!(self, Transport::Udp(_))
    }

    pub fn is_encrypting(&self) -> bool {
        match self {
            Transport::Tcp(tcp) => tcp.is_encrypting(),
            Transport::Udp(_) => false,
        }
    }

    /// Serializes and transmits one packet over this transport. The
    /// packet is validated before anything is written or queued.
    pub async fn send_packet(&self, packet: &OscPacket) -> Result<()> {
        let bytes = encoder::encode(packet)?;
        self.send_encoded(&bytes).await
    }

    pub(crate) async fn send_encoded(&self, payload: &[u8]) -> Result<()> {
        match self {
            Transport::Tcp(tcp) => tcp.send_bytes(payload).await,
            Transport::Udp(udp) => udp.send_bytes(payload).await,
        }
    }
}

/// Where a received packet came from, and the way back. Handed to the
/// consumer with every dispatched packet so replies can be routed over
/// the originating socket (TCP) or to the sender's address (UDP).
#[derive(Debug, Clone)]
pub struct ReplyEndpoint {
    transport: Transport,
    source: SocketAddr,
}

impl ReplyEndpoint {
    pub(crate) fn new(transport: Transport, source: SocketAddr) -> Self {
        ReplyEndpoint { transport, source }
    }

    /// The peer's source address.
    pub fn source(&self) -> SocketAddr {
        self.source
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    /// Sends a reply over the transport the packet arrived on.
    pub async fn reply(&self, packet: &OscPacket) -> Result<()> {
        self.transport.send_packet(packet).await
    }
}
