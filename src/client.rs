//! The OSC client: connects to a server over UDP or TCP, sends
//! packets, receives replies, and optionally upgrades a TCP connection
//! to encryption by driving the initiator side of the handshake.

use std::collections::VecDeque;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{lookup_host, TcpStream, UdpSocket};
use tokio::time::timeout;
use tracing::{debug, info};

use crate::decoder;
use crate::encoder;
use crate::encrypt::Keypair;
use crate::errors::OscError;
use crate::handshake::{self, Handshake, HandshakeAction};
use crate::slip::{self, SlipDecoder};
use crate::transport::{self, TcpTransport};
use crate::types::{OscPacket, Result};

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    /// Stream transport with SLIP framing when `true`, one datagram
    /// per packet otherwise.
    pub use_tcp: bool,
    /// Cap on one inbound SLIP frame's payload.
    pub max_frame: usize,
    /// Deadline for each step of the encryption handshake.
    pub handshake_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            host: "localhost".to_string(),
            port: 53000,
            use_tcp: false,
            max_frame: slip::MAX_FRAME_LEN,
            handshake_timeout: Duration::from_secs(10),
        }
    }
}

struct TcpSession {
    transport: TcpTransport,
    read_half: OwnedReadHalf,
    slip_decoder: SlipDecoder,
    /// Packets that arrived while we were waiting for handshake
    /// traffic; handed out by `recv_packet` first.
    pending: VecDeque<OscPacket>,
}

impl TcpSession {
    /// Reads until at least one complete frame is available.
    async fn next_frames(&mut self) -> Result<Vec<Vec<u8>>> {
        let mut buf = [0u8; 4096];
        loop {
            let len = self.read_half.read(&mut buf).await?;
            if len == 0 {
                return Err(OscError::Transport(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed by peer",
                )));
            }
            let frames = self.slip_decoder.push(&buf[..len])?;
            if !frames.is_empty() {
                return Ok(frames);
            }
        }
    }

    fn open_payload(&self, frame: Vec<u8>) -> Result<Vec<u8>> {
        match transport::active_cipher(&self.transport.cipher_slot()) {
            Some(cipher) => cipher.open(&frame),
            None => Ok(frame),
        }
    }
}

enum Connection {
    Tcp(TcpSession),
    Udp {
        socket: Arc<UdpSocket>,
        dest: SocketAddr,
    },
}

/// A connection to one OSC peer.
pub struct OscClient {
    config: ClientConfig,
    connection: Option<Connection>,
}

impl OscClient {
    pub fn new(config: ClientConfig) -> Self {
        OscClient {
            config,
            connection: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// Resolves the configured host and either connects the TCP stream
    /// or binds an ephemeral UDP socket for it.
    pub async fn connect(&mut self) -> Result<()> {
        let addr = lookup_host((self.config.host.as_str(), self.config.port))
            .await?
            .next()
            .ok_or_else(|| {
                OscError::Transport(io::Error::new(
                    io::ErrorKind::NotFound,
                    "host did not resolve",
                ))
            })?;

        let connection = if self.config.use_tcp {
            let stream = TcpStream::connect(addr).await?;
            stream.set_nodelay(true)?;
            let peer = stream.peer_addr()?;
            let (read_half, write_half) = stream.into_split();
            Connection::Tcp(TcpSession {
                transport: TcpTransport::new(write_half, peer),
                read_half,
                slip_decoder: SlipDecoder::with_max_frame(self.config.max_frame),
                pending: VecDeque::new(),
            })
        } else {
            let bind: SocketAddr = if addr.is_ipv6() {
                "[::]:0".parse().expect("literal address")
            } else {
                "0.0.0.0:0".parse().expect("literal address")
            };
            Connection::Udp {
                socket: Arc::new(UdpSocket::bind(bind).await?),
                dest: addr,
            }
        };

        debug!(%addr, tcp = self.config.use_tcp, "connected");
        self.connection = Some(connection);
        Ok(())
    }

    pub async fn disconnect(&mut self) {
        if self.connection.take().is_some() {
            debug!("disconnected");
        }
    }

    pub fn is_encrypting(&self) -> bool {
        matches!(
            &self.connection,
            Some(Connection::Tcp(session)) if session.transport.is_encrypting()
        )
    }

    /// Serializes and sends one packet: a single datagram over UDP, a
    /// SLIP frame (sealed first when encryption is active) over TCP.
    pub async fn send_packet(&mut self, packet: &OscPacket) -> Result<()> {
        let bytes = encoder::encode(packet)?;
        match self.connection.as_mut().ok_or_else(not_connected)? {
            Connection::Tcp(session) => session.transport.send_bytes(&bytes).await,
            Connection::Udp { socket, dest } => {
                socket.send_to(&bytes, *dest).await?;
                Ok(())
            }
        }
    }

    /// Waits for the next inbound packet on this connection.
    pub async fn recv_packet(&mut self) -> Result<OscPacket> {
        match self.connection.as_mut().ok_or_else(not_connected)? {
            Connection::Tcp(session) => {
                if let Some(packet) = session.pending.pop_front() {
                    return Ok(packet);
                }
                loop {
                    for frame in session.next_frames().await? {
                        let payload = session.open_payload(frame)?;
                        if handshake::is_handshake_frame(&payload) {
                            return Err(OscError::ProtocolError(
                                "unexpected handshake message",
                            ));
                        }
                        session.pending.push_back(decoder::decode(&payload)?);
                    }
                    if let Some(packet) = session.pending.pop_front() {
                        return Ok(packet);
                    }
                }
            }
            Connection::Udp { socket, .. } => {
                let mut buf = vec![0u8; 64 * 1024];
                let (len, _source) = socket.recv_from(&mut buf).await?;
                decoder::decode(&buf[..len])
            }
        }
    }

    /// Drives the initiator side of the encryption handshake:
    /// request, await the approval, send begin, switch the cipher on.
    /// Requires a connected TCP stream. Packets arriving during the
    /// exchange are queued for [`recv_packet`].
    pub async fn start_encryption(&mut self, keypair: Keypair) -> Result<()> {
        let deadline = self.config.handshake_timeout;
        let Some(Connection::Tcp(session)) = self.connection.as_mut() else {
            return Err(OscError::ProtocolError(
                "encryption requires a connected stream transport",
            ));
        };

        let mut hs = Handshake::new(keypair);
        let request = hs.request_message()?;
        let bytes = encoder::encode(&OscPacket::Message(request))?;
        session.transport.send_bytes(&bytes).await?;

        loop {
            let frames = match timeout(deadline, session.next_frames()).await {
                Ok(frames) => frames?,
                Err(_) => return Err(OscError::HandshakeTimeout),
            };

            for frame in frames {
                let payload = session.open_payload(frame)?;
                if !handshake::is_handshake_frame(&payload) {
                    session.pending.push_back(decoder::decode(&payload)?);
                    continue;
                }

                let OscPacket::Message(msg) = decoder::decode(&payload)? else {
                    return Err(OscError::ProtocolError("handshake step must be a message"));
                };
                match hs.process(&msg)? {
                    HandshakeAction::SendBegin => {
                        let begin = hs.begin_message()?;
                        let bytes = encoder::encode(&OscPacket::Message(begin))?;
                        // The begin itself travels in the clear; only
                        // after it is written does the cipher turn on.
                        session.transport.send_bytes(&bytes).await?;
                        let cipher = hs.session_cipher()?;
                        *session
                            .transport
                            .cipher_slot()
                            .lock()
                            .expect("cipher lock poisoned") = Some(cipher);
                        info!("session encryption active");
                        return Ok(());
                    }
                    HandshakeAction::Reply(_) | HandshakeAction::Activate => {
                        // Responder transitions; the peer must not
                        // drive them at us mid-initiation.
                        return Err(OscError::ProtocolError("handshake message out of order"));
                    }
                }
            }
        }
    }
}

fn not_connected() -> OscError {
    OscError::Transport(io::Error::new(
        io::ErrorKind::NotConnected,
        "client is not connected",
    ))
}
