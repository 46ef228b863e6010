//! The OSC server: listens on UDP and TCP, owns per-connection decode
//! state, and hands every parsed packet to a [`PacketDestination`].

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::decoder;
use crate::encrypt::Keypair;
use crate::errors::OscError;
use crate::handshake::{self, Handshake, HandshakeAction};
use crate::slip::{self, SlipDecoder};
use crate::transport::{self, ReplyEndpoint, TcpTransport, Transport, UdpTransport};
use crate::types::{OscPacket, Result};

/// The consumer of dispatched packets. The server holds one shared
/// destination for its whole lifetime and calls it from the connection
/// tasks, so implementations must be `Send + Sync`.
///
/// Closures of the right shape implement it directly:
///
/// ```no_run
/// # use std::sync::Arc;
/// # use osckit::server::{OscServer, ServerConfig};
/// # use osckit::{OscPacket, ReplyEndpoint};
/// let server = OscServer::new(
///     ServerConfig::default(),
///     Arc::new(|packet: OscPacket, _reply: ReplyEndpoint| println!("{packet}")),
/// );
/// ```
pub trait PacketDestination: Send + Sync {
    fn take_packet(&self, packet: OscPacket, reply: ReplyEndpoint);

    /// Called once when a stream connection goes away, whether the peer
    /// hung up or the server dropped it after an error.
    fn connection_closed(&self, _peer: SocketAddr) {}
}

impl<F> PacketDestination for F
where
    F: Fn(OscPacket, ReplyEndpoint) + Send + Sync,
{
    fn take_packet(&self, packet: OscPacket, reply: ReplyEndpoint) {
        self(packet, reply)
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port shared by the UDP socket and the TCP listener.
    pub port: u16,
    /// Where UDP replies go. `None` replies to the datagram's source
    /// port.
    pub udp_reply_port: Option<u16>,
    pub ipv6: bool,
    /// Per-connection cap on one SLIP frame's payload.
    pub max_frame: usize,
    /// How long a started handshake may stall before the connection is
    /// closed with `HandshakeTimeout`.
    pub handshake_timeout: Duration,
    /// Set a keypair to accept encryption handshakes from clients.
    pub keypair: Option<Keypair>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            port: 53000,
            udp_reply_port: None,
            ipv6: false,
            max_frame: slip::MAX_FRAME_LEN,
            handshake_timeout: Duration::from_secs(10),
            keypair: None,
        }
    }
}

struct ConnectionHandle {
    task: JoinHandle<()>,
    #[allow(dead_code)]
    peer: SocketAddr,
}

/// Listens for OSC over UDP and TCP on one port and dispatches every
/// decoded packet to the destination, together with a reply route.
///
/// Malformed datagrams are dropped and counted; a malformed byte or
/// frame on a TCP connection closes that connection, since stream
/// framing cannot be trusted after a failure.
pub struct OscServer {
    config: ServerConfig,
    destination: Arc<dyn PacketDestination>,
    connections: Arc<Mutex<HashMap<u64, ConnectionHandle>>>,
    listen_tasks: Vec<JoinHandle<()>>,
    udp_addr: Option<SocketAddr>,
    tcp_addr: Option<SocketAddr>,
    dropped_datagrams: Arc<AtomicU64>,
}

impl OscServer {
    pub fn new(config: ServerConfig, destination: Arc<dyn PacketDestination>) -> Self {
        OscServer {
            config,
            destination,
            connections: Arc::new(Mutex::new(HashMap::new())),
            listen_tasks: Vec::new(),
            udp_addr: None,
            tcp_addr: None,
            dropped_datagrams: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Binds the sockets and spawns the receive loops. Returns once
    /// listening, not once stopped.
    pub async fn start_listening(&mut self) -> Result<()> {
        let ip: IpAddr = if self.config.ipv6 {
            Ipv6Addr::UNSPECIFIED.into()
        } else {
            Ipv4Addr::UNSPECIFIED.into()
        };

        let udp = Arc::new(UdpSocket::bind((ip, self.config.port)).await?);
        let tcp = TcpListener::bind((ip, self.config.port)).await?;
        let udp_addr = udp.local_addr()?;
        let tcp_addr = tcp.local_addr()?;
        self.udp_addr = Some(udp_addr);
        self.tcp_addr = Some(tcp_addr);
        info!(%udp_addr, %tcp_addr, "listening");

        self.listen_tasks.push(tokio::spawn(udp_loop(
            udp,
            self.config.udp_reply_port,
            Arc::clone(&self.destination),
            Arc::clone(&self.dropped_datagrams),
        )));
        self.listen_tasks.push(tokio::spawn(accept_loop(
            tcp,
            self.config.clone(),
            Arc::clone(&self.destination),
            Arc::clone(&self.connections),
        )));
        Ok(())
    }

    /// Closes the listeners, aborts every connection task and discards
    /// their buffers. Partial frames are dropped without notice.
    pub async fn stop_listening(&mut self) {
        for task in self.listen_tasks.drain(..) {
            task.abort();
        }
        let mut connections = self.connections.lock().await;
        for (index, conn) in connections.drain() {
            debug!(index, "dropping connection");
            conn.task.abort();
        }
        self.udp_addr = None;
        self.tcp_addr = None;
    }

    /// Local address of the UDP socket, once listening.
    pub fn udp_addr(&self) -> Option<SocketAddr> {
        self.udp_addr
    }

    /// Local address of the TCP listener, once listening.
    pub fn tcp_addr(&self) -> Option<SocketAddr> {
        self.tcp_addr
    }

    /// Number of inbound datagrams discarded because they failed to
    /// decode.
    pub fn dropped_datagrams(&self) -> u64 {
        self.dropped_datagrams.load(Ordering::Relaxed)
    }
}

async fn udp_loop(
    socket: Arc<UdpSocket>,
    reply_port: Option<u16>,
    destination: Arc<dyn PacketDestination>,
    dropped: Arc<AtomicU64>,
) {
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let (len, source) = match socket.recv_from(&mut buf).await {
            Ok(received) => received,
            Err(err) => {
                warn!(%err, "UDP receive failed");
                continue;
            }
        };

        match decoder::decode(&buf[..len]) {
            Ok(packet) => {
                let reply_to = SocketAddr::new(source.ip(), reply_port.unwrap_or(source.port()));
                let transport =
                    Transport::Udp(UdpTransport::new(Arc::clone(&socket), reply_to));
                destination.take_packet(packet, ReplyEndpoint::new(transport, source));
            }
            Err(err) => {
                dropped.fetch_add(1, Ordering::Relaxed);
                debug!(%source, %err, "dropping malformed datagram");
            }
        }
    }
}

async fn accept_loop(
    listener: TcpListener,
    config: ServerConfig,
    destination: Arc<dyn PacketDestination>,
    connections: Arc<Mutex<HashMap<u64, ConnectionHandle>>>,
) {
    let mut next_index: u64 = 0;
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(err) => {
                warn!(%err, "accept failed");
                continue;
            }
        };

        let index = next_index;
        next_index += 1;
        debug!(index, %peer, "accepted stream connection");

        let config = config.clone();
        let destination = Arc::clone(&destination);
        let by_index = Arc::clone(&connections);
        let task = tokio::spawn(async move {
            match serve_stream(stream, peer, config, Arc::clone(&destination)).await {
                Ok(()) => debug!(index, %peer, "connection closed"),
                Err(err) => warn!(index, %peer, %err, "connection dropped"),
            }
            destination.connection_closed(peer);
            by_index.lock().await.remove(&index);
        });

        connections
            .lock()
            .await
            .insert(index, ConnectionHandle { task, peer });
    }
}

/// One connection's receive loop: deframe, decrypt once the session
/// cipher is on, decode, dispatch. Any error return closes the
/// connection.
async fn serve_stream(
    stream: TcpStream,
    peer: SocketAddr,
    config: ServerConfig,
    destination: Arc<dyn PacketDestination>,
) -> Result<()> {
    stream.set_nodelay(true)?;
    let (mut read_half, write_half) = stream.into_split();

    let tcp = TcpTransport::new(write_half, peer);
    let cipher_slot = tcp.cipher_slot();
    let mut slip_decoder = SlipDecoder::with_max_frame(config.max_frame);
    let mut hs = config.keypair.map(Handshake::new);

    let mut buf = vec![0u8; 4096];
    loop {
        // A started handshake must keep moving; outside of one, reads
        // may idle forever.
        let handshake_pending = hs.as_ref().is_some_and(Handshake::in_flight);
        let read = if handshake_pending {
            match timeout(config.handshake_timeout, read_half.read(&mut buf)).await {
                Ok(read) => read,
                Err(_) => return Err(OscError::HandshakeTimeout),
            }
        } else {
            read_half.read(&mut buf).await
        };

        let len = read?;
        if len == 0 {
            return Ok(());
        }

        for frame in slip_decoder.push(&buf[..len])? {
            let payload = match transport::active_cipher(&cipher_slot) {
                Some(cipher) => cipher.open(&frame)?,
                None => frame,
            };

            if handshake::is_handshake_frame(&payload) {
                let hs = hs.as_mut().ok_or(OscError::ProtocolError(
                    "peer requested encryption but no keypair is configured",
                ))?;
                process_handshake_frame(hs, &payload, &tcp, &cipher_slot, peer).await?;
            } else {
                let packet = decoder::decode(&payload)?;
                let reply = ReplyEndpoint::new(Transport::Tcp(tcp.clone()), peer);
                destination.take_packet(packet, reply);
            }
        }
    }
}

async fn process_handshake_frame(
    hs: &mut Handshake,
    payload: &[u8],
    tcp: &TcpTransport,
    cipher_slot: &transport::CipherSlot,
    peer: SocketAddr,
) -> Result<()> {
    let OscPacket::Message(msg) = decoder::decode(payload)? else {
        return Err(OscError::ProtocolError("handshake step must be a message"));
    };

    match hs.process(&msg)? {
        HandshakeAction::Reply(approve) => {
            // Still in the clear; the cipher switches on at begin.
            let bytes = crate::encoder::encode(&OscPacket::Message(approve))?;
            tcp.send_bytes(&bytes).await?;
        }
        HandshakeAction::Activate => {
            let cipher = hs.session_cipher()?;
            *cipher_slot.lock().expect("cipher lock poisoned") = Some(cipher);
            info!(%peer, "session encryption active");
        }
        HandshakeAction::SendBegin => {
            // Only an initiator can be told to begin, and the server
            // never initiates.
            return Err(OscError::ProtocolError("handshake message out of order"));
        }
    }
    Ok(())
}
