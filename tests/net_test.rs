use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use tokio::sync::mpsc;
use tokio::time::timeout;

use osckit::encrypt::Keypair;
use osckit::handshake::Handshake;
use osckit::server::{OscServer, ServerConfig};
use osckit::slip;
use osckit::{encoder, ClientConfig, OscClient, OscMessage, OscPacket, OscValue, ReplyEndpoint};

const WAIT: Duration = Duration::from_secs(5);

type Delivery = (OscPacket, ReplyEndpoint);

fn test_config() -> ServerConfig {
    ServerConfig {
        port: 0,
        ..ServerConfig::default()
    }
}

/// A server whose destination forwards every delivery into a channel.
async fn start_server(config: ServerConfig) -> (OscServer, mpsc::UnboundedReceiver<Delivery>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let destination = Arc::new(move |packet: OscPacket, reply: ReplyEndpoint| {
        tx.send((packet, reply)).ok();
    });
    let mut server = OscServer::new(config, destination);
    server.start_listening().await.expect("start_listening");
    (server, rx)
}

fn ping(n: i32) -> OscPacket {
    OscPacket::Message(OscMessage {
        addr: "/ping".to_string(),
        args: vec![OscValue::Int(n)],
    })
}

#[tokio::test]
async fn udp_round_trip() {
    let (mut server, mut inbox) = start_server(test_config()).await;
    let port = server.udp_addr().unwrap().port();

    let mut client = OscClient::new(ClientConfig {
        host: "127.0.0.1".to_string(),
        port,
        ..ClientConfig::default()
    });
    client.connect().await.unwrap();
    client.send_packet(&ping(7)).await.unwrap();

    let (packet, reply) = timeout(WAIT, inbox.recv()).await.unwrap().unwrap();
    assert_eq!(packet, ping(7));
    assert!(reply.transport().is_datagram());

    // The reply goes back to the datagram's source port.
    reply.reply(&ping(8)).await.unwrap();
    let answer = timeout(WAIT, client.recv_packet()).await.unwrap().unwrap();
    assert_eq!(answer, ping(8));

    server.stop_listening().await;
}

#[tokio::test]
async fn udp_malformed_datagrams_are_counted_not_fatal() {
    let (mut server, mut inbox) = start_server(test_config()).await;
    let addr = server.udp_addr().unwrap();

    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    socket.send_to(b"not osc at all", addr).await.unwrap();
    socket
        .send_to(&encoder::encode(&ping(1)).unwrap(), addr)
        .await
        .unwrap();

    // The valid packet still arrives, the garbage is only counted.
    let (packet, _) = timeout(WAIT, inbox.recv()).await.unwrap().unwrap();
    assert_eq!(packet, ping(1));
    assert_eq!(server.dropped_datagrams(), 1);

    server.stop_listening().await;
}

#[tokio::test]
async fn tcp_round_trip_preserves_order() {
    let (mut server, mut inbox) = start_server(test_config()).await;
    let port = server.tcp_addr().unwrap().port();

    let mut client = OscClient::new(ClientConfig {
        host: "127.0.0.1".to_string(),
        port,
        use_tcp: true,
        ..ClientConfig::default()
    });
    client.connect().await.unwrap();

    for n in 0..8 {
        client.send_packet(&ping(n)).await.unwrap();
    }
    for n in 0..8 {
        let (packet, reply) = timeout(WAIT, inbox.recv()).await.unwrap().unwrap();
        assert_eq!(packet, ping(n), "stream packets must arrive in order");
        assert!(reply.transport().is_stream());
    }

    server.stop_listening().await;
}

#[tokio::test]
async fn tcp_reply_goes_back_over_the_stream() {
    let (mut server, mut inbox) = start_server(test_config()).await;
    let port = server.tcp_addr().unwrap().port();

    let mut client = OscClient::new(ClientConfig {
        host: "127.0.0.1".to_string(),
        port,
        use_tcp: true,
        ..ClientConfig::default()
    });
    client.connect().await.unwrap();
    client.send_packet(&ping(1)).await.unwrap();

    let (_, reply) = timeout(WAIT, inbox.recv()).await.unwrap().unwrap();
    reply.reply(&ping(2)).await.unwrap();

    let answer = timeout(WAIT, client.recv_packet()).await.unwrap().unwrap();
    assert_eq!(answer, ping(2));

    server.stop_listening().await;
}

struct NotifyingDestination {
    closed: mpsc::UnboundedSender<SocketAddr>,
}

impl osckit::PacketDestination for NotifyingDestination {
    fn take_packet(&self, _packet: OscPacket, _reply: ReplyEndpoint) {}

    fn connection_closed(&self, peer: SocketAddr) {
        self.closed.send(peer).ok();
    }
}

#[tokio::test]
async fn tcp_malformed_frame_drops_the_connection() {
    let (closed_tx, mut closed_rx) = mpsc::unbounded_channel();
    let mut server = OscServer::new(
        test_config(),
        Arc::new(NotifyingDestination { closed: closed_tx }),
    );
    server.start_listening().await.unwrap();
    let addr = server.tcp_addr().unwrap();

    let mut stream = TcpStream::connect(addr).await.unwrap();
    let local = stream.local_addr().unwrap();
    stream
        .write_all(&slip::encode_frame(b"garbage, not a packet"))
        .await
        .unwrap();

    // The server hangs up on us; reads drain to EOF.
    let mut buf = [0u8; 64];
    let eof = timeout(WAIT, async {
        loop {
            if stream.read(&mut buf).await.unwrap() == 0 {
                break;
            }
        }
    })
    .await;
    assert!(eof.is_ok(), "server should close a misbehaving stream");

    // The higher layer hears about the disconnect exactly once.
    let peer = timeout(WAIT, closed_rx.recv()).await.unwrap().unwrap();
    assert_eq!(peer, local);

    server.stop_listening().await;
}

#[tokio::test]
async fn encrypted_session_end_to_end() {
    let config = ServerConfig {
        keypair: Some(Keypair::from_bytes([41; 32])),
        ..test_config()
    };
    let (mut server, mut inbox) = start_server(config).await;
    let port = server.tcp_addr().unwrap().port();

    let mut client = OscClient::new(ClientConfig {
        host: "127.0.0.1".to_string(),
        port,
        use_tcp: true,
        ..ClientConfig::default()
    });
    client.connect().await.unwrap();
    client
        .start_encryption(Keypair::from_bytes([42; 32]))
        .await
        .unwrap();
    assert!(client.is_encrypting());

    // Application traffic flows sealed in both directions, and the
    // handshake itself never reached the destination.
    client.send_packet(&ping(5)).await.unwrap();
    let (packet, reply) = timeout(WAIT, inbox.recv()).await.unwrap().unwrap();
    assert_eq!(packet, ping(5));
    assert!(reply.transport().is_encrypting());

    reply.reply(&ping(6)).await.unwrap();
    let answer = timeout(WAIT, client.recv_packet()).await.unwrap().unwrap();
    assert_eq!(answer, ping(6));

    assert!(inbox.try_recv().is_err());

    server.stop_listening().await;
}

#[tokio::test]
async fn stalled_handshake_times_out() {
    let config = ServerConfig {
        keypair: Some(Keypair::from_bytes([41; 32])),
        handshake_timeout: Duration::from_millis(200),
        ..test_config()
    };
    let (mut server, _inbox) = start_server(config).await;
    let addr = server.tcp_addr().unwrap();

    // Send a bare request and then go silent: never begin.
    let mut hs = Handshake::new(Keypair::from_bytes([42; 32]));
    let request = encoder::encode(&OscPacket::Message(hs.request_message().unwrap())).unwrap();

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(&slip::encode_frame(&request))
        .await
        .unwrap();

    // The approval arrives, then the server gives up on us.
    let mut buf = [0u8; 256];
    let eof = timeout(WAIT, async {
        loop {
            if stream.read(&mut buf).await.unwrap() == 0 {
                break;
            }
        }
    })
    .await;
    assert!(eof.is_ok(), "server should close a stalled handshake");

    server.stop_listening().await;
}

#[tokio::test]
async fn handshake_without_server_keypair_closes_the_stream() {
    let (mut server, _inbox) = start_server(test_config()).await;
    let addr = server.tcp_addr().unwrap();

    let mut hs = Handshake::new(Keypair::from_bytes([42; 32]));
    let request = encoder::encode(&OscPacket::Message(hs.request_message().unwrap())).unwrap();

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(&slip::encode_frame(&request))
        .await
        .unwrap();

    let mut buf = [0u8; 64];
    let eof = timeout(WAIT, async {
        loop {
            if stream.read(&mut buf).await.unwrap() == 0 {
                break;
            }
        }
    })
    .await;
    assert!(eof.is_ok(), "server without a keypair should refuse encryption");

    server.stop_listening().await;
}
