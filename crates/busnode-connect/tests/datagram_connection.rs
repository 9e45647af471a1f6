//! Integration tests for the reliable-datagram path with a fake collaborator.
//!
//! # Purpose
//!
//! The reliable-datagram protocol lives outside this crate.  These tests plug
//! a tiny stand-in into [`TransportConnector`] and check the connector's side
//! of the contract:
//!
//! - A successful handshake yields a `ReliableDatagram` connection whose
//!   `send`/`receive` go through the session over the connected link.
//! - `disconnect` closes the session exactly once.
//! - A refused handshake falls back to the stream path when the candidate
//!   also advertises a stream endpoint, and is reported otherwise.
//!
//! # The stand-in protocol
//!
//! ```text
//! client                       peer thread
//! ──────                       ───────────
//! HELLO          ──────────▶
//!                ◀──────────   WELCOME  (or DENIED)
//! <payload>      ──────────▶
//!                ◀──────────   <payload echoed>
//! BYE            ──────────▶   exits
//! ```

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, TcpListener, UdpSocket};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use busnode_connect::infrastructure::net::connector::{
    ConnectConfig, ConnectError, TransportConnector, TransportKind,
};
use busnode_connect::infrastructure::net::datagram::{
    DatagramLink, DatagramSession, HandshakeError, LinkRecv, ReliableDatagram,
};
use busnode_connect::infrastructure::net::socket_io::{Received, TransportError};
use busnode_core::{AddressTypes, IoBuffer, RoutingCandidate};

// ── Fake collaborator ─────────────────────────────────────────────────────────

struct FakeReliable {
    closes: Arc<AtomicUsize>,
}

impl ReliableDatagram for FakeReliable {
    fn handshake(&mut self, link: &mut DatagramLink) -> Result<Box<dyn DatagramSession>, HandshakeError> {
        link.send(b"HELLO")?;
        match link.recv(Duration::from_secs(2))? {
            LinkRecv::Data(b"WELCOME") => Ok(Box::new(EchoSession {
                closes: Arc::clone(&self.closes),
            })),
            LinkRecv::Data(other) => Err(HandshakeError::Rejected(
                String::from_utf8_lossy(other).into_owned(),
            )),
            LinkRecv::TimedOut => Err(HandshakeError::TimedOut),
            LinkRecv::Interrupted => Err(HandshakeError::Interrupted),
        }
    }
}

struct EchoSession {
    closes: Arc<AtomicUsize>,
}

impl DatagramSession for EchoSession {
    fn send(&mut self, link: &mut DatagramLink, data: &[u8]) -> Result<usize, TransportError> {
        link.send(data)
    }

    fn receive(
        &mut self,
        link: &mut DatagramLink,
        rx: &mut IoBuffer,
        max_len: usize,
        timeout: Duration,
    ) -> Result<Received, TransportError> {
        match link.recv(timeout)? {
            LinkRecv::Data(bytes) => {
                let n = bytes.len().min(max_len).min(rx.space());
                rx.spare_mut()[..n].copy_from_slice(&bytes[..n]);
                rx.commit(n);
                Ok(Received::Bytes(n))
            }
            LinkRecv::TimedOut => Ok(Received::TimedOut),
            LinkRecv::Interrupted => Ok(Received::Interrupted),
        }
    }

    fn close(&mut self, link: &mut DatagramLink) {
        let _ = link.send(b"BYE");
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

// ── Peer ──────────────────────────────────────────────────────────────────────

/// Spawns a UDP peer that answers `HELLO` with `answer` and then echoes
/// datagrams until `BYE`.
fn spawn_peer(answer: &'static [u8]) -> (SocketAddrV4, JoinHandle<()>) {
    let socket = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).expect("bind peer");
    socket.set_read_timeout(Some(Duration::from_secs(3))).unwrap();
    let addr = match socket.local_addr().unwrap() {
        SocketAddr::V4(a) => a,
        SocketAddr::V6(_) => panic!("bound to an IPv4 address"),
    };
    let handle = thread::spawn(move || {
        let mut buf = [0u8; 256];
        while let Ok((n, from)) = socket.recv_from(&mut buf) {
            match &buf[..n] {
                b"HELLO" => {
                    let _ = socket.send_to(answer, from);
                }
                b"BYE" => break,
                payload => {
                    let _ = socket.send_to(payload, from);
                }
            }
        }
    });
    (addr, handle)
}

fn datagram_candidate(addr: SocketAddrV4) -> RoutingCandidate {
    RoutingCandidate {
        addr_types: AddressTypes::DATAGRAM_V4,
        datagram_v4: Some(addr),
        protocol_version: 12,
        ..RoutingCandidate::default()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[test]
fn test_handshake_success_yields_datagram_connection() {
    // Arrange
    let (peer_addr, peer) = spawn_peer(b"WELCOME");
    let closes = Arc::new(AtomicUsize::new(0));
    let mut connector = TransportConnector::new(ConnectConfig::default())
        .with_reliable_datagram(Box::new(FakeReliable { closes: Arc::clone(&closes) }));

    // Act
    let mut conn = connector
        .connect(&datagram_candidate(peer_addr))
        .expect("handshake succeeds");
    conn.tx_buffer_mut().extend_from_slice(b"ping").unwrap();
    conn.send().expect("send");
    let got = conn.receive(64, Duration::from_secs(2)).expect("receive");

    // Assert
    assert_eq!(conn.kind(), TransportKind::ReliableDatagram);
    assert_eq!(got, Received::Bytes(4));
    assert_eq!(conn.rx_buffer().readable(), b"ping");

    conn.disconnect();
    conn.disconnect();
    peer.join().unwrap();
    assert_eq!(closes.load(Ordering::SeqCst), 1, "session closed exactly once");
}

#[test]
fn test_refused_handshake_falls_back_to_stream() {
    // Arrange
    let (peer_addr, peer) = spawn_peer(b"DENIED");
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
    let SocketAddr::V4(stream_addr) = listener.local_addr().unwrap() else {
        panic!("bound to an IPv4 address");
    };
    let candidate = RoutingCandidate {
        addr_types: AddressTypes::DATAGRAM_V4 | AddressTypes::STREAM_V4,
        stream_v4: Some(stream_addr),
        ..datagram_candidate(peer_addr)
    };
    let closes = Arc::new(AtomicUsize::new(0));
    let mut connector = TransportConnector::new(ConnectConfig::default())
        .with_reliable_datagram(Box::new(FakeReliable { closes }));

    // Act
    let conn = connector.connect(&candidate).expect("stream fallback");

    // Assert
    assert_eq!(conn.kind(), TransportKind::Stream);
    assert_eq!(conn.peer_addr(), Some(SocketAddr::V4(stream_addr)));
    drop(peer);
}

#[test]
fn test_refused_handshake_without_stream_is_handshake_error() {
    let (peer_addr, _peer) = spawn_peer(b"DENIED");
    let mut connector = TransportConnector::new(ConnectConfig::default()).with_reliable_datagram(
        Box::new(FakeReliable { closes: Arc::new(AtomicUsize::new(0)) }),
    );

    let err = connector.connect(&datagram_candidate(peer_addr)).unwrap_err();

    match err {
        ConnectError::Handshake { addr, source } => {
            assert_eq!(addr, SocketAddr::V4(peer_addr));
            assert!(matches!(source, HandshakeError::Rejected(ref why) if why == "DENIED"));
        }
        other => panic!("expected a handshake error, got {other:?}"),
    }
}

#[test]
fn test_prefer_datagram_off_uses_stream() {
    // Arrange
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
    let SocketAddr::V4(stream_addr) = listener.local_addr().unwrap() else {
        panic!("bound to an IPv4 address");
    };
    let candidate = RoutingCandidate {
        addr_types: AddressTypes::DATAGRAM_V4 | AddressTypes::STREAM_V4,
        stream_v4: Some(stream_addr),
        datagram_v4: Some(stream_addr),
        protocol_version: 12,
        ..RoutingCandidate::default()
    };
    let config = ConnectConfig {
        prefer_datagram: false,
        ..ConnectConfig::default()
    };
    let closes = Arc::new(AtomicUsize::new(0));
    let mut connector =
        TransportConnector::new(config).with_reliable_datagram(Box::new(FakeReliable { closes }));

    // Act
    let conn = connector.connect(&candidate).expect("stream connect");

    // Assert
    assert_eq!(conn.kind(), TransportKind::Stream);
}
