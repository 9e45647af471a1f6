//! Transport setup to a chosen routing node.
//!
//! [`TransportConnector::connect`] turns one [`RoutingCandidate`] into a live
//! [`Connection`] over exactly one of two transports:
//!
//! - **Stream**: a TCP connection to the candidate's stream endpoint (IPv4
//!   preferred), bounded by the configured connect timeout.
//! - **Reliable datagram**: a connected UDP socket wrapped in a
//!   [`DatagramLink`], handed to the installed [`ReliableDatagram`]
//!   collaborator for its handshake.
//!
//! The datagram path is tried first when the candidate advertises it, a
//! collaborator is installed and the configuration allows it.  If it fails and
//! the candidate also advertises a stream endpoint, the stream path is tried.
//!
//! # Closing (for beginners)
//!
//! [`Connection::disconnect`] closes a stream *abortively*: `SO_LINGER` is set
//! to zero before the socket is closed, so the kernel drops unsent data and
//! resets the connection instead of lingering in `TIME_WAIT`.  The routing
//! node notices immediately and frees its slot.

use std::fmt;
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::os::unix::io::AsRawFd;
use std::time::Duration;

use busnode_core::protocol::constants::{
    DEFAULT_DATAGRAM_SEGMENT_SIZE, DEFAULT_RX_BUFFER_SIZE, DEFAULT_TX_BUFFER_SIZE,
};
use busnode_core::{IoBuffer, RoutingCandidate};
use socket2::{Domain, Protocol, SockRef, Socket, Type};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::datagram::{DatagramLink, DatagramSession, HandshakeError, ReliableDatagram};
use super::interrupt::{InterruptHandle, InterruptSignal};
use super::readiness::{wait_readable, WaitOutcome};
use super::socket_io::{recv_once, send_once, Received, TransportError};
use crate::application::connect_to_best::Connector;

/// Default bound on a stream connect.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Settings applied to every connection a [`TransportConnector`] opens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectConfig {
    pub connect_timeout: Duration,
    /// Capacity of the connection's receive buffer.
    pub rx_buffer_size: usize,
    /// Capacity of the connection's transmit buffer.
    pub tx_buffer_size: usize,
    /// Largest datagram a [`DatagramLink`] can receive.
    pub datagram_segment_size: usize,
    /// Try the reliable-datagram path before the stream path.
    pub prefer_datagram: bool,
}

impl Default for ConnectConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            rx_buffer_size: DEFAULT_RX_BUFFER_SIZE,
            tx_buffer_size: DEFAULT_TX_BUFFER_SIZE,
            datagram_segment_size: DEFAULT_DATAGRAM_SEGMENT_SIZE,
            prefer_datagram: true,
        }
    }
}

/// Which transport a [`Connection`] runs over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    Stream,
    ReliableDatagram,
}

/// Why a connection to one candidate could not be established.
///
/// Every variant is fatal to that candidate only; the caller moves on to the
/// next one.
#[derive(Debug, Error)]
pub enum ConnectError {
    /// The candidate advertises no endpoint for the requested transport.
    #[error("candidate advertises no usable address")]
    NoUsableAddress,

    /// The reliable-datagram path was requested but no collaborator is
    /// installed.
    #[error("reliable-datagram transport not available")]
    DatagramUnsupported,

    #[error("failed to create socket: {0}")]
    Socket(#[source] std::io::Error),

    #[error("connect to {addr} failed: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// The last datagram endpoint tried refused the handshake.
    #[error("reliable-datagram handshake with {addr} failed: {source}")]
    Handshake {
        addr: SocketAddr,
        #[source]
        source: HandshakeError,
    },

    /// The connection's wake channel could not be created.
    #[error("failed to create interrupt channel: {0}")]
    Interrupt(#[source] std::io::Error),
}

/// Opens connections to routing-node candidates.
pub struct TransportConnector {
    config: ConnectConfig,
    reliable: Option<Box<dyn ReliableDatagram>>,
}

impl TransportConnector {
    /// Creates a connector with the stream path only.
    pub fn new(config: ConnectConfig) -> Self {
        Self {
            config,
            reliable: None,
        }
    }

    /// Installs the reliable-datagram collaborator.
    pub fn with_reliable_datagram(mut self, reliable: Box<dyn ReliableDatagram>) -> Self {
        self.reliable = Some(reliable);
        self
    }

    pub fn config(&self) -> &ConnectConfig {
        &self.config
    }

    /// Connects to `candidate` over the preferred available transport.
    ///
    /// # Errors
    ///
    /// Returns the [`ConnectError`] of the last path tried.
    pub fn connect(&mut self, candidate: &RoutingCandidate) -> Result<Connection, ConnectError> {
        let try_datagram = self.config.prefer_datagram
            && self.reliable.is_some()
            && candidate.advertises_datagram();

        if try_datagram {
            match self.connect_datagram(candidate) {
                Ok(connection) => return Ok(connection),
                Err(e) if candidate.advertises_stream() => {
                    warn!("reliable-datagram setup failed, falling back to stream: {e}");
                }
                Err(e) => return Err(e),
            }
        }
        self.connect_stream(candidate)
    }

    /// Connects to `candidate` over `kind` only.
    ///
    /// # Errors
    ///
    /// See [`ConnectError`].
    pub fn connect_with(
        &mut self,
        candidate: &RoutingCandidate,
        kind: TransportKind,
    ) -> Result<Connection, ConnectError> {
        match kind {
            TransportKind::Stream => self.connect_stream(candidate),
            TransportKind::ReliableDatagram => self.connect_datagram(candidate),
        }
    }

    fn connect_stream(&self, candidate: &RoutingCandidate) -> Result<Connection, ConnectError> {
        let addr = candidate
            .stream_endpoint()
            .ok_or(ConnectError::NoUsableAddress)?;

        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))
            .map_err(ConnectError::Socket)?;
        if let Err(source) = socket.connect_timeout(&addr.into(), self.config.connect_timeout) {
            error!("stream connect to {addr} failed: {source}");
            return Err(ConnectError::Connect { addr, source });
        }
        let stream = TcpStream::from(socket);
        let interrupt = InterruptSignal::new().map_err(ConnectError::Interrupt)?;

        info!("stream connection established to {addr}");
        Ok(Connection::open(
            Transport::Stream(stream),
            TransportKind::Stream,
            addr,
            interrupt,
            &self.config,
        ))
    }

    fn connect_datagram(&mut self, candidate: &RoutingCandidate) -> Result<Connection, ConnectError> {
        let Some(reliable) = self.reliable.as_mut() else {
            return Err(ConnectError::DatagramUnsupported);
        };

        let mut last_error = None;
        for peer in candidate.datagram_endpoints() {
            let interrupt = InterruptSignal::new().map_err(ConnectError::Interrupt)?;
            let mut link =
                match DatagramLink::open(peer, self.config.datagram_segment_size, interrupt.clone()) {
                    Ok(link) => link,
                    Err(e) => {
                        warn!("datagram socket to {peer} failed: {e}");
                        last_error = Some(ConnectError::Socket(e));
                        continue;
                    }
                };
            match reliable.handshake(&mut link) {
                Ok(session) => {
                    info!("reliable-datagram connection established to {peer}");
                    return Ok(Connection::open(
                        Transport::Datagram { link, session },
                        TransportKind::ReliableDatagram,
                        peer,
                        interrupt,
                        &self.config,
                    ));
                }
                Err(source) => {
                    error!("reliable-datagram handshake with {peer} failed: {source}");
                    last_error = Some(ConnectError::Handshake { addr: peer, source });
                }
            }
        }
        Err(last_error.unwrap_or(ConnectError::NoUsableAddress))
    }
}

impl Connector for TransportConnector {
    type Connection = Connection;
    type Error = ConnectError;

    fn connect(&mut self, candidate: &RoutingCandidate) -> Result<Connection, ConnectError> {
        TransportConnector::connect(self, candidate)
    }
}

enum Transport {
    Stream(TcpStream),
    Datagram {
        link: DatagramLink,
        session: Box<dyn DatagramSession>,
    },
}

/// A live connection to one routing node, with its directional buffers.
///
/// Dropping the connection disconnects it.
pub struct Connection {
    transport: Option<Transport>,
    kind: TransportKind,
    peer: Option<SocketAddr>,
    rx: IoBuffer,
    tx: IoBuffer,
    interrupt: Option<InterruptSignal>,
}

impl Connection {
    fn open(
        transport: Transport,
        kind: TransportKind,
        peer: SocketAddr,
        interrupt: InterruptSignal,
        config: &ConnectConfig,
    ) -> Self {
        Self {
            transport: Some(transport),
            kind,
            peer: Some(peer),
            rx: IoBuffer::rx(config.rx_buffer_size),
            tx: IoBuffer::tx(config.tx_buffer_size),
            interrupt: Some(interrupt),
        }
    }

    pub fn kind(&self) -> TransportKind {
        self.kind
    }

    /// The routing node's address; `None` once disconnected.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }

    pub fn is_open(&self) -> bool {
        self.transport.is_some()
    }

    /// Handle that aborts this connection's pending receive from another
    /// thread.  `None` once disconnected.
    pub fn interrupt_handle(&self) -> Option<InterruptHandle> {
        self.interrupt.as_ref().map(InterruptSignal::handle)
    }

    pub fn rx_buffer(&self) -> &IoBuffer {
        &self.rx
    }

    /// Receive buffer; the caller's parser consumes from it.
    pub fn rx_buffer_mut(&mut self) -> &mut IoBuffer {
        &mut self.rx
    }

    /// Transmit buffer; the caller's serializer appends to it.
    pub fn tx_buffer_mut(&mut self) -> &mut IoBuffer {
        &mut self.tx
    }

    /// Flushes pending transmit-buffer bytes with one send and returns how
    /// many were accepted.  Unaccepted bytes stay in the buffer.
    ///
    /// # Errors
    ///
    /// - [`TransportError::NotConnected`] after [`disconnect`](Self::disconnect).
    /// - Any I/O failure; the caller must then disconnect.
    pub fn send(&mut self) -> Result<usize, TransportError> {
        let transport = self.transport.as_mut().ok_or(TransportError::NotConnected)?;
        if self.tx.is_empty() {
            return Ok(0);
        }
        let result = match transport {
            Transport::Stream(stream) => send_once(&*stream, self.tx.readable()),
            Transport::Datagram { link, session } => session.send(link, self.tx.readable()),
        };
        match result {
            Ok(n) => {
                self.tx.consume(n);
                Ok(n)
            }
            Err(e) => {
                error!("send to {:?} failed: {e}", self.peer);
                Err(e)
            }
        }
    }

    /// Waits up to `timeout` and appends at most `max_len` received bytes to
    /// the receive buffer.
    ///
    /// # Errors
    ///
    /// - [`TransportError::NotConnected`] after [`disconnect`](Self::disconnect).
    /// - [`TransportError::Closed`] if the peer closed the stream.
    /// - Any I/O failure; the caller must then disconnect.
    pub fn receive(&mut self, max_len: usize, timeout: Duration) -> Result<Received, TransportError> {
        let transport = self.transport.as_mut().ok_or(TransportError::NotConnected)?;
        let interrupt = self.interrupt.as_ref().ok_or(TransportError::NotConnected)?;
        if self.rx.space() < max_len {
            self.rx.compact();
        }

        match transport {
            Transport::Stream(stream) => {
                match wait_readable(&[stream.as_raw_fd()], interrupt, timeout)
                    .map_err(TransportError::Wait)?
                {
                    WaitOutcome::Ready(_) => {}
                    WaitOutcome::TimedOut => return Ok(Received::TimedOut),
                    WaitOutcome::Interrupted => return Ok(Received::Interrupted),
                }
                let spare = self.rx.spare_mut();
                let want = max_len.min(spare.len());
                let n = recv_once(&*stream, &mut spare[..want])?;
                self.rx.commit(n);
                Ok(Received::Bytes(n))
            }
            Transport::Datagram { link, session } => {
                session.receive(link, &mut self.rx, max_len, timeout)
            }
        }
    }

    /// Closes the transport and zeroes the handle.  Safe to call any number
    /// of times.
    pub fn disconnect(&mut self) {
        if let Some(transport) = self.transport.take() {
            match transport {
                Transport::Stream(stream) => abortive_close(stream),
                Transport::Datagram {
                    mut link,
                    mut session,
                } => session.close(&mut link),
            }
            info!("connection to {:?} closed", self.peer);
        }
        self.interrupt = None;
        self.peer = None;
        self.rx = IoBuffer::rx(0);
        self.tx = IoBuffer::tx(0);
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("kind", &self.kind)
            .field("peer", &self.peer)
            .field("open", &self.is_open())
            .field("rx_available", &self.rx.available())
            .field("tx_available", &self.tx.available())
            .finish()
    }
}

/// Linger on with a zero timeout, shut both directions, close.
fn abortive_close(stream: TcpStream) {
    if let Err(e) = SockRef::from(&stream).set_linger(Some(Duration::ZERO)) {
        debug!("set_linger failed: {e}");
    }
    if let Err(e) = stream.shutdown(Shutdown::Both) {
        debug!("shutdown failed: {e}");
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
