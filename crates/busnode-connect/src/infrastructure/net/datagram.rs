//! Reliable-datagram collaborator seam.
//!
//! The reliable-datagram protocol (ordering, retransmission, windowing) is not
//! implemented here.  This module provides what such a protocol needs from the
//! connection layer and nothing more:
//!
//! - [`DatagramLink`]: a UDP socket already connected to the routing node,
//!   with a single-datagram send and an interruptible, bounded receive.
//! - [`ReliableDatagram`]: the collaborator that runs the opening handshake
//!   over a link and returns a [`DatagramSession`].
//! - [`DatagramSession`]: the established session the
//!   [`super::connector::Connection`] hands application bytes to.
//!
//! ```text
//! TransportConnector ──open──▶ DatagramLink ──handshake──▶ Box<dyn DatagramSession>
//! ```

use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};
use std::os::unix::io::AsRawFd;
use std::time::Duration;

use busnode_core::IoBuffer;
use thiserror::Error;

use super::interrupt::{InterruptHandle, InterruptSignal};
use super::readiness::{wait_readable, WaitOutcome};
use super::socket_io::{Received, TransportError};

/// Why a reliable-datagram handshake did not produce a session.
#[derive(Debug, Error)]
pub enum HandshakeError {
    /// The peer answered but refused the session.
    #[error("peer rejected the handshake: {0}")]
    Rejected(String),

    #[error("handshake timed out")]
    TimedOut,

    #[error("handshake interrupted")]
    Interrupted,

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Result of one bounded receive on a [`DatagramLink`].
#[derive(Debug, PartialEq, Eq)]
pub enum LinkRecv<'a> {
    /// One datagram, borrowed from the link's segment buffer.
    Data(&'a [u8]),
    TimedOut,
    Interrupted,
}

/// A UDP socket connected to one routing node.
#[derive(Debug)]
pub struct DatagramLink {
    socket: UdpSocket,
    peer: SocketAddr,
    interrupt: InterruptSignal,
    segment: Vec<u8>,
}

impl DatagramLink {
    /// Binds an ephemeral local port of `peer`'s family and connects it to
    /// `peer`.
    ///
    /// # Errors
    ///
    /// Returns the OS error if the bind or connect fails.
    pub fn open(peer: SocketAddr, segment_size: usize, interrupt: InterruptSignal) -> io::Result<Self> {
        let local = match peer {
            SocketAddr::V4(_) => SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)),
            SocketAddr::V6(_) => SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0)),
        };
        let socket = UdpSocket::bind(local)?;
        socket.connect(peer)?;
        Ok(Self {
            socket,
            peer,
            interrupt,
            segment: vec![0; segment_size],
        })
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Largest datagram [`recv`](Self::recv) can return.
    pub fn segment_size(&self) -> usize {
        self.segment.len()
    }

    pub fn interrupt_handle(&self) -> InterruptHandle {
        self.interrupt.handle()
    }

    /// Sends `datagram` to the peer in one system call.
    ///
    /// # Errors
    ///
    /// [`TransportError::Write`] if the call fails.
    pub fn send(&self, datagram: &[u8]) -> Result<usize, TransportError> {
        self.socket.send(datagram).map_err(TransportError::Write)
    }

    /// Waits up to `timeout` for one datagram from the peer.
    ///
    /// # Errors
    ///
    /// - [`TransportError::Wait`] if the readiness wait fails.
    /// - [`TransportError::Read`] if the receive fails, e.g. because the peer
    ///   port is closed.
    pub fn recv(&mut self, timeout: Duration) -> Result<LinkRecv<'_>, TransportError> {
        match wait_readable(&[self.socket.as_raw_fd()], &self.interrupt, timeout)
            .map_err(TransportError::Wait)?
        {
            WaitOutcome::Ready(_) => {}
            WaitOutcome::TimedOut => return Ok(LinkRecv::TimedOut),
            WaitOutcome::Interrupted => return Ok(LinkRecv::Interrupted),
        }
        let n = self
            .socket
            .recv(&mut self.segment)
            .map_err(TransportError::Read)?;
        Ok(LinkRecv::Data(&self.segment[..n]))
    }
}

/// Runs the reliable-datagram opening handshake.
pub trait ReliableDatagram: Send {
    /// Negotiates a session over `link`.  The link stays owned by the
    /// connection; the session only borrows it per call.
    fn handshake(&mut self, link: &mut DatagramLink) -> Result<Box<dyn DatagramSession>, HandshakeError>;
}

/// An established reliable-datagram session.
pub trait DatagramSession: Send {
    /// Queues `data` for reliable delivery and returns how much was accepted.
    fn send(&mut self, link: &mut DatagramLink, data: &[u8]) -> Result<usize, TransportError>;

    /// Appends at most `max_len` in-order bytes to `rx`, waiting up to
    /// `timeout`.
    fn receive(
        &mut self,
        link: &mut DatagramLink,
        rx: &mut IoBuffer,
        max_len: usize,
        timeout: Duration,
    ) -> Result<Received, TransportError>;

    /// Tears the session down.  Called once, before the link is closed.
    fn close(&mut self, link: &mut DatagramLink);
}

// ── Tests ─────────────────────────────────────────────────────────────────────
