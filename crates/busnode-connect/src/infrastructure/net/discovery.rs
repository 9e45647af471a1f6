//! Multicast discovery transport.
//!
//! [`DiscoveryMessenger`] owns every socket a discovery session needs and
//! nothing else: it does not know what a query or a reply looks like.  The
//! caller serializes into [`DiscoveryMessenger::tx_buffer_mut`], calls
//! [`DiscoveryMessenger::send`], then reads replies with
//! [`DiscoveryMessenger::recv`].
//!
//! # Sockets (for beginners)
//!
//! | socket      | bound to                | used for                          |
//! |-------------|-------------------------|-----------------------------------|
//! | reply v4/v6 | any address, any port   | unicast replies to our queries    |
//! | mDNS v4/v6  | port 5353, group joined | sending mDNS queries, hearing peers|
//! | bus v4/v6   | configured port         | legacy bus-discovery queries      |
//!
//! Routing nodes learn where to send their unicast reply from the
//! `sender-info` record of each mDNS query.  Because one query leaves through
//! several interfaces, the record is rewritten before every copy (see
//! [`busnode_core::rewrite_sender_info`]).
//!
//! The bus sockets are only opened when the caller still accepts routing
//! nodes older than protocol version 10; newer nodes answer mDNS only.

use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV6, UdpSocket};
use std::os::unix::io::{AsRawFd, RawFd};
use std::time::{Duration, Instant};

use busnode_core::protocol::constants::{
    BUS_DISCOVERY_GROUP_V4, BUS_DISCOVERY_GROUP_V6, BUS_DISCOVERY_PORT, DISCOVERY_RX_BUFFER_SIZE,
    DISCOVERY_TX_BUFFER_SIZE, LEGACY_BUS_DISCOVERY_MAX_VERSION, MDNS_GROUP_V4, MDNS_GROUP_V6,
    MDNS_PORT,
};
use busnode_core::{rewrite_sender_info, IoBuffer, PacketFamily, ReceivedPacket};
use socket2::{Domain, Protocol, Socket, Type};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::interfaces::{broadcast_targets, choose_reply_address, InterfaceSource};
use super::interrupt::{InterruptHandle, InterruptSignal};
use super::readiness::{wait_readable, WaitOutcome};
use crate::application::discovery_sweep::{DiscoveryChannel, DiscoveryRecv, SendReport};

/// Settings for one discovery session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryConfig {
    /// Oldest routing-node protocol version the caller accepts.
    pub min_protocol_version: u32,
    /// Local port for the bus-discovery sockets; 0 lets the OS choose.
    pub bus_bind_port: u16,
    /// Open the IPv6 counterparts of every socket.
    pub enable_ipv6: bool,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            min_protocol_version: 0,
            bus_bind_port: 0,
            enable_ipv6: true,
        }
    }
}

/// Errors returned by [`DiscoveryMessenger`].
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The mandatory IPv4 reply socket could not be opened.
    #[error("failed to open discovery reply socket: {0}")]
    ReplySocket(#[source] io::Error),

    /// No up, running, non-loopback IPv4 address to advertise.
    #[error("no usable local address for discovery replies")]
    NoReplyAddress,

    /// Neither an mDNS nor a bus-discovery socket could be opened.
    #[error("no multicast discovery socket could be opened")]
    NoMulticastSocket,

    /// Not a single copy of the query reached the wire.
    #[error("{family} query could not be sent ({failed} transmissions failed)")]
    SendFailed { family: PacketFamily, failed: usize },

    /// Every ready socket failed to deliver its datagram.
    #[error("discovery receive failed: {0}")]
    Read(#[source] io::Error),

    /// The readiness wait or the wake channel failed.
    #[error("discovery wait failed: {0}")]
    Wait(#[source] io::Error),
}

/// A UDP socket bound to a multicast port, remembering whether it joined its
/// group.
#[derive(Debug)]
struct GroupSocket {
    socket: UdpSocket,
    group: IpAddr,
    joined: bool,
}

impl GroupSocket {
    fn leave(&mut self) {
        if !self.joined {
            return;
        }
        let result = match self.group {
            IpAddr::V4(group) => self.socket.leave_multicast_v4(&group, &Ipv4Addr::UNSPECIFIED),
            IpAddr::V6(group) => self.socket.leave_multicast_v6(&group, 0),
        };
        if let Err(e) = result {
            debug!("leaving {} failed: {e}", self.group);
        }
        self.joined = false;
    }
}

/// The socket set of one discovery session.
///
/// Created by [`up`](Self::up); released by [`down`](Self::down) or on drop.
pub struct DiscoveryMessenger {
    reply_v4: UdpSocket,
    reply_v6: Option<UdpSocket>,
    mdns_v4: Option<GroupSocket>,
    mdns_v6: Option<GroupSocket>,
    bus_v4: Option<GroupSocket>,
    bus_v6: Option<GroupSocket>,
    /// Address advertised in the sender-info record of IPv4 queries.
    reply_addr: SocketAddr,
    interfaces: Box<dyn InterfaceSource + Send>,
    rx: IoBuffer,
    tx: IoBuffer,
    interrupt: InterruptSignal,
}

impl DiscoveryMessenger {
    /// Opens the sockets for one discovery session.
    ///
    /// # Errors
    ///
    /// - [`DiscoveryError::ReplySocket`] if the IPv4 reply socket fails.
    /// - [`DiscoveryError::NoReplyAddress`] if no interface has a usable IPv4
    ///   address.
    /// - [`DiscoveryError::NoMulticastSocket`] if every multicast socket fails.
    /// - [`DiscoveryError::Wait`] if the wake channel cannot be created.
    pub fn up(
        config: DiscoveryConfig,
        interfaces: Box<dyn InterfaceSource + Send>,
    ) -> Result<Self, DiscoveryError> {
        let reply_v4 = UdpSocket::from(
            open_udp(SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)))
                .map_err(DiscoveryError::ReplySocket)?,
        );
        let reply_v6 = if config.enable_ipv6 {
            open_udp(SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0)))
                .map(UdpSocket::from)
                .map_err(|e| debug!("no IPv6 reply socket: {e}"))
                .ok()
        } else {
            None
        };

        let reply_ip =
            choose_reply_address(&*interfaces, false).ok_or(DiscoveryError::NoReplyAddress)?;
        let reply_port = reply_v4
            .local_addr()
            .map_err(DiscoveryError::ReplySocket)?
            .port();
        let reply_addr = SocketAddr::new(reply_ip, reply_port);

        let mdns_v4 = open_logged(open_group_v4(MDNS_GROUP_V4, MDNS_PORT), "mDNS IPv4");
        let mdns_v6 = if config.enable_ipv6 {
            open_logged(open_group_v6(MDNS_GROUP_V6, MDNS_PORT), "mDNS IPv6")
        } else {
            None
        };

        let legacy = config.min_protocol_version < LEGACY_BUS_DISCOVERY_MAX_VERSION;
        let bus_v4 = if legacy {
            open_logged(
                open_group_v4(BUS_DISCOVERY_GROUP_V4, config.bus_bind_port),
                "bus-discovery IPv4",
            )
        } else {
            None
        };
        let bus_v6 = if legacy && config.enable_ipv6 {
            open_logged(
                open_group_v6(BUS_DISCOVERY_GROUP_V6, config.bus_bind_port),
                "bus-discovery IPv6",
            )
        } else {
            None
        };

        if mdns_v4.is_none() && mdns_v6.is_none() && bus_v4.is_none() && bus_v6.is_none() {
            error!("discovery up failed: no multicast socket");
            return Err(DiscoveryError::NoMulticastSocket);
        }

        let interrupt = InterruptSignal::new().map_err(DiscoveryError::Wait)?;

        info!(
            "discovery messenger up: replies to {reply_addr}, mDNS v4={} v6={}, bus v4={} v6={}",
            mdns_v4.is_some(),
            mdns_v6.is_some(),
            bus_v4.is_some(),
            bus_v6.is_some()
        );

        Ok(Self {
            reply_v4,
            reply_v6,
            mdns_v4,
            mdns_v6,
            bus_v4,
            bus_v6,
            reply_addr,
            interfaces,
            rx: IoBuffer::rx(DISCOVERY_RX_BUFFER_SIZE),
            tx: IoBuffer::tx(DISCOVERY_TX_BUFFER_SIZE),
            interrupt,
        })
    }

    /// Leaves every joined group and closes all sockets.
    pub fn down(mut self) {
        self.leave_groups();
        info!("discovery messenger down");
    }

    /// Buffer the next query is serialized into.
    pub fn tx_buffer_mut(&mut self) -> &mut IoBuffer {
        &mut self.tx
    }

    /// The packet delivered by the last successful [`recv`](Self::recv).
    pub fn rx_buffer(&self) -> &IoBuffer {
        &self.rx
    }

    /// Address advertised to routing nodes in IPv4 queries.
    pub fn reply_addr(&self) -> SocketAddr {
        self.reply_addr
    }

    pub fn interrupt_handle(&self) -> InterruptHandle {
        self.interrupt.handle()
    }

    /// Sends the transmit buffer as a `family` query, then clears the buffer.
    ///
    /// An empty buffer sends nothing.  An mDNS packet whose sender-info record
    /// cannot be rewritten is dropped and reported in
    /// [`SendReport::dropped`].
    ///
    /// # Errors
    ///
    /// [`DiscoveryError::SendFailed`] if not a single transmission succeeded.
    pub fn send(&mut self, family: PacketFamily) -> Result<SendReport, DiscoveryError> {
        if self.tx.is_empty() {
            return Ok(SendReport::default());
        }
        let outcome = match family {
            PacketFamily::BusDiscovery => Some(self.send_bus()),
            PacketFamily::Mdns => self.send_mdns(),
        };
        self.tx.reset();

        let Some(report) = outcome else {
            return Ok(SendReport {
                dropped: 1,
                ..SendReport::default()
            });
        };
        if report.sent == 0 {
            error!("{family} query: every transmission failed");
            return Err(DiscoveryError::SendFailed {
                family,
                failed: report.failed,
            });
        }
        debug!("{family} query sent: {report:?}");
        Ok(report)
    }

    fn send_bus(&mut self) -> SendReport {
        let mut report = SendReport::default();
        let packet = self.tx.readable();
        if let Some(bus) = &self.bus_v4 {
            let dest = SocketAddr::from((BUS_DISCOVERY_GROUP_V4, BUS_DISCOVERY_PORT));
            transmit(&bus.socket, packet, dest, &mut report);
        }
        if let Some(bus) = &self.bus_v6 {
            let dest = SocketAddr::V6(SocketAddrV6::new(BUS_DISCOVERY_GROUP_V6, BUS_DISCOVERY_PORT, 0, 0));
            transmit(&bus.socket, packet, dest, &mut report);
        }
        report
    }

    /// `None` means the packet was dropped before anything was sent.
    fn send_mdns(&mut self) -> Option<SendReport> {
        if let Err(e) = rewrite_sender_info(&mut self.tx, self.reply_addr) {
            warn!("dropping mDNS query, sender-info rewrite failed: {e}");
            return None;
        }
        let mut report = SendReport::default();
        let reply_port = self.reply_addr.port();

        if let Some(mdns) = &self.mdns_v4 {
            let group = SocketAddr::from((MDNS_GROUP_V4, MDNS_PORT));
            transmit(&mdns.socket, self.tx.readable(), group, &mut report);

            match broadcast_targets(&*self.interfaces) {
                Ok(targets) => broadcast_fanout(&mut self.tx, &targets, reply_port, &mut report, |p, d| {
                    mdns.socket.send_to(p, d)
                }),
                Err(e) => warn!("broadcast fanout skipped, interface enumeration failed: {e}"),
            }
        }

        if let Some(mdns) = &self.mdns_v6 {
            let port = self
                .reply_v6
                .as_ref()
                .and_then(|s| s.local_addr().ok())
                .map_or(reply_port, |a| a.port());
            match choose_reply_address(&*self.interfaces, true) {
                Some(ip) => match rewrite_sender_info(&mut self.tx, SocketAddr::new(ip, port)) {
                    Ok(()) => {
                        let group = SocketAddr::V6(SocketAddrV6::new(MDNS_GROUP_V6, MDNS_PORT, 0, 0));
                        transmit(&mdns.socket, self.tx.readable(), group, &mut report);
                    }
                    Err(e) => {
                        warn!("skipping IPv6 mDNS query: {e}");
                        report.dropped += 1;
                    }
                },
                None => debug!("no usable IPv6 address, IPv6 mDNS query skipped"),
            }
        }

        Some(report)
    }

    /// Waits up to `timeout` for one discovery packet.
    ///
    /// The receive buffer is cleared first; on
    /// [`DiscoveryRecv::Packet`] it holds exactly the received datagram.
    ///
    /// A datagram that fills the whole receive buffer may have been cut short
    /// by the kernel.  It is dropped and the wait goes on for the time left.
    ///
    /// # Errors
    ///
    /// - [`DiscoveryError::Wait`] if the readiness wait fails.
    /// - [`DiscoveryError::Read`] if every ready socket fails to deliver.
    pub fn recv(&mut self, timeout: Duration) -> Result<DiscoveryRecv, DiscoveryError> {
        let deadline = Instant::now().checked_add(timeout);
        loop {
            let remaining = deadline.map_or(timeout, |d| d.saturating_duration_since(Instant::now()));
            if let Some(outcome) = self.recv_once(remaining)? {
                return Ok(outcome);
            }
            if remaining.is_zero() {
                return Ok(DiscoveryRecv::TimedOut);
            }
        }
    }

    /// One readiness wait and one read.  `None` means only oversized
    /// datagrams were ready.
    fn recv_once(&mut self, timeout: Duration) -> Result<Option<DiscoveryRecv>, DiscoveryError> {
        self.rx.reset();
        let room = self.rx.capacity();

        let sockets: Vec<(&UdpSocket, PacketFamily)> = [
            (Some(&self.reply_v4), PacketFamily::Mdns),
            (self.reply_v6.as_ref(), PacketFamily::Mdns),
            (self.bus_v6.as_ref().map(|g| &g.socket), PacketFamily::BusDiscovery),
            (self.bus_v4.as_ref().map(|g| &g.socket), PacketFamily::BusDiscovery),
            (self.mdns_v4.as_ref().map(|g| &g.socket), PacketFamily::Mdns),
            (self.mdns_v6.as_ref().map(|g| &g.socket), PacketFamily::Mdns),
        ]
        .into_iter()
        .filter_map(|(socket, family)| socket.map(|s| (s, family)))
        .collect();
        let fds: Vec<RawFd> = sockets.iter().map(|(s, _)| s.as_raw_fd()).collect();

        let ready = match wait_readable(&fds, &self.interrupt, timeout).map_err(DiscoveryError::Wait)? {
            WaitOutcome::Ready(ready) => ready,
            WaitOutcome::TimedOut => return Ok(Some(DiscoveryRecv::TimedOut)),
            WaitOutcome::Interrupted => {
                debug!("discovery receive interrupted");
                return Ok(Some(DiscoveryRecv::Interrupted));
            }
        };

        let mut last_error = None;
        let mut dropped_oversized = false;
        for index in ready.iter() {
            let (socket, family) = sockets[index];
            match socket.recv_from(self.rx.spare_mut()) {
                Ok((len, source)) if len >= room => {
                    warn!("dropping {family} datagram from {source}: does not fit {room} byte buffer");
                    dropped_oversized = true;
                }
                Ok((len, source)) => {
                    self.rx.commit(len);
                    debug!("received {len} byte {family} packet from {source}");
                    let packet = ReceivedPacket::new(family, len, Some(source));
                    return Ok(Some(DiscoveryRecv::Packet(packet)));
                }
                Err(e) => {
                    warn!("{family} socket receive failed: {e}");
                    last_error = Some(e);
                }
            }
        }
        if dropped_oversized {
            return Ok(None);
        }
        Err(DiscoveryError::Read(
            last_error.unwrap_or_else(|| io::Error::from(io::ErrorKind::WouldBlock)),
        ))
    }

    fn leave_groups(&mut self) {
        for group in [&mut self.mdns_v4, &mut self.mdns_v6, &mut self.bus_v4, &mut self.bus_v6]
            .into_iter()
            .flatten()
        {
            group.leave();
        }
    }
}

impl Drop for DiscoveryMessenger {
    fn drop(&mut self) {
        self.leave_groups();
    }
}

impl DiscoveryChannel for DiscoveryMessenger {
    type Error = DiscoveryError;

    fn query_families(&self) -> Vec<PacketFamily> {
        let mut families = Vec::with_capacity(2);
        if self.bus_v4.is_some() || self.bus_v6.is_some() {
            families.push(PacketFamily::BusDiscovery);
        }
        if self.mdns_v4.is_some() || self.mdns_v6.is_some() {
            families.push(PacketFamily::Mdns);
        }
        families
    }

    fn tx_buffer_mut(&mut self) -> &mut IoBuffer {
        DiscoveryMessenger::tx_buffer_mut(self)
    }

    fn send(&mut self, family: PacketFamily) -> Result<SendReport, DiscoveryError> {
        DiscoveryMessenger::send(self, family)
    }

    fn recv(&mut self, timeout: Duration) -> Result<DiscoveryRecv, DiscoveryError> {
        DiscoveryMessenger::recv(self, timeout)
    }

    fn rx_buffer(&self) -> &IoBuffer {
        DiscoveryMessenger::rx_buffer(self)
    }
}

// ── Socket setup ──────────────────────────────────────────────────────────────

/// Binds a UDP socket with `SO_REUSEADDR`; IPv6 sockets are v6-only.
fn open_udp(bind: SocketAddr) -> io::Result<Socket> {
    let socket = Socket::new(Domain::for_address(bind), Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    if bind.is_ipv6() {
        socket.set_only_v6(true)?;
    }
    socket.bind(&bind.into())?;
    Ok(socket)
}

/// IPv4 multicast socket.  A failed join is tolerated because broadcast
/// still reaches the subnet.
fn open_group_v4(group: Ipv4Addr, port: u16) -> io::Result<GroupSocket> {
    let socket = open_udp(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)))?;
    socket.set_broadcast(true)?;
    let joined = match socket.join_multicast_v4(&group, &Ipv4Addr::UNSPECIFIED) {
        Ok(()) => true,
        Err(e) => {
            warn!("could not join {group}, relying on broadcast: {e}");
            false
        }
    };
    Ok(GroupSocket {
        socket: socket.into(),
        group: IpAddr::V4(group),
        joined,
    })
}

/// IPv6 multicast socket.  Without group membership it is useless.
fn open_group_v6(group: Ipv6Addr, port: u16) -> io::Result<GroupSocket> {
    let socket = open_udp(SocketAddr::from((Ipv6Addr::UNSPECIFIED, port)))?;
    socket.join_multicast_v6(&group, 0)?;
    Ok(GroupSocket {
        socket: socket.into(),
        group: IpAddr::V6(group),
        joined: true,
    })
}

fn open_logged(result: io::Result<GroupSocket>, what: &str) -> Option<GroupSocket> {
    match result {
        Ok(socket) => Some(socket),
        Err(e) => {
            warn!("{what} discovery socket unavailable: {e}");
            None
        }
    }
}

/// Sends one mDNS copy to each `(local, broadcast)` target.  Every copy's
/// sender-info names that interface's address with `reply_port`; a copy whose
/// record cannot be rewritten is counted as dropped.
fn broadcast_fanout(
    tx: &mut IoBuffer,
    targets: &[(Ipv4Addr, Ipv4Addr)],
    reply_port: u16,
    report: &mut SendReport,
    mut send_to: impl FnMut(&[u8], SocketAddr) -> io::Result<usize>,
) {
    for &(local, broadcast) in targets {
        if let Err(e) = rewrite_sender_info(tx, SocketAddr::from((local, reply_port))) {
            warn!("skipping broadcast to {broadcast}: {e}");
            report.dropped += 1;
            continue;
        }
        let dest = SocketAddr::from((broadcast, MDNS_PORT));
        let packet = tx.readable();
        tally(send_to(packet, dest), packet.len(), dest, report);
    }
}

/// Sends one datagram and tallies the result.
fn transmit(socket: &UdpSocket, packet: &[u8], dest: SocketAddr, report: &mut SendReport) {
    tally(socket.send_to(packet, dest), packet.len(), dest, report);
}

fn tally(result: io::Result<usize>, len: usize, dest: SocketAddr, report: &mut SendReport) {
    match result {
        Ok(n) if n == len => report.sent += 1,
        Ok(n) => {
            warn!("short send to {dest}: {n} of {len} bytes");
            report.failed += 1;
        }
        Err(e) => {
            warn!("send to {dest} failed: {e}");
            report.failed += 1;
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
