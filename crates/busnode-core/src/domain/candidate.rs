//! Routing-node candidates and their ranking.
//!
//! A [`RoutingCandidate`] is built by the (external) discovery-response parser
//! from one reply packet.  It carries every endpoint the routing node
//! advertised plus the two numbers used to rank it:
//!
//! - `protocol_version` – the bus protocol version the node speaks.  A newer
//!   version always wins.
//! - `priority` – a score chosen by the routing node.  Among nodes speaking the
//!   same version, the **lower** score wins.
//!
//! # Why not derive `Ord` on the candidate? (for beginners)
//!
//! Two candidates can be "equally good" (same [`Rank`]) while still being
//! different nodes.  The registry needs both notions:
//!
//! - [`Rank`] answers "is this node *better* than that one?" and drives
//!   eviction: an equal rank never evicts.
//! - [`RoutingCandidate::preference_cmp`] answers "which one do I try first?"
//!   and must never return `Equal` for two distinct nodes, otherwise the
//!   selection order would depend on arrival order.  It breaks rank ties on the
//!   advertised endpoints, lowest address first, then on the transport mask.

use std::cmp::Ordering;
use std::net::{IpAddr, SocketAddr, SocketAddrV4, SocketAddrV6};
use std::ops::BitOr;

/// Bitmask of the transports a routing node advertised.
///
/// Bit values match the advertisement flags carried in discovery replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct AddressTypes(u8);

impl AddressTypes {
    /// No transport advertised.
    pub const NONE: Self = Self(0x00);
    /// Stream (TCP) over IPv4.
    pub const STREAM_V4: Self = Self(0x01);
    /// Stream (TCP) over IPv6.
    pub const STREAM_V6: Self = Self(0x02);
    /// Reliable datagram (UDP) over IPv4.
    pub const DATAGRAM_V4: Self = Self(0x04);
    /// Reliable datagram (UDP) over IPv6.
    pub const DATAGRAM_V6: Self = Self(0x08);
    /// Either stream family.
    pub const STREAM: Self = Self(0x03);
    /// Either datagram family.
    pub const DATAGRAM: Self = Self(0x0C);

    /// Builds a mask from raw advertisement bits, ignoring unknown bits.
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits & 0x0F)
    }

    /// Returns the raw bits.
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Returns `true` when every bit of `other` is set in `self`.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns `true` when at least one bit of `other` is set in `self`.
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }
}

impl BitOr for AddressTypes {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Total order over candidates: protocol version first, then priority score.
///
/// `a > b` means `a` outranks `b`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rank {
    pub protocol_version: u32,
    pub priority: u32,
}

impl Ord for Rank {
    fn cmp(&self, other: &Self) -> Ordering {
        self.protocol_version
            .cmp(&other.protocol_version)
            // Lower score is better, so the comparison is reversed.
            .then_with(|| other.priority.cmp(&self.priority))
    }
}

impl PartialOrd for Rank {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A discovered routing node that has not been connected to yet.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct RoutingCandidate {
    /// Which of the endpoints below the node claims to serve.
    pub addr_types: AddressTypes,
    /// Stream endpoint over IPv4.
    pub stream_v4: Option<SocketAddrV4>,
    /// Stream endpoint over IPv6 (scope id included).
    pub stream_v6: Option<SocketAddrV6>,
    /// Reliable-datagram endpoint over IPv4.
    pub datagram_v4: Option<SocketAddrV4>,
    /// Reliable-datagram endpoint over IPv6 (scope id included).
    pub datagram_v6: Option<SocketAddrV6>,
    /// Advertised bus protocol version.
    pub protocol_version: u32,
    /// Advertised priority score; lower is better.
    pub priority: u32,
}

impl RoutingCandidate {
    /// Convenience constructor for the common "stream over IPv4" advertisement.
    pub fn stream_v4(addr: SocketAddrV4, protocol_version: u32, priority: u32) -> Self {
        Self {
            addr_types: AddressTypes::STREAM_V4,
            stream_v4: Some(addr),
            protocol_version,
            priority,
            ..Self::default()
        }
    }

    /// Returns the candidate's rank.
    pub fn rank(&self) -> Rank {
        Rank {
            protocol_version: self.protocol_version,
            priority: self.priority,
        }
    }

    /// Orders two candidates for selection: rank first, endpoints second.
    ///
    /// `Greater` means `self` should be tried before `other`.  Only candidates
    /// with the same rank, endpoints and transport mask compare `Equal`.
    pub fn preference_cmp(&self, other: &Self) -> Ordering {
        self.rank()
            .cmp(&other.rank())
            .then_with(|| other.endpoint_key().cmp(&self.endpoint_key()))
    }

    /// Returns `true` if a stream endpoint is both advertised and present.
    pub fn advertises_stream(&self) -> bool {
        self.stream_endpoint().is_some()
    }

    /// Returns `true` if at least one datagram endpoint is advertised and present.
    pub fn advertises_datagram(&self) -> bool {
        self.datagram_endpoints().next().is_some()
    }

    /// The preferred stream endpoint: IPv4 when advertised, IPv6 otherwise.
    pub fn stream_endpoint(&self) -> Option<SocketAddr> {
        if self.addr_types.contains(AddressTypes::STREAM_V4) {
            if let Some(addr) = self.stream_v4 {
                return Some(SocketAddr::V4(addr));
            }
        }
        if self.addr_types.contains(AddressTypes::STREAM_V6) {
            if let Some(addr) = self.stream_v6 {
                return Some(SocketAddr::V6(addr));
            }
        }
        None
    }

    /// Datagram endpoints in attempt order (IPv4 first).
    pub fn datagram_endpoints(&self) -> impl Iterator<Item = SocketAddr> + '_ {
        let v4 = self
            .datagram_v4
            .filter(|_| self.addr_types.contains(AddressTypes::DATAGRAM_V4))
            .map(SocketAddr::V4);
        let v6 = self
            .datagram_v6
            .filter(|_| self.addr_types.contains(AddressTypes::DATAGRAM_V6))
            .map(SocketAddr::V6);
        v4.into_iter().chain(v6)
    }

    /// Every IP address the node advertised, whatever the transport.
    pub fn ip_addrs(&self) -> impl Iterator<Item = IpAddr> + '_ {
        let v4 = [self.stream_v4, self.datagram_v4]
            .into_iter()
            .flatten()
            .map(|a| IpAddr::V4(*a.ip()));
        let v6 = [self.stream_v6, self.datagram_v6]
            .into_iter()
            .flatten()
            .map(|a| IpAddr::V6(*a.ip()));
        v4.chain(v6)
    }

    /// Returns `true` when both candidates carry the same socket address in
    /// the same endpoint slot, i.e. they are announcements of one node.
    pub fn shares_endpoint(&self, other: &Self) -> bool {
        fn same<T: PartialEq>(a: &Option<T>, b: &Option<T>) -> bool {
            a.is_some() && a == b
        }
        same(&self.stream_v4, &other.stream_v4)
            || same(&self.stream_v6, &other.stream_v6)
            || same(&self.datagram_v4, &other.datagram_v4)
            || same(&self.datagram_v6, &other.datagram_v6)
    }

    /// Tie-break key; absent endpoints sort after every present one and the
    /// transport mask decides last.
    fn endpoint_key(&self) -> EndpointKey {
        fn v4(addr: Option<SocketAddrV4>) -> (u32, u16) {
            addr.map_or((u32::MAX, u16::MAX), |a| (u32::from(*a.ip()), a.port()))
        }
        fn v6(addr: Option<SocketAddrV6>) -> (u128, u16) {
            addr.map_or((u128::MAX, u16::MAX), |a| (u128::from(*a.ip()), a.port()))
        }
        EndpointKey {
            stream_v4: v4(self.stream_v4),
            stream_v6: v6(self.stream_v6),
            datagram_v4: v4(self.datagram_v4),
            datagram_v6: v6(self.datagram_v6),
            addr_types: self.addr_types.0,
        }
    }
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
struct EndpointKey {
    stream_v4: (u32, u16),
    stream_v6: (u128, u16),
    datagram_v4: (u32, u16),
    datagram_v6: (u128, u16),
    addr_types: u8,
}

// ── Tests ─────────────────────────────────────────────────────────────────────
