//! Well-known groups, ports and buffer sizes used on the wire.

use std::net::{Ipv4Addr, Ipv6Addr};

// ── Bus discovery ─────────────────────────────────────────────────────────────

/// IPv4 multicast group for legacy bus-discovery queries.
pub const BUS_DISCOVERY_GROUP_V4: Ipv4Addr = Ipv4Addr::new(224, 0, 0, 113);

/// IPv6 link-local multicast group for legacy bus-discovery queries.
pub const BUS_DISCOVERY_GROUP_V6: Ipv6Addr = Ipv6Addr::new(0xff02, 0, 0, 0, 0, 0, 0, 0x13a);

/// UDP port routing nodes listen on for bus-discovery queries.
pub const BUS_DISCOVERY_PORT: u16 = 9956;

/// Bus-discovery sockets are only opened when the minimum accepted protocol
/// version is below this value; newer routing nodes answer mDNS only.
pub const LEGACY_BUS_DISCOVERY_MAX_VERSION: u32 = 10;

// ── mDNS ──────────────────────────────────────────────────────────────────────

/// IPv4 mDNS multicast group.
pub const MDNS_GROUP_V4: Ipv4Addr = Ipv4Addr::new(224, 0, 0, 251);

/// IPv6 mDNS multicast group.
pub const MDNS_GROUP_V6: Ipv6Addr = Ipv6Addr::new(0xff02, 0, 0, 0, 0, 0, 0, 0xfb);

/// mDNS UDP port.
pub const MDNS_PORT: u16 = 5353;

// ── Buffer sizes ──────────────────────────────────────────────────────────────

/// Receive buffer for discovery replies (fits one Ethernet frame).
pub const DISCOVERY_RX_BUFFER_SIZE: usize = 1454;

/// Transmit buffer for discovery queries.
pub const DISCOVERY_TX_BUFFER_SIZE: usize = 475;

/// Default receive buffer for an established connection.
pub const DEFAULT_RX_BUFFER_SIZE: usize = 1024;

/// Default transmit buffer for an established connection.
pub const DEFAULT_TX_BUFFER_SIZE: usize = 1024;

/// Default reliable-datagram segment size (Ethernet MTU minus IP/UDP headers).
pub const DEFAULT_DATAGRAM_SEGMENT_SIZE: usize = 1472;
