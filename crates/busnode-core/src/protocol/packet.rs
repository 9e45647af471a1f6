//! Metadata attached to a discovery packet at receive time.

use std::fmt;
use std::net::SocketAddr;

/// Which discovery protocol a packet belongs to.
///
/// Assigned once, when the messenger knows which socket the packet arrived on
/// (or which kind of query the caller asked to send).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketFamily {
    /// Legacy bus-discovery (who-has / is-at) datagrams.
    BusDiscovery,
    /// Multicast DNS.
    Mdns,
}

impl fmt::Display for PacketFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PacketFamily::BusDiscovery => write!(f, "bus-discovery"),
            PacketFamily::Mdns => write!(f, "mdns"),
        }
    }
}

/// A packet sitting in the messenger's receive buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceivedPacket {
    pub family: PacketFamily,
    /// Number of bytes received.
    pub len: usize,
    /// Sender address, when the OS reported one.
    pub source: Option<SocketAddr>,
    /// Interface scope of an IPv6 sender, needed to reach a link-local peer.
    pub scope_id: Option<u32>,
}

impl ReceivedPacket {
    pub fn new(family: PacketFamily, len: usize, source: Option<SocketAddr>) -> Self {
        let scope_id = match source {
            Some(SocketAddr::V6(v6)) if v6.scope_id() != 0 => Some(v6.scope_id()),
            _ => None,
        };
        Self {
            family,
            len,
            source,
            scope_id,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
