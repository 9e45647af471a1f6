//! Local network interface enumeration.
//!
//! The discovery messenger needs two facts about the host's interfaces:
//!
//! 1. **Which address should routing nodes reply to?**  The first usable
//!    address on the interface that carries the default route (the route
//!    with destination `0.0.0.0` and the lowest metric in
//!    `/proc/net/route`), or the first usable address anywhere when there is
//!    no default route.
//! 2. **Where can an IPv4 broadcast copy of a query go?**  Every usable
//!    interface that has a broadcast address.
//!
//! "Usable" means up, running and not loopback.
//!
//! The OS lookup sits behind the [`InterfaceSource`] trait so the choice logic
//! can be tested without touching the host's network configuration.

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddrV4, SocketAddrV6};

use nix::ifaddrs::getifaddrs;
use nix::net::if_::InterfaceFlags;
use tracing::debug;

/// Path of the Linux IPv4 routing table.
const ROUTE_TABLE_PATH: &str = "/proc/net/route";

/// One address assigned to one local interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalInterface {
    /// Interface name, e.g. `eth0`.
    pub name: String,
    pub addr: IpAddr,
    /// Subnet broadcast address (IPv4 only).
    pub broadcast: Option<Ipv4Addr>,
    pub up: bool,
    pub running: bool,
    pub loopback: bool,
}

impl LocalInterface {
    /// Up, running and not loopback.
    pub fn is_usable(&self) -> bool {
        self.up && self.running && !self.loopback
    }
}

/// Source of interface and routing information.
#[cfg_attr(test, mockall::automock)]
pub trait InterfaceSource {
    /// Lists every address on every interface.
    fn interfaces(&self) -> io::Result<Vec<LocalInterface>>;

    /// Name of the interface carrying the best default route, if any.
    fn default_route_interface(&self) -> Option<String>;
}

/// [`InterfaceSource`] backed by `getifaddrs(3)` and `/proc/net/route`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemInterfaces;

impl InterfaceSource for SystemInterfaces {
    fn interfaces(&self) -> io::Result<Vec<LocalInterface>> {
        let mut out = Vec::new();
        for ifaddr in getifaddrs().map_err(io::Error::from)? {
            let Some(storage) = ifaddr.address else {
                continue;
            };
            let addr = if let Some(sin) = storage.as_sockaddr_in() {
                IpAddr::V4(*SocketAddrV4::from(*sin).ip())
            } else if let Some(sin6) = storage.as_sockaddr_in6() {
                IpAddr::V6(*SocketAddrV6::from(*sin6).ip())
            } else {
                continue;
            };
            let broadcast = ifaddr
                .broadcast
                .as_ref()
                .and_then(|b| b.as_sockaddr_in())
                .map(|sin| *SocketAddrV4::from(*sin).ip());

            out.push(LocalInterface {
                name: ifaddr.interface_name.clone(),
                addr,
                broadcast: if addr.is_ipv4() { broadcast } else { None },
                up: ifaddr.flags.contains(InterfaceFlags::IFF_UP),
                running: ifaddr.flags.contains(InterfaceFlags::IFF_RUNNING),
                loopback: ifaddr.flags.contains(InterfaceFlags::IFF_LOOPBACK),
            });
        }
        Ok(out)
    }

    fn default_route_interface(&self) -> Option<String> {
        match std::fs::read_to_string(ROUTE_TABLE_PATH) {
            Ok(table) => parse_default_route(&table),
            Err(e) => {
                debug!("unable to read {ROUTE_TABLE_PATH}: {e}");
                None
            }
        }
    }
}

/// Fixed interface list, for tests and for hosts whose interfaces are known
/// up front.
#[derive(Debug, Clone, Default)]
pub struct StaticInterfaces {
    pub interfaces: Vec<LocalInterface>,
    pub default_route: Option<String>,
}

impl InterfaceSource for StaticInterfaces {
    fn interfaces(&self) -> io::Result<Vec<LocalInterface>> {
        Ok(self.interfaces.clone())
    }

    fn default_route_interface(&self) -> Option<String> {
        self.default_route.clone()
    }
}

/// Returns the interface of the lowest-metric default route in a
/// `/proc/net/route` table.
///
/// Columns are `Iface Destination Gateway Flags RefCnt Use Metric ...`; the
/// header line and malformed lines are skipped.
pub fn parse_default_route(table: &str) -> Option<String> {
    let mut best: Option<(u32, &str)> = None;
    for line in table.lines() {
        let cols: Vec<&str> = line.split_whitespace().collect();
        if cols.len() < 7 || cols[1] != "00000000" {
            continue;
        }
        let Ok(metric) = cols[6].parse::<u32>() else {
            continue;
        };
        if best.map_or(true, |(m, _)| metric < m) {
            best = Some((metric, cols[0]));
        }
    }
    best.map(|(_, iface)| iface.to_string())
}

/// Picks the address routing nodes should send their reply to.
///
/// With `want_v6` false only IPv4 addresses are considered, otherwise only
/// IPv6 ones.
pub fn choose_reply_address(source: &dyn InterfaceSource, want_v6: bool) -> Option<IpAddr> {
    let interfaces = match source.interfaces() {
        Ok(list) => list,
        Err(e) => {
            debug!("interface enumeration failed: {e}");
            return None;
        }
    };
    let default_iface = source.default_route_interface();

    interfaces
        .iter()
        .filter(|i| i.is_usable() && i.addr.is_ipv6() == want_v6)
        .find(|i| default_iface.as_deref().map_or(true, |d| d == i.name))
        .map(|i| i.addr)
}

/// `(interface address, broadcast address)` for every usable IPv4 interface
/// that has a broadcast address.
pub fn broadcast_targets(source: &dyn InterfaceSource) -> io::Result<Vec<(Ipv4Addr, Ipv4Addr)>> {
    Ok(source
        .interfaces()?
        .into_iter()
        .filter(LocalInterface::is_usable)
        .filter_map(|i| match (i.addr, i.broadcast) {
            (IpAddr::V4(addr), Some(bcast)) => Some((addr, bcast)),
            _ => None,
        })
        .collect())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
