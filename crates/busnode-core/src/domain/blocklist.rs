//! Bounded list of routing nodes that must not be offered again.
//!
//! When a connection attempt to a node fails, the connection loop adds the
//! node's addresses here so that the next discovery sweep does not hand the
//! same dead node back.  The list is FIFO-bounded: once full, the oldest entry
//! is forgotten to make room, which gives a long-gone node a second chance
//! eventually.

use std::collections::VecDeque;
use std::net::IpAddr;

/// Default number of remembered nodes.
pub const DEFAULT_BLOCKLIST_CAPACITY: usize = 16;

/// FIFO-bounded set of blocked routing-node addresses.
#[derive(Debug, Clone)]
pub struct NodeBlocklist {
    entries: VecDeque<IpAddr>,
    capacity: usize,
}

impl NodeBlocklist {
    /// Creates an empty blocklist.  A capacity of zero disables blocking.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Adds `addr`; re-adding a present address is a no-op.
    pub fn block(&mut self, addr: IpAddr) {
        if self.capacity == 0 || self.entries.contains(&addr) {
            return;
        }
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(addr);
    }

    pub fn is_blocked(&self, addr: &IpAddr) -> bool {
        self.entries.contains(addr)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for NodeBlocklist {
    fn default() -> Self {
        Self::new(DEFAULT_BLOCKLIST_CAPACITY)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
