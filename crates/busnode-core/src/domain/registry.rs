//! Bounded, best-first collection of routing-node candidates.
//!
//! Discovery replies arrive in arbitrary order and may be far more numerous
//! than the device can afford to remember.  [`CandidateRegistry`] keeps only
//! the `capacity` best it has seen since the last [`CandidateRegistry::reset`]
//! and hands them out best-first through [`CandidateRegistry::select`].
//!
//! # Retention rules
//!
//! 1. A routing node answers once per query copy it hears, so a candidate
//!    sharing an endpoint with a retained entry is a re-announcement of that
//!    node.  It replaces the entry only when its rank is strictly higher and
//!    never takes a second slot.
//! 2. Below capacity, every other acceptable candidate is appended.
//! 3. At capacity, the new candidate is compared against the *worst* entry
//!    (lowest in selection order).  It replaces that entry only when its
//!    [`Rank`](super::candidate::Rank) is strictly higher.  An equally ranked
//!    newcomer never evicts, so the registry never downgrades.
//! 4. A candidate that was rejected or evicted is gone for good.
//!
//! Nothing is cached between calls: the worst and best entries are found by a
//! linear scan of the live set each time.  With the small capacities used on
//! constrained devices this is cheaper than maintaining a heap.

use std::cmp::Ordering;
use std::net::IpAddr;

use thiserror::Error;
use tracing::debug;

use super::blocklist::{NodeBlocklist, DEFAULT_BLOCKLIST_CAPACITY};
use super::candidate::RoutingCandidate;

/// Default number of retained candidates.
pub const DEFAULT_CAPACITY: usize = 3;

/// Outcome of [`CandidateRegistry::admit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// The registry had room; the candidate was appended.
    Appended,
    /// The candidate displaced the carried entry: the previously worst one, or
    /// an older announcement of the same node.
    Replaced(RoutingCandidate),
    /// The registry is full and the candidate does not outrank the worst
    /// entry, or the node is already held with an equal or better rank.
    Rejected,
    /// The candidate is below the minimum protocol version or blocklisted.
    Refused,
}

impl Admission {
    /// Returns `true` if the candidate is now held by the registry.
    pub fn is_retained(&self) -> bool {
        matches!(self, Admission::Appended | Admission::Replaced(_))
    }
}

/// Errors returned by [`CandidateRegistry`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// Every retained candidate has already been selected.
    #[error("no routing-node candidates left")]
    EndOfData,
}

/// Bounded best-first registry of routing-node candidates.
///
/// # Example
///
/// ```
/// use std::net::{Ipv4Addr, SocketAddrV4};
/// use busnode_core::{CandidateRegistry, RoutingCandidate};
///
/// let mut registry = CandidateRegistry::new(2);
/// let a = RoutingCandidate::stream_v4(SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 1), 9955), 12, 5);
/// let b = RoutingCandidate::stream_v4(SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 2), 9955), 12, 1);
/// registry.admit(a);
/// registry.admit(b.clone());
///
/// assert_eq!(registry.select().unwrap(), b);
/// ```
#[derive(Debug, Clone)]
pub struct CandidateRegistry {
    entries: Vec<RoutingCandidate>,
    capacity: usize,
    min_protocol_version: u32,
    blocklist: NodeBlocklist,
}

impl CandidateRegistry {
    /// Creates an empty registry retaining at most `capacity` candidates.
    ///
    /// A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: Vec::with_capacity(capacity),
            capacity,
            min_protocol_version: 0,
            blocklist: NodeBlocklist::new(DEFAULT_BLOCKLIST_CAPACITY),
        }
    }

    /// Refuses candidates advertising a protocol version below `version`.
    pub fn with_min_protocol_version(mut self, version: u32) -> Self {
        self.min_protocol_version = version;
        self
    }

    /// Replaces the blocklist with an empty one of the given capacity.
    pub fn with_blocklist_capacity(mut self, capacity: usize) -> Self {
        self.blocklist = NodeBlocklist::new(capacity);
        self
    }

    /// Drops every retained candidate.  The blocklist survives.
    pub fn reset(&mut self) {
        self.entries.clear();
    }

    /// Offers a candidate to the registry.
    pub fn admit(&mut self, candidate: RoutingCandidate) -> Admission {
        if candidate.protocol_version < self.min_protocol_version {
            debug!(
                version = candidate.protocol_version,
                min = self.min_protocol_version,
                "candidate refused: protocol version too old"
            );
            return Admission::Refused;
        }
        if candidate.ip_addrs().any(|ip| self.blocklist.is_blocked(&ip)) {
            debug!(?candidate, "candidate refused: routing node is blocklisted");
            return Admission::Refused;
        }

        if let Some(same) = self.position_of_node(&candidate) {
            if candidate.rank() > self.entries[same].rank() {
                debug!(
                    version = candidate.protocol_version,
                    priority = candidate.priority,
                    "re-announced node updated"
                );
                let previous = std::mem::replace(&mut self.entries[same], candidate);
                return Admission::Replaced(previous);
            }
            debug!(?candidate, "candidate rejected: node already retained");
            return Admission::Rejected;
        }

        if self.entries.len() < self.capacity {
            debug!(
                version = candidate.protocol_version,
                priority = candidate.priority,
                "candidate appended"
            );
            self.entries.push(candidate);
            return Admission::Appended;
        }

        // Capacity is at least one, so a full registry has a worst entry.
        let Some(worst) = self.position_by(Ordering::Less) else {
            return Admission::Rejected;
        };

        if candidate.rank() > self.entries[worst].rank() {
            debug!(
                version = candidate.protocol_version,
                priority = candidate.priority,
                "candidate replaces worst entry"
            );
            let evicted = std::mem::replace(&mut self.entries[worst], candidate);
            Admission::Replaced(evicted)
        } else {
            debug!(
                version = candidate.protocol_version,
                priority = candidate.priority,
                "candidate rejected: registry full"
            );
            Admission::Rejected
        }
    }

    /// Removes and returns the best remaining candidate.
    pub fn select(&mut self) -> Result<RoutingCandidate, RegistryError> {
        let best = self
            .position_by(Ordering::Greater)
            .ok_or(RegistryError::EndOfData)?;
        Ok(self.entries.swap_remove(best))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn min_protocol_version(&self) -> u32 {
        self.min_protocol_version
    }

    /// Read-only view of the retained candidates, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &RoutingCandidate> {
        self.entries.iter()
    }

    /// Blocks a routing-node address.  Already retained candidates are kept.
    pub fn block(&mut self, addr: IpAddr) {
        self.blocklist.block(addr);
    }

    pub fn is_blocked(&self, addr: &IpAddr) -> bool {
        self.blocklist.is_blocked(addr)
    }

    pub fn clear_blocklist(&mut self) {
        self.blocklist.clear();
    }

    /// Index of the retained entry announcing the same node as `candidate`.
    fn position_of_node(&self, candidate: &RoutingCandidate) -> Option<usize> {
        self.entries.iter().position(|entry| entry.shares_endpoint(candidate))
    }

    /// Index of the extreme entry in selection order: `Greater` finds the
    /// best, `Less` the worst.
    fn position_by(&self, wanted: Ordering) -> Option<usize> {
        let mut found: Option<usize> = None;
        for (i, entry) in self.entries.iter().enumerate() {
            match found {
                Some(j) if entry.preference_cmp(&self.entries[j]) != wanted => {}
                _ => found = Some(i),
            }
        }
        found
    }
}

impl Default for CandidateRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
