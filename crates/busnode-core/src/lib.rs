//! # busnode-core
//!
//! Shared library for the busnode connection layer containing the routing-node
//! candidate model, the bounded ranking registry, fixed-capacity I/O buffers
//! and the discovery wire helpers.
//!
//! This crate has zero dependencies on OS APIs or network sockets; everything
//! that touches a descriptor lives in `busnode-connect`.
//!
//! # Architecture overview (for beginners)
//!
//! A constrained device does not talk to the message bus directly.  Instead it
//! finds a *routing node* on the local network, opens one transport connection
//! to it, and lets the routing node relay traffic on its behalf.  Getting from
//! "no connection" to "open socket" takes three steps:
//!
//! 1. **Discover** – broadcast a query; every routing node that hears it
//!    answers with its addresses, protocol version and a priority score.
//! 2. **Rank** – keep the few best answers in a small bounded list.
//! 3. **Connect** – try the best answer first, then the next, until one works.
//!
//! This crate owns the pure parts of that pipeline:
//!
//! - **`domain`** – [`RoutingCandidate`], its [`Rank`], the
//!   [`CandidateRegistry`] and the [`NodeBlocklist`].
//!
//! - **`protocol`** – wire constants (multicast groups and ports), the
//!   direction-locked [`IoBuffer`], the receive-time [`PacketFamily`] tag and
//!   the sender-info record rewrite applied to outgoing mDNS packets.

pub mod domain;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `busnode_core::CandidateRegistry` instead of the full module path.
pub use domain::blocklist::NodeBlocklist;
pub use domain::candidate::{AddressTypes, Rank, RoutingCandidate};
pub use domain::registry::{Admission, CandidateRegistry, RegistryError};
pub use protocol::buffer::{BufferDirection, BufferError, IoBuffer};
pub use protocol::packet::{PacketFamily, ReceivedPacket};
pub use protocol::sender_info::{rewrite_sender_info, SenderInfoError};
