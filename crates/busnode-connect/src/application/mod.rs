//! Application layer use cases for the connection stack.
//!
//! # What lives here (for beginners)
//!
//! Use cases orchestrate the pure `busnode_core` types through traits that the
//! infrastructure layer implements.  Nothing in this module opens a socket or
//! touches the file system, which keeps every use case testable with small
//! in-memory fakes.
//!
//! # Sub-modules
//!
//! - **`discovery_sweep`** – Sends one query per discovery family, then
//!   drains replies into a [`busnode_core::CandidateRegistry`] until a time
//!   window closes.
//!
//! - **`connect_to_best`** – Walks the registry best-first and returns the
//!   first connection that succeeds, blocklisting the nodes that fail.

pub mod connect_to_best;
pub mod discovery_sweep;
