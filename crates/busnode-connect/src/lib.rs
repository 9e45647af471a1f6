//! busnode-connect library entry point.
//!
//! Turns the pure ranking logic of `busnode-core` into live sockets: it sends
//! discovery queries, collects replies, and opens one transport connection to
//! the best routing node that answers.
//!
//! # How a device gets connected (for beginners)
//!
//! ```text
//! DiscoveryMessenger::up ──▶ run_discovery_sweep ──▶ CandidateRegistry
//!                                                         │
//!                     Connection ◀── connect_to_best ◀────┘
//! ```
//!
//! 1. [`infrastructure::net::discovery::DiscoveryMessenger`] opens the
//!    multicast and unicast sockets and moves discovery packets.
//! 2. [`application::discovery_sweep::run_discovery_sweep`] sends one query
//!    per protocol family and feeds decoded replies into the registry.
//! 3. [`application::connect_to_best::connect_to_best`] drains the registry
//!    best-first through a
//!    [`infrastructure::net::connector::TransportConnector`] until one node
//!    accepts a connection.
//!
//! Every blocking wait can be cut short from another thread with an
//! [`infrastructure::net::interrupt::InterruptHandle`].

/// Application layer: discovery sweep and connection loop.
pub mod application;

/// Infrastructure layer: sockets, interfaces, configuration storage.
pub mod infrastructure;

/// Process-wide `tracing` subscriber setup.
pub mod logging;
