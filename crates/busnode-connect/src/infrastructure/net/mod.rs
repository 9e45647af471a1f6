//! Socket adapters.
//!
//! # Sub-modules
//!
//! - **`interrupt`** – The wake channel that lets another thread cut a
//!   blocking wait short.
//! - **`readiness`** – `poll(2)` over a set of sockets plus the wake channel.
//! - **`socket_io`** – Single-call send/receive helpers and the I/O error type.
//! - **`interfaces`** – Local interface enumeration and reply-address choice.
//! - **`discovery`** – [`discovery::DiscoveryMessenger`], the multicast
//!   discovery transport.
//! - **`datagram`** – The reliable-datagram collaborator seam.
//! - **`connector`** – [`connector::TransportConnector`] and the
//!   [`connector::Connection`] handle it produces.

pub mod connector;
pub mod datagram;
pub mod discovery;
pub mod interfaces;
pub mod interrupt;
pub mod readiness;
pub mod socket_io;
