//! Infrastructure layer for the connection stack.
//!
//! Contains OS-facing adapters: sockets, interface enumeration and
//! file-system configuration storage.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `busnode_core`, but MUST NOT be imported by the `application` layer.

pub mod net;
pub mod storage;
