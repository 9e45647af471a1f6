//! Domain entities for the busnode connection layer.
//!
//! This module contains pure ranking and retention logic with no
//! infrastructure dependencies.
//!
//! # Sub-modules
//!
//! - **`candidate`** – A discovered routing node ([`candidate::RoutingCandidate`])
//!   and the total order ([`candidate::Rank`]) used to compare two of them.
//!
//! - **`registry`** – The bounded, best-first collection that discovery fills
//!   and the connection loop drains.
//!
//! - **`blocklist`** – Routing nodes that failed a connection attempt and are
//!   refused at admission until the caller clears the list.

pub mod blocklist;
pub mod candidate;
pub mod registry;
