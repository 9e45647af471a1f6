//! ConnectToBestUseCase: turn a filled registry into one live connection.
//!
//! Candidates are tried strictly best-first.  A candidate that fails is gone
//! (selection is destructive) and its addresses are blocklisted, so the next
//! sweep will not offer it again until the caller clears the blocklist.
//!
//! The blocklist holds IP addresses, not endpoints: a failure blocks every
//! address the node advertised, whatever the transport or port.  Another
//! routing node served from the same host is refused too until
//! [`CandidateRegistry::clear_blocklist`].

use busnode_core::{CandidateRegistry, RoutingCandidate};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Opens a transport to one candidate.
pub trait Connector {
    /// Live connection handed back on success.
    type Connection;
    type Error: std::error::Error + 'static;

    fn connect(&mut self, candidate: &RoutingCandidate) -> Result<Self::Connection, Self::Error>;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FindError {
    /// Every retained candidate was tried (possibly none) and none accepted.
    #[error("no routing node accepted a connection ({attempts} attempted)")]
    Exhausted { attempts: usize },
}

/// Drains `registry` best-first until `connector` produces a connection.
///
/// # Errors
///
/// [`FindError::Exhausted`] once the registry is empty.
pub fn connect_to_best<C: Connector>(
    registry: &mut CandidateRegistry,
    connector: &mut C,
) -> Result<C::Connection, FindError> {
    let mut attempts = 0;

    while let Ok(candidate) = registry.select() {
        attempts += 1;
        debug!(
            "trying routing node {:?} (protocol {}, priority {})",
            candidate.stream_endpoint(),
            candidate.protocol_version,
            candidate.priority
        );
        match connector.connect(&candidate) {
            Ok(connection) => {
                info!("connected after {attempts} attempt(s)");
                return Ok(connection);
            }
            Err(e) => {
                warn!("routing node rejected: {e}");
                for ip in candidate.ip_addrs() {
                    registry.block(ip);
                }
            }
        }
    }

    Err(FindError::Exhausted { attempts })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
