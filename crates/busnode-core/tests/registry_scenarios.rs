//! Integration tests for routing-node selection through the public registry API.
//!
//! # Purpose
//!
//! These tests feed [`CandidateRegistry`] the same kind of admission sequences
//! a discovery sweep produces and check which routing node the connection loop
//! would try first.  They verify:
//!
//! - Ranking: a newer protocol version always wins; within a version the lower
//!   priority score wins; equal ranks fall back to the lower address.
//! - Retention: a full registry keeps the best nodes seen so far and never
//!   swaps an entry for an equally ranked or weaker one; repeated replies
//!   from one node occupy a single slot.
//! - Draining: `select` hands out each retained node exactly once, best first,
//!   and then reports end of data.
//!
//! # Selection in one picture
//!
//! ```text
//! replies ──admit──▶ [ best | ... | worst ]  (at most `capacity`)
//!                          │
//!                        select ──▶ connect attempt
//! ```

use std::net::{Ipv4Addr, SocketAddrV4};

use busnode_core::{Admission, CandidateRegistry, RegistryError, RoutingCandidate};

/// Builds a stream-over-IPv4 candidate on `127.0.0.<last>`.
fn node(last: u8, protocol_version: u32, priority: u32) -> RoutingCandidate {
    RoutingCandidate::stream_v4(
        SocketAddrV4::new(Ipv4Addr::new(127, 0, 0, last), 9955),
        protocol_version,
        priority,
    )
}

fn last_octet(c: &RoutingCandidate) -> u8 {
    c.stream_v4.map(|a| a.ip().octets()[3]).unwrap_or(0)
}

// ── Scenario tests ────────────────────────────────────────────────────────────

/// Two nodes with identical rank: the lower address is selected first, in
/// either admission order, and comes back unmodified.
#[test]
fn test_equal_rank_selects_lower_address_in_either_order() {
    for order in [[1u8, 2], [2, 1]] {
        // Arrange
        let mut registry = CandidateRegistry::default();
        for last in order {
            registry.admit(node(last, 0, 0));
        }

        // Act
        let first = registry.select().expect("two candidates admitted");

        // Assert
        assert_eq!(first, node(1, 0, 0), "admission order {order:?}");
    }
}

/// A newer protocol version wins regardless of admission order and score.
#[test]
fn test_newer_protocol_version_selected_first_in_either_order() {
    let old = node(1, 11, 0);
    let new = node(2, 12, 5678);

    for pair in [[old.clone(), new.clone()], [new.clone(), old.clone()]] {
        let mut registry = CandidateRegistry::default();
        for c in pair {
            registry.admit(c);
        }
        assert_eq!(registry.select().unwrap(), new);
    }
}

/// Two admitted nodes allow exactly two selections.
#[test]
fn test_selection_exhausts_after_every_node_is_taken() {
    // Arrange
    let mut registry = CandidateRegistry::default();
    registry.admit(node(1, 0, 1234));
    registry.admit(node(2, 0, 2345));

    // Act / Assert
    assert!(registry.select().is_ok());
    assert!(registry.select().is_ok());
    assert_eq!(registry.select(), Err(RegistryError::EndOfData));
}

/// A full registry that already holds the best node keeps it when a weaker
/// node arrives.
#[test]
fn test_full_registry_does_not_evict_for_weaker_node() {
    // Arrange
    let best = node(1, 0, 1234);
    let mut registry = CandidateRegistry::default();
    registry.admit(node(3, 0, 3456));
    registry.admit(node(2, 0, 2345));
    registry.admit(best.clone());

    // Act
    let outcome = registry.admit(node(4, 0, 4567));

    // Assert
    assert_eq!(outcome, Admission::Rejected);
    assert_eq!(registry.select().unwrap(), best);
}

/// The best node arriving last into a full registry still wins.
#[test]
fn test_best_node_arriving_last_replaces_worst() {
    // Arrange
    let mut registry = CandidateRegistry::default();
    for (last, score) in [(3, 3456), (4, 4567), (5, 5678), (2, 2345)] {
        registry.admit(node(last, 0, score));
    }

    // Act
    registry.admit(node(1, 0, 1234));

    // Assert
    let order: Vec<u8> = std::iter::from_fn(|| registry.select().ok())
        .map(|c| last_octet(&c))
        .collect();
    assert_eq!(order, vec![1, 2, 3]);
}

/// A newer-version node displaces an older one from a full registry even
/// with a worse score.
#[test]
fn test_newer_version_enters_full_registry_of_older_nodes() {
    let mut registry = CandidateRegistry::default();
    for last in [3, 4, 2] {
        registry.admit(node(last, 11, 5678));
    }

    let outcome = registry.admit(node(1, 12, 6789));

    assert!(matches!(outcome, Admission::Replaced(_)));
    assert_eq!(last_octet(&registry.select().unwrap()), 1);
}

/// The same node re-announcing with a newer version updates its one entry.
#[test]
fn test_reannounced_node_with_newer_version_is_preferred() {
    // Arrange
    let mut registry = CandidateRegistry::default();
    registry.admit(node(1, 11, 1234));

    // Act
    let outcome = registry.admit(node(1, 12, 5678));

    // Assert
    assert_eq!(outcome, Admission::Replaced(node(1, 11, 1234)));
    assert_eq!(registry.len(), 1);
    let first = registry.select().unwrap();
    assert_eq!(first.protocol_version, 12);
    assert_eq!(first.priority, 5678);
    assert_eq!(registry.select(), Err(RegistryError::EndOfData));
}

/// One node answering every query copy keeps a single slot, so a second
/// distinct node still gets in and the fallback chain reaches it.
#[test]
fn test_repeated_replies_from_one_node_leave_room_for_others() {
    // Arrange
    let mut registry = CandidateRegistry::new(3);
    for _ in 0..3 {
        registry.admit(node(1, 12, 0));
    }

    // Act
    let outcome = registry.admit(node(2, 12, 5));

    // Assert
    assert_eq!(outcome, Admission::Appended);
    let order: Vec<u8> = std::iter::from_fn(|| registry.select().ok())
        .map(|c| last_octet(&c))
        .collect();
    assert_eq!(order, vec![1, 2]);
}

/// A weaker or equal re-announcement never downgrades the retained entry.
#[test]
fn test_weaker_reannouncement_is_rejected() {
    let mut registry = CandidateRegistry::default();
    registry.admit(node(1, 12, 10));

    assert_eq!(registry.admit(node(1, 11, 0)), Admission::Rejected);
    assert_eq!(registry.admit(node(1, 12, 10)), Admission::Rejected);
    assert_eq!(registry.select().unwrap(), node(1, 12, 10));
}

// ── Property-style tests ──────────────────────────────────────────────────────

/// A deterministic pseudo-random admission sequence never grows the registry
/// past its capacity, and draining yields non-increasing ranks.
#[test]
fn test_capacity_bound_and_monotonic_draining() {
    for capacity in 1..=5 {
        // Arrange
        let mut registry = CandidateRegistry::new(capacity);
        let mut seed: u32 = 0x2545_f491;

        // Act
        for i in 0..200u32 {
            seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            let pv = (seed >> 16) % 4;
            let score = (seed >> 8) % 50;
            registry.admit(node((i % 250) as u8 + 1, pv, score));
            assert!(registry.len() <= capacity);
        }

        // Assert
        let mut previous = None;
        while let Ok(c) = registry.select() {
            if let Some(prev) = previous {
                assert!(c.rank() <= prev, "ranks must not increase while draining");
            }
            previous = Some(c.rank());
        }
        assert_eq!(registry.select(), Err(RegistryError::EndOfData));
    }
}

/// The same admission sequence always drains in the same order.  The late
/// `.5` ties with the retained `.9` and is rejected.
#[test]
fn test_selection_order_is_deterministic() {
    let sequence = [node(9, 1, 5), node(3, 1, 5), node(7, 2, 9), node(5, 1, 5)];

    let drain = || {
        let mut registry = CandidateRegistry::default();
        for c in sequence.iter().cloned() {
            registry.admit(c);
        }
        let order: Vec<RoutingCandidate> = std::iter::from_fn(|| registry.select().ok()).collect();
        order
    };

    assert_eq!(drain(), drain());
    assert_eq!(
        drain().iter().map(last_octet).collect::<Vec<_>>(),
        vec![7, 3, 9]
    );
}
