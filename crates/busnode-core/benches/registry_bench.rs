//! Criterion benchmarks for [`CandidateRegistry`] admission and selection.
//!
//! A discovery sweep on a busy network can deliver dozens of replies within a
//! few milliseconds; admission must stay cheap even when most replies are
//! rejected by a full registry.
//!
//! Run with:
//! ```bash
//! cargo bench --package busnode-core --bench registry_bench
//! ```

use std::net::{Ipv4Addr, SocketAddrV4};

use busnode_core::{CandidateRegistry, RoutingCandidate};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

// ── Fixture builders ──────────────────────────────────────────────────────────

/// Builds `n` candidates with scattered versions and priorities.
fn build_replies(n: usize) -> Vec<RoutingCandidate> {
    (0..n)
        .map(|i| {
            let ip = Ipv4Addr::new(10, 0, (i / 256) as u8, (i % 256) as u8);
            RoutingCandidate::stream_v4(
                SocketAddrV4::new(ip, 9955),
                10 + (i % 3) as u32,
                ((i * 7919) % 1000) as u32,
            )
        })
        .collect()
}

// ── Benchmarks ────────────────────────────────────────────────────────────────

/// Admits a whole sweep's worth of replies into a default-capacity registry.
fn bench_admit_sweep(c: &mut Criterion) {
    let mut group = c.benchmark_group("admit_sweep");

    for &count in &[8usize, 64, 512] {
        let replies = build_replies(count);
        group.bench_with_input(BenchmarkId::new("replies", count), &replies, |b, replies| {
            b.iter(|| {
                let mut registry = CandidateRegistry::default();
                for reply in replies {
                    black_box(registry.admit(reply.clone()));
                }
                registry
            })
        });
    }

    group.finish();
}

/// Drains a full registry with `select` until it reports end of data.
fn bench_select_drain(c: &mut Criterion) {
    let mut group = c.benchmark_group("select_drain");

    for &capacity in &[3usize, 16] {
        let mut filled = CandidateRegistry::new(capacity);
        for reply in build_replies(capacity * 4) {
            filled.admit(reply);
        }
        group.bench_with_input(BenchmarkId::new("capacity", capacity), &filled, |b, filled| {
            b.iter(|| {
                let mut registry = filled.clone();
                while let Ok(candidate) = registry.select() {
                    black_box(candidate);
                }
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_admit_sweep, bench_select_drain);
criterion_main!(benches);
