//! DiscoverySweepUseCase: fill a candidate registry from one round of queries.
//!
//! A sweep is the first half of getting connected:
//!
//! ```text
//! reset registry ──► encode + send one query per family ──► receive replies
//!                                                              │  (until the
//!                                                              ▼   window closes)
//!                                                  decode ──► registry.admit
//! ```
//!
//! The query grammar is not known here.  A [`DiscoveryCodec`] supplied by the
//! caller writes queries into the transmit buffer and turns reply bytes into
//! [`RoutingCandidate`]s.  Packets it cannot decode are counted and dropped.
//!
//! A failed receive (an ICMP-induced `ECONNREFUSED` on a UDP socket, say) is
//! counted and the sweep keeps listening.  Only
//! [`MAX_CONSECUTIVE_RECV_ERRORS`] failures in a row, with no packet or
//! timeout in between, end it: the channel is then considered broken.

use std::error::Error as StdError;
use std::time::{Duration, Instant};

use busnode_core::{
    BufferError, CandidateRegistry, IoBuffer, PacketFamily, ReceivedPacket, RoutingCandidate,
};
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Back-to-back receive failures after which a sweep gives up.
pub const MAX_CONSECUTIVE_RECV_ERRORS: usize = 16;

/// Serializer and parser for the discovery grammar.
pub trait DiscoveryCodec {
    /// Writes a query for `family` into `tx`.
    fn encode_query(&mut self, family: PacketFamily, tx: &mut IoBuffer) -> Result<(), BufferError>;

    /// Parses a reply.  `None` means the packet is not a usable answer.
    fn decode_response(&self, packet: &ReceivedPacket, bytes: &[u8]) -> Option<RoutingCandidate>;
}

/// Outcome of one bounded receive on a [`DiscoveryChannel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryRecv {
    /// A packet is in the channel's receive buffer.
    Packet(ReceivedPacket),
    TimedOut,
    Interrupted,
}

/// Per-transmission tally of one logical send.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SendReport {
    /// Datagrams the OS accepted.
    pub sent: usize,
    /// Datagrams the OS refused.
    pub failed: usize,
    /// Copies skipped because the packet could not be prepared.
    pub dropped: usize,
}

impl SendReport {
    /// Adds another report's counters to this one.
    pub fn merge(&mut self, other: SendReport) {
        self.sent += other.sent;
        self.failed += other.failed;
        self.dropped += other.dropped;
    }
}

/// Transport for discovery packets.
pub trait DiscoveryChannel {
    type Error: StdError + Send + Sync + 'static;

    /// Families this channel has sockets for, in the order they should be
    /// queried.
    fn query_families(&self) -> Vec<PacketFamily>;

    /// Buffer the next query is serialized into.
    fn tx_buffer_mut(&mut self) -> &mut IoBuffer;

    /// Sends the transmit buffer as a `family` query and clears it.
    fn send(&mut self, family: PacketFamily) -> Result<SendReport, Self::Error>;

    /// Waits up to `timeout` for one packet.
    fn recv(&mut self, timeout: Duration) -> Result<DiscoveryRecv, Self::Error>;

    /// The packet delivered by the last successful [`recv`](Self::recv).
    fn rx_buffer(&self) -> &IoBuffer;
}

/// Counters for one completed sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Families whose query reached the wire.
    pub queries_sent: usize,
    /// Replies received.
    pub received: usize,
    /// Replies the codec could not decode.
    pub undecodable: usize,
    /// Decoded candidates the registry kept.
    pub retained: usize,
    /// Decoded candidates the registry turned away.
    pub discarded: usize,
    /// Receives that failed and were skipped.
    pub recv_errors: usize,
}

/// Errors that end a sweep early.
#[derive(Debug, Error)]
pub enum SweepError {
    /// The channel failed to send every query, or kept failing to receive.
    #[error("discovery transport failed: {0}")]
    Discovery(#[source] Box<dyn StdError + Send + Sync>),

    /// Another thread interrupted the sweep.  Candidates admitted so far stay
    /// in the registry.
    #[error("discovery sweep interrupted")]
    Interrupted,
}

/// Resets `registry`, queries every family `channel` supports and admits
/// decoded replies until `window` has elapsed.
///
/// # Errors
///
/// - [`SweepError::Discovery`] if no query could be sent, or
///   [`MAX_CONSECUTIVE_RECV_ERRORS`] receives failed in a row.
/// - [`SweepError::Interrupted`] if the channel's wait was interrupted.
pub fn run_discovery_sweep<C, K>(
    channel: &mut C,
    codec: &mut K,
    registry: &mut CandidateRegistry,
    window: Duration,
) -> Result<SweepReport, SweepError>
where
    C: DiscoveryChannel,
    K: DiscoveryCodec,
{
    registry.reset();
    let mut report = SweepReport::default();
    let mut last_send_error = None;

    for family in channel.query_families() {
        let tx = channel.tx_buffer_mut();
        tx.reset();
        if let Err(e) = codec.encode_query(family, tx) {
            warn!("could not encode {family} query: {e}");
            tx.reset();
            continue;
        }
        match channel.send(family) {
            Ok(sent) => {
                debug!("{family} query sent: {sent:?}");
                report.queries_sent += 1;
            }
            Err(e) => {
                error!("{family} query failed: {e}");
                last_send_error = Some(e);
            }
        }
    }
    if report.queries_sent == 0 {
        if let Some(e) = last_send_error {
            return Err(SweepError::Discovery(Box::new(e)));
        }
    }

    // `None` is a window too long to represent: listen until timed out.
    let deadline = Instant::now().checked_add(window);
    let mut failures_in_a_row = 0;
    loop {
        let remaining = deadline.map_or(window, |d| d.saturating_duration_since(Instant::now()));
        if remaining.is_zero() {
            break;
        }
        let packet = match channel.recv(remaining) {
            Ok(DiscoveryRecv::Packet(p)) => p,
            Ok(DiscoveryRecv::TimedOut) => break,
            Ok(DiscoveryRecv::Interrupted) => return Err(SweepError::Interrupted),
            Err(e) => {
                report.recv_errors += 1;
                failures_in_a_row += 1;
                if failures_in_a_row >= MAX_CONSECUTIVE_RECV_ERRORS {
                    error!("discovery receive keeps failing, giving up: {e}");
                    return Err(SweepError::Discovery(Box::new(e)));
                }
                warn!("discovery receive failed, still listening: {e}");
                continue;
            }
        };
        failures_in_a_row = 0;
        report.received += 1;

        let Some(candidate) = codec.decode_response(&packet, channel.rx_buffer().readable()) else {
            debug!("dropping undecodable {} packet from {:?}", packet.family, packet.source);
            report.undecodable += 1;
            continue;
        };
        if registry.admit(candidate).is_retained() {
            report.retained += 1;
        } else {
            report.discarded += 1;
        }
    }

    info!(
        "discovery sweep finished: {} replies, {} receive errors, {} candidates retained",
        report.received,
        report.recv_errors,
        registry.len()
    );
    Ok(report)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::io;
    use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

    /// Scripted channel: each `recv` pops the next step.
    struct FakeChannel {
        families: Vec<PacketFamily>,
        tx: IoBuffer,
        rx: IoBuffer,
        sent: Vec<(PacketFamily, Vec<u8>)>,
        fail_sends: bool,
        script: VecDeque<Step>,
    }

    enum Step {
        Reply(Vec<u8>),
        Interrupt,
        Fail,
    }

    impl FakeChannel {
        fn new(script: Vec<Step>) -> Self {
            Self {
                families: vec![PacketFamily::Mdns],
                tx: IoBuffer::tx(64),
                rx: IoBuffer::rx(64),
                sent: Vec::new(),
                fail_sends: false,
                script: script.into(),
            }
        }
    }

    impl DiscoveryChannel for FakeChannel {
        type Error = io::Error;

        fn query_families(&self) -> Vec<PacketFamily> {
            self.families.clone()
        }

        fn tx_buffer_mut(&mut self) -> &mut IoBuffer {
            &mut self.tx
        }

        fn send(&mut self, family: PacketFamily) -> Result<SendReport, io::Error> {
            let bytes = self.tx.readable().to_vec();
            self.tx.reset();
            if self.fail_sends {
                return Err(io::Error::from(io::ErrorKind::NetworkUnreachable));
            }
            self.sent.push((family, bytes));
            Ok(SendReport { sent: 1, ..SendReport::default() })
        }

        fn recv(&mut self, _timeout: Duration) -> Result<DiscoveryRecv, io::Error> {
            self.rx.reset();
            match self.script.pop_front() {
                None => Ok(DiscoveryRecv::TimedOut),
                Some(Step::Interrupt) => Ok(DiscoveryRecv::Interrupted),
                Some(Step::Fail) => Err(io::Error::from(io::ErrorKind::ConnectionReset)),
                Some(Step::Reply(bytes)) => {
                    let n = bytes.len();
                    self.rx.spare_mut()[..n].copy_from_slice(&bytes);
                    self.rx.commit(n);
                    let source = SocketAddr::from(([10, 0, 0, bytes[0]], MDNS_REPLY_PORT));
                    Ok(DiscoveryRecv::Packet(ReceivedPacket::new(
                        PacketFamily::Mdns,
                        n,
                        Some(source),
                    )))
                }
            }
        }

        fn rx_buffer(&self) -> &IoBuffer {
            &self.rx
        }
    }

    const MDNS_REPLY_PORT: u16 = 5353;

    /// Reply format: `[last octet, protocol version, priority]`.
    struct TinyCodec;

    impl DiscoveryCodec for TinyCodec {
        fn encode_query(&mut self, family: PacketFamily, tx: &mut IoBuffer) -> Result<(), BufferError> {
            tx.extend_from_slice(family.to_string().as_bytes())
        }

        fn decode_response(&self, _packet: &ReceivedPacket, bytes: &[u8]) -> Option<RoutingCandidate> {
            let [last, pv, prio] = bytes else {
                return None;
            };
            Some(RoutingCandidate::stream_v4(
                SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, *last), 9955),
                u32::from(*pv),
                u32::from(*prio),
            ))
        }
    }

    #[test]
    fn test_sweep_sends_one_query_per_family() {
        // Arrange
        let mut channel = FakeChannel::new(Vec::new());
        channel.families = vec![PacketFamily::BusDiscovery, PacketFamily::Mdns];
        let mut registry = CandidateRegistry::default();

        // Act
        let report =
            run_discovery_sweep(&mut channel, &mut TinyCodec, &mut registry, Duration::from_secs(1))
                .unwrap();

        // Assert
        assert_eq!(report.queries_sent, 2);
        assert_eq!(
            channel.sent,
            vec![
                (PacketFamily::BusDiscovery, b"bus-discovery".to_vec()),
                (PacketFamily::Mdns, b"mdns".to_vec()),
            ]
        );
    }

    #[test]
    fn test_sweep_admits_decoded_replies_and_counts_undecodable() {
        // Arrange
        let mut channel = FakeChannel::new(vec![
            Step::Reply(vec![2, 12, 5]),
            Step::Reply(vec![0xff]),
            Step::Reply(vec![1, 11, 0]),
        ]);
        let mut registry = CandidateRegistry::default();

        // Act
        let report =
            run_discovery_sweep(&mut channel, &mut TinyCodec, &mut registry, Duration::from_secs(1))
                .unwrap();

        // Assert
        assert_eq!(report.received, 3);
        assert_eq!(report.undecodable, 1);
        assert_eq!(report.retained, 2);
        assert_eq!(registry.select().unwrap().protocol_version, 12);
    }

    #[test]
    fn test_sweep_resets_registry_first() {
        let mut channel = FakeChannel::new(Vec::new());
        let mut registry = CandidateRegistry::default();
        registry.admit(RoutingCandidate::stream_v4(
            SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 9), 9955),
            1,
            1,
        ));

        run_discovery_sweep(&mut channel, &mut TinyCodec, &mut registry, Duration::from_millis(10))
            .unwrap();

        assert!(registry.is_empty());
    }

    #[test]
    fn test_sweep_interrupt_keeps_admitted_candidates() {
        // Arrange
        let mut channel = FakeChannel::new(vec![Step::Reply(vec![3, 1, 1]), Step::Interrupt]);
        let mut registry = CandidateRegistry::default();

        // Act
        let result =
            run_discovery_sweep(&mut channel, &mut TinyCodec, &mut registry, Duration::from_secs(5));

        // Assert
        assert!(matches!(result, Err(SweepError::Interrupted)));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_sweep_fails_when_every_query_send_fails() {
        let mut channel = FakeChannel::new(Vec::new());
        channel.fail_sends = true;
        let mut registry = CandidateRegistry::default();

        let result =
            run_discovery_sweep(&mut channel, &mut TinyCodec, &mut registry, Duration::from_secs(1));

        assert!(matches!(result, Err(SweepError::Discovery(_))));
    }

    #[test]
    fn test_sweep_keeps_listening_after_receive_failure() {
        // Arrange: a refused datagram surfaces as an error before the reply
        let mut channel = FakeChannel::new(vec![Step::Fail, Step::Reply(vec![2, 12, 5])]);
        let mut registry = CandidateRegistry::default();

        // Act
        let report =
            run_discovery_sweep(&mut channel, &mut TinyCodec, &mut registry, Duration::from_secs(1))
                .expect("a single receive failure must not end the sweep");

        // Assert
        assert_eq!(report.recv_errors, 1);
        assert_eq!(report.received, 1);
        assert_eq!(report.retained, 1);
        assert_eq!(registry.select().unwrap().priority, 5);
    }

    #[test]
    fn test_sweep_tolerates_failures_separated_by_packets() {
        let mut script = Vec::new();
        for last in 1..=3 {
            script.extend((0..MAX_CONSECUTIVE_RECV_ERRORS - 1).map(|_| Step::Fail));
            script.push(Step::Reply(vec![last, 12, last]));
        }
        let mut channel = FakeChannel::new(script);
        let mut registry = CandidateRegistry::default();

        let report =
            run_discovery_sweep(&mut channel, &mut TinyCodec, &mut registry, Duration::from_secs(5))
                .unwrap();

        assert_eq!(report.recv_errors, 3 * (MAX_CONSECUTIVE_RECV_ERRORS - 1));
        assert_eq!(report.retained, 3);
    }

    #[test]
    fn test_sweep_gives_up_on_persistently_failing_channel() {
        // Arrange
        let script = (0..MAX_CONSECUTIVE_RECV_ERRORS).map(|_| Step::Fail).collect();
        let mut channel = FakeChannel::new(script);
        let mut registry = CandidateRegistry::default();

        // Act
        let result =
            run_discovery_sweep(&mut channel, &mut TinyCodec, &mut registry, Duration::from_secs(5));

        // Assert
        assert!(matches!(result, Err(SweepError::Discovery(_))));
        assert!(channel.script.is_empty());
    }

    #[test]
    fn test_sweep_accepts_unbounded_window() {
        // Arrange
        let mut channel = FakeChannel::new(vec![Step::Reply(vec![4, 12, 1])]);
        let mut registry = CandidateRegistry::default();

        // Act
        let report =
            run_discovery_sweep(&mut channel, &mut TinyCodec, &mut registry, Duration::MAX)
                .expect("an unrepresentable deadline must not panic");

        // Assert
        assert_eq!(report.retained, 1);
    }

    #[test]
    fn test_send_report_merge_adds_counters() {
        let mut total = SendReport { sent: 1, failed: 0, dropped: 1 };
        total.merge(SendReport { sent: 2, failed: 1, dropped: 0 });
        assert_eq!(total, SendReport { sent: 3, failed: 1, dropped: 1 });
    }
}
