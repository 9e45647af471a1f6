//! Bounded, interruptible readiness wait over a set of sockets.
//!
//! [`wait_readable`] is the only place the connection stack blocks on socket
//! data.  It always watches the caller's [`InterruptSignal`] alongside the
//! data sockets, and reports the three possible endings as values:
//!
//! | Outcome                     | Meaning                                   |
//! |-----------------------------|-------------------------------------------|
//! | [`WaitOutcome::Ready`]      | at least one data socket can be read      |
//! | [`WaitOutcome::Interrupted`]| another thread called `interrupt()`       |
//! | [`WaitOutcome::TimedOut`]   | the timeout elapsed with nothing to read  |
//!
//! An interrupt wins over data that became readable in the same instant.

use std::io;
use std::os::raw::c_int;
use std::os::unix::io::RawFd;
use std::time::{Duration, Instant};

use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags};

use super::interrupt::InterruptSignal;

/// Indices (into the `fds` slice passed to [`wait_readable`]) of the sockets
/// that are ready, in ascending order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReadySet(Vec<usize>);

impl ReadySet {
    pub fn contains(&self, index: usize) -> bool {
        self.0.contains(&index)
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.0.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// How a readiness wait ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitOutcome {
    Ready(ReadySet),
    Interrupted,
    TimedOut,
}

/// Blocks until one of `fds` is readable, `interrupt` is signalled, or
/// `timeout` elapses.
///
/// Error, hang-up and invalid-descriptor conditions count as readable so that
/// the caller's next read reports them.  A signal delivered to the process
/// restarts the wait with the remaining time.
///
/// # Errors
///
/// Returns the OS error if `poll(2)` itself fails.
pub fn wait_readable(
    fds: &[RawFd],
    interrupt: &InterruptSignal,
    timeout: Duration,
) -> io::Result<WaitOutcome> {
    interrupt.arm();
    let outcome = poll_until(fds, interrupt, timeout);
    interrupt.disarm();
    outcome
}

fn poll_until(
    fds: &[RawFd],
    interrupt: &InterruptSignal,
    timeout: Duration,
) -> io::Result<WaitOutcome> {
    let readable =
        PollFlags::POLLIN | PollFlags::POLLERR | PollFlags::POLLHUP | PollFlags::POLLNVAL;
    let deadline = Instant::now().checked_add(timeout);

    loop {
        let mut pollfds: Vec<PollFd> = fds
            .iter()
            .map(|&fd| PollFd::new(fd, PollFlags::POLLIN))
            .collect();
        pollfds.push(PollFd::new(interrupt.wake_fd(), PollFlags::POLLIN));

        match poll(&mut pollfds, remaining_ms(deadline)) {
            Ok(0) => return Ok(WaitOutcome::TimedOut),
            Ok(_) => {
                let fired = |pfd: &PollFd| pfd.revents().map_or(false, |r| r.intersects(readable));

                if pollfds.last().map_or(false, fired) {
                    interrupt.drain();
                    return Ok(WaitOutcome::Interrupted);
                }
                let ready: Vec<usize> = pollfds[..fds.len()]
                    .iter()
                    .enumerate()
                    .filter(|(_, pfd)| fired(*pfd))
                    .map(|(i, _)| i)
                    .collect();
                if !ready.is_empty() {
                    return Ok(WaitOutcome::Ready(ReadySet(ready)));
                }
                // Nothing we watch fired; wait out the remaining time.
            }
            Err(Errno::EINTR) => {}
            Err(e) => return Err(io::Error::from(e)),
        }

        if deadline.map_or(false, |d| Instant::now() >= d) {
            return Ok(WaitOutcome::TimedOut);
        }
    }
}

/// Milliseconds left until `deadline`, rounded up; `-1` waits forever.
fn remaining_ms(deadline: Option<Instant>) -> c_int {
    let Some(deadline) = deadline else {
        return -1;
    };
    let left = deadline.saturating_duration_since(Instant::now());
    let ms = left.as_millis() + u128::from(left.subsec_nanos() % 1_000_000 != 0);
    c_int::try_from(ms).unwrap_or(c_int::MAX)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
