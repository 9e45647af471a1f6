//! Cross-thread wake-up for blocking socket waits.
//!
//! # How the wake channel works (for beginners)
//!
//! A thread blocked in `poll(2)` only wakes up when one of the descriptors it
//! watches becomes readable (or the timeout expires).  To wake it on demand we
//! add one extra descriptor to every wait: the read end of a connected pair of
//! local sockets.  Writing a single byte to the other end makes the read end
//! readable, and the blocked wait returns.
//!
//! Two rules keep signals from leaking between waits:
//!
//! - [`InterruptHandle::interrupt`] only writes while a wait is armed.  A
//!   signal sent while nothing is blocked is dropped.
//! - Every wait drains leftover bytes *before* arming, so a signal that raced
//!   with the end of the previous wait cannot abort the next one.

use std::io::{self, Read, Write};
use std::os::unix::io::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::debug;

#[derive(Debug)]
struct WakeChannel {
    /// Set while a wait is outstanding on `reader`.
    blocked: AtomicBool,
    reader: UnixStream,
    writer: UnixStream,
}

/// Wake channel owned by one connection or discovery session.
///
/// Cloning shares the same channel.
#[derive(Debug, Clone)]
pub struct InterruptSignal {
    inner: Arc<WakeChannel>,
}

/// Cheap, thread-safe handle used to wake the owner's current wait.
#[derive(Debug, Clone)]
pub struct InterruptHandle {
    inner: Arc<WakeChannel>,
}

impl InterruptSignal {
    /// Creates a new wake channel.
    ///
    /// # Errors
    ///
    /// Returns the OS error if the socket pair cannot be created or made
    /// non-blocking.
    pub fn new() -> io::Result<Self> {
        let (reader, writer) = UnixStream::pair()?;
        reader.set_nonblocking(true)?;
        writer.set_nonblocking(true)?;
        Ok(Self {
            inner: Arc::new(WakeChannel {
                blocked: AtomicBool::new(false),
                reader,
                writer,
            }),
        })
    }

    /// Returns a handle that can be moved to another thread.
    pub fn handle(&self) -> InterruptHandle {
        InterruptHandle {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Descriptor to include in a readiness wait.
    pub(crate) fn wake_fd(&self) -> RawFd {
        self.inner.reader.as_raw_fd()
    }

    /// Drops stale signals, then marks a wait as outstanding.
    pub(crate) fn arm(&self) {
        self.drain();
        self.inner.blocked.store(true, Ordering::SeqCst);
    }

    pub(crate) fn disarm(&self) {
        self.inner.blocked.store(false, Ordering::SeqCst);
    }

    /// Reads every pending wake byte.
    pub(crate) fn drain(&self) {
        let mut scratch = [0u8; 16];
        loop {
            match (&self.inner.reader).read(&mut scratch) {
                Ok(0) => break,
                Ok(_) => continue,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(_) => break,
            }
        }
    }
}

impl InterruptHandle {
    /// Wakes the owner's outstanding wait, if any.  Never blocks.
    pub fn interrupt(&self) {
        if !self.inner.blocked.load(Ordering::SeqCst) {
            return;
        }
        match (&self.inner.writer).write(&[1]) {
            Ok(_) => {}
            // A full channel already holds a pending signal.
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
            Err(e) => debug!("interrupt write failed: {e}"),
        }
    }

    /// Returns `true` while the owner is blocked in a wait.
    pub fn is_waiting(&self) -> bool {
        self.inner.blocked.load(Ordering::SeqCst)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
