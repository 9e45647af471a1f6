//! Fixed-capacity, direction-locked byte buffer.
//!
//! Every socket the connection layer owns is paired with one [`IoBuffer`] per
//! direction.  The buffer never grows: its capacity is fixed at creation, which
//! keeps memory use predictable on constrained devices.
//!
//! # Layout (for beginners)
//!
//! ```text
//!  0          read_pos       write_pos               capacity
//!  |  consumed  |   readable    |        spare         |
//! ```
//!
//! - Bytes are **appended** at `write_pos` (by a socket read for a receive
//!   buffer, by a serializer for a transmit buffer) and then committed.
//! - Bytes are **consumed** from `read_pos` (by a parser, or by a socket send).
//! - When everything written has been consumed both positions snap back to 0,
//!   so a buffer that is drained regularly never runs out of space.

use thiserror::Error;

/// Which way data flows through a buffer.  Fixed for the buffer's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferDirection {
    /// Filled from a socket, drained by a parser.
    Rx,
    /// Filled by a serializer, drained to a socket.
    Tx,
}

/// Errors returned by [`IoBuffer`] operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BufferError {
    /// The write does not fit in the remaining space.
    #[error("buffer overflow: need {needed} bytes, {space} available")]
    Overflow { needed: usize, space: usize },

    /// The operation is only valid for the other direction.
    #[error("operation requires a {expected:?} buffer, this one is {actual:?}")]
    DirectionMismatch {
        expected: BufferDirection,
        actual: BufferDirection,
    },
}

/// Fixed-capacity byte buffer with independent read and write positions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IoBuffer {
    data: Vec<u8>,
    read_pos: usize,
    write_pos: usize,
    direction: BufferDirection,
}

impl IoBuffer {
    /// Allocates a zeroed buffer of `capacity` bytes.
    pub fn new(capacity: usize, direction: BufferDirection) -> Self {
        Self {
            data: vec![0; capacity],
            read_pos: 0,
            write_pos: 0,
            direction,
        }
    }

    pub fn rx(capacity: usize) -> Self {
        Self::new(capacity, BufferDirection::Rx)
    }

    pub fn tx(capacity: usize) -> Self {
        Self::new(capacity, BufferDirection::Tx)
    }

    pub fn direction(&self) -> BufferDirection {
        self.direction
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Number of written bytes not yet consumed.
    pub fn available(&self) -> usize {
        self.write_pos - self.read_pos
    }

    /// Number of bytes that can still be appended.
    pub fn space(&self) -> usize {
        self.data.len() - self.write_pos
    }

    pub fn is_empty(&self) -> bool {
        self.available() == 0
    }

    /// The written, unconsumed bytes.
    pub fn readable(&self) -> &[u8] {
        &self.data[self.read_pos..self.write_pos]
    }

    /// The free tail of the buffer.  Call [`commit`](Self::commit) after
    /// filling part of it.
    pub fn spare_mut(&mut self) -> &mut [u8] {
        &mut self.data[self.write_pos..]
    }

    /// Marks `n` bytes of the spare region as written.  Clamped to the space
    /// left.
    pub fn commit(&mut self, n: usize) {
        self.write_pos += n.min(self.space());
    }

    /// Marks `n` readable bytes as consumed.  Clamped to what is available.
    pub fn consume(&mut self, n: usize) {
        self.read_pos += n.min(self.available());
        if self.read_pos == self.write_pos {
            self.reset();
        }
    }

    /// Discards all content.
    pub fn reset(&mut self) {
        self.read_pos = 0;
        self.write_pos = 0;
    }

    /// Moves the readable bytes to the front, maximising [`space`](Self::space).
    pub fn compact(&mut self) {
        if self.read_pos == 0 {
            return;
        }
        self.data.copy_within(self.read_pos..self.write_pos, 0);
        self.write_pos -= self.read_pos;
        self.read_pos = 0;
    }

    /// Appends `bytes` to a transmit buffer.
    ///
    /// # Errors
    ///
    /// - [`BufferError::DirectionMismatch`] on a receive buffer.
    /// - [`BufferError::Overflow`] if `bytes` does not fit; nothing is written.
    pub fn extend_from_slice(&mut self, bytes: &[u8]) -> Result<(), BufferError> {
        self.ensure_direction(BufferDirection::Tx)?;
        if bytes.len() > self.space() {
            return Err(BufferError::Overflow {
                needed: bytes.len(),
                space: self.space(),
            });
        }
        self.data[self.write_pos..self.write_pos + bytes.len()].copy_from_slice(bytes);
        self.write_pos += bytes.len();
        Ok(())
    }

    /// Fails with [`BufferError::DirectionMismatch`] unless the buffer flows
    /// in the `expected` direction.
    pub fn ensure_direction(&self, expected: BufferDirection) -> Result<(), BufferError> {
        if self.direction == expected {
            Ok(())
        } else {
            Err(BufferError::DirectionMismatch {
                expected,
                actual: self.direction,
            })
        }
    }

    /// Replaces the readable region with `packet`, keeping `read_pos`.
    ///
    /// Used by in-place packet rewrites; the caller has already checked that
    /// `packet` fits.
    pub(crate) fn replace_readable(&mut self, packet: &[u8]) {
        let end = self.read_pos + packet.len();
        self.data[self.read_pos..end].copy_from_slice(packet);
        self.write_pos = end;
    }

    /// Room for a rewritten packet starting at `read_pos`.
    pub(crate) fn room_from_read_pos(&self) -> usize {
        self.data.len() - self.read_pos
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
