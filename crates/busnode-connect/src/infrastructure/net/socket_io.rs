//! Single-call socket I/O and the error type shared by every live transport.
//!
//! [`send_once`] and [`recv_once`] each issue exactly one system call.  They
//! never loop, never retry and never wait; waiting is the job of
//! [`super::readiness::wait_readable`].  Keeping the two concerns apart means
//! a timeout or an interrupt can never be mistaken for a broken connection.

use std::io::{self, Read, Write};

use thiserror::Error;

/// I/O failure on an established transport.
///
/// Any of these means the connection is no longer usable; the owner must call
/// `disconnect`.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The send system call failed.
    #[error("send failed: {0}")]
    Write(#[source] io::Error),

    /// The receive system call failed.
    #[error("receive failed: {0}")]
    Read(#[source] io::Error),

    /// The peer closed the stream.
    #[error("connection closed by peer")]
    Closed,

    /// The handle was already disconnected.
    #[error("not connected")]
    NotConnected,

    /// The readiness wait itself failed.
    #[error("readiness wait failed: {0}")]
    Wait(#[source] io::Error),
}

/// Result of one bounded receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Received {
    /// This many bytes were appended to the receive buffer.
    Bytes(usize),
    /// Nothing arrived before the timeout.
    TimedOut,
    /// The wait was cut short by an interrupt.
    Interrupted,
}

/// Writes as much of `data` as one send call accepts.
///
/// # Errors
///
/// [`TransportError::Write`] if the call fails.
pub fn send_once<W: Write>(mut writer: W, data: &[u8]) -> Result<usize, TransportError> {
    writer.write(data).map_err(TransportError::Write)
}

/// Reads whatever one receive call returns into `buf`.
///
/// # Errors
///
/// - [`TransportError::Closed`] if the peer performed an orderly shutdown
///   (zero bytes into a non-empty buffer).
/// - [`TransportError::Read`] if the call fails.
pub fn recv_once<R: Read>(mut reader: R, buf: &mut [u8]) -> Result<usize, TransportError> {
    match reader.read(buf) {
        Ok(0) if !buf.is_empty() => Err(TransportError::Closed),
        Ok(n) => Ok(n),
        Err(e) => Err(TransportError::Read(e)),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
