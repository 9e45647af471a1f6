//! In-place rewrite of the mDNS `sender-info` record.
//!
//! Every outgoing mDNS query carries a trailing TXT record named
//! `sender-info` telling routing nodes where to send their unicast reply:
//!
//! ```text
//! [0x0b]"sender-info" [ptr:2][type:2][class:2][ttl:4] [rdlength:2]
//!     <23 bytes of static TXT strings>
//!     [len]"sid=<search id>"
//!     [len]"ipv4=<address>"    or "ipv6=<address>"
//!     [len]"upcv4=<port>"      or "upcv6=<port>"
//! ```
//!
//! The serializer writes placeholder values.  Because the same query is sent
//! out of several interfaces, the messenger patches the last three strings
//! (and the record length) just before each transmission.
//!
//! The search id is the 16-bit big-endian value in the first two bytes of the
//! packet (the mDNS transaction id).

use std::net::SocketAddr;

use thiserror::Error;

use super::buffer::IoBuffer;

/// Label that starts the record: length byte followed by the name.
const MARKER: &[u8] = b"\x0bsender-info";

/// Offset of the record-data length from the start of [`MARKER`]:
/// label (12) + name pointer (2) + type (2) + class (2) + ttl (4).
const RDLENGTH_OFFSET: usize = 22;

/// Length of the static TXT strings preceding `sid=`.
const STATIC_TXT_LEN: usize = 23;

const SID_KEY: &[u8] = b"sid=";

/// Errors returned by [`rewrite_sender_info`].  The buffer is left untouched
/// whenever one of these is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SenderInfoError {
    /// Not even the two-byte search id is present.
    #[error("packet too short to carry a search id ({len} bytes)")]
    PacketTooShort { len: usize },

    #[error("sender-info record not found")]
    MarkerNotFound,

    /// More than one `sender-info` label; the record to patch is ambiguous.
    #[error("sender-info label appears {count} times")]
    AmbiguousMarker { count: usize },

    /// The packet ends before the `sid=` string.
    #[error("sender-info record truncated: need {needed} bytes, packet has {len}")]
    Truncated { needed: usize, len: usize },

    /// The string after the static block is not `sid=`.
    #[error("expected sid= after the static sender-info strings")]
    UnexpectedField,

    /// The rewritten packet does not fit in the buffer.
    #[error("rewritten packet needs {needed} bytes, buffer has room for {room}")]
    Overflow { needed: usize, room: usize },
}

/// Rewrites the `sender-info` record of the mDNS packet in `buf` so that it
/// advertises `reply_to`.
///
/// On success the buffer's write position sits right after the last
/// rewritten string.
///
/// # Errors
///
/// Returns [`SenderInfoError`] if the packet does not have the expected shape
/// or the result would not fit.  `buf` is unchanged in that case.
pub fn rewrite_sender_info(buf: &mut IoBuffer, reply_to: SocketAddr) -> Result<(), SenderInfoError> {
    let packet = buf.readable();
    if packet.len() < 2 {
        return Err(SenderInfoError::PacketTooShort { len: packet.len() });
    }
    let search_id = u16::from_be_bytes([packet[0], packet[1]]);

    let marker = find_marker(packet)?;
    let rdlength_at = marker + RDLENGTH_OFFSET;
    let sid_at = rdlength_at + 2 + STATIC_TXT_LEN;
    let needed = sid_at + 1 + SID_KEY.len();
    if packet.len() < needed {
        return Err(SenderInfoError::Truncated {
            needed,
            len: packet.len(),
        });
    }
    if &packet[sid_at + 1..needed] != SID_KEY {
        return Err(SenderInfoError::UnexpectedField);
    }

    let (ip_key, port_key, ip) = match reply_to {
        SocketAddr::V4(a) => ("ipv4=", "upcv4=", a.ip().to_string()),
        SocketAddr::V6(a) => ("ipv6=", "upcv6=", a.ip().to_string()),
    };
    let fields = [
        format!("sid={search_id}"),
        format!("{ip_key}{ip}"),
        format!("{port_key}{}", reply_to.port()),
    ];

    // Every string is at most 6 + 39 bytes, so the u8 and u16 casts are exact.
    let dynamic_len: usize = fields.iter().map(|f| 1 + f.len()).sum();
    let rdlength = (STATIC_TXT_LEN + dynamic_len) as u16;

    let mut rewritten = Vec::with_capacity(sid_at + dynamic_len);
    rewritten.extend_from_slice(&packet[..rdlength_at]);
    rewritten.extend_from_slice(&rdlength.to_be_bytes());
    rewritten.extend_from_slice(&packet[rdlength_at + 2..sid_at]);
    for field in &fields {
        rewritten.push(field.len() as u8);
        rewritten.extend_from_slice(field.as_bytes());
    }

    let room = buf.room_from_read_pos();
    if rewritten.len() > room {
        return Err(SenderInfoError::Overflow {
            needed: rewritten.len(),
            room,
        });
    }
    buf.replace_readable(&rewritten);
    Ok(())
}

/// Finds the single `sender-info` label, scanning from the end of the packet.
fn find_marker(packet: &[u8]) -> Result<usize, SenderInfoError> {
    let mut hits = packet
        .windows(MARKER.len())
        .enumerate()
        .rev()
        .filter(|(_, w)| *w == MARKER)
        .map(|(i, _)| i);

    let last = hits.next().ok_or(SenderInfoError::MarkerNotFound)?;
    let extra = hits.count();
    if extra > 0 {
        return Err(SenderInfoError::AmbiguousMarker { count: extra + 1 });
    }
    Ok(last)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
