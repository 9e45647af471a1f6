//! Protocol module containing wire constants, I/O buffers and the discovery
//! packet helpers.

pub mod buffer;
pub mod constants;
pub mod packet;
pub mod sender_info;

pub use buffer::{BufferDirection, BufferError, IoBuffer};
pub use packet::{PacketFamily, ReceivedPacket};
pub use sender_info::{rewrite_sender_info, SenderInfoError};
