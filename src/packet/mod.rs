//! Saltline - Packet Layer
//!
//! The unit of transmission and the bookkeeping around it:
//! - Tag area, header and local metadata
//! - Bit-packed body serializer with fixed, MTU-safe capacity
//! - Two-level sequence numbers and inbound acceptance window
//! - Replay bitmap over reconstructed nonces

mod buffer;
mod header;
mod replay;
mod sequence;

pub(crate) use buffer::SIGNED_BYTES_MAX;
pub use buffer::{InsecurePacket, PacketBuffer, SecurePacket};
pub use header::{BitCursor, InsecureTag, PacketHeader, PacketMeta, PacketTag, SecureTag};
pub use replay::ReplayWindow;
pub use sequence::PacketSequence;
