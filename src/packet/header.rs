//! Fixed-layout parts of a packet: tag area, header and local metadata.
//!
//! Wire layout (all integers little-endian):
//!
//! ```text
//! +-----------+----------+----------+--------------+----------+-----------+
//! | tag area  | protocol | sequence | acknowledged |   type   |   body    |
//! | 12/16 B   |  2 B     |   2 B    |     2 B      |   2 B    | <= N words|
//! +-----------+----------+----------+--------------+----------+-----------+
//! ```
//!
//! The tag area is 16 bytes on authenticated and encrypted connections (one
//! authentication tag) and 12 bytes on insecure ones (salt, checksum and two
//! reserved zero bytes).

use std::fmt::Debug;

use crate::core::{
    AUTH_TAG_SIZE, HANDSHAKE_PACKET_TYPE, INSECURE_TAG_SIZE, PACKET_HEADER_SIZE, PROTOCOL_ID,
};
use crate::crypto::AuthTag;

/// Per-packet header, authenticated but never encrypted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    /// Protocol identifier, always [`PROTOCOL_ID`] on accepted packets.
    pub protocol: u16,
    /// Wire sequence number, stamped by the writer.
    pub sequence: u16,
    /// Last sequence number seen from the peer.
    pub acknowledged: u16,
    /// Application packet type. [`HANDSHAKE_PACKET_TYPE`] is reserved.
    pub kind: u16,
}

impl PacketHeader {
    /// A header of the given packet type.
    pub const fn new(kind: u16) -> Self {
        Self {
            protocol: PROTOCOL_ID,
            sequence: 0,
            acknowledged: 0,
            kind,
        }
    }

    /// Whether this packet carries a handshake message.
    pub const fn is_handshake(&self) -> bool {
        self.kind == HANDSHAKE_PACKET_TYPE
    }

    /// Wire encoding.
    pub fn to_bytes(&self) -> [u8; PACKET_HEADER_SIZE] {
        let mut out = [0u8; PACKET_HEADER_SIZE];
        out[0..2].copy_from_slice(&self.protocol.to_le_bytes());
        out[2..4].copy_from_slice(&self.sequence.to_le_bytes());
        out[4..6].copy_from_slice(&self.acknowledged.to_le_bytes());
        out[6..8].copy_from_slice(&self.kind.to_le_bytes());
        out
    }

    /// Wire decoding. Does not check the protocol identifier.
    pub fn from_bytes(bytes: &[u8; PACKET_HEADER_SIZE]) -> Self {
        Self {
            protocol: u16::from_le_bytes([bytes[0], bytes[1]]),
            sequence: u16::from_le_bytes([bytes[2], bytes[3]]),
            acknowledged: u16::from_le_bytes([bytes[4], bytes[5]]),
            kind: u16::from_le_bytes([bytes[6], bytes[7]]),
        }
    }
}

impl Default for PacketHeader {
    fn default() -> Self {
        Self::new(0)
    }
}

/// Serializer position: a body word and a bit inside it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BitCursor {
    /// Word index.
    pub word: u16,
    /// Bit index inside the word, `0..64`.
    pub bit: u8,
}

impl BitCursor {
    /// Absolute bit position.
    pub const fn position(&self) -> usize {
        self.word as usize * 64 + self.bit as usize
    }
}

/// Local bookkeeping that never goes on the wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PacketMeta {
    /// Identifier of the connection the packet belongs to, assigned by the
    /// demultiplexer.
    pub connection_id: u32,
    /// Meaningful body bytes.
    pub body_size: u16,
    /// Serializer cursor.
    pub cursor: BitCursor,
}

/// Contents of a packet's tag area.
pub trait PacketTag: Copy + Default + Debug + PartialEq + Send + Sync + 'static {
    /// Size of the tag area on the wire.
    const BYTES: usize;

    /// Encode into exactly [`Self::BYTES`] bytes.
    fn write_to(&self, out: &mut [u8]);

    /// Decode from exactly [`Self::BYTES`] bytes.
    fn read_from(bytes: &[u8]) -> Self;
}

/// Authentication tag of an authenticated or encrypted packet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SecureTag(pub AuthTag);

impl PacketTag for SecureTag {
    const BYTES: usize = AUTH_TAG_SIZE;

    fn write_to(&self, out: &mut [u8]) {
        out.copy_from_slice(&self.0);
    }

    fn read_from(bytes: &[u8]) -> Self {
        let mut tag = [0u8; AUTH_TAG_SIZE];
        tag.copy_from_slice(bytes);
        Self(tag)
    }
}

/// Salt and optional checksum of an insecure packet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InsecureTag {
    /// Connection salt; zero on handshake carriers.
    pub salt: u64,
    /// CRC-16 over header and body, zero when checksums are off.
    pub checksum: u16,
}

impl PacketTag for InsecureTag {
    const BYTES: usize = INSECURE_TAG_SIZE;

    fn write_to(&self, out: &mut [u8]) {
        out[0..8].copy_from_slice(&self.salt.to_le_bytes());
        out[8..10].copy_from_slice(&self.checksum.to_le_bytes());
        out[10..12].fill(0);
    }

    fn read_from(bytes: &[u8]) -> Self {
        let mut salt = [0u8; 8];
        salt.copy_from_slice(&bytes[0..8]);
        Self {
            salt: u64::from_le_bytes(salt),
            checksum: u16::from_le_bytes([bytes[8], bytes[9]]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_layout() {
        let header = PacketHeader {
            protocol: PROTOCOL_ID,
            sequence: 0x0102,
            acknowledged: 0x0304,
            kind: 0x0506,
        };
        let bytes = header.to_bytes();

        assert_eq!(bytes, [0x4E, 0x52, 0x02, 0x01, 0x04, 0x03, 0x06, 0x05]);
        assert_eq!(PacketHeader::from_bytes(&bytes), header);
    }

    #[test]
    fn test_handshake_kind() {
        assert!(PacketHeader::new(HANDSHAKE_PACKET_TYPE).is_handshake());
        assert!(!PacketHeader::new(7).is_handshake());
    }

    #[test]
    fn test_cursor_position() {
        let cursor = BitCursor { word: 2, bit: 5 };
        assert_eq!(cursor.position(), 133);
    }

    #[test]
    fn test_insecure_tag_layout() {
        let tag = InsecureTag {
            salt: 0x1122334455667788,
            checksum: 0xBEEF,
        };
        let mut out = [0xFFu8; INSECURE_TAG_SIZE];
        tag.write_to(&mut out);

        assert_eq!(&out[0..8], &0x1122334455667788u64.to_le_bytes());
        assert_eq!(&out[8..10], &[0xEF, 0xBE]);
        assert_eq!(&out[10..12], &[0, 0]);
        assert_eq!(InsecureTag::read_from(&out), tag);
    }

    #[test]
    fn test_secure_tag_layout() {
        let tag = SecureTag([0x5A; AUTH_TAG_SIZE]);
        let mut out = [0u8; AUTH_TAG_SIZE];
        tag.write_to(&mut out);
        assert_eq!(SecureTag::read_from(&out), tag);
    }
}
