//! Fixed-capacity packet buffer with a bit-packed body serializer.
//!
//! Values are packed little-endian within 64-bit words, lowest bit first,
//! and may straddle word boundaries. Writing a `u8` then a `u32` costs 40
//! bits; nothing is byte-aligned unless the caller makes it so.
//!
//! Capacity is fixed by the address family and tag kind so that every
//! packet fits into one unfragmented datagram:
//!
//! | family | tag       | body words | max bytes |
//! |--------|-----------|------------|-----------|
//! | IPv4   | secure    | 65         | 544       |
//! | IPv4   | insecure  | 66         | 548       |
//! | IPv6   | secure    | 151        | 1232      |
//! | IPv6   | insecure  | 151        | 1228      |

use std::marker::PhantomData;

use crate::address::AddressFamily;
use crate::core::{MAX_BODY_WORDS, PACKET_HEADER_SIZE, PROTOCOL_ID, PacketError};
use crate::crypto::KeyBuffer;

use super::header::{BitCursor, InsecureTag, PacketHeader, PacketMeta, PacketTag, SecureTag};

/// Upper bound on header + body bytes, the region covered by packet
/// authentication.
pub(crate) const SIGNED_BYTES_MAX: usize = PACKET_HEADER_SIZE + MAX_BODY_WORDS * 8;

const KEY_BITS: usize = 256;

#[inline]
fn shl(value: u64, bits: u32) -> u64 {
    value.checked_shl(bits).unwrap_or(0)
}

#[inline]
fn shr(value: u64, bits: u32) -> u64 {
    value.checked_shr(bits).unwrap_or(0)
}

/// Mask of the `bits` lowest bits, `bits` in `0..=64`.
#[inline]
fn low_bits(bits: u32) -> u64 {
    shl(1, bits).wrapping_sub(1)
}

/// All ones when `spill` is 1, zero when it is 0.
#[inline]
fn spill_mask(spill: u32) -> u64 {
    u64::from(spill).wrapping_neg()
}

/// Packet on authenticated or encrypted connections.
pub type SecurePacket<A> = PacketBuffer<SecureTag, A>;

/// Packet on insecure connections.
pub type InsecurePacket<A> = PacketBuffer<InsecureTag, A>;

/// One packet: tag area, header, body and local metadata.
///
/// The body is append-only while writing. [`PacketBuffer::rewind`] moves the
/// cursor back to the start for reading; reads never go past the declared
/// body size.
#[derive(Debug, Clone)]
pub struct PacketBuffer<T: PacketTag, A: AddressFamily> {
    /// Tag area, filled in by the writer.
    pub tag: T,
    /// Header; `sequence` is stamped by the writer.
    pub header: PacketHeader,
    meta: PacketMeta,
    scratch: u64,
    body: [u64; MAX_BODY_WORDS],
    family: PhantomData<A>,
}

impl<T: PacketTag, A: AddressFamily> PacketBuffer<T, A> {
    /// Body capacity in 64-bit words.
    pub const BODY_WORDS: usize = (A::PAYLOAD_BYTES_MAX - T::BYTES - PACKET_HEADER_SIZE) / 8;

    /// Body capacity in bytes.
    pub const BODY_BYTES: usize = Self::BODY_WORDS * 8;

    /// Body capacity in bits.
    pub const BODY_BITS: usize = Self::BODY_BYTES * 8;

    /// Tag area plus header.
    pub const PREFIX_BYTES: usize = T::BYTES + PACKET_HEADER_SIZE;

    /// Size of a full-size packet on the wire.
    pub const BYTES_MAX: usize = Self::PREFIX_BYTES + Self::BODY_BYTES;

    const FITS: () = assert!(Self::BODY_WORDS <= MAX_BODY_WORDS);

    /// Create an empty packet of the given type.
    pub fn new(kind: u16) -> Self {
        let () = Self::FITS;
        Self {
            tag: T::default(),
            header: PacketHeader::new(kind),
            meta: PacketMeta::default(),
            scratch: 0,
            body: [0; MAX_BODY_WORDS],
            family: PhantomData,
        }
    }

    /// Local metadata.
    pub fn meta(&self) -> &PacketMeta {
        &self.meta
    }

    /// Identifier of the owning connection.
    pub fn connection_id(&self) -> u32 {
        self.meta.connection_id
    }

    /// Attach the packet to a connection.
    pub fn set_connection_id(&mut self, id: u32) {
        self.meta.connection_id = id;
    }

    /// Whether this packet carries a handshake message.
    pub fn is_handshake(&self) -> bool {
        self.header.is_handshake()
    }

    /// Meaningful body bytes.
    pub fn body_size(&self) -> usize {
        usize::from(self.meta.body_size)
    }

    /// Size on the wire.
    pub fn byte_size(&self) -> usize {
        Self::PREFIX_BYTES + self.body_size()
    }

    /// Whether the body spans the whole capacity.
    pub fn is_full_size(&self) -> bool {
        self.body_size() == Self::BODY_BYTES
    }

    /// Current cursor position in bits.
    pub fn bit_position(&self) -> usize {
        self.meta.cursor.position()
    }

    /// Move the cursor back to the start of the body.
    pub fn rewind(&mut self) {
        self.meta.cursor = BitCursor::default();
        self.scratch = 0;
    }

    /// Drop the body, keeping tag, header and connection id.
    pub fn clear(&mut self) {
        self.body = [0; MAX_BODY_WORDS];
        self.meta.body_size = 0;
        self.rewind();
    }

    // =========================================================================
    // Writing
    // =========================================================================

    fn writable_bits(&self) -> usize {
        Self::BODY_BITS.saturating_sub(self.bit_position())
    }

    fn ensure_writable(&self, bits: usize) -> Result<(), PacketError> {
        let remaining = self.writable_bits();
        if bits > remaining {
            return Err(PacketError::BodyFull {
                requested: bits,
                remaining,
            });
        }
        Ok(())
    }

    /// Append the `bits` lowest bits of `value`, `bits` in `1..=64`.
    fn write_bits(&mut self, value: u64, bits: u32) -> Result<(), PacketError> {
        self.ensure_writable(bits as usize)?;

        let word = usize::from(self.meta.cursor.word);
        let bit = u32::from(self.meta.cursor.bit);
        let value = value & low_bits(bits);
        let advanced = bit + bits;
        let spill = advanced >> 6;

        // Reads and rewinds move the cursor; bits below it are kept.
        self.scratch = self.body[word] & low_bits(bit);
        self.scratch |= shl(value, bit);
        self.body[word] = self.scratch;

        // On spill the bits that did not fit seed the next word.
        let mask = spill_mask(spill);
        self.scratch = (mask & shr(value, 64 - bit)) | (!mask & self.scratch);

        let next = word + spill as usize;
        if let Some(slot) = self.body[..Self::BODY_WORDS].get_mut(next) {
            *slot = self.scratch;
        }

        self.meta.cursor = BitCursor {
            word: next as u16,
            bit: (advanced & 63) as u8,
        };
        let written = self.meta.cursor.position().div_ceil(8) as u16;
        self.meta.body_size = self.meta.body_size.max(written);
        Ok(())
    }

    /// Append one bit.
    pub fn serialize_bool(&mut self, value: bool) -> Result<(), PacketError> {
        self.write_bits(u64::from(value), 1)
    }

    /// Append 8 bits.
    pub fn serialize_u8(&mut self, value: u8) -> Result<(), PacketError> {
        self.write_bits(u64::from(value), 8)
    }

    /// Append 16 bits.
    pub fn serialize_u16(&mut self, value: u16) -> Result<(), PacketError> {
        self.write_bits(u64::from(value), 16)
    }

    /// Append 32 bits.
    pub fn serialize_u32(&mut self, value: u32) -> Result<(), PacketError> {
        self.write_bits(u64::from(value), 32)
    }

    /// Append 64 bits.
    pub fn serialize_u64(&mut self, value: u64) -> Result<(), PacketError> {
        self.write_bits(value, 64)
    }

    /// Append a 32-byte key as four 64-bit words. Nothing is written unless
    /// the whole key fits.
    pub fn serialize_key(&mut self, key: &KeyBuffer) -> Result<(), PacketError> {
        self.ensure_writable(KEY_BITS)?;
        for word in key.to_words() {
            self.write_bits(word, 64)?;
        }
        Ok(())
    }

    /// Append raw bytes, 8 bits each. Nothing is written unless all of them
    /// fit.
    pub fn serialize_bytes(&mut self, bytes: &[u8]) -> Result<(), PacketError> {
        self.ensure_writable(bytes.len() * 8)?;
        for &byte in bytes {
            self.write_bits(u64::from(byte), 8)?;
        }
        Ok(())
    }

    /// Pad the body to full capacity. Idempotent.
    pub fn serialize_padding(&mut self) {
        self.scratch = 0;
        self.meta.cursor = BitCursor {
            word: Self::BODY_WORDS as u16,
            bit: 0,
        };
        self.meta.body_size = Self::BODY_BYTES as u16;
    }

    // =========================================================================
    // Reading
    // =========================================================================

    fn readable_bits(&self) -> usize {
        (self.body_size() * 8).saturating_sub(self.bit_position())
    }

    fn ensure_readable(&self, bits: usize) -> Result<(), PacketError> {
        let remaining = self.readable_bits();
        if bits > remaining {
            return Err(PacketError::BodyExhausted {
                requested: bits,
                remaining,
            });
        }
        Ok(())
    }

    /// Consume `bits` bits, `bits` in `1..=64`.
    fn read_bits(&mut self, bits: u32) -> Result<u64, PacketError> {
        self.ensure_readable(bits as usize)?;

        let word = usize::from(self.meta.cursor.word);
        let bit = u32::from(self.meta.cursor.bit);
        let advanced = bit + bits;
        let spill = advanced >> 6;

        let low = shr(self.body[word], bit);
        let next = self.body.get(word + 1).copied().unwrap_or(0);
        let high = spill_mask(spill) & shl(next, 64 - bit);

        self.meta.cursor = BitCursor {
            word: (word + spill as usize) as u16,
            bit: (advanced & 63) as u8,
        };
        Ok((low | high) & low_bits(bits))
    }

    /// Consume one bit.
    pub fn deserialize_bool(&mut self) -> Result<bool, PacketError> {
        Ok(self.read_bits(1)? != 0)
    }

    /// Consume 8 bits.
    pub fn deserialize_u8(&mut self) -> Result<u8, PacketError> {
        Ok(self.read_bits(8)? as u8)
    }

    /// Consume 16 bits.
    pub fn deserialize_u16(&mut self) -> Result<u16, PacketError> {
        Ok(self.read_bits(16)? as u16)
    }

    /// Consume 32 bits.
    pub fn deserialize_u32(&mut self) -> Result<u32, PacketError> {
        Ok(self.read_bits(32)? as u32)
    }

    /// Consume 64 bits.
    pub fn deserialize_u64(&mut self) -> Result<u64, PacketError> {
        self.read_bits(64)
    }

    /// Consume a 32-byte key. The cursor does not move unless the whole key
    /// is available.
    pub fn deserialize_key(&mut self) -> Result<KeyBuffer, PacketError> {
        self.ensure_readable(KEY_BITS)?;
        let mut words = [0u64; 4];
        for word in &mut words {
            *word = self.read_bits(64)?;
        }
        Ok(KeyBuffer::from_words(words))
    }

    /// Fill `out` with bytes, 8 bits each. The cursor does not move unless
    /// all of them are available.
    pub fn deserialize_bytes(&mut self, out: &mut [u8]) -> Result<(), PacketError> {
        self.ensure_readable(out.len() * 8)?;
        for byte in out.iter_mut() {
            *byte = self.read_bits(8)? as u8;
        }
        Ok(())
    }

    // =========================================================================
    // Wire format
    // =========================================================================

    /// Copy the first `out.len()` body bytes into `out`.
    pub(crate) fn copy_body_to(&self, out: &mut [u8]) {
        for (chunk, word) in out.chunks_mut(8).zip(self.body.iter()) {
            let bytes = word.to_le_bytes();
            chunk.copy_from_slice(&bytes[..chunk.len()]);
        }
    }

    /// Replace the body with `bytes`, at most [`Self::BODY_BYTES`] of them.
    pub(crate) fn load_body(&mut self, bytes: &[u8]) {
        let bytes = &bytes[..bytes.len().min(Self::BODY_BYTES)];
        self.body = [0; MAX_BODY_WORDS];
        for (word, chunk) in self.body.iter_mut().zip(bytes.chunks(8)) {
            let mut raw = [0u8; 8];
            raw[..chunk.len()].copy_from_slice(chunk);
            *word = u64::from_le_bytes(raw);
        }
        self.meta.body_size = bytes.len() as u16;
    }

    /// Header followed by body: the bytes covered by authentication.
    pub(crate) fn signed_bytes<'a>(&self, out: &'a mut [u8; SIGNED_BYTES_MAX]) -> &'a [u8] {
        let end = PACKET_HEADER_SIZE + self.body_size();
        out[..PACKET_HEADER_SIZE].copy_from_slice(&self.header.to_bytes());
        self.copy_body_to(&mut out[PACKET_HEADER_SIZE..end]);
        &out[..end]
    }

    /// `out.len()` must equal [`Self::byte_size`].
    fn encode_exact(&self, out: &mut [u8]) {
        let (tag, rest) = out.split_at_mut(T::BYTES);
        let (header, body) = rest.split_at_mut(PACKET_HEADER_SIZE);
        self.tag.write_to(tag);
        header.copy_from_slice(&self.header.to_bytes());
        self.copy_body_to(body);
    }

    /// Encode into `out`, returning the number of bytes written.
    pub fn encode_into(&self, out: &mut [u8]) -> Result<usize, PacketError> {
        let len = self.byte_size();
        let available = out.len();
        let out = out.get_mut(..len).ok_or(PacketError::TooShort {
            expected: len,
            actual: available,
        })?;
        self.encode_exact(out);
        Ok(len)
    }

    /// Encode into a freshly allocated datagram.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = vec![0u8; self.byte_size()];
        self.encode_exact(&mut out);
        out
    }

    /// Decode a datagram.
    ///
    /// The body size is whatever follows the header; the cursor starts at
    /// the beginning of the body.
    pub fn decode(bytes: &[u8]) -> Result<Self, PacketError> {
        if bytes.len() < Self::PREFIX_BYTES {
            return Err(PacketError::TooShort {
                expected: Self::PREFIX_BYTES,
                actual: bytes.len(),
            });
        }
        if bytes.len() > Self::BYTES_MAX {
            return Err(PacketError::TooLong {
                expected: Self::BYTES_MAX,
                actual: bytes.len(),
            });
        }

        let (tag, rest) = bytes.split_at(T::BYTES);
        let (header, body) = rest.split_at(PACKET_HEADER_SIZE);

        let mut raw = [0u8; PACKET_HEADER_SIZE];
        raw.copy_from_slice(header);
        let header = PacketHeader::from_bytes(&raw);
        if header.protocol != PROTOCOL_ID {
            return Err(PacketError::ProtocolMismatch(header.protocol));
        }

        let mut packet = Self::new(header.kind);
        packet.header = header;
        packet.tag = T::read_from(tag);
        packet.load_body(body);
        Ok(packet)
    }
}

impl<T: PacketTag, A: AddressFamily> Default for PacketBuffer<T, A> {
    fn default() -> Self {
        Self::new(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::{Ipv4, Ipv6};

    type Secure4 = SecurePacket<Ipv4>;
    type Insecure4 = InsecurePacket<Ipv4>;
    type Secure6 = SecurePacket<Ipv6>;
    type Insecure6 = InsecurePacket<Ipv6>;

    #[test]
    fn test_capacities() {
        assert_eq!(Secure4::BODY_WORDS, 65);
        assert_eq!(Secure4::BYTES_MAX, 544);
        assert_eq!(Insecure4::BODY_WORDS, 66);
        assert_eq!(Insecure4::BYTES_MAX, 548);
        assert_eq!(Secure6::BODY_WORDS, 151);
        assert_eq!(Secure6::BYTES_MAX, 1232);
        assert_eq!(Insecure6::BODY_WORDS, 151);
        assert_eq!(Insecure6::BYTES_MAX, 1228);
    }

    #[test]
    fn test_mixed_roundtrip() {
        let mut packet = Secure4::new(7);
        packet.serialize_bool(true).unwrap();
        packet.serialize_u8(0xAB).unwrap();
        packet.serialize_u16(0xBEEF).unwrap();
        packet.serialize_bool(false).unwrap();
        packet.serialize_u32(0xDEADBEEF).unwrap();
        packet.serialize_u64(0x0123_4567_89AB_CDEF).unwrap();
        assert_eq!(packet.bit_position(), 1 + 8 + 16 + 1 + 32 + 64);

        packet.rewind();
        assert!(packet.deserialize_bool().unwrap());
        assert_eq!(packet.deserialize_u8().unwrap(), 0xAB);
        assert_eq!(packet.deserialize_u16().unwrap(), 0xBEEF);
        assert!(!packet.deserialize_bool().unwrap());
        assert_eq!(packet.deserialize_u32().unwrap(), 0xDEADBEEF);
        assert_eq!(packet.deserialize_u64().unwrap(), 0x0123_4567_89AB_CDEF);
    }

    #[test]
    fn test_write_after_read_keeps_earlier_bits() {
        let mut packet = Secure4::new(0);
        packet.serialize_u8(0xAA).unwrap();
        packet.serialize_u8(0xBB).unwrap();

        packet.rewind();
        assert_eq!(packet.deserialize_u8().unwrap(), 0xAA);
        packet.serialize_u8(0xCC).unwrap();

        packet.rewind();
        assert_eq!(packet.deserialize_u8().unwrap(), 0xAA);
        assert_eq!(packet.deserialize_u8().unwrap(), 0xCC);
        assert_eq!(packet.body_size(), 2);
    }

    #[test]
    fn test_write_after_read_across_words() {
        let mut packet = Insecure4::new(0);
        for i in 0..60u32 {
            packet.serialize_bool(i % 2 == 0).unwrap();
        }
        packet.serialize_u32(0).unwrap();

        packet.rewind();
        for i in 0..60u32 {
            assert_eq!(packet.deserialize_bool().unwrap(), i % 2 == 0);
        }
        packet.serialize_u32(0x1357_9BDF).unwrap();

        packet.rewind();
        for i in 0..60u32 {
            assert_eq!(packet.deserialize_bool().unwrap(), i % 2 == 0);
        }
        assert_eq!(packet.deserialize_u32().unwrap(), 0x1357_9BDF);
    }

    #[test]
    fn test_every_width_crosses_a_word() {
        let key = KeyBuffer::from_bytes(std::array::from_fn(|i| i as u8 ^ 0x5A));
        for offset in 57usize..=64 {
            let mut packet = Insecure6::new(1);
            let fill = |packet: &mut Insecure6| {
                for i in 0..offset {
                    packet.serialize_bool(i % 5 == 1).unwrap();
                }
            };
            let check = |packet: &mut Insecure6| {
                for i in 0..offset {
                    assert_eq!(packet.deserialize_bool().unwrap(), i % 5 == 1);
                }
            };

            fill(&mut packet);
            packet.serialize_u8(0xA5).unwrap();
            packet.rewind();
            check(&mut packet);
            assert_eq!(packet.deserialize_u8().unwrap(), 0xA5, "u8 at {offset}");

            packet.clear();
            fill(&mut packet);
            packet.serialize_u16(0xC3A5).unwrap();
            packet.rewind();
            check(&mut packet);
            assert_eq!(packet.deserialize_u16().unwrap(), 0xC3A5, "u16 at {offset}");

            packet.clear();
            fill(&mut packet);
            packet.serialize_u32(0x8765_C3A5).unwrap();
            packet.rewind();
            check(&mut packet);
            assert_eq!(packet.deserialize_u32().unwrap(), 0x8765_C3A5, "u32 at {offset}");

            packet.clear();
            fill(&mut packet);
            packet.serialize_key(&key).unwrap();
            packet.serialize_u8(0x7E).unwrap();
            assert_eq!(packet.bit_position(), offset + 256 + 8);
            packet.rewind();
            check(&mut packet);
            assert!(packet.deserialize_key().unwrap() == key, "key at {offset}");
            assert_eq!(packet.deserialize_u8().unwrap(), 0x7E);
        }
    }

    #[test]
    fn test_word_boundaries() {
        for offset in [0usize, 1, 63, 64, 65, 127] {
            let mut packet = Insecure6::new(1);
            for i in 0..offset {
                packet.serialize_bool(i % 3 == 0).unwrap();
            }
            packet.serialize_u64(0xF0E1_D2C3_B4A5_9687).unwrap();
            packet.serialize_u16(0x1234).unwrap();
            assert_eq!(packet.bit_position(), offset + 80);

            packet.rewind();
            for i in 0..offset {
                assert_eq!(packet.deserialize_bool().unwrap(), i % 3 == 0);
            }
            assert_eq!(packet.deserialize_u64().unwrap(), 0xF0E1_D2C3_B4A5_9687);
            assert_eq!(packet.deserialize_u16().unwrap(), 0x1234);
        }
    }

    #[test]
    fn test_bit_packing_layout() {
        let mut packet = Secure4::new(0);
        packet.serialize_u8(0x01).unwrap();
        packet.serialize_u32(0xAABBCCDD).unwrap();

        assert_eq!(packet.body_size(), 5);
        let mut out = [0u8; 5];
        packet.copy_body_to(&mut out);
        assert_eq!(out, [0x01, 0xDD, 0xCC, 0xBB, 0xAA]);
    }

    #[test]
    fn test_body_size_rounds_up() {
        let mut packet = Secure4::new(0);
        packet.serialize_bool(true).unwrap();
        assert_eq!(packet.body_size(), 1);
        assert_eq!(packet.byte_size(), Secure4::PREFIX_BYTES + 1);

        for _ in 0..8 {
            packet.serialize_bool(false).unwrap();
        }
        assert_eq!(packet.body_size(), 2);
    }

    #[test]
    fn test_body_full() {
        let mut packet = Secure4::new(0);
        for i in 0..Secure4::BODY_WORDS as u64 {
            packet.serialize_u64(i).unwrap();
        }
        assert!(packet.is_full_size());

        assert_eq!(
            packet.serialize_bool(true),
            Err(PacketError::BodyFull {
                requested: 1,
                remaining: 0
            })
        );

        packet.rewind();
        for i in 0..Secure4::BODY_WORDS as u64 {
            assert_eq!(packet.deserialize_u64().unwrap(), i);
        }
    }

    #[test]
    fn test_key_write_is_all_or_nothing() {
        let mut packet = Secure4::new(0);
        for _ in 0..Secure4::BODY_WORDS - 3 {
            packet.serialize_u64(u64::MAX).unwrap();
        }
        let before = packet.bit_position();

        let key = KeyBuffer::from_bytes([9; 32]);
        assert!(matches!(
            packet.serialize_key(&key),
            Err(PacketError::BodyFull { requested: 256, .. })
        ));
        assert_eq!(packet.bit_position(), before);
    }

    #[test]
    fn test_key_roundtrip() {
        let key = KeyBuffer::from_bytes(std::array::from_fn(|i| (i * 7) as u8));
        let mut packet = Secure6::new(0);
        packet.serialize_bool(true).unwrap();
        packet.serialize_key(&key).unwrap();

        packet.rewind();
        assert!(packet.deserialize_bool().unwrap());
        assert_eq!(packet.deserialize_key().unwrap(), key);
    }

    #[test]
    fn test_read_past_body() {
        let mut packet = Secure4::new(0);
        packet.serialize_u8(0x42).unwrap();
        packet.rewind();

        assert_eq!(
            packet.deserialize_u16(),
            Err(PacketError::BodyExhausted {
                requested: 16,
                remaining: 8
            })
        );
        // A failed read leaves the cursor where it was
        assert_eq!(packet.deserialize_u8().unwrap(), 0x42);
        assert!(packet.deserialize_bool().is_err());
    }

    #[test]
    fn test_read_empty_body() {
        let mut packet = Insecure4::new(0);
        assert!(packet.deserialize_key().is_err());
        assert!(packet.deserialize_u64().is_err());
        assert_eq!(packet.bit_position(), 0);
    }

    #[test]
    fn test_padding_is_idempotent() {
        let mut packet = Secure4::new(0);
        packet.serialize_u32(5).unwrap();
        packet.serialize_padding();
        assert!(packet.is_full_size());
        assert_eq!(packet.byte_size(), Secure4::BYTES_MAX);

        packet.serialize_padding();
        assert_eq!(packet.byte_size(), Secure4::BYTES_MAX);
        assert_eq!(packet.bit_position(), Secure4::BODY_BITS);
        assert!(packet.serialize_bool(true).is_err());

        packet.rewind();
        assert_eq!(packet.deserialize_u32().unwrap(), 5);
        assert_eq!(packet.deserialize_u32().unwrap(), 0);
    }

    #[test]
    fn test_bytes_roundtrip() {
        let mut packet = Secure4::new(0);
        packet.serialize_bool(true).unwrap();
        packet.serialize_bytes(b"saltline").unwrap();

        packet.rewind();
        let mut out = [0u8; 8];
        assert!(packet.deserialize_bool().unwrap());
        packet.deserialize_bytes(&mut out).unwrap();
        assert_eq!(&out, b"saltline");
    }

    #[test]
    fn test_wire_roundtrip() {
        let mut packet = Insecure4::new(42);
        packet.tag = InsecureTag {
            salt: 0x55,
            checksum: 0,
        };
        packet.header.sequence = 300;
        packet.header.acknowledged = 299;
        packet.serialize_u16(0xCAFE).unwrap();
        packet.serialize_bool(true).unwrap();

        let bytes = packet.to_bytes();
        assert_eq!(bytes.len(), Insecure4::PREFIX_BYTES + 3);

        let mut decoded = Insecure4::decode(&bytes).unwrap();
        assert_eq!(decoded.tag, packet.tag);
        assert_eq!(decoded.header, packet.header);
        assert_eq!(decoded.body_size(), 3);
        assert_eq!(decoded.bit_position(), 0);
        assert_eq!(decoded.deserialize_u16().unwrap(), 0xCAFE);
        assert!(decoded.deserialize_bool().unwrap());
    }

    #[test]
    fn test_encode_into() {
        let mut packet = Secure4::new(3);
        packet.serialize_u8(1).unwrap();

        let mut out = [0u8; 64];
        let len = packet.encode_into(&mut out).unwrap();
        assert_eq!(len, Secure4::PREFIX_BYTES + 1);
        assert_eq!(&out[..len], packet.to_bytes().as_slice());

        let mut small = [0u8; 10];
        assert!(matches!(
            packet.encode_into(&mut small),
            Err(PacketError::TooShort { .. })
        ));
    }

    #[test]
    fn test_decode_rejects_malformed() {
        assert!(matches!(
            Secure4::decode(&[0u8; 23]),
            Err(PacketError::TooShort {
                expected: 24,
                actual: 23
            })
        ));
        assert!(matches!(
            Secure4::decode(&[0u8; 545]),
            Err(PacketError::TooLong {
                expected: 544,
                actual: 545
            })
        ));

        let mut bytes = Secure4::new(0).to_bytes();
        bytes[16] = 0x00;
        assert!(matches!(
            Secure4::decode(&bytes),
            Err(PacketError::ProtocolMismatch(_))
        ));
    }

    #[test]
    fn test_signed_bytes() {
        let mut packet = Secure4::new(9);
        packet.serialize_u16(0x0201).unwrap();

        let mut scratch = [0u8; SIGNED_BYTES_MAX];
        let signed = packet.signed_bytes(&mut scratch);
        assert_eq!(signed.len(), PACKET_HEADER_SIZE + 2);
        assert_eq!(&signed[..PACKET_HEADER_SIZE], &packet.header.to_bytes());
        assert_eq!(&signed[PACKET_HEADER_SIZE..], &[0x01, 0x02]);
    }

    #[test]
    fn test_load_body_resets_tail() {
        let mut packet = Secure4::new(0);
        packet.serialize_u64(u64::MAX).unwrap();
        packet.serialize_u64(u64::MAX).unwrap();

        packet.load_body(&[1, 2, 3]);
        assert_eq!(packet.body_size(), 3);
        let mut out = [0u8; 8];
        packet.copy_body_to(&mut out);
        assert_eq!(out, [1, 2, 3, 0, 0, 0, 0, 0]);
    }
}
