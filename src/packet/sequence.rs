//! Two-level packet sequence numbers.
//!
//! Only the low 16 bits (`number`) travel on the wire. Each side tracks the
//! `generation` it is in and reconstructs the full 32-bit nonce of an
//! inbound packet with [`PacketSequence::advance`].

use crate::core::SequencePolicy;

/// Position in a connection's packet stream.
///
/// The `(generation, number)` pair, read as a 32-bit value, is the per-packet
/// nonce; it MUST never repeat within one session and direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PacketSequence {
    /// Number of times `number` has wrapped.
    pub generation: u16,
    /// Wire-visible sequence number.
    pub number: u16,
}

impl PacketSequence {
    /// Create a sequence at a given position.
    pub const fn new(generation: u16, number: u16) -> Self {
        Self { generation, number }
    }

    /// `generation << 16 | number`.
    pub const fn nonce(&self) -> u32 {
        ((self.generation as u32) << 16) | self.number as u32
    }

    /// Inverse of [`PacketSequence::nonce`].
    pub const fn from_nonce(nonce: u32) -> Self {
        Self {
            generation: (nonce >> 16) as u16,
            number: nonce as u16,
        }
    }

    /// Whether no further nonce can be produced without repeating one.
    pub const fn is_exhausted(&self) -> bool {
        self.generation == u16::MAX && self.number == u16::MAX
    }

    /// Step to the next number, rolling into the next generation when
    /// `number` wraps. Returns the new number.
    ///
    /// Branch-free.
    pub fn increment(&mut self) -> u16 {
        let number = self.number.wrapping_add(1);
        let wrapped = u16::from(number == 0).wrapping_neg();
        self.generation = self.generation.wrapping_add(wrapped & 1);
        self.number = number;
        number
    }

    /// The successor of this sequence.
    pub fn incremented(mut self) -> Self {
        self.increment();
        self
    }

    /// Reconstruct the full sequence of an inbound `candidate` number under
    /// the default policy.
    pub fn advance(&self, candidate: u16) -> Option<Self> {
        self.advance_with(candidate, &SequencePolicy::default())
    }

    /// Reconstruct the full sequence of an inbound `candidate` number.
    ///
    /// - Small forward steps (including zero) stay in the current generation.
    /// - A large backward step is read as a wrap into the next generation.
    /// - Anything else is rejected, as is a rollover past the last
    ///   generation.
    ///
    /// `self` is not modified; the caller commits the result only once the
    /// packet has been verified.
    pub fn advance_with(&self, candidate: u16, policy: &SequencePolicy) -> Option<Self> {
        if candidate >= self.number {
            if candidate - self.number < policy.forward_window {
                return Some(Self::new(self.generation, candidate));
            }
            return None;
        }

        if self.number - candidate > policy.rollover_threshold {
            return self
                .generation
                .checked_add(1)
                .map(|generation| Self::new(generation, candidate));
        }

        None
    }
}
