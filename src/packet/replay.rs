//! Sliding-window replay detection over packet nonces.

use crate::core::REPLAY_WINDOW_SIZE;

const WINDOW: u32 = REPLAY_WINDOW_SIZE as u32;
const WORDS: usize = REPLAY_WINDOW_SIZE / 64;

/// Bitmap of recently accepted nonces.
///
/// Bit `i` records whether `highest - i` was accepted. Nonces more than
/// [`REPLAY_WINDOW_SIZE`] below the highest are treated as replays.
///
/// Checking and marking are split so a reader can consult the window
/// before verification and mark only once the packet is authentic.
#[derive(Debug, Clone)]
pub struct ReplayWindow {
    bitmap: [u64; WORDS],
    highest: u32,
    initialized: bool,
}

impl ReplayWindow {
    /// Create an empty window.
    pub fn new() -> Self {
        Self {
            bitmap: [0; WORDS],
            highest: 0,
            initialized: false,
        }
    }

    /// Whether `nonce` was already accepted or fell out of the window.
    pub fn is_replay(&self, nonce: u32) -> bool {
        if !self.initialized || nonce > self.highest {
            return false;
        }

        let diff = self.highest - nonce;
        if diff >= WINDOW {
            return true;
        }

        let (word, bit) = Self::slot(diff);
        self.bitmap[word] & (1 << bit) != 0
    }

    /// Record `nonce` as accepted, sliding the window forward if needed.
    pub fn mark(&mut self, nonce: u32) {
        if !self.initialized {
            self.initialized = true;
            self.highest = nonce;
        } else if nonce > self.highest {
            self.shift(nonce - self.highest);
            self.highest = nonce;
        }

        let diff = self.highest - nonce;
        if diff < WINDOW {
            let (word, bit) = Self::slot(diff);
            self.bitmap[word] |= 1 << bit;
        }
    }

    /// Forget every accepted nonce.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    fn slot(diff: u32) -> (usize, u32) {
        ((diff / 64) as usize, diff % 64)
    }

    /// Move every recorded bit `shift` positions towards the old end.
    fn shift(&mut self, shift: u32) {
        if shift >= WINDOW {
            self.bitmap = [0; WORDS];
            return;
        }

        let words = (shift / 64) as usize;
        let bits = shift % 64;

        if words > 0 {
            for i in (words..WORDS).rev() {
                self.bitmap[i] = self.bitmap[i - words];
            }
            for word in self.bitmap.iter_mut().take(words) {
                *word = 0;
            }
        }

        if bits > 0 {
            let mut carry = 0u64;
            for word in self.bitmap.iter_mut() {
                let next = *word >> (64 - bits);
                *word = (*word << bits) | carry;
                carry = next;
            }
        }
    }
}

impl Default for ReplayWindow {
    fn default() -> Self {
        Self::new()
    }
}
