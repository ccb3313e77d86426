//! XChaCha20-Poly1305 packet encryption.
//!
//! Encrypted connections seal packet bodies in place and keep the tag in
//! the packet's tag area. Nonces are 24 bytes:
//!
//! ```text
//! [ handshake context (8, LE) | zeros (8) | sequence nonce (8, LE) ]
//! ```
//!
//! Each direction uses its own session key, so the two directions may share
//! sequence values without ever sharing a `(key, nonce)` pair.

use std::fmt;

use chacha20poly1305::aead::{AeadInPlace, KeyInit};
use chacha20poly1305::{Tag, XChaCha20Poly1305, XNonce};

use crate::core::{AEAD_NONCE_SIZE, AUTH_TAG_SIZE, CryptoError};

use super::{AuthTag, KeyBuffer};

/// Construct the nonce for one packet.
pub fn construct_nonce(context: u64, sequence: u32) -> [u8; AEAD_NONCE_SIZE] {
    let mut nonce = [0u8; AEAD_NONCE_SIZE];
    nonce[0..8].copy_from_slice(&context.to_le_bytes());
    nonce[16..24].copy_from_slice(&u64::from(sequence).to_le_bytes());
    nonce
}

/// Cipher keyed once per session with a precomputed session key.
#[derive(Clone)]
pub struct PacketCipher {
    cipher: XChaCha20Poly1305,
}

impl fmt::Debug for PacketCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PacketCipher(..)")
    }
}

impl PacketCipher {
    /// Precompute the cipher for a session key.
    pub fn new(key: &KeyBuffer) -> Self {
        Self {
            cipher: XChaCha20Poly1305::new(key.as_bytes().into()),
        }
    }

    /// Encrypt `buffer` in place, authenticating `aad` alongside it.
    pub fn seal_in_place(
        &self,
        nonce: &[u8; AEAD_NONCE_SIZE],
        aad: &[u8],
        buffer: &mut [u8],
    ) -> Result<AuthTag, CryptoError> {
        let tag = self
            .cipher
            .encrypt_in_place_detached(XNonce::from_slice(nonce), aad, buffer)
            .map_err(|_| CryptoError::EncryptionFailed)?;

        let mut out = [0u8; AUTH_TAG_SIZE];
        out.copy_from_slice(&tag);
        Ok(out)
    }

    /// Verify and decrypt `buffer` in place.
    ///
    /// On failure the buffer contents are unspecified.
    pub fn open_in_place(
        &self,
        nonce: &[u8; AEAD_NONCE_SIZE],
        aad: &[u8],
        buffer: &mut [u8],
        tag: &AuthTag,
    ) -> Result<(), CryptoError> {
        self.cipher
            .decrypt_in_place_detached(XNonce::from_slice(nonce), aad, buffer, Tag::from_slice(tag))
            .map_err(|_| CryptoError::DecryptionFailed)
    }
}
