//! One-time packet authentication.
//!
//! Authenticated connections tag every packet with a 16-byte keyed
//! BLAKE2b tag computed under a single-use key. The tag is only ever
//! computed once per key, so the same primitive doubles as a one-time MAC.

use blake2::Blake2bMac;
use blake2::digest::{Mac, consts::U16};

use crate::core::{AUTH_TAG_SIZE, CryptoError};

use super::KeyBuffer;

/// A 16-byte authentication tag.
pub type AuthTag = [u8; AUTH_TAG_SIZE];

/// Incremental one-time MAC over header and body bytes.
pub struct OneTimeAuth {
    mac: Blake2bMac<U16>,
}

impl OneTimeAuth {
    /// Start a MAC under a single-use key.
    pub fn new(key: &KeyBuffer) -> Result<Self, CryptoError> {
        let mac = Blake2bMac::<U16>::new_with_salt_and_personal(key.as_bytes(), &[], &[])
            .map_err(|_| CryptoError::AuthenticationFailed)?;
        Ok(Self { mac })
    }

    /// Feed authenticated bytes.
    pub fn update(&mut self, data: &[u8]) {
        Mac::update(&mut self.mac, data);
    }

    /// Produce the tag.
    pub fn finalize(self) -> AuthTag {
        let mut tag = [0u8; AUTH_TAG_SIZE];
        tag.copy_from_slice(&self.mac.finalize().into_bytes());
        tag
    }

    /// Check a tag in constant time.
    pub fn verify(self, tag: &AuthTag) -> Result<(), CryptoError> {
        self.mac
            .verify_slice(tag)
            .map_err(|_| CryptoError::AuthenticationFailed)
    }
}
