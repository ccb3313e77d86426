//! X25519 key material and key derivation.
//!
//! Session keys follow the `crypto_kx` construction: both sides hash the
//! X25519 shared point together with both public keys using BLAKE2b-512 and
//! split the result, so that the client's send key is the server's receive
//! key and vice versa. Single-use keys follow `crypto_kdf`: keyed BLAKE2b
//! with the packet nonce as salt and the handshake context as personal.

use std::fmt;

use blake2::digest::{Mac, consts::U32};
use blake2::{Blake2b512, Blake2bMac, Digest};
use rand::rngs::OsRng;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroize;

use crate::core::{CryptoError, KEY_SIZE};

/// 32 bytes of opaque secret or public key material.
///
/// Zeroized on drop.
#[derive(Clone, PartialEq, Eq)]
pub struct KeyBuffer([u8; KEY_SIZE]);

impl KeyBuffer {
    /// Create a key buffer from raw bytes.
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Get the raw key bytes.
    ///
    /// # Security
    /// Handle with care - this may expose sensitive key material.
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    /// Split into four little-endian words, the unit the packet serializer
    /// writes keys in.
    pub fn to_words(&self) -> [u64; 4] {
        let mut words = [0u64; 4];
        for (word, chunk) in words.iter_mut().zip(self.0.chunks_exact(8)) {
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(chunk);
            *word = u64::from_le_bytes(bytes);
        }
        words
    }

    /// Inverse of [`KeyBuffer::to_words`].
    pub fn from_words(words: [u64; 4]) -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        for (chunk, word) in bytes.chunks_exact_mut(8).zip(words) {
            chunk.copy_from_slice(&word.to_le_bytes());
        }
        Self(bytes)
    }

    /// Derive a single-use key from this master key.
    ///
    /// `context` binds the key to a session, `nonce` to a single packet.
    /// Two packets MUST never share a `(context, nonce)` pair.
    pub fn derive_single_use(&self, context: u64, nonce: u64) -> Result<KeyBuffer, CryptoError> {
        let mac = Blake2bMac::<U32>::new_with_salt_and_personal(
            &self.0,
            &nonce.to_le_bytes(),
            &context.to_le_bytes(),
        )
        .map_err(|_| CryptoError::KeyDerivationFailed)?;

        let mut key = [0u8; KEY_SIZE];
        key.copy_from_slice(&mac.finalize().into_bytes());
        Ok(Self(key))
    }
}

impl fmt::Debug for KeyBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("KeyBuffer(..)")
    }
}

impl Drop for KeyBuffer {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

/// An X25519 key pair, created per session and never persisted.
#[derive(Clone, Debug)]
pub struct KeyPair {
    public: KeyBuffer,
    secret: KeyBuffer,
}

impl KeyPair {
    /// Generate a fresh key pair meant to be destroyed at session end.
    pub fn ephemeral() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        Self::from_static(&secret)
    }

    /// Rebuild a key pair from its secret half.
    pub fn from_secret(secret: [u8; KEY_SIZE]) -> Self {
        Self::from_static(&StaticSecret::from(secret))
    }

    fn from_static(secret: &StaticSecret) -> Self {
        let public = PublicKey::from(secret);
        Self {
            public: KeyBuffer(public.to_bytes()),
            secret: KeyBuffer(secret.to_bytes()),
        }
    }

    /// Get the public key.
    pub fn public_key(&self) -> &KeyBuffer {
        &self.public
    }

    /// Get the secret key.
    ///
    /// # Security
    /// Handle with care - this exposes sensitive key material.
    pub fn secret_key(&self) -> &KeyBuffer {
        &self.secret
    }

    /// Hash of `DH(self, peer) || client_pk || server_pk`.
    fn exchange(
        &self,
        peer: &KeyBuffer,
        client: &KeyBuffer,
        server: &KeyBuffer,
    ) -> Result<[u8; 2 * KEY_SIZE], CryptoError> {
        let secret = StaticSecret::from(self.secret.0);
        let shared = secret.diffie_hellman(&PublicKey::from(peer.0));
        if !shared.was_contributory() {
            return Err(CryptoError::WeakPublicKey);
        }

        let mut hasher = Blake2b512::new();
        hasher.update(shared.as_bytes());
        hasher.update(client.as_bytes());
        hasher.update(server.as_bytes());

        let mut out = [0u8; 2 * KEY_SIZE];
        out.copy_from_slice(&hasher.finalize());
        Ok(out)
    }
}

/// Directional session keys derived once per session.
///
/// A client's `send` key equals the server's `recv` key and vice versa.
#[derive(Clone, Debug)]
pub struct SessionKeys {
    /// Key protecting packets we send.
    pub send: KeyBuffer,
    /// Key protecting packets we receive.
    pub recv: KeyBuffer,
}

impl SessionKeys {
    /// Compute the client's session keys from its key pair and the server's
    /// public key.
    pub fn client(client: &KeyPair, server_public: &KeyBuffer) -> Result<Self, CryptoError> {
        let mut hash = client.exchange(server_public, client.public_key(), server_public)?;
        let keys = Self::split(&hash, false);
        hash.zeroize();
        Ok(keys)
    }

    /// Compute the server's session keys from its key pair and the client's
    /// public key.
    pub fn server(server: &KeyPair, client_public: &KeyBuffer) -> Result<Self, CryptoError> {
        let mut hash = server.exchange(client_public, client_public, server.public_key())?;
        let keys = Self::split(&hash, true);
        hash.zeroize();
        Ok(keys)
    }

    fn split(hash: &[u8; 2 * KEY_SIZE], server: bool) -> Self {
        let mut first = [0u8; KEY_SIZE];
        let mut second = [0u8; KEY_SIZE];
        first.copy_from_slice(&hash[..KEY_SIZE]);
        second.copy_from_slice(&hash[KEY_SIZE..]);

        let (first, second) = (KeyBuffer(first), KeyBuffer(second));
        if server {
            Self {
                send: first,
                recv: second,
            }
        } else {
            Self {
                send: second,
                recv: first,
            }
        }
    }
}
