//! Saltline - Key Material
//!
//! Thin wrappers over vetted primitives, consumed only through their
//! input/output contracts:
//! - X25519 key pairs and `crypto_kx`-style directional session keys
//! - Single-use key derivation (keyed BLAKE2b, `crypto_kdf` layout)
//! - One-time packet MAC (16-byte keyed BLAKE2b)
//! - XChaCha20-Poly1305 in-place detached encryption

mod aead;
mod auth;
mod keys;

pub use aead::{PacketCipher, construct_nonce};
pub use auth::{AuthTag, OneTimeAuth};
pub use keys::{KeyBuffer, KeyPair, SessionKeys};
