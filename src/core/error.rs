//! Error types for the Saltline transport.
//!
//! Packet-level errors are never fatal: a bad packet degrades to "dropped".
//! The only condition that is not per-packet is connection table
//! exhaustion, surfaced as [`ConnectionError::Exhausted`].

use thiserror::Error;

/// Errors raised by the bit-packed packet serializer and wire codec.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum PacketError {
    /// A write would run past the body capacity.
    #[error("packet body full: {requested} bits requested, {remaining} remaining")]
    BodyFull {
        /// Bits the write needed.
        requested: usize,
        /// Bits left before the end of the body.
        remaining: usize,
    },

    /// A read would run past the declared body size.
    #[error("packet body exhausted: {requested} bits requested, {remaining} remaining")]
    BodyExhausted {
        /// Bits the read needed.
        requested: usize,
        /// Bits left before the end of the declared body.
        remaining: usize,
    },

    /// Datagram shorter than tag + header.
    #[error("datagram too short: expected at least {expected} bytes, got {actual}")]
    TooShort {
        /// Minimum size.
        expected: usize,
        /// Actual size.
        actual: usize,
    },

    /// Datagram larger than the fixed packet size.
    #[error("datagram too long: at most {expected} bytes, got {actual}")]
    TooLong {
        /// Maximum size.
        expected: usize,
        /// Actual size.
        actual: usize,
    },

    /// Header carries a foreign protocol identifier.
    #[error("protocol mismatch: {0:#06x}")]
    ProtocolMismatch(u16),
}

/// Errors in the crypto layer.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CryptoError {
    /// Single-use key derivation failed.
    #[error("key derivation failed")]
    KeyDerivationFailed,

    /// Peer public key produced a non-contributory shared secret.
    #[error("weak peer public key")]
    WeakPublicKey,

    /// AEAD encryption failed.
    #[error("encryption failed")]
    EncryptionFailed,

    /// AEAD decryption failed (invalid tag or corrupted).
    #[error("decryption failed (invalid tag or corrupted)")]
    DecryptionFailed,

    /// One-time MAC did not verify.
    #[error("authentication failed")]
    AuthenticationFailed,
}

/// Reasons an inbound packet is rejected by a reader.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ReadError {
    /// Sequence rejected by the acceptance window or the replay bitmap.
    #[error("sequence rejected")]
    Sequence,

    /// Key material or agreed context unavailable or mismatched.
    #[error("context rejected")]
    Context,

    /// MAC mismatch or decryption failure.
    #[error("verification failed")]
    Verify,

    /// Insecure checksum mismatch.
    #[error("checksum mismatch")]
    Checksum,
}

impl ReadError {
    /// Whether this error points at corruption or active tampering rather
    /// than ordinary loss/reordering.
    pub fn is_tampering(&self) -> bool {
        matches!(self, Self::Verify | Self::Checksum)
    }
}

/// Reasons an outbound packet could not be tagged.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum WriteError {
    /// No key material yet, or single-use key derivation failed.
    #[error("context unavailable")]
    Context,

    /// MAC computation or encryption failed.
    #[error("authentication failed")]
    Authenticate,

    /// Every nonce of this session has been spent.
    #[error("sequence exhausted - session must be terminated")]
    SequenceExhausted,

    /// Building a handshake message failed.
    #[error("packet error: {0}")]
    Packet(#[from] PacketError),
}

/// Errors outside of a single packet's lifetime.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// The connection table is full.
    #[error("connection table exhausted ({capacity} slots)")]
    Exhausted {
        /// Table capacity.
        capacity: usize,
    },

    /// Socket collaborator error, passed through untouched.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Packet codec error.
    #[error("packet error: {0}")]
    Packet(#[from] PacketError),

    /// Key exchange error.
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),
}

/// Top-level Saltline errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Packet codec error.
    #[error("packet error: {0}")]
    Packet(#[from] PacketError),

    /// Crypto error.
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// Inbound packet rejected.
    #[error("read error: {0}")]
    Read(#[from] ReadError),

    /// Outbound packet rejected.
    #[error("write error: {0}")]
    Write(#[from] WriteError),

    /// Connection-level error.
    #[error("connection error: {0}")]
    Connection(#[from] ConnectionError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tampering_classification() {
        assert!(ReadError::Verify.is_tampering());
        assert!(ReadError::Checksum.is_tampering());
        assert!(!ReadError::Sequence.is_tampering());
        assert!(!ReadError::Context.is_tampering());
    }

    #[test]
    fn test_error_conversions() {
        let err: Error = ConnectionError::Exhausted { capacity: 4 }.into();
        assert!(matches!(
            err,
            Error::Connection(ConnectionError::Exhausted { capacity: 4 })
        ));

        let err: WriteError = PacketError::ProtocolMismatch(7).into();
        assert_eq!(err, WriteError::Packet(PacketError::ProtocolMismatch(7)));
    }
}
