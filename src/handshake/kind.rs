//! What a handshake exchanges: public keys or salts.

use std::fmt::Debug;

use rand::RngCore;
use rand::rngs::OsRng;

use crate::address::AddressFamily;
use crate::core::{HANDSHAKE_CONTEXT, PacketError};
use crate::crypto::KeyBuffer;
use crate::packet::{PacketBuffer, PacketTag};

/// The exchange a handshake performs.
///
/// `Args` is the local identity announced in ClientHello. The server answers
/// with a 64-bit challenge and both sides end up with the same 64-bit
/// `data` value: the session context (secure) or the agreed salt
/// (insecure).
pub trait HandshakeKind: Copy + Clone + Debug + Default + Send + Sync + 'static {
    /// Local identity carried by ClientHello.
    type Args: Clone + Debug + PartialEq + Send + Sync;

    /// Serialize ClientHello arguments.
    fn write_args<T: PacketTag, A: AddressFamily>(
        args: &Self::Args,
        packet: &mut PacketBuffer<T, A>,
    ) -> Result<(), PacketError>;

    /// Deserialize ClientHello arguments.
    fn read_args<T: PacketTag, A: AddressFamily>(
        packet: &mut PacketBuffer<T, A>,
    ) -> Result<Self::Args, PacketError>;

    /// Server: agree on `data` after reading the client's arguments.
    fn server_data(local: &Self::Args, peer: &Self::Args) -> u64;

    /// Server: the value sent in ServerChallenge.
    fn challenge(local: &Self::Args, data: u64) -> u64;

    /// Client: agree on `data` after reading the server's challenge.
    fn client_data(local: &Self::Args, challenge: u64) -> u64;
}

/// Secure handshake: the client announces its public key, the server picks
/// a random session context and the client echoes it back.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyExchange;

impl HandshakeKind for KeyExchange {
    type Args = KeyBuffer;

    fn write_args<T: PacketTag, A: AddressFamily>(
        args: &KeyBuffer,
        packet: &mut PacketBuffer<T, A>,
    ) -> Result<(), PacketError> {
        packet.serialize_key(args)
    }

    fn read_args<T: PacketTag, A: AddressFamily>(
        packet: &mut PacketBuffer<T, A>,
    ) -> Result<KeyBuffer, PacketError> {
        packet.deserialize_key()
    }

    fn server_data(_local: &KeyBuffer, _peer: &KeyBuffer) -> u64 {
        random_context()
    }

    fn challenge(_local: &KeyBuffer, data: u64) -> u64 {
        data
    }

    fn client_data(_local: &KeyBuffer, challenge: u64) -> u64 {
        challenge
    }
}

/// Insecure handshake: each side contributes a salt and both use their
/// XOR.
///
/// This only keeps unrelated traffic apart. Anyone who sees the handshake
/// knows the salt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaltExchange;

impl SaltExchange {
    /// Draw a fresh local salt.
    pub fn generate_salt() -> u64 {
        OsRng.next_u64()
    }
}

impl HandshakeKind for SaltExchange {
    type Args = u64;

    fn write_args<T: PacketTag, A: AddressFamily>(
        args: &u64,
        packet: &mut PacketBuffer<T, A>,
    ) -> Result<(), PacketError> {
        packet.serialize_u64(*args)
    }

    fn read_args<T: PacketTag, A: AddressFamily>(
        packet: &mut PacketBuffer<T, A>,
    ) -> Result<u64, PacketError> {
        packet.deserialize_u64()
    }

    fn server_data(local: &u64, peer: &u64) -> u64 {
        local ^ peer
    }

    fn challenge(local: &u64, _data: u64) -> u64 {
        *local
    }

    fn client_data(local: &u64, challenge: u64) -> u64 {
        local ^ challenge
    }
}

/// A random context distinct from the one reserved for handshake carriers.
fn random_context() -> u64 {
    loop {
        let context = OsRng.next_u64();
        if context != HANDSHAKE_CONTEXT {
            return context;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_salt_agreement() {
        let client = 0x1111_0000_ffff_0000u64;
        let server = 0x0101_1010_0f0f_f0f0u64;

        let server_data = SaltExchange::server_data(&server, &client);
        let challenge = SaltExchange::challenge(&server, server_data);
        let client_data = SaltExchange::client_data(&client, challenge);

        assert_eq!(server_data, client ^ server);
        assert_eq!(client_data, server_data);
    }

    #[test]
    fn test_key_exchange_context_is_echoed() {
        let key = KeyBuffer::from_bytes([3; 32]);

        let data = KeyExchange::server_data(&key, &key);
        let challenge = KeyExchange::challenge(&key, data);

        assert_ne!(data, HANDSHAKE_CONTEXT);
        assert_eq!(KeyExchange::client_data(&key, challenge), data);
    }

    #[test]
    fn test_contexts_are_random() {
        let key = KeyBuffer::from_bytes([3; 32]);
        assert_ne!(
            KeyExchange::server_data(&key, &key),
            KeyExchange::server_data(&key, &key)
        );
        assert_ne!(SaltExchange::generate_salt(), SaltExchange::generate_salt());
    }
}
