//! Authenticated connections: integrity without confidentiality.
//!
//! Every packet carries a 16-byte one-time MAC over its header and body.
//! The MAC key is derived per packet from the directional session key, the
//! handshake context and the packet's sequence nonce, so no two packets are
//! ever authenticated under the same key.

use tracing::trace;

use crate::address::AddressFamily;
use crate::core::{ConnectionConfig, CryptoError, HANDSHAKE_CONTEXT, ReadError, WriteError};
use crate::crypto::{KeyBuffer, KeyPair, OneTimeAuth, SessionKeys};
use crate::handshake::{KeyExchange, Role};
use crate::packet::{PacketBuffer, PacketSequence, SIGNED_BYTES_MAX, SecureTag};

use super::security::{
    PacketReader, PacketWriter, ReceiveWindow, Security, SendSequence, idle_clock,
};

/// Authenticated security level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Authenticated;

/// MAC keyed for one packet.
fn packet_auth(
    master: &KeyBuffer,
    context: u64,
    sequence: PacketSequence,
) -> Result<OneTimeAuth, CryptoError> {
    let key = master.derive_single_use(context, u64::from(sequence.nonce()))?;
    OneTimeAuth::new(&key)
}

/// Verifies authenticated packets.
#[derive(Debug)]
pub struct AuthenticatedReader {
    key: Option<KeyBuffer>,
    window: ReceiveWindow,
    idle_since: u8,
}

impl AuthenticatedReader {
    /// Reader without a session key.
    pub fn new(config: &ConnectionConfig) -> Self {
        Self {
            key: None,
            window: ReceiveWindow::new(config),
            idle_since: idle_clock(),
        }
    }

    /// Install the receive session key.
    pub fn install(&mut self, key: KeyBuffer) {
        self.key = Some(key);
    }

    /// Whether a session key is installed.
    pub fn has_key(&self) -> bool {
        self.key.is_some()
    }
}

impl PacketReader for AuthenticatedReader {
    type Tag = SecureTag;

    fn read_packet<A: AddressFamily>(
        &mut self,
        context: u64,
        packet: &mut PacketBuffer<SecureTag, A>,
    ) -> Result<(), ReadError> {
        let sequence = self.window.check(packet.header.sequence)?;

        let Some(master) = &self.key else {
            // A server learns the client's key from the ClientHello itself,
            // so before that only unverified handshake carriers get through.
            // They never move the window.
            if packet.is_handshake() && context == HANDSHAKE_CONTEXT {
                return Ok(());
            }
            return Err(ReadError::Context);
        };

        let mut auth = packet_auth(master, context, sequence).map_err(|_| ReadError::Context)?;
        let mut scratch = [0u8; SIGNED_BYTES_MAX];
        auth.update(packet.signed_bytes(&mut scratch));
        auth.verify(&packet.tag.0).map_err(|_| ReadError::Verify)?;

        self.window.commit(sequence);
        self.idle_since = idle_clock();
        trace!(sequence = ?sequence, kind = packet.header.kind, "authenticated packet accepted");
        Ok(())
    }

    fn sequence(&self) -> PacketSequence {
        self.window.sequence()
    }

    fn idle_since(&self) -> u8 {
        self.idle_since
    }
}

/// Tags outbound authenticated packets.
#[derive(Debug)]
pub struct AuthenticatedWriter {
    key: Option<KeyBuffer>,
    sequence: SendSequence,
    idle_since: u8,
}

impl AuthenticatedWriter {
    /// Writer without a session key.
    pub fn new(_config: &ConnectionConfig) -> Self {
        Self {
            key: None,
            sequence: SendSequence::default(),
            idle_since: idle_clock(),
        }
    }

    /// Install the send session key.
    pub fn install(&mut self, key: KeyBuffer) {
        self.key = Some(key);
    }
}

impl PacketWriter for AuthenticatedWriter {
    type Tag = SecureTag;

    fn write_packet<A: AddressFamily>(
        &mut self,
        context: u64,
        packet: &mut PacketBuffer<SecureTag, A>,
    ) -> Result<(), WriteError> {
        let master = self.key.as_ref().ok_or(WriteError::Context)?;
        let sequence = self.sequence.next()?;
        packet.header.sequence = sequence.number;

        let mut auth = packet_auth(master, context, sequence).map_err(|_| WriteError::Context)?;
        let mut scratch = [0u8; SIGNED_BYTES_MAX];
        auth.update(packet.signed_bytes(&mut scratch));
        packet.tag = SecureTag(auth.finalize());

        self.sequence.commit(sequence);
        self.idle_since = idle_clock();
        trace!(sequence = ?sequence, kind = packet.header.kind, "authenticated packet tagged");
        Ok(())
    }

    fn sequence(&self) -> PacketSequence {
        self.sequence.sequence()
    }

    fn idle_since(&self) -> u8 {
        self.idle_since
    }
}

impl Security for Authenticated {
    type Tag = SecureTag;
    type Kind = KeyExchange;
    type Reader = AuthenticatedReader;
    type Writer = AuthenticatedWriter;
    type Credentials = KeyPair;

    const NAME: &'static str = "authenticated";

    fn identity(credentials: &KeyPair) -> KeyBuffer {
        credentials.public_key().clone()
    }

    fn reader(config: &ConnectionConfig) -> AuthenticatedReader {
        AuthenticatedReader::new(config)
    }

    fn writer(config: &ConnectionConfig) -> AuthenticatedWriter {
        AuthenticatedWriter::new(config)
    }

    fn establish(
        credentials: &KeyPair,
        role: Role,
        peer: &KeyBuffer,
        reader: &mut AuthenticatedReader,
        writer: &mut AuthenticatedWriter,
    ) -> Result<(), CryptoError> {
        let SessionKeys { send, recv } = session_keys(credentials, role, peer)?;
        reader.install(recv);
        writer.install(send);
        Ok(())
    }
}

/// Directional session keys for either side.
pub(crate) fn session_keys(
    credentials: &KeyPair,
    role: Role,
    peer: &KeyBuffer,
) -> Result<SessionKeys, CryptoError> {
    match role {
        Role::Client => SessionKeys::client(credentials, peer),
        Role::Server => SessionKeys::server(credentials, peer),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::Ipv4;
    use crate::core::HANDSHAKE_PACKET_TYPE;
    use crate::packet::SecurePacket;

    type Packet = SecurePacket<Ipv4>;

    const CONTEXT: u64 = 0x5EED;

    fn pipeline() -> (AuthenticatedWriter, AuthenticatedReader) {
        let config = ConnectionConfig::default();
        let client = KeyPair::ephemeral();
        let server = KeyPair::ephemeral();

        let mut writer = AuthenticatedWriter::new(&config);
        let mut reader = AuthenticatedReader::new(&config);
        let mut unused_reader = AuthenticatedReader::new(&config);
        let mut unused_writer = AuthenticatedWriter::new(&config);

        Authenticated::establish(
            &client,
            Role::Client,
            server.public_key(),
            &mut unused_reader,
            &mut writer,
        )
        .unwrap();
        Authenticated::establish(
            &server,
            Role::Server,
            client.public_key(),
            &mut reader,
            &mut unused_writer,
        )
        .unwrap();
        (writer, reader)
    }

    fn transmit(packet: &Packet) -> Packet {
        Packet::decode(&packet.to_bytes()).unwrap()
    }

    fn payload(kind: u16) -> Packet {
        let mut packet = Packet::new(kind);
        packet.serialize_u8(0x01).unwrap();
        packet.serialize_u8(0x02).unwrap();
        packet
    }

    #[test]
    fn test_tag_and_verify() {
        let (mut writer, mut reader) = pipeline();

        let mut packet = payload(7);
        writer.write_packet(CONTEXT, &mut packet).unwrap();
        assert_eq!(packet.header.sequence, 1);
        assert_ne!(packet.tag, SecureTag::default());

        let mut received = transmit(&packet);
        reader.read_packet(CONTEXT, &mut received).unwrap();
        assert_eq!(reader.sequence(), PacketSequence::new(0, 1));
        assert_eq!(received.deserialize_u8().unwrap(), 0x01);
        assert_eq!(received.deserialize_u8().unwrap(), 0x02);
    }

    #[test]
    fn test_replay_rejected() {
        let (mut writer, mut reader) = pipeline();

        let mut packet = payload(7);
        writer.write_packet(CONTEXT, &mut packet).unwrap();

        reader.read_packet(CONTEXT, &mut transmit(&packet)).unwrap();
        assert_eq!(
            reader.read_packet(CONTEXT, &mut transmit(&packet)),
            Err(ReadError::Sequence)
        );
    }

    #[test]
    fn test_tampering_detected() {
        let (mut writer, mut reader) = pipeline();

        let mut packet = payload(7);
        writer.write_packet(CONTEXT, &mut packet).unwrap();

        let mut bytes = packet.to_bytes();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x80;
        let mut tampered = Packet::decode(&bytes).unwrap();

        assert_eq!(
            reader.read_packet(CONTEXT, &mut tampered),
            Err(ReadError::Verify)
        );
        // The failed packet did not move the window
        assert_eq!(reader.sequence(), PacketSequence::default());
        reader.read_packet(CONTEXT, &mut transmit(&packet)).unwrap();
    }

    #[test]
    fn test_wrong_context_rejected() {
        let (mut writer, mut reader) = pipeline();

        let mut packet = payload(7);
        writer.write_packet(CONTEXT, &mut packet).unwrap();

        assert_eq!(
            reader.read_packet(CONTEXT + 1, &mut transmit(&packet)),
            Err(ReadError::Verify)
        );
    }

    #[test]
    fn test_header_is_authenticated() {
        let (mut writer, mut reader) = pipeline();

        let mut packet = payload(7);
        writer.write_packet(CONTEXT, &mut packet).unwrap();

        let mut received = transmit(&packet);
        received.header.kind = 8;
        assert_eq!(
            reader.read_packet(CONTEXT, &mut received),
            Err(ReadError::Verify)
        );
    }

    #[test]
    fn test_writer_without_key() {
        let mut writer = AuthenticatedWriter::new(&ConnectionConfig::default());
        let mut packet = payload(7);

        assert_eq!(
            writer.write_packet(CONTEXT, &mut packet),
            Err(WriteError::Context)
        );
        assert_eq!(writer.sequence(), PacketSequence::default());
    }

    #[test]
    fn test_keyless_reader_admits_only_handshake_carriers() {
        let mut reader = AuthenticatedReader::new(&ConnectionConfig::default());

        let mut carrier = Packet::new(HANDSHAKE_PACKET_TYPE);
        carrier.header.sequence = 1;
        carrier.serialize_padding();
        assert_eq!(reader.read_packet(HANDSHAKE_CONTEXT, &mut carrier), Ok(()));
        assert_eq!(reader.sequence(), PacketSequence::default());

        let mut data = payload(7);
        data.header.sequence = 1;
        assert_eq!(
            reader.read_packet(CONTEXT, &mut data),
            Err(ReadError::Context)
        );
    }

    #[test]
    fn test_sequence_gap_limits() {
        let (mut writer, mut reader) = pipeline();

        // Skip ahead past the forward window
        for _ in 0..1100 {
            let mut packet = payload(7);
            writer.write_packet(CONTEXT, &mut packet).unwrap();
        }
        let mut packet = payload(7);
        writer.write_packet(CONTEXT, &mut packet).unwrap();

        assert_eq!(
            reader.read_packet(CONTEXT, &mut transmit(&packet)),
            Err(ReadError::Sequence)
        );
    }
}
