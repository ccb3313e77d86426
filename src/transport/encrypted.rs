//! Encrypted connections: integrity and confidentiality.
//!
//! Data packets have their body sealed with XChaCha20-Poly1305 under the
//! directional session key. The header stays readable, since the receiver
//! needs the sequence number to build the nonce, and is authenticated as
//! associated data. Handshake carriers are authenticated the same way but
//! not encrypted.

use tracing::trace;

use crate::address::AddressFamily;
use crate::core::{
    ConnectionConfig, CryptoError, HANDSHAKE_CONTEXT, PACKET_HEADER_SIZE, ReadError, WriteError,
};
use crate::crypto::{KeyBuffer, KeyPair, PacketCipher, SessionKeys, construct_nonce};
use crate::handshake::{KeyExchange, Role};
use crate::packet::{PacketBuffer, PacketSequence, SIGNED_BYTES_MAX, SecureTag};

use super::authenticated::session_keys;
use super::security::{
    PacketReader, PacketWriter, ReceiveWindow, Security, SendSequence, idle_clock,
};

const BODY_SCRATCH: usize = SIGNED_BYTES_MAX - PACKET_HEADER_SIZE;

/// Encrypted security level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Encrypted;

/// Decrypts and verifies inbound packets.
#[derive(Debug)]
pub struct EncryptedReader {
    cipher: Option<PacketCipher>,
    window: ReceiveWindow,
    idle_since: u8,
}

impl EncryptedReader {
    /// Reader without a session key.
    pub fn new(config: &ConnectionConfig) -> Self {
        Self {
            cipher: None,
            window: ReceiveWindow::new(config),
            idle_since: idle_clock(),
        }
    }

    /// Install the receive session key.
    pub fn install(&mut self, key: &KeyBuffer) {
        self.cipher = Some(PacketCipher::new(key));
    }
}

fn open<A: AddressFamily>(
    cipher: &PacketCipher,
    context: u64,
    sequence: PacketSequence,
    packet: &mut PacketBuffer<SecureTag, A>,
) -> Result<(), CryptoError> {
    let nonce = construct_nonce(context, sequence.nonce());

    if packet.is_handshake() {
        let mut scratch = [0u8; SIGNED_BYTES_MAX];
        let aad = packet.signed_bytes(&mut scratch);
        return cipher.open_in_place(&nonce, aad, &mut [], &packet.tag.0);
    }

    let header = packet.header.to_bytes();
    let mut body = [0u8; BODY_SCRATCH];
    let body = &mut body[..packet.body_size()];
    packet.copy_body_to(body);
    cipher.open_in_place(&nonce, &header, body, &packet.tag.0)?;
    packet.load_body(body);
    Ok(())
}

impl PacketReader for EncryptedReader {
    type Tag = SecureTag;

    fn read_packet<A: AddressFamily>(
        &mut self,
        context: u64,
        packet: &mut PacketBuffer<SecureTag, A>,
    ) -> Result<(), ReadError> {
        let sequence = self.window.check(packet.header.sequence)?;

        let Some(cipher) = &self.cipher else {
            if packet.is_handshake() && context == HANDSHAKE_CONTEXT {
                return Ok(());
            }
            return Err(ReadError::Context);
        };

        open(cipher, context, sequence, packet).map_err(|_| ReadError::Verify)?;

        self.window.commit(sequence);
        self.idle_since = idle_clock();
        trace!(sequence = ?sequence, kind = packet.header.kind, "encrypted packet accepted");
        Ok(())
    }

    fn sequence(&self) -> PacketSequence {
        self.window.sequence()
    }

    fn idle_since(&self) -> u8 {
        self.idle_since
    }
}

/// Encrypts outbound packets.
#[derive(Debug)]
pub struct EncryptedWriter {
    cipher: Option<PacketCipher>,
    sequence: SendSequence,
    idle_since: u8,
}

impl EncryptedWriter {
    /// Writer without a session key.
    pub fn new(_config: &ConnectionConfig) -> Self {
        Self {
            cipher: None,
            sequence: SendSequence::default(),
            idle_since: idle_clock(),
        }
    }

    /// Install the send session key.
    pub fn install(&mut self, key: &KeyBuffer) {
        self.cipher = Some(PacketCipher::new(key));
    }
}

fn seal<A: AddressFamily>(
    cipher: &PacketCipher,
    context: u64,
    sequence: PacketSequence,
    packet: &mut PacketBuffer<SecureTag, A>,
) -> Result<(), CryptoError> {
    let nonce = construct_nonce(context, sequence.nonce());

    if packet.is_handshake() {
        let mut scratch = [0u8; SIGNED_BYTES_MAX];
        let aad = packet.signed_bytes(&mut scratch);
        packet.tag = SecureTag(cipher.seal_in_place(&nonce, aad, &mut [])?);
        return Ok(());
    }

    let header = packet.header.to_bytes();
    let mut body = [0u8; BODY_SCRATCH];
    let body = &mut body[..packet.body_size()];
    packet.copy_body_to(body);
    packet.tag = SecureTag(cipher.seal_in_place(&nonce, &header, body)?);
    packet.load_body(body);
    Ok(())
}

impl PacketWriter for EncryptedWriter {
    type Tag = SecureTag;

    fn write_packet<A: AddressFamily>(
        &mut self,
        context: u64,
        packet: &mut PacketBuffer<SecureTag, A>,
    ) -> Result<(), WriteError> {
        let cipher = self.cipher.as_ref().ok_or(WriteError::Context)?;
        let sequence = self.sequence.next()?;
        packet.header.sequence = sequence.number;

        seal(cipher, context, sequence, packet).map_err(|_| WriteError::Authenticate)?;

        self.sequence.commit(sequence);
        self.idle_since = idle_clock();
        trace!(sequence = ?sequence, kind = packet.header.kind, "encrypted packet sealed");
        Ok(())
    }

    fn sequence(&self) -> PacketSequence {
        self.sequence.sequence()
    }

    fn idle_since(&self) -> u8 {
        self.idle_since
    }
}

impl Security for Encrypted {
    type Tag = SecureTag;
    type Kind = KeyExchange;
    type Reader = EncryptedReader;
    type Writer = EncryptedWriter;
    type Credentials = KeyPair;

    const NAME: &'static str = "encrypted";

    fn identity(credentials: &KeyPair) -> KeyBuffer {
        credentials.public_key().clone()
    }

    fn reader(config: &ConnectionConfig) -> EncryptedReader {
        EncryptedReader::new(config)
    }

    fn writer(config: &ConnectionConfig) -> EncryptedWriter {
        EncryptedWriter::new(config)
    }

    fn establish(
        credentials: &KeyPair,
        role: Role,
        peer: &KeyBuffer,
        reader: &mut EncryptedReader,
        writer: &mut EncryptedWriter,
    ) -> Result<(), CryptoError> {
        let SessionKeys { send, recv } = session_keys(credentials, role, peer)?;
        reader.install(&recv);
        writer.install(&send);
        Ok(())
    }
}
