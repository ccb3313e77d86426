//! Insecure connections: best-effort tagging for maximum throughput.
//!
//! Packets carry the agreed salt in the clear, plus an optional CRC-16 over
//! header and body. The salt keeps unrelated traffic apart; it does not
//! stop anyone who has seen the handshake.

use crc16::{ARC, State};
use tracing::trace;

use crate::address::AddressFamily;
use crate::core::{ConnectionConfig, CryptoError, ReadError, WriteError};
use crate::handshake::{Role, SaltExchange};
use crate::packet::{InsecureTag, PacketBuffer, PacketSequence, SIGNED_BYTES_MAX};

use super::security::{
    PacketReader, PacketWriter, ReceiveWindow, Security, SendSequence, idle_clock,
};

/// Insecure security level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Insecure;

/// CRC-16/ARC over header and body.
fn checksum<A: AddressFamily>(packet: &PacketBuffer<InsecureTag, A>) -> u16 {
    let mut scratch = [0u8; SIGNED_BYTES_MAX];
    State::<ARC>::calculate(packet.signed_bytes(&mut scratch))
}

/// Checks salt, sequence and optional checksum of inbound packets.
#[derive(Debug)]
pub struct InsecureReader {
    window: ReceiveWindow,
    checksum: bool,
    idle_since: u8,
}

impl InsecureReader {
    /// Create a reader.
    pub fn new(config: &ConnectionConfig) -> Self {
        Self {
            window: ReceiveWindow::new(config),
            checksum: config.checksum,
            idle_since: idle_clock(),
        }
    }
}

impl PacketReader for InsecureReader {
    type Tag = InsecureTag;

    fn read_packet<A: AddressFamily>(
        &mut self,
        context: u64,
        packet: &mut PacketBuffer<InsecureTag, A>,
    ) -> Result<(), ReadError> {
        if packet.tag.salt != context {
            return Err(ReadError::Context);
        }

        let sequence = self.window.check(packet.header.sequence)?;

        if self.checksum && packet.tag.checksum != checksum(packet) {
            return Err(ReadError::Checksum);
        }

        self.window.commit(sequence);
        self.idle_since = idle_clock();
        trace!(sequence = ?sequence, kind = packet.header.kind, "insecure packet accepted");
        Ok(())
    }

    fn sequence(&self) -> PacketSequence {
        self.window.sequence()
    }

    fn idle_since(&self) -> u8 {
        self.idle_since
    }
}

/// Stamps salt, sequence and optional checksum on outbound packets.
#[derive(Debug)]
pub struct InsecureWriter {
    sequence: SendSequence,
    checksum: bool,
    idle_since: u8,
}

impl InsecureWriter {
    /// Create a writer.
    pub fn new(config: &ConnectionConfig) -> Self {
        Self {
            sequence: SendSequence::default(),
            checksum: config.checksum,
            idle_since: idle_clock(),
        }
    }
}

impl PacketWriter for InsecureWriter {
    type Tag = InsecureTag;

    fn write_packet<A: AddressFamily>(
        &mut self,
        context: u64,
        packet: &mut PacketBuffer<InsecureTag, A>,
    ) -> Result<(), WriteError> {
        let sequence = self.sequence.next()?;
        packet.header.sequence = sequence.number;

        packet.tag = InsecureTag {
            salt: context,
            checksum: 0,
        };
        if self.checksum {
            packet.tag.checksum = checksum(packet);
        }

        self.sequence.commit(sequence);
        self.idle_since = idle_clock();
        trace!(sequence = ?sequence, kind = packet.header.kind, "insecure packet stamped");
        Ok(())
    }

    fn sequence(&self) -> PacketSequence {
        self.sequence.sequence()
    }

    fn idle_since(&self) -> u8 {
        self.idle_since
    }
}

impl Security for Insecure {
    type Tag = InsecureTag;
    type Kind = SaltExchange;
    type Reader = InsecureReader;
    type Writer = InsecureWriter;
    type Credentials = ();

    const NAME: &'static str = "insecure";

    /// A fresh salt for every connection.
    fn identity(_credentials: &()) -> u64 {
        SaltExchange::generate_salt()
    }

    fn reader(config: &ConnectionConfig) -> InsecureReader {
        InsecureReader::new(config)
    }

    fn writer(config: &ConnectionConfig) -> InsecureWriter {
        InsecureWriter::new(config)
    }

    fn establish(
        _credentials: &(),
        _role: Role,
        _peer: &u64,
        _reader: &mut InsecureReader,
        _writer: &mut InsecureWriter,
    ) -> Result<(), CryptoError> {
        Ok(())
    }
}
