//! Security levels and the pieces every reader and writer share.

use std::fmt::Debug;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::address::AddressFamily;
use crate::core::{ConnectionConfig, CryptoError, ReadError, SequencePolicy, WriteError};
use crate::handshake::{HandshakeKind, Role};
use crate::packet::{PacketBuffer, PacketSequence, PacketTag, ReplayWindow};

/// Validates inbound packets for one connection.
pub trait PacketReader: Debug + Send {
    /// Tag kind this reader checks.
    type Tag: PacketTag;

    /// Accept or reject an inbound packet.
    ///
    /// `context` is the handshake context the packet must be bound to. On
    /// success the receive sequence and idle clock move forward; on failure
    /// nothing changes.
    fn read_packet<A: AddressFamily>(
        &mut self,
        context: u64,
        packet: &mut PacketBuffer<Self::Tag, A>,
    ) -> Result<(), ReadError>;

    /// Last accepted sequence.
    fn sequence(&self) -> PacketSequence;

    /// Idle clock reading of the last accepted packet.
    fn idle_since(&self) -> u8;
}

/// Tags outbound packets for one connection.
pub trait PacketWriter: Debug + Send {
    /// Tag kind this writer produces.
    type Tag: PacketTag;

    /// Stamp the next sequence number and tag or encrypt the packet.
    ///
    /// The send sequence only moves forward if tagging succeeds.
    fn write_packet<A: AddressFamily>(
        &mut self,
        context: u64,
        packet: &mut PacketBuffer<Self::Tag, A>,
    ) -> Result<(), WriteError>;

    /// Last sequence sent.
    fn sequence(&self) -> PacketSequence;

    /// Idle clock reading of the last packet sent.
    fn idle_since(&self) -> u8;
}

/// A connection security level.
///
/// Bundles the tag kind, handshake kind and reader/writer pair of one
/// level so that [`Connection`](super::Connection) is written once for all
/// of them.
pub trait Security: Sized + Send + 'static {
    /// Tag area carried by packets of this level.
    type Tag: PacketTag;
    /// Handshake run by connections of this level.
    type Kind: HandshakeKind;
    /// Inbound pipeline.
    type Reader: PacketReader<Tag = Self::Tag>;
    /// Outbound pipeline.
    type Writer: PacketWriter<Tag = Self::Tag>;
    /// Long-lived local secrets.
    type Credentials: Clone + Debug + Send;

    /// Human-readable name, for logs.
    const NAME: &'static str;

    /// Local handshake identity.
    fn identity(credentials: &Self::Credentials) -> <Self::Kind as HandshakeKind>::Args;

    /// Fresh reader.
    fn reader(config: &ConnectionConfig) -> Self::Reader;

    /// Fresh writer.
    fn writer(config: &ConnectionConfig) -> Self::Writer;

    /// Install session keys once the peer's identity is known.
    fn establish(
        credentials: &Self::Credentials,
        role: Role,
        peer: &<Self::Kind as HandshakeKind>::Args,
        reader: &mut Self::Reader,
        writer: &mut Self::Writer,
    ) -> Result<(), CryptoError>;
}

/// Seconds since the Unix epoch, modulo 256.
///
/// Coarse enough to be stored in one byte, fine enough for idle timeouts
/// of a few minutes.
pub fn idle_clock() -> u8 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs() as u8)
        .unwrap_or(0)
}

/// Seconds elapsed since an idle clock reading, modulo 256.
pub fn idle_for(since: u8) -> u8 {
    idle_clock().wrapping_sub(since)
}

/// Inbound sequence tracking: acceptance window plus optional replay
/// bitmap.
#[derive(Debug, Clone)]
pub(crate) struct ReceiveWindow {
    sequence: PacketSequence,
    policy: SequencePolicy,
    replay: Option<ReplayWindow>,
}

impl ReceiveWindow {
    pub(crate) fn new(config: &ConnectionConfig) -> Self {
        Self {
            sequence: PacketSequence::default(),
            policy: config.sequence,
            replay: config.replay_protection.then(ReplayWindow::new),
        }
    }

    pub(crate) fn sequence(&self) -> PacketSequence {
        self.sequence
    }

    /// Reconstruct the full sequence of a wire number without committing it.
    pub(crate) fn check(&self, number: u16) -> Result<PacketSequence, ReadError> {
        let candidate = self
            .sequence
            .advance_with(number, &self.policy)
            .ok_or(ReadError::Sequence)?;

        if let Some(replay) = &self.replay {
            if replay.is_replay(candidate.nonce()) {
                return Err(ReadError::Sequence);
            }
        }
        Ok(candidate)
    }

    /// Record a verified packet.
    pub(crate) fn commit(&mut self, sequence: PacketSequence) {
        if let Some(replay) = &mut self.replay {
            replay.mark(sequence.nonce());
        }
        self.sequence = sequence;
    }
}

/// Outbound sequence counter.
#[derive(Debug, Clone, Default)]
pub(crate) struct SendSequence {
    sequence: PacketSequence,
}

impl SendSequence {
    pub(crate) fn sequence(&self) -> PacketSequence {
        self.sequence
    }

    /// The sequence the next packet will carry.
    pub(crate) fn next(&self) -> Result<PacketSequence, WriteError> {
        if self.sequence.is_exhausted() {
            return Err(WriteError::SequenceExhausted);
        }
        Ok(self.sequence.incremented())
    }

    pub(crate) fn commit(&mut self, sequence: PacketSequence) {
        self.sequence = sequence;
    }

    #[cfg(test)]
    pub(crate) fn at(sequence: PacketSequence) -> Self {
        Self { sequence }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_receive_window_does_not_commit_on_check() {
        let window = ReceiveWindow::new(&ConnectionConfig::default());

        assert_eq!(window.check(5), Ok(PacketSequence::new(0, 5)));
        assert_eq!(window.sequence(), PacketSequence::default());
    }

    #[test]
    fn test_receive_window_rejects_replays() {
        let mut window = ReceiveWindow::new(&ConnectionConfig::default());

        let first = window.check(1).unwrap();
        window.commit(first);
        assert_eq!(window.check(1), Err(ReadError::Sequence));
        assert!(window.check(2).is_ok());
    }

    #[test]
    fn test_receive_window_without_replay_protection() {
        let config = ConnectionConfig::new().replay_protection(false);
        let mut window = ReceiveWindow::new(&config);

        let first = window.check(1).unwrap();
        window.commit(first);
        assert_eq!(window.check(1), Ok(first));
    }

    #[test]
    fn test_receive_window_uses_policy() {
        let config = ConnectionConfig::new().sequence(SequencePolicy {
            forward_window: 2,
            rollover_threshold: 100,
        });
        let window = ReceiveWindow::new(&config);

        assert!(window.check(1).is_ok());
        assert_eq!(window.check(2), Err(ReadError::Sequence));
    }

    #[test]
    fn test_send_sequence_starts_at_one() {
        let mut send = SendSequence::default();
        let next = send.next().unwrap();
        assert_eq!(next, PacketSequence::new(0, 1));

        // Nothing moves until committed
        assert_eq!(send.next().unwrap(), next);
        send.commit(next);
        assert_eq!(send.next().unwrap(), PacketSequence::new(0, 2));
    }

    #[test]
    fn test_send_sequence_exhaustion() {
        let send = SendSequence::at(PacketSequence::new(u16::MAX, u16::MAX - 1));
        assert_eq!(
            send.next().unwrap(),
            PacketSequence::new(u16::MAX, u16::MAX)
        );

        let send = SendSequence::at(PacketSequence::new(u16::MAX, u16::MAX));
        assert_eq!(send.next(), Err(WriteError::SequenceExhausted));
    }

    #[test]
    fn test_idle_for_wraps() {
        let now = idle_clock();
        assert!(idle_for(now) <= 1);
        assert!(idle_for(now.wrapping_sub(10)) >= 10);
    }
}
