//! Handshake stages and the four messages that move between them.
//!
//! Every message is a full-size packet of type
//! [`HANDSHAKE_PACKET_TYPE`](crate::core::HANDSHAKE_PACKET_TYPE) whose body
//! starts with the one-byte stage tag:
//!
//! | stage tag | message         | payload                    |
//! |-----------|-----------------|----------------------------|
//! | 1         | ClientHello     | client args (key or salt)  |
//! | 2         | ServerChallenge | 64-bit context or salt     |
//! | 3         | ClientChallenge | 64-bit echoed data         |
//! | 4         | ServerHello     | -                          |

use std::fmt;

use crate::address::AddressFamily;
use crate::core::{HANDSHAKE_PACKET_TYPE, PacketError};
use crate::packet::{PacketBuffer, PacketTag};

use super::kind::HandshakeKind;

/// Handshake progress of one endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum HandshakeStage {
    /// Nothing exchanged yet.
    #[default]
    Disconnected = 0,
    /// ClientHello sent (client) or received (server).
    ClientHello = 1,
    /// ServerChallenge received (client) or sent (server).
    ServerChallenge = 2,
    /// ClientChallenge sent (client) or received (server).
    ClientChallenge = 3,
    /// ServerHello received (client).
    ServerHello = 4,
    /// Session established.
    Connected = 5,
}

impl HandshakeStage {
    /// Wire tag of this stage.
    pub const fn tag(self) -> u8 {
        self as u8
    }

    /// Parse a wire tag.
    pub const fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::Disconnected),
            1 => Some(Self::ClientHello),
            2 => Some(Self::ServerChallenge),
            3 => Some(Self::ClientChallenge),
            4 => Some(Self::ServerHello),
            5 => Some(Self::Connected),
            _ => None,
        }
    }
}

impl fmt::Display for HandshakeStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::ClientHello => "client-hello",
            Self::ServerChallenge => "server-challenge",
            Self::ClientChallenge => "client-challenge",
            Self::ServerHello => "server-hello",
            Self::Connected => "connected",
        };
        f.write_str(name)
    }
}

/// A decoded handshake message.
#[derive(Debug, Clone, PartialEq)]
pub enum HandshakeMessage<K: HandshakeKind> {
    /// Client announces its identity.
    ClientHello(K::Args),
    /// Server answers with its challenge.
    ServerChallenge(u64),
    /// Client echoes the agreed data.
    ClientChallenge(u64),
    /// Server confirms the session.
    ServerHello,
}

impl<K: HandshakeKind> HandshakeMessage<K> {
    /// Stage tag carried by this message.
    pub fn stage(&self) -> HandshakeStage {
        match self {
            Self::ClientHello(_) => HandshakeStage::ClientHello,
            Self::ServerChallenge(_) => HandshakeStage::ServerChallenge,
            Self::ClientChallenge(_) => HandshakeStage::ClientChallenge,
            Self::ServerHello => HandshakeStage::ServerHello,
        }
    }

    /// Build the full-size carrier packet.
    pub fn to_packet<T: PacketTag, A: AddressFamily>(
        &self,
    ) -> Result<PacketBuffer<T, A>, PacketError> {
        let mut packet = PacketBuffer::new(HANDSHAKE_PACKET_TYPE);
        packet.serialize_u8(self.stage().tag())?;
        match self {
            Self::ClientHello(args) => K::write_args(args, &mut packet)?,
            Self::ServerChallenge(value) | Self::ClientChallenge(value) => {
                packet.serialize_u64(*value)?
            }
            Self::ServerHello => {}
        }
        packet.serialize_padding();
        Ok(packet)
    }

    /// Parse a carrier packet.
    ///
    /// Returns `None` for anything that is not a full-size handshake packet
    /// with a known message tag and a complete payload.
    pub fn from_packet<T: PacketTag, A: AddressFamily>(
        packet: &mut PacketBuffer<T, A>,
    ) -> Option<Self> {
        if !packet.is_handshake() || !packet.is_full_size() {
            return None;
        }

        packet.rewind();
        let stage = HandshakeStage::from_tag(packet.deserialize_u8().ok()?)?;
        match stage {
            HandshakeStage::ClientHello => K::read_args(packet).ok().map(Self::ClientHello),
            HandshakeStage::ServerChallenge => {
                packet.deserialize_u64().ok().map(Self::ServerChallenge)
            }
            HandshakeStage::ClientChallenge => {
                packet.deserialize_u64().ok().map(Self::ClientChallenge)
            }
            HandshakeStage::ServerHello => Some(Self::ServerHello),
            HandshakeStage::Disconnected | HandshakeStage::Connected => None,
        }
    }
}
