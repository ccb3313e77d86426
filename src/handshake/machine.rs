//! The handshake state machine.
//!
//! ```text
//! client                                   server
//!   Disconnected                             Disconnected
//!   --- ClientHello(args) ------------------> ClientHello
//!   ServerChallenge <-- ServerChallenge(x) -- ServerChallenge
//!   --- ClientChallenge(data) --------------> ClientChallenge
//!   ServerHello <------------ ServerHello --- Connected
//!   Connected
//! ```
//!
//! Both sides resend the message for their current stage on every
//! [`Handshake::write_packet`] until the peer's answer arrives, so any
//! message may be lost, duplicated or reordered. Stages never move
//! backwards.

use tracing::debug;

use crate::address::AddressFamily;
use crate::core::PacketError;
use crate::packet::{PacketBuffer, PacketTag};

use super::kind::HandshakeKind;
use super::message::{HandshakeMessage, HandshakeStage};

/// Which side of the handshake an endpoint plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Initiates the handshake.
    Client,
    /// Answers handshakes.
    Server,
}

/// Result of feeding an inbound packet to the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeStatus {
    /// The session is not established, or the packet was a handshake
    /// carrier.
    Pending,
    /// The session is established and the packet is ordinary traffic.
    Connected,
}

/// Handshake state of one connection.
#[derive(Debug, Clone)]
pub struct Handshake<K: HandshakeKind> {
    role: Role,
    stage: HandshakeStage,
    args: K::Args,
    peer: Option<K::Args>,
    data: u64,
    resend_hello: bool,
}

impl<K: HandshakeKind> Handshake<K> {
    /// Client side announcing `args`.
    pub fn client(args: K::Args) -> Self {
        Self::new(Role::Client, args)
    }

    /// Server side answering with `args`.
    pub fn server(args: K::Args) -> Self {
        Self::new(Role::Server, args)
    }

    fn new(role: Role, args: K::Args) -> Self {
        Self {
            role,
            stage: HandshakeStage::Disconnected,
            args,
            peer: None,
            data: 0,
            resend_hello: false,
        }
    }

    /// Which side this is.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Current stage.
    pub fn stage(&self) -> HandshakeStage {
        self.stage
    }

    /// Whether the session is established.
    pub fn is_connected(&self) -> bool {
        self.stage == HandshakeStage::Connected
    }

    /// Local identity.
    pub fn args(&self) -> &K::Args {
        &self.args
    }

    /// The client's identity, once a server has read its ClientHello.
    pub fn peer_args(&self) -> Option<&K::Args> {
        self.peer.as_ref()
    }

    /// Agreed session context or salt. Zero until agreed.
    pub fn data(&self) -> u64 {
        self.data
    }

    fn transition(&mut self, to: HandshakeStage) {
        if to != self.stage {
            debug!(role = ?self.role, from = %self.stage, to = %to, "handshake stage");
            self.stage = to;
        }
    }

    /// Feed an inbound packet that already passed the connection reader.
    ///
    /// Messages that do not fit the current stage are ignored.
    pub fn read_packet<T: PacketTag, A: AddressFamily>(
        &mut self,
        packet: &mut PacketBuffer<T, A>,
    ) -> HandshakeStatus {
        if packet.is_handshake() {
            match HandshakeMessage::<K>::from_packet(packet) {
                Some(message) => self.read_message(message),
                None => debug!(role = ?self.role, "malformed handshake message"),
            }
            return HandshakeStatus::Pending;
        }

        // Verified traffic from a server only exists once it has accepted
        // our ClientChallenge, so it stands in for a lost ServerHello.
        if self.role == Role::Client
            && matches!(
                self.stage,
                HandshakeStage::ClientChallenge | HandshakeStage::ServerHello
            )
        {
            self.transition(HandshakeStage::Connected);
        }

        if self.is_connected() {
            HandshakeStatus::Connected
        } else {
            HandshakeStatus::Pending
        }
    }

    fn read_message(&mut self, message: HandshakeMessage<K>) {
        match (self.role, self.stage, message) {
            (Role::Client, HandshakeStage::ClientHello, HandshakeMessage::ServerChallenge(x)) => {
                self.data = K::client_data(&self.args, x);
                self.transition(HandshakeStage::ServerChallenge);
            }
            (Role::Client, HandshakeStage::ClientChallenge, HandshakeMessage::ServerHello) => {
                self.transition(HandshakeStage::ServerHello);
            }
            (Role::Server, HandshakeStage::Disconnected, HandshakeMessage::ClientHello(peer)) => {
                self.data = K::server_data(&self.args, &peer);
                self.peer = Some(peer);
                self.transition(HandshakeStage::ClientHello);
            }
            (
                Role::Server,
                HandshakeStage::ClientHello | HandshakeStage::ServerChallenge,
                HandshakeMessage::ClientChallenge(echo),
            ) if echo == self.data => {
                self.transition(HandshakeStage::ClientChallenge);
            }
            (Role::Server, HandshakeStage::Connected, HandshakeMessage::ClientChallenge(echo))
                if echo == self.data =>
            {
                self.resend_hello = true;
            }
            (role, stage, message) => {
                debug!(?role, %stage, got = %message.stage(), "unexpected handshake message");
            }
        }
    }

    /// The next outbound handshake packet, if any.
    ///
    /// Returns `None` once nothing remains to be said. A client reaches
    /// [`HandshakeStage::Connected`] here, on the first call after reading
    /// ServerHello.
    pub fn write_packet<T: PacketTag, A: AddressFamily>(
        &mut self,
    ) -> Result<Option<PacketBuffer<T, A>>, PacketError> {
        let message = match self.role {
            Role::Client => self.next_client_message(),
            Role::Server => self.next_server_message(),
        };
        message.map(|message| message.to_packet()).transpose()
    }

    fn next_client_message(&mut self) -> Option<HandshakeMessage<K>> {
        match self.stage {
            HandshakeStage::Disconnected | HandshakeStage::ClientHello => {
                self.transition(HandshakeStage::ClientHello);
                Some(HandshakeMessage::ClientHello(self.args.clone()))
            }
            HandshakeStage::ServerChallenge | HandshakeStage::ClientChallenge => {
                self.transition(HandshakeStage::ClientChallenge);
                Some(HandshakeMessage::ClientChallenge(self.data))
            }
            HandshakeStage::ServerHello | HandshakeStage::Connected => {
                self.transition(HandshakeStage::Connected);
                None
            }
        }
    }

    fn next_server_message(&mut self) -> Option<HandshakeMessage<K>> {
        match self.stage {
            HandshakeStage::Disconnected => None,
            HandshakeStage::ClientHello | HandshakeStage::ServerChallenge => {
                self.transition(HandshakeStage::ServerChallenge);
                Some(HandshakeMessage::ServerChallenge(K::challenge(
                    &self.args, self.data,
                )))
            }
            HandshakeStage::ClientChallenge | HandshakeStage::ServerHello => {
                self.transition(HandshakeStage::Connected);
                Some(HandshakeMessage::ServerHello)
            }
            HandshakeStage::Connected => {
                if std::mem::take(&mut self.resend_hello) {
                    Some(HandshakeMessage::ServerHello)
                } else {
                    None
                }
            }
        }
    }
}
