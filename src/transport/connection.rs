//! Per-peer session state.
//!
//! A [`Connection`] owns the reader, writer and handshake of one peer. It
//! picks the context each packet is bound to, installs session keys as soon
//! as the peer's identity is known, and keeps packets away from the
//! application until the handshake is complete.

use tracing::{debug, trace, warn};

use crate::address::AddressFamily;
use crate::core::{ConnectionConfig, CryptoError, HANDSHAKE_CONTEXT, ReadError, WriteError};
use crate::crypto::KeyBuffer;
use crate::handshake::{Handshake, HandshakeStage, HandshakeStatus, KeyExchange, Role};
use crate::packet::{PacketBuffer, PacketSequence, PacketTag};

use super::insecure::Insecure;
use super::security::{PacketReader, PacketWriter, Security};

/// Outcome of a successful [`Connection::read_packet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStatus {
    /// Application data, ready to be deserialized.
    Available,
    /// Valid, but not for the application: a handshake carrier, or data
    /// arriving before the session is established.
    Ignored,
}

/// One peer's session.
#[derive(Debug)]
pub struct Connection<S: Security, A: AddressFamily> {
    address: A::Address,
    reader: S::Reader,
    writer: S::Writer,
    handshake: Handshake<S::Kind>,
    credentials: S::Credentials,
    config: ConnectionConfig,
    established: bool,
}

impl<S: Security, A: AddressFamily> Connection<S, A> {
    fn new(
        address: A::Address,
        role: Role,
        credentials: S::Credentials,
        config: ConnectionConfig,
    ) -> Self {
        let identity = S::identity(&credentials);
        let handshake = match role {
            Role::Client => Handshake::client(identity),
            Role::Server => Handshake::server(identity),
        };

        Self {
            address,
            reader: S::reader(&config),
            writer: S::writer(&config),
            handshake,
            credentials,
            config,
            established: false,
        }
    }

    /// Server side of a session with the client at `address`.
    pub fn server(
        address: A::Address,
        credentials: S::Credentials,
        config: ConnectionConfig,
    ) -> Self {
        Self::new(address, Role::Server, credentials, config)
    }

    /// Peer address.
    pub fn address(&self) -> A::Address {
        self.address
    }

    /// Handshake state.
    pub fn handshake(&self) -> &Handshake<S::Kind> {
        &self.handshake
    }

    /// Current handshake stage.
    pub fn stage(&self) -> HandshakeStage {
        self.handshake.stage()
    }

    /// Whether the handshake is complete.
    pub fn is_connected(&self) -> bool {
        self.handshake.is_connected()
    }

    /// Configuration this connection was created with.
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Last sequence accepted from the peer.
    pub fn receive_sequence(&self) -> PacketSequence {
        self.reader.sequence()
    }

    /// Last sequence sent to the peer.
    pub fn send_sequence(&self) -> PacketSequence {
        self.writer.sequence()
    }

    /// Idle clock reading of the last packet accepted from the peer.
    pub fn idle_since(&self) -> u8 {
        self.reader.idle_since()
    }

    /// Context for data packets: agreed once the client has read the
    /// server's challenge, or the server the client's hello.
    fn data_context(&self) -> Option<u64> {
        let agreed = match self.handshake.role() {
            Role::Client => HandshakeStage::ServerChallenge,
            Role::Server => HandshakeStage::ClientHello,
        };
        (self.handshake.stage() >= agreed).then(|| self.handshake.data())
    }

    fn context_for<T: PacketTag>(&self, packet: &PacketBuffer<T, A>) -> Option<u64> {
        if packet.is_handshake() {
            Some(HANDSHAKE_CONTEXT)
        } else {
            self.data_context()
        }
    }

    /// Validate an inbound packet and feed it to the handshake.
    ///
    /// On [`ReadStatus::Available`] the body cursor is at the start of the
    /// body.
    pub fn read_packet(
        &mut self,
        packet: &mut PacketBuffer<S::Tag, A>,
    ) -> Result<ReadStatus, ReadError> {
        let result = match self.context_for(packet) {
            Some(context) => self.reader.read_packet(context, packet),
            None => Err(ReadError::Context),
        };
        if let Err(err) = result {
            debug!(
                peer = %self.address,
                security = S::NAME,
                sequence = packet.header.sequence,
                kind = packet.header.kind,
                error = %err,
                "packet dropped"
            );
            return Err(err);
        }

        let status = self.handshake.read_packet(packet);

        if !self.established {
            self.try_establish()?;
        }

        match status {
            HandshakeStatus::Connected => {
                packet.rewind();
                trace!(peer = %self.address, kind = packet.header.kind, "packet available");
                Ok(ReadStatus::Available)
            }
            HandshakeStatus::Pending => Ok(ReadStatus::Ignored),
        }
    }

    /// Install session keys if the server has just learned the client's
    /// identity.
    fn try_establish(&mut self) -> Result<(), ReadError> {
        let Some(peer) = self.handshake.peer_args() else {
            return Ok(());
        };

        match S::establish(
            &self.credentials,
            Role::Server,
            peer,
            &mut self.reader,
            &mut self.writer,
        ) {
            Ok(()) => {
                self.established = true;
                Ok(())
            }
            Err(err) => {
                warn!(peer = %self.address, error = %err, "rejecting client hello");
                // Forget the hello so that a valid one can still follow.
                self.handshake = Handshake::server(S::identity(&self.credentials));
                Err(ReadError::Context)
            }
        }
    }

    /// Tag or encrypt an outbound packet.
    ///
    /// Data packets can be written once a context is agreed; handshake
    /// carriers always.
    pub fn write_packet(&mut self, packet: &mut PacketBuffer<S::Tag, A>) -> Result<(), WriteError> {
        let context = self.context_for(packet).ok_or(WriteError::Context)?;
        packet.header.acknowledged = self.reader.sequence().number;
        self.writer.write_packet(context, packet)
    }

    /// The next handshake packet to send, already tagged, if the handshake
    /// has anything to say.
    ///
    /// Call this from the event loop until it returns `None`; it resends the
    /// current stage's message until the peer answers.
    pub fn poll_handshake(&mut self) -> Result<Option<PacketBuffer<S::Tag, A>>, WriteError> {
        let Some(mut packet) = self.handshake.write_packet()? else {
            return Ok(None);
        };
        self.write_packet(&mut packet)?;
        Ok(Some(packet))
    }
}

impl<S, A> Connection<S, A>
where
    S: Security<Kind = KeyExchange>,
    A: AddressFamily,
{
    /// Client side of a secure session with the server at `address`, whose
    /// public key is known up front.
    pub fn secure_client(
        address: A::Address,
        credentials: S::Credentials,
        server_public: &KeyBuffer,
        config: ConnectionConfig,
    ) -> Result<Self, CryptoError> {
        let mut connection = Self::new(address, Role::Client, credentials, config);
        S::establish(
            &connection.credentials,
            Role::Client,
            server_public,
            &mut connection.reader,
            &mut connection.writer,
        )?;
        connection.established = true;
        Ok(connection)
    }

    /// Public key this side announces in its handshake.
    pub fn public_key(&self) -> &KeyBuffer {
        self.handshake.args()
    }
}

impl<A: AddressFamily> Connection<Insecure, A> {
    /// Client side of an insecure session.
    pub fn insecure_client(address: A::Address, config: ConnectionConfig) -> Self {
        let mut connection = Self::new(address, Role::Client, (), config);
        connection.established = true;
        connection
    }

    /// Server side of an insecure session.
    pub fn insecure_server(address: A::Address, config: ConnectionConfig) -> Self {
        Self::server(address, (), config)
    }

    /// Salt this side contributed to the handshake.
    pub fn local_salt(&self) -> u64 {
        *self.handshake.args()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::{AddressIpv4, Ipv4};
    use crate::core::HANDSHAKE_PACKET_TYPE;
    use crate::crypto::KeyPair;
    use crate::handshake::HandshakeMessage;
    use crate::packet::{InsecurePacket, SecurePacket};
    use crate::transport::{Authenticated, Encrypted};

    fn transmit<T: PacketTag>(packet: &PacketBuffer<T, Ipv4>) -> PacketBuffer<T, Ipv4> {
        PacketBuffer::decode(&packet.to_bytes()).unwrap()
    }

    /// Drive both handshakes until neither has anything left to send.
    fn connect<S: Security>(client: &mut Connection<S, Ipv4>, server: &mut Connection<S, Ipv4>) {
        for _ in 0..8 {
            if let Some(packet) = client.poll_handshake().unwrap() {
                assert_eq!(
                    server.read_packet(&mut transmit(&packet)),
                    Ok(ReadStatus::Ignored)
                );
            }
            if let Some(packet) = server.poll_handshake().unwrap() {
                assert_eq!(
                    client.read_packet(&mut transmit(&packet)),
                    Ok(ReadStatus::Ignored)
                );
            }
        }
        assert!(client.is_connected());
        assert!(server.is_connected());
    }

    fn secure_pair<S: Security<Kind = KeyExchange, Credentials = KeyPair>>()
    -> (Connection<S, Ipv4>, Connection<S, Ipv4>) {
        let server_keys = KeyPair::ephemeral();
        let client = Connection::<S, Ipv4>::secure_client(
            AddressIpv4::localhost(9000),
            KeyPair::ephemeral(),
            server_keys.public_key(),
            ConnectionConfig::default(),
        )
        .unwrap();
        let server = Connection::<S, Ipv4>::server(
            AddressIpv4::localhost(9001),
            server_keys,
            ConnectionConfig::default(),
        );
        (client, server)
    }

    #[test]
    fn test_authenticated_session() {
        let (mut client, mut server) = secure_pair::<Authenticated>();
        connect(&mut client, &mut server);
        assert_eq!(client.handshake().data(), server.handshake().data());

        let mut packet = SecurePacket::<Ipv4>::new(7);
        packet.serialize_u8(0x01).unwrap();
        packet.serialize_u8(0x02).unwrap();
        client.write_packet(&mut packet).unwrap();

        let mut received = transmit(&packet);
        assert_eq!(server.read_packet(&mut received), Ok(ReadStatus::Available));
        assert_eq!(received.deserialize_u8().unwrap(), 0x01);
        assert_eq!(received.deserialize_u8().unwrap(), 0x02);

        assert_eq!(
            server.read_packet(&mut transmit(&packet)),
            Err(ReadError::Sequence)
        );
    }

    #[test]
    fn test_encrypted_session_both_directions() {
        let (mut client, mut server) = secure_pair::<Encrypted>();
        connect(&mut client, &mut server);

        let mut packet = SecurePacket::<Ipv4>::new(2);
        packet.serialize_u64(0xDEAD_BEEF).unwrap();
        server.write_packet(&mut packet).unwrap();

        let mut received = transmit(&packet);
        assert_eq!(client.read_packet(&mut received), Ok(ReadStatus::Available));
        assert_eq!(received.deserialize_u64().unwrap(), 0xDEAD_BEEF);
    }

    #[test]
    fn test_data_before_handshake() {
        let (mut client, mut server) = secure_pair::<Authenticated>();

        let mut packet = SecurePacket::<Ipv4>::new(7);
        assert_eq!(client.write_packet(&mut packet), Err(WriteError::Context));
        assert_eq!(
            server.read_packet(&mut transmit(&packet)),
            Err(ReadError::Context)
        );
    }

    #[test]
    fn test_data_ignored_until_connected() {
        let (mut client, mut server) = secure_pair::<Authenticated>();

        let hello = client.poll_handshake().unwrap().unwrap();
        server.read_packet(&mut transmit(&hello)).unwrap();
        let challenge = server.poll_handshake().unwrap().unwrap();
        client.read_packet(&mut transmit(&challenge)).unwrap();

        // Context agreed, but the server has not seen the echo yet
        let mut packet = SecurePacket::<Ipv4>::new(7);
        client.write_packet(&mut packet).unwrap();
        assert_eq!(
            server.read_packet(&mut transmit(&packet)),
            Ok(ReadStatus::Ignored)
        );
    }

    #[test]
    fn test_handshake_carrier_never_available() {
        let (mut client, mut server) = secure_pair::<Authenticated>();
        connect(&mut client, &mut server);

        let mut carrier = SecurePacket::<Ipv4>::new(HANDSHAKE_PACKET_TYPE);
        carrier.serialize_padding();
        client.write_packet(&mut carrier).unwrap();
        assert_eq!(
            server.read_packet(&mut transmit(&carrier)),
            Ok(ReadStatus::Ignored)
        );
    }

    #[test]
    fn test_weak_client_key_resets_handshake() {
        let mut server = Connection::<Authenticated, Ipv4>::server(
            AddressIpv4::localhost(1),
            KeyPair::ephemeral(),
            ConnectionConfig::default(),
        );

        let weak = KeyBuffer::from_bytes([0; 32]);
        let mut hello: SecurePacket<Ipv4> = HandshakeMessage::<KeyExchange>::ClientHello(weak)
            .to_packet()
            .unwrap();
        hello.header.sequence = 1;

        assert_eq!(
            server.read_packet(&mut transmit(&hello)),
            Err(ReadError::Context)
        );
        assert_eq!(server.stage(), HandshakeStage::Disconnected);
    }

    #[test]
    fn test_insecure_session() {
        let mut client = Connection::<Insecure, Ipv4>::insecure_client(
            AddressIpv4::localhost(7000),
            ConnectionConfig::default(),
        );
        let mut server = Connection::<Insecure, Ipv4>::insecure_server(
            AddressIpv4::localhost(7001),
            ConnectionConfig::default(),
        );
        connect(&mut client, &mut server);

        let salt = client.local_salt() ^ server.local_salt();
        assert_eq!(client.handshake().data(), salt);

        let mut packet = InsecurePacket::<Ipv4>::new(1);
        packet.serialize_u16(5).unwrap();
        client.write_packet(&mut packet).unwrap();
        assert_eq!(packet.tag.salt, salt);
        assert_eq!(
            server.read_packet(&mut transmit(&packet)),
            Ok(ReadStatus::Available)
        );
    }

    #[test]
    fn test_acknowledged_tracks_receive_sequence() {
        let (mut client, mut server) = secure_pair::<Authenticated>();
        connect(&mut client, &mut server);

        let mut packet = SecurePacket::<Ipv4>::new(1);
        server.write_packet(&mut packet).unwrap();
        assert_eq!(packet.header.acknowledged, server.receive_sequence().number);
        assert!(server.receive_sequence().number > 0);
    }
}
