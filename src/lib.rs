//! # Saltline
//!
//! Fixed-size, bit-packed UDP packet transport for real-time applications.
//!
//! Saltline moves small typed packets between peers over UDP. Every packet
//! body is a stream of little-endian 64-bit words written through a bit
//! cursor, and every packet belongs to a connection that first completes a
//! four-message handshake. Three security levels are provided:
//!
//! - **Authenticated**: header and body signed with a one-time MAC under a
//!   single-use key derived per packet
//! - **Encrypted**: body sealed with XChaCha20-Poly1305, header as
//!   associated data
//! - **Insecure**: agreed salt in the clear, optional CRC-16
//!
//! ## Feature Flags
//!
//! - `socket` (default): tokio-backed [`transport::Socket`]
//!
//! ## Modules
//!
//! - [`core`]: Constants, configuration, and error types
//! - [`address`]: IPv4 and IPv6 address families
//! - [`crypto`]: Key material, one-time MAC, and AEAD
//! - [`packet`]: Bit-packed packet buffer and sequence numbers
//! - [`handshake`]: Four-step handshake state machine
//! - [`transport`]: Readers, writers, connections, and sockets
//!
//! ## Example Usage
//!
//! ```rust
//! use saltline::prelude::*;
//!
//! let config = ConnectionConfig::default();
//! let server_keys = KeyPair::ephemeral();
//!
//! let mut client = Connection::<Authenticated, Ipv4>::secure_client(
//!     AddressIpv4::localhost(9000),
//!     KeyPair::ephemeral(),
//!     server_keys.public_key(),
//!     config,
//! )
//! .unwrap();
//! let mut server =
//!     Connection::<Authenticated, Ipv4>::server(AddressIpv4::localhost(9001), server_keys, config);
//!
//! // Exchange handshake packets until both sides are connected
//! while !(client.is_connected() && server.is_connected()) {
//!     if let Some(packet) = client.poll_handshake().unwrap() {
//!         let mut inbound = SecurePacket::<Ipv4>::decode(&packet.to_bytes()).unwrap();
//!         let _ = server.read_packet(&mut inbound);
//!     }
//!     if let Some(packet) = server.poll_handshake().unwrap() {
//!         let mut inbound = SecurePacket::<Ipv4>::decode(&packet.to_bytes()).unwrap();
//!         let _ = client.read_packet(&mut inbound);
//!     }
//! }
//!
//! let mut packet = SecurePacket::<Ipv4>::new(7);
//! packet.serialize_u16(0x0102).unwrap();
//! client.write_packet(&mut packet).unwrap();
//!
//! let mut inbound = SecurePacket::<Ipv4>::decode(&packet.to_bytes()).unwrap();
//! assert_eq!(server.read_packet(&mut inbound).unwrap(), ReadStatus::Available);
//! assert_eq!(inbound.deserialize_u16().unwrap(), 0x0102);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod address;
pub mod core;
pub mod crypto;
pub mod handshake;
pub mod packet;
pub mod transport;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::core::*;

    pub use crate::address::{AddressFamily, AddressIpv4, AddressIpv6, Ipv4, Ipv6};
    pub use crate::crypto::{KeyBuffer, KeyPair};
    pub use crate::handshake::{HandshakeStage, Role};
    pub use crate::packet::{InsecurePacket, PacketBuffer, PacketSequence, SecurePacket};
    pub use crate::transport::{
        Authenticated, Connection, ConnectionTable, Encrypted, Insecure, PacketReader,
        PacketWriter, ReadStatus, Security,
    };

    #[cfg(feature = "socket")]
    pub use crate::transport::{Socket, SocketConfig};
}

// Re-export commonly used items at crate root
pub use core::{ConnectionConfig, Error, ReadError, WriteError};
pub use packet::{PacketBuffer, PacketSequence};
pub use transport::{Connection, ReadStatus, Security};
