//! Saltline - Transport Layer
//!
//! Readers and writers for the three security levels, the per-peer
//! [`Connection`], and the server's [`ConnectionTable`].
//!
//! - **Authenticated**: [`Authenticated`] signs header and body with a
//!   one-time MAC under a single-use key per packet
//! - **Encrypted**: [`Encrypted`] seals the body with XChaCha20-Poly1305,
//!   header as associated data
//! - **Insecure**: [`Insecure`] stamps an agreed salt and optional CRC-16
//! - **Async sockets**: [`Socket`] wrapper for tokio UDP (feature `socket`)
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │            Application                  │
//! ├─────────────────────────────────────────┤
//! │   Connection / ConnectionTable          │  ← This module
//! │   handshake, context, sequencing        │
//! ├─────────────────────────────────────────┤
//! │   PacketReader / PacketWriter           │
//! ├─────────────────────────────────────────┤
//! │              UDP                        │
//! └─────────────────────────────────────────┘
//! ```

mod authenticated;
mod connection;
mod encrypted;
mod insecure;
mod security;
#[cfg(feature = "socket")]
mod socket;
mod table;

pub use authenticated::{Authenticated, AuthenticatedReader, AuthenticatedWriter};
pub use connection::{Connection, ReadStatus};
pub use encrypted::{Encrypted, EncryptedReader, EncryptedWriter};
pub use insecure::{Insecure, InsecureReader, InsecureWriter};
pub use security::{PacketReader, PacketWriter, Security, idle_clock, idle_for};
#[cfg(feature = "socket")]
#[cfg_attr(docsrs, doc(cfg(feature = "socket")))]
pub use socket::{DEFAULT_RECV_BUFFER_SIZE, Socket, SocketConfig};
pub use table::ConnectionTable;
