//! Saltline - Handshake
//!
//! Four messages establish either a session context (secure connections)
//! or a shared salt (insecure connections):
//!
//! 1. ClientHello: client public key or salt
//! 2. ServerChallenge: server-chosen context or server salt
//! 3. ClientChallenge: the client's view of the agreed value, echoed
//! 4. ServerHello: confirmation
//!
//! All four are full-size packets of the reserved handshake type, so every
//! handshake datagram has the same length whatever it carries.

mod kind;
mod machine;
mod message;

pub use kind::{HandshakeKind, KeyExchange, SaltExchange};
pub use machine::{Handshake, HandshakeStatus, Role};
pub use message::{HandshakeMessage, HandshakeStage};
