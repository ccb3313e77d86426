//! Protocol constants for the Saltline transport.
//!
//! Wire-visible values are fixed by the protocol and MUST NOT be changed
//! between two endpoints that expect to talk to each other.

// =============================================================================
// NETWORK BUDGETS
// =============================================================================

/// Minimum MTU every IPv4 path must carry.
pub const NET_MTU_MIN_IPV4: usize = 576;

/// Minimum MTU every IPv6 path must carry.
pub const NET_MTU_MIN_IPV6: usize = 1280;

/// Worst-case IPv4 + UDP header overhead.
pub const UDP_HEADER_MIN_IPV4: usize = 28;

/// Worst-case IPv6 + UDP header overhead.
pub const UDP_HEADER_MIN_IPV6: usize = 48;

/// Largest UDP payload that survives any IPv4 path unfragmented (548).
pub const NET_PAYLOAD_SAFE_IPV4: usize = NET_MTU_MIN_IPV4 - UDP_HEADER_MIN_IPV4;

/// Largest UDP payload that survives any IPv6 path unfragmented (1232).
pub const NET_PAYLOAD_SAFE_IPV6: usize = NET_MTU_MIN_IPV6 - UDP_HEADER_MIN_IPV6;

// =============================================================================
// CRYPTOGRAPHIC CONSTANTS
// =============================================================================

/// Size of every key buffer (X25519 keys, session keys, derived keys).
pub const KEY_SIZE: usize = 32;

/// Authentication tag size carried by secure packets.
pub const AUTH_TAG_SIZE: usize = 16;

/// XChaCha20-Poly1305 nonce size.
pub const AEAD_NONCE_SIZE: usize = 24;

// =============================================================================
// PACKET LAYOUT
// =============================================================================

/// Protocol identifier stamped into every packet header.
pub const PROTOCOL_ID: u16 = 0x524E;

/// Packet header size (protocol + sequence + acknowledged + type).
pub const PACKET_HEADER_SIZE: usize = 8;

/// Tag area of insecure packets (salt + checksum + reserved).
pub const INSECURE_TAG_SIZE: usize = 12;

/// Packet type reserved for handshake carriers.
pub const HANDSHAKE_PACKET_TYPE: u16 = u16::MAX;

/// Context used for handshake carriers, before any context is agreed.
pub const HANDSHAKE_CONTEXT: u64 = 0;

/// Upper bound on body words across every address family and tag kind.
pub const MAX_BODY_WORDS: usize = NET_PAYLOAD_SAFE_IPV6 / 8;

// =============================================================================
// SEQUENCE POLICY
// =============================================================================

/// Forward distance accepted within the current generation.
pub const SEQUENCE_FORWARD_WINDOW: u16 = 1024;

/// Backward distance past which a number is read as a rollover.
pub const SEQUENCE_ROLLOVER_THRESHOLD: u16 = 32768;

/// Replay bitmap size in nonces.
pub const REPLAY_WINDOW_SIZE: usize = 2048;

// =============================================================================
// CONNECTION TABLE
// =============================================================================

/// Default number of concurrent peers a connection table admits.
pub const DEFAULT_MAX_CONNECTIONS: usize = u16::MAX as usize;
