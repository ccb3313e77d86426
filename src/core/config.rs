//! Connection configuration.

use super::constants::{SEQUENCE_FORWARD_WINDOW, SEQUENCE_ROLLOVER_THRESHOLD};

/// Acceptance-window thresholds for inbound sequence numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequencePolicy {
    /// Largest forward jump accepted within a generation (exclusive).
    pub forward_window: u16,
    /// Backward distance past which a number starts the next generation
    /// (exclusive).
    pub rollover_threshold: u16,
}

impl Default for SequencePolicy {
    fn default() -> Self {
        Self {
            forward_window: SEQUENCE_FORWARD_WINDOW,
            rollover_threshold: SEQUENCE_ROLLOVER_THRESHOLD,
        }
    }
}

/// Per-connection behaviour knobs.
///
/// Defaults reproduce the reference policy plus the replay bitmap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Inbound sequence acceptance policy.
    pub sequence: SequencePolicy,
    /// Reject re-delivered nonces with a sliding bitmap.
    pub replay_protection: bool,
    /// Stamp and verify the insecure CRC-16 checksum.
    pub checksum: bool,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionConfig {
    /// Create a configuration with default options.
    pub fn new() -> Self {
        Self {
            sequence: SequencePolicy::default(),
            replay_protection: true,
            checksum: false,
        }
    }

    /// Set the sequence acceptance policy.
    pub fn sequence(mut self, policy: SequencePolicy) -> Self {
        self.sequence = policy;
        self
    }

    /// Enable or disable the replay bitmap.
    pub fn replay_protection(mut self, enabled: bool) -> Self {
        self.replay_protection = enabled;
        self
    }

    /// Enable or disable the insecure checksum.
    pub fn checksum(mut self, enabled: bool) -> Self {
        self.checksum = enabled;
        self
    }
}
