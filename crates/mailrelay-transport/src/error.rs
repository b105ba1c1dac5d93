//! Error types for relay transport operations.

use std::io;

use crate::protocol::HandshakeState;

/// Result type alias for transport operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Transport error types.
///
/// None of these are retried internally; every error path closes the
/// underlying connection before the error is returned to the caller.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// TCP connection could not be established.
    #[error("connect failed: {0}")]
    Connect(#[source] io::Error),

    /// Unexpected reply code or malformed command for the current state.
    #[error("protocol error in state {state:?}: reply code {code}")]
    Protocol {
        /// Handshake state when the offending input arrived.
        state: HandshakeState,
        /// Reply code received (or sent, on the server side).
        code: u16,
    },

    /// Line too long, malformed terminator, or oversized payload.
    #[error("framing error: {0}")]
    Framing(String),

    /// Payload could not be decrypted.
    ///
    /// Deliberately carries no detail: truncation, misalignment, and
    /// padding mismatch are indistinguishable to the peer.
    #[error("payload decryption failed")]
    Decryption,

    /// No response within the configured read timeout.
    #[error("timed out in state {state:?}")]
    Timeout {
        /// Handshake state that was waiting for the peer.
        state: HandshakeState,
    },

    /// I/O error on an established connection.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Invalid envelope address.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// Key material has the wrong length or is missing.
    #[error("invalid key material: {0}")]
    InvalidKey(String),
}

impl Error {
    /// Creates a protocol error for an unexpected reply code.
    #[must_use]
    pub const fn unexpected_reply(state: HandshakeState, code: u16) -> Self {
        Self::Protocol { state, code }
    }

    /// Returns true if the failure was the peer's protocol behavior
    /// rather than the local environment.
    #[must_use]
    pub const fn is_protocol_violation(&self) -> bool {
        matches!(self, Self::Protocol { .. } | Self::Framing(_) | Self::Decryption)
    }
}
