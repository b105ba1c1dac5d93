//! Handshake state machines.
//!
//! Both engines are sans-IO: they consume parsed input (replies on the
//! client, command lines and payload bytes on the server) and emit the
//! action the connection layer must perform. All transitions are
//! synchronous; the only suspension points live in the connection
//! layer's reads and writes. This keeps every (state, input) pair
//! testable without a socket.

mod client;
mod server;

pub use client::{ClientAction, SendMachine};
pub use server::{MAX_VIOLATIONS, ReceiveMachine, ReceiveState, ServerAction};

/// Client-side handshake state.
///
/// Transitions are strictly sequential and unidirectional, except for
/// `Failed`, which is reachable from every state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HandshakeState {
    /// Waiting for the server greeting (220).
    #[default]
    Greeting,
    /// MAIL FROM sent, waiting for 250.
    MailFrom,
    /// RCPT TO sent, waiting for 250.
    RcptTo,
    /// DATA sent, waiting for 354.
    Data,
    /// Encrypted payload sent, waiting for 250.
    Payload,
    /// QUIT sent, waiting for 221.
    Quit,
    /// Transfer complete, connection closed.
    Closed,
    /// Protocol violation, timeout, or cancellation.
    Failed,
}

impl HandshakeState {
    /// Returns true once the session can make no further progress.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Failed)
    }
}
