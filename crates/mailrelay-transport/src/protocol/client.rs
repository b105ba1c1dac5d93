//! Client-side handshake engine.

use super::HandshakeState;
use crate::command::Command;
use crate::crypto::{self, Iv, SessionKey};
use crate::error::{Error, Result};
use crate::types::{Envelope, Reply, ReplyCode};

/// What the connection layer must do next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientAction {
    /// Write a CRLF-terminated command line.
    SendLine(Vec<u8>),
    /// Write the IV, ciphertext, and payload terminator.
    SendPayload {
        /// Freshly drawn message IV.
        iv: Iv,
        /// PKCS7-padded ciphertext.
        ciphertext: Vec<u8>,
    },
    /// Transfer complete; close the connection.
    Close,
}

/// Drives one envelope transfer, one reply at a time.
///
/// The engine owns the envelope and the session key; the plaintext is
/// encrypted exactly once, when the server accepts DATA. Any reply
/// code outside the expected set moves the machine to
/// [`HandshakeState::Failed`] permanently.
#[derive(Debug)]
pub struct SendMachine {
    state: HandshakeState,
    envelope: Envelope,
    key: SessionKey,
}

impl SendMachine {
    /// Creates a machine for one envelope with a session key.
    #[must_use]
    pub const fn new(envelope: Envelope, key: SessionKey) -> Self {
        Self {
            state: HandshakeState::Greeting,
            envelope,
            key,
        }
    }

    /// Current handshake state.
    #[must_use]
    pub const fn state(&self) -> HandshakeState {
        self.state
    }

    /// Moves to `Failed`; used by the connection layer on timeout or
    /// cancellation. Idempotent, and a no-op after `Closed`.
    pub const fn fail(&mut self) {
        if !matches!(self.state, HandshakeState::Closed) {
            self.state = HandshakeState::Failed;
        }
    }

    /// Feeds one server reply and returns the next action.
    ///
    /// # Errors
    ///
    /// Returns a protocol error naming the state and the received code
    /// when the reply is outside the expected set; the machine is in
    /// `Failed` afterwards and accepts no further input.
    pub fn on_reply(&mut self, reply: &Reply) -> Result<ClientAction> {
        let state = self.state;
        let code = reply.code;

        let action = match (state, code) {
            (HandshakeState::Greeting, ReplyCode::SERVICE_READY) => {
                self.state = HandshakeState::MailFrom;
                ClientAction::SendLine(
                    Command::MailFrom {
                        from: self.envelope.from().clone(),
                    }
                    .serialize(),
                )
            }
            (HandshakeState::MailFrom, ReplyCode::OK) => {
                self.state = HandshakeState::RcptTo;
                ClientAction::SendLine(
                    Command::RcptTo {
                        to: self.envelope.to().clone(),
                    }
                    .serialize(),
                )
            }
            (HandshakeState::RcptTo, ReplyCode::OK) => {
                self.state = HandshakeState::Data;
                ClientAction::SendLine(Command::Data.serialize())
            }
            (HandshakeState::Data, ReplyCode::START_DATA) => {
                self.state = HandshakeState::Payload;
                let (iv, ciphertext) = crypto::encrypt_body(&self.key, &self.envelope.plaintext());
                ClientAction::SendPayload { iv, ciphertext }
            }
            (HandshakeState::Payload, ReplyCode::OK) => {
                self.state = HandshakeState::Quit;
                ClientAction::SendLine(Command::Quit.serialize())
            }
            (HandshakeState::Quit, ReplyCode::CLOSING) => {
                self.state = HandshakeState::Closed;
                ClientAction::Close
            }
            _ => {
                self.state = HandshakeState::Failed;
                return Err(Error::unexpected_reply(state, code.as_u16()));
            }
        };

        Ok(action)
    }
}
