//! Server-side handshake engine, the dual of [`SendMachine`].
//!
//! [`SendMachine`]: super::SendMachine

use crate::command::Command;
use crate::crypto::{self, SessionKey};
use crate::types::{Address, DeliveredMessage, Reply, ReplyCode};

/// Out-of-order commands, unknown verbs, or undecryptable payloads
/// tolerated per connection before the server force-closes.
pub const MAX_VIOLATIONS: u32 = 3;

/// Server-side handshake state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReceiveState {
    /// Waiting for MAIL FROM.
    #[default]
    AwaitMailFrom,
    /// Waiting for RCPT TO.
    AwaitRcptTo,
    /// Waiting for DATA.
    AwaitData,
    /// Reading the encrypted payload.
    AwaitPayload,
    /// Payload accepted; waiting for QUIT or a new transfer.
    AwaitQuit,
    /// QUIT acknowledged.
    Closed,
    /// Violation budget exhausted.
    Failed,
}

impl ReceiveState {
    /// Returns true once the connection must be torn down.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Failed)
    }
}

/// What the connection layer must do after feeding the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerAction {
    /// Send the reply, then read the next command line.
    Reply(Reply),
    /// Send the reply, then read the binary payload.
    ReplyThenReadPayload(Reply),
    /// Hand the message upstream, send the reply, read the next command.
    Deliver {
        /// Decrypted message for the upstream collaborator.
        message: DeliveredMessage,
        /// Acceptance reply to send after delivery.
        reply: Reply,
    },
    /// Send the reply, then close the connection.
    ReplyThenClose(Reply),
}

/// Validates inbound commands against the handshake sequence and
/// decrypts accepted payloads.
#[derive(Debug)]
pub struct ReceiveMachine {
    state: ReceiveState,
    key: SessionKey,
    sender: Option<Address>,
    recipient: Option<Address>,
    violations: u32,
}

impl ReceiveMachine {
    /// Creates a machine for one inbound connection.
    #[must_use]
    pub const fn new(key: SessionKey) -> Self {
        Self {
            state: ReceiveState::AwaitMailFrom,
            key,
            sender: None,
            recipient: None,
            violations: 0,
        }
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> ReceiveState {
        self.state
    }

    /// The greeting to send when the connection opens.
    #[must_use]
    pub fn greeting() -> Reply {
        Reply::new(ReplyCode::SERVICE_READY, "mailrelay ready".into())
    }

    /// Moves to `Failed`; used by the connection layer on timeout.
    pub const fn fail(&mut self) {
        if !matches!(self.state, ReceiveState::Closed) {
            self.state = ReceiveState::Failed;
        }
    }

    /// Feeds one command line and returns the action to perform.
    pub fn on_line(&mut self, line: &str) -> ServerAction {
        let Some(command) = Command::parse(line) else {
            return self.violation(Reply::new(
                ReplyCode::SYNTAX_ERROR,
                "command unrecognized".into(),
            ));
        };

        match (self.state, command) {
            // QUIT is honored from any command-phase state.
            (
                ReceiveState::AwaitMailFrom
                | ReceiveState::AwaitRcptTo
                | ReceiveState::AwaitData
                | ReceiveState::AwaitQuit,
                Command::Quit,
            ) => {
                self.state = ReceiveState::Closed;
                ServerAction::ReplyThenClose(Reply::new(ReplyCode::CLOSING, "bye".into()))
            }
            // A fresh MAIL FROM starts a transfer, also right after a
            // completed one.
            (ReceiveState::AwaitMailFrom | ReceiveState::AwaitQuit, Command::MailFrom { from }) => {
                self.sender = Some(from);
                self.recipient = None;
                self.state = ReceiveState::AwaitRcptTo;
                ServerAction::Reply(Reply::new(ReplyCode::OK, "OK".into()))
            }
            (ReceiveState::AwaitRcptTo, Command::RcptTo { to }) => {
                self.recipient = Some(to);
                self.state = ReceiveState::AwaitData;
                ServerAction::Reply(Reply::new(ReplyCode::OK, "OK".into()))
            }
            (ReceiveState::AwaitData, Command::Data) => {
                self.state = ReceiveState::AwaitPayload;
                ServerAction::ReplyThenReadPayload(Reply::new(
                    ReplyCode::START_DATA,
                    "end data with <CR><LF>.<CR><LF>".into(),
                ))
            }
            _ => self.violation(Reply::new(
                ReplyCode::BAD_SEQUENCE,
                "bad sequence of commands".into(),
            )),
        }
    }

    /// Feeds the raw payload bytes (IV followed by ciphertext).
    ///
    /// On success the decrypted message is handed back for delivery;
    /// on any decryption or format failure the payload is rejected
    /// without partial plaintext and the transfer is reset.
    pub fn on_payload(&mut self, payload: &[u8]) -> ServerAction {
        debug_assert_eq!(self.state, ReceiveState::AwaitPayload);

        let decrypted = crypto::split_payload(payload)
            .and_then(|(iv, ciphertext)| crypto::decrypt_body(&self.key, &iv, ciphertext));

        let (Some(sender), Some(recipient)) = (self.sender.take(), self.recipient.take()) else {
            return self.reject_payload();
        };

        let Ok(plaintext) = decrypted else {
            return self.reject_payload();
        };

        let Some(message) = DeliveredMessage::from_plaintext(sender, recipient, &plaintext) else {
            return self.reject_payload();
        };

        self.state = ReceiveState::AwaitQuit;
        ServerAction::Deliver {
            message,
            reply: Reply::new(ReplyCode::OK, "message accepted".into()),
        }
    }

    fn reject_payload(&mut self) -> ServerAction {
        self.sender = None;
        self.recipient = None;
        self.state = ReceiveState::AwaitMailFrom;
        self.violation(Reply::new(ReplyCode::ACTION_NOT_TAKEN, "invalid data".into()))
    }

    /// Records one violation; closes the connection once the budget is
    /// exhausted.
    fn violation(&mut self, reply: Reply) -> ServerAction {
        self.violations += 1;
        if self.violations >= MAX_VIOLATIONS {
            self.state = ReceiveState::Failed;
            return ServerAction::ReplyThenClose(Reply::new(
                ReplyCode::SERVICE_UNAVAILABLE,
                "too many protocol errors".into(),
            ));
        }
        ServerAction::Reply(reply)
    }
}
