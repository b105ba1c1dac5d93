//! Message envelope types.

use super::Address;

/// One message to be transmitted through the relay.
///
/// Immutable once constructed; the client state machine consumes it
/// and it is gone after the attempt, successful or not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    from: Address,
    to: Address,
    subject: String,
    body: Vec<u8>,
}

impl Envelope {
    /// Creates a new envelope.
    #[must_use]
    pub const fn new(from: Address, to: Address, subject: String, body: Vec<u8>) -> Self {
        Self {
            from,
            to,
            subject,
            body,
        }
    }

    /// Sender address.
    #[must_use]
    pub const fn from(&self) -> &Address {
        &self.from
    }

    /// Recipient address.
    #[must_use]
    pub const fn to(&self) -> &Address {
        &self.to
    }

    /// Message subject.
    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Message body bytes.
    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Serializes subject and body into the plaintext that gets
    /// encrypted for the wire: `subject LF body`.
    #[must_use]
    pub fn plaintext(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.subject.len() + 1 + self.body.len());
        buf.extend_from_slice(self.subject.as_bytes());
        buf.push(b'\n');
        buf.extend_from_slice(&self.body);
        buf
    }
}

/// A message the server decrypted and is handing upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveredMessage {
    /// Sender address as announced in MAIL FROM.
    pub from: Address,
    /// Recipient address as announced in RCPT TO.
    pub to: Address,
    /// Decrypted subject line.
    pub subject: String,
    /// Decrypted body bytes.
    pub body: Vec<u8>,
}

impl DeliveredMessage {
    /// Splits decrypted plaintext (`subject LF body`) into a delivered
    /// message. Returns `None` when the plaintext has no subject/body
    /// separator or the subject is not valid UTF-8.
    #[must_use]
    pub fn from_plaintext(from: Address, to: Address, plaintext: &[u8]) -> Option<Self> {
        let split = plaintext.iter().position(|&b| b == b'\n')?;
        let subject = std::str::from_utf8(&plaintext[..split]).ok()?.to_string();
        let body = plaintext[split + 1..].to_vec();
        Some(Self {
            from,
            to,
            subject,
            body,
        })
    }
}
