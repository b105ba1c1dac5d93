//! Relay command builder and parser.
//!
//! The client serializes commands; the server parses them to drive the
//! dual state machine. Both sides speak the same four-command protocol.

use crate::types::Address;

/// Relay protocol command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// MAIL FROM - announce sender, start a transfer
    MailFrom {
        /// Sender address
        from: Address,
    },
    /// RCPT TO - announce recipient
    RcptTo {
        /// Recipient address
        to: Address,
    },
    /// DATA - begin encrypted payload
    Data,
    /// QUIT - close connection
    Quit,
}

impl Command {
    /// Serializes the command to a CRLF-terminated line.
    #[must_use]
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();

        match self {
            Self::MailFrom { from } => {
                buf.extend_from_slice(b"MAIL FROM:<");
                buf.extend_from_slice(from.as_str().as_bytes());
                buf.push(b'>');
            }
            Self::RcptTo { to } => {
                buf.extend_from_slice(b"RCPT TO:<");
                buf.extend_from_slice(to.as_str().as_bytes());
                buf.push(b'>');
            }
            Self::Data => {
                buf.extend_from_slice(b"DATA");
            }
            Self::Quit => {
                buf.extend_from_slice(b"QUIT");
            }
        }

        buf.extend_from_slice(b"\r\n");
        buf
    }

    /// Parses a command line (without the CRLF terminator).
    ///
    /// Command verbs are case-insensitive. Returns `None` for unknown
    /// verbs or malformed arguments; the server answers those with a
    /// negative reply rather than an error.
    #[must_use]
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim_end();

        if line.eq_ignore_ascii_case("DATA") {
            return Some(Self::Data);
        }
        if line.eq_ignore_ascii_case("QUIT") {
            return Some(Self::Quit);
        }
        if let Some(rest) = strip_verb(line, "MAIL FROM:") {
            return parse_angle_addr(rest).map(|from| Self::MailFrom { from });
        }
        if let Some(rest) = strip_verb(line, "RCPT TO:") {
            return parse_angle_addr(rest).map(|to| Self::RcptTo { to });
        }

        None
    }
}

/// Strips a case-insensitive verb prefix.
fn strip_verb<'a>(line: &'a str, verb: &str) -> Option<&'a str> {
    let prefix = line.get(..verb.len())?;
    if prefix.eq_ignore_ascii_case(verb) {
        line.get(verb.len()..)
    } else {
        None
    }
}

/// Parses `<address>` with optional surrounding whitespace.
fn parse_angle_addr(rest: &str) -> Option<Address> {
    let rest = rest.trim();
    let inner = rest.strip_prefix('<')?.strip_suffix('>')?;
    Address::new(inner).ok()
}
