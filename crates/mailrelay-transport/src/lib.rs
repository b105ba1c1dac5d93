//! # mailrelay-transport
//!
//! A hardened transport for relaying encrypted mail between trusted
//! relays over a small SMTP-like line protocol.
//!
//! ## Protocol
//!
//! ```text
//! S: 220 mailrelay ready
//! C: MAIL FROM:<alice@mailbox.com>
//! S: 250 OK
//! C: RCPT TO:<bob@fastmail.com>
//! S: 250 OK
//! C: DATA
//! S: 354 end data with <CR><LF>.<CR><LF>
//! C: <16-byte IV><AES-256-CBC ciphertext>CRLF.CRLF
//! S: 250 message accepted
//! C: QUIT
//! S: 221 bye
//! ```
//!
//! The message body (subject and content) travels only encrypted; the
//! IV is fresh per message and the session key comes from an injected
//! [`KeyProvider`], never a compile-time constant.
//!
//! ## Quick start
//!
//! ```ignore
//! use mailrelay_transport::{
//!     Address, ClientConfig, Envelope, StaticKeyProvider, send_envelope,
//! };
//!
//! #[tokio::main]
//! async fn main() -> mailrelay_transport::Result<()> {
//!     let keys = StaticKeyProvider::new(&key_material)?;
//!     let config = ClientConfig::new("relay.example.com", 2526);
//!
//!     let envelope = Envelope::new(
//!         Address::new("alice@mailbox.com")?,
//!         Address::new("bob@fastmail.com")?,
//!         "hello".into(),
//!         b"message body".to_vec(),
//!     );
//!
//!     send_envelope(&config, &keys, envelope).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`codec`]: line and payload framing
//! - [`crypto`]: per-session payload encryption
//! - [`protocol`]: client and server handshake engines
//! - [`connection`]: connection manager (dial, accept, timeouts)

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod codec;
pub mod command;
pub mod connection;
pub mod crypto;
mod error;
pub mod parser;
pub mod protocol;
pub mod types;

pub use connection::{ClientConfig, Delivery, Server, ServerConfig, send_envelope};
pub use crypto::{KeyProvider, SessionKey, StaticKeyProvider};
pub use error::{Error, Result};
pub use protocol::{HandshakeState, ReceiveMachine, SendMachine};
pub use types::{Address, DeliveredMessage, Envelope, Reply, ReplyCode};
