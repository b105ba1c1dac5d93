//! Connection management: dialing, accepting, timeouts, sessions.
//!
//! Each connection owns one session: its state machine, its key
//! material, and its buffers. Nothing is shared between sessions, so
//! concurrent connections need no locking.

mod client;
mod config;
mod server;

pub use client::send_envelope;
pub use config::{ClientConfig, ServerConfig};
pub use server::{Delivery, Server};
