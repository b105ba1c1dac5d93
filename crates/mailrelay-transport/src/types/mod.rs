//! Core transport types: addresses, envelopes, replies.

mod address;
mod envelope;
mod reply;

pub use address::Address;
pub use envelope::{DeliveredMessage, Envelope};
pub use reply::{Reply, ReplyCode};
