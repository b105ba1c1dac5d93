//! Outbound connection handling.

use std::io;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

use super::config::ClientConfig;
use crate::codec::FramedStream;
use crate::crypto::KeyProvider;
use crate::error::{Error, Result};
use crate::parser::parse_reply;
use crate::protocol::{ClientAction, SendMachine};
use crate::types::Envelope;

/// Sends one envelope through the relay.
///
/// Dials with the configured connect timeout, drives the handshake
/// with a per-state read timeout, and shuts the connection down on
/// every exit path. The result is a single success or failure; nothing
/// is retried here and partially written payloads are never replayed.
///
/// # Errors
///
/// Returns [`Error::Connect`] when no connection can be established,
/// and the protocol/framing/timeout errors from the handshake
/// otherwise.
pub async fn send_envelope(
    config: &ClientConfig,
    keys: &dyn KeyProvider,
    envelope: Envelope,
) -> Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let stream = timeout(config.connect_timeout, TcpStream::connect(&addr))
        .await
        .map_err(|_| Error::Connect(io::Error::new(io::ErrorKind::TimedOut, "connect timed out")))?
        .map_err(Error::Connect)?;

    debug!(%addr, from = %envelope.from(), to = %envelope.to(), "connected");

    let mut framed = FramedStream::new(stream);
    let mut machine = SendMachine::new(envelope, keys.session_key());

    let result = drive(&mut framed, &mut machine, config).await;

    // Deterministic close on success, protocol failure, and timeout alike.
    let _ = framed.get_mut().shutdown().await;
    result
}

/// Runs the reply/command loop until the machine closes or fails.
async fn drive<S>(
    framed: &mut FramedStream<S>,
    machine: &mut SendMachine,
    config: &ClientConfig,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        let state = machine.state();

        let line = match timeout(config.read_timeout, framed.read_line()).await {
            Ok(read) => read?,
            Err(_) => {
                machine.fail();
                return Err(Error::Timeout { state });
            }
        };

        let reply = parse_reply(&line)?;
        debug!(?state, code = reply.code.as_u16(), "reply received");

        match machine.on_reply(&reply)? {
            ClientAction::SendLine(bytes) => framed.write_line(&bytes).await?,
            ClientAction::SendPayload { iv, ciphertext } => {
                framed.write_payload(iv.as_bytes(), &ciphertext).await?;
            }
            ClientAction::Close => return Ok(()),
        }
    }
}
