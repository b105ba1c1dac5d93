//! Inbound connection handling.
//!
//! One tokio task per accepted connection; each task owns its session
//! key, state machine, and buffers outright, so a stalled client can
//! only ever lose its own connection.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::config::ServerConfig;
use crate::codec::FramedStream;
use crate::crypto::{KeyProvider, SessionKey};
use crate::error::{Error, Result};
use crate::protocol::{HandshakeState, ReceiveMachine, ReceiveState, ServerAction};
use crate::types::DeliveredMessage;

/// Upstream mailbox collaborator, interface only.
///
/// Receives each decrypted message after a successful transfer. A
/// failure is answered to the client with a negative reply; the
/// transport does not retry.
pub trait Delivery: Send + Sync + 'static {
    /// Hands one decrypted message upstream.
    fn deliver(
        &self,
        message: DeliveredMessage,
    ) -> impl Future<Output = std::result::Result<(), Box<dyn std::error::Error + Send + Sync>>> + Send;
}

/// Relay server: accept loop plus per-connection tasks.
pub struct Server<D> {
    listener: TcpListener,
    keys: Arc<dyn KeyProvider>,
    delivery: Arc<D>,
    read_timeout: Duration,
}

impl<D: Delivery> Server<D> {
    /// Binds the listen socket.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connect`] when the address cannot be bound.
    pub async fn bind(
        config: &ServerConfig,
        keys: Arc<dyn KeyProvider>,
        delivery: D,
    ) -> Result<Self> {
        let addr = format!("{}:{}", config.host, config.port);
        let listener = TcpListener::bind(&addr).await.map_err(Error::Connect)?;
        info!(%addr, "listening");

        Ok(Self {
            listener,
            keys,
            delivery: Arc::new(delivery),
            read_timeout: config.read_timeout,
        })
    }

    /// Returns the bound address (useful with an ephemeral port).
    ///
    /// # Errors
    ///
    /// Returns an error if the socket has no local address.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Runs the accept loop forever.
    ///
    /// Each connection gets its own task and its own session; a
    /// failing connection is logged and never takes the loop down.
    ///
    /// # Errors
    ///
    /// Returns an error only when accepting itself fails.
    pub async fn run(self) -> Result<()> {
        loop {
            let (stream, peer) = self.listener.accept().await?;
            let key = self.keys.session_key();
            let delivery = Arc::clone(&self.delivery);
            let read_timeout = self.read_timeout;

            tokio::spawn(async move {
                debug!(%peer, "connection accepted");
                match handle_connection(stream, key, delivery.as_ref(), read_timeout).await {
                    Ok(()) => debug!(%peer, "connection finished"),
                    Err(err) => warn!(%peer, error = %err, "connection failed"),
                }
            });
        }
    }
}

/// Serves one connection to completion, closing it on every exit path.
async fn handle_connection<D: Delivery>(
    stream: TcpStream,
    key: SessionKey,
    delivery: &D,
    read_timeout: Duration,
) -> Result<()> {
    let mut framed = FramedStream::new(stream);
    let mut machine = ReceiveMachine::new(key);

    let result = serve(&mut framed, &mut machine, delivery, read_timeout).await;

    let _ = framed.get_mut().shutdown().await;
    result
}

/// Command/payload loop for one session.
async fn serve<S, D>(
    framed: &mut FramedStream<S>,
    machine: &mut ReceiveMachine,
    delivery: &D,
    read_timeout: Duration,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
    D: Delivery,
{
    framed
        .write_line(&ReceiveMachine::greeting().to_line())
        .await?;

    loop {
        let state = machine.state();
        if state.is_terminal() {
            return Ok(());
        }

        let action = if state == ReceiveState::AwaitPayload {
            let payload = match timeout(read_timeout, framed.read_payload()).await {
                Ok(read) => read?,
                Err(_) => {
                    machine.fail();
                    return Err(Error::Timeout {
                        state: timeout_state(state),
                    });
                }
            };
            machine.on_payload(&payload)
        } else {
            let line = match timeout(read_timeout, framed.read_line()).await {
                Ok(read) => read?,
                Err(_) => {
                    machine.fail();
                    return Err(Error::Timeout {
                        state: timeout_state(state),
                    });
                }
            };
            debug!(?state, line = %line, "command received");
            machine.on_line(&line)
        };

        match action {
            ServerAction::Reply(reply) | ServerAction::ReplyThenReadPayload(reply) => {
                framed.write_line(&reply.to_line()).await?;
            }
            ServerAction::Deliver { message, reply } => {
                match delivery.deliver(message).await {
                    Ok(()) => framed.write_line(&reply.to_line()).await?,
                    Err(err) => {
                        warn!(error = %err, "upstream delivery failed");
                        framed.write_line(b"550 delivery failed\r\n").await?;
                    }
                }
            }
            ServerAction::ReplyThenClose(reply) => {
                framed.write_line(&reply.to_line()).await?;
            }
        }
    }
}

/// Maps the server state to the handshake phase it is the dual of,
/// for error reporting.
const fn timeout_state(state: ReceiveState) -> HandshakeState {
    match state {
        ReceiveState::AwaitMailFrom => HandshakeState::MailFrom,
        ReceiveState::AwaitRcptTo => HandshakeState::RcptTo,
        ReceiveState::AwaitData => HandshakeState::Data,
        ReceiveState::AwaitPayload => HandshakeState::Payload,
        ReceiveState::AwaitQuit => HandshakeState::Quit,
        ReceiveState::Closed => HandshakeState::Closed,
        ReceiveState::Failed => HandshakeState::Failed,
    }
}
