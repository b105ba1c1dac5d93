//! `mailrelay` - encrypted mail-relay daemon and one-shot sender.
//!
//! ```text
//! mailrelay serve                          run the relay server
//! mailrelay send <from> <to> <subject>     send one message, body on stdin
//! ```
//!
//! Configuration comes from the environment:
//!
//! - `MAILRELAY_HOST` - listen/connect address (default 127.0.0.1)
//! - `MAILRELAY_PORT` - TCP port (default 2526)
//! - `MAILRELAY_KEY` - session key material, base64, 32 bytes (required)
//! - `MAILRELAY_CONNECT_TIMEOUT_MS` - connect timeout (default 10000)
//! - `MAILRELAY_READ_TIMEOUT_MS` - per-state read timeout (default 30000)

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

use std::io::Read;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mailrelay_transport::{
    Address, ClientConfig, DeliveredMessage, Delivery, Envelope, Server, ServerConfig,
    StaticKeyProvider, send_envelope,
};

/// Environment-sourced settings shared by both modes.
struct Settings {
    host: String,
    port: u16,
    key_material: Vec<u8>,
    connect_timeout: Duration,
    read_timeout: Duration,
}

impl Settings {
    fn from_env() -> Result<Self, String> {
        let host = std::env::var("MAILRELAY_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());

        let port = match std::env::var("MAILRELAY_PORT") {
            Ok(raw) => raw
                .parse::<u16>()
                .map_err(|_| format!("MAILRELAY_PORT is not a port number: {raw}"))?,
            Err(_) => 2526,
        };

        // A key is mandatory; there is deliberately no built-in default.
        let encoded =
            std::env::var("MAILRELAY_KEY").map_err(|_| "MAILRELAY_KEY is not set".to_string())?;
        let key_material = base64::engine::general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|err| format!("MAILRELAY_KEY is not valid base64: {err}"))?;

        let connect_timeout = millis_env("MAILRELAY_CONNECT_TIMEOUT_MS", 10_000)?;
        let read_timeout = millis_env("MAILRELAY_READ_TIMEOUT_MS", 30_000)?;

        Ok(Self {
            host,
            port,
            key_material,
            connect_timeout,
            read_timeout,
        })
    }
}

fn millis_env(name: &str, default: u64) -> Result<Duration, String> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse::<u64>()
            .map(Duration::from_millis)
            .map_err(|_| format!("{name} is not a millisecond count: {raw}")),
        Err(_) => Ok(Duration::from_millis(default)),
    }
}

/// Delivery that logs accepted messages; the slot where a mailbox
/// storage backend would plug in.
struct LogDelivery;

impl Delivery for LogDelivery {
    async fn deliver(
        &self,
        message: DeliveredMessage,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        info!(
            from = %message.from,
            to = %message.to,
            subject = %message.subject,
            body_len = message.body.len(),
            "message accepted"
        );
        Ok(())
    }
}

async fn run_serve(settings: Settings) -> Result<(), String> {
    let keys = Arc::new(
        StaticKeyProvider::new(&settings.key_material).map_err(|err| err.to_string())?,
    );
    let config =
        ServerConfig::new(settings.host, settings.port).read_timeout(settings.read_timeout);

    let server = Server::bind(&config, keys, LogDelivery)
        .await
        .map_err(|err| err.to_string())?;
    server.run().await.map_err(|err| err.to_string())
}

async fn run_send(settings: Settings, args: &[String]) -> Result<(), String> {
    let [from, to, subject] = args else {
        return Err("usage: mailrelay send <from> <to> <subject>".to_string());
    };

    let mut body = Vec::new();
    std::io::stdin()
        .read_to_end(&mut body)
        .map_err(|err| format!("reading body from stdin: {err}"))?;

    let envelope = Envelope::new(
        Address::new(from.clone()).map_err(|err| err.to_string())?,
        Address::new(to.clone()).map_err(|err| err.to_string())?,
        subject.clone(),
        body,
    );

    let keys = StaticKeyProvider::new(&settings.key_material).map_err(|err| err.to_string())?;
    let config = ClientConfig::new(settings.host, settings.port)
        .connect_timeout(settings.connect_timeout)
        .read_timeout(settings.read_timeout);

    send_envelope(&config, &keys, envelope)
        .await
        .map_err(|err| err.to_string())?;

    info!("message sent");
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mailrelay=info,mailrelay_transport=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();

    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(err) => {
            error!("{err}");
            return ExitCode::FAILURE;
        }
    };

    let result = match args.split_first() {
        None => run_serve(settings).await,
        Some((mode, _)) if mode == "serve" => run_serve(settings).await,
        Some((mode, rest)) if mode == "send" => run_send(settings, rest).await,
        Some((mode, _)) => Err(format!("unknown mode: {mode} (expected serve or send)")),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}
