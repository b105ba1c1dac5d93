//! End-to-end tests over loopback TCP.
//!
//! A real server is bound on an ephemeral port and the client drives
//! the full handshake against it, so these exercise the codec, the
//! crypto, both state machines, and the connection manager together.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;

use mailrelay_transport::{
    Address, ClientConfig, DeliveredMessage, Delivery, Envelope, Error, HandshakeState,
    SendMachine, Server, ServerConfig, SessionKey, StaticKeyProvider, send_envelope,
};

const KEY_A: [u8; 32] = [0x11; 32];
const KEY_B: [u8; 32] = [0x77; 32];

/// Delivery double that records everything it receives.
#[derive(Clone)]
struct RecordingDelivery {
    received: Arc<Mutex<Vec<DeliveredMessage>>>,
}

impl RecordingDelivery {
    fn new() -> Self {
        Self {
            received: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn messages(&self) -> Vec<DeliveredMessage> {
        self.received.lock().unwrap().clone()
    }
}

impl Delivery for RecordingDelivery {
    async fn deliver(
        &self,
        message: DeliveredMessage,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.received.lock().unwrap().push(message);
        Ok(())
    }
}

fn envelope(subject: &str, body: &[u8]) -> Envelope {
    Envelope::new(
        Address::new("alice@mailbox.com").unwrap(),
        Address::new("bob@fastmail.com").unwrap(),
        subject.into(),
        body.to_vec(),
    )
}

/// Spawns a relay server with the given key; returns its port and the
/// delivery recorder.
async fn spawn_server(key: [u8; 32]) -> (u16, RecordingDelivery) {
    let delivery = RecordingDelivery::new();
    let keys = Arc::new(StaticKeyProvider::new(&key).unwrap());
    let config = ServerConfig::new("127.0.0.1", 0).read_timeout(Duration::from_secs(2));

    let server = Server::bind(&config, keys, delivery.clone()).await.unwrap();
    let port = server.local_addr().unwrap().port();
    tokio::spawn(server.run());

    (port, delivery)
}

fn client_config(port: u16) -> ClientConfig {
    ClientConfig::new("127.0.0.1", port)
        .connect_timeout(Duration::from_secs(2))
        .read_timeout(Duration::from_secs(2))
}

#[tokio::test]
async fn envelope_is_delivered_end_to_end() {
    let (port, delivery) = spawn_server(KEY_A).await;
    let keys = StaticKeyProvider::new(&KEY_A).unwrap();

    send_envelope(&client_config(port), &keys, envelope("greetings", b"hello bob"))
        .await
        .unwrap();

    let messages = delivery.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].from.as_str(), "alice@mailbox.com");
    assert_eq!(messages[0].to.as_str(), "bob@fastmail.com");
    assert_eq!(messages[0].subject, "greetings");
    assert_eq!(messages[0].body, b"hello bob");
}

#[tokio::test]
async fn concurrent_sessions_do_not_block_each_other() {
    let (port, delivery) = spawn_server(KEY_A).await;

    let mut handles = Vec::new();
    for i in 0..8 {
        let config = client_config(port);
        handles.push(tokio::spawn(async move {
            let keys = StaticKeyProvider::new(&KEY_A).unwrap();
            send_envelope(&config, &keys, envelope(&format!("msg {i}"), b"body")).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(delivery.messages().len(), 8);
}

#[tokio::test]
async fn mismatched_session_key_is_rejected() {
    let (port, delivery) = spawn_server(KEY_A).await;
    let keys = StaticKeyProvider::new(&KEY_B).unwrap();

    let err = send_envelope(&client_config(port), &keys, envelope("secret", b"payload"))
        .await
        .unwrap_err();

    // Server answers 550 to the undecryptable payload.
    assert!(matches!(
        err,
        Error::Protocol {
            state: HandshakeState::Payload,
            code: 550
        }
    ));
    assert!(delivery.messages().is_empty());
}

#[tokio::test]
async fn unexpected_reply_aborts_after_first_command() {
    // Hand-rolled peer: greets, then rejects MAIL FROM with 500.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        stream.write_all(b"220 ready\r\n").await.unwrap();
        let mut buf = [0u8; 256];
        use tokio::io::AsyncReadExt;
        let _ = stream.read(&mut buf).await.unwrap();
        stream.write_all(b"500 nope\r\n").await.unwrap();
    });

    let keys = StaticKeyProvider::new(&KEY_A).unwrap();
    let err = send_envelope(&client_config(port), &keys, envelope("s", b"b"))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Error::Protocol {
            state: HandshakeState::MailFrom,
            code: 500
        }
    ));
}

#[tokio::test]
async fn silent_server_times_out() {
    // Accepts and never greets.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(30)).await;
        drop(stream);
    });

    let config = ClientConfig::new("127.0.0.1", port)
        .connect_timeout(Duration::from_secs(2))
        .read_timeout(Duration::from_millis(200));
    let keys = StaticKeyProvider::new(&KEY_A).unwrap();

    let err = send_envelope(&config, &keys, envelope("s", b"b"))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Error::Timeout {
            state: HandshakeState::Greeting
        }
    ));
}

#[tokio::test]
async fn client_refuses_malformed_greeting() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        stream.write_all(b"HELLO THERE\r\n").await.unwrap();
    });

    let keys = StaticKeyProvider::new(&KEY_A).unwrap();
    let err = send_envelope(&client_config(port), &keys, envelope("s", b"b"))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Framing(_)));
}

#[tokio::test]
async fn state_machine_is_reusable_across_sessions() {
    // Two sequential envelopes over two connections: fresh machine,
    // fresh session, fresh IV each time.
    let (port, delivery) = spawn_server(KEY_A).await;
    let keys = StaticKeyProvider::new(&KEY_A).unwrap();

    send_envelope(&client_config(port), &keys, envelope("first", b"1"))
        .await
        .unwrap();
    send_envelope(&client_config(port), &keys, envelope("second", b"2"))
        .await
        .unwrap();

    let subjects: Vec<String> = delivery
        .messages()
        .into_iter()
        .map(|m| m.subject)
        .collect();
    assert_eq!(subjects.len(), 2);
    assert!(subjects.contains(&"first".to_string()));
    assert!(subjects.contains(&"second".to_string()));
}

#[tokio::test]
async fn machine_starts_in_greeting_state() {
    let machine = SendMachine::new(
        envelope("s", b"b"),
        SessionKey::from_bytes(KEY_A),
    );
    assert_eq!(machine.state(), HandshakeState::Greeting);
}
