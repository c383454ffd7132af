//! Fake coordinator helpers shared by integration tests.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]
#![allow(dead_code)]

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use pathlink_core::protocol::Envelope;

pub const STEP: Duration = Duration::from_secs(5);

pub async fn listener() -> (TcpListener, u16) {
    let l = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = l.local_addr().unwrap().port();
    (l, port)
}

/// Read exactly one length-prefixed envelope.
pub async fn read_envelope(s: &mut TcpStream) -> Envelope {
    let mut len = [0u8; 4];
    tokio::time::timeout(STEP, s.read_exact(&mut len))
        .await
        .expect("timed out waiting for frame header")
        .unwrap();
    let mut body = vec![0u8; u32::from_be_bytes(len) as usize];
    s.read_exact(&mut body).await.unwrap();
    Envelope::decode(&body).unwrap()
}

pub async fn write_envelope(s: &mut TcpStream, env: &Envelope) {
    s.write_all(&env.to_frame().unwrap()).await.unwrap();
}

pub fn config_yaml(port: u16) -> String {
    config_yaml_with(port, "")
}

/// `client_extra` is spliced into the `client:` section (2-space indented).
pub fn config_yaml_with(port: u16, client_extra: &str) -> String {
    format!(
        r#"
version: 1
coordinator:
  host: "127.0.0.1"
  port: {port}
client:
  id: "c1"
  paths: ["/a", "/b"]
{client_extra}
session:
  heartbeat_interval_ms: 100
"#
    )
}
