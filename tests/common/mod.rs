// Each integration test file is a separate binary; helpers not used in every
// binary would otherwise trigger dead_code warnings from clippy.
#![allow(dead_code)]

use std::io::ErrorKind;
use std::time::Duration;

use postman::config::ServerConfig;
use postman::{NetworkConfig, NetworkModule};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Starts a real broker on an OS-assigned port and returns it once the
/// listener is bound. The server keeps running in a detached task for the
/// lifetime of the test process.
pub async fn spawn_broker(server_config: ServerConfig) -> u16 {
    let network_config = NetworkConfig {
        port: 0,
        ..NetworkConfig::default()
    };
    let mut module = NetworkModule::new(network_config, server_config);
    let port = module.start().await.expect("broker should bind an OS-assigned port");
    tokio::spawn(async move {
        let _ = module.serve(std::future::pending::<()>()).await;
    });
    port
}

/// Performs a plain HTTP/1.1 GET against the broker and returns
/// `(status_code, body)`. Sends `Connection: close` so the response can be
/// read to EOF without needing a real HTTP client dependency.
pub async fn http_get(port: u16, path: &str) -> (u16, String) {
    let mut stream = TcpStream::connect(("127.0.0.1", port))
        .await
        .expect("connect to broker");

    let request = format!(
        "GET {path} HTTP/1.1\r\nHost: 127.0.0.1:{port}\r\nConnection: close\r\n\r\n"
    );
    stream.write_all(request.as_bytes()).await.expect("write request");

    let mut raw = Vec::new();
    loop {
        let mut buf = [0u8; 4096];
        match stream.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => raw.extend_from_slice(&buf[..n]),
            Err(e) if e.kind() == ErrorKind::ConnectionReset => break,
            Err(e) => panic!("read response: {e}"),
        }
    }

    let text = String::from_utf8_lossy(&raw);
    let mut parts = text.splitn(2, "\r\n\r\n");
    let head = parts.next().unwrap_or_default();
    let body = parts.next().unwrap_or_default().to_string();

    let status = head
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|code| code.parse().ok())
        .unwrap_or(0);

    (status, body)
}

/// Gives a freshly spawned broker's listener task a moment to reach the
/// `Ready` health state before the first request lands.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(30)).await;
}
