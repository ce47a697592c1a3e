//! End-to-end scenarios against a real bound broker: WebSocket fan-out,
//! group publish, HTTP-to-WebSocket delivery, secure mode, and the IP
//! allowlist. Each test starts its own broker on an OS-assigned port so
//! they can run concurrently.

mod common;

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use postman::config::ServerConfig;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

async fn connect(port: u16) -> tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>> {
    let url = format!("ws://127.0.0.1:{port}/postman");
    let (stream, _) = connect_async(url).await.expect("websocket handshake should succeed");
    stream
}

async fn recv_text(
    stream: &mut tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
) -> String {
    loop {
        match timeout(Duration::from_secs(2), stream.next())
            .await
            .expect("should receive a frame before timing out")
            .expect("stream should not end")
            .expect("frame should not be a transport error")
        {
            Message::Text(text) => return text.to_string(),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}

// S1: a subscriber that joins "chat" receives a message a different
// connection publishes to "chat". Neither `subscribe` nor `publish` produce
// a reply frame of their own on the WebSocket path (router.rs `dispatch`
// only ever replies to `ping`/`status`/`store`).
#[tokio::test]
async fn s1_basic_fan_out() {
    let port = common::spawn_broker(ServerConfig::default()).await;
    common::settle().await;

    let mut subscriber = connect(port).await;
    subscriber
        .send(Message::Text(r#"subscribe {"ch":"chat"}"#.into()))
        .await
        .unwrap();
    common::settle().await;

    let mut publisher = connect(port).await;
    publisher
        .send(Message::Text(r#"publish {"ch":"chat","msg":"hello"}"#.into()))
        .await
        .unwrap();

    let delivered = recv_text(&mut subscriber).await;
    assert!(delivered.starts_with("message "));
    assert!(delivered.contains(r#""channel":"chat""#));
    assert!(delivered.contains(r#""message":"hello""#));
}

// S2: publishing to "room/*" reaches every subscriber of a "room/<n>"
// subtopic, but not a connection subscribed to "room" itself.
#[tokio::test]
async fn s2_group_publish_excludes_exact_prefix() {
    let port = common::spawn_broker(ServerConfig::default()).await;
    common::settle().await;

    let mut room1 = connect(port).await;
    room1.send(Message::Text(r#"subscribe {"ch":"room/1"}"#.into())).await.unwrap();

    let mut room_exact = connect(port).await;
    room_exact.send(Message::Text(r#"subscribe {"ch":"room"}"#.into())).await.unwrap();

    // Give both subscriptions a moment to land before the group publish.
    common::settle().await;

    let mut publisher = connect(port).await;
    publisher
        .send(Message::Text(r#"publish {"ch":"room/*","msg":"ping"}"#.into()))
        .await
        .unwrap();

    let delivered = recv_text(&mut room1).await;
    assert!(delivered.contains(r#""message":"ping""#));

    // The exact-prefix subscriber must not receive the group publish.
    let got_nothing = timeout(Duration::from_millis(200), room_exact.next()).await;
    assert!(got_nothing.is_err(), "room subscriber should not receive a room/* group publish");
}

// S3: an HTTP GET to /postman/publish delivers to a WebSocket subscriber of
// the same channel.
#[tokio::test]
async fn s3_http_publish_delivers_to_websocket_subscriber() {
    let port = common::spawn_broker(ServerConfig::default()).await;
    common::settle().await;

    let mut subscriber = connect(port).await;
    subscriber.send(Message::Text(r#"subscribe {"ch":"alerts"}"#.into())).await.unwrap();
    common::settle().await;

    let (status, body) = common::http_get(port, "/postman/publish?ch=alerts&msg=fire").await;
    assert_eq!(status, 200);
    assert!(body.contains(r#""result":"success""#));

    let delivered = recv_text(&mut subscriber).await;
    assert!(delivered.contains(r#""channel":"alerts""#));
    assert!(delivered.contains(r#""message":"fire""#));
}

// S4: in secure mode, an upgrade without a valid token is refused and the
// connection is closed; a request carrying a freshly generated token for
// the broker's own host key succeeds.
#[tokio::test]
async fn s4_secure_mode_rejects_missing_token() {
    let mut config = ServerConfig::default();
    config.secure_mode = true;
    config.secret = "s3cr3t".to_string();
    config.host_key = "host-under-test".to_string();
    let port = common::spawn_broker(config.clone()).await;
    common::settle().await;

    let mut unauthenticated = connect(port).await;
    let reply = recv_text(&mut unauthenticated).await;
    assert!(reply.contains(r#""result":"fail""#));
    assert!(unauthenticated.next().await.is_none(), "server should close the socket after the failure frame");

    let token = postman::auth::generate_token(&config.secret, &config.host_key).unwrap();
    let url = format!("ws://127.0.0.1:{port}/postman?tkn={token}");
    let (mut authenticated, _) = connect_async(url).await.expect("authenticated upgrade should succeed");
    authenticated
        .send(Message::Text("ping {}".into()))
        .await
        .unwrap();
    assert_eq!(recv_text(&mut authenticated).await, "message pong");
}

// S5: an IP allowlist that doesn't include the loopback test address blocks
// both the WebSocket upgrade and the HTTP publish endpoint.
#[tokio::test]
async fn s5_ip_allowlist_blocks_unlisted_address() {
    let mut config = ServerConfig::default();
    config.ip_allowlist = vec!["192.0.2.1".to_string()];
    let port = common::spawn_broker(config).await;
    common::settle().await;

    let mut client = connect(port).await;
    let reply = recv_text(&mut client).await;
    assert!(reply.contains("remote ip blocked"));

    let (status, body) = common::http_get(port, "/postman/publish?ch=chat&msg=hi").await;
    assert_eq!(status, 200);
    assert!(body.contains("remote ip blocked"));
}

// S6: the status report lists a channel a connection joined with a labeled
// client_info, keyed by channel name.
#[tokio::test]
async fn s6_status_reports_labeled_member() {
    let port = common::spawn_broker(ServerConfig::default()).await;
    common::settle().await;

    let mut member = connect(port).await;
    member
        .send(Message::Text(r#"subscribe {"ch":"lobby","ci":"alice"}"#.into()))
        .await
        .unwrap();
    common::settle().await;

    let (status, body) = common::http_get(port, "/postman/status").await;
    assert_eq!(status, 200);
    assert!(body.contains("\"lobby\""));
    assert!(body.contains("alice"));
    assert!(body.contains("\"version\""));
}
