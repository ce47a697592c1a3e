//! `/postman` WebSocket upgrade and per-connection read/write loop.
//!
//! Every inbound text frame is `<verb> <json-body>`, decoded by
//! [`Envelope`] and dispatched through [`router::dispatch`]. Outbound
//! frames are always `message <payload>`: the writer task owns the split
//! sink exclusively and applies that prefix uniformly, whether the
//! payload came from the Topic Registry's fan-out or from a direct reply
//! to the connection's own command.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, OriginalUri, State};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, info, warn};

use super::AppState;
use crate::network::connection::OutboundMessage;
use crate::protocol::{Envelope, ResultMessage};
use crate::router::{self, RouterContext};

pub async fn ws_upgrade_handler(
    State(state): State<AppState>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    uri: OriginalUri,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let token = uri
        .query()
        .and_then(|q| serde_urlencoded::from_str::<HashMap<String, String>>(q).ok())
        .and_then(|m| m.get("token").or_else(|| m.get("tkn")).cloned());

    ws.on_upgrade(move |socket| handle_socket(socket, remote, token, state))
}

async fn handle_socket(socket: WebSocket, remote: SocketAddr, token: Option<String>, state: AppState) {
    let connection_id = remote.to_string();
    let (mut sink, mut stream) = socket.split();

    if let Err(e) = state.admission.check_connect(&connection_id, token.as_deref()) {
        warn!(connection_id = %connection_id, error = %e, "websocket admission denied");
        let fail = serde_json::to_string(&ResultMessage::fail(e.to_string())).unwrap();
        let _ = sink.send(Message::Text(format!("message {fail}").into())).await;
        tokio::time::sleep(Duration::from_millis(1)).await;
        let _ = sink.close().await;
        return;
    }

    // A connection already registered under this address is displaced
    // (evict incumbent, accept newcomer); clear its topic memberships now
    // so the newcomer starts from a clean slate rather than inheriting
    // stale subscriptions under the shared identity key.
    if state.registry.get(&connection_id).is_some() {
        warn!(connection_id = %connection_id, "duplicate connection identity, evicting incumbent");
        state.topics.leave_all(&connection_id);
    }

    let (handle, mut rx) = state.registry.register(connection_id.clone(), &state.network_config.connection);
    info!(connection_id = %connection_id, "websocket connection admitted");

    let mut writer = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            match msg {
                OutboundMessage::Text(text) => {
                    if sink.send(Message::Text(format!("message {text}").into())).await.is_err() {
                        break;
                    }
                }
                OutboundMessage::Close(_reason) => {
                    let _ = sink.close().await;
                    break;
                }
            }
        }
    });

    loop {
        tokio::select! {
            frame = stream.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        let Some(envelope) = Envelope::parse(&text) else { continue };
                        let ctx = RouterContext {
                            topics: &state.topics,
                            connections: &state.registry,
                            admission: &state.admission,
                            kv: state.kv.as_deref(),
                            mask_ips: state.config.mask_ips,
                        };
                        if let Some(reply) = router::dispatch(&ctx, &connection_id, &envelope).await {
                            let _ = handle.try_send(OutboundMessage::Text(reply));
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!(connection_id = %connection_id, error = %e, "websocket read error");
                        break;
                    }
                }
            }
            _ = &mut writer => break,
        }
    }

    writer.abort();
    if state.registry.remove_if_current(&connection_id, &handle) {
        state.topics.leave_all(&connection_id);
    }
    info!(connection_id = %connection_id, "websocket connection closed");
}
