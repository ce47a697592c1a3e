//! `POST/GET /postman/publish` -- HTTP-side publish, sharing the same
//! Topic Registry fan-out the WebSocket `publish` command uses.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, OriginalUri, State};
use axum::http::Method;
use serde::Deserialize;

use super::parse_params;
use super::AppState;
use crate::network::connection::OutboundMessage;
use crate::protocol::{PublishSendMessage, ResultMessage};

#[derive(Debug, Deserialize)]
struct PublishParams {
    /// The only field that gates the query-vs-form fallback in
    /// `parse_params` -- every other field below defaults to empty so a
    /// GET that supplies `channel` alone still parses from the query
    /// string instead of falling through to the POST form branch.
    #[serde(alias = "ch")]
    channel: String,
    #[serde(default, alias = "msg")]
    message: String,
    #[serde(default)]
    tag: Option<String>,
    #[serde(default, alias = "ext")]
    extention: Option<String>,
    #[serde(default, alias = "tkn")]
    token: Option<String>,
}

pub async fn publish_handler(
    State(state): State<AppState>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    method: Method,
    uri: OriginalUri,
    body: String,
) -> axum::Json<ResultMessage> {
    if let Err(e) = state.admission.check_ip(&remote.to_string()) {
        return axum::Json(ResultMessage::fail(e.to_string()));
    }

    let query = uri.query().unwrap_or_default();
    let Some(params): Option<PublishParams> = parse_params(&method, query, &body) else {
        return axum::Json(ResultMessage::fail("invalid publish parameters"));
    };

    if let Err(e) = state.admission.check_token(params.token.as_deref()) {
        return axum::Json(ResultMessage::fail(e.to_string()));
    }

    if params.channel.is_empty() {
        return axum::Json(ResultMessage::fail("publish channel is empty"));
    }

    // The channel safelist only gates `subscribe`, not `publish` -- see
    // the WebSocket router's `handle_publish` for the same omission.
    // client_info is intentionally not accepted here -- HTTP publish never
    // forwards a label into the delivered payload.
    let payload = PublishSendMessage::new(params.channel.clone(), params.message, params.tag, params.extention);
    let text = serde_json::to_string(&payload).unwrap();

    let members = if let Some(group_prefix) = params.channel.strip_suffix("/*") {
        state.topics.group_members(group_prefix)
    } else {
        state.topics.members(&params.channel)
    };

    for member_id in members {
        if let Some(handle) = state.registry.get(&member_id) {
            let _ = handle.try_send(OutboundMessage::Text(text.clone()));
        }
    }

    axum::Json(ResultMessage::success())
}

#[cfg(test)]
mod tests {
    use super::super::test_support::test_state;
    use super::*;
    use crate::network::config::ConnectionConfig;

    fn addr() -> SocketAddr {
        "127.0.0.1:9999".parse().unwrap()
    }

    #[tokio::test]
    async fn publish_via_get_delivers_to_subscriber() {
        let state = test_state();
        state.registry.register("1.2.3.4:1".to_string(), &ConnectionConfig::default());
        state.topics.join("chat", "1.2.3.4:1");

        let uri: OriginalUri = OriginalUri("/postman/publish?channel=chat&message=hi".parse().unwrap());
        let resp = publish_handler(
            State(state.clone()),
            ConnectInfo(addr()),
            Method::GET,
            uri,
            String::new(),
        )
        .await;
        assert_eq!(resp.0.result, "success");

        let handle = state.registry.get("1.2.3.4:1").unwrap();
        assert!(handle.tx.capacity() < ConnectionConfig::default().outbound_channel_capacity);
    }

    #[tokio::test]
    async fn publish_with_empty_channel_fails() {
        let state = test_state();
        let uri: OriginalUri = OriginalUri("/postman/publish?channel=&message=hi".parse().unwrap());
        let resp = publish_handler(State(state), ConnectInfo(addr()), Method::GET, uri, String::new()).await;
        assert_eq!(resp.0.result, "fail");
        assert_eq!(resp.0.error, "publish channel is empty");
    }
}
