//! `GET /postman/status` and `GET /postman/status_pp` -- channel/member
//! snapshot reporting.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, OriginalUri, State};
use axum::http::Method;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use super::parse_params;
use super::AppState;
use crate::protocol::ResultMessage;
use crate::status::build_status;

#[derive(Debug, Deserialize)]
struct StatusParams {
    #[serde(default, alias = "tkn")]
    token: Option<String>,
}

async fn handle(state: AppState, remote: SocketAddr, method: Method, uri: OriginalUri, body: String, pretty: bool) -> Response {
    if let Err(e) = state.admission.check_ip(&remote.to_string()) {
        return axum::Json(ResultMessage::fail(e.to_string())).into_response();
    }

    let query = uri.query().unwrap_or_default();
    let params: StatusParams = parse_params(&method, query, &body).unwrap_or(StatusParams { token: None });

    if let Err(e) = state.admission.check_token(params.token.as_deref()) {
        return axum::Json(ResultMessage::fail(e.to_string())).into_response();
    }

    let status = build_status(&state.topics, &state.registry, state.config.mask_ips);
    if pretty {
        let json = serde_json::to_string_pretty(&status).unwrap();
        ([(axum::http::header::CONTENT_TYPE, "application/json")], json).into_response()
    } else {
        axum::Json(status).into_response()
    }
}

pub async fn status_handler(
    State(state): State<AppState>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    method: Method,
    uri: OriginalUri,
    body: String,
) -> Response {
    handle(state, remote, method, uri, body, false).await
}

pub async fn status_pp_handler(
    State(state): State<AppState>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    method: Method,
    uri: OriginalUri,
    body: String,
) -> Response {
    handle(state, remote, method, uri, body, true).await
}

#[cfg(test)]
mod tests {
    use super::super::test_support::test_state;
    use super::*;

    fn addr() -> SocketAddr {
        "127.0.0.1:9999".parse().unwrap()
    }

    #[tokio::test]
    async fn status_reports_version() {
        let state = test_state();
        let uri: OriginalUri = OriginalUri("/postman/status".parse().unwrap());
        let resp = status_handler(State(state), ConnectInfo(addr()), Method::GET, uri, String::new()).await;
        assert_eq!(resp.into_response().status(), axum::http::StatusCode::OK);
    }

    #[tokio::test]
    async fn status_blocked_by_ip_allowlist() {
        let mut config = crate::config::ServerConfig::default();
        config.ip_allowlist = vec!["10.0.0.1".to_string()];
        let mut state = test_state();
        state.admission = std::sync::Arc::new(crate::admission::AdmissionGate::new(&config));

        let uri: OriginalUri = OriginalUri("/postman/status".parse().unwrap());
        let resp = status_handler(State(state), ConnectInfo(addr()), Method::GET, uri, String::new())
            .await
            .into_response();
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("remote ip blocked"));
    }
}
