//! `GET/POST /postman/store` -- HTTP access to the embedded key-value
//! store.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, OriginalUri, State};
use axum::http::Method;
use serde::Deserialize;
use serde_json::json;

use super::parse_params;
use super::AppState;
use crate::error::KvError;
use crate::kv;

#[derive(Debug, Deserialize)]
struct StoreParams {
    /// The only field that gates the query-vs-form fallback in
    /// `parse_params` (spec: "falls back to form when the query lacks
    /// the primary identifier") -- `key` and `value` below default to
    /// empty so a GET supplying only `command` still parses from the
    /// query string.
    #[serde(alias = "cmd")]
    command: String,
    #[serde(default)]
    key: String,
    #[serde(default, alias = "val")]
    value: Option<String>,
    #[serde(default, alias = "tkn")]
    token: Option<String>,
}

pub async fn store_handler(
    State(state): State<AppState>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    method: Method,
    uri: OriginalUri,
    body: String,
) -> axum::Json<serde_json::Value> {
    if let Err(e) = state.admission.check_ip(&remote.to_string()) {
        return axum::Json(json!({ "result": "fail", "error": e.to_string() }));
    }

    let query = uri.query().unwrap_or_default();
    let Some(params): Option<StoreParams> = parse_params(&method, query, &body) else {
        return axum::Json(json!({ "result": "fail", "error": "invalid store parameters" }));
    };

    if let Err(e) = state.admission.check_token(params.token.as_deref()) {
        return axum::Json(json!({ "result": "fail", "error": e.to_string() }));
    }

    let Some(store) = state.kv.as_deref() else {
        return axum::Json(json!({ "result": "fail", "error": KvError::Disabled.to_string() }));
    };

    match kv::dispatch(store, &params.command, &params.key, params.value.as_deref()) {
        Ok(kv::KvOutcome::Value(value)) => axum::Json(json!({ "result": value })),
        Ok(kv::KvOutcome::Missing) => axum::Json(json!({ "result": "" })),
        Ok(kv::KvOutcome::Done) => axum::Json(json!({ "result": "success" })),
        Err(e) => axum::Json(json!({ "result": "fail", "error": e.to_string() })),
    }
}
