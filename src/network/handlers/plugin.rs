//! `GET/POST /postman/plugin` -- runs a registered plugin and returns its
//! raw stdout, unwrapped (matching the original `PluginHandler`, which
//! does not box plugin output inside a result envelope).

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, OriginalUri, State};
use axum::http::Method;
use serde::Deserialize;

use super::parse_params;
use super::AppState;
use crate::error::PluginError;
use crate::plugin::exec_plugin;

#[derive(Debug, Deserialize)]
struct PluginParams {
    #[serde(alias = "cmd")]
    command: String,
    #[serde(default, alias = "tkn")]
    token: Option<String>,
}

pub async fn plugin_handler(
    State(state): State<AppState>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    method: Method,
    uri: OriginalUri,
    body: String,
) -> String {
    if let Err(e) = state.admission.check_ip(&remote.to_string()) {
        return e.to_string();
    }

    let query = uri.query().unwrap_or_default();
    let Some(params): Option<PluginParams> = parse_params(&method, query, &body) else {
        return "invalid plugin parameters".to_string();
    };

    if let Err(e) = state.admission.check_token(params.token.as_deref()) {
        return e.to_string();
    }

    let Some(manifest) = state.plugins.as_deref() else {
        return PluginError::Disabled.to_string();
    };

    let Some(entry) = manifest.plugins.get(&params.command) else {
        return PluginError::UnknownCommand(params.command).to_string();
    };

    match exec_plugin(&state.config.plugin_dir, entry).await {
        Ok(stdout) => stdout,
        Err(e) => e.to_string(),
    }
}
