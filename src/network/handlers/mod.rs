//! HTTP and WebSocket handler definitions for the broker.
//!
//! Defines `AppState` (the shared state carried through axum extractors)
//! and re-exports all handler functions for convenient access when
//! building the router.

pub mod file;
pub mod health;
pub mod plugin;
pub mod publish;
pub mod status;
pub mod store;
pub mod websocket;

pub use file::file_handler;
pub use health::{health_handler, liveness_handler, readiness_handler};
pub use plugin::plugin_handler;
pub use publish::publish_handler;
pub use status::{status_handler, status_pp_handler};
pub use store::store_handler;
pub use websocket::ws_upgrade_handler;

use std::sync::Arc;
use std::time::Instant;

use crate::admission::AdmissionGate;
use crate::config::ServerConfig;
use crate::kv::KvStore;
use crate::network::{ConnectionRegistry, NetworkConfig, ShutdownController};
use crate::plugin::PluginManifest;
use crate::topic::TopicRegistry;

/// Shared application state passed to every axum handler via `State`
/// extraction. Cheap to clone -- every field is an `Arc` or a plain
/// `Copy`/small value.
#[derive(Clone)]
pub struct AppState {
    /// Registry of all active WebSocket connections.
    pub registry: Arc<ConnectionRegistry>,
    /// Topic membership and fan-out.
    pub topics: Arc<TopicRegistry>,
    /// Graceful shutdown controller with health state and in-flight tracking.
    pub shutdown: Arc<ShutdownController>,
    /// Transport configuration (bind address, CORS, timeouts).
    pub network_config: Arc<NetworkConfig>,
    /// Broker configuration (admission policy, feature toggles, paths).
    pub config: Arc<ServerConfig>,
    /// IP/token/safelist admission checks.
    pub admission: Arc<AdmissionGate>,
    /// The embedded key-value store, if `use_store_api` is enabled.
    pub kv: Option<Arc<dyn KvStore>>,
    /// The plugin manifest, if `use_plugin_api` is enabled.
    pub plugins: Option<Arc<PluginManifest>>,
    /// Server process start time, used for uptime calculation.
    pub start_time: Instant,
}

/// Decodes request parameters the way `/postman/*` endpoints accept them.
///
/// GET requests are expected to carry their parameters on the query
/// string; POST requests carry them in an `application/x-www-form-urlencoded`
/// body under a single field named `json`, whose value is itself a JSON
/// object. The decoder tries the query string first regardless of method
/// and only falls back to the posted `json` form field when the query
/// string is absent or fails to decode -- mirroring the original broker's
/// per-endpoint "try query params, else parse the posted `json` form
/// field" fallback.
pub fn parse_params<T: serde::de::DeserializeOwned>(
    method: &axum::http::Method,
    query: &str,
    body: &str,
) -> Option<T> {
    if !query.is_empty() {
        if let Ok(params) = serde_urlencoded::from_str(query) {
            return Some(params);
        }
    }
    if *method == axum::http::Method::GET {
        return None;
    }
    let form: std::collections::HashMap<String, String> = serde_urlencoded::from_str(body).ok()?;
    let json_str = form.get("json")?;
    serde_json::from_str(json_str).ok()
}
