//! Network module with deferred startup lifecycle.
//!
//! Implements the deferred startup pattern: `new()` creates resources,
//! `start()` binds the TCP listener, and `serve()` starts accepting
//! connections. This separation allows the rest of the application to
//! configure shared state (the KV store, the plugin manifest) between
//! `start()` and `serve()`.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::routing::{any, get};
use axum::Router;
use tokio::net::TcpListener;
use tracing::{info, warn};

use super::config::NetworkConfig;
use super::connection::{ConnectionRegistry, OutboundMessage};
use super::handlers::{
    file_handler, health_handler, liveness_handler, plugin_handler, publish_handler,
    readiness_handler, status_handler, status_pp_handler, store_handler, ws_upgrade_handler,
    AppState,
};
use super::middleware::build_http_layers;
use super::shutdown::ShutdownController;
use crate::admission::AdmissionGate;
use crate::config::ServerConfig;
use crate::kv::KvStore;
use crate::plugin::PluginManifest;
use crate::topic::TopicRegistry;

/// Manages the full HTTP/WebSocket server lifecycle.
///
/// Follows the deferred startup pattern:
/// 1. `new()` -- allocates shared state (registries, shutdown controller)
/// 2. `start()` -- binds TCP listener to the configured address
/// 3. `serve()` -- begins accepting connections until shutdown is signalled
pub struct NetworkModule {
    network_config: NetworkConfig,
    config: Arc<ServerConfig>,
    listener: Option<TcpListener>,
    registry: Arc<ConnectionRegistry>,
    topics: Arc<TopicRegistry>,
    shutdown: Arc<ShutdownController>,
    admission: Arc<AdmissionGate>,
    kv: Option<Arc<dyn KvStore>>,
    plugins: Option<Arc<PluginManifest>>,
}

impl NetworkModule {
    /// Creates a new network module without binding any port.
    #[must_use]
    pub fn new(network_config: NetworkConfig, config: ServerConfig) -> Self {
        let admission = Arc::new(AdmissionGate::new(&config));
        Self {
            network_config,
            config: Arc::new(config),
            listener: None,
            registry: Arc::new(ConnectionRegistry::new()),
            topics: Arc::new(TopicRegistry::new()),
            shutdown: Arc::new(ShutdownController::new()),
            admission,
            kv: None,
            plugins: None,
        }
    }

    /// Attaches the embedded key-value store, enabling `/postman/store`
    /// and the WebSocket `store` command.
    #[must_use]
    pub fn with_kv_store(mut self, store: Arc<dyn KvStore>) -> Self {
        self.kv = Some(store);
        self
    }

    /// Attaches the plugin manifest, enabling `/postman/plugin`.
    #[must_use]
    pub fn with_plugins(mut self, manifest: Arc<PluginManifest>) -> Self {
        self.plugins = Some(manifest);
        self
    }

    /// Returns a shared reference to the connection registry.
    #[must_use]
    pub fn registry(&self) -> Arc<ConnectionRegistry> {
        Arc::clone(&self.registry)
    }

    /// Returns a shared reference to the topic registry.
    #[must_use]
    pub fn topics(&self) -> Arc<TopicRegistry> {
        Arc::clone(&self.topics)
    }

    /// Returns a shared reference to the shutdown controller.
    #[must_use]
    pub fn shutdown_controller(&self) -> Arc<ShutdownController> {
        Arc::clone(&self.shutdown)
    }

    fn app_state(&self) -> AppState {
        AppState {
            registry: Arc::clone(&self.registry),
            topics: Arc::clone(&self.topics),
            shutdown: Arc::clone(&self.shutdown),
            network_config: Arc::new(self.network_config.clone()),
            config: Arc::clone(&self.config),
            admission: Arc::clone(&self.admission),
            kv: self.kv.clone(),
            plugins: self.plugins.clone(),
            start_time: Instant::now(),
        }
    }

    /// Assembles the axum router with every `/postman` route plus the
    /// ambient `/health*` probes.
    ///
    /// Routes:
    /// - `GET /postman` -- WebSocket upgrade
    /// - `GET|POST /postman/publish` -- HTTP publish, shares the WS fan-out
    /// - `GET /postman/status`, `GET /postman/status_pp`
    /// - `GET|POST /postman/store` -- embedded key-value store
    /// - `GET|POST /postman/file/{*path}` -- static file serving / upload
    /// - `GET|POST /postman/plugin` -- named external command execution
    /// - `GET /health`, `GET /health/live`, `GET /health/ready`
    #[must_use]
    pub fn build_router(&self) -> Router {
        let state = self.app_state();
        let layers = build_http_layers(&self.network_config);

        Router::new()
            .route("/health", get(health_handler))
            .route("/health/live", get(liveness_handler))
            .route("/health/ready", get(readiness_handler))
            .route("/postman", get(ws_upgrade_handler))
            .route("/postman/publish", any(publish_handler))
            .route("/postman/status", get(status_handler))
            .route("/postman/status_pp", get(status_pp_handler))
            .route("/postman/store", any(store_handler))
            .route("/postman/file/{*path}", any(file_handler))
            .route("/postman/plugin", any(plugin_handler))
            .layer(layers)
            .with_state(state)
    }

    /// Binds the TCP listener to the configured host and port.
    ///
    /// Returns the actual bound port, which may differ from the configured
    /// port when port 0 is used (OS-assigned ephemeral port).
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound (e.g. port in use).
    pub async fn start(&mut self) -> anyhow::Result<u16> {
        let addr = format!("{}:{}", self.network_config.host, self.network_config.port);
        let listener = TcpListener::bind(&addr).await?;
        let port = listener.local_addr()?.port();

        info!("TCP listener bound to {}:{}", self.network_config.host, port);

        self.listener = Some(listener);
        Ok(port)
    }

    /// Starts serving connections until the shutdown signal fires.
    ///
    /// Consumes `self` because the listener is moved into the server.
    ///
    /// After the shutdown signal:
    /// 1. Health state transitions to Draining
    /// 2. All connections receive a Close frame
    /// 3. Waits up to 30 seconds for in-flight requests to complete
    /// 4. Health state transitions to Stopped
    ///
    /// # Errors
    ///
    /// Returns an error if the server encounters a fatal I/O error.
    ///
    /// # Panics
    ///
    /// Panics if `start()` was not called before `serve()`.
    pub async fn serve(
        self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        let listener = self
            .listener
            .expect("start() must be called before serve()");
        let registry = Arc::clone(&self.registry);
        let shutdown_ctrl = Arc::clone(&self.shutdown);

        let router = self.build_router();

        shutdown_ctrl.set_ready();

        info!("Serving Postman broker connections");

        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<std::net::SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown)
        .await?;

        drain_connections(registry, shutdown_ctrl).await;
        Ok(())
    }
}

/// Drains all connections and transitions to Stopped state.
///
/// Sends a Close frame to every active connection, then waits for
/// in-flight requests to complete (up to 30 seconds).
async fn drain_connections(
    registry: Arc<ConnectionRegistry>,
    shutdown_ctrl: Arc<ShutdownController>,
) {
    shutdown_ctrl.trigger_shutdown();

    let handles = registry.drain_all();
    let count = handles.len();
    if count > 0 {
        info!("Draining {} connections", count);
        for handle in &handles {
            let _ = handle.try_send(OutboundMessage::Close(Some(
                "server shutting down".to_string(),
            )));
        }
    }

    let drained = shutdown_ctrl.wait_for_drain(Duration::from_secs(30)).await;
    if drained {
        info!("All connections drained successfully");
    } else {
        warn!("Drain timeout expired with in-flight requests remaining");
    }
}
