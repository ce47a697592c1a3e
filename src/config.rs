//! Broker-level configuration: admission policy, feature toggles, and
//! on-disk paths. Kept separate from [`crate::network::NetworkConfig`],
//! which covers transport concerns (bind address, CORS, timeouts).

use std::path::PathBuf;

pub const VERSION: &str = "1.3.6";
pub const DB_FILE: &str = "postman.db";
pub const SERVE_FILES_DIR: &str = "serve_files";
pub const PLUGIN_DIR: &str = "plugin";
pub const PLUGIN_JSON: &str = "plugin.json";

pub const ENV_SECRET: &str = "SECRET";
pub const ENV_PORT: &str = "PORT";
pub const ENV_CHLIST: &str = "CHLIST";
pub const ENV_IPLIST: &str = "IPLIST";

/// Broker-wide configuration assembled from CLI flags and (optionally)
/// PaaS environment-variable overrides.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// IPv4 literals that must each appear as a substring of the remote
    /// address for a connection/request to be admitted. Empty means "allow
    /// any address".
    pub ip_allowlist: Vec<String>,
    /// Channel name allowlist for `subscribe`/`publish`. Empty means "allow
    /// any channel name".
    pub channel_safelist: Vec<String>,
    /// When true, every admission (WebSocket upgrade and every HTTP
    /// endpoint) requires a valid token in addition to the IP check.
    pub secure_mode: bool,
    /// HS256 signing secret. Required when `secure_mode` is true.
    pub secret: String,
    /// Host identifier embedded in and checked against token claims.
    pub host_key: String,
    /// Enables the `/postman/store` endpoint and its backing KV store.
    pub use_store_api: bool,
    /// Enables the `/postman/file/*path` endpoint.
    pub use_file_api: bool,
    /// Enables the `/postman/plugin` endpoint.
    pub use_plugin_api: bool,
    /// When true, `PORT`/`CHLIST`/`IPLIST` environment variables override
    /// the corresponding CLI flags (replaces the original's compile-time
    /// `TARGET_PAAS` flag with a runtime knob).
    pub paas_mode: bool,
    /// When true, the status reporter masks member identity as `conn_N`
    /// instead of `label@ip:port` (replaces the original's compile-time
    /// masking flag with a runtime knob).
    pub mask_ips: bool,
    /// Directory the key-value store's database file lives in.
    pub db_path: PathBuf,
    /// Directory served by the file API.
    pub serve_files_dir: PathBuf,
    /// Directory holding the plugin manifest and any plugin executables.
    pub plugin_dir: PathBuf,
    /// Directory log output is written to, if any (console-only otherwise).
    pub log_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            ip_allowlist: Vec::new(),
            channel_safelist: Vec::new(),
            secure_mode: false,
            secret: String::new(),
            host_key: String::new(),
            use_store_api: false,
            use_file_api: false,
            use_plugin_api: false,
            paas_mode: false,
            mask_ips: false,
            db_path: PathBuf::from(DB_FILE),
            serve_files_dir: PathBuf::from(SERVE_FILES_DIR),
            plugin_dir: PathBuf::from(PLUGIN_DIR),
            log_dir: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_all_apis_disabled() {
        let config = ServerConfig::default();
        assert!(!config.use_store_api);
        assert!(!config.use_file_api);
        assert!(!config.use_plugin_api);
        assert!(!config.secure_mode);
        assert!(config.ip_allowlist.is_empty());
        assert!(config.channel_safelist.is_empty());
    }

    #[test]
    fn default_paths_match_constants() {
        let config = ServerConfig::default();
        assert_eq!(config.db_path, PathBuf::from(DB_FILE));
        assert_eq!(config.serve_files_dir, PathBuf::from(SERVE_FILES_DIR));
        assert_eq!(config.plugin_dir, PathBuf::from(PLUGIN_DIR));
    }
}
