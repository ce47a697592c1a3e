//! Command-line flags, translated from the original broker's `go-flags`
//! `Options` struct into a `clap` derive.

use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "postman", version = crate::config::VERSION, about = "Lightweight pub/sub WebSocket and HTTP message broker")]
pub struct Options {
    /// Listen port number.
    #[arg(short = 'p', long = "port", default_value_t = 8800)]
    pub port: u16,

    /// Output log location. Console-only when unset.
    #[arg(short = 'l', long = "log")]
    pub log_dir: Option<std::path::PathBuf>,

    /// Safelist for channels, comma-separated.
    #[arg(short = 'c', long = "chlist", default_value = "")]
    pub channels: String,

    /// Connectable ip_address list, comma-separated.
    #[arg(short = 'i', long = "iplist", default_value = "")]
    pub ip_addresses: String,

    /// Enable key-value store api.
    #[arg(short = 'k', long = "store")]
    pub use_store_api: bool,

    /// Enable file server api.
    #[arg(short = 'f', long = "file")]
    pub use_file_api: bool,

    /// Enable plugin api.
    #[arg(short = 'u', long = "plugin")]
    pub use_plugin_api: bool,

    /// Secure mode: require a valid token on every connection/request.
    #[arg(short = 's', long = "secure")]
    pub secure_mode: bool,

    /// Generate a token from the environment variable [SECRET] and exit.
    #[arg(short = 'g', long = "generate")]
    pub gen_token: bool,

    /// Run in PaaS mode: PORT/CHLIST/IPLIST environment variables override
    /// the corresponding flags above, and the store/file/plugin APIs are
    /// force-disabled. Replaces the original's compile-time `TARGET_PAAS`
    /// constant with a runtime flag.
    #[arg(long = "paas", env = "POSTMAN_PAAS")]
    pub paas_mode: bool,
}

/// Splits a comma-separated list the way the original broker does:
/// trims nothing, simply discards empty entries produced by leading,
/// trailing, or doubled commas.
#[must_use]
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',').filter(|s| !s.is_empty()).map(str::to_string).collect()
}
