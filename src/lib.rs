//! Postman -- a lightweight pub/sub WebSocket and HTTP message broker.

pub mod admission;
pub mod auth;
pub mod cli;
pub mod config;
pub mod error;
pub mod kv;
pub mod network;
pub mod plugin;
pub mod protocol;
pub mod router;
pub mod status;
pub mod topic;

pub use config::ServerConfig;
pub use network::{NetworkConfig, NetworkModule};
