//! Domain error types for the broker's admission, storage, and plugin paths.

use thiserror::Error;

/// Failure reasons from the admission pipeline (IP, token, safelist checks).
///
/// Each variant's message is the exact string placed into a `ResultMessage`
/// error field, so wording changes here are wire-visible.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionError {
    #[error("remote ip blocked")]
    IpBlocked,
    #[error("security error")]
    SecureCheckFailed,
    #[error("channel is not allowed")]
    ChannelNotAllowed,
}

/// Failures from the embedded key-value store.
#[derive(Debug, Error)]
pub enum KvError {
    #[error("key-value store api is disable")]
    Disabled,
    #[error("key not found")]
    NotFound,
    #[error("unknown store command: {0}")]
    UnknownCommand(String),
    #[error("store backend error: {0}")]
    Backend(String),
}

/// Failures from the plugin execution endpoint.
#[derive(Debug, Error)]
pub enum PluginError {
    #[error("plugin api is disable")]
    Disabled,
    #[error("unknown plugin command: {0}")]
    UnknownCommand(String),
    #[error("plugin execution failed: {0}")]
    ExecFailed(String),
    #[error("failed to load plugin manifest: {0}")]
    ManifestLoad(String),
}

/// Failures from the file-serving endpoint.
#[derive(Debug, Error)]
pub enum FileServeError {
    #[error("file api is disable")]
    Disabled,
    #[error("file not found")]
    NotFound,
    #[error("invalid file path")]
    InvalidPath,
    #[error("upload failed: {0}")]
    UploadFailed(String),
}
