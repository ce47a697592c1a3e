//! Plugin manifest management and subprocess execution for
//! `/postman/plugin`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::process::Command;

use crate::error::PluginError;

/// One entry in `plugin.json`: the executable (and any fixed arguments)
/// invoked when a client sends the matching command name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginEntry {
    pub path: String,
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PluginManifest {
    #[serde(rename = "plugins")]
    pub plugins: BTreeMap<String, PluginEntry>,
}

impl PluginManifest {
    /// Loads `plugin.json` from `dir`, creating both the directory and a
    /// manifest stub (an `"example"` entry, matching the original
    /// broker's `NewEmptyPluginsData`) if they don't yet exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created, the manifest
    /// file cannot be read/written, or its contents are not valid JSON.
    pub async fn load_or_init(dir: &Path) -> Result<Self, PluginError> {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| PluginError::ManifestLoad(e.to_string()))?;

        let manifest_path = dir.join("plugin.json");
        match tokio::fs::read_to_string(&manifest_path).await {
            Ok(contents) => serde_json::from_str(&contents).map_err(|e| PluginError::ManifestLoad(e.to_string())),
            Err(_) => {
                let mut plugins = BTreeMap::new();
                plugins.insert(
                    "example".to_string(),
                    PluginEntry { path: "echo".to_string(), args: vec!["hello from postman".to_string()] },
                );
                let manifest = Self { plugins };
                let json = serde_json::to_string_pretty(&manifest).map_err(|e| PluginError::ManifestLoad(e.to_string()))?;
                tokio::fs::write(&manifest_path, json)
                    .await
                    .map_err(|e| PluginError::ManifestLoad(e.to_string()))?;
                Ok(manifest)
            }
        }
    }

    #[must_use]
    pub fn get(&self, command: &str) -> Option<&PluginEntry> {
        self.plugins.get(command)
    }
}

/// Executes `entry` as a subprocess rooted at `plugin_dir`, returning its
/// captured stdout verbatim (the original broker's `ExecPlugin` writes
/// the raw process output directly to the HTTP response, unwrapped by a
/// `ResultMessage`).
///
/// # Errors
///
/// Returns `PluginError::ExecFailed` if the process cannot be spawned or
/// exits with a non-zero status.
pub async fn exec_plugin(plugin_dir: &Path, entry: &PluginEntry) -> Result<String, PluginError> {
    let program: PathBuf = plugin_dir.join(&entry.path);
    let output = Command::new(&program)
        .args(&entry.args)
        .current_dir(plugin_dir)
        .output()
        .await
        .map_err(|e| PluginError::ExecFailed(e.to_string()))?;

    if !output.status.success() {
        return Err(PluginError::ExecFailed(format!(
            "exit status {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr)
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}
