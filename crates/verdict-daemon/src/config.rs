//! Daemon configuration.

use std::path::Path;

use anyhow::Context as _;
use serde::{Deserialize, Serialize};

fn default_listen() -> String {
    "127.0.0.1:5555".to_string()
}

const fn default_max_frame_size() -> usize {
    1024 * 1024
}

const fn default_max_response_size() -> usize {
    8192
}

/// Daemon configuration, loadable from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Address the decision service listens on.
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Maximum accepted stream frame size in bytes.
    #[serde(default = "default_max_frame_size")]
    pub max_frame_size: usize,

    /// Buffer size responses are marshaled into; larger responses fall
    /// back to the codec's fixed statuses.
    #[serde(default = "default_max_response_size")]
    pub max_response_size: usize,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            max_frame_size: default_max_frame_size(),
            max_response_size: default_max_response_size(),
        }
    }
}

impl DaemonConfig {
    /// Loads the configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("failed to parse config {}", path.display()))
    }
}
