//! Relay configuration, loaded from YAML.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use tracing::debug;
use tracing::warn;

use crate::fix::PlatformCaps;

#[derive(Debug)]
pub enum Error {
    Io { path: String, source: std::io::Error },
    Parse { path: String, source: serde_yaml::Error },
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => write!(f, "failed to read config {}: {}", path, source),
            Self::Parse { path, source } => write!(f, "failed to parse config {}: {}", path, source),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse { source, .. } => Some(source),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Coordinator and channel settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Name of the channel between host and worker.
    pub channel_name: String,

    /// Method the worker calls once it can receive fixes.
    pub ready_method: String,

    /// Method the host calls for every delivered fix.
    pub update_method: String,

    /// How long a dispatch waits for the worker's reply before logging a timeout.
    pub call_timeout_secs: u64,

    /// Thread name of the designated executor.
    pub executor_name: String,

    /// Accuracy dimensions the platform can report.
    pub platform: PlatformCaps,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            channel_name: "fixrelay/background".to_string(),
            ready_method: "initialized".to_string(),
            update_method: "onLocationUpdate".to_string(),
            call_timeout_secs: 30,
            executor_name: "fixrelay-main".to_string(),
            platform: PlatformCaps::default(),
        }
    }
}

impl RelayConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    /// Loads configuration from a YAML file. Missing keys take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let shown = path.display().to_string();
        let text = std::fs::read_to_string(path).map_err(|source| Error::Io { path: shown.clone(), source })?;
        let config = serde_yaml::from_str(&text).map_err(|source| Error::Parse { path: shown.clone(), source })?;
        debug!(path = %shown, "loaded relay config");
        Ok(config)
    }

    /// Loads `path` when given, falling back to defaults when it is absent or unreadable.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %e, "using default relay config");
                Self::default()
            }
        }
    }
}
