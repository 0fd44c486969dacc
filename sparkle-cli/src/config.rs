use std::path::{Path, PathBuf};

use serde::Deserialize;
use sparkle_engine::{ClusterRegistry, EngineConfig};
use tracing::debug;

use crate::error::{AppError, Result};

/// Contents of `config.toml`.
///
/// ```toml
/// [engine]
/// start_poll_interval = 2000
///
/// [clusters.demo]
/// connection_url = "https://demo.azurehdinsight.net"
/// auth = { username = "admin", password = "secret" }
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub engine: EngineConfig,
    pub clusters: ClusterRegistry,
}

/// `<config dir>/sparkle/config.toml`, e.g. `~/.config/sparkle/config.toml` on Linux.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join(".config")))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("sparkle")
        .join("config.toml")
}

impl AppConfig {
    /// Load from `path`, or from the default location when `None`.
    ///
    /// A missing default file yields an empty configuration; a missing
    /// explicit file is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, explicit) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => (default_config_path(), false),
        };

        if !path.exists() {
            if explicit {
                return Err(AppError::ConfigNotFound(path));
            }
            debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(&path)?;
        let config = Self::parse(&contents).map_err(|source| AppError::ConfigParse {
            path: path.clone(),
            source,
        })?;
        debug!(path = %path.display(), clusters = config.clusters.names().count(), "Loaded config");
        Ok(config)
    }

    fn parse(contents: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }
}
