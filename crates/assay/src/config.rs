//! Application Configuration
//!
//! Read from `assay.toml`. Every section and key is optional:
//!
//! ```toml
//! [plugins]
//! directory = "modules"
//!
//! [bridge]
//! workers = 2
//!
//! [logging]
//! filter = "assay=debug"
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use assay_runtime::BridgeConfig;

/// Default configuration file name
pub const CONFIG_FILE: &str = "assay.toml";

/// Filter used when neither `RUST_LOG` nor `[logging] filter` is set
pub const DEFAULT_LOG_FILTER: &str = "assay=info";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Top-level configuration (assay.toml)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssayConfig {
    pub plugins: PluginsConfig,
    pub bridge: BridgeConfig,
    pub logging: LoggingConfig,
}

/// Plugin location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginsConfig {
    pub directory: PathBuf,
}

impl Default for PluginsConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("modules"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. `assay=debug,assay.script=trace`
    pub filter: Option<String>,
}

impl AssayConfig {
    /// Load a configuration file. A relative plugin directory is resolved
    /// against the file's parent directory.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let mut config: AssayConfig =
            toml::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        if let Some(base) = path.parent() {
            if config.plugins.directory.is_relative() {
                config.plugins.directory = base.join(&config.plugins.directory);
            }
        }

        tracing::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Load `path` if it exists, defaults otherwise
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            tracing::debug!("No configuration at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// [`load_or_default`](Self::load_or_default) with `subscriber` active
    /// while loading. The global subscriber is built from the loaded filter,
    /// so it cannot be installed yet.
    pub fn load_with_subscriber<S>(path: &Path, subscriber: S) -> Result<Self, ConfigError>
    where
        S: tracing::Subscriber + Send + Sync + 'static,
    {
        tracing::subscriber::with_default(subscriber, || Self::load_or_default(path))
    }

    /// Effective log filter directive
    pub fn log_filter(&self) -> &str {
        self.logging.filter.as_deref().unwrap_or(DEFAULT_LOG_FILTER)
    }
}
