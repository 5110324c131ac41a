//! Error types for discovery and execution.

use std::path::PathBuf;

use assay_types::{SchemaError, ValidationError};

/// A candidate unit could not become a plugin.
///
/// Both variants only affect the unit they concern; discovery logs them
/// and moves on to the next candidate.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// The unit failed to load (unreadable, syntax error, top-level throw)
    #[error("Failed to load {path}: {message}")]
    Load { path: PathBuf, message: String },

    /// The entry point exists but its signature cannot be turned into a schema
    #[error("Cannot derive schema for {path}: {message}")]
    Schema { path: PathBuf, message: String },
}

impl LoadError {
    pub fn load(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        LoadError::Load {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn schema(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        LoadError::Schema {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Errors that abort a whole discovery pass
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Plugin location {path} is not usable: {source}")]
    Location {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid native plugin {id}: {source}")]
    Native {
        id: String,
        #[source]
        source: SchemaError,
    },
}

/// Errors returned synchronously by `ExecutionBridge::submit`
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("Unknown plugin: {0}")]
    UnknownPlugin(String),

    #[error("Invalid arguments for {plugin}: {source}")]
    Validation {
        plugin: String,
        #[source]
        source: ValidationError,
    },

    #[error("Execution bridge is shutting down")]
    ShuttingDown,
}

/// A fault raised by a plugin while it runs
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct PluginFault {
    pub message: String,
    /// Set when the plugin stopped because its run was cancelled
    pub interrupted: bool,
}

impl PluginFault {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            interrupted: false,
        }
    }

    pub fn interrupted() -> Self {
        Self {
            message: "interrupted".to_string(),
            interrupted: true,
        }
    }
}

impl From<String> for PluginFault {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for PluginFault {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<std::io::Error> for PluginFault {
    fn from(err: std::io::Error) -> Self {
        Self::new(err.to_string())
    }
}
