use std::path::PathBuf;

use crate::signature::SignatureError;

/// Errors raised while loading or running a script unit
#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to create runtime: {0}")]
    Runtime(String),

    /// Exception thrown by script code, with its stack when available
    #[error("{0}")]
    Js(String),

    #[error("Invalid entry point signature: {0}")]
    Signature(#[from] SignatureError),

    #[error("Runtime error: {0}")]
    Engine(#[from] rquickjs::Error),
}

pub type ScriptResult<T> = Result<T, ScriptError>;
