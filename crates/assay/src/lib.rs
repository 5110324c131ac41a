//! Assay - Analysis plugin host
//!
//! Wires the plugin registry, the script loader and the execution bridge
//! together for the `assay` command line tool.

pub mod app;
pub mod builtin;
pub mod config;

pub use app::{App, AppError};
pub use config::{AssayConfig, ConfigError};
