//! Assay Runtime - Plugin registry and execution bridge
//!
//! This crate discovers plugins, keeps the current set as an immutable
//! snapshot, and runs plugin entry points on a bounded pool of worker
//! threads. Each submitted run reports back over its own ordered channel:
//!
//! ```text
//! controller --submit--> queue --> worker N --invoke--> EntryPoint
//!      ^                                |
//!      +------ RunEvent (progress / succeeded / failed / cancelled)
//! ```

mod bridge;
mod error;
mod handle;
mod plugin;
mod progress;
mod registry;
mod run;

pub use bridge::*;
pub use error::*;
pub use handle::*;
pub use plugin::*;
pub use progress::*;
pub use registry::*;
pub use run::*;

pub use assay_types;
