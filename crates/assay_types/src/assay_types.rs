//! Assay Types - Capability schema data model
//!
//! This crate contains the pure data structures shared by the plugin
//! registry, the execution bridge and any controller that renders forms:
//!
//! - [`Value`] - tagged argument/default values
//! - [`Signature`] - an entry point's formal parameter list
//! - [`CapabilitySchema`] - the user-configurable surface derived from it
//! - [`Arguments`] - concrete values validated against a schema

mod arguments;
mod schema;
mod value;

pub use arguments::*;
pub use schema::*;
pub use value::*;
