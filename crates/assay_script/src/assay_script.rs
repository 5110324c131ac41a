//! Assay Script - JavaScript plugin units on QuickJS
//!
//! A script unit is a `.js` file evaluated as a classic script. It becomes a
//! plugin when it defines a global `run` function; its formal parameters
//! are the plugin's signature.

mod error;
mod globals;
mod loader;
mod runtime;
mod signature;

pub use error::*;
pub use globals::*;
pub use loader::*;
pub use runtime::*;
pub use signature::*;
