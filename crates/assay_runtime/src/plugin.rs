//! Plugin Descriptors and Entry Points
//!
//! A plugin is one independently loadable unit exposing a single entry point.
//! Loaders turn files into [`LoadedUnit`]s; natively compiled plugins
//! implement [`EntryPoint`] directly and register through the registry.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use assay_types::{extract_schema, Arguments, CapabilitySchema, SchemaError, Signature, Value};

use crate::error::{LoadError, PluginFault};
use crate::progress::{CancellationToken, ProgressSink};
use crate::run::RunId;

// ─────────────────────────────────────────────────────────────────────────────
// Entry Point
// ─────────────────────────────────────────────────────────────────────────────

/// Everything an entry point receives for one run
pub struct Invocation {
    pub run_id: RunId,
    /// Active data root; bound to `data_path` when declared
    pub data_root: PathBuf,
    /// Validated, non-reserved arguments
    pub arguments: Arguments,
    /// Bound to `progress_callback` when declared
    pub progress: ProgressSink,
    pub cancel: CancellationToken,
}

impl Invocation {
    /// Invocation with a detached sink, for calling an entry point directly
    pub fn detached(data_root: impl Into<PathBuf>, arguments: Arguments) -> Self {
        let run_id = RunId::new();
        Self {
            run_id,
            data_root: data_root.into(),
            arguments,
            progress: ProgressSink::detached(run_id),
            cancel: CancellationToken::new(),
        }
    }
}

/// The single callable a plugin exposes.
///
/// `invoke` runs on a bridge worker thread and may block. Any `Err` becomes a
/// `Failed` event for that run only.
pub trait EntryPoint: Send + Sync + 'static {
    /// Formal parameter list the schema is derived from
    fn signature(&self) -> &Signature;

    fn invoke(&self, invocation: Invocation) -> Result<Value, PluginFault>;
}

/// [`EntryPoint`] backed by a Rust closure
pub struct FnEntryPoint<F> {
    signature: Signature,
    func: F,
}

impl<F> FnEntryPoint<F>
where
    F: Fn(Invocation) -> Result<Value, PluginFault> + Send + Sync + 'static,
{
    pub fn new(signature: Signature, func: F) -> Self {
        Self { signature, func }
    }
}

impl<F> EntryPoint for FnEntryPoint<F>
where
    F: Fn(Invocation) -> Result<Value, PluginFault> + Send + Sync + 'static,
{
    fn signature(&self) -> &Signature {
        &self.signature
    }

    fn invoke(&self, invocation: Invocation) -> Result<Value, PluginFault> {
        (self.func)(invocation)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Unit Loader
// ─────────────────────────────────────────────────────────────────────────────

/// A unit that loaded and exposes an entry point
pub struct LoadedUnit {
    /// Optional display name exported by the unit
    pub name: Option<String>,
    /// Optional description exported by the unit
    pub description: Option<String>,
    pub entry_point: Arc<dyn EntryPoint>,
}

/// Turns candidate files of some format into loaded units.
pub trait UnitLoader: Send + Sync {
    /// File extensions (without the dot) this loader accepts
    fn extensions(&self) -> &[&str];

    /// Load one unit.
    ///
    /// `Ok(None)` means the unit loaded but exposes no entry point and is
    /// not a plugin.
    fn load(&self, id: &str, path: &Path) -> Result<Option<LoadedUnit>, LoadError>;

    fn accepts(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| self.extensions().iter().any(|e| e.eq_ignore_ascii_case(ext)))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Plugin Descriptor
// ─────────────────────────────────────────────────────────────────────────────

/// Where a plugin came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PluginSource {
    File(PathBuf),
    Native,
}

impl fmt::Display for PluginSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PluginSource::File(path) => write!(f, "{}", path.display()),
            PluginSource::Native => write!(f, "<native>"),
        }
    }
}

/// A discovered, schema-checked plugin
pub struct PluginDescriptor {
    /// Stable id, the unit's file stem
    pub id: String,
    pub display_name: String,
    pub description: Option<String>,
    pub source: PluginSource,
    pub entry_point: Arc<dyn EntryPoint>,
    pub schema: CapabilitySchema,
}

impl PluginDescriptor {
    /// Build a descriptor from a loaded unit, extracting its schema
    pub fn from_unit(
        id: impl Into<String>,
        unit: LoadedUnit,
        source: PluginSource,
    ) -> Result<Self, SchemaError> {
        let id = id.into();
        let schema = extract_schema(unit.entry_point.signature())?;
        let display_name = unit
            .name
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| id.clone());
        Ok(Self {
            id,
            display_name,
            description: unit.description,
            source,
            entry_point: unit.entry_point,
            schema,
        })
    }

    /// Build a descriptor for an entry point compiled into the host
    pub fn native(
        id: impl Into<String>,
        entry_point: Arc<dyn EntryPoint>,
    ) -> Result<Self, SchemaError> {
        Self::from_unit(
            id,
            LoadedUnit {
                name: None,
                description: None,
                entry_point,
            },
            PluginSource::Native,
        )
    }

    /// Set the display name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }

    /// Set the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

impl fmt::Debug for PluginDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginDescriptor")
            .field("id", &self.id)
            .field("display_name", &self.display_name)
            .field("source", &self.source)
            .field("schema", &self.schema)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assay_types::{DeclaredType, FormalParameter};

    fn doubler() -> Arc<dyn EntryPoint> {
        Arc::new(FnEntryPoint::new(
            Signature::new()
                .param(FormalParameter::new("data_path"))
                .param(FormalParameter::new("factor").typed(DeclaredType::Integer).with_default(2)),
            |inv: Invocation| {
                let factor = inv.arguments.get("factor").and_then(Value::as_i64).unwrap_or(1);
                Ok(Value::Integer(factor * 2))
            },
        ))
    }

    #[test]
    fn test_native_descriptor() {
        let descriptor = PluginDescriptor::native("doubler", doubler()).unwrap();
        assert_eq!(descriptor.display_name, "doubler");
        assert_eq!(descriptor.source, PluginSource::Native);
        assert_eq!(descriptor.schema.len(), 1);

        let args = Arguments::from_schema(&descriptor.schema);
        let out = descriptor
            .entry_point
            .invoke(Invocation::detached("/tmp", args))
            .unwrap();
        assert_eq!(out, Value::Integer(4));
    }

    #[test]
    fn test_unit_name_fallback() {
        let unit = LoadedUnit {
            name: Some("  ".into()),
            description: Some("does things".into()),
            entry_point: doubler(),
        };
        let descriptor =
            PluginDescriptor::from_unit("x", unit, PluginSource::File("x.js".into())).unwrap();
        assert_eq!(descriptor.display_name, "x");
        assert_eq!(descriptor.description.as_deref(), Some("does things"));
    }
}
