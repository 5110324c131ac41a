// Script Loader - Turns `.js` files into plugins

use std::path::{Path, PathBuf};
use std::sync::Arc;

use assay_runtime::{
    CancellationToken, EntryPoint, Invocation, LoadError, LoadedUnit, PluginFault, UnitLoader,
};
use assay_types::{Signature, Value};

use crate::error::{ScriptError, ScriptResult};
use crate::globals::HostContext;
use crate::runtime::{ScriptRuntime, UnitInfo};
use crate::signature::parse_signature;

/// [`UnitLoader`] for JavaScript files
#[derive(Debug, Default, Clone)]
pub struct ScriptLoader;

impl ScriptLoader {
    pub fn new() -> Self {
        Self
    }
}

impl UnitLoader for ScriptLoader {
    fn extensions(&self) -> &[&str] {
        &["js"]
    }

    fn load(&self, id: &str, path: &Path) -> Result<Option<LoadedUnit>, LoadError> {
        let source = std::fs::read_to_string(path).map_err(|e| LoadError::load(path, e.to_string()))?;

        let info = match evaluate(id, path, &source) {
            Ok(Some(info)) => info,
            Ok(None) => return Ok(None),
            Err(e) => return Err(LoadError::load(path, e.to_string())),
        };

        let signature =
            parse_signature(&info.entry_source).map_err(|e| LoadError::schema(path, e.to_string()))?;

        tracing::debug!(
            "Loaded script {} with {} parameter(s)",
            path.display(),
            signature.parameters.len()
        );

        Ok(Some(LoadedUnit {
            name: info.name,
            description: info.description,
            entry_point: Arc::new(ScriptEntryPoint {
                id: id.to_string(),
                path: path.to_path_buf(),
                source: source.into(),
                signature,
            }),
        }))
    }
}

/// Evaluate a unit once, with a token nobody cancels, and probe it
fn evaluate(id: &str, path: &Path, source: &str) -> ScriptResult<Option<UnitInfo>> {
    let runtime = ScriptRuntime::new(HostContext::new(id, CancellationToken::new()))?;
    runtime.eval_unit(&path.display().to_string(), source)?;
    runtime.probe()
}

// ─────────────────────────────────────────────────────────────────────────────
// Entry Point
// ─────────────────────────────────────────────────────────────────────────────

/// Entry point of a script unit.
///
/// Holds the source captured at load time; every invocation evaluates it in
/// a fresh runtime on the calling worker thread.
pub struct ScriptEntryPoint {
    id: String,
    path: PathBuf,
    source: Arc<str>,
    signature: Signature,
}

impl ScriptEntryPoint {
    fn run(&self, invocation: &Invocation) -> Result<Value, PluginFault> {
        let host = HostContext::new(self.id.clone(), invocation.cancel.clone());
        let runtime = ScriptRuntime::new(host).map_err(|e| script_fault(e, &invocation.cancel))?;

        runtime
            .eval_unit(&self.path.display().to_string(), &self.source)
            .map_err(|e| script_fault(e, &invocation.cancel))?;

        runtime.call_entry(&self.signature, invocation)
    }
}

fn script_fault(err: ScriptError, cancel: &CancellationToken) -> PluginFault {
    if cancel.is_cancelled() {
        PluginFault::interrupted()
    } else {
        PluginFault::new(err.to_string())
    }
}

impl EntryPoint for ScriptEntryPoint {
    fn signature(&self) -> &Signature {
        &self.signature
    }

    fn invoke(&self, invocation: Invocation) -> Result<Value, PluginFault> {
        tracing::debug!(run_id = %invocation.run_id, plugin = %self.id, "Evaluating {}", self.path.display());
        self.run(&invocation)
    }
}

impl std::fmt::Debug for ScriptEntryPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptEntryPoint")
            .field("id", &self.id)
            .field("path", &self.path)
            .field("signature", &self.signature)
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
