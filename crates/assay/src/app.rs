//! Application wiring: registry, loaders and execution bridge.

use std::path::PathBuf;
use std::sync::Arc;

use assay_runtime::{
    ExecutionBridge, ExecutionHandle, ExecutionRequest, PluginDescriptor, PluginRegistry,
    RegistryError, RegistrySnapshot, SubmitError,
};
use assay_script::ScriptLoader;
use assay_types::{Arguments, CapabilitySchema, SchemaError, ValidationError};

use crate::builtin;
use crate::config::AssayConfig;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("Invalid built-in plugin: {0}")]
    Builtin(#[from] SchemaError),

    #[error("Failed to start workers: {0}")]
    Workers(#[source] std::io::Error),

    #[error("Unknown plugin: {0}")]
    UnknownPlugin(String),

    #[error("Invalid assignment {0:?}, expected name=value")]
    Assignment(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Submit(#[from] SubmitError),
}

pub struct App {
    registry: Arc<PluginRegistry>,
    bridge: ExecutionBridge,
}

impl App {
    /// Discover plugins and start the worker pool
    pub fn start(config: &AssayConfig) -> Result<Self, AppError> {
        let mut registry = PluginRegistry::new(&config.plugins.directory)
            .with_loader(Arc::new(ScriptLoader::new()));
        for descriptor in builtin::plugins()? {
            registry = registry.with_native(descriptor);
        }
        registry.refresh()?;

        let registry = Arc::new(registry);
        let bridge = ExecutionBridge::new(config.bridge.clone(), registry.clone())
            .map_err(AppError::Workers)?;

        Ok(Self { registry, bridge })
    }

    pub fn registry(&self) -> &Arc<PluginRegistry> {
        &self.registry
    }

    pub fn bridge(&self) -> &ExecutionBridge {
        &self.bridge
    }

    /// Current plugin set
    pub fn plugins(&self) -> Arc<RegistrySnapshot> {
        self.registry.snapshot()
    }

    pub fn plugin(&self, id: &str) -> Result<Arc<PluginDescriptor>, AppError> {
        self.registry
            .get(id)
            .ok_or_else(|| AppError::UnknownPlugin(id.to_string()))
    }

    /// Build a request from defaults overridden by `name=value` assignments
    pub fn request(
        &self,
        id: &str,
        data_root: impl Into<PathBuf>,
        assignments: &[String],
    ) -> Result<ExecutionRequest, AppError> {
        let descriptor = self.plugin(id)?;
        let arguments = parse_assignments(&descriptor.schema, assignments)?;
        Ok(ExecutionRequest::new(id, data_root, arguments))
    }

    pub fn submit(&self, request: ExecutionRequest) -> Result<ExecutionHandle, AppError> {
        Ok(self.bridge.submit(request)?)
    }

    /// Cancel in-flight runs and join the workers
    pub fn shutdown(self) {
        self.bridge.shutdown();
    }
}

/// Schema defaults with `name=value` overrides parsed per parameter kind
pub fn parse_assignments(
    schema: &CapabilitySchema,
    assignments: &[String],
) -> Result<Arguments, AppError> {
    let mut arguments = Arguments::from_schema(schema);
    for assignment in assignments {
        let (name, raw) = assignment
            .split_once('=')
            .ok_or_else(|| AppError::Assignment(assignment.clone()))?;
        arguments.set_text(schema, name.trim(), raw)?;
    }
    Ok(arguments)
}

/// Plain-text rendering of a schema, one parameter per line
pub fn describe_schema(descriptor: &PluginDescriptor) -> String {
    let mut out = format!("{} ({})\n", descriptor.display_name, descriptor.id);
    if let Some(description) = &descriptor.description {
        out.push_str(&format!("  {}\n", description));
    }
    out.push_str(&format!("  source: {}\n", descriptor.source));

    if descriptor.schema.is_empty() {
        out.push_str("  no parameters\n");
    }
    for param in descriptor.schema.parameters() {
        let mut line = format!("  {:<24} {:<8} = {}", param.name, param.kind.to_string(), param.initial_value());
        if let Some(range) = param.range {
            line.push_str(&format!("  [{}, {}]", range.min, range.max));
        }
        if param.default.is_none() {
            line.push_str("  (no default)");
        }
        out.push_str(&line);
        out.push('\n');
    }
    out
}
