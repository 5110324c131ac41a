//! JavaScript Global Objects
//!
//! Registers `console` and the `assay` host object in a script context.
//! Scripts run with full host privileges; the filesystem helpers are thin
//! wrappers over `std::fs`.

use std::path::PathBuf;
use std::time::Duration;

use rquickjs::convert::Coerced;
use rquickjs::function::Rest;
use rquickjs::{Ctx, Exception, Function, Object, Result as JsResult};

use assay_runtime::CancellationToken;

/// Per-context host state visible to the globals
#[derive(Debug, Clone)]
pub struct HostContext {
    pub plugin_id: String,
    pub cancel: CancellationToken,
}

impl HostContext {
    pub fn new(plugin_id: impl Into<String>, cancel: CancellationToken) -> Self {
        Self {
            plugin_id: plugin_id.into(),
            cancel,
        }
    }
}

fn join(args: Rest<Coerced<String>>) -> String {
    args.0
        .into_iter()
        .map(|arg| arg.0)
        .collect::<Vec<_>>()
        .join(" ")
}

fn throw(ctx: &Ctx<'_>, message: String) -> rquickjs::Error {
    Exception::throw_message(ctx, &message)
}

/// Register the `assay` global object and `console`
pub fn register_host_globals<'js>(ctx: &Ctx<'js>, host: &HostContext) -> JsResult<()> {
    let globals = ctx.globals();

    register_console(ctx, &host.plugin_id)?;

    let assay = Object::new(ctx.clone())?;

    let id = host.plugin_id.clone();
    assay.set("log", Function::new(ctx.clone(), move |args: Rest<Coerced<String>>| {
        tracing::info!(target: "assay.script", plugin = %id, "{}", join(args));
    })?)?;

    let id = host.plugin_id.clone();
    assay.set("warn", Function::new(ctx.clone(), move |args: Rest<Coerced<String>>| {
        tracing::warn!(target: "assay.script", plugin = %id, "{}", join(args));
    })?)?;

    let id = host.plugin_id.clone();
    assay.set("error", Function::new(ctx.clone(), move |args: Rest<Coerced<String>>| {
        tracing::error!(target: "assay.script", plugin = %id, "{}", join(args));
    })?)?;

    // Filesystem
    assay.set(
        "readText",
        Function::new(ctx.clone(), |ctx: Ctx<'js>, path: String| -> JsResult<String> {
            std::fs::read_to_string(&path)
                .map_err(|e| throw(&ctx, format!("readText({}): {}", path, e)))
        })?,
    )?;

    assay.set(
        "writeText",
        Function::new(
            ctx.clone(),
            |ctx: Ctx<'js>, path: String, text: String| -> JsResult<()> {
                std::fs::write(&path, text)
                    .map_err(|e| throw(&ctx, format!("writeText({}): {}", path, e)))
            },
        )?,
    )?;

    assay.set(
        "listDir",
        Function::new(ctx.clone(), |ctx: Ctx<'js>, path: String| -> JsResult<Vec<String>> {
            let entries = std::fs::read_dir(&path)
                .map_err(|e| throw(&ctx, format!("listDir({}): {}", path, e)))?;
            let mut names: Vec<String> = entries
                .filter_map(|entry| entry.ok())
                .map(|entry| entry.file_name().to_string_lossy().into_owned())
                .collect();
            names.sort();
            Ok(names)
        })?,
    )?;

    assay.set(
        "exists",
        Function::new(ctx.clone(), |path: String| PathBuf::from(path).exists())?,
    )?;

    assay.set(
        "mkdirs",
        Function::new(ctx.clone(), |ctx: Ctx<'js>, path: String| -> JsResult<()> {
            std::fs::create_dir_all(&path)
                .map_err(|e| throw(&ctx, format!("mkdirs({}): {}", path, e)))
        })?,
    )?;

    assay.set(
        "joinPath",
        Function::new(ctx.clone(), |parts: Rest<String>| {
            parts
                .0
                .iter()
                .collect::<PathBuf>()
                .to_string_lossy()
                .into_owned()
        })?,
    )?;

    // Cancellation
    let token = host.cancel.clone();
    assay.set(
        "sleep",
        Function::new(ctx.clone(), move |ms: f64| {
            let ms = if ms.is_finite() { ms.max(0.0) } else { 0.0 };
            let duration = Duration::try_from_secs_f64(ms / 1000.0).unwrap_or(Duration::MAX);
            token.sleep(duration)
        })?,
    )?;

    let token = host.cancel.clone();
    assay.set(
        "isCancelled",
        Function::new(ctx.clone(), move || token.is_cancelled())?,
    )?;

    globals.set("assay", assay)?;

    Ok(())
}

/// Register the console object, routed to tracing
fn register_console(ctx: &Ctx<'_>, plugin_id: &str) -> JsResult<()> {
    let globals = ctx.globals();
    let console = Object::new(ctx.clone())?;

    let id = plugin_id.to_string();
    console.set("log", Function::new(ctx.clone(), move |args: Rest<Coerced<String>>| {
        tracing::info!(target: "assay.script.console", plugin = %id, "{}", join(args));
    })?)?;

    let id = plugin_id.to_string();
    console.set("info", Function::new(ctx.clone(), move |args: Rest<Coerced<String>>| {
        tracing::info!(target: "assay.script.console", plugin = %id, "{}", join(args));
    })?)?;

    let id = plugin_id.to_string();
    console.set("warn", Function::new(ctx.clone(), move |args: Rest<Coerced<String>>| {
        tracing::warn!(target: "assay.script.console", plugin = %id, "{}", join(args));
    })?)?;

    let id = plugin_id.to_string();
    console.set("error", Function::new(ctx.clone(), move |args: Rest<Coerced<String>>| {
        tracing::error!(target: "assay.script.console", plugin = %id, "{}", join(args));
    })?)?;

    let id = plugin_id.to_string();
    console.set("debug", Function::new(ctx.clone(), move |args: Rest<Coerced<String>>| {
        tracing::debug!(target: "assay.script.console", plugin = %id, "{}", join(args));
    })?)?;

    globals.set("console", console)?;

    Ok(())
}
