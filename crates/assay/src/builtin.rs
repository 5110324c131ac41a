//! Built-in Plugins
//!
//! Compiled into the host and registered next to the discovered scripts.

use std::fs::FileType;
use std::path::Path;
use std::sync::Arc;

use assay_runtime::{FnEntryPoint, Invocation, PluginDescriptor, PluginFault};
use assay_types::{DeclaredType, FormalParameter, SchemaError, Signature, Value};

/// Id of the file inventory plugin
pub const INVENTORY: &str = "inventory";

pub fn plugins() -> Result<Vec<PluginDescriptor>, SchemaError> {
    Ok(vec![inventory()?])
}

/// Counts files under the data root, optionally filtered by extension
fn inventory() -> Result<PluginDescriptor, SchemaError> {
    let signature = Signature::new()
        .param(FormalParameter::new("data_path").typed(DeclaredType::Text))
        .param(FormalParameter::new("extension").typed(DeclaredType::Text).with_default(""))
        .param(FormalParameter::new("recursive").typed(DeclaredType::Boolean).with_default(true))
        .param(FormalParameter::new("progress_callback"));

    let entry_point = FnEntryPoint::new(signature, run_inventory);
    Ok(PluginDescriptor::native(INVENTORY, Arc::new(entry_point))?
        .with_name("File Inventory")
        .with_description("Counts the files under the data root"))
}

fn run_inventory(invocation: Invocation) -> Result<Value, PluginFault> {
    let extension = invocation
        .arguments
        .get("extension")
        .and_then(Value::as_str)
        .unwrap_or("")
        .trim_start_matches('.')
        .to_ascii_lowercase();
    let recursive = invocation
        .arguments
        .get("recursive")
        .and_then(Value::as_bool)
        .unwrap_or(true);

    let entries: Vec<_> = std::fs::read_dir(&invocation.data_root)?
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.file_type().ok().map(|kind| (entry.path(), kind)))
        .collect();

    let total = entries.len().max(1);
    let mut count = 0;
    for (index, (path, kind)) in entries.iter().enumerate() {
        if invocation.cancel.is_cancelled() {
            return Err(PluginFault::interrupted());
        }
        count += count_files(path, *kind, &extension, recursive)?;
        invocation.progress.report(((index + 1) * 100 / total) as i64);
    }

    Ok(Value::Text(format!("{} file(s)", count)))
}

fn count_files(
    path: &Path,
    kind: FileType,
    extension: &str,
    recursive: bool,
) -> std::io::Result<usize> {
    if kind.is_dir() {
        if !recursive {
            return Ok(0);
        }
        let mut count = 0;
        for entry in std::fs::read_dir(path)? {
            let entry = entry?;
            count += count_files(&entry.path(), entry.file_type()?, extension, recursive)?;
        }
        return Ok(count);
    }

    // Links are never followed into directories; a dangling or looping link is skipped
    if kind.is_symlink() && !std::fs::metadata(path).is_ok_and(|meta| meta.is_file()) {
        return Ok(0);
    }

    let matches = extension.is_empty()
        || path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case(extension));
    Ok(usize::from(matches))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assay_types::{Arguments, ParamKind};

    #[test]
    fn test_inventory_schema() {
        let descriptor = inventory().unwrap();
        assert_eq!(descriptor.display_name, "File Inventory");
        let kinds: Vec<_> = descriptor.schema.parameters().iter().map(|p| p.kind).collect();
        assert_eq!(kinds, vec![ParamKind::Text, ParamKind::Boolean]);
    }

    #[test]
    fn test_inventory_counts() {
        let temp = tempfile::tempdir().unwrap();
        std::fs::write(temp.path().join("a.csv"), "").unwrap();
        std::fs::write(temp.path().join("b.CSV"), "").unwrap();
        std::fs::write(temp.path().join("c.tif"), "").unwrap();
        std::fs::create_dir(temp.path().join("sub")).unwrap();
        std::fs::write(temp.path().join("sub").join("d.csv"), "").unwrap();

        let descriptor = inventory().unwrap();
        let run = |args: Arguments| {
            descriptor
                .entry_point
                .invoke(Invocation::detached(temp.path(), args))
                .unwrap()
        };

        let all = Arguments::from_schema(&descriptor.schema);
        assert_eq!(run(all), Value::Text("4 file(s)".into()));

        let csv = Arguments::from_schema(&descriptor.schema).with("extension", ".csv");
        assert_eq!(run(csv), Value::Text("3 file(s)".into()));

        let flat = Arguments::from_schema(&descriptor.schema)
            .with("extension", "csv")
            .with("recursive", false);
        assert_eq!(run(flat), Value::Text("2 file(s)".into()));
    }

    #[cfg(unix)]
    #[test]
    fn test_inventory_does_not_follow_linked_directories() {
        use std::os::unix::fs::symlink;

        let temp = tempfile::tempdir().unwrap();
        let sub = temp.path().join("sub");
        std::fs::create_dir(&sub).unwrap();
        symlink(temp.path(), sub.join("loop")).unwrap();
        symlink(sub.join("missing.csv"), sub.join("dangling.csv")).unwrap();

        let descriptor = inventory().unwrap();
        let args = Arguments::from_schema(&descriptor.schema);
        let out = descriptor
            .entry_point
            .invoke(Invocation::detached(temp.path(), args.clone()))
            .unwrap();
        assert_eq!(out, Value::Text("0 file(s)".into()));

        // a link to a file still counts
        std::fs::write(temp.path().join("a.csv"), "").unwrap();
        symlink(temp.path().join("a.csv"), sub.join("b.csv")).unwrap();
        let out = descriptor
            .entry_point
            .invoke(Invocation::detached(temp.path(), args))
            .unwrap();
        assert_eq!(out, Value::Text("2 file(s)".into()));
    }
}
