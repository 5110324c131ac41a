//! Plugin Registry
//!
//! Scans a plugin location for loadable units and publishes the result as an
//! immutable [`RegistrySnapshot`]. A refresh builds a new snapshot and swaps
//! it in whole; readers holding the previous one are unaffected.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::error::{LoadError, RegistryError};
use crate::plugin::{PluginDescriptor, PluginSource, UnitLoader};

/// Scan `location` for plugins.
///
/// The location is created if missing. Only direct children are considered;
/// names starting with `_` or `.` are ignored. A unit that fails to load is
/// logged and skipped, one without an entry point is skipped silently.
pub fn discover(
    location: &Path,
    loaders: &[Arc<dyn UnitLoader>],
) -> Result<BTreeMap<String, Arc<PluginDescriptor>>, RegistryError> {
    let location_err = |source| RegistryError::Location {
        path: location.to_path_buf(),
        source,
    };

    if !location.exists() {
        tracing::debug!("Creating plugin location: {}", location.display());
        std::fs::create_dir_all(location).map_err(location_err)?;
    }

    let mut candidates = Vec::new();
    for entry in std::fs::read_dir(location).map_err(location_err)? {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("Failed to read entry in {}: {}", location.display(), e);
                continue;
            }
        };
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        if stem.starts_with('_') || stem.starts_with('.') {
            continue;
        }
        candidates.push((stem.to_string(), path));
    }
    // read_dir order is platform dependent
    candidates.sort();

    let mut plugins = BTreeMap::new();
    for (id, path) in candidates {
        let Some(loader) = loaders.iter().find(|l| l.accepts(&path)) else {
            continue;
        };
        if plugins.contains_key(&id) {
            tracing::warn!("Skipping {}: plugin id '{}' already taken", path.display(), id);
            continue;
        }

        match load_one(loader.as_ref(), &id, &path) {
            Ok(Some(descriptor)) => {
                tracing::debug!("Discovered plugin: {} at {}", id, path.display());
                plugins.insert(id, Arc::new(descriptor));
            }
            Ok(None) => {
                tracing::debug!("No entry point in {}, skipping", path.display());
            }
            Err(e) => {
                tracing::warn!("{}", e);
            }
        }
    }

    Ok(plugins)
}

fn load_one(
    loader: &dyn UnitLoader,
    id: &str,
    path: &Path,
) -> Result<Option<PluginDescriptor>, LoadError> {
    let Some(unit) = loader.load(id, path)? else {
        return Ok(None);
    };
    PluginDescriptor::from_unit(id, unit, PluginSource::File(path.to_path_buf()))
        .map(Some)
        .map_err(|e| LoadError::schema(path, e.to_string()))
}

// ─────────────────────────────────────────────────────────────────────────────
// Snapshot
// ─────────────────────────────────────────────────────────────────────────────

/// Immutable set of plugins produced by one discovery pass
#[derive(Debug, Default)]
pub struct RegistrySnapshot {
    plugins: BTreeMap<String, Arc<PluginDescriptor>>,
    generation: u64,
}

impl RegistrySnapshot {
    pub fn get(&self, id: &str) -> Option<&Arc<PluginDescriptor>> {
        self.plugins.get(id)
    }

    /// Plugins ordered by id
    pub fn iter(&self) -> impl Iterator<Item = &Arc<PluginDescriptor>> {
        self.plugins.values()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.plugins.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Discovery pass that produced this snapshot, 0 before the first refresh
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Registry
// ─────────────────────────────────────────────────────────────────────────────

/// Owner of the current plugin snapshot
pub struct PluginRegistry {
    location: PathBuf,
    loaders: Vec<Arc<dyn UnitLoader>>,
    native: BTreeMap<String, Arc<PluginDescriptor>>,
    current: ArcSwap<RegistrySnapshot>,
    generation: AtomicU64,
}

impl PluginRegistry {
    /// Create an empty registry for `location`. Call [`refresh`](Self::refresh)
    /// to populate it.
    pub fn new(location: impl Into<PathBuf>) -> Self {
        Self {
            location: location.into(),
            loaders: Vec::new(),
            native: BTreeMap::new(),
            current: ArcSwap::from_pointee(RegistrySnapshot::default()),
            generation: AtomicU64::new(0),
        }
    }

    /// Register a loader for one unit format
    pub fn with_loader(mut self, loader: Arc<dyn UnitLoader>) -> Self {
        self.loaders.push(loader);
        self
    }

    /// Register a plugin compiled into the host. Discovered units with the
    /// same id are skipped.
    pub fn with_native(mut self, descriptor: PluginDescriptor) -> Self {
        self.native.insert(descriptor.id.clone(), Arc::new(descriptor));
        self
    }

    pub fn location(&self) -> &Path {
        &self.location
    }

    /// Rescan the location and publish a new snapshot
    pub fn refresh(&self) -> Result<Arc<RegistrySnapshot>, RegistryError> {
        let mut plugins = self.native.clone();
        for (id, descriptor) in discover(&self.location, &self.loaders)? {
            if plugins.contains_key(&id) {
                tracing::warn!(
                    "Skipping {}: id '{}' is taken by a native plugin",
                    descriptor.source,
                    id
                );
                continue;
            }
            plugins.insert(id, descriptor);
        }

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let snapshot = Arc::new(RegistrySnapshot {
            plugins,
            generation,
        });
        self.current.store(snapshot.clone());

        tracing::info!(
            "Registry refreshed: {} plugin(s) from {} (generation {})",
            snapshot.len(),
            self.location.display(),
            generation
        );
        Ok(snapshot)
    }

    /// Current snapshot
    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        self.current.load_full()
    }

    pub fn get(&self, id: &str) -> Option<Arc<PluginDescriptor>> {
        self.current.load().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.current.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.current.load().is_empty()
    }
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("location", &self.location)
            .field("loaders", &self.loaders.len())
            .field("native", &self.native.len())
            .field("plugins", &self.len())
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
