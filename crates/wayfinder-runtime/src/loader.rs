use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use wayfinder_core::{ServiceContext, ServiceError};

use crate::implementation::{ImplementationRegistry, ServiceImplementation};

/// Descriptor file name inside each service directory.
pub const DESCRIPTOR_FILE: &str = "service.json";

/// A descriptor that validated and has an implementation to run it.
pub struct LoadedService {
    pub directory: PathBuf,
    pub context: ServiceContext,
    pub implementation: Arc<dyn ServiceImplementation>,
}

/// Load every service under `root`, one subdirectory per service.
///
/// Only an unreadable root fails the whole load. A subdirectory without a
/// valid descriptor, without a registered implementation, or repeating an
/// already loaded identification name is skipped with a warning.
pub fn load_services(root: &Path, registry: &ImplementationRegistry) -> Result<Vec<LoadedService>, ServiceError> {
    let entries = std::fs::read_dir(root)
        .map_err(|e| ServiceError::Configuration(format!("cannot read services root {}: {e}", root.display())))?;

    let mut directories: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect();
    directories.sort();

    let mut loaded = Vec::new();
    let mut seen = HashSet::new();
    for directory in directories {
        match load_one(&directory, registry) {
            Ok(Some(service)) => {
                let id = service.context.identification();
                if !seen.insert(id.clone()) {
                    tracing::warn!(service = %id, path = %directory.display(), "duplicate service, skipping");
                    continue;
                }
                tracing::info!(service = %id, path = %directory.display(), "service loaded");
                loaded.push(service);
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(path = %directory.display(), error = %e, "service skipped"),
        }
    }
    Ok(loaded)
}

fn load_one(directory: &Path, registry: &ImplementationRegistry) -> Result<Option<LoadedService>, ServiceError> {
    let descriptor = directory.join(DESCRIPTOR_FILE);
    if !descriptor.is_file() {
        tracing::debug!(path = %directory.display(), "no descriptor, ignoring directory");
        return Ok(None);
    }

    let raw = std::fs::read_to_string(&descriptor)
        .map_err(|e| ServiceError::Configuration(format!("cannot read {}: {e}", descriptor.display())))?;
    let context = ServiceContext::from_json(&raw)?;

    let implementation = registry.instantiate(&context)?.ok_or_else(|| {
        ServiceError::Configuration(format!("no implementation registered for '{}'", context.name))
    })?;

    Ok(Some(LoadedService {
        directory: directory.to_path_buf(),
        context,
        implementation,
    }))
}
