//! Filesystem discovery and dynamic loading of plugins.
//!
//! A plugin lives in its own directory under the configured plugins root:
//!
//! ```text
//! plugins/
//!   sum-tools/
//!     plugin.toml
//!     libsum_tools.so
//! ```
//!
//! Discovery reads every `plugin.toml` it finds one directory down from
//! the root; loading `dlopen`s the named library and reads its exported
//! [`PluginDescriptor`] symbol.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use sker_core::{SkerError, SkerResult};

use crate::plugin::descriptor::{DESCRIPTOR_SYMBOL, PluginDescriptor, PluginFactoryOutput};
use crate::plugin::manifest::PluginManifest;

/// A manifest found on disk, not yet `dlopen`ed.
#[derive(Debug, Clone)]
pub struct DiscoveredPlugin {
    pub manifest: PluginManifest,
    pub directory: PathBuf,
}

/// Default recursion depth for [`discover`], matching `plugins.discovery.maxDepth`'s
/// documented default.
pub const DEFAULT_MAX_DEPTH: u32 = 2;

/// Scans `root` for `plugin.toml` files, recursing up to `max_depth`
/// directory levels down from `root` (a directory directly under `root`
/// holding a manifest is depth 1).
///
/// Manifests that fail to parse, or declare an incompatible platform, are
/// skipped with a warning rather than aborting the whole scan — one bad
/// plugin directory should not take down discovery for the rest. A
/// directory that itself holds `plugin.toml` is not recursed into
/// further; a plugin's own subdirectories (assets, data) are never
/// scanned for nested manifests.
pub fn discover(root: &Path, max_depth: u32) -> SkerResult<Vec<DiscoveredPlugin>> {
    let mut found = Vec::new();
    discover_at(root, max_depth, &mut found)?;
    Ok(found)
}

fn discover_at(dir: &Path, depth_remaining: u32, found: &mut Vec<DiscoveredPlugin>) -> SkerResult<()> {
    if depth_remaining == 0 {
        return Ok(());
    }
    let entries = std::fs::read_dir(dir)
        .map_err(|e| SkerError::Internal(format!("reading plugins dir {}: {e}", dir.display())))?;

    for entry in entries {
        let entry = entry.map_err(|e| SkerError::Internal(e.to_string()))?;
        if !entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
            continue;
        }
        let directory = entry.path();
        let manifest_path = directory.join("plugin.toml");
        if !manifest_path.exists() {
            discover_at(&directory, depth_remaining - 1, found)?;
            continue;
        }
        let source = match std::fs::read_to_string(&manifest_path) {
            Ok(source) => source,
            Err(err) => {
                tracing::warn!(path = %manifest_path.display(), %err, "failed to read plugin manifest");
                continue;
            }
        };
        let manifest = match PluginManifest::parse(&source) {
            Ok(manifest) => manifest,
            Err(err) => {
                tracing::warn!(path = %manifest_path.display(), %err, "failed to parse plugin manifest");
                continue;
            }
        };
        if !manifest.compatible_with_current_platform() {
            tracing::info!(plugin = %manifest.name, "skipping plugin: unsupported platform");
            continue;
        }
        found.push(DiscoveredPlugin { manifest, directory });
    }
    Ok(())
}

/// The result of `dlopen`ing a discovered plugin's library.
pub struct LoadedLibrary {
    pub library: Arc<libloading::Library>,
    pub factory_output: PluginFactoryOutput,
}

/// `dlopen`s a discovered plugin's library and reads its exported
/// descriptor, rejecting ABI-incompatible plugins before instantiating
/// anything.
///
/// # Safety
///
/// This calls into foreign code loaded from disk. The caller is
/// responsible for only pointing this at trusted plugin directories;
/// `libloading` itself cannot guarantee the library does not violate Rust's
/// safety invariants.
pub fn load_library(discovered: &DiscoveredPlugin) -> SkerResult<LoadedLibrary> {
    let library_path = discovered.directory.join(discovered.manifest.library_file_name());
    let library = unsafe {
        libloading::Library::new(&library_path).map_err(|e| {
            SkerError::Internal(format!("loading {}: {e}", library_path.display()))
        })?
    };

    let descriptor: PluginDescriptor = unsafe {
        let symbol = library
            .get::<*const PluginDescriptor>(DESCRIPTOR_SYMBOL)
            .map_err(|e| {
                SkerError::Internal(format!(
                    "{} does not export {}: {e}",
                    library_path.display(),
                    String::from_utf8_lossy(DESCRIPTOR_SYMBOL)
                ))
            })?;
        **symbol
    };

    if !descriptor.is_compatible() {
        return Err(SkerError::Conflict(format!(
            "plugin '{}' ABI version {:#x} is incompatible with host {:#x}",
            discovered.manifest.name,
            descriptor.abi_version,
            crate::plugin::descriptor::SKER_PLUGIN_ABI_VERSION,
        )));
    }

    let factory_output = descriptor.instantiate();
    Ok(LoadedLibrary {
        library: Arc::new(library),
        factory_output,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_manifest(dir: &std::path::Path, name: &str) {
        std::fs::create_dir_all(dir).unwrap();
        let mut manifest = std::fs::File::create(dir.join("plugin.toml")).unwrap();
        writeln!(
            manifest,
            "name = \"{name}\"\nversion = \"1.0.0\"\n[mcp]\ntype = \"tool\""
        )
        .unwrap();
    }

    #[test]
    fn discover_skips_directories_without_manifest() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("not-a-plugin")).unwrap();
        let found = discover(dir.path(), DEFAULT_MAX_DEPTH).unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn discover_finds_valid_manifest() {
        let dir = tempfile::tempdir().unwrap();
        write_manifest(&dir.path().join("sum-tools"), "sum-tools");
        let found = discover(dir.path(), DEFAULT_MAX_DEPTH).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].manifest.name, "sum-tools");
    }

    #[test]
    fn discover_recurses_up_to_max_depth() {
        let dir = tempfile::tempdir().unwrap();
        write_manifest(&dir.path().join("group").join("nested-tool"), "nested-tool");
        let shallow = discover(dir.path(), 1).unwrap();
        assert!(shallow.is_empty());

        let deep = discover(dir.path(), 2).unwrap();
        assert_eq!(deep.len(), 1);
        assert_eq!(deep[0].manifest.name, "nested-tool");
    }

    #[test]
    fn discover_does_not_recurse_into_a_plugin_directory() {
        let dir = tempfile::tempdir().unwrap();
        let plugin_dir = dir.path().join("sum-tools");
        write_manifest(&plugin_dir, "sum-tools");
        std::fs::create_dir(plugin_dir.join("assets")).unwrap();
        let found = discover(dir.path(), DEFAULT_MAX_DEPTH).unwrap();
        assert_eq!(found.len(), 1);
    }
}
