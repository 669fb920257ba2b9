//! Hot-Reload Watcher (C12): watches plugin directories for filesystem
//! changes and reloads the affected plugin through the [`PluginManager`]
//! it was built against.
//!
//! Only directories marked `dev = true` in their manifest, or explicitly
//! passed in, are watched — production deployments leave `plugins.discovery.watch`
//! off and never construct one of these.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify_debouncer_full::notify::{RecommendedWatcher, RecursiveMode};
use notify_debouncer_full::{DebounceEventResult, Debouncer, RecommendedCache, new_debouncer};
use tokio::sync::mpsc;

use crate::loader::DiscoveredPlugin;
use crate::manager::PluginManager;
use crate::plugin::manifest::PluginManifest;

/// Default settle time between a filesystem event and the reload it
/// triggers, matching the debounce window most editors' save-then-rename
/// sequences complete within.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

/// Owns the underlying `notify` watcher and the background task draining
/// its debounced events. Dropping this stops watching; in-flight reloads
/// still run to completion.
pub struct HotReloadWatcher {
    _debouncer: Debouncer<RecommendedWatcher, RecommendedCache>,
    _task: tokio::task::JoinHandle<()>,
}

impl HotReloadWatcher {
    /// Starts watching `plugin_dirs` (each a directory directly holding a
    /// `plugin.toml`) and reloading the corresponding plugin through
    /// `manager` whenever one settles after a change.
    pub fn start(
        manager: Arc<PluginManager>,
        plugin_dirs: Vec<PathBuf>,
        debounce: Duration,
    ) -> notify_debouncer_full::notify::Result<Self> {
        let (tx, mut rx) = mpsc::unbounded_channel::<PathBuf>();

        let mut debouncer = new_debouncer(debounce, None, move |result: DebounceEventResult| {
            let Ok(events) = result else { return };
            for event in events {
                for path in &event.paths {
                    let _ = tx.send(path.clone());
                }
            }
        })?;

        for dir in &plugin_dirs {
            debouncer.watch(dir, RecursiveMode::Recursive)?;
        }

        let watched = plugin_dirs;
        let task = tokio::spawn(async move {
            while let Some(changed) = rx.recv().await {
                let Some(plugin_dir) = containing_plugin_dir(&watched, &changed) else {
                    continue;
                };
                match reload(&manager, &plugin_dir).await {
                    Ok(name) => tracing::info!(plugin = %name, path = %plugin_dir.display(), "hot-reloaded plugin"),
                    Err(err) => tracing::warn!(path = %plugin_dir.display(), %err, "hot-reload failed"),
                }
            }
        });

        Ok(Self {
            _debouncer: debouncer,
            _task: task,
        })
    }
}

/// Finds which watched plugin directory a changed path falls under.
fn containing_plugin_dir(watched: &[PathBuf], changed: &Path) -> Option<PathBuf> {
    watched.iter().find(|dir| changed.starts_with(dir)).cloned()
}

async fn reload(manager: &Arc<PluginManager>, plugin_dir: &Path) -> Result<String, String> {
    let manifest_path = plugin_dir.join("plugin.toml");
    let source = tokio::fs::read_to_string(&manifest_path)
        .await
        .map_err(|e| format!("reading {}: {e}", manifest_path.display()))?;
    let manifest = PluginManifest::parse(&source).map_err(|e| format!("parsing {}: {e}", manifest_path.display()))?;
    let discovered = DiscoveredPlugin {
        manifest,
        directory: plugin_dir.to_path_buf(),
    };
    manager
        .reload_plugin(discovered)
        .await
        .map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::Container;
    use crate::manager::PluginManagerConfig;
    use std::io::Write;
    use std::time::Duration;

    fn write_manifest(dir: &Path, name: &str) {
        std::fs::create_dir_all(dir).unwrap();
        let mut manifest = std::fs::File::create(dir.join("plugin.toml")).unwrap();
        writeln!(manifest, "name = \"{name}\"\nversion = \"1.0.0\"\n[mcp]").unwrap();
    }

    #[test]
    fn containing_plugin_dir_matches_a_nested_path() {
        let watched = vec![PathBuf::from("/plugins/sum-tools")];
        let changed = PathBuf::from("/plugins/sum-tools/plugin.toml");
        assert_eq!(containing_plugin_dir(&watched, &changed), Some(watched[0].clone()));
    }

    #[test]
    fn containing_plugin_dir_ignores_unrelated_paths() {
        let watched = vec![PathBuf::from("/plugins/sum-tools")];
        let changed = PathBuf::from("/plugins/other-tool/plugin.toml");
        assert!(containing_plugin_dir(&watched, &changed).is_none());
    }

    #[tokio::test]
    async fn reload_picks_up_a_manifest_edit() {
        let dir = tempfile::tempdir().unwrap();
        let plugin_dir = dir.path().join("sum-tools");
        write_manifest(&plugin_dir, "sum-tools");

        let manager = Arc::new(PluginManager::new(Container::root(), PluginManagerConfig::default()));
        // No library on disk: the manifest round-trips but dlopen fails,
        // which is the expected outcome for a manifest-only fixture.
        let err = reload(&manager, &plugin_dir).await.unwrap_err();
        assert!(err.contains("sum_tools") || err.contains("loading"));
    }

    #[tokio::test]
    async fn watcher_survives_being_dropped_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let plugin_dir = dir.path().join("sum-tools");
        write_manifest(&plugin_dir, "sum-tools");

        let manager = Arc::new(PluginManager::new(Container::root(), PluginManagerConfig::default()));
        let watcher = HotReloadWatcher::start(manager, vec![plugin_dir], Duration::from_millis(50)).unwrap();
        drop(watcher);
    }
}
