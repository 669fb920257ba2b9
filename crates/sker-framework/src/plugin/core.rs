//! The live [`Plugin`] handle: state, lifecycle hooks, and the handlers it
//! contributes once loaded.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;
use sker_core::SkerResult;

use crate::container::Container;
use crate::handler::HandlerDescriptor;
use crate::isolation::{IsolationLevel, Permissions};
use crate::plugin::manifest::PluginManifest;

/// Plugin lifecycle state, advanced only by [`crate::manager::PluginManager`]
/// (§3 — `Discovered, Loading, Loaded, Enabled, Failed, Unloaded`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PluginState {
    Discovered = 0,
    Loading = 1,
    /// `dlopen`ed, container and handlers built, not yet installed in the
    /// registry.
    Loaded = 2,
    /// Descriptors installed in the registry and serving requests.
    Enabled = 3,
    /// Torn down by an explicit unload; the table entry is removed
    /// immediately after so this state is only ever observed on a
    /// detached `Arc<Plugin>` a caller still holds.
    Unloaded = 4,
    /// Load or reload failed; [`Plugin::last_error`] holds why. The
    /// plugin's table slot is kept in this state (§4.5 — "the plugin
    /// remains in Failed state with a stored last-error") rather than
    /// removed, so the name keeps resolving to *something*.
    Failed = 5,
}

impl From<u8> for PluginState {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::Discovered,
            1 => Self::Loading,
            2 => Self::Loaded,
            3 => Self::Enabled,
            4 => Self::Unloaded,
            _ => Self::Failed,
        }
    }
}

/// Static metadata describing a plugin, sourced from its manifest.
#[derive(Debug, Clone)]
pub struct PluginMetadata {
    pub name: String,
    pub version: String,
    pub category: Option<String>,
}

/// Hook a plugin's `cdylib` implements to build its handlers and wire
/// them to its own (child) container.
#[async_trait]
pub trait PluginLifecycle: Send + Sync {
    /// Called with the plugin's child container once its dependencies
    /// have resolved. Returns the handlers this plugin contributes;
    /// returning an error aborts the load before anything is registered.
    async fn on_load(&self, container: &Arc<Container>) -> SkerResult<Vec<HandlerDescriptor>>;

    /// Called before the plugin is unloaded (hot-reload or shutdown), to
    /// release resources the plugin opened itself (file handles, background
    /// tasks).
    async fn on_unload(&self) -> SkerResult<()>;
}

/// A loaded plugin: its manifest, isolation policy, container, handlers,
/// and current lifecycle state.
pub struct Plugin {
    pub metadata: PluginMetadata,
    pub provides: Vec<String>,
    pub depends_on: Vec<String>,
    pub isolation_level: IsolationLevel,
    pub permissions: Permissions,
    state: AtomicU8,
    pub container: Arc<Container>,
    pub handlers: Vec<HandlerDescriptor>,
    pub lifecycle: Option<Arc<dyn PluginLifecycle>>,
    /// Keeps the dynamically loaded library mapped for as long as the
    /// plugin is active; dropping it unmaps the code.
    pub library: Option<Arc<libloading::Library>>,
    /// The resolved path of the `cdylib` this plugin was `dlopen`ed from,
    /// used by [`crate::conflict::ServiceClassRule`] to detect two plugin
    /// directories pointing at the same compiled library.
    pub library_path: Option<PathBuf>,
    /// Set when a load or reload attempt fails while this slot is in
    /// [`PluginState::Failed`]; `None` in every other state.
    last_error: RwLock<Option<String>>,
}

impl Plugin {
    pub fn new(
        manifest: &PluginManifest,
        container: Arc<Container>,
        handlers: Vec<HandlerDescriptor>,
        lifecycle: Option<Arc<dyn PluginLifecycle>>,
        library: Option<Arc<libloading::Library>>,
        library_path: Option<PathBuf>,
    ) -> Self {
        Self {
            metadata: PluginMetadata {
                name: manifest.name.clone(),
                version: manifest.version.clone(),
                category: manifest.mcp.category.clone(),
            },
            provides: handlers.iter().map(|h| h.name.clone()).collect(),
            depends_on: manifest.mcp.depends_on.clone(),
            isolation_level: manifest.mcp.isolation_level,
            permissions: manifest.effective_permissions(),
            state: AtomicU8::new(PluginState::Discovered as u8),
            container,
            handlers,
            lifecycle,
            library,
            library_path,
            last_error: RwLock::new(None),
        }
    }

    /// Builds a placeholder slot for a plugin whose (re)load failed,
    /// keeping its name resolvable instead of vanishing from the table
    /// (§4.5, §9 — "the plugin table slot is reused so external
    /// references by name continue to resolve").
    pub fn failed(name: &str, version: &str, category: Option<String>, error: String) -> Self {
        Self {
            metadata: PluginMetadata {
                name: name.to_string(),
                version: version.to_string(),
                category,
            },
            provides: Vec::new(),
            depends_on: Vec::new(),
            isolation_level: IsolationLevel::default(),
            permissions: Permissions::default(),
            state: AtomicU8::new(PluginState::Failed as u8),
            container: Container::root(),
            handlers: Vec::new(),
            lifecycle: None,
            library: None,
            library_path: None,
            last_error: RwLock::new(Some(error)),
        }
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn state(&self) -> PluginState {
        PluginState::from(self.state.load(Ordering::Acquire))
    }

    pub fn set_state(&self, state: PluginState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// The error from this plugin's most recent failed load/reload
    /// attempt, if its current state is [`PluginState::Failed`].
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    pub fn set_last_error(&self, error: String) {
        *self.last_error.write() = Some(error);
    }

    pub async fn on_unload(&self) -> SkerResult<()> {
        if let Some(hook) = &self.lifecycle {
            hook.on_unload().await?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for Plugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Plugin")
            .field("name", &self.metadata.name)
            .field("state", &self.state())
            .field("provides", &self.provides)
            .field("depends_on", &self.depends_on)
            .finish_non_exhaustive()
    }
}
