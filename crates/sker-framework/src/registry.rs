//! The concurrent lookup table of active handlers, keyed by
//! `(kind, name)`.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use sker_core::{RequestKind, SkerError, SkerResult};

use crate::handler::HandlerDescriptor;

type HandlerMap = HashMap<(RequestKind, String), HandlerDescriptor>;

/// Concurrent registry of currently active handlers.
///
/// Registration is atomic per plugin: [`crate::manager::PluginManager`]
/// builds the full set of a plugin's descriptors, runs them through the
/// [`crate::conflict::ConflictDetector`], and only then installs them
/// here in one go. The live map is held behind an `RwLock<Arc<_>>`
/// rather than a `DashMap`: every write builds the next generation as a
/// whole new map and swaps it in under a single lock acquisition, so a
/// reader's `get`/`list` either sees the entire pre-install map or the
/// entire post-install one — never a state with some of a plugin's
/// descriptors visible and others not — per the single-writer/
/// many-reader discipline and all-or-nothing installation spec.md §5
/// and §4.8 require.
#[derive(Default)]
pub struct Registry {
    handlers: RwLock<Arc<HandlerMap>>,
    /// Serializes writers; readers only ever take the (cheap, `Arc`-clone)
    /// read side of `handlers`.
    write_lock: Mutex<()>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts every descriptor in `handlers` atomically with respect to
    /// lookups: the next map generation is built locally, off to the
    /// side, from a clone of the current one, and only published via a
    /// single `RwLock` write once complete — once this call returns,
    /// either all of `handlers` are visible to readers or none are.
    pub fn register_all(&self, handlers: Vec<HandlerDescriptor>) {
        let _guard = self.write_lock.lock();
        let mut next = (*self.snapshot()).clone();
        for handler in handlers {
            next.insert((handler.kind, handler.name.clone()), handler);
        }
        *self.handlers.write() = Arc::new(next);
    }

    /// Removes every handler owned by `plugin_name`, used on unload and
    /// hot-reload.
    pub fn remove_plugin(&self, plugin_name: &str) {
        let _guard = self.write_lock.lock();
        let mut next = (*self.snapshot()).clone();
        next.retain(|_, handler| handler.owner_plugin != plugin_name);
        *self.handlers.write() = Arc::new(next);
    }

    /// Removes a single `(kind, name)` entry, used by
    /// [`crate::manager::PluginManager`] to apply a `lastWins`/`priority`
    /// conflict resolution against one incumbent descriptor without
    /// touching the rest of its owning plugin's registrations.
    pub fn remove_one(&self, kind: RequestKind, name: &str) {
        let _guard = self.write_lock.lock();
        let mut next = (*self.snapshot()).clone();
        next.remove(&(kind, name.to_string()));
        *self.handlers.write() = Arc::new(next);
    }

    pub fn get(&self, kind: RequestKind, name: &str) -> SkerResult<HandlerDescriptor> {
        self.snapshot()
            .get(&(kind, name.to_string()))
            .cloned()
            .ok_or_else(|| SkerError::NotFound {
                kind: kind.label(),
                name: name.to_string(),
            })
    }

    pub fn list(&self, kind: RequestKind) -> Vec<serde_json::Value> {
        self.snapshot()
            .iter()
            .filter(|(key, _)| key.0 == kind)
            .map(|(_, handler)| handler.manifest_entry())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    /// A consistent, momentary view of the live map — one `Arc` clone
    /// under a brief read lock, never a partial map under a lock held
    /// across the whole iteration.
    fn snapshot(&self) -> Arc<HandlerMap> {
        Arc::clone(&self.handlers.read())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc as StdArc;
    use tower::util::BoxCloneSyncService;

    fn handler(name: &str) -> HandlerDescriptor {
        HandlerDescriptor::new(
            RequestKind::Tool,
            name,
            None,
            serde_json::json!({}),
            "test-plugin",
            BoxCloneSyncService::new(tower::service_fn(|ctx: StdArc<sker_core::RequestContext>| async move {
                Ok(ctx.arguments.clone())
            })),
        )
    }

    #[test]
    fn register_all_makes_every_descriptor_visible_together() {
        let registry = Registry::new();
        registry.register_all(vec![handler("a"), handler("b"), handler("c")]);
        assert_eq!(registry.list(RequestKind::Tool).len(), 3);
        assert!(registry.get(RequestKind::Tool, "a").is_ok());
        assert!(registry.get(RequestKind::Tool, "b").is_ok());
        assert!(registry.get(RequestKind::Tool, "c").is_ok());
    }

    #[test]
    fn a_reader_snapshot_is_unaffected_by_a_later_write() {
        let registry = Registry::new();
        registry.register_all(vec![handler("a")]);
        let before = registry.snapshot();
        registry.register_all(vec![handler("b")]);
        // The snapshot taken before the second install still reports only
        // the first generation — it was never mutated in place.
        assert_eq!(before.len(), 1);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn remove_plugin_drops_only_that_plugins_handlers() {
        let registry = Registry::new();
        registry.register_all(vec![handler("a")]);
        registry.register_all(vec![HandlerDescriptor::new(
            RequestKind::Tool,
            "b",
            None,
            serde_json::json!({}),
            "other-plugin",
            BoxCloneSyncService::new(tower::service_fn(|ctx: StdArc<sker_core::RequestContext>| async move {
                Ok(ctx.arguments.clone())
            })),
        )]);
        registry.remove_plugin("test-plugin");
        assert!(registry.get(RequestKind::Tool, "a").is_err());
        assert!(registry.get(RequestKind::Tool, "b").is_ok());
    }
}
