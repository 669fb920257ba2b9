//! Demo plugin exposing an in-memory key-value store as MCP resources.
//! Declares `isolation_level = "full"` and an empty `[mcp.permissions]`
//! table, so it never touches the parent container — exercises the
//! loader's isolation path at the opposite end of the spectrum from
//! `echo-tools`.
//!
//! Resource lookup in this engine is a flat `(kind, name)` table (spec.md
//! §4.8), so each key is registered as its own `kv://<key>` descriptor at
//! load time rather than served behind one URI-template handler.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use sker_core::{RequestContext, RequestKind, SkerResult};
use sker_framework::plugin::PluginLifecycle;
use sker_framework::{Container, HandlerDescriptor};
use sker_macros::plugin_definition;
use tower::util::BoxCloneSyncService;

/// Seeded with a couple of entries so `kv://greeting` resolves out of the
/// box without a prior write.
struct KvStore {
    entries: RwLock<HashMap<String, String>>,
}

impl KvStore {
    fn seeded() -> Arc<Self> {
        let mut entries = HashMap::new();
        entries.insert("greeting".to_string(), "hello from kv-resource".to_string());
        entries.insert("version".to_string(), env!("CARGO_PKG_VERSION").to_string());
        Arc::new(Self {
            entries: RwLock::new(entries),
        })
    }

    /// Builds one resource descriptor per currently-seeded key, closed
    /// over a shared handle to this store so later writes (were a `put`
    /// handler added) would still be visible to in-flight readers.
    fn descriptors(self: &Arc<Self>) -> Vec<HandlerDescriptor> {
        self.entries
            .read()
            .keys()
            .map(|key| {
                let store = Arc::clone(self);
                let uri = format!("kv://{key}");
                let key = key.clone();
                HandlerDescriptor::new(
                    RequestKind::Resource,
                    uri.clone(),
                    Some(format!("the value stored at {uri}")),
                    serde_json::json!({}),
                    "kv-resource",
                    BoxCloneSyncService::new(tower::service_fn(move |_ctx: Arc<RequestContext>| {
                        let store = Arc::clone(&store);
                        let key = key.clone();
                        async move {
                            Ok(store
                                .entries
                                .read()
                                .get(&key)
                                .cloned()
                                .map(serde_json::Value::String)
                                .unwrap_or(serde_json::Value::Null))
                        }
                    })),
                )
            })
            .collect()
    }
}

struct KvLifecycle {
    store: Arc<KvStore>,
}

impl KvLifecycle {
    fn new() -> Self {
        Self {
            store: KvStore::seeded(),
        }
    }
}

#[async_trait]
impl PluginLifecycle for KvLifecycle {
    async fn on_load(&self, _container: &Arc<Container>) -> SkerResult<Vec<HandlerDescriptor>> {
        Ok(self.store.descriptors())
    }

    async fn on_unload(&self) -> SkerResult<()> {
        Ok(())
    }
}

plugin_definition!(KvLifecycle::new());
