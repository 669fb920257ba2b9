//! [`PluginManager`] — the orchestrator tying discovery, isolation,
//! conflict detection, the registry, and the error-handler chain into the
//! `sker_core::Dispatcher` a transport drives.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use sker_core::{Dispatcher, InboundRequest, RequestContext, RequestKind, SkerError, SkerResult};
use tracing::Instrument;
use uuid::Uuid;

use crate::conflict::{self, PluginSummary};
use crate::container::Container;
use crate::isolation::{Bridge, IsolationLevel};
use crate::loader::{self, DiscoveredPlugin};
use crate::plugin::{Plugin, PluginState};
use crate::registry::Registry;

/// How a registration collision between two plugins' handlers is
/// resolved (§4.7). An alias of [`conflict::ResolutionStrategy`] kept
/// under its historical name at this layer, since callers configuring a
/// [`PluginManager`] think of it as "how do handler collisions get
/// resolved" rather than in terms of the conflict detector's own
/// vocabulary.
pub type ConflictResolution = conflict::ResolutionStrategy;

/// Tuning knobs for a [`PluginManager`], sourced from the `plugins.*` and
/// `server.limits.*` config paths (§6).
pub struct PluginManagerConfig {
    pub resolution_strategy: ConflictResolution,
    /// Plugin names in descending priority order, consulted only under
    /// `ConflictResolution::Priority`.
    pub plugin_priorities: Vec<String>,
    pub max_concurrent_requests: usize,
    pub request_timeout: Duration,
}

impl Default for PluginManagerConfig {
    fn default() -> Self {
        Self {
            resolution_strategy: ConflictResolution::default(),
            plugin_priorities: Vec::new(),
            max_concurrent_requests: 100,
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Owns the plugin table, the registry, and the root container; drives
/// every load/unload/reload and implements [`Dispatcher`] for the
/// transport layer to call into.
pub struct PluginManager {
    root: Arc<Container>,
    registry: Arc<Registry>,
    plugins: DashMap<String, Arc<Plugin>>,
    load_order: RwLock<Vec<String>>,
    config: PluginManagerConfig,
    semaphore: Arc<tokio::sync::Semaphore>,
    /// Contexts of requests currently executing, so a shutdown can signal
    /// cooperative cancellation to every one of them (§5, §7: "A shutdown
    /// in progress drains in-flight dispatches ... then cancels the
    /// rest"). Entries are removed by [`InFlightGuard`] when their
    /// dispatch completes.
    in_flight: DashMap<Uuid, Arc<RequestContext>>,
}

impl PluginManager {
    pub fn new(root: Arc<Container>, config: PluginManagerConfig) -> Self {
        let semaphore = Arc::new(tokio::sync::Semaphore::new(config.max_concurrent_requests));
        Self {
            root,
            registry: Arc::new(Registry::new()),
            plugins: DashMap::new(),
            load_order: RwLock::new(Vec::new()),
            config,
            semaphore,
            in_flight: DashMap::new(),
        }
    }

    /// Signals cooperative cancellation (reason: shutdown) to every
    /// request currently in flight, without waiting for any of them to
    /// observe it or abort their own futures — the dispatcher never
    /// forcibly terminates a running task (§5).
    pub fn cancel_in_flight(&self) {
        for entry in self.in_flight.iter() {
            entry.value().cancel.cancel();
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn root_container(&self) -> &Arc<Container> {
        &self.root
    }

    pub fn loaded_plugins(&self) -> Vec<String> {
        self.load_order.read().clone()
    }

    pub fn plugin_state(&self, name: &str) -> Option<PluginState> {
        self.plugins.get(name).map(|p| p.state())
    }

    /// The error from `name`'s most recent failed load/reload attempt, if
    /// its slot is currently in [`PluginState::Failed`].
    pub fn plugin_last_error(&self, name: &str) -> Option<String> {
        self.plugins.get(name).and_then(|p| p.last_error())
    }

    /// Discovers every plugin directory under `plugins_dir`, recursing up
    /// to `max_depth` levels down, and loads each, continuing past
    /// individual load failures — the same policy `loader::discover`
    /// applies to malformed manifests.
    pub async fn load_all(&self, plugins_dir: &Path, max_depth: u32) -> SkerResult<Vec<String>> {
        let discovered = loader::discover(plugins_dir, max_depth)?;

        // A lightweight, pre-`dlopen` pass over the whole batch: catches
        // two manifests declaring the identical name/version tuple, or
        // pointing at the same library file, before either is loaded —
        // the per-candidate checks inside `load_plugin` only ever see one
        // candidate against the already-*enabled* set (§4.7 `detect_batch`).
        let batch_summaries: Vec<PluginSummary> = discovered
            .iter()
            .map(|d| PluginSummary {
                name: d.manifest.name.clone(),
                version: d.manifest.version.clone(),
                depends_on: d.manifest.mcp.depends_on.clone(),
                handlers: Vec::new(),
                mcp_version_req: d.manifest.mcp.compatibility.mcp_version.clone(),
                isolation_level: d.manifest.mcp.isolation_level,
                library_path: Some(d.directory.join(d.manifest.library_file_name())),
            })
            .collect();
        for conflict in conflict::ConflictDetector::new().detect_batch(&batch_summaries) {
            tracing::warn!(
                conflict_type = ?conflict.conflict_type,
                severity = ?conflict.severity,
                plugins = ?conflict.plugins,
                description = %conflict.description,
                "conflict detected within discovery batch"
            );
        }

        let mut loaded = Vec::new();
        for candidate in discovered {
            let name = candidate.manifest.name.clone();
            match self.load_plugin(candidate).await {
                Ok(name) => loaded.push(name),
                Err(err) => {
                    tracing::warn!(plugin = %name, error = %err, "plugin load failed");
                }
            }
        }
        Ok(loaded)
    }

    fn summaries(&self) -> Vec<PluginSummary> {
        self.plugins
            .iter()
            .filter(|entry| entry.value().state() == PluginState::Enabled)
            .map(|entry| {
                let plugin = entry.value();
                PluginSummary {
                    name: plugin.metadata.name.clone(),
                    version: plugin.metadata.version.clone(),
                    depends_on: plugin.depends_on.clone(),
                    handlers: plugin
                        .handlers
                        .iter()
                        .map(|h| (h.kind, h.name.clone()))
                        .collect(),
                    mcp_version_req: None,
                    isolation_level: plugin.isolation_level,
                    library_path: plugin.library_path.clone(),
                }
            })
            .collect()
    }

    /// Loads one discovered plugin: `dlopen`s its library, builds its
    /// isolated container, runs its `on_load` hook, resolves conflicts
    /// against the currently active set, and — only once the whole
    /// process succeeds — installs its surviving descriptors atomically
    /// in the registry (§4.5 steps 2–7). Any failure leaves the registry
    /// and plugin table exactly as they were before the call.
    pub async fn load_plugin(&self, discovered: DiscoveredPlugin) -> SkerResult<String> {
        let name = discovered.manifest.name.clone();
        let already_active = self
            .plugins
            .get(&name)
            .map(|existing| existing.state() == PluginState::Enabled)
            .unwrap_or(false);
        if already_active {
            return Err(SkerError::Conflict(format!(
                "plugin '{name}' is already loaded"
            )));
        }

        let loaded = loader::load_library(&discovered)?;
        let library_path = discovered.directory.join(discovered.manifest.library_file_name());

        let level = discovered.manifest.mcp.isolation_level;
        let container = match level {
            IsolationLevel::None => Container::child_of(&self.root),
            _ => {
                let bridge = Bridge::new(
                    Arc::clone(&self.root),
                    level,
                    discovered.manifest.effective_permissions(),
                );
                bridge.into_container()
            }
        };

        let lifecycle = loaded.factory_output.lifecycle;
        let mut handlers = match &lifecycle {
            Some(hook) => hook.on_load(&container).await,
            None => Ok(Vec::new()),
        }
        .inspect_err(|err| {
            tracing::error!(plugin = %name, %err, "plugin on_load hook failed");
        })?;

        let candidate = PluginSummary {
            name: name.clone(),
            version: discovered.manifest.version.clone(),
            depends_on: discovered.manifest.mcp.depends_on.clone(),
            handlers: handlers.iter().map(|h| (h.kind, h.name.clone())).collect(),
            mcp_version_req: discovered.manifest.mcp.compatibility.mcp_version.clone(),
            isolation_level: level,
            library_path: Some(library_path.clone()),
        };
        let existing = self.summaries();

        if let Some(cycle) = conflict::check_circular(&candidate, &existing) {
            return Err(cycle.to_sker_error());
        }
        if let Some(incompatible) = conflict::check_version(&candidate) {
            return Err(incompatible.to_sker_error());
        }
        for informational in conflict::check_service_class(&candidate, &existing) {
            tracing::warn!(
                plugin = %name,
                severity = ?informational.severity,
                description = %informational.description,
                "service-class conflict detected"
            );
        }

        let collisions = conflict::duplicate_handlers(&candidate, &existing);
        if !collisions.is_empty() {
            self.resolve_collisions(&name, &collisions, &mut handlers)?;
        }

        self.registry.register_all(handlers.clone());

        let plugin = Arc::new(Plugin::new(
            &discovered.manifest,
            container,
            handlers,
            lifecycle,
            Some(loaded.library),
            Some(library_path),
        ));
        plugin.set_state(PluginState::Enabled);
        self.plugins.insert(name.clone(), Arc::clone(&plugin));
        self.load_order.write().push(name.clone());
        tracing::info!(plugin = %name, "plugin loaded");
        Ok(name)
    }

    /// Applies the configured [`ConflictResolution`] to a set of
    /// detected duplicate-name collisions, mutating `handlers` in place
    /// and — for `LastWins`/`Priority` — evicting the losing side
    /// directly from the registry.
    fn resolve_collisions(
        &self,
        candidate_name: &str,
        collisions: &[(RequestKind, String, String)],
        handlers: &mut Vec<crate::handler::HandlerDescriptor>,
    ) -> SkerResult<()> {
        match self.config.resolution_strategy {
            ConflictResolution::Manual => Err(SkerError::Conflict(format!(
                "plugin '{candidate_name}' collides with existing registrations: {collisions:?}"
            ))),
            ConflictResolution::FirstWins => {
                let losers: HashSet<(RequestKind, String)> = collisions
                    .iter()
                    .map(|(kind, name, _)| (*kind, name.clone()))
                    .collect();
                handlers.retain(|h| !losers.contains(&(h.kind, h.name.clone())));
                Ok(())
            }
            ConflictResolution::LastWins => {
                for (kind, handler_name, _owner) in collisions {
                    self.registry.remove_one(*kind, handler_name);
                }
                Ok(())
            }
            ConflictResolution::Priority => {
                let rank = |plugin: &str| {
                    self.config
                        .plugin_priorities
                        .iter()
                        .position(|p| p == plugin)
                        .unwrap_or(usize::MAX)
                };
                let mut losers = Vec::new();
                for (kind, handler_name, owner) in collisions {
                    if rank(candidate_name) < rank(owner) {
                        self.registry.remove_one(*kind, handler_name);
                    } else {
                        losers.push((*kind, handler_name.clone()));
                    }
                }
                handlers.retain(|h| !losers.contains(&(h.kind, h.name.clone())));
                Ok(())
            }
        }
    }

    /// Unloads a plugin: runs its `on_unload` hook (errors logged, never
    /// propagated), removes every descriptor it owns from the registry,
    /// and drops its container and library handle (§4.5).
    pub async fn unload_plugin(&self, name: &str) -> SkerResult<()> {
        let Some((_, plugin)) = self.plugins.remove(name) else {
            return Err(SkerError::NotFound {
                kind: "plugin",
                name: name.to_string(),
            });
        };
        if let Err(err) = plugin.on_unload().await {
            tracing::error!(plugin = %name, %err, "plugin on_unload hook failed");
        }
        plugin.set_state(PluginState::Unloaded);
        self.registry.remove_plugin(name);
        self.load_order.write().retain(|n| n != name);
        tracing::info!(plugin = %name, "plugin unloaded");
        Ok(())
    }

    /// Unload, then load, the plugin found at `discovered`'s directory.
    /// An in-flight request against a descriptor from the previous load
    /// keeps running against the `Arc<HandlerDescriptor>` it already
    /// resolved — the registry swap only affects future lookups.
    ///
    /// If the load half fails, the previous version is already gone, but
    /// the plugin's table slot is *not*: a [`Plugin::failed`] placeholder
    /// is reinserted under the same name, in [`PluginState::Failed`],
    /// carrying the error that caused the reload to fail (§4.5, §9).
    pub async fn reload_plugin(&self, discovered: DiscoveredPlugin) -> SkerResult<String> {
        let name = discovered.manifest.name.clone();
        if self.plugins.contains_key(&name) {
            self.unload_plugin(&name).await?;
        }
        match self.load_plugin(discovered.clone()).await {
            Ok(name) => Ok(name),
            Err(err) => {
                let placeholder = Plugin::failed(
                    &name,
                    &discovered.manifest.version,
                    discovered.manifest.mcp.category.clone(),
                    err.to_string(),
                );
                self.plugins.insert(name.clone(), Arc::new(placeholder));
                Err(err)
            }
        }
    }

    /// Tears down every loaded plugin in reverse load order, collecting
    /// per-plugin errors without aborting the rest (§4.6 `cleanup`).
    /// Signals cancellation to every in-flight request, then tears down
    /// every loaded plugin in reverse load order, collecting per-plugin
    /// errors without aborting the rest (§4.6 `cleanup`, §7 "a shutdown
    /// in progress ... cancels the rest").
    pub async fn shutdown(&self) {
        self.cancel_in_flight();
        let order: Vec<String> = self.load_order.read().iter().rev().cloned().collect();
        for name in order {
            if let Err(err) = self.unload_plugin(&name).await {
                tracing::error!(plugin = %name, %err, "error during plugin shutdown");
            }
        }
    }
}

/// Removes a request's context from [`PluginManager::in_flight`] once its
/// dispatch completes (including early returns and panics), so the map
/// never accumulates entries for finished requests.
struct InFlightGuard<'a> {
    in_flight: &'a DashMap<Uuid, Arc<RequestContext>>,
    request_id: Uuid,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.in_flight.remove(&self.request_id);
    }
}

#[async_trait]
impl Dispatcher for PluginManager {
    /// Looks up the descriptor, validates arguments against its input
    /// schema, runs its middleware-wrapped handler racing the configured
    /// timeout, and — on any failure — consults the descriptor's own
    /// error-handler chain before the error reaches the transport
    /// (§4.11).
    ///
    /// The timeout never forcibly aborts the handler's future (§5: "the
    /// dispatcher never forcibly terminates a running task"): on elapse
    /// it signals `ctx.cancel` so any middleware or handler observing the
    /// token can wind itself down cooperatively, then returns a
    /// [`SkerError::Timeout`] immediately rather than waiting further.
    async fn dispatch(&self, request: InboundRequest) -> SkerResult<serde_json::Value> {
        let _permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| SkerError::Internal("dispatcher semaphore closed".into()))?;

        let descriptor = self.registry.get(request.kind, &request.name)?;
        let ctx = Arc::new(RequestContext::new(&request));
        self.in_flight.insert(ctx.request_id, Arc::clone(&ctx));
        let _in_flight_guard = InFlightGuard {
            in_flight: &self.in_flight,
            request_id: ctx.request_id,
        };

        // Entered once here, around the whole middleware-and-handler
        // call, rather than attached field-by-field at each logging call
        // site: every event emitted by middleware, the handler body, or
        // error handlers for this request inherits `request_id` (and
        // `user_id`, once an earlier transport-level middleware has
        // attached a `Principal`) for free. `Instrument` rather than
        // `Span::entered()` because the guard would otherwise need to
        // live across the `.await` points below, and `Entered` is
        // deliberately `!Send` to stop exactly that mistake.
        let span = ctx.span();
        if let Some(principal) = ctx.get::<crate::middleware::builtin::Principal>() {
            span.record("user_id", principal.subject.as_str());
        }

        async move {
            if let Err(err) = descriptor.validate_arguments(&request.arguments) {
                return descriptor.error_handlers.resolve(err, &ctx);
            }

            let call = descriptor.invoke(Arc::clone(&ctx));
            tokio::pin!(call);
            let result = tokio::select! {
                result = &mut call => result,
                _ = tokio::time::sleep(self.config.request_timeout) => {
                    ctx.cancel.cancel();
                    Err(SkerError::Timeout(self.config.request_timeout))
                }
            };

            match result {
                Ok(value) => Ok(value),
                Err(err) => descriptor.error_handlers.resolve(err, &ctx),
            }
        }
        .instrument(span)
        .await
    }

    fn list(&self, kind: RequestKind) -> Vec<serde_json::Value> {
        self.registry.list(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::HandlerDescriptor;
    use crate::plugin::{PluginFactoryOutput, PluginLifecycle};
    use sker_core::RequestKind;
    use std::io::Write;
    use tower::util::BoxCloneSyncService;

    struct EchoLifecycle;

    #[async_trait]
    impl PluginLifecycle for EchoLifecycle {
        async fn on_load(
            &self,
            _container: &Arc<Container>,
        ) -> SkerResult<Vec<HandlerDescriptor>> {
            let service = BoxCloneSyncService::new(tower::service_fn(
                |ctx: Arc<RequestContext>| async move { Ok(ctx.arguments.clone()) },
            ));
            Ok(vec![HandlerDescriptor::new(
                RequestKind::Tool,
                "echo",
                Some("echoes its arguments".into()),
                serde_json::json!({}),
                "echo-plugin",
                service,
            )])
        }

        async fn on_unload(&self) -> SkerResult<()> {
            Ok(())
        }
    }

    fn write_manifest(dir: &std::path::Path, name: &str) {
        std::fs::create_dir_all(dir).unwrap();
        let mut manifest = std::fs::File::create(dir.join("plugin.toml")).unwrap();
        writeln!(manifest, "name = \"{name}\"\nversion = \"1.0.0\"\n[mcp]").unwrap();
    }

    fn manager() -> PluginManager {
        PluginManager::new(Container::root(), PluginManagerConfig::default())
    }

    #[tokio::test]
    async fn dispatch_reports_method_not_found_for_unknown_tool() {
        let manager = manager();
        let err = manager
            .dispatch(InboundRequest {
                id: serde_json::json!(1),
                kind: RequestKind::Tool,
                name: "sum".into(),
                arguments: serde_json::json!({}),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, SkerError::NotFound { .. }));
    }

    #[tokio::test]
    async fn dispatches_to_an_installed_handler() {
        let manager = manager();
        manager.registry.register_all(vec![HandlerDescriptor::new(
            RequestKind::Tool,
            "echo",
            None,
            serde_json::json!({}),
            "echo-plugin",
            BoxCloneSyncService::new(tower::service_fn(
                |ctx: Arc<RequestContext>| async move { Ok(ctx.arguments.clone()) },
            )),
        )]);
        let result = manager
            .dispatch(InboundRequest {
                id: serde_json::json!(1),
                kind: RequestKind::Tool,
                name: "echo".into(),
                arguments: serde_json::json!({"a": 1}),
            })
            .await
            .unwrap();
        assert_eq!(result, serde_json::json!({"a": 1}));
    }

    #[tokio::test]
    async fn dispatch_timeout_signals_cancellation_instead_of_just_dropping_the_call() {
        let manager = PluginManager::new(
            Container::root(),
            PluginManagerConfig {
                request_timeout: Duration::from_millis(20),
                ..PluginManagerConfig::default()
            },
        );
        let captured: Arc<std::sync::Mutex<Option<Arc<RequestContext>>>> =
            Arc::new(std::sync::Mutex::new(None));
        let captured_clone = Arc::clone(&captured);
        manager.registry.register_all(vec![HandlerDescriptor::new(
            RequestKind::Tool,
            "slow",
            None,
            serde_json::json!({}),
            "slow-plugin",
            BoxCloneSyncService::new(tower::service_fn(move |ctx: Arc<RequestContext>| {
                let captured_clone = Arc::clone(&captured_clone);
                async move {
                    *captured_clone.lock().unwrap() = Some(Arc::clone(&ctx));
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok(serde_json::json!(null))
                }
            })),
        )]);

        let err = manager
            .dispatch(InboundRequest {
                id: serde_json::json!(1),
                kind: RequestKind::Tool,
                name: "slow".into(),
                arguments: serde_json::json!({}),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, SkerError::Timeout(_)));

        let ctx = captured
            .lock()
            .unwrap()
            .clone()
            .expect("handler ran before the timeout fired");
        assert!(ctx.cancel.is_cancelled());
    }

    #[tokio::test]
    async fn cancel_in_flight_wakes_a_handler_waiting_on_its_cancel_token() {
        let manager = Arc::new(manager());
        let ready = Arc::new(tokio::sync::Notify::new());
        let ready_clone = Arc::clone(&ready);
        manager.registry.register_all(vec![HandlerDescriptor::new(
            RequestKind::Tool,
            "slow",
            None,
            serde_json::json!({}),
            "slow-plugin",
            BoxCloneSyncService::new(tower::service_fn(move |ctx: Arc<RequestContext>| {
                let ready_clone = Arc::clone(&ready_clone);
                async move {
                    ready_clone.notify_one();
                    ctx.cancel.cancelled().await;
                    Ok(serde_json::json!(null))
                }
            })),
        )]);

        let manager_clone = Arc::clone(&manager);
        let handle = tokio::spawn(async move {
            manager_clone
                .dispatch(InboundRequest {
                    id: serde_json::json!(1),
                    kind: RequestKind::Tool,
                    name: "slow".into(),
                    arguments: serde_json::json!({}),
                })
                .await
        });

        // Wait for the handler to actually be running (and therefore
        // tracked in `in_flight`) before signaling cancellation.
        ready.notified().await;
        manager.cancel_in_flight();

        // The handler completes normally once it observes cancellation —
        // `cancel_in_flight` never aborts its task outright.
        let result = handle.await.unwrap();
        assert!(result.is_ok());
    }

    #[test]
    fn discovery_skips_manifests_that_fail_to_dlopen() {
        let dir = tempfile::tempdir().unwrap();
        write_manifest(&dir.path().join("no-library"), "no-library");
        let found = loader::discover(dir.path(), loader::DEFAULT_MAX_DEPTH).unwrap();
        assert_eq!(found.len(), 1);
        assert!(loader::load_library(&found[0]).is_err());
    }

    #[tokio::test]
    async fn failed_reload_leaves_a_failed_slot_instead_of_vanishing() {
        let manager = manager();
        let name = "no-library";
        let dir = tempfile::tempdir().unwrap();
        write_manifest(&dir.path().join(name), name);
        let discovered = loader::discover(dir.path(), loader::DEFAULT_MAX_DEPTH)
            .unwrap()
            .remove(0);

        // Simulate a previously `Enabled` plugin occupying this name's slot.
        let previous = Arc::new(Plugin::new(
            &discovered.manifest,
            Container::root(),
            Vec::new(),
            None,
            None,
            None,
        ));
        previous.set_state(PluginState::Enabled);
        manager.plugins.insert(name.to_string(), previous);
        manager.load_order.write().push(name.to_string());

        let err = manager.reload_plugin(discovered).await.unwrap_err();

        // The old version is gone (unloaded), but the slot is not: it is
        // reinstated as Failed with the error that caused the reload to
        // fail, so the plugin's name keeps resolving to something instead
        // of disappearing from the table (§4.5, §9).
        assert_eq!(manager.plugin_state(name), Some(PluginState::Failed));
        assert_eq!(manager.plugin_last_error(name), Some(err.to_string()));
        assert!(!manager.loaded_plugins().contains(&name.to_string()));
    }

    #[allow(dead_code)]
    fn lifecycle_compiles() -> Arc<dyn PluginLifecycle> {
        Arc::new(EchoLifecycle)
    }

    #[allow(dead_code)]
    fn factory_output_compiles() -> PluginFactoryOutput {
        PluginFactoryOutput {
            lifecycle: Some(Arc::new(EchoLifecycle)),
        }
    }
}
