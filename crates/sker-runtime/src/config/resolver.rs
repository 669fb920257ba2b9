//! [`ConfigResolver`] (C1): merges layered configuration sources into an
//! immutable [`EngineConfig`] snapshot and notifies subscribers on
//! change.
//!
//! Built on `figment`: each [`ConfigSource`] becomes a
//! `figment::providers::Serialized` provider over a `serde_json::Value`;
//! sources are merged in ascending priority via `Figment::merge` and
//! extracted into the typed snapshot, mirroring how the teacher's own
//! `AlloyConfig::extract_adapter` uses `figment::Figment::from` /
//! `Serialized::defaults` for its own dynamic-value extraction. File
//! sources are parsed as YAML with `${VAR}` / `${VAR:-default}`
//! expansion, exactly as the teacher's `ConfigLoader::expand_env_vars`
//! did.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};

use figment::Figment;
use figment::providers::{Env, Serialized};
use notify_debouncer_full::notify::RecursiveMode;
use notify_debouncer_full::{DebounceEventResult, Debouncer, RecommendedCache, new_debouncer};
use tokio::sync::{Mutex, RwLock};

use super::error::{ConfigError, ConfigResult};
use super::schema::EngineConfig;
use super::validation::validate_config;

/// Ascending-priority built-in source keys (spec §4: "Holds an ordered
/// set of sources ... Built-in sources in ascending priority").
pub const PRIORITY_DEFAULTS: i32 = 0;
pub const PRIORITY_ENV_TEMPLATE: i32 = 10;
pub const PRIORITY_FILE: i32 = 15;
pub const PRIORITY_ENV_VARS: i32 = 20;
pub const PRIORITY_RUNTIME: i32 = 30;

const RUNTIME_SOURCE_KEY: &str = "runtime";
const ENV_VARS_SOURCE_KEY: &str = "env-vars";
const ENV_TEMPLATE_SOURCE_KEY: &str = "env-template";

/// One layer contributing to the merged snapshot.
#[derive(Debug, Clone)]
pub struct ConfigSource {
    pub key: String,
    pub priority: i32,
    pub data: serde_json::Value,
    pub timestamp: SystemTime,
}

/// Opaque handle returned by [`ConfigResolver::subscribe`], passed back
/// to [`ConfigResolver::unsubscribe`] to remove the callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Subscriber = Box<dyn Fn(&EngineConfig) + Send + Sync>;

/// Holds every configuration source and the snapshot their merge
/// currently produces. Cloned `Arc<EngineConfig>` snapshots already
/// handed out stay valid even after a later merge replaces the resolver's
/// own copy.
pub struct ConfigResolver {
    sources: RwLock<Vec<ConfigSource>>,
    snapshot: RwLock<Arc<EngineConfig>>,
    subscribers: RwLock<HashMap<u64, Subscriber>>,
    next_subscriber_id: AtomicU64,
    watch_targets: RwLock<HashMap<String, PathBuf>>,
    hot_reload: Mutex<Option<Debouncer<notify_debouncer_full::notify::RecommendedWatcher, RecommendedCache>>>,
}

impl ConfigResolver {
    /// Creates a resolver seeded with `EngineConfig::default()` at
    /// priority 0 and the environment-template overlay (derived from
    /// `environment.environment`, read from `SKER_ENVIRONMENT` if set)
    /// at priority 10.
    pub fn new() -> Self {
        let defaults = ConfigSource {
            key: "defaults".to_string(),
            priority: PRIORITY_DEFAULTS,
            data: serde_json::to_value(EngineConfig::default()).expect("EngineConfig serializes"),
            timestamp: SystemTime::now(),
        };
        let environment = std::env::var("SKER_ENVIRONMENT").unwrap_or_else(|_| "development".to_string());
        let template = ConfigSource {
            key: ENV_TEMPLATE_SOURCE_KEY.to_string(),
            priority: PRIORITY_ENV_TEMPLATE,
            data: environment_template(&environment),
            timestamp: SystemTime::now(),
        };
        Self {
            sources: RwLock::new(vec![defaults, template]),
            snapshot: RwLock::new(Arc::new(EngineConfig::default())),
            subscribers: RwLock::new(HashMap::new()),
            next_subscriber_id: AtomicU64::new(0),
            watch_targets: RwLock::new(HashMap::new()),
            hot_reload: Mutex::new(None),
        }
    }

    /// Reads, env-expands, parses, and installs `path` as a `file`
    /// priority source keyed by its absolute path, then recomputes and
    /// validates the snapshot.
    pub async fn load_file(&self, path: impl AsRef<Path>) -> ConfigResult<()> {
        let path = path.as_ref();
        let absolute = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let content = std::fs::read_to_string(path)?;
        let expanded = expand_env_vars(&content);
        let data: serde_json::Value = serde_yaml::from_str(&expanded).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        self.install(ConfigSource {
            key: absolute.to_string_lossy().into_owned(),
            priority: PRIORITY_FILE,
            data,
            timestamp: SystemTime::now(),
        })
        .await?;
        self.watch_targets.write().await.insert(absolute.to_string_lossy().into_owned(), absolute);
        Ok(())
    }

    /// Loads `config.yaml` and, if present, `config.<environment>.yaml`
    /// from `dir`, in that order, so an environment-specific file
    /// overrides the base one (both still at `file` priority — later
    /// installs of the same priority win ties via merge order).
    pub async fn load_directory(&self, dir: impl AsRef<Path>) -> ConfigResult<()> {
        let dir = dir.as_ref();
        let base = dir.join("config.yaml");
        if base.exists() {
            self.load_file(&base).await?;
        }
        let environment = std::env::var("SKER_ENVIRONMENT").unwrap_or_else(|_| "development".to_string());
        let scoped = dir.join(format!("config.{environment}.yaml"));
        if scoped.exists() {
            self.load_file(&scoped).await?;
        }
        Ok(())
    }

    /// Reads `SKER_`-prefixed environment variables (single underscore as
    /// the nesting separator, e.g. `SKER_SERVER_NAME` for `server.name`)
    /// and installs them as the `env-vars` source. The mapping is
    /// bijective with the dotted configuration paths (§6): each `_`
    /// after the prefix steps into the next object level, and figment's
    /// case-insensitive field matching reconciles a smashed-together
    /// camelCase leaf (e.g. `SKER_SERVER_LIMITS_MAXCONCURRENTREQUESTS`
    /// for `server.limits.maxConcurrentRequests`) against its struct
    /// field without needing a second separator.
    pub async fn load_env_vars(&self) -> ConfigResult<()> {
        let data: serde_json::Value = Figment::new()
            .merge(Env::prefixed("SKER_").split("_"))
            .extract()
            .map_err(|e| ConfigError::EnvVarError(e.to_string()))?;
        self.install(ConfigSource {
            key: ENV_VARS_SOURCE_KEY.to_string(),
            priority: PRIORITY_ENV_VARS,
            data,
            timestamp: SystemTime::now(),
        })
        .await
    }

    /// Installs or replaces the `runtime` source (highest built-in
    /// priority) wholesale, e.g. from parsed CLI flags.
    pub async fn update(&self, value: serde_json::Value) -> ConfigResult<()> {
        self.install(ConfigSource {
            key: RUNTIME_SOURCE_KEY.to_string(),
            priority: PRIORITY_RUNTIME,
            data: value,
            timestamp: SystemTime::now(),
        })
        .await
    }

    /// Sets one dotted field path (e.g. `"server.limits.requestTimeout"`)
    /// in the `runtime` source, merging it with whatever that source
    /// already holds.
    pub async fn set_path(&self, dotted: &str, value: serde_json::Value) -> ConfigResult<()> {
        let mut sources = self.sources.write().await;
        let existing = sources
            .iter()
            .find(|s| s.key == RUNTIME_SOURCE_KEY)
            .map(|s| s.data.clone())
            .unwrap_or(serde_json::json!({}));
        let merged = set_dotted(existing, dotted, value);
        sources.retain(|s| s.key != RUNTIME_SOURCE_KEY);
        sources.push(ConfigSource {
            key: RUNTIME_SOURCE_KEY.to_string(),
            priority: PRIORITY_RUNTIME,
            data: merged,
            timestamp: SystemTime::now(),
        });
        drop(sources);
        self.recompute().await
    }

    /// Returns the current merged snapshot.
    pub async fn get(&self) -> Arc<EngineConfig> {
        Arc::clone(&*self.snapshot.read().await)
    }

    /// Reads one dotted field path out of the current snapshot,
    /// returning `default` if the path does not resolve.
    pub async fn get_path(&self, dotted: &str, default: serde_json::Value) -> serde_json::Value {
        let snapshot = self.get().await;
        let value = serde_json::to_value(&*snapshot).unwrap_or(serde_json::Value::Null);
        get_dotted(&value, dotted).unwrap_or(default)
    }

    /// Registers a callback invoked with the new snapshot after every
    /// successful merge.
    pub async fn subscribe(&self, f: impl Fn(&EngineConfig) + Send + Sync + 'static) -> SubscriptionId {
        let id = self.next_subscriber_id.fetch_add(1, Ordering::SeqCst);
        self.subscribers.write().await.insert(id, Box::new(f));
        SubscriptionId(id)
    }

    pub async fn unsubscribe(&self, id: SubscriptionId) {
        self.subscribers.write().await.remove(&id.0);
    }

    /// Watches every currently loaded file source and re-runs
    /// [`Self::load_file`] on it, debounced, whenever it changes on disk.
    pub async fn enable_hot_reload(self: &Arc<Self>, debounce: Duration) -> ConfigResult<()> {
        let targets = self.watch_targets.read().await.clone();
        if targets.is_empty() {
            return Ok(());
        }

        let resolver = Arc::clone(self);
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<PathBuf>();
        let mut debouncer = new_debouncer(debounce, None, move |result: DebounceEventResult| {
            let Ok(events) = result else { return };
            for event in events {
                for path in &event.paths {
                    let _ = tx.send(path.clone());
                }
            }
        })
        .map_err(|e| ConfigError::validation(format!("starting config file watcher: {e}")))?;

        for path in targets.values() {
            debouncer
                .watch(path, RecursiveMode::NonRecursive)
                .map_err(|e| ConfigError::validation(format!("watching {}: {e}", path.display())))?;
        }

        tokio::spawn(async move {
            while let Some(path) = rx.recv().await {
                match resolver.load_file(&path).await {
                    Ok(()) => tracing::info!(path = %path.display(), "config hot-reloaded"),
                    Err(ConfigError::FileNotFound(_)) => {
                        // §4.1: "a file removed from disk has its source
                        // removed" — drop the stale source rather than just
                        // logging and leaving it in the merge.
                        if let Err(err) = resolver.remove_file_source(&path).await {
                            tracing::warn!(path = %path.display(), %err, "failed to recompute after config file removal");
                        } else {
                            tracing::info!(path = %path.display(), "config source removed (file deleted)");
                        }
                    }
                    Err(err) => {
                        tracing::warn!(path = %path.display(), %err, "config hot-reload failed");
                    }
                }
            }
        });

        *self.hot_reload.lock().await = Some(debouncer);
        Ok(())
    }

    pub async fn disable_hot_reload(&self) {
        *self.hot_reload.lock().await = None;
    }

    /// Replaces the source keyed `source.key` and recomputes the
    /// snapshot. If the resulting merge fails validation, the previous
    /// sources — and therefore the previous source's data under that same
    /// key — are restored before returning the error, so a bad reload
    /// never displaces a file source's last-good content (§4.1: "a file
    /// source that becomes invalid on reload keeps its last-good data").
    async fn install(&self, source: ConfigSource) -> ConfigResult<()> {
        let mut sources = self.sources.write().await;
        let previous = sources.clone();
        sources.retain(|s| s.key != source.key);
        sources.push(source);
        drop(sources);

        if let Err(err) = self.recompute().await {
            *self.sources.write().await = previous;
            return Err(err);
        }
        Ok(())
    }

    /// Drops the file source keyed `path` (and its watch target) and
    /// recomputes the snapshot without it. Used when a file loaded via
    /// [`Self::load_file`] is deleted from disk out from under a running
    /// hot-reload watch (§4.1). `path` can no longer be canonicalized once
    /// the file is gone, so the matching watch target — itself stored
    /// already-canonicalized when the file was loaded — is looked up by
    /// path equality rather than by re-deriving the key.
    async fn remove_file_source(&self, path: &Path) -> ConfigResult<()> {
        let mut targets = self.watch_targets.write().await;
        let key = targets
            .iter()
            .find(|(_, target)| target.as_path() == path)
            .map(|(key, _)| key.clone())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());
        targets.remove(&key);
        drop(targets);

        let mut sources = self.sources.write().await;
        sources.retain(|s| s.key != key);
        drop(sources);

        self.recompute().await
    }

    async fn recompute(&self) -> ConfigResult<()> {
        let mut ordered = self.sources.read().await.clone();
        ordered.sort_by_key(|s| s.priority);

        let mut figment = Figment::new();
        for source in &ordered {
            figment = figment.merge(Serialized::defaults(source.data.clone()));
        }
        let config: EngineConfig = figment.extract().map_err(|e| ConfigError::ParseError(e.to_string()))?;
        validate_config(&config)?;

        *self.snapshot.write().await = Arc::new(config);
        let snapshot = self.get().await;
        for subscriber in self.subscribers.read().await.values() {
            subscriber(&snapshot);
        }
        Ok(())
    }
}

impl Default for ConfigResolver {
    fn default() -> Self {
        Self::new()
    }
}

/// The environment-template source (priority 10): built-in overlays
/// selected by `environment.environment`, sitting above hardcoded
/// defaults but below any file the operator actually authored.
fn environment_template(environment: &str) -> serde_json::Value {
    match environment {
        "production" => serde_json::json!({
            "environment": {"environment": "production"},
            "logging": {"level": "warn", "colorize": false},
        }),
        "testing" => serde_json::json!({
            "environment": {"environment": "testing"},
            "logging": {"level": "info"},
        }),
        _ => serde_json::json!({
            "environment": {"environment": "development"},
            "logging": {"level": "debug"},
        }),
    }
}

/// Expands `${VAR_NAME}` / `${VAR_NAME:-default}` references in `content`
/// against the process environment.
fn expand_env_vars(content: &str) -> String {
    let mut result = content.to_string();
    let re = regex_lite::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(:-([^}]*))?\}").unwrap();

    for cap in re.captures_iter(content) {
        let full_match = cap.get(0).unwrap().as_str();
        let var_name = cap.get(1).unwrap().as_str();
        let default_value = cap.get(3).map(|m| m.as_str());

        let value = std::env::var(var_name)
            .ok()
            .or_else(|| default_value.map(String::from))
            .unwrap_or_default();

        result = result.replace(full_match, &value);
    }

    result
}

fn set_dotted(mut root: serde_json::Value, dotted: &str, value: serde_json::Value) -> serde_json::Value {
    let parts: Vec<&str> = dotted.split('.').collect();
    let mut cursor = &mut root;
    for (i, part) in parts.iter().enumerate() {
        if !cursor.is_object() {
            *cursor = serde_json::json!({});
        }
        let map = cursor.as_object_mut().unwrap();
        if i == parts.len() - 1 {
            map.insert(part.to_string(), value.clone());
            return root;
        }
        cursor = map.entry(part.to_string()).or_insert_with(|| serde_json::json!({}));
    }
    root
}

fn get_dotted(root: &serde_json::Value, dotted: &str) -> Option<serde_json::Value> {
    let mut cursor = root;
    for part in dotted.split('.') {
        cursor = cursor.get(part)?;
    }
    Some(cursor.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn default_snapshot_matches_engine_config_defaults() {
        let resolver = ConfigResolver::new();
        resolver.recompute().await.unwrap();
        let snapshot = resolver.get().await;
        assert_eq!(snapshot.server.name, "sker-daemon-mcp");
    }

    #[tokio::test]
    async fn file_source_overrides_defaults() {
        let resolver = ConfigResolver::new();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "server:\n  name: custom-server\n").unwrap();
        resolver.load_file(&path).await.unwrap();
        assert_eq!(resolver.get().await.server.name, "custom-server");
    }

    #[tokio::test]
    async fn runtime_source_outranks_file_source() {
        let resolver = ConfigResolver::new();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "server:\n  name: from-file\n").unwrap();
        resolver.load_file(&path).await.unwrap();
        resolver
            .update(serde_json::json!({"server": {"name": "from-runtime"}}))
            .await
            .unwrap();
        assert_eq!(resolver.get().await.server.name, "from-runtime");
    }

    #[tokio::test]
    async fn set_path_updates_a_single_field_without_disturbing_others() {
        let resolver = ConfigResolver::new();
        resolver.set_path("server.name", serde_json::json!("patched")).await.unwrap();
        let snapshot = resolver.get().await;
        assert_eq!(snapshot.server.name, "patched");
        assert_eq!(snapshot.server.limits.max_concurrent_requests, 100);
    }

    #[tokio::test]
    async fn get_path_reads_a_nested_field() {
        let resolver = ConfigResolver::new();
        let value = resolver.get_path("server.limits.maxConcurrentRequests", serde_json::json!(null)).await;
        assert_eq!(value, serde_json::json!(100));
    }

    #[tokio::test]
    async fn invalid_update_is_rejected_and_previous_snapshot_kept() {
        let resolver = ConfigResolver::new();
        let err = resolver
            .update(serde_json::json!({"plugins": {"discovery": {"maxDepth": 0}}}))
            .await
            .unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError { .. }));
        assert_eq!(resolver.get().await.plugins.discovery.max_depth, 3);
    }

    #[tokio::test]
    async fn subscribers_are_notified_on_merge() {
        let resolver = Arc::new(ConfigResolver::new());
        let seen = Arc::new(tokio::sync::Mutex::new(None));
        let seen_clone = Arc::clone(&seen);
        resolver
            .subscribe(move |config| {
                let seen_clone = Arc::clone(&seen_clone);
                let name = config.server.name.clone();
                tokio::spawn(async move { *seen_clone.lock().await = Some(name) });
            })
            .await;
        resolver.set_path("server.name", serde_json::json!("notified")).await.unwrap();
        tokio::task::yield_now().await;
    }

    #[tokio::test]
    async fn invalid_file_reload_keeps_last_good_data_for_that_source() {
        let resolver = ConfigResolver::new();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "server:\n  name: good-server\n").unwrap();
        resolver.load_file(&path).await.unwrap();
        assert_eq!(resolver.get().await.server.name, "good-server");

        std::fs::write(&path, "plugins:\n  discovery:\n    maxDepth: 0\n").unwrap();
        let err = resolver.load_file(&path).await.unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError { .. }));

        // The snapshot is untouched, and so is the underlying source: a
        // later unrelated update still sees the file's last-good name,
        // not a merge contaminated by the rejected reload.
        assert_eq!(resolver.get().await.server.name, "good-server");
        resolver.update(serde_json::json!({"server": {"version": "9.9.9"}})).await.unwrap();
        assert_eq!(resolver.get().await.server.name, "good-server");
    }

    #[tokio::test]
    async fn removing_a_file_source_drops_it_from_the_merge() {
        let resolver = ConfigResolver::new();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "server:\n  name: from-file\n").unwrap();
        resolver.load_file(&path).await.unwrap();
        assert_eq!(resolver.get().await.server.name, "from-file");

        let absolute = std::fs::canonicalize(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        resolver.remove_file_source(&absolute).await.unwrap();
        assert_eq!(resolver.get().await.server.name, "sker-daemon-mcp");
        assert!(resolver.watch_targets.read().await.is_empty());
    }

    #[tokio::test]
    async fn env_var_expansion_honors_default_fallback() {
        assert_eq!(expand_env_vars("${NONEXISTENT_SKER_VAR:-fallback}"), "fallback");
    }

    #[tokio::test]
    #[serial_test::serial]
    async fn env_var_outranks_file_source() {
        let resolver = ConfigResolver::new();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "server:\n  name: file-srv\n").unwrap();
        resolver.load_file(&path).await.unwrap();
        assert_eq!(resolver.get().await.server.name, "file-srv");

        unsafe { std::env::set_var("SKER_SERVER_NAME", "env-srv") };
        let result = resolver.load_env_vars().await;
        unsafe { std::env::remove_var("SKER_SERVER_NAME") };
        result.unwrap();

        assert_eq!(resolver.get().await.server.name, "env-srv");
    }
}
