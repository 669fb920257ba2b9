//! `skerd` — the host process binary.
//!
//! A thin `clap`-based shim wiring the ambient stack up in the documented
//! order (Config Resolver → Logger Factory → root Container → Plugin
//! Loader → Dispatcher → Hot-Reload Watcher) and driving it through an
//! [`ApplicationLifecycle`] until a shutdown signal arrives. This is the
//! only place in the workspace allowed to call `std::process::exit`.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use parking_lot::Mutex;
use sker_framework::loader;
use sker_framework::manager::{ConflictResolution, PluginManager, PluginManagerConfig};
use sker_framework::{Container, HotReloadWatcher};
use sker_runtime::config::ConfigResolver;
use sker_runtime::logging::LoggerFactory;
use sker_runtime::runtime::{ApplicationLifecycle, LifecycleStep, RuntimeError};
use sker_transport::StdioTransport;
#[cfg(feature = "http-transport")]
use sker_transport::HttpTransport;
use sker_core::Dispatcher;

/// A pluggable, isolated, hot-reloadable Model Context Protocol host.
#[derive(Parser, Debug)]
#[command(name = "skerd", version, about)]
struct Cli {
    /// Path to a config file or directory (repeatable; later entries
    /// override earlier ones in the merge, same as `ConfigResolver::load_file`/
    /// `load_directory`).
    #[arg(long = "config", value_name = "PATH")]
    config: Vec<PathBuf>,

    /// Root directory to discover plugins under, overriding
    /// `plugins.discovery.directories` from config.
    #[arg(long = "plugins-dir", value_name = "DIR")]
    plugins_dir: Option<PathBuf>,

    /// Keep running even if one or more discovered plugins fail to load,
    /// instead of aborting startup once any candidate fails.
    #[arg(long)]
    allow_invalid_manifests: bool,

    /// Watch plugin directories and hot-reload on change, overriding
    /// `plugins.discovery.watch` from config.
    #[arg(long)]
    watch: bool,
}

fn step_err(context: &'static str) -> impl Fn(sker_core::SkerError) -> RuntimeError {
    move |err| RuntimeError(format!("{context}: {err}"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let resolver = Arc::new(ConfigResolver::new());
    for path in &cli.config {
        if path.is_dir() {
            resolver.load_directory(path).await
        } else {
            resolver.load_file(path).await
        }
        .with_context(|| format!("loading config from {}", path.display()))?;
    }
    resolver
        .load_env_vars()
        .await
        .context("loading SKER_* environment overrides")?;

    let config = resolver.get().await;
    let _logging = LoggerFactory::try_init(&config.logging)
        .map_err(|err| anyhow::anyhow!("initializing logger factory: {err}"))?;

    tracing::info!(server = %config.server.name, version = %config.server.version, "starting skerd");

    let root = Container::root();
    let manager_config = PluginManagerConfig {
        resolution_strategy: ConflictResolution::default(),
        plugin_priorities: Vec::new(),
        max_concurrent_requests: config.server.limits.max_concurrent_requests,
        request_timeout: config.server.limits.request_timeout(),
    };
    let manager = Arc::new(PluginManager::new(root, manager_config));

    let plugins_dir = cli
        .plugins_dir
        .clone()
        .or_else(|| config.plugins.discovery.directories.first().cloned().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("plugins"));
    let max_depth = config.plugins.discovery.max_depth;
    let allow_invalid = cli.allow_invalid_manifests;
    let watch = cli.watch || config.plugins.discovery.watch;

    let watcher_slot: Arc<Mutex<Option<HotReloadWatcher>>> = Arc::new(Mutex::new(None));
    let transport_task: Arc<Mutex<Option<tokio::task::JoinHandle<()>>>> = Arc::new(Mutex::new(None));

    let lifecycle = ApplicationLifecycle::new();

    {
        let manager = Arc::clone(&manager);
        let plugins_dir = plugins_dir.clone();
        lifecycle
            .add_step(LifecycleStep::new(
                "plugins",
                move || {
                    let manager = Arc::clone(&manager);
                    let plugins_dir = plugins_dir.clone();
                    async move {
                        let discovered = loader::discover(&plugins_dir, max_depth).map_err(step_err("discovering plugins"))?;
                        let candidate_count = discovered.len();
                        let mut loaded = Vec::new();
                        let mut failed = Vec::new();
                        for candidate in discovered {
                            let name = candidate.manifest.name.clone();
                            match manager.load_plugin(candidate).await {
                                Ok(name) => loaded.push(name),
                                Err(err) => {
                                    tracing::warn!(plugin = %name, error = %err, "plugin load failed");
                                    failed.push(name);
                                }
                            }
                        }
                        tracing::info!(count = loaded.len(), plugins = ?loaded, "plugins loaded");
                        if !failed.is_empty() && !allow_invalid {
                            return Err(RuntimeError(format!(
                                "{}/{} plugin(s) failed to load: {} (pass --allow-invalid-manifests to start anyway)",
                                failed.len(),
                                candidate_count,
                                failed.join(", "),
                            )));
                        }
                        Ok(())
                    }
                },
                {
                    let manager = Arc::clone(&manager);
                    move || {
                        let manager = Arc::clone(&manager);
                        async move { manager.shutdown().await }
                    }
                },
            ))
            .await;
    }

    if watch {
        let manager = Arc::clone(&manager);
        let watcher_slot = Arc::clone(&watcher_slot);
        let plugins_dir = plugins_dir.clone();
        lifecycle
            .add_step(LifecycleStep::new(
                "hot-reload-watcher",
                move || {
                    let manager = Arc::clone(&manager);
                    let watcher_slot = Arc::clone(&watcher_slot);
                    // PluginManager doesn't retain each plugin's source directory once
                    // loaded, so this assumes the common convention of directory name ==
                    // manifest name (true for every plugin under demos/).
                    let plugin_dirs: Vec<PathBuf> = manager
                        .loaded_plugins()
                        .into_iter()
                        .map(|name| plugins_dir.join(name))
                        .collect();
                    async move {
                        let watcher = HotReloadWatcher::start(manager, plugin_dirs, sker_framework::DEFAULT_DEBOUNCE)
                            .map_err(|err| RuntimeError(format!("starting hot-reload watcher: {err}")))?;
                        *watcher_slot.lock() = Some(watcher);
                        Ok(())
                    }
                },
                {
                    let watcher_slot = Arc::clone(&watcher_slot);
                    move || {
                        let watcher_slot = Arc::clone(&watcher_slot);
                        async move {
                            watcher_slot.lock().take();
                        }
                    }
                },
            ))
            .await;
    }

    {
        let manager = Arc::clone(&manager);
        let transport_task = Arc::clone(&transport_task);
        let server_name = config.server.name.clone();
        let server_version = config.server.version.clone();
        let transport_kind = config.server.transport.kind;
        #[cfg(feature = "http-transport")]
        let http = config.server.transport.http.clone();
        #[cfg(not(feature = "http-transport"))]
        if transport_kind == sker_runtime::config::TransportKind::Http {
            tracing::warn!("server.transport.type is \"http\" but this build has no http-transport feature; falling back to stdio");
        }

        lifecycle
            .add_step(LifecycleStep::new(
                "transport",
                move || {
                    let manager = Arc::clone(&manager);
                    let transport_task = Arc::clone(&transport_task);
                    let server_name = server_name.clone();
                    let server_version = server_version.clone();
                    #[cfg(feature = "http-transport")]
                    let http = http.clone();
                    async move {
                        let dispatcher: Arc<dyn Dispatcher> = manager;
                        let handle = tokio::spawn(async move {
                            #[cfg(feature = "http-transport")]
                            let result = if transport_kind == sker_runtime::config::TransportKind::Http {
                                let http_config = sker_transport::HttpTransportConfig {
                                    host: http.host,
                                    port: http.port,
                                    request_timeout: std::time::Duration::from_millis(http.request_timeout),
                                };
                                HttpTransport::new(http_config, server_name, server_version)
                                    .serve(dispatcher)
                                    .await
                            } else {
                                StdioTransport::new(server_name, server_version).serve(dispatcher).await
                            };
                            #[cfg(not(feature = "http-transport"))]
                            let result = StdioTransport::new(server_name, server_version).serve(dispatcher).await;

                            if let Err(err) = result {
                                tracing::error!(%err, "transport exited with an error");
                            }
                        });
                        *transport_task.lock() = Some(handle);
                        Ok(())
                    }
                },
                {
                    let transport_task = Arc::clone(&transport_task);
                    move || {
                        let transport_task = Arc::clone(&transport_task);
                        async move {
                            if let Some(handle) = transport_task.lock().take() {
                                handle.abort();
                            }
                        }
                    }
                },
            ))
            .await;
    }

    let outcome = lifecycle
        .run_until(ApplicationLifecycle::wait_for_shutdown_signal())
        .await;

    if let Err(err) = outcome {
        tracing::error!(%err, "skerd failed to start");
        std::process::exit(1);
    }

    Ok(())
}
