//! # sker
//!
//! A pluggable, isolated, hot-reloadable Model Context Protocol host
//! engine.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌────────────┐   ┌───────────────┐   ┌─────────┐
//! │ Transport│──▶│ Dispatcher │──▶│ Registry lookup│──▶│Middleware│──▶ handler
//! │(stdio/http)  │(PluginManager)│  (tool/res/prompt)│  │  chain   │
//! └──────────┘   └────────────┘   └───────────────┘   └─────────┘
//! ```
//!
//! A `PluginManager` discovers plugins from a directory, loads each into
//! an isolated child container gated by its declared permissions, and
//! installs its handlers into a single flat `Registry` after running
//! them through the `ConflictDetector`. Every dispatch runs through a
//! per-handler onion-model middleware chain and, on failure, a
//! priority-ordered error-handler chain.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use sker::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> sker_core::SkerResult<()> {
//!     let resolver = ConfigResolver::new();
//!     resolver.load_directory("config").await.ok();
//!     let config = resolver.get().await;
//!
//!     let _logging = LoggerFactory::init(&config.logging)?;
//!
//!     let root = Container::root();
//!     let manager = Arc::new(PluginManager::new(root, PluginManagerConfig::default()));
//!     manager.load_all("plugins".as_ref(), config.plugins.discovery.max_depth).await?;
//!
//!     StdioTransport::new(&config.server.name, &config.server.version)
//!         .serve(manager)
//!         .await
//! }
//! ```
//!
//! ## Features
//!
//! - `yaml-config` (default) / `toml-config`: the config file format the
//!   Config Resolver's file sources are parsed as.
//! - `json-log`: JSON-formatted log output from the Logger Factory.
//! - `http-transport`: the optional streamable-HTTP transport, in
//!   addition to the default stdio one.

pub use sker_core::*;

pub use sker_framework;
#[cfg(feature = "macros")]
pub use sker_macros;
pub use sker_runtime;
pub use sker_transport;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use sker::prelude::*;
/// ```
pub mod prelude {
    // Dispatch core: request/response envelopes, the error taxonomy, the
    // transport-facing traits a host binary implements against.
    pub use sker_core::{Dispatcher, RequestContext, RequestKind, SkerError, SkerResult, Transport};

    // Registration and plugin model.
    pub use sker_framework::{
        Bridge, Container, HandlerDescriptor, HandlerService, HotReloadWatcher, InputParam, IsolationLevel,
        Permissions, PluginManager, PluginManagerConfig, Registry,
    };
    pub use sker_framework::plugin::{
        DESCRIPTOR_SYMBOL, PluginDescriptor, PluginFactoryOutput, PluginLifecycle, SKER_PLUGIN_ABI_VERSION,
    };

    // Ambient stack: config, logging, lifecycle.
    pub use sker_runtime::{
        ApplicationLifecycle, ConfigResolver, EngineConfig, LifecycleEvent, LifecycleState, LoggerFactory,
    };

    // Transport adapters.
    pub use sker_transport::StdioTransport;
    #[cfg(feature = "http-transport")]
    pub use sker_transport::{HttpTransport, HttpTransportConfig};

    // Declaration macros for plugin authors.
    #[cfg(feature = "macros")]
    pub use sker_macros::{handlers, plugin_definition, prompt, resource, tool};

    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}
