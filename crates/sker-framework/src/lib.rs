//! # sker-framework
//!
//! The registration and dispatch engine sitting between a transport
//! adapter (`sker-transport`) and the plugins it loads from disk.
//!
//! ## Layers
//!
//! - [`container`] — the token-indexed DI [`container::Container`] with a
//!   parent chain.
//! - [`isolation`] — [`isolation::IsolationLevel`] and [`isolation::Bridge`],
//!   gating what a plugin's child container can reach on the parent.
//! - [`handler`] — [`handler::HandlerDescriptor`], the immutable
//!   registration unit for a tool/resource/prompt.
//! - [`middleware`] — the onion-model [`middleware::MiddlewareExecutor`]
//!   and built-in middleware ([`middleware::builtin`]).
//! - [`error_chain`] — the priority-ordered [`error_chain::ErrorHandlerChain`].
//! - [`conflict`] — [`conflict::ConflictDetector`], run before a plugin's
//!   descriptors are ever installed.
//! - [`registry`] — the concurrent, transactional [`registry::Registry`]
//!   of active handlers.
//! - [`plugin`] — the plugin data model: manifest, ABI descriptor, live
//!   handle.
//! - [`loader`] — filesystem discovery and `dlopen`-based loading.
//! - [`manager`] — [`manager::PluginManager`], which wires all of the
//!   above into the `sker_core::Dispatcher` a transport drives.
//! - [`watcher`] — [`watcher::HotReloadWatcher`], reloading a dev-mode
//!   plugin when its directory changes on disk.

pub mod conflict;
pub mod container;
pub mod error_chain;
pub mod handler;
pub mod isolation;
pub mod loader;
pub mod manager;
pub mod middleware;
pub mod plugin;
pub mod registry;
pub mod watcher;

pub use container::Container;
pub use handler::{HandlerDescriptor, HandlerService, InputParam};
pub use isolation::{Bridge, IsolationLevel, Permissions};
pub use manager::{ConflictResolution, PluginManager, PluginManagerConfig};
pub use registry::Registry;
pub use watcher::{DEFAULT_DEBOUNCE, HotReloadWatcher};

/// The MCP protocol surface this host engine implements, checked against
/// a plugin's declared `mcp.compatibility.mcp_version` requirement by
/// [`conflict::ConflictDetector`]'s `incompatible_version` rule.
pub const HOST_MCP_VERSION: &str = "1.0.0";

/// Common imports for code building plugins against this framework.
pub mod prelude {
    pub use crate::container::Container;
    pub use crate::handler::{HandlerDescriptor, HandlerService, InputParam};
    pub use crate::isolation::{IsolationLevel, Permissions};
    pub use crate::middleware::{MiddlewareEntry, MiddlewareExecutor, builtin};
    pub use crate::plugin::{
        DESCRIPTOR_SYMBOL, PluginDescriptor, PluginFactoryOutput, PluginLifecycle,
        SKER_PLUGIN_ABI_VERSION,
    };
    pub use sker_core::{RequestContext, RequestKind, SkerError, SkerResult};
}
