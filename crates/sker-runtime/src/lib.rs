//! sker Runtime — the ambient stack behind the MCP host engine: the
//! layered Config Resolver (C1), the three-layer Logger Factory (C2),
//! and the Application Lifecycle (C13) that brings both of those, plus
//! the framework's plugin manager and a transport, up and down in order.
//!
//! ```ignore
//! use sker_runtime::config::ConfigResolver;
//! use sker_runtime::logging::LoggerFactory;
//! use sker_runtime::runtime::ApplicationLifecycle;
//!
//! let resolver = Arc::new(ConfigResolver::new());
//! resolver.load_directory(&home.join("config")).await?;
//! let snapshot = resolver.get().await;
//! let _logging = LoggerFactory::init(&snapshot.logging)?;
//!
//! let lifecycle = ApplicationLifecycle::new();
//! // lifecycle.add_step(...) for each C1..C12 component, then:
//! lifecycle.run_until(ApplicationLifecycle::wait_for_shutdown_signal()).await?;
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod runtime;

pub use config::{ConfigError, ConfigResolver, ConfigResult, EngineConfig};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::{LoggerFactory, LoggingBuilder, SpanEvents};
pub use runtime::{ApplicationLifecycle, LifecycleEvent, LifecycleState, LifecycleStep};

// Re-export tracing for use by other crates.
pub use tracing;
pub use tracing_subscriber;

/// Common imports for a binary assembling the host process.
pub mod prelude {
    pub use crate::config::{ConfigResolver, EngineConfig};
    pub use crate::logging::LoggerFactory;
    pub use crate::runtime::{ApplicationLifecycle, LifecycleEvent, LifecycleState, LifecycleStep};
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}
