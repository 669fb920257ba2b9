//! Configuration module for the sker MCP host engine (C1): schema,
//! layered resolver, and post-merge validation.

pub mod error;
pub mod resolver;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use resolver::{ConfigResolver, ConfigSource, SubscriptionId};
pub use schema::{
    ApiKeyConfig, CacheConfig, CapabilitiesConfig, DiscoveryConfig, EngineConfig,
    EnvironmentConfig, EnvironmentKind, HttpTransportConfig, IsolationConfig, LayerConfig,
    LayersConfig, LimitsConfig, LoadingConfig, LogFormat, LogLevel, LoggingConfig, MemoryConfig,
    PerformanceConfig, PluginsConfig, RateLimitConfig, RotationConfig, SecurityConfig,
    ServerConfig, TransportConfig, TransportKind,
};
pub use validation::validate_config;
