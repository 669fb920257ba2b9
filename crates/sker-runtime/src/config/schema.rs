//! Configuration schema for the sker MCP host engine (C1), covering every
//! field spec.md §6 recognizes.
//!
//! # Configuration Hierarchy
//!
//! ```text
//! EngineConfig
//! ├── server: ServerConfig             # name, transport, capabilities, limits
//! ├── logging: LoggingConfig           # level/format plus per-layer overrides
//! ├── plugins: PluginsConfig           # discovery, loading, isolation
//! ├── security: SecurityConfig         # authN/Z, API keys, rate limiting
//! ├── performance: PerformanceConfig   # monitoring, cache, memory
//! └── environment: EnvironmentConfig   # development | production | testing
//! ```

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sker_framework::IsolationLevel;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct EngineConfig {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub plugins: PluginsConfig,
    pub security: SecurityConfig,
    pub performance: PerformanceConfig,
    pub environment: EnvironmentConfig,
}

// =============================================================================
// server.*
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub name: String,
    pub version: String,
    pub transport: TransportConfig,
    pub capabilities: CapabilitiesConfig,
    pub limits: LimitsConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: "sker-daemon-mcp".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            transport: TransportConfig::default(),
            capabilities: CapabilitiesConfig::default(),
            limits: LimitsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    #[default]
    Stdio,
    Http,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct TransportConfig {
    #[serde(rename = "type")]
    pub kind: TransportKind,
    pub http: HttpTransportConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HttpTransportConfig {
    pub port: u16,
    pub host: String,
    pub cors: bool,
    pub enable_sessions: bool,
    pub enable_json_response: bool,
    pub request_timeout: u64,
    pub max_body_size: u64,
    pub enable_dns_rebinding_protection: bool,
    pub allowed_hosts: Vec<String>,
    pub allowed_origins: Vec<String>,
}

impl Default for HttpTransportConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            host: "127.0.0.1".to_string(),
            cors: false,
            enable_sessions: false,
            enable_json_response: false,
            request_timeout: 30_000,
            max_body_size: 1024 * 1024,
            enable_dns_rebinding_protection: false,
            allowed_hosts: Vec::new(),
            allowed_origins: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CapabilitiesConfig {
    pub logging: bool,
    pub sampling: bool,
    pub experimental: bool,
}

impl Default for CapabilitiesConfig {
    fn default() -> Self {
        Self {
            logging: true,
            sampling: false,
            experimental: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LimitsConfig {
    pub max_concurrent_requests: usize,
    pub request_timeout: u64,
    pub max_request_size: u64,
    pub max_response_size: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_concurrent_requests: 100,
            request_timeout: 30_000,
            max_request_size: 1024 * 1024,
            max_response_size: 5 * 1024 * 1024,
        }
    }
}

impl LimitsConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout)
    }
}

// =============================================================================
// logging.*
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: LogLevel,
    pub format: LogFormat,
    pub colorize: bool,
    pub timestamp: bool,
    pub layers: LayersConfig,
    pub rotation: RotationConfig,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Simple,
            colorize: true,
            timestamp: true,
            layers: LayersConfig::default(),
            rotation: RotationConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Simple,
    Json,
    Pretty,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LayerConfig {
    pub level: LogLevel,
    pub console: bool,
    pub file: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LayersConfig {
    pub platform: LayerConfig,
    pub application: LayerConfig,
    pub plugin: LayerConfig,
}

impl Default for LayersConfig {
    fn default() -> Self {
        Self {
            platform: LayerConfig {
                level: LogLevel::Warn,
                console: true,
                file: true,
            },
            application: LayerConfig {
                level: LogLevel::Info,
                console: true,
                file: true,
            },
            plugin: LayerConfig {
                level: LogLevel::Debug,
                console: false,
                file: true,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RotationConfig {
    pub max_size: String,
    pub max_files: u32,
    pub date_pattern: String,
    pub compress: bool,
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            max_size: "20MB".to_string(),
            max_files: 14,
            date_pattern: "YYYY-MM-DD".to_string(),
            compress: true,
        }
    }
}

// =============================================================================
// plugins.*
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PluginsConfig {
    pub discovery: DiscoveryConfig,
    pub loading: LoadingConfig,
    pub isolation: IsolationConfig,
    /// Per-plugin free-form configuration, handed to that plugin's
    /// `on_load` hook through its container.
    #[serde(default)]
    pub plugins: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DiscoveryConfig {
    pub directories: Vec<String>,
    pub max_depth: u32,
    pub watch: bool,
    pub include_dev: bool,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            directories: vec!["plugins".to_string()],
            max_depth: 3,
            watch: false,
            include_dev: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadingConfig {
    pub parallel: bool,
    pub timeout: u64,
    pub max_concurrent: usize,
}

impl Default for LoadingConfig {
    fn default() -> Self {
        Self {
            parallel: true,
            timeout: 10_000,
            max_concurrent: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct IsolationConfig {
    pub default: IsolationLevel,
    pub plugins: HashMap<String, IsolationLevel>,
}

// =============================================================================
// security.*
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SecurityConfig {
    pub authentication: bool,
    pub authorization: bool,
    pub api_key: ApiKeyConfig,
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ApiKeyConfig {
    pub enabled: bool,
    pub header: String,
    pub keys: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub max_requests: usize,
    pub window_ms: u64,
    pub skip_failed_requests: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_requests: 100,
            window_ms: 60_000,
            skip_failed_requests: false,
        }
    }
}

// =============================================================================
// performance.*
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PerformanceConfig {
    pub monitoring: bool,
    pub cache: CacheConfig,
    pub memory: MemoryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub max_size: usize,
    pub ttl: u64,
    pub cleanup_interval: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_size: 100,
            ttl: 300_000,
            cleanup_interval: 60_000,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MemoryConfig {
    pub monitoring: bool,
    pub warning_threshold: u8,
    pub gc_hints: bool,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            monitoring: false,
            warning_threshold: 80,
            gc_hints: false,
        }
    }
}

// =============================================================================
// environment.*
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EnvironmentKind {
    #[default]
    Development,
    Production,
    Testing,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct EnvironmentConfig {
    pub environment: EnvironmentKind,
}
