//! Post-merge configuration validation.
//!
//! Runs after every `ConfigResolver` merge; a validation failure rejects
//! the offending update and leaves the previous snapshot intact (spec
//! §4.1).

use super::error::{ConfigError, ConfigResult};
use super::schema::{EngineConfig, TransportKind};

/// Validates a merged [`EngineConfig`] snapshot, delegating to one
/// validator per top-level section and returning the first failure.
pub fn validate_config(config: &EngineConfig) -> ConfigResult<()> {
    validate_server_config(config)?;
    validate_plugins_config(config)?;
    validate_security_config(config)?;
    validate_performance_config(config)?;
    Ok(())
}

fn validate_server_config(config: &EngineConfig) -> ConfigResult<()> {
    let server = &config.server;
    if server.name.trim().is_empty() {
        return Err(ConfigError::missing_field("server.name"));
    }

    if server.limits.max_concurrent_requests == 0 {
        return Err(ConfigError::validation(
            "server.limits.maxConcurrentRequests must be greater than 0",
        ));
    }
    if server.limits.request_timeout == 0 {
        return Err(ConfigError::validation(
            "server.limits.requestTimeout must be greater than 0",
        ));
    }

    if server.transport.kind == TransportKind::Http {
        let http = &server.transport.http;
        if http.port == 0 {
            return Err(ConfigError::validation(
                "server.transport.http.port must be a non-zero port number",
            ));
        }
        if http.host.trim().is_empty() {
            return Err(ConfigError::missing_field("server.transport.http.host"));
        }
    }

    Ok(())
}

fn validate_plugins_config(config: &EngineConfig) -> ConfigResult<()> {
    let plugins = &config.plugins;
    if plugins.discovery.max_depth == 0 {
        return Err(ConfigError::validation(
            "plugins.discovery.maxDepth must be at least 1",
        ));
    }
    if plugins.loading.max_concurrent == 0 {
        return Err(ConfigError::validation(
            "plugins.loading.maxConcurrent must be at least 1",
        ));
    }
    if plugins.loading.timeout == 0 {
        return Err(ConfigError::validation(
            "plugins.loading.timeout must be greater than 0",
        ));
    }
    Ok(())
}

fn validate_security_config(config: &EngineConfig) -> ConfigResult<()> {
    let api_key = &config.security.api_key;
    if api_key.enabled && api_key.keys.is_empty() {
        return Err(ConfigError::validation(
            "security.apiKey.keys must not be empty when security.apiKey.enabled is true",
        ));
    }
    if api_key.enabled && api_key.header.trim().is_empty() {
        return Err(ConfigError::missing_field("security.apiKey.header"));
    }

    let rate_limit = &config.security.rate_limit;
    if rate_limit.enabled && rate_limit.max_requests == 0 {
        return Err(ConfigError::validation(
            "security.rateLimit.maxRequests must be greater than 0 when enabled",
        ));
    }
    Ok(())
}

fn validate_performance_config(config: &EngineConfig) -> ConfigResult<()> {
    let cache = &config.performance.cache;
    if cache.enabled && cache.max_size == 0 {
        return Err(ConfigError::validation(
            "performance.cache.maxSize must be greater than 0 when enabled",
        ));
    }

    let memory = &config.performance.memory;
    if memory.warning_threshold > 100 {
        return Err(ConfigError::validation(
            "performance.memory.warningThreshold must be a percentage between 0 and 100",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_default_config() {
        let config = EngineConfig::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn rejects_empty_server_name() {
        let mut config = EngineConfig::default();
        config.server.name = "  ".to_string();
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::MissingField { .. })
        ));
    }

    #[test]
    fn rejects_zero_http_port_when_http_transport_selected() {
        let mut config = EngineConfig::default();
        config.server.transport.kind = TransportKind::Http;
        config.server.transport.http.port = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn rejects_zero_discovery_depth() {
        let mut config = EngineConfig::default();
        config.plugins.discovery.max_depth = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn rejects_enabled_api_key_with_no_keys() {
        let mut config = EngineConfig::default();
        config.security.api_key.enabled = true;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn rejects_warning_threshold_above_100() {
        let mut config = EngineConfig::default();
        config.performance.memory.warning_threshold = 150;
        assert!(validate_config(&config).is_err());
    }
}
