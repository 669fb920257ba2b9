//! Logger Factory (C2): three independently filterable `tracing` layers —
//! platform, application, plugin — each reconfigurable in place when the
//! [`crate::config::ConfigResolver`] produces a new [`LoggingConfig`]
//! snapshot.
//!
//! # Example
//!
//! ```rust,ignore
//! use sker_runtime::logging::LoggerFactory;
//! use sker_runtime::config::EngineConfig;
//!
//! let config = EngineConfig::default();
//! let factory = LoggerFactory::init(&config.logging)?;
//! // later, after the resolver merges a new snapshot:
//! factory.reconfigure(&config.logging)?;
//! ```

use std::sync::Mutex;

use tracing_subscriber::filter::{LevelFilter, Targets};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt, prelude::*, reload};

use crate::config::{LayerConfig, LogFormat, LogLevel, LoggingConfig};

/// Span event configuration for logging.
///
/// This controls when span lifecycle events are logged, which is essential
/// for debugging Tower Service chains and understanding request flow.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpanEvents {
    /// Log when a span is created (entered for the first time).
    pub new: bool,
    /// Log when a span is entered.
    pub enter: bool,
    /// Log when a span is exited.
    pub exit: bool,
    /// Log when a span is closed (dropped).
    pub close: bool,
}

impl SpanEvents {
    /// No span events will be logged.
    pub const NONE: Self = Self {
        new: false,
        enter: false,
        exit: false,
        close: false,
    };

    /// Log span creation and close events.
    pub const LIFECYCLE: Self = Self {
        new: true,
        enter: false,
        exit: false,
        close: true,
    };

    /// Log all span events (new, enter, exit, close).
    pub const FULL: Self = Self {
        new: true,
        enter: true,
        exit: true,
        close: true,
    };

    /// Log only enter and exit events.
    pub const ACTIVE: Self = Self {
        new: false,
        enter: true,
        exit: true,
        close: false,
    };

    /// Convert to `tracing_subscriber::fmt::format::FmtSpan` flags.
    fn to_fmt_span(self) -> fmt::format::FmtSpan {
        let mut span = fmt::format::FmtSpan::NONE;
        if self.new {
            span |= fmt::format::FmtSpan::NEW;
        }
        if self.enter {
            span |= fmt::format::FmtSpan::ENTER;
        }
        if self.exit {
            span |= fmt::format::FmtSpan::EXIT;
        }
        if self.close {
            span |= fmt::format::FmtSpan::CLOSE;
        }
        span
    }
}

/// Initialize logging with default settings (`RUST_LOG` or `info`).
///
/// Intended for small binaries (demos, the plugin ABI check tool) that
/// don't need the full three-layer [`LoggerFactory`].
///
/// # Panics
///
/// Panics if the subscriber has already been set.
pub fn init() {
    init_with_filter("info");
}

/// Initialize logging with a custom filter string.
///
/// # Panics
///
/// Panics if the subscriber has already been set.
pub fn init_with_filter(filter: &str) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(env_filter)
        .init();
}

/// Try to initialize logging, returning an error instead of panicking.
pub fn try_init() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    try_init_with_filter("info")
}

/// Try to initialize logging with a custom filter.
pub fn try_init_with_filter(filter: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(env_filter)
        .try_init()
        .map_err(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>)
}

/// A builder for configuring a single-layer logging setup.
///
/// # Example
///
/// ```rust,ignore
/// use sker_runtime::logging::{LoggingBuilder, SpanEvents};
/// use tracing::Level;
///
/// LoggingBuilder::new()
///     .with_level(Level::DEBUG)
///     .with_span_events(SpanEvents::LIFECYCLE)
///     .init();
/// ```
#[derive(Default)]
pub struct LoggingBuilder {
    directives: Vec<String>,
    level: Option<tracing::Level>,
    span_events: SpanEvents,
    with_target: bool,
    with_thread_ids: bool,
    with_file: bool,
    with_line_number: bool,
    #[cfg(feature = "json-log")]
    json: bool,
}

impl LoggingBuilder {
    /// Create a new logging builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the global log level.
    pub fn with_level(mut self, level: tracing::Level) -> Self {
        self.level = Some(level);
        self
    }

    /// Add a filter directive, e.g. `"sker_framework=debug"`.
    pub fn directive(mut self, directive: &str) -> Self {
        self.directives.push(directive.to_string());
        self
    }

    /// Configure span events for Service lifecycle visibility.
    pub fn span_events(mut self, events: SpanEvents) -> Self {
        self.span_events = events;
        self
    }

    /// Alias for `span_events`.
    pub fn with_span_events(mut self, events: SpanEvents) -> Self {
        self.span_events = events;
        self
    }

    /// Include the target (module path) in log output.
    pub fn with_target(mut self, enabled: bool) -> Self {
        self.with_target = enabled;
        self
    }

    /// Include thread IDs in log output.
    pub fn with_thread_ids(mut self, enabled: bool) -> Self {
        self.with_thread_ids = enabled;
        self
    }

    /// Include file names in log output.
    pub fn with_file(mut self, enabled: bool) -> Self {
        self.with_file = enabled;
        self
    }

    /// Include line numbers in log output.
    pub fn with_line_number(mut self, enabled: bool) -> Self {
        self.with_line_number = enabled;
        self
    }

    /// Enable JSON output format.
    #[cfg(feature = "json-log")]
    pub fn json(mut self) -> Self {
        self.json = true;
        self
    }

    fn build_filter(&self) -> EnvFilter {
        let base_filter = match self.level {
            Some(level) => level.to_string(),
            None => "info".to_string(),
        };

        let mut filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&base_filter));
        for directive in &self.directives {
            if let Ok(d) = directive.parse() {
                filter = filter.add_directive(d);
            }
        }
        filter
    }

    fn build_fmt_layer<S>(&self) -> fmt::Layer<S>
    where
        S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
    {
        fmt::layer()
            .with_span_events(self.span_events.to_fmt_span())
            .with_target(self.with_target)
            .with_thread_ids(self.with_thread_ids)
            .with_file(self.with_file)
            .with_line_number(self.with_line_number)
    }

    /// Initialize the logging system.
    pub fn init(self) {
        let filter = self.build_filter();

        #[cfg(feature = "json-log")]
        if self.json {
            tracing_subscriber::registry()
                .with(
                    fmt::layer()
                        .json()
                        .with_span_events(self.span_events.to_fmt_span()),
                )
                .with(filter)
                .init();
            return;
        }

        tracing_subscriber::registry()
            .with(self.build_fmt_layer())
            .with(filter)
            .init();
    }

    /// Try to initialize the logging system, returning an error on failure.
    pub fn try_init(self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let filter = self.build_filter();

        #[cfg(feature = "json-log")]
        if self.json {
            return tracing_subscriber::registry()
                .with(
                    fmt::layer()
                        .json()
                        .with_span_events(self.span_events.to_fmt_span()),
                )
                .with(filter)
                .try_init()
                .map_err(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>);
        }

        tracing_subscriber::registry()
            .with(self.build_fmt_layer())
            .with(filter)
            .try_init()
            .map_err(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>)
    }
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

const PLATFORM_TARGETS: &[&str] = &["sker_core", "sker_framework", "sker_transport"];
const APPLICATION_TARGETS: &[&str] = &["sker_runtime", "sker"];
const PLUGIN_TARGETS: &[&str] = &["plugin"];

fn level_filter(level: LogLevel) -> LevelFilter {
    match level {
        LogLevel::Trace => LevelFilter::TRACE,
        LogLevel::Debug => LevelFilter::DEBUG,
        LogLevel::Info => LevelFilter::INFO,
        LogLevel::Warn => LevelFilter::WARN,
        LogLevel::Error => LevelFilter::ERROR,
    }
}

fn build_writer(name: &str, cfg: &LayerConfig, guards: &mut Vec<tracing_appender::non_blocking::WorkerGuard>) -> BoxMakeWriter {
    if cfg.console {
        return BoxMakeWriter::new(std::io::stdout);
    }
    if cfg.file {
        let appender = tracing_appender::rolling::daily("logs", format!("{name}.log"));
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);
        guards.push(guard);
        return BoxMakeWriter::new(non_blocking);
    }
    BoxMakeWriter::new(std::io::sink)
}

fn build_layer(
    name: &'static str,
    targets: &'static [&'static str],
    cfg: &LayerConfig,
    global: &LoggingConfig,
    guards: &mut Vec<tracing_appender::non_blocking::WorkerGuard>,
) -> BoxedLayer {
    let filter = Targets::new()
        .with_targets(targets.iter().map(|t| (*t, level_filter(cfg.level))))
        .with_default(LevelFilter::OFF);

    let writer = build_writer(name, cfg, guards);
    let ansi = global.colorize && cfg.console;

    let boxed: BoxedLayer = match (global.format, global.timestamp) {
        (LogFormat::Json, true) => Box::new(
            fmt::layer()
                .with_writer(writer)
                .with_ansi(ansi)
                .with_target(true)
                .json(),
        ),
        (LogFormat::Json, false) => Box::new(
            fmt::layer()
                .with_writer(writer)
                .with_ansi(ansi)
                .with_target(true)
                .without_time()
                .json(),
        ),
        (LogFormat::Pretty, true) => Box::new(
            fmt::layer()
                .with_writer(writer)
                .with_ansi(ansi)
                .with_target(true)
                .pretty(),
        ),
        (LogFormat::Pretty, false) => Box::new(
            fmt::layer()
                .with_writer(writer)
                .with_ansi(ansi)
                .with_target(true)
                .without_time()
                .pretty(),
        ),
        (LogFormat::Simple, true) => Box::new(
            fmt::layer()
                .with_writer(writer)
                .with_ansi(ansi)
                .with_target(true),
        ),
        (LogFormat::Simple, false) => Box::new(
            fmt::layer()
                .with_writer(writer)
                .with_ansi(ansi)
                .with_target(true)
                .without_time(),
        ),
    };
    Box::new(boxed.with_filter(filter))
}

/// Owns the three reloadable logging layers (platform, application,
/// plugin) described by spec.md §4.2's Logger Factory, and the
/// non-blocking file writer guards that keep them flushing.
///
/// Dropping a `LoggerFactory` does not tear down the global subscriber
/// (tracing has none to give back); it only drops the file writer
/// guards, at which point buffered lines stop being flushed.
pub struct LoggerFactory {
    platform: reload::Handle<BoxedLayer, Registry>,
    application: reload::Handle<BoxedLayer, Registry>,
    plugin: reload::Handle<BoxedLayer, Registry>,
    guards: Mutex<Vec<tracing_appender::non_blocking::WorkerGuard>>,
}

impl LoggerFactory {
    /// Installs the global `tracing` subscriber built from `config` and
    /// returns a handle that can reconfigure each layer in place.
    ///
    /// # Panics
    ///
    /// Panics if a global subscriber has already been installed.
    pub fn init(config: &LoggingConfig) -> Self {
        Self::try_init(config).expect("global tracing subscriber already installed")
    }

    /// Like [`LoggerFactory::init`] but returns an error instead of
    /// panicking when a subscriber is already installed.
    pub fn try_init(
        config: &LoggingConfig,
    ) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let mut guards = Vec::new();
        let platform_layer = build_layer("platform", PLATFORM_TARGETS, &config.layers.platform, config, &mut guards);
        let application_layer = build_layer(
            "application",
            APPLICATION_TARGETS,
            &config.layers.application,
            config,
            &mut guards,
        );
        let plugin_layer = build_layer("plugin", PLUGIN_TARGETS, &config.layers.plugin, config, &mut guards);

        let (platform_layer, platform_handle) = reload::Layer::new(platform_layer);
        let (application_layer, application_handle) = reload::Layer::new(application_layer);
        let (plugin_layer, plugin_handle) = reload::Layer::new(plugin_layer);

        tracing_subscriber::registry()
            .with(platform_layer)
            .with(application_layer)
            .with(plugin_layer)
            .try_init()
            .map_err(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>)?;

        Ok(Self {
            platform: platform_handle,
            application: application_handle,
            plugin: plugin_handle,
            guards: Mutex::new(guards),
        })
    }

    /// Swaps each layer's filter/writer in place to match a new
    /// [`LoggingConfig`] snapshot, without dropping subscriber handles
    /// already cloned into plugins.
    pub fn reconfigure(
        &self,
        config: &LoggingConfig,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let mut guards = Vec::new();
        let platform_layer = build_layer("platform", PLATFORM_TARGETS, &config.layers.platform, config, &mut guards);
        let application_layer = build_layer(
            "application",
            APPLICATION_TARGETS,
            &config.layers.application,
            config,
            &mut guards,
        );
        let plugin_layer = build_layer("plugin", PLUGIN_TARGETS, &config.layers.plugin, config, &mut guards);

        self.platform.reload(platform_layer)?;
        self.application.reload(application_layer)?;
        self.plugin.reload(plugin_layer)?;

        *self.guards.lock().expect("logging guard lock poisoned") = guards;
        Ok(())
    }
}

/// Opens a `tracing::Span` scoping subsequent events to `plugin_name`,
/// routed to the plugin layer via [`PLUGIN_TARGETS`].
pub fn plugin_span(plugin_name: &str) -> tracing::Span {
    tracing::info_span!(target: "plugin", "plugin", plugin_name = %plugin_name)
}


/// RAII timer logging the elapsed time under `label` when dropped,
/// equivalent to a `startTimer()`/stop-on-scope-exit helper.
pub struct Timer {
    label: String,
    start: std::time::Instant,
}

impl Timer {
    /// Starts a new timer. Elapsed time is logged at `debug` when the
    /// returned guard is dropped.
    pub fn start(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            start: std::time::Instant::now(),
        }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        tracing::debug!(
            label = %self.label,
            elapsed_ms = self.start.elapsed().as_millis() as u64,
            "timer finished"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_events_to_fmt_span_roundtrips_full() {
        let span = SpanEvents::FULL.to_fmt_span();
        assert_eq!(span, fmt::format::FmtSpan::FULL);
    }

    #[test]
    fn level_filter_maps_every_log_level() {
        assert_eq!(level_filter(LogLevel::Trace), LevelFilter::TRACE);
        assert_eq!(level_filter(LogLevel::Error), LevelFilter::ERROR);
    }

    #[test]
    fn timer_does_not_panic_on_drop_without_subscriber() {
        let timer = Timer::start("unit-test");
        drop(timer);
    }

    #[test]
    fn plugin_span_carries_the_plugin_name_field() {
        let span = plugin_span("echo-tools");
        assert!(!span.is_disabled());
    }
}
