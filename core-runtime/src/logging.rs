//! # Logging
//!
//! `tracing` subscriber setup for hosts of the sync core.
//!
//! ## Overview
//!
//! The host calls [`init_logging`] once at startup, usually with a
//! [`LoggingConfig`] built from the `[logging]` section of the configuration
//! file. Events are written to stderr, so a CLI can keep stdout for converted
//! documents. When a [`LoggerSink`] is attached, every event that passes the
//! filter is mirrored to it with its structured fields.
//!
//! Nothing in the core installs a subscriber by itself.
//!
//! ## Redaction
//!
//! Fields forwarded to a sink pass through [`redact_if_sensitive`]: credential
//! fields and values shaped like store credentials are replaced, and the query
//! string of http(s) addresses is dropped with [`redact_url`]. Hosted upload
//! addresses carry their access signature there, so code logging them calls
//! `redact_url` directly.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::AppConfig;
//! use core_runtime::logging::{init_logging, LoggingConfig};
//!
//! let app = AppConfig::load_or_default(&AppConfig::default_path()?)?;
//! init_logging(LoggingConfig::from_settings(&app.logging)?)?;
//! tracing::info!(route = "notes", "Sync started");
//! ```

use crate::error::{Error, Result};
use bridge_traits::time::{LogEntry, LogLevel, LoggerSink};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::io;
use std::str::FromStr;
use std::sync::Arc;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::{
    filter::EnvFilter,
    fmt::format::FmtSpan,
    layer::{Context, SubscriberExt},
    registry::LookupSpan,
    util::SubscriberInitExt,
    Layer, Registry,
};

/// Crates logged at the configured level; everything else logs warnings only.
const WORKSPACE_TARGETS: &[&str] = &[
    "docsync_workspace",
    "core_media",
    "core_document",
    "core_runtime",
    "core_sync",
    "bridge_traits",
    "bridge_desktop",
];

const REDACTED: &str = "[REDACTED]";

// ============================================================================
// Settings
// ============================================================================

/// Output format of the stderr layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Multi-line, human-readable
    Pretty,
    /// One JSON object per event
    Json,
    /// One line per event
    #[default]
    Compact,
}

impl FromStr for LogFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            "compact" => Ok(LogFormat::Compact),
            other => Err(Error::Config(format!("Unknown log format: {}", other))),
        }
    }
}

/// `[logging]` section of the configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub format: LogFormat,
    /// `trace`, `debug`, `info`, `warn` or `error`
    pub level: String,
    /// Full `EnvFilter` directives; replaces `level` when set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            level: "info".to_string(),
            filter: None,
        }
    }
}

impl LoggingSettings {
    pub fn validate(&self) -> Result<()> {
        LoggingConfig::from_settings(self)
            .and_then(|config| env_filter(&config))
            .map(|_| ())
    }
}

/// Parses a level name as written in the configuration file.
pub fn parse_level(level: &str) -> Result<LogLevel> {
    match level.trim().to_ascii_lowercase().as_str() {
        "trace" => Ok(LogLevel::Trace),
        "debug" => Ok(LogLevel::Debug),
        "info" => Ok(LogLevel::Info),
        "warn" | "warning" => Ok(LogLevel::Warn),
        "error" => Ok(LogLevel::Error),
        other => Err(Error::Config(format!("Unknown log level: {}", other))),
    }
}

fn level_name(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Trace => "trace",
        LogLevel::Debug => "debug",
        LogLevel::Info => "info",
        LogLevel::Warn => "warn",
        LogLevel::Error => "error",
    }
}

/// Runtime logging options.
#[derive(Clone, Default)]
pub struct LoggingConfig {
    pub format: LogFormat,
    pub level: LogLevel,
    pub filter: Option<String>,
    /// Host logger receiving a copy of every event
    pub sink: Option<Arc<dyn LoggerSink>>,
    /// Log each span when it opens and closes
    pub span_events: bool,
}

impl fmt::Debug for LoggingConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoggingConfig")
            .field("format", &self.format)
            .field("level", &self.level)
            .field("filter", &self.filter)
            .field("has_sink", &self.sink.is_some())
            .field("span_events", &self.span_events)
            .finish()
    }
}

impl LoggingConfig {
    pub fn from_settings(settings: &LoggingSettings) -> Result<Self> {
        Ok(Self {
            format: settings.format,
            level: parse_level(&settings.level)?,
            filter: settings.filter.clone(),
            ..Self::default()
        })
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn LoggerSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_span_events(mut self, enabled: bool) -> Self {
        self.span_events = enabled;
        self
    }
}

// ============================================================================
// Initialisation
// ============================================================================

/// Installs the global subscriber.
///
/// # Errors
///
/// Returns `Config` for an invalid filter, or when a global subscriber is
/// already installed.
pub fn init_logging(config: LoggingConfig) -> Result<()> {
    let filter = env_filter(&config)?;

    tracing_subscriber::registry()
        .with(stderr_layer(&config))
        .with(filter)
        .with(HostSinkLayer {
            sink: config.sink.clone(),
        })
        .try_init()
        .map_err(|e| Error::Config(format!("Logging already initialised: {}", e)))
}

fn default_directives(level: LogLevel) -> String {
    let level = level_name(level);
    std::iter::once("warn".to_string())
        .chain(
            WORKSPACE_TARGETS
                .iter()
                .map(|target| format!("{}={}", target, level)),
        )
        .collect::<Vec<_>>()
        .join(",")
}

fn env_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    let directives = config
        .filter
        .clone()
        .unwrap_or_else(|| default_directives(config.level));

    EnvFilter::try_new(&directives)
        .map_err(|e| Error::Config(format!("Invalid log filter '{}': {}", directives, e)))
}

fn stderr_layer(config: &LoggingConfig) -> Box<dyn Layer<Registry> + Send + Sync> {
    let spans = if config.span_events {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stderr)
        .with_span_events(spans);

    match config.format {
        LogFormat::Pretty => layer.pretty().boxed(),
        LogFormat::Compact => layer.compact().boxed(),
        LogFormat::Json => layer
            .json()
            .flatten_event(true)
            .with_current_span(config.span_events)
            .boxed(),
    }
}

// ============================================================================
// Host sink
// ============================================================================

/// Mirrors events to the host's [`LoggerSink`].
struct HostSinkLayer {
    sink: Option<Arc<dyn LoggerSink>>,
}

impl<S> Layer<S> for HostSinkLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let Some(sink) = &self.sink else {
            return;
        };

        let metadata = event.metadata();
        let level = sink_level(*metadata.level());
        if level < sink.min_level() {
            return;
        }

        let mut collector = FieldCollector::default();
        event.record(&mut collector);

        let message = collector
            .message
            .take()
            .unwrap_or_else(|| metadata.name().to_string());
        let mut entry = LogEntry::new(level, metadata.target(), message);
        entry.fields = collector.values;
        if let Some(span) = ctx.event_span(event) {
            entry = entry.with_field("span", span.name());
        }

        deliver(Arc::clone(sink), entry);
    }
}

/// Runs the sink as a task inside a runtime, inline otherwise.
fn deliver(sink: Arc<dyn LoggerSink>, entry: LogEntry) {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(async move {
                if let Err(err) = sink.log(entry).await {
                    eprintln!("log sink error: {}", err);
                }
            });
        }
        Err(_) => {
            if let Err(err) = futures::executor::block_on(sink.log(entry)) {
                eprintln!("log sink error: {}", err);
            }
        }
    }
}

fn sink_level(level: tracing::Level) -> LogLevel {
    match level {
        tracing::Level::TRACE => LogLevel::Trace,
        tracing::Level::DEBUG => LogLevel::Debug,
        tracing::Level::INFO => LogLevel::Info,
        tracing::Level::WARN => LogLevel::Warn,
        tracing::Level::ERROR => LogLevel::Error,
    }
}

#[derive(Default)]
struct FieldCollector {
    message: Option<String>,
    values: HashMap<String, String>,
}

impl FieldCollector {
    fn push(&mut self, field: &Field, value: String) {
        match field.name() {
            "message" => self.message = Some(value),
            name => {
                self.values
                    .insert(name.to_string(), redact_if_sensitive(name, &value));
            }
        }
    }
}

// Numbers, booleans and errors reach `record_debug` through the trait defaults.
impl Visit for FieldCollector {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.push(field, value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.push(field, format!("{:?}", value));
    }
}

// ============================================================================
// Redaction
// ============================================================================

/// Replaces credentials in a field about to be logged.
///
/// A value is withheld when the field name mentions a credential, or when the
/// value itself looks like a store token. Other values only lose the query
/// string of http(s) addresses.
///
/// ```
/// use core_runtime::logging::redact_if_sensitive;
///
/// assert_eq!(redact_if_sensitive("api_token", "abc"), "[REDACTED]");
/// assert_eq!(redact_if_sensitive("note", "secret_8Jk2"), "[REDACTED]");
/// assert_eq!(redact_if_sensitive("route", "notes"), "notes");
/// ```
pub fn redact_if_sensitive(field_name: &str, value: &str) -> String {
    const SENSITIVE_FIELDS: &[&str] = &[
        "token",
        "secret",
        "password",
        "authorization",
        "api_key",
        "cookie",
    ];
    const CREDENTIAL_PREFIXES: &[&str] = &["secret_", "ntn_", "Bearer "];

    let name = field_name.to_ascii_lowercase();
    let value_trimmed = value.trim_start();
    if SENSITIVE_FIELDS.iter().any(|f| name.contains(f))
        || CREDENTIAL_PREFIXES
            .iter()
            .any(|prefix| value_trimmed.starts_with(prefix))
    {
        return REDACTED.to_string();
    }
    redact_url(value)
}

/// Drops the query string of an http(s) address.
///
/// ```
/// use core_runtime::logging::redact_url;
///
/// assert_eq!(
///     redact_url("https://files.example/u/cat.png?X-Amz-Signature=abc"),
///     "https://files.example/u/cat.png?[REDACTED]"
/// );
/// assert_eq!(redact_url("_media/cat.png"), "_media/cat.png");
/// ```
pub fn redact_url(value: &str) -> String {
    let lower = value.trim_start().to_ascii_lowercase();
    if !(lower.starts_with("http://") || lower.starts_with("https://")) {
        return value.to_string();
    }
    match value.split_once('?') {
        Some((address, _)) => format!("{}?{}", address, REDACTED),
        None => value.to_string(),
    }
}
