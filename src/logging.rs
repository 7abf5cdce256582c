//! Tracing setup for the command-line tool and embedding applications.
//!
//! The library itself only emits events through the `tracing` macros:
//! `debug!` for code-generation progress, `info!` for documents written and
//! read, `warn!` for recoverable oddities (overwritten routines, negative indent
//! levels, documents from a newer version). This module installs a subscriber
//! that prints them.
//!
//! Logs go to stderr so generated scripts can be piped from stdout.
//!
//! # Example
//! ```no_run
//! use trialflow::{config::BuilderConfig, logging};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = BuilderConfig::load()?;
//! logging::init_from_config(&config)?;
//! tracing::info!("ready");
//! # Ok(())
//! # }
//! ```

use crate::config::BuilderConfig;
use tracing::Level;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry,
};

/// Output format for log lines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Multi-line output with colors (for development)
    Pretty,
    /// One line per event without colors
    Compact,
    /// JSON objects for log aggregation
    Json,
}

/// Logging configuration options
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Log level used when `RUST_LOG` is not set
    pub level: Level,
    /// Output format
    pub format: OutputFormat,
    /// Whether to include file and line numbers
    pub with_file_and_line: bool,
    /// Whether to enable ANSI colors (only for Pretty format)
    pub with_ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: OutputFormat::Compact,
            with_file_and_line: false,
            with_ansi: true,
        }
    }
}

impl LoggingConfig {
    /// Create logging config from the builder configuration
    pub fn from_builder_config(config: &BuilderConfig) -> Result<Self, String> {
        Ok(Self {
            level: parse_log_level(&config.application.log_level)?,
            format: parse_output_format(&config.application.log_format)?,
            ..Default::default()
        })
    }

    /// Create logging config with a level and default settings
    pub fn new(level: Level) -> Self {
        Self {
            level,
            ..Default::default()
        }
    }

    /// Set output format
    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    /// Enable or disable ANSI colors
    pub fn with_ansi(mut self, enabled: bool) -> Self {
        self.with_ansi = enabled;
        self
    }
}

/// Initialize logging from the builder configuration
pub fn init_from_config(config: &BuilderConfig) -> Result<(), String> {
    init(LoggingConfig::from_builder_config(config)?)
}

/// Initialize logging with custom configuration
///
/// This function is idempotent - if a global subscriber is already installed
/// it returns Ok(()) without replacing it.
pub fn init(config: LoggingConfig) -> Result<(), String> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_str().to_lowercase()));

    let base = fmt::layer()
        .with_writer(std::io::stderr)
        .with_file(config.with_file_and_line)
        .with_line_number(config.with_file_and_line);

    let fmt_layer: Box<dyn Layer<Registry> + Send + Sync> = match config.format {
        OutputFormat::Pretty => base.pretty().with_ansi(config.with_ansi).boxed(),
        OutputFormat::Compact => base.compact().with_ansi(false).boxed(),
        OutputFormat::Json => base.json().boxed(),
    };

    tracing_subscriber::registry()
        .with(fmt_layer.with_filter(env_filter))
        .try_init()
        .or_else(|e| {
            // Tests and embedding applications may have installed one already
            if e.to_string().contains("a global default trace dispatcher has already been set") {
                Ok(())
            } else {
                Err(format!("Failed to initialize logging: {}", e))
            }
        })
}

/// Parse log level string into tracing Level
fn parse_log_level(level: &str) -> Result<Level, String> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => Err(format!(
            "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
            level
        )),
    }
}

/// Parse output format name
fn parse_output_format(format: &str) -> Result<OutputFormat, String> {
    match format.to_lowercase().as_str() {
        "pretty" => Ok(OutputFormat::Pretty),
        "compact" => Ok(OutputFormat::Compact),
        "json" => Ok(OutputFormat::Json),
        _ => Err(format!(
            "Invalid log format '{}'. Must be one of: pretty, compact, json",
            format
        )),
    }
}
