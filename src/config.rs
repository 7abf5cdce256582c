//! Builder configuration using Figment
//!
//! Configuration is layered from:
//! 1. built-in defaults,
//! 2. `trialflow.toml` (or the file given on the command line),
//! 3. environment variables prefixed with `TRIALFLOW_`, with `__` separating
//!    sections from keys.
//!
//! # Example
//! ```no_run
//! use trialflow::config::BuilderConfig;
//!
//! let config = BuilderConfig::load()?;
//! config.validate().map_err(trialflow::BuilderError::Configuration)?;
//! println!("indent width: {}", config.codegen.indent_width);
//! # Ok::<(), trialflow::BuilderError>(())
//! ```

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default configuration file name.
pub const CONFIG_FILE: &str = "trialflow.toml";

/// Prefix of overriding environment variables.
pub const ENV_PREFIX: &str = "TRIALFLOW_";

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuilderConfig {
    /// Application settings
    #[serde(default)]
    pub application: ApplicationConfig,
    /// Script generation settings
    #[serde(default)]
    pub codegen: CodegenConfig,
    /// Experiment document settings
    #[serde(default)]
    pub document: DocumentConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Application name
    #[serde(default = "default_name")]
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Log output format (pretty, compact, json)
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

/// Script generation configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodegenConfig {
    /// Spaces per indent level in generated scripts
    #[serde(default = "default_indent_width")]
    pub indent_width: usize,
}

/// Experiment document configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentConfig {
    /// Encoding declared on the document root
    #[serde(default = "default_encoding")]
    pub encoding: String,
}

// Default value functions
fn default_name() -> String {
    "trialflow".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "compact".to_string()
}

fn default_indent_width() -> usize {
    4
}

fn default_encoding() -> String {
    "utf-8".to_string()
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

impl Default for CodegenConfig {
    fn default() -> Self {
        Self {
            indent_width: default_indent_width(),
        }
    }
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            encoding: default_encoding(),
        }
    }
}

impl BuilderConfig {
    /// Load configuration from `trialflow.toml` and environment variables
    ///
    /// Example: `TRIALFLOW_CODEGEN__INDENT_WIDTH=2`
    pub fn load() -> Result<Self, figment::Error> {
        Self::load_from(CONFIG_FILE)
    }

    /// Load configuration from a specific file path. A missing file leaves the defaults.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, figment::Error> {
        Figment::from(Serialized::defaults(BuilderConfig::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), String> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.as_str()) {
            return Err(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            ));
        }

        let valid_formats = ["pretty", "compact", "json"];
        if !valid_formats.contains(&self.application.log_format.as_str()) {
            return Err(format!(
                "Invalid log_format '{}'. Must be one of: {}",
                self.application.log_format,
                valid_formats.join(", ")
            ));
        }

        if !(1..=8).contains(&self.codegen.indent_width) {
            return Err(format!(
                "Invalid indent_width {}. Must be 1-8",
                self.codegen.indent_width
            ));
        }

        if self.document.encoding.trim().is_empty() {
            return Err("Document encoding must not be empty".to_string());
        }

        Ok(())
    }
}
