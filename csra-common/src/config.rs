//! Configuration loading
//!
//! Config file resolution priority:
//! 1. Explicit path (command-line argument)
//! 2. `CSRA_CONFIG` environment variable
//! 3. `<config dir>/csra/config.toml`
//! 4. Compiled defaults
//!
//! A missing config file is never fatal: a warning is logged and defaults are
//! used. A file that exists but does not parse is an error.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "CSRA_CONFIG";

/// User-Agent sent to both review sources
pub fn get_user_agent() -> String {
    format!(
        "CSRA/{} (consumer security review analysis)",
        env!("CARGO_PKG_VERSION")
    )
}

/// Top-level TOML configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TomlConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub collection: CollectionConfig,
}

/// `[logging]` section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// tracing filter directive (e.g. "info", "csra_collector=debug")
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// `[collection]` section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CollectionConfig {
    /// Country used when a run does not specify one
    #[serde(default = "default_country")]
    pub default_country: String,
    /// Review language requested from the Play Store
    #[serde(default = "default_lang")]
    pub lang: String,
    /// Reviews requested per Play Store page
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// Politeness delay between successful page fetches
    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,
    /// First retry delay after a throttled or failed fetch
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    /// Upper bound for a single retry delay
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,
    /// Fetch attempts per page, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Directory for exported CSV files
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Security taxonomy file; the built-in taxonomy is used when absent
    #[serde(default)]
    pub taxonomy_path: Option<PathBuf>,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            default_country: default_country(),
            lang: default_lang(),
            page_size: default_page_size(),
            request_delay_ms: default_request_delay_ms(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
            max_attempts: default_max_attempts(),
            output_dir: default_output_dir(),
            taxonomy_path: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_country() -> String {
    "us".to_string()
}

fn default_lang() -> String {
    "en".to_string()
}

fn default_page_size() -> usize {
    200
}

fn default_request_delay_ms() -> u64 {
    1000
}

fn default_retry_base_delay_ms() -> u64 {
    1000
}

fn default_retry_max_delay_ms() -> u64 {
    30_000
}

fn default_max_attempts() -> u32 {
    5
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("data")
}

impl TomlConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: TomlConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    /// Reject values the collector cannot work with
    pub fn validate(&self) -> Result<()> {
        let c = &self.collection;
        if c.page_size == 0 {
            return Err(Error::Config("collection.page_size must be > 0".to_string()));
        }
        if c.max_attempts == 0 {
            return Err(Error::Config("collection.max_attempts must be > 0".to_string()));
        }
        if c.retry_max_delay_ms < c.retry_base_delay_ms {
            return Err(Error::Config(
                "collection.retry_max_delay_ms must be >= retry_base_delay_ms".to_string(),
            ));
        }
        if c.default_country.trim().len() != 2 {
            return Err(Error::Config(format!(
                "collection.default_country must be a 2-letter code, got '{}'",
                c.default_country
            )));
        }
        Ok(())
    }

    /// Apply per-key environment overrides
    ///
    /// `CSRA_COUNTRY`, `CSRA_OUTPUT_DIR`, `CSRA_TAXONOMY`
    pub fn apply_env_overrides(&mut self) {
        if let Ok(country) = std::env::var("CSRA_COUNTRY") {
            if !country.trim().is_empty() {
                self.collection.default_country = country.trim().to_ascii_lowercase();
            }
        }
        if let Ok(dir) = std::env::var("CSRA_OUTPUT_DIR") {
            if !dir.trim().is_empty() {
                self.collection.output_dir = PathBuf::from(dir);
            }
        }
        if let Ok(path) = std::env::var("CSRA_TAXONOMY") {
            if !path.trim().is_empty() {
                self.collection.taxonomy_path = Some(PathBuf::from(path));
            }
        }
    }
}

/// Values given on the command line, which win over every config source
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CliOverrides {
    pub country: Option<String>,
    pub lang: Option<String>,
    /// Politeness delay in seconds
    pub delay_secs: Option<f64>,
}

impl TomlConfig {
    /// Apply command-line overrides and validate the result
    pub fn apply_cli_overrides(&mut self, overrides: &CliOverrides) -> Result<()> {
        if let Some(country) = &overrides.country {
            self.collection.default_country = country.trim().to_ascii_lowercase();
        }
        if let Some(lang) = &overrides.lang {
            self.collection.lang = lang.trim().to_string();
        }
        if let Some(delay) = overrides.delay_secs {
            if !delay.is_finite() || delay < 0.0 {
                return Err(Error::Config(
                    "delay must be a non-negative number of seconds".to_string(),
                ));
            }
            self.collection.request_delay_ms = (delay * 1000.0).round() as u64;
        }
        self.validate()
    }
}

/// Resolves which config file to load and loads it
pub struct ConfigResolver {
    cli_path: Option<PathBuf>,
}

impl ConfigResolver {
    pub fn new(cli_path: Option<PathBuf>) -> Self {
        Self { cli_path }
    }

    /// Config file path by priority, if any source names one
    pub fn config_path(&self) -> Option<PathBuf> {
        // Priority 1: Command-line argument
        if let Some(path) = &self.cli_path {
            return Some(path.clone());
        }

        // Priority 2: Environment variable
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            if !path.trim().is_empty() {
                return Some(PathBuf::from(path));
            }
        }

        // Priority 3: Platform config directory
        dirs::config_dir().map(|d| d.join("csra").join("config.toml"))
    }

    /// Load the resolved config, falling back to defaults when no file exists
    pub fn resolve(&self) -> Result<TomlConfig> {
        let mut config = match self.config_path() {
            Some(path) if path.exists() => {
                let config = TomlConfig::load(&path)?;
                info!("Configuration loaded from {}", path.display());
                config
            }
            Some(path) => {
                warn!(
                    "Config file not found at {}, using compiled defaults",
                    path.display()
                );
                TomlConfig::default()
            }
            None => {
                warn!("No config directory available, using compiled defaults");
                TomlConfig::default()
            }
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }
}
