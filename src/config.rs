//! Layered configuration: defaults, then `cinesync.toml`, then `CS_`-
//! prefixed environment variables.
//!
//! Environment variables use double underscores between nesting levels:
//! - `CS_ETL__BATCH_SIZE=500` sets `etl.batch_size`
//! - `CS_SOURCE__DB_PATH=/data/catalog.db` sets `source.db_path`

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(default)]
    pub source: SourceConfig,

    #[serde(default)]
    pub index: IndexConfig,

    #[serde(default)]
    pub etl: EtlConfig,

    #[serde(default)]
    pub backoff: BackoffConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SourceConfig {
    /// Path to the catalog database
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct IndexConfig {
    /// Directory holding one tantivy index per document kind
    #[serde(default = "default_index_root")]
    pub root: PathBuf,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EtlConfig {
    /// Seconds to sleep between cycles
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Maximum ids per page throughout the pipeline; must be positive
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Path of the persisted watermark file
    #[serde(default = "default_state_path")]
    pub state_path: PathBuf,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct BackoffConfig {
    /// First reconnect delay in milliseconds
    #[serde(default = "default_backoff_base_ms")]
    pub base_ms: u64,

    /// Multiplier applied per attempt
    #[serde(default = "default_backoff_factor")]
    pub factor: u32,

    /// Delay ceiling in milliseconds
    #[serde(default = "default_backoff_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Consecutive failures tolerated before the dependency is declared
    /// unreachable
    #[serde(default = "default_backoff_max_attempts")]
    pub max_attempts: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Default level filter (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub default: String,

    /// Per-module overrides
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

// Default value functions
fn default_version() -> u32 {
    1
}
fn default_db_path() -> PathBuf {
    PathBuf::from("catalog.db")
}
fn default_index_root() -> PathBuf {
    PathBuf::from(".cinesync/index")
}
fn default_interval_secs() -> u64 {
    60
}
fn default_batch_size() -> usize {
    100
}
fn default_state_path() -> PathBuf {
    PathBuf::from(".cinesync/state.json")
}
fn default_backoff_base_ms() -> u64 {
    500
}
fn default_backoff_factor() -> u32 {
    2
}
fn default_backoff_max_delay_ms() -> u64 {
    60_000
}
fn default_backoff_max_attempts() -> u32 {
    8
}
fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            source: SourceConfig::default(),
            index: IndexConfig::default(),
            etl: EtlConfig::default(),
            backoff: BackoffConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            root: default_index_root(),
        }
    }
}

impl Default for EtlConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            batch_size: default_batch_size(),
            state_path: default_state_path(),
        }
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_ms: default_backoff_base_ms(),
            factor: default_backoff_factor(),
            max_delay_ms: default_backoff_max_delay_ms(),
            max_attempts: default_backoff_max_attempts(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: HashMap::new(),
        }
    }
}

impl Settings {
    /// Loads configuration from `cinesync.toml` in the working directory.
    pub fn load() -> Result<Self, figment::Error> {
        Self::load_from(Path::new("cinesync.toml"))
    }

    /// Loads configuration from an explicit TOML path.
    pub fn load_from(path: &Path) -> Result<Self, figment::Error> {
        let settings: Settings = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("CS_").split("__"))
            .extract()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), figment::Error> {
        if self.etl.batch_size == 0 {
            return Err(figment::Error::from(
                "etl.batch_size must be positive".to_string(),
            ));
        }
        if self.backoff.factor == 0 {
            return Err(figment::Error::from(
                "backoff.factor must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
