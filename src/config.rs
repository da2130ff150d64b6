//! TOML configuration for an indexing run.
//!
//! ```toml
//! [index]
//! path = "xapian"
//!
//! [repository]
//! path = "repo/primary.json"
//! archive_root = "repo/packages"
//!
//! [owners]
//! path = "owners.json"
//!
//! [icons]
//! output_dir = "icons"
//! ```
//!
//! Only `[index]` and `[repository]` are required; everything else has
//! defaults.

use crate::cache::{RetryPolicy, DEFAULT_MAX_ATTEMPTS};
use crate::model::DEFAULT_ICON;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{}': {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexerConfig {
    pub index: IndexConfig,
    pub repository: RepositoryConfig,
    /// Absent means no maintainer data.
    #[serde(default)]
    pub owners: Option<OwnersConfig>,
    #[serde(default)]
    pub icons: IconsConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RepositoryConfig {
    pub path: PathBuf,
    #[serde(default)]
    pub archive_root: Option<PathBuf>,
    #[serde(default = "default_arches")]
    pub arches: Vec<String>,
}

fn default_arches() -> Vec<String> {
    vec!["x86_64".to_string(), "noarch".to_string(), "src".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct OwnersConfig {
    pub path: PathBuf,
    #[serde(default = "default_collection")]
    pub collection: String,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

fn default_collection() -> String {
    "Fedora".to_string()
}
fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}
fn default_retry_delay_ms() -> u64 {
    500
}

impl OwnersConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            delay: Duration::from_millis(self.retry_delay_ms),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct IconsConfig {
    /// Theme packages in precedence order.
    #[serde(default = "default_themes")]
    pub themes: Vec<String>,
    #[serde(default = "default_icon_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_icon")]
    pub default_icon: String,
}

fn default_themes() -> Vec<String> {
    vec!["gnome-icon-theme".to_string(), "oxygen-icon-theme".to_string()]
}
fn default_icon_dir() -> PathBuf {
    PathBuf::from("icons")
}
fn default_icon() -> String {
    DEFAULT_ICON.to_string()
}

impl Default for IconsConfig {
    fn default() -> Self {
        Self {
            themes: default_themes(),
            output_dir: default_icon_dir(),
            default_icon: default_icon(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    /// Entries enriched at the same time. 1 keeps the run sequential.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
}

fn default_concurrency() -> usize {
    1
}
fn default_fetch_timeout_secs() -> u64 {
    300
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
        }
    }
}

impl PipelineConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

impl IndexerConfig {
    /// Parses and validates a TOML document.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: IndexerConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.pipeline.concurrency == 0 {
            return Err(ConfigError::Invalid("pipeline.concurrency must be >= 1".into()));
        }
        if self.pipeline.fetch_timeout_secs == 0 {
            return Err(ConfigError::Invalid("pipeline.fetch_timeout_secs must be > 0".into()));
        }
        if self.icons.default_icon.trim().is_empty() {
            return Err(ConfigError::Invalid("icons.default_icon must not be empty".into()));
        }
        if let Some(owners) = &self.owners {
            if owners.max_attempts == 0 {
                return Err(ConfigError::Invalid("owners.max_attempts must be >= 1".into()));
            }
            if owners.collection.is_empty() {
                return Err(ConfigError::Invalid("owners.collection must not be empty".into()));
            }
        }
        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<IndexerConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    IndexerConfig::from_toml(&content)
}
