//! Pipeline configuration
//!
//! Loaded from an optional TOML file, then overridden by `FIGGY__*`
//! environment variables using `__` as the section separator, e.g.
//! `FIGGY__STORAGE__UPLOAD_ATTEMPTS=3` or
//! `FIGGY__INDEXING__NO_INDEX_MODELS=FileSet,Event`.

use crate::change_set_persister::PersisterOptions;
use crate::errors::{FiggyError, Result};
use crate::logging_facility::Profile;
use ::config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

const ENV_PREFIX: &str = "FIGGY";

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub indexing: IndexingConfig,

    #[serde(default)]
    pub persister: PersisterConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite file; in-memory when absent
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct IndexingConfig {
    /// Models never written to the search index
    #[serde(default)]
    pub no_index_models: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PersisterConfig {
    #[serde(default = "default_characterize")]
    pub characterize: bool,

    #[serde(default = "default_queue")]
    pub queue: String,
}

impl Default for PersisterConfig {
    fn default() -> Self {
        Self {
            characterize: default_characterize(),
            queue: default_queue(),
        }
    }
}

impl From<&PersisterConfig> for PersisterOptions {
    fn from(config: &PersisterConfig) -> Self {
        PersisterOptions {
            transaction: false,
            characterize: config.characterize,
            queue: config.queue.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StorageConfig {
    /// Root directory for uploaded files; in-memory storage when absent
    #[serde(default)]
    pub repository_path: Option<PathBuf>,

    /// Older repository consulted when a file is missing from the primary
    #[serde(default)]
    pub fallback_path: Option<PathBuf>,

    /// Total upload attempts on transient I/O errors
    #[serde(default = "default_upload_attempts")]
    pub upload_attempts: u32,

    #[serde(default = "default_delay_check_timeout_ms")]
    pub delay_check_timeout_ms: u64,
}

impl StorageConfig {
    pub fn delay_check_timeout(&self) -> Duration {
        Duration::from_millis(self.delay_check_timeout_ms)
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            repository_path: None,
            fallback_path: None,
            upload_attempts: default_upload_attempts(),
            delay_check_timeout_ms: default_delay_check_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub profile: Profile,
}

fn default_characterize() -> bool {
    true
}

fn default_queue() -> String {
    "default".to_string()
}

fn default_upload_attempts() -> u32 {
    5
}

fn default_delay_check_timeout_ms() -> u64 {
    1000
}

impl PipelineConfig {
    /// Load from an optional TOML file layered under `FIGGY__*` variables
    ///
    /// # Errors
    ///
    /// Returns [`FiggyError::Config`] if the file cannot be read or parsed,
    /// or if the merged values are invalid.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).format(FileFormat::Toml));
        }
        let config: Self = builder
            .add_source(environment())
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse TOML without consulting the environment
    ///
    /// # Errors
    ///
    /// Returns [`FiggyError::Config`] on invalid TOML or invalid values.
    pub fn from_toml_str(toml: &str) -> Result<Self> {
        let config: Self = Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    ///
    /// Returns [`FiggyError::Config`] when a value is out of range.
    pub fn validate(&self) -> Result<()> {
        if self.storage.upload_attempts == 0 {
            return Err(FiggyError::Config {
                message: "storage.upload_attempts must be at least 1".to_string(),
            });
        }
        if self.storage.fallback_path.is_some() && self.storage.repository_path.is_none() {
            return Err(FiggyError::Config {
                message: "storage.fallback_path requires storage.repository_path".to_string(),
            });
        }
        Ok(())
    }

    pub fn persister_options(&self) -> PersisterOptions {
        PersisterOptions::from(&self.persister)
    }
}

fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .separator("__")
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("indexing.no_index_models")
}
