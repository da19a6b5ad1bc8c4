//! Pipeline configuration.
//!
//! One [`PipelineConfig`] value is built in `main` from defaults, an optional
//! TOML file, `DATABASE_URL`, and command-line overrides (in that order of
//! increasing precedence), then passed by reference into every stage.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sih_load::mask_database_url;
use sih_model::{AggregateOptions, AggregationStrategy, CopyOptions};
use sqlx::postgres::PgConnectOptions;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid database URL {url}: {message}")]
    DatabaseUrl { url: String, message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Raw admission files (parquet or csv), searched recursively.
    pub input_dir: PathBuf,
    /// Normalized and aggregated artifacts.
    pub interim_dir: PathBuf,
    /// One artifact per projected relation.
    pub processed_dir: PathBuf,
    /// Externally produced lookup relations.
    pub reference_dir: PathBuf,
    pub scratch_dir: Option<PathBuf>,
    pub chunk_size: usize,
    pub merge_fan_in: usize,
    pub strategy: AggregationStrategy,
    pub backup_existing: bool,
    /// Normalization rule set overriding the built-in one.
    pub rule_set: Option<PathBuf>,
    /// Relation registry overriding the built-in catalog.
    pub registry: Option<PathBuf>,
    pub database: DatabaseConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let aggregate = AggregateOptions::default();
        Self {
            input_dir: PathBuf::from("data/raw"),
            interim_dir: PathBuf::from("data/interim"),
            processed_dir: PathBuf::from("data/processed"),
            reference_dir: PathBuf::from("data/reference"),
            scratch_dir: None,
            chunk_size: aggregate.chunk_size,
            merge_fan_in: aggregate.merge_fan_in,
            strategy: aggregate.strategy,
            backup_existing: true,
            rule_set: None,
            registry: None,
            database: DatabaseConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Full connection URL; replaces the discrete fields when set.
    pub url: Option<String>,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: Option<String>,
    pub load_chunk_size: usize,
    pub delimiter: char,
    pub null: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        let copy = CopyOptions::default();
        Self {
            url: None,
            host: "localhost".to_string(),
            port: 5432,
            database: "sih".to_string(),
            user: "postgres".to_string(),
            password: None,
            load_chunk_size: copy.chunk_size,
            delimiter: copy.delimiter,
            null: copy.null,
        }
    }
}

impl DatabaseConfig {
    /// Connection settings: the parsed `url` when set, otherwise the discrete
    /// fields taken verbatim, so credentials need no escaping.
    pub fn connect_options(&self) -> Result<PgConnectOptions, ConfigError> {
        if let Some(url) = &self.url {
            return url
                .parse::<PgConnectOptions>()
                .map_err(|e| ConfigError::DatabaseUrl {
                    url: mask_database_url(url),
                    message: e.to_string(),
                });
        }
        let mut options = PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .database(&self.database);
        if let Some(password) = &self.password {
            options = options.password(password);
        }
        Ok(options)
    }

    pub fn copy_options(&self) -> CopyOptions {
        CopyOptions::default()
            .with_chunk_size(self.load_chunk_size)
            .with_delimiter(self.delimiter)
            .with_null(&self.null)
    }
}

/// Values given on the command line.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub input_dir: Option<PathBuf>,
    pub interim_dir: Option<PathBuf>,
    pub processed_dir: Option<PathBuf>,
    pub reference_dir: Option<PathBuf>,
    pub scratch_dir: Option<PathBuf>,
    pub chunk_size: Option<usize>,
    pub merge_fan_in: Option<usize>,
    pub strategy: Option<AggregationStrategy>,
    pub no_backup: bool,
    pub rule_set: Option<PathBuf>,
    pub registry: Option<PathBuf>,
    pub database_url: Option<String>,
}

impl PipelineConfig {
    pub fn from_toml_str(text: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|source| ConfigError::Toml {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text, path)
    }

    /// Defaults or `path`, then `database_url` from the environment, then
    /// command-line overrides.
    pub fn resolve(
        path: Option<&Path>,
        database_url: Option<String>,
        overrides: &ConfigOverrides,
    ) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        if let Some(url) = database_url.filter(|u| !u.is_empty()) {
            config.database.url = Some(url);
        }
        config.apply(overrides);
        Ok(config)
    }

    pub fn apply(&mut self, overrides: &ConfigOverrides) {
        let set = |target: &mut PathBuf, value: &Option<PathBuf>| {
            if let Some(value) = value {
                target.clone_from(value);
            }
        };
        set(&mut self.input_dir, &overrides.input_dir);
        set(&mut self.interim_dir, &overrides.interim_dir);
        set(&mut self.processed_dir, &overrides.processed_dir);
        set(&mut self.reference_dir, &overrides.reference_dir);
        if overrides.scratch_dir.is_some() {
            self.scratch_dir.clone_from(&overrides.scratch_dir);
        }
        if let Some(size) = overrides.chunk_size {
            self.chunk_size = size;
        }
        if let Some(fan_in) = overrides.merge_fan_in {
            self.merge_fan_in = fan_in;
        }
        if let Some(strategy) = overrides.strategy {
            self.strategy = strategy;
        }
        if overrides.no_backup {
            self.backup_existing = false;
        }
        if overrides.rule_set.is_some() {
            self.rule_set.clone_from(&overrides.rule_set);
        }
        if overrides.registry.is_some() {
            self.registry.clone_from(&overrides.registry);
        }
        if overrides.database_url.is_some() {
            self.database.url.clone_from(&overrides.database_url);
        }
    }

    pub fn aggregate_options(&self) -> AggregateOptions {
        AggregateOptions::new()
            .with_strategy(self.strategy)
            .with_chunk_size(self.chunk_size)
            .with_merge_fan_in(self.merge_fan_in)
            .with_scratch_dir(self.scratch_dir.clone())
    }

    pub fn normalized_path(&self) -> PathBuf {
        self.interim_dir.join("sih_normalized.parquet")
    }

    pub fn aggregated_path(&self) -> PathBuf {
        self.interim_dir.join("sih_aggregated.parquet")
    }
}
