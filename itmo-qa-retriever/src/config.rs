//! Runtime configuration.
//!
//! Settings come from an optional TOML file and are then overridden by
//! `ITMO_QA_*` environment variables. The database location has no default:
//! starting without one is a [`ConfigError::Missing`].
//!
//! ```toml
//! [store]
//! database_url = "articles.db"
//! embedding_dimension = 256
//!
//! [retrieval]
//! specializations = ["ai_engineer", "ai_product_manager"]
//! k_per_specialization = 5
//! timeout_ms = 10000
//!
//! [cloud]
//! folder_id = "b1g..."
//! credentials = { api_key = "..." }
//! ```

use crate::storage::RetryPolicy;
use itmo_qa_embed::{CloudEmbedConfig, Credentials, LocalEmbedConfig};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_DATABASE_URL: &str = "ITMO_QA_DATABASE_URL";
pub const ENV_EMBEDDING_DIM: &str = "ITMO_QA_EMBEDDING_DIM";
pub const ENV_TABLE: &str = "ITMO_QA_TABLE";
pub const ENV_FOLDER_ID: &str = "ITMO_QA_FOLDER_ID";
pub const ENV_API_KEY: &str = "ITMO_QA_API_KEY";
pub const ENV_IAM_TOKEN: &str = "ITMO_QA_IAM_TOKEN";

/// Dimension of the cloud text-search models
pub const DEFAULT_EMBEDDING_DIMENSION: usize = 256;
pub const DEFAULT_TABLE: &str = "itmo_articles";
pub const DEFAULT_K_PER_SPECIALIZATION: usize = 5;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required setting: {name}")]
    Missing { name: &'static str },

    #[error("invalid {name}: {message}")]
    Invalid { name: String, message: String },

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

impl ConfigError {
    fn invalid(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Invalid {
            name: name.into(),
            message: message.into(),
        }
    }
}

/// Connection and schema settings of the article store
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite file path or `sqlite:` URL
    pub database_url: String,
    pub table: String,
    /// Length `D` of every stored and queried embedding
    pub embedding_dimension: usize,
    pub max_connections: u32,
    pub busy_timeout_secs: u64,
    pub retry: RetryPolicy,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: String::new(),
            table: DEFAULT_TABLE.to_string(),
            embedding_dimension: DEFAULT_EMBEDDING_DIMENSION,
            max_connections: 8,
            busy_timeout_secs: 5,
            retry: RetryPolicy::default(),
        }
    }
}

impl StoreConfig {
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            ..Self::default()
        }
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    pub fn with_embedding_dimension(mut self, dimension: usize) -> Self {
        self.embedding_dimension = dimension;
        self
    }

    pub fn with_max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_secs(self.busy_timeout_secs)
    }
}

/// How a question is turned into context
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Ordered specialization tags, one context block each
    pub specializations: Vec<String>,
    pub k_per_specialization: usize,
    /// Upper bound for a whole `build_context` call
    pub timeout_ms: Option<u64>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            specializations: vec!["ai_engineer".to_string(), "ai_product_manager".to_string()],
            k_per_specialization: DEFAULT_K_PER_SPECIALIZATION,
            timeout_ms: None,
        }
    }
}

impl RetrievalConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

/// Complete configuration of the service
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub store: StoreConfig,
    pub retrieval: RetrievalConfig,
    /// Cloud embedding models; preferred when present
    pub cloud: Option<CloudEmbedConfig>,
    /// Local ONNX models (`local-models` feature)
    pub local: Option<LocalEmbedConfig>,
}

impl AppConfig {
    /// Loads the file (if any), applies process environment overrides and
    /// validates the result.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::from_sources(path, |name| std::env::var(name).ok())
    }

    /// [`AppConfig::load`] with an explicit environment lookup.
    pub fn from_sources<F>(path: Option<&Path>, env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(env)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Applies `ITMO_QA_*` overrides; empty values count as unset.
    pub fn apply_overrides<F>(&mut self, env: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| env(name).filter(|value| !value.trim().is_empty());

        if let Some(url) = get(ENV_DATABASE_URL) {
            self.store.database_url = url;
        }
        if let Some(table) = get(ENV_TABLE) {
            self.store.table = table;
        }

        let credentials = match (get(ENV_API_KEY), get(ENV_IAM_TOKEN)) {
            (Some(key), _) => Some(Credentials::ApiKey(key)),
            (None, Some(token)) => Some(Credentials::IamToken(token)),
            (None, None) => None,
        };
        match (self.cloud.as_mut(), get(ENV_FOLDER_ID), credentials) {
            (Some(cloud), folder_id, credentials) => {
                if let Some(folder_id) = folder_id {
                    cloud.folder_id = folder_id;
                }
                if let Some(credentials) = credentials {
                    cloud.credentials = credentials;
                }
            }
            (None, Some(folder_id), Some(credentials)) => {
                self.cloud = Some(
                    CloudEmbedConfig::new(folder_id, credentials)
                        .with_dimension(self.store.embedding_dimension),
                );
            }
            (None, Some(_), None) => {
                return Err(ConfigError::Missing {
                    name: "ITMO_QA_API_KEY or ITMO_QA_IAM_TOKEN",
                });
            }
            (None, None, _) => {}
        }

        if let Some(raw) = get(ENV_EMBEDDING_DIM) {
            let dimension = raw
                .trim()
                .parse::<usize>()
                .map_err(|e| ConfigError::invalid(ENV_EMBEDDING_DIM, e.to_string()))?;
            self.store.embedding_dimension = dimension;
            if let Some(cloud) = self.cloud.as_mut() {
                cloud.dimension = dimension;
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.store.database_url.trim().is_empty() {
            return Err(ConfigError::Missing {
                name: ENV_DATABASE_URL,
            });
        }
        if self.store.embedding_dimension == 0 {
            return Err(ConfigError::invalid(
                "store.embedding_dimension",
                "must be positive",
            ));
        }
        if self.retrieval.k_per_specialization == 0 {
            return Err(ConfigError::invalid(
                "retrieval.k_per_specialization",
                "must be positive",
            ));
        }
        if self.retrieval.specializations.is_empty() {
            return Err(ConfigError::invalid(
                "retrieval.specializations",
                "at least one tag is required",
            ));
        }
        if let Some(cloud) = &self.cloud {
            cloud
                .validate()
                .map_err(|e| ConfigError::invalid("cloud", e.to_string()))?;
            if cloud.dimension != self.store.embedding_dimension {
                return Err(ConfigError::invalid(
                    "cloud.dimension",
                    format!(
                        "{} does not match store.embedding_dimension {}",
                        cloud.dimension, self.store.embedding_dimension
                    ),
                ));
            }
        }
        Ok(())
    }
}
