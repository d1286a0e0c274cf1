//! Configuration for embedding providers

use crate::error::{EmbedError, Result};
use crate::provider::EmbeddingMode;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Default REST endpoint of the cloud text-embedding API
pub const DEFAULT_CLOUD_ENDPOINT: &str =
    "https://llm.api.cloud.yandex.net/foundationModels/v1/textEmbedding";

/// Output dimension of the cloud text-search models
pub const DEFAULT_CLOUD_DIMENSION: usize = 256;

/// Credentials attached to every cloud request.
///
/// Tokens are supplied by the caller; nothing here mints them.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Credentials {
    /// Static API key of a service account
    ApiKey(String),
    /// Short-lived IAM token
    IamToken(String),
}

impl Credentials {
    /// Value of the `Authorization` header
    pub fn authorization_header(&self) -> String {
        match self {
            Self::ApiKey(key) => format!("Api-Key {key}"),
            Self::IamToken(token) => format!("Bearer {token}"),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ApiKey(_) => f.write_str("ApiKey(<redacted>)"),
            Self::IamToken(_) => f.write_str("IamToken(<redacted>)"),
        }
    }
}

/// Configuration for the cloud embedding provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudEmbedConfig {
    /// Endpoint accepting `{"modelUri", "text"}` requests
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Cloud folder that owns the models
    pub folder_id: String,
    /// Authentication for the folder
    pub credentials: Credentials,
    /// Model used for article bodies
    #[serde(default = "default_document_model")]
    pub document_model: String,
    /// Model used for user questions
    #[serde(default = "default_query_model")]
    pub query_model: String,
    /// Model version tag appended to the URI
    #[serde(default = "default_model_version")]
    pub model_version: String,
    /// Expected length of every returned vector
    #[serde(default = "default_dimension")]
    pub dimension: usize,
    /// Attempts per request, including the first one
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_endpoint() -> String {
    DEFAULT_CLOUD_ENDPOINT.to_string()
}

fn default_document_model() -> String {
    "text-search-doc".to_string()
}

fn default_query_model() -> String {
    "text-search-query".to_string()
}

fn default_model_version() -> String {
    "latest".to_string()
}

fn default_dimension() -> usize {
    DEFAULT_CLOUD_DIMENSION
}

fn default_max_retries() -> usize {
    3
}

fn default_timeout_secs() -> u64 {
    30
}

impl CloudEmbedConfig {
    /// Create a configuration with default models for a folder.
    pub fn new(folder_id: impl Into<String>, credentials: Credentials) -> Self {
        Self {
            endpoint: default_endpoint(),
            folder_id: folder_id.into(),
            credentials,
            document_model: default_document_model(),
            query_model: default_query_model(),
            model_version: default_model_version(),
            dimension: default_dimension(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = dimension;
        self
    }

    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = timeout.as_secs().max(1);
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Model URI for the given mode, e.g. `emb://<folder>/text-search-doc/latest`.
    pub fn model_uri(&self, mode: EmbeddingMode) -> String {
        let model = match mode {
            EmbeddingMode::Document => &self.document_model,
            EmbeddingMode::Query => &self.query_model,
        };
        format!("emb://{}/{}/{}", self.folder_id, model, self.model_version)
    }

    /// Validate that the configuration can be used to build a provider.
    pub fn validate(&self) -> Result<()> {
        if self.folder_id.trim().is_empty() {
            return Err(EmbedError::invalid_config("folder_id is required"));
        }
        let secret = match &self.credentials {
            Credentials::ApiKey(value) | Credentials::IamToken(value) => value,
        };
        if secret.trim().is_empty() {
            return Err(EmbedError::invalid_config("credentials are empty"));
        }
        if self.document_model == self.query_model {
            tracing::warn!(
                "Document and query models are both '{}'; asymmetric search quality will suffer",
                self.document_model
            );
        }
        if self.dimension == 0 {
            return Err(EmbedError::invalid_config("dimension must be positive"));
        }
        if self.max_retries == 0 {
            return Err(EmbedError::invalid_config("max_retries must be at least 1"));
        }
        Ok(())
    }
}

/// Configuration for local ONNX models (`local-models` feature).
///
/// Asymmetric sentence-embedding models are steered with text prefixes
/// rather than separate weights.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalEmbedConfig {
    /// fastembed model code, e.g. `intfloat/multilingual-e5-small`
    pub model_code: String,
    /// Prefix prepended to article bodies
    #[serde(default = "default_document_prefix")]
    pub document_prefix: String,
    /// Prefix prepended to user questions
    #[serde(default = "default_query_prefix")]
    pub query_prefix: String,
    /// Whether to L2-normalize outputs
    #[serde(default = "default_normalize")]
    pub normalize: bool,
}

fn default_document_prefix() -> String {
    "passage: ".to_string()
}

fn default_query_prefix() -> String {
    "query: ".to_string()
}

fn default_normalize() -> bool {
    true
}

impl Default for LocalEmbedConfig {
    fn default() -> Self {
        Self {
            model_code: "intfloat/multilingual-e5-small".to_string(),
            document_prefix: default_document_prefix(),
            query_prefix: default_query_prefix(),
            normalize: default_normalize(),
        }
    }
}

impl LocalEmbedConfig {
    pub fn with_model_code(mut self, model_code: impl Into<String>) -> Self {
        self.model_code = model_code.into();
        self
    }

    pub fn with_normalize(mut self, normalize: bool) -> Self {
        self.normalize = normalize;
        self
    }

    /// Text actually fed to the model for the given mode
    pub fn prepare(&self, text: &str, mode: EmbeddingMode) -> String {
        match mode {
            EmbeddingMode::Document => format!("{}{}", self.document_prefix, text),
            EmbeddingMode::Query => format!("{}{}", self.query_prefix, text),
        }
    }
}
