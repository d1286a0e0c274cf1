//! Error types for the embedding providers

/// Result type for embedding operations.
pub type Result<T> = std::result::Result<T, EmbedError>;

/// Errors raised while configuring a provider or encoding text.
///
/// Transport failures (`Request`, retryable `Api` statuses) are retried inside
/// the HTTP provider before they surface here.
#[derive(Debug, thiserror::Error)]
pub enum EmbedError {
    /// Provider configuration is missing or inconsistent
    #[error("Invalid embedding configuration: {message}")]
    InvalidConfig { message: String },

    /// The HTTP request could not be sent or its body could not be read
    #[error("Embedding request failed: {source}")]
    Request {
        #[from]
        source: reqwest::Error,
    },

    /// The embedding API answered with a non-success status
    #[error("Embedding API returned {status}: {body}")]
    Api { status: u16, body: String },

    /// The provider returned a vector of the wrong length
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// The provider returned an empty vector or non-finite components
    #[error("Invalid embedding: {message}")]
    InvalidEmbedding { message: String },

    /// Error raised by a local model while generating embeddings
    #[error("Embedding generation failed: {source}")]
    EmbeddingGeneration {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Async task join errors
    #[error("Async task failed: {source}")]
    AsyncTask {
        #[from]
        source: tokio::task::JoinError,
    },
}

impl EmbedError {
    /// Create an invalid configuration error with a custom message.
    pub fn invalid_config<S: Into<String>>(message: S) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Wrap an error raised while a model produced embeddings.
    pub fn embedding_gen<E>(source: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::EmbeddingGeneration {
            source: source.into(),
        }
    }

    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Request { source } => {
                source.is_timeout() || source.is_connect() || source.is_request()
            }
            Self::Api { status, .. } => *status == 429 || (500..600).contains(status),
            _ => false,
        }
    }
}
