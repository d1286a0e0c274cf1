//! The embedding provider contract shared by all backends

use crate::error::{EmbedError, Result};
use async_trait::async_trait;
use std::fmt;

/// Which side of retrieval a text is encoded for.
///
/// Asymmetric embedding models use different weights (or prompts) for the
/// indexed documents and for the questions searched against them, so the two
/// must never be mixed up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EmbeddingMode {
    /// Indexing time: article bodies
    Document,
    /// Retrieval time: user questions
    Query,
}

impl fmt::Display for EmbeddingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Document => f.write_str("document"),
            Self::Query => f.write_str("query"),
        }
    }
}

/// Trait for providers that turn text into fixed-length float vectors
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Encode text in the given mode
    async fn embed(&self, text: &str, mode: EmbeddingMode) -> Result<Vec<f32>>;

    /// Encode an article body for storage
    async fn encode_document(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(text, EmbeddingMode::Document).await
    }

    /// Encode a user question for similarity search
    async fn encode_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(text, EmbeddingMode::Query).await
    }

    /// Get the dimension of embeddings produced by this provider
    fn embedding_dimension(&self) -> usize;

    /// Get the name/identifier of this provider
    fn provider_name(&self) -> &str;
}

/// Checks a freshly produced vector against the provider's dimension.
///
/// Rejects empty vectors, wrong lengths, and NaN or infinite components.
pub fn validate_embedding(embedding: &[f32], expected_dimension: usize) -> Result<()> {
    if embedding.is_empty() {
        return Err(EmbedError::InvalidEmbedding {
            message: "empty embedding".to_string(),
        });
    }
    if embedding.len() != expected_dimension {
        return Err(EmbedError::DimensionMismatch {
            expected: expected_dimension,
            actual: embedding.len(),
        });
    }
    if embedding.iter().any(|value| !value.is_finite()) {
        return Err(EmbedError::InvalidEmbedding {
            message: "non-finite values in embedding".to_string(),
        });
    }
    Ok(())
}
