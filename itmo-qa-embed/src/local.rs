//! Local ONNX embedding provider built on fastembed.
//!
//! Useful for offline indexing and development. One `TextEmbedding` instance
//! serves both modes; the mode is expressed through text prefixes.

use crate::config::LocalEmbedConfig;
use crate::error::{EmbedError, Result};
use crate::provider::{EmbeddingMode, EmbeddingProvider, validate_embedding};
use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::sync::{Arc, Mutex};

/// fastembed-backed provider
#[derive(Clone)]
pub struct LocalEmbedProvider {
    config: LocalEmbedConfig,
    model: Arc<Mutex<TextEmbedding>>,
    dimension: usize,
}

impl std::fmt::Debug for LocalEmbedProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalEmbedProvider")
            .field("config", &self.config)
            .field("dimension", &self.dimension)
            .finish()
    }
}

impl LocalEmbedProvider {
    /// Download (if needed) and load the configured model.
    pub async fn create(config: LocalEmbedConfig) -> Result<Self> {
        let supported = TextEmbedding::list_supported_models();
        let info = supported
            .into_iter()
            .find(|info| info.model_code == config.model_code)
            .ok_or_else(|| {
                EmbedError::invalid_config(format!(
                    "unsupported local model: {}",
                    config.model_code
                ))
            })?;
        let model_kind: EmbeddingModel = info.model;
        let dimension = info.dim;

        tracing::info!(
            "Loading local embedding model {} ({} dimensions)",
            config.model_code,
            dimension
        );
        let model = tokio::task::spawn_blocking(move || -> Result<TextEmbedding> {
            TextEmbedding::try_new(
                InitOptions::new(model_kind).with_show_download_progress(true),
            )
            .map_err(EmbedError::embedding_gen)
        })
        .await??;

        Ok(Self {
            config,
            model: Arc::new(Mutex::new(model)),
            dimension,
        })
    }

    fn normalize(mut embedding: Vec<f32>) -> Vec<f32> {
        let norm = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut embedding {
                *value /= norm;
            }
        }
        embedding
    }
}

#[async_trait]
impl EmbeddingProvider for LocalEmbedProvider {
    async fn embed(&self, text: &str, mode: EmbeddingMode) -> Result<Vec<f32>> {
        let input = self.config.prepare(text, mode);
        let model = Arc::clone(&self.model);

        let mut embeddings = tokio::task::spawn_blocking(move || -> Result<Vec<Vec<f32>>> {
            let mut model_guard = model
                .lock()
                .map_err(|_| EmbedError::invalid_config("local model lock poisoned"))?;
            model_guard
                .embed(vec![input], None)
                .map_err(EmbedError::embedding_gen)
        })
        .await??;

        let embedding = embeddings.pop().ok_or_else(|| EmbedError::InvalidEmbedding {
            message: "model returned no embedding".to_string(),
        })?;
        let embedding = if self.config.normalize {
            Self::normalize(embedding)
        } else {
            embedding
        };
        validate_embedding(&embedding, self.dimension)?;
        Ok(embedding)
    }

    fn embedding_dimension(&self) -> usize {
        self.dimension
    }

    fn provider_name(&self) -> &str {
        "fastembed"
    }
}
