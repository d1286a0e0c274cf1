//! HTTP provider for the cloud text-embedding API.
//!
//! Each call sends one text to either the document or the query model and
//! returns its dense vector. Throttling (429), server errors and transport
//! failures are retried with exponential backoff; anything else is returned
//! to the caller immediately.

use crate::config::CloudEmbedConfig;
use crate::error::{EmbedError, Result};
use crate::provider::{EmbeddingMode, EmbeddingProvider, validate_embedding};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbeddingRequest<'a> {
    model_uri: &'a str,
    text: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EmbeddingResponse {
    embedding: Vec<f32>,
    #[serde(default)]
    model_version: Option<String>,
}

/// Embedding provider backed by the cloud REST API
#[derive(Debug, Clone)]
pub struct CloudEmbedProvider {
    config: CloudEmbedConfig,
    client: reqwest::Client,
    document_uri: String,
    query_uri: String,
}

impl CloudEmbedProvider {
    /// Build a provider after validating the configuration.
    pub fn new(config: CloudEmbedConfig) -> Result<Self> {
        config.validate()?;
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()?;
        let document_uri = config.model_uri(EmbeddingMode::Document);
        let query_uri = config.model_uri(EmbeddingMode::Query);
        Ok(Self {
            config,
            client,
            document_uri,
            query_uri,
        })
    }

    pub fn config(&self) -> &CloudEmbedConfig {
        &self.config
    }

    async fn request_once(&self, model_uri: &str, text: &str) -> Result<Vec<f32>> {
        let response = self
            .client
            .post(&self.config.endpoint)
            .header(
                reqwest::header::AUTHORIZATION,
                self.config.credentials.authorization_header(),
            )
            .header("x-folder-id", &self.config.folder_id)
            .json(&EmbeddingRequest { model_uri, text })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(EmbedError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: EmbeddingResponse = response.json().await?;
        if let Some(version) = &parsed.model_version {
            debug!("Embedded {} chars with model version {}", text.len(), version);
        }
        Ok(parsed.embedding)
    }

    fn retry_backoff(attempt: usize) -> Duration {
        let capped = attempt.min(5) as u32;
        Duration::from_millis(200 * (1 << capped))
    }
}

#[async_trait]
impl EmbeddingProvider for CloudEmbedProvider {
    async fn embed(&self, text: &str, mode: EmbeddingMode) -> Result<Vec<f32>> {
        let model_uri = match mode {
            EmbeddingMode::Document => &self.document_uri,
            EmbeddingMode::Query => &self.query_uri,
        };

        let mut attempt = 0usize;
        loop {
            match self.request_once(model_uri, text).await {
                Ok(embedding) => {
                    validate_embedding(&embedding, self.config.dimension)?;
                    return Ok(embedding);
                }
                Err(err) if err.is_transient() && attempt + 1 < self.config.max_retries => {
                    attempt += 1;
                    let backoff = Self::retry_backoff(attempt);
                    warn!(
                        "{} embedding attempt {} failed ({}); retrying in {:?}",
                        mode, attempt, err, backoff
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn embedding_dimension(&self) -> usize {
        self.config.dimension
    }

    fn provider_name(&self) -> &str {
        "cloud"
    }
}
