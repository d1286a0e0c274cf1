//! Shared helpers for integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use fnv::FnvHasher;
use itmo_qa_embed::{EmbeddingMode, EmbeddingProvider};
use itmo_qa_retriever::config::StoreConfig;
use itmo_qa_retriever::storage::{ArticleStore, SqliteArticleStore};
use std::hash::Hasher;
use std::path::Path;

pub const TEST_DIMENSION: usize = 64;

/// Feature-hashing embedder: each lowercase word adds ±1 to one bucket.
///
/// Identical texts map to identical vectors in both modes, so a document
/// queried with its own text is always at distance 0.
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    pub fn new() -> Self {
        Self {
            dimension: TEST_DIMENSION,
        }
    }

    pub fn vector(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0; self.dimension];
        for word in text.split_whitespace() {
            let mut hasher = FnvHasher::default();
            hasher.write(word.to_lowercase().as_bytes());
            let hash = hasher.finish();
            let bucket = (hash % self.dimension as u64) as usize;
            let sign = if (hash >> 32) & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    async fn embed(&self, text: &str, _mode: EmbeddingMode) -> itmo_qa_embed::Result<Vec<f32>> {
        Ok(self.vector(text))
    }

    fn embedding_dimension(&self) -> usize {
        self.dimension
    }

    fn provider_name(&self) -> &str {
        "hash"
    }
}

/// Small deterministic generator for test vectors
pub struct Lcg(u64);

impl Lcg {
    pub fn new(seed: u64) -> Self {
        Self(seed)
    }

    /// Uniform-ish value in [-1, 1)
    pub fn next_f32(&mut self) -> f32 {
        self.0 = self
            .0
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        ((self.0 >> 40) as f32 / (1u64 << 24) as f32) * 2.0 - 1.0
    }

    pub fn vector(&mut self, dimension: usize) -> Vec<f32> {
        (0..dimension).map(|_| self.next_f32()).collect()
    }
}

/// Opens and initializes an on-disk store under `dir`.
pub async fn open_store(dir: &Path, dimension: usize) -> anyhow::Result<SqliteArticleStore> {
    let config = StoreConfig::new(dir.join("articles.db").to_string_lossy())
        .with_embedding_dimension(dimension);
    let store = SqliteArticleStore::open(&config).await?;
    store.initialize_schema().await?;
    Ok(store)
}
