//! Article storage and similarity search.
//!
//! The store owns a single table keyed by article URL. Every row carries the
//! article text, its specialization tag, the crawl timestamp, and two blobs
//! derived from one document embedding: the full-precision vector and its
//! 1-bit quantization (see [`codec`]).
//!
//! ## Key Components
//!
//! - **ArticleStore**: async trait the orchestrator and ingestion run against
//! - **SqliteArticleStore**: sqlx/SQLite implementation with a shared pool
//! - **RetryPolicy**: bounded retries for reads on transient failures
//! - **StoreError**: failure taxonomy; an empty result is never an error
//!
//! ## Schema
//!
//! ```sql
//! CREATE TABLE itmo_articles (
//!     url TEXT PRIMARY KEY NOT NULL,
//!     timestamp INTEGER NOT NULL,          -- unix seconds truncated to 32 bits
//!     embedding BLOB NOT NULL,             -- packed f32 vector
//!     embedding_bit BLOB NOT NULL,         -- packed sign bits
//!     article_text TEXT NOT NULL,
//!     specialization_source TEXT NOT NULL
//! );
//! ```
//!
//! Rows are append-only: there is no update or delete path, and inserting an
//! existing URL fails with [`StoreError::DuplicateKey`].

use async_trait::async_trait;
use futures::TryStreamExt;
use futures::stream::BoxStream;
use std::collections::HashSet;

pub mod codec;
pub mod error;
pub mod retry;
pub mod sqlite_store;

pub use error::{Result, StoreError};
pub use retry::RetryPolicy;
pub use sqlite_store::SqliteArticleStore;

/// Default page size for URL listing
pub const DEFAULT_URL_PAGE_SIZE: usize = 1000;

/// Truncates unix seconds to the 32-bit timestamp stored per article.
pub fn truncate_timestamp(unix_seconds: i64) -> u32 {
    (unix_seconds & 0xFFFF_FFFF) as u32
}

/// Current wall-clock time as a stored timestamp
pub fn timestamp_now() -> u32 {
    truncate_timestamp(chrono::Utc::now().timestamp())
}

/// An article ready to be written
#[derive(Debug, Clone, PartialEq)]
pub struct NewArticle {
    pub url: String,
    pub timestamp: u32,
    pub embedding: Vec<f32>,
    pub article_text: String,
    pub specialization_source: String,
}

impl NewArticle {
    /// Creates an article stamped with the current time.
    pub fn new(
        url: impl Into<String>,
        article_text: impl Into<String>,
        specialization_source: impl Into<String>,
        embedding: Vec<f32>,
    ) -> Self {
        Self {
            url: url.into(),
            timestamp: timestamp_now(),
            embedding,
            article_text: article_text.into(),
            specialization_source: specialization_source.into(),
        }
    }

    pub fn with_timestamp(mut self, timestamp: u32) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// A stored article as returned by similarity queries
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Article {
    pub url: String,
    pub timestamp: u32,
    #[serde(skip)]
    pub embedding: Vec<f32>,
    pub article_text: String,
    pub specialization_source: String,
}

/// An article with its cosine distance to the query vector
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ScoredArticle {
    pub article: Article,
    pub distance: f32,
}

/// Durable storage and similarity retrieval for articles.
#[async_trait]
pub trait ArticleStore: Send + Sync {
    /// Creates the table and indexes if they do not exist yet.
    async fn initialize_schema(&self) -> Result<()>;

    /// Writes one article; visible to queries as soon as this returns.
    async fn insert(&self, article: NewArticle) -> Result<()>;

    /// Lazily yields every stored URL, reading `page_size` URLs per query.
    ///
    /// Each call starts a fresh listing.
    fn list_known_urls(&self, page_size: usize) -> BoxStream<'_, Result<String>>;

    /// The `k` closest articles by cosine distance, optionally restricted to
    /// one specialization tag.
    ///
    /// Ordered by ascending distance, ties broken by newest timestamp.
    async fn top_k_similar(
        &self,
        query: &[f32],
        k: usize,
        specialization_filter: Option<&str>,
    ) -> Result<Vec<ScoredArticle>>;

    /// Collects [`ArticleStore::list_known_urls`] into a set.
    async fn known_url_set(&self, page_size: usize) -> Result<HashSet<String>> {
        self.list_known_urls(page_size).try_collect().await
    }
}
