//! Batch ingestion of crawled documents.
//!
//! Each record is embedded with the document model and inserted. URLs that
//! are already stored, or repeated within the batch, are skipped before any
//! embedding work. A failing record is logged and reported; the batch goes on.

use super::RetrievalError;
use crate::storage::{
    ArticleStore, DEFAULT_URL_PAGE_SIZE, NewArticle, StoreError, truncate_timestamp,
};
use itmo_qa_embed::EmbeddingProvider;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One crawled document, as read from a JSON Lines file
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct IngestRecord {
    pub url: String,
    pub text: String,
    /// Unix seconds of the crawl; ingestion time when absent
    #[serde(default)]
    pub timestamp: Option<i64>,
    /// Overrides the batch's specialization tag
    #[serde(default)]
    pub specialization: Option<String>,
}

impl IngestRecord {
    pub fn new(url: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            text: text.into(),
            timestamp: None,
            specialization: None,
        }
    }
}

/// A record that could not be stored
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestFailure {
    pub url: String,
    pub error: String,
}

/// Outcome of one ingestion batch
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IngestReport {
    pub inserted: usize,
    pub skipped: usize,
    pub failed: Vec<IngestFailure>,
}

pub struct Ingestor {
    store: Arc<dyn ArticleStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    page_size: usize,
}

impl Ingestor {
    pub fn new(store: Arc<dyn ArticleStore>, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            store,
            embedder,
            page_size: DEFAULT_URL_PAGE_SIZE,
        }
    }

    /// Page size used when listing known URLs
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Stores every new record under `specialization` (or the record's own tag).
    ///
    /// Fails only if the known URLs cannot be listed.
    pub async fn ingest<I>(
        &self,
        records: I,
        specialization: &str,
    ) -> Result<IngestReport, StoreError>
    where
        I: IntoIterator<Item = IngestRecord>,
    {
        let mut seen = self.store.known_url_set(self.page_size).await?;
        debug!("Store already holds {} urls", seen.len());

        let mut report = IngestReport::default();
        for record in records {
            if seen.contains(&record.url) {
                debug!("Skipping known url {}", record.url);
                report.skipped += 1;
                continue;
            }

            let url = record.url.clone();
            // a failed url stays unseen so a later record may still store it
            match self.ingest_one(record, specialization).await {
                Ok(()) => {
                    seen.insert(url);
                    report.inserted += 1;
                }
                Err(RetrievalError::Store(StoreError::DuplicateKey { .. })) => {
                    // inserted by someone else since the listing
                    seen.insert(url);
                    report.skipped += 1;
                }
                Err(err) => {
                    warn!("Failed to ingest {}: {}", url, err);
                    report.failed.push(IngestFailure {
                        url,
                        error: err.to_string(),
                    });
                }
            }
        }

        info!(
            "Ingestion finished: {} inserted, {} skipped, {} failed",
            report.inserted,
            report.skipped,
            report.failed.len()
        );
        Ok(report)
    }

    async fn ingest_one(
        &self,
        record: IngestRecord,
        specialization: &str,
    ) -> Result<(), RetrievalError> {
        let embedding = self.embedder.encode_document(&record.text).await?;

        let tag = record
            .specialization
            .unwrap_or_else(|| specialization.to_string());
        let mut article = NewArticle::new(record.url, record.text, tag, embedding);
        if let Some(timestamp) = record.timestamp {
            article = article.with_timestamp(truncate_timestamp(timestamp));
        }
        Ok(self.store.insert(article).await?)
    }

    /// Parses JSON Lines input; blank lines are ignored.
    pub fn parse_jsonl(input: &str) -> Result<Vec<IngestRecord>, serde_json::Error> {
        input
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(serde_json::from_str)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SqliteArticleStore;
    use async_trait::async_trait;
    use futures::TryStreamExt;
    use itmo_qa_embed::{EmbedError, EmbeddingMode};
    use tracing_test::traced_test;

    /// Embeds by text length; refuses texts containing "poison".
    struct LengthEmbedder;

    #[async_trait]
    impl EmbeddingProvider for LengthEmbedder {
        async fn embed(&self, text: &str, _mode: EmbeddingMode) -> itmo_qa_embed::Result<Vec<f32>> {
            if text.contains("poison") {
                return Err(EmbedError::invalid_config("refused"));
            }
            Ok(vec![1.0, text.len() as f32])
        }

        fn embedding_dimension(&self) -> usize {
            2
        }

        fn provider_name(&self) -> &str {
            "length"
        }
    }

    async fn setup() -> anyhow::Result<(Arc<SqliteArticleStore>, Ingestor)> {
        let store = Arc::new(SqliteArticleStore::open_memory(2).await?);
        store.initialize_schema().await?;
        let ingestor = Ingestor::new(store.clone(), Arc::new(LengthEmbedder)).with_page_size(2);
        Ok((store, ingestor))
    }

    #[traced_test]
    #[tokio::test]
    async fn test_continues_past_failures() -> anyhow::Result<()> {
        let (store, ingestor) = setup().await?;
        let records = vec![
            IngestRecord::new("https://a", "first"),
            IngestRecord::new("https://b", "poison pill"),
            IngestRecord::new("https://c", "third"),
        ];

        let report = ingestor.ingest(records, "ai_engineer").await?;
        assert_eq!(report.inserted, 2);
        assert_eq!(report.skipped, 0);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].url, "https://b");
        assert!(logs_contain("Failed to ingest https://b"));

        let mut urls: Vec<String> = store.list_known_urls(10).try_collect().await?;
        urls.sort();
        assert_eq!(urls, vec!["https://a", "https://c"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_skips_known_and_repeated_urls() -> anyhow::Result<()> {
        let (store, ingestor) = setup().await?;
        ingestor
            .ingest(vec![IngestRecord::new("https://a", "first")], "x")
            .await?;

        let records = vec![
            IngestRecord::new("https://a", "again"),
            IngestRecord::new("https://b", "second"),
            IngestRecord::new("https://b", "second copy"),
        ];
        let report = ingestor.ingest(records, "x").await?;
        assert_eq!(report.inserted, 1);
        assert_eq!(report.skipped, 2);
        assert!(report.failed.is_empty());
        assert_eq!(store.article_count(None).await?, 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_url_is_retried_by_later_record() -> anyhow::Result<()> {
        let (store, ingestor) = setup().await?;
        let records = vec![
            IngestRecord::new("https://b", "poison pill"),
            IngestRecord::new("https://b", "fine text"),
        ];

        let report = ingestor.ingest(records, "x").await?;
        assert_eq!(report.inserted, 1);
        assert_eq!(report.skipped, 0);
        assert_eq!(report.failed.len(), 1);

        let results = store.top_k_similar(&[1.0, 9.0], 1, None).await?;
        assert_eq!(results[0].article.article_text, "fine text");
        Ok(())
    }

    #[tokio::test]
    async fn test_record_tag_and_timestamp() -> anyhow::Result<()> {
        let (store, ingestor) = setup().await?;
        let mut record = IngestRecord::new("https://m", "manager");
        record.specialization = Some("ai_product_manager".to_string());
        record.timestamp = Some(0x1_0000_0010);
        ingestor.ingest(vec![record], "ai_engineer").await?;

        let results = store
            .top_k_similar(&[1.0, 7.0], 1, Some("ai_product_manager"))
            .await?;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].article.timestamp, 0x10);
        Ok(())
    }

    #[test]
    fn test_parse_jsonl() -> anyhow::Result<()> {
        let input = r#"{"url": "https://a", "text": "alpha"}

{"url": "https://b", "text": "beta", "timestamp": 1700000000, "specialization": "y"}
"#;
        let records = Ingestor::parse_jsonl(input)?;
        assert_eq!(records.len(), 2);
        assert_eq!(records[0], IngestRecord::new("https://a", "alpha"));
        assert_eq!(records[1].timestamp, Some(1_700_000_000));
        assert_eq!(records[1].specialization.as_deref(), Some("y"));

        assert!(Ingestor::parse_jsonl("{\"url\": \"https://a\"}").is_err());
        Ok(())
    }
}
