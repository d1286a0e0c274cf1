//! SQLite implementation of [`ArticleStore`].
//!
//! All operations check a connection out of a shared [`SqlitePool`], so
//! concurrent requests proceed in parallel (WAL mode lets readers overlap a
//! writer). Similarity search streams the candidate rows, decodes each packed
//! embedding, and keeps the best `k` in a bounded heap; memory is
//! `O(k)` regardless of table size.

use super::codec::{self, CodecError, cosine_distance};
use super::{
    Article, ArticleStore, NewArticle, Result, RetryPolicy, ScoredArticle, StoreError,
    truncate_timestamp,
};
use crate::config::StoreConfig;
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Row, SqlitePool};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info};

/// Validated identifier of the article table
#[derive(Debug, Clone)]
struct TableName(String);

impl TableName {
    fn new(name: &str) -> Result<Self> {
        let valid = !name.is_empty()
            && name.len() <= 64
            && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
            && !name.starts_with(|c: char| c.is_ascii_digit());
        if !valid {
            return Err(StoreError::configuration(format!(
                "invalid table name '{name}': use letters, digits and underscores"
            )));
        }
        Ok(Self(name.to_string()))
    }

    fn quoted(&self) -> String {
        format!("\"{}\"", self.0)
    }
}

/// SQL text rendered once per store for its table
#[derive(Debug)]
struct Queries {
    create_table: String,
    create_index: String,
    create_meta: String,
    record_dimension: String,
    stored_dimension: String,
    insert: String,
    first_url_page: String,
    next_url_page: String,
    scan_all: String,
    scan_filtered: String,
    count_all: String,
    count_filtered: String,
    count_by_specialization: String,
}

impl Queries {
    fn new(table: &TableName) -> Self {
        let t = table.quoted();
        let meta = format!("\"{}_meta\"", table.0);
        let index = format!("\"idx_{}_specialization\"", table.0);
        let columns = "url, timestamp, embedding, article_text, specialization_source";

        Self {
            create_table: format!(
                r#"
                CREATE TABLE IF NOT EXISTS {t} (
                    url TEXT PRIMARY KEY NOT NULL,
                    timestamp INTEGER NOT NULL,
                    embedding BLOB NOT NULL,
                    embedding_bit BLOB NOT NULL,
                    article_text TEXT NOT NULL,
                    specialization_source TEXT NOT NULL
                )
                "#
            ),
            create_index: format!(
                "CREATE INDEX IF NOT EXISTS {index} ON {t}(specialization_source)"
            ),
            create_meta: format!(
                "CREATE TABLE IF NOT EXISTS {meta} (key TEXT PRIMARY KEY NOT NULL, value TEXT NOT NULL)"
            ),
            record_dimension: format!(
                "INSERT INTO {meta} (key, value) VALUES ('embedding_dimension', ?1) ON CONFLICT(key) DO NOTHING"
            ),
            stored_dimension: format!(
                "SELECT value FROM {meta} WHERE key = 'embedding_dimension'"
            ),
            insert: format!(
                r#"
                INSERT INTO {t} (url, timestamp, embedding, embedding_bit, article_text, specialization_source)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                ON CONFLICT(url) DO NOTHING
                "#
            ),
            first_url_page: format!("SELECT url FROM {t} ORDER BY url LIMIT ?1"),
            next_url_page: format!("SELECT url FROM {t} WHERE url > ?1 ORDER BY url LIMIT ?2"),
            scan_all: format!("SELECT {columns} FROM {t}"),
            scan_filtered: format!("SELECT {columns} FROM {t} WHERE specialization_source = ?1"),
            count_all: format!("SELECT COUNT(*) FROM {t}"),
            count_filtered: format!("SELECT COUNT(*) FROM {t} WHERE specialization_source = ?1"),
            count_by_specialization: format!(
                "SELECT specialization_source, COUNT(*) AS articles FROM {t} GROUP BY specialization_source ORDER BY specialization_source"
            ),
        }
    }
}

/// Position of an in-progress URL listing
enum UrlCursor {
    Start,
    After(String),
    Exhausted,
}

/// Heap entry ordered so that the *worst* match is the greatest
struct Candidate {
    distance: f32,
    article: Article,
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            // newer articles win ties, so older ones rank as worse
            .then_with(|| other.article.timestamp.cmp(&self.article.timestamp))
            .then_with(|| self.article.url.cmp(&other.article.url))
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

/// Article store backed by a SQLite connection pool
#[derive(Debug, Clone)]
pub struct SqliteArticleStore {
    pool: SqlitePool,
    table: TableName,
    dimension: usize,
    retry: RetryPolicy,
    queries: Arc<Queries>,
}

impl SqliteArticleStore {
    /// Connects to the configured database; fails fast if it is unreachable.
    pub async fn open(config: &StoreConfig) -> Result<Self> {
        let options = Self::connect_options(&config.database_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(config.busy_timeout());

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections.max(1))
            .connect_with(options)
            .await?;

        info!(
            "Opened article store at {} (table {}, {} dimensions)",
            config.database_url, config.table, config.embedding_dimension
        );
        Self::from_pool(pool, &config.table, config.embedding_dimension, config.retry)
    }

    /// Opens a private in-memory database for testing.
    ///
    /// The pool holds exactly one connection that never expires, since every
    /// SQLite in-memory connection is its own database.
    pub async fn open_memory(dimension: usize) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None::<std::time::Duration>)
            .max_lifetime(None::<std::time::Duration>)
            .connect_with(SqliteConnectOptions::from_str("sqlite::memory:")?)
            .await?;
        Self::from_pool(pool, "itmo_articles", dimension, RetryPolicy::none())
    }

    /// Wraps an existing pool.
    pub fn from_pool(
        pool: SqlitePool,
        table: &str,
        dimension: usize,
        retry: RetryPolicy,
    ) -> Result<Self> {
        if dimension == 0 {
            return Err(StoreError::configuration("embedding dimension must be positive"));
        }
        let table = TableName::new(table)?;
        let queries = Arc::new(Queries::new(&table));
        Ok(Self {
            pool,
            table,
            dimension,
            retry,
            queries,
        })
    }

    fn connect_options(database_url: &str) -> Result<SqliteConnectOptions> {
        let database_url = database_url.trim();
        if database_url.is_empty() {
            return Err(StoreError::configuration("database url is empty"));
        }
        if database_url.starts_with("sqlite:") {
            SqliteConnectOptions::from_str(database_url).map_err(|e| {
                StoreError::configuration(format!("invalid database url '{database_url}': {e}"))
            })
        } else {
            Ok(SqliteConnectOptions::new().filename(database_url))
        }
    }

    /// Expected embedding dimension
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn table_name(&self) -> &str {
        &self.table.0
    }

    /// Get the underlying SQLite connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Number of stored articles, optionally for one specialization.
    pub async fn article_count(&self, specialization: Option<&str>) -> Result<u64> {
        let pool = &self.pool;
        let queries = &self.queries;
        let count: i64 = self
            .retry
            .run("article_count", move || async move {
                let count = match specialization {
                    Some(tag) => {
                        sqlx::query_scalar::<_, i64>(&queries.count_filtered)
                            .bind(tag)
                            .fetch_one(pool)
                            .await?
                    }
                    None => {
                        sqlx::query_scalar::<_, i64>(&queries.count_all)
                            .fetch_one(pool)
                            .await?
                    }
                };
                Ok(count)
            })
            .await?;
        Ok(count.max(0) as u64)
    }

    /// Article counts per specialization tag, sorted by tag.
    pub async fn specialization_counts(&self) -> Result<Vec<(String, u64)>> {
        let pool = &self.pool;
        let queries = &self.queries;
        let rows = self
            .retry
            .run("specialization_counts", move || async move {
                Ok(sqlx::query(&queries.count_by_specialization)
                    .fetch_all(pool)
                    .await?)
            })
            .await?;

        rows.iter()
            .map(|row| -> Result<(String, u64)> {
                let tag: String = row.try_get("specialization_source")?;
                let articles: i64 = row.try_get("articles")?;
                Ok((tag, articles.max(0) as u64))
            })
            .collect()
    }

    /// Closes every pooled connection; later operations fail.
    pub async fn close(&self) {
        self.pool.close().await;
        info!("Article store {} closed", self.table.0);
    }

    fn validate_vector(&self, vector: &[f32], what: &str) -> Result<()> {
        if vector.is_empty() {
            return Err(StoreError::validation(format!("{what} is empty")));
        }
        if vector.len() != self.dimension {
            return Err(StoreError::validation(format!(
                "{what} has {} dimensions, expected {}",
                vector.len(),
                self.dimension
            )));
        }
        if vector.iter().any(|value| !value.is_finite()) {
            return Err(StoreError::validation(format!(
                "{what} contains non-finite values"
            )));
        }
        Ok(())
    }

    async fn fetch_url_page(
        pool: &SqlitePool,
        queries: &Queries,
        after: Option<&str>,
        page_size: usize,
    ) -> Result<Vec<String>> {
        let limit = i64::try_from(page_size).unwrap_or(i64::MAX);
        let urls = match after {
            None => {
                sqlx::query_scalar::<_, String>(&queries.first_url_page)
                    .bind(limit)
                    .fetch_all(pool)
                    .await?
            }
            Some(cursor) => {
                sqlx::query_scalar::<_, String>(&queries.next_url_page)
                    .bind(cursor)
                    .bind(limit)
                    .fetch_all(pool)
                    .await?
            }
        };
        Ok(urls)
    }

    fn decode_candidate(&self, row: &SqliteRow, query: &[f32]) -> Result<Candidate> {
        let url: String = row.try_get("url")?;
        let timestamp: i64 = row.try_get("timestamp")?;
        let blob: Vec<u8> = row.try_get("embedding")?;

        let embedding = codec::unpack_float(&blob).map_err(|source| StoreError::Corrupt {
            url: url.clone(),
            source,
        })?;
        if embedding.len() != query.len() {
            return Err(StoreError::Corrupt {
                url,
                source: CodecError::Dimension {
                    expected: query.len(),
                    actual: embedding.len(),
                },
            });
        }

        let distance = cosine_distance(&embedding, query);
        Ok(Candidate {
            distance,
            article: Article {
                url,
                timestamp: truncate_timestamp(timestamp),
                embedding,
                article_text: row.try_get("article_text")?,
                specialization_source: row.try_get("specialization_source")?,
            },
        })
    }

    async fn scan_nearest(
        &self,
        query: &[f32],
        k: usize,
        specialization_filter: Option<&str>,
    ) -> Result<Vec<ScoredArticle>> {
        let mut rows = match specialization_filter {
            Some(tag) => sqlx::query(&self.queries.scan_filtered)
                .bind(tag)
                .fetch(&self.pool),
            None => sqlx::query(&self.queries.scan_all).fetch(&self.pool),
        };

        let mut best = BinaryHeap::new();
        while let Some(row) = rows.try_next().await? {
            best.push(self.decode_candidate(&row, query)?);
            if best.len() > k {
                best.pop();
            }
        }

        Ok(best
            .into_sorted_vec()
            .into_iter()
            .map(|candidate| ScoredArticle {
                article: candidate.article,
                distance: candidate.distance,
            })
            .collect())
    }
}

#[async_trait]
impl ArticleStore for SqliteArticleStore {
    async fn initialize_schema(&self) -> Result<()> {
        sqlx::query(&self.queries.create_table)
            .execute(&self.pool)
            .await?;
        sqlx::query(&self.queries.create_index)
            .execute(&self.pool)
            .await?;
        sqlx::query(&self.queries.create_meta)
            .execute(&self.pool)
            .await?;

        // The first initialization fixes the dimension for the table's lifetime
        sqlx::query(&self.queries.record_dimension)
            .bind(self.dimension.to_string())
            .execute(&self.pool)
            .await?;
        let stored: String = sqlx::query_scalar(&self.queries.stored_dimension)
            .fetch_one(&self.pool)
            .await?;
        if stored.parse::<usize>().ok() != Some(self.dimension) {
            return Err(StoreError::configuration(format!(
                "table {} holds {stored}-dimensional embeddings but {} were configured",
                self.table.0, self.dimension
            )));
        }

        info!("Article table {} ready", self.table.0);
        Ok(())
    }

    async fn insert(&self, article: NewArticle) -> Result<()> {
        if article.url.trim().is_empty() {
            return Err(StoreError::validation("url is empty"));
        }
        if article.specialization_source.trim().is_empty() {
            return Err(StoreError::validation("specialization_source is empty"));
        }
        self.validate_vector(&article.embedding, "embedding")?;

        // Both blobs come from the same vector in the same statement
        let embedding = codec::pack_float(&article.embedding);
        let embedding_bit = codec::pack_bits(&article.embedding);

        let result = sqlx::query(&self.queries.insert)
            .bind(&article.url)
            .bind(i64::from(article.timestamp))
            .bind(embedding)
            .bind(embedding_bit)
            .bind(&article.article_text)
            .bind(&article.specialization_source)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            debug!("Rejected duplicate article {}", article.url);
            return Err(StoreError::DuplicateKey { url: article.url });
        }

        debug!(
            "Stored article {} ({}, {} chars)",
            article.url,
            article.specialization_source,
            article.article_text.len()
        );
        Ok(())
    }

    fn list_known_urls(&self, page_size: usize) -> BoxStream<'_, Result<String>> {
        if page_size == 0 {
            return stream::once(async {
                Err::<String, _>(StoreError::validation("page_size must be positive"))
            })
            .boxed();
        }

        let pool = self.pool.clone();
        let queries = Arc::clone(&self.queries);
        let retry = self.retry;

        stream::try_unfold(UrlCursor::Start, move |cursor| {
            let pool = pool.clone();
            let queries = Arc::clone(&queries);
            async move {
                let after = match cursor {
                    UrlCursor::Start => None,
                    UrlCursor::After(url) => Some(url),
                    UrlCursor::Exhausted => return Ok(None),
                };

                let page = retry
                    .run("list_known_urls", || {
                        Self::fetch_url_page(&pool, &queries, after.as_deref(), page_size)
                    })
                    .await?;

                let next = match page.last() {
                    None => return Ok(None),
                    Some(last) if page.len() == page_size => UrlCursor::After(last.clone()),
                    Some(_) => UrlCursor::Exhausted,
                };
                debug!("Listed {} known urls", page.len());
                Ok::<_, StoreError>(Some((page, next)))
            }
        })
        .map_ok(|page| stream::iter(page.into_iter().map(Ok::<String, StoreError>)))
        .try_flatten()
        .boxed()
    }

    async fn top_k_similar(
        &self,
        query: &[f32],
        k: usize,
        specialization_filter: Option<&str>,
    ) -> Result<Vec<ScoredArticle>> {
        if k == 0 {
            return Err(StoreError::validation("k must be a positive integer"));
        }
        self.validate_vector(query, "query vector")?;

        let results = self
            .retry
            .run("top_k_similar", || {
                self.scan_nearest(query, k, specialization_filter)
            })
            .await?;

        debug!(
            "top_k_similar(k={}, filter={:?}) returned {} articles",
            k,
            specialization_filter,
            results.len()
        );
        Ok(results)
    }
}
