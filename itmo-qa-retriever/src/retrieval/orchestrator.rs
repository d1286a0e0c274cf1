use super::RetrievalError;
use crate::storage::{ArticleStore, ScoredArticle};
use futures::future::try_join_all;
use itertools::Itertools;
use itmo_qa_embed::EmbeddingProvider;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Retrieved texts of one specialization tag
#[derive(Debug, Clone, Serialize)]
pub struct ContextBlock {
    pub specialization: String,
    /// Article texts in ascending distance order, newline separated;
    /// empty when the tag matched nothing
    pub text: String,
    pub articles: Vec<ScoredArticle>,
}

impl ContextBlock {
    fn new(specialization: &str, articles: Vec<ScoredArticle>) -> Self {
        let text = articles
            .iter()
            .map(|scored| scored.article.article_text.as_str())
            .join("\n");
        Self {
            specialization: specialization.to_string(),
            text,
            articles,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.articles.is_empty()
    }
}

/// Per-tag context for one question, in the order the tags were requested
#[derive(Debug, Clone, Serialize)]
pub struct RetrievedContext {
    pub question: String,
    pub blocks: Vec<ContextBlock>,
}

impl RetrievedContext {
    /// Block produced for `specialization`, if it was requested.
    pub fn block(&self, specialization: &str) -> Option<&ContextBlock> {
        self.blocks
            .iter()
            .find(|block| block.specialization == specialization)
    }

    /// Flattens the blocks into one string, each under a `[tag]` header.
    pub fn joined(&self) -> String {
        self.blocks
            .iter()
            .map(|block| format!("[{}]\n{}", block.specialization, block.text))
            .join("\n\n")
    }
}

/// Turns a question into labeled context blocks
#[derive(Clone)]
pub struct RetrievalOrchestrator {
    store: Arc<dyn ArticleStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    timeout: Option<Duration>,
}

impl RetrievalOrchestrator {
    pub fn new(store: Arc<dyn ArticleStore>, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            store,
            embedder,
            timeout: None,
        }
    }

    /// Bounds every `build_context` call; in-flight queries are dropped on expiry.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn store(&self) -> &Arc<dyn ArticleStore> {
        &self.store
    }

    /// Builds one context block per specialization tag.
    ///
    /// The question is encoded once with the query model. The per-tag
    /// similarity queries run concurrently and are all awaited; the first
    /// failure drops the remaining queries and is returned as is. Blank
    /// questions are not special-cased.
    pub async fn build_context<S>(
        &self,
        question: &str,
        specializations: &[S],
        k_per_specialization: usize,
    ) -> Result<RetrievedContext, RetrievalError>
    where
        S: AsRef<str> + Sync,
    {
        let retrieval = self.retrieve(question, specializations, k_per_specialization);
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, retrieval)
                .await
                .map_err(|_| RetrievalError::Timeout(limit))?,
            None => retrieval.await,
        }
    }

    async fn retrieve<S>(
        &self,
        question: &str,
        specializations: &[S],
        k: usize,
    ) -> Result<RetrievedContext, RetrievalError>
    where
        S: AsRef<str> + Sync,
    {
        let query = self.embedder.encode_query(question).await?;

        let lookups = specializations.iter().map(|tag| {
            let tag = tag.as_ref();
            let query = query.as_slice();
            async move {
                let articles = self.store.top_k_similar(query, k, Some(tag)).await?;
                debug!("Retrieved {} articles for {}", articles.len(), tag);
                Ok::<_, RetrievalError>(ContextBlock::new(tag, articles))
            }
        });
        let blocks = try_join_all(lookups).await?;

        info!(
            "Built context with {} blocks ({} articles)",
            blocks.len(),
            blocks.iter().map(|block| block.articles.len()).sum::<usize>()
        );
        Ok(RetrievedContext {
            question: question.to_string(),
            blocks,
        })
    }
}
