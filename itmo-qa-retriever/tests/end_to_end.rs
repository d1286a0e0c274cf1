//! Ingest-then-ask scenarios with a deterministic embedder
//!
//! These tests drive the public API the way the CLI and the chat front end
//! do: documents go in through the `Ingestor`, questions come out through
//! the `RetrievalOrchestrator` and `ChatResponder`.

mod common;

use anyhow::Result;
use async_trait::async_trait;
use common::{HashEmbedder, TEST_DIMENSION, open_store};
use itmo_qa_retriever::config::RetrievalConfig;
use itmo_qa_retriever::retrieval::{
    AnswerGenerator, ChatResponder, FALLBACK_REPLY, IngestRecord, Ingestor,
    RetrievalOrchestrator, RetrievedContext,
};
use itmo_qa_retriever::storage::{ArticleStore, SqliteArticleStore};
use std::sync::Arc;
use tempfile::tempdir;

async fn ingest(store: &Arc<SqliteArticleStore>, records: &[(&str, &str, &str)]) -> Result<()> {
    let ingestor = Ingestor::new(store.clone(), Arc::new(HashEmbedder::new()));
    for (url, text, tag) in records {
        let report = ingestor
            .ingest(vec![IngestRecord::new(*url, *text)], tag)
            .await?;
        assert_eq!(report.inserted, 1, "failed to ingest {url}");
    }
    Ok(())
}

/// Two tags, one article each: every block holds its own tag's article.
#[tokio::test]
async fn test_context_per_specialization() -> Result<()> {
    let dir = tempdir()?;
    let store = Arc::new(open_store(dir.path(), TEST_DIMENSION).await?);
    ingest(&store, &[("https://a", "alpha", "x"), ("https://b", "beta", "y")]).await?;

    let orchestrator = RetrievalOrchestrator::new(store, Arc::new(HashEmbedder::new()));
    let context = orchestrator.build_context("alpha", &["x", "y"], 1).await?;

    assert_eq!(context.blocks.len(), 2);
    assert_eq!(context.blocks[0].specialization, "x");
    assert!(context.blocks[0].text.contains("alpha"));
    assert_eq!(context.blocks[1].specialization, "y");
    assert!(context.blocks[1].text.contains("beta"));
    Ok(())
}

/// A tag with no articles yields an empty block, not an error.
#[tokio::test]
async fn test_missing_specialization_is_empty() -> Result<()> {
    let dir = tempdir()?;
    let store = Arc::new(open_store(dir.path(), TEST_DIMENSION).await?);
    ingest(&store, &[("https://a", "alpha", "x"), ("https://b", "beta", "y")]).await?;

    let orchestrator = RetrievalOrchestrator::new(store, Arc::new(HashEmbedder::new()));
    let context = orchestrator.build_context("alpha", &["x", "z"], 1).await?;

    assert_eq!(context.block("x").map(|b| b.text.as_str()), Some("alpha"));
    assert_eq!(context.block("z").map(|b| b.text.as_str()), Some(""));
    Ok(())
}

/// The article whose text matches the question ranks first within its tag.
#[tokio::test]
async fn test_matching_article_ranks_first() -> Result<()> {
    let dir = tempdir()?;
    let store = Arc::new(open_store(dir.path(), TEST_DIMENSION).await?);
    ingest(
        &store,
        &[
            ("https://ai.itmo.ru/fees", "tuition fees and scholarships", "ai_engineer"),
            ("https://ai.itmo.ru/courses", "machine learning courses list", "ai_engineer"),
            ("https://ai.itmo.ru/dorm", "dormitory and campus life", "ai_engineer"),
            ("https://ai.itmo.ru/pm", "product discovery workshops", "ai_product_manager"),
        ],
    )
    .await?;

    let orchestrator = RetrievalOrchestrator::new(store, Arc::new(HashEmbedder::new()));
    let context = orchestrator
        .build_context(
            "machine learning courses list",
            &["ai_engineer", "ai_product_manager"],
            2,
        )
        .await?;

    let engineer = &context.blocks[0];
    assert_eq!(engineer.articles.len(), 2);
    assert_eq!(engineer.articles[0].article.url, "https://ai.itmo.ru/courses");
    assert!(engineer.articles[0].distance.abs() < 1e-6);
    assert!(engineer.text.starts_with("machine learning courses list\n"));

    let manager = &context.blocks[1];
    assert_eq!(manager.text, "product discovery workshops");
    Ok(())
}

/// Re-ingesting a crawl only adds new URLs.
#[tokio::test]
async fn test_recrawl_skips_known_urls() -> Result<()> {
    let dir = tempdir()?;
    let store = Arc::new(open_store(dir.path(), TEST_DIMENSION).await?);
    let ingestor = Ingestor::new(store.clone(), Arc::new(HashEmbedder::new()));

    let crawl = Ingestor::parse_jsonl(
        r#"{"url": "https://ai.itmo.ru/1", "text": "first page"}
{"url": "https://ai.itmo.ru/2", "text": "second page"}"#,
    )?;
    let first = ingestor.ingest(crawl.clone(), "ai_engineer").await?;
    assert_eq!((first.inserted, first.skipped), (2, 0));

    let mut recrawl = crawl;
    recrawl.push(IngestRecord::new("https://ai.itmo.ru/3", "third page"));
    let second = ingestor.ingest(recrawl, "ai_engineer").await?;
    assert_eq!((second.inserted, second.skipped), (1, 2));
    assert!(second.failed.is_empty());

    assert_eq!(store.known_url_set(2).await?.len(), 3);
    Ok(())
}

struct ContextLengthGenerator;

#[async_trait]
impl AnswerGenerator for ContextLengthGenerator {
    async fn generate(&self, question: &str, context: &RetrievedContext) -> Result<String> {
        let counts: Vec<String> = context
            .blocks
            .iter()
            .map(|b| format!("{}={}", b.specialization, b.articles.len()))
            .collect();
        Ok(format!("{question} -> {}", counts.join(",")))
    }
}

#[tokio::test]
async fn test_chat_reply_and_fallback() -> Result<()> {
    let dir = tempdir()?;
    let store = Arc::new(open_store(dir.path(), TEST_DIMENSION).await?);
    ingest(
        &store,
        &[
            ("https://a", "alpha", "ai_engineer"),
            ("https://b", "beta", "ai_product_manager"),
            ("https://c", "gamma", "ai_product_manager"),
        ],
    )
    .await?;

    let orchestrator = RetrievalOrchestrator::new(store.clone(), Arc::new(HashEmbedder::new()));
    let responder = ChatResponder::new(
        orchestrator,
        Arc::new(ContextLengthGenerator),
        &RetrievalConfig::default(),
    );
    assert_eq!(
        responder.respond("alpha").await,
        "alpha -> ai_engineer=1,ai_product_manager=2"
    );

    store.close().await;
    assert_eq!(responder.respond("alpha").await, FALLBACK_REPLY);
    Ok(())
}
