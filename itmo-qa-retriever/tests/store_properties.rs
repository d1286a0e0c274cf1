//! Properties of the SQLite article store on an on-disk database
//!
//! - top-k ordering, bounds and tie-breaking
//! - specialization filtering
//! - URL listing across page sizes
//! - concurrent writers
//! - persistence across reopen

mod common;

use anyhow::Result;
use common::{Lcg, open_store};
use futures::TryStreamExt;
use itmo_qa_retriever::config::StoreConfig;
use itmo_qa_retriever::storage::{
    ArticleStore, NewArticle, RetryPolicy, SqliteArticleStore, StoreError,
};
use std::collections::HashSet;
use std::sync::Arc;
use tempfile::tempdir;

const DIM: usize = 8;
const TAGS: [&str; 3] = ["ai_engineer", "ai_product_manager", "other"];

/// Inserts `count` articles with pseudo-random vectors; every fifth article
/// reuses the previous vector so that distance ties occur.
async fn populate(store: &SqliteArticleStore, count: u32) -> Result<()> {
    let mut rng = Lcg::new(7);
    let mut previous = rng.vector(DIM);
    for i in 0..count {
        let embedding = if i % 5 == 4 {
            previous.clone()
        } else {
            rng.vector(DIM)
        };
        let article = NewArticle::new(
            format!("https://ai.itmo.ru/{i}"),
            format!("article {i}"),
            TAGS[i as usize % TAGS.len()],
            embedding.clone(),
        )
        .with_timestamp(1_000 + i);
        store.insert(article).await?;
        previous = embedding;
    }
    Ok(())
}

#[tokio::test]
async fn test_top_k_bounds_and_order() -> Result<()> {
    let dir = tempdir()?;
    let store = open_store(dir.path(), DIM).await?;
    populate(&store, 30).await?;

    let mut rng = Lcg::new(99);
    for _ in 0..5 {
        let query = rng.vector(DIM);
        for k in [1, 2, 5, 29, 30, 31, 100] {
            let results = store.top_k_similar(&query, k, None).await?;
            assert_eq!(results.len(), k.min(30), "k = {k}");

            for pair in results.windows(2) {
                let (a, b) = (&pair[0], &pair[1]);
                assert!(a.distance <= b.distance, "distances out of order for k = {k}");
                if a.distance == b.distance {
                    assert!(
                        a.article.timestamp >= b.article.timestamp,
                        "tie not broken by newest timestamp"
                    );
                }
            }
        }
    }
    Ok(())
}

#[tokio::test]
async fn test_ties_resolve_to_newest() -> Result<()> {
    let dir = tempdir()?;
    let store = open_store(dir.path(), DIM).await?;
    populate(&store, 10).await?;

    // article 4 copies article 3's vector and is newer
    let results = store.top_k_similar(&[1.0; DIM], 30, None).await?;
    let three = results
        .iter()
        .position(|r| r.article.url == "https://ai.itmo.ru/3");
    let four = results
        .iter()
        .position(|r| r.article.url == "https://ai.itmo.ru/4");
    assert!(four < three, "newer duplicate should rank first");
    Ok(())
}

#[tokio::test]
async fn test_self_query_returns_record_first() -> Result<()> {
    let dir = tempdir()?;
    let store = open_store(dir.path(), DIM).await?;
    populate(&store, 12).await?;

    let own = Lcg::new(1234).vector(DIM);
    store
        .insert(NewArticle::new("https://ai.itmo.ru/self", "self", "other", own.clone()))
        .await?;

    let results = store.top_k_similar(&own, 3, None).await?;
    assert_eq!(results[0].article.url, "https://ai.itmo.ru/self");
    assert!(results[0].distance.abs() < 1e-6);
    Ok(())
}

#[tokio::test]
async fn test_filter_never_leaks_other_tags() -> Result<()> {
    let dir = tempdir()?;
    let store = open_store(dir.path(), DIM).await?;
    populate(&store, 30).await?;

    let query = Lcg::new(5).vector(DIM);
    for tag in TAGS {
        let results = store.top_k_similar(&query, 100, Some(tag)).await?;
        assert_eq!(results.len(), 10, "tag {tag}");
        assert!(
            results
                .iter()
                .all(|r| r.article.specialization_source == tag)
        );
    }

    let none = store.top_k_similar(&query, 5, Some("missing")).await?;
    assert!(none.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_listing_matches_successful_inserts() -> Result<()> {
    let dir = tempdir()?;
    let store = open_store(dir.path(), DIM).await?;
    populate(&store, 25).await?;

    // a rejected duplicate does not add a url
    let duplicate = NewArticle::new("https://ai.itmo.ru/0", "again", "other", vec![0.5; DIM]);
    assert!(matches!(
        store.insert(duplicate).await,
        Err(StoreError::DuplicateKey { .. })
    ));

    for page_size in [1, 4, 5, 24, 25, 26, 1000] {
        let urls: Vec<String> = store.list_known_urls(page_size).try_collect().await?;
        let unique: HashSet<&String> = urls.iter().collect();
        assert_eq!(urls.len(), 25, "page size {page_size}");
        assert_eq!(unique.len(), 25, "page size {page_size}");
    }

    // listings restart from the beginning
    let first: Vec<String> = store.list_known_urls(7).try_collect().await?;
    let second: Vec<String> = store.list_known_urls(7).try_collect().await?;
    assert_eq!(first, second);
    Ok(())
}

#[tokio::test]
async fn test_concurrent_inserts_are_all_visible() -> Result<()> {
    let dir = tempdir()?;
    let store = Arc::new(open_store(dir.path(), DIM).await?);

    let mut handles = Vec::new();
    for writer in 0..8u32 {
        let store = Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            let mut rng = Lcg::new(u64::from(writer));
            for i in 0..10 {
                let article = NewArticle::new(
                    format!("https://ai.itmo.ru/w{writer}/{i}"),
                    "text",
                    "ai_engineer",
                    rng.vector(DIM),
                );
                store.insert(article).await?;
            }
            Ok::<_, StoreError>(())
        }));
    }
    for handle in handles {
        handle.await??;
    }

    let urls = store.known_url_set(16).await?;
    assert_eq!(urls.len(), 80);
    assert!(urls.contains("https://ai.itmo.ru/w7/9"));
    Ok(())
}

#[tokio::test]
async fn test_data_survives_reopen() -> Result<()> {
    let dir = tempdir()?;
    {
        let store = open_store(dir.path(), DIM).await?;
        populate(&store, 6).await?;
        store.close().await;
    }

    let store = open_store(dir.path(), DIM).await?;
    assert_eq!(store.article_count(None).await?, 6);
    let results = store.top_k_similar(&[0.25; DIM], 2, Some("other")).await?;
    assert_eq!(results.len(), 2);
    store.close().await;

    let wrong = open_store(dir.path(), DIM + 1).await;
    let err = wrong.err().and_then(|e| e.downcast::<StoreError>().ok());
    assert!(matches!(err, Some(StoreError::Configuration { .. })));
    Ok(())
}

#[tokio::test]
async fn test_custom_table_and_unreachable_database() -> Result<()> {
    let dir = tempdir()?;
    let config = StoreConfig::new(dir.path().join("custom.db").to_string_lossy())
        .with_table("articles_v2")
        .with_embedding_dimension(DIM)
        .with_retry(RetryPolicy::none());
    let store = SqliteArticleStore::open(&config).await?;
    store.initialize_schema().await?;
    assert_eq!(store.table_name(), "articles_v2");

    let bad_table = StoreConfig::new(dir.path().join("x.db").to_string_lossy())
        .with_table("drop table")
        .with_embedding_dimension(DIM);
    assert!(matches!(
        SqliteArticleStore::open(&bad_table).await,
        Err(StoreError::Configuration { .. })
    ));

    let missing_dir = StoreConfig::new(dir.path().join("no/such/dir/x.db").to_string_lossy())
        .with_embedding_dimension(DIM);
    assert!(SqliteArticleStore::open(&missing_dir).await.is_err());
    Ok(())
}
