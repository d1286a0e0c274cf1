//! itmo-qa-retriever: vector retrieval for the ITMO admissions assistant
//!
//! Crawled articles are stored with their document embeddings in a single
//! SQLite table. A question is encoded with the query model and matched
//! against each audience (specialization) separately, so the answer
//! generator sees an "engineer" context and a "manager" context side by side.
//!
//! ## Key Modules
//!
//! - **[`storage`]**: the article table, packed embeddings and top-k search
//! - **[`retrieval`]**: context building, batch ingestion and the chat responder
//! - **[`config`]**: TOML + environment configuration
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use itmo_qa_embed::{CloudEmbedConfig, CloudEmbedProvider, Credentials};
//! use itmo_qa_retriever::{
//!     config::StoreConfig,
//!     retrieval::RetrievalOrchestrator,
//!     storage::{ArticleStore, SqliteArticleStore},
//! };
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let store = SqliteArticleStore::open(&StoreConfig::new("articles.db")).await?;
//! store.initialize_schema().await?;
//!
//! let embedder = CloudEmbedProvider::new(CloudEmbedConfig::new(
//!     "b1g-folder-id",
//!     Credentials::ApiKey("secret".to_string()),
//! ))?;
//! let orchestrator = RetrievalOrchestrator::new(Arc::new(store), Arc::new(embedder));
//!
//! let context = orchestrator
//!     .build_context("What will I study?", &["ai_engineer", "ai_product_manager"], 5)
//!     .await?;
//! for block in &context.blocks {
//!     println!("{}: {} articles", block.specialization, block.articles.len());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! crawler → Ingestor → encode_document → ArticleStore::insert
//!                                              ↓
//! question → RetrievalOrchestrator → encode_query → top_k_similar × N → blocks
//!                                                                        ↓
//!                                           ChatResponder → AnswerGenerator
//! ```

pub mod config;
pub mod retrieval;
pub mod storage;
