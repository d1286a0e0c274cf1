//! Question-time retrieval and document ingestion.
//!
//! - **[`orchestrator`]**: encodes a question once and queries every
//!   specialization concurrently, returning one labeled block per tag
//! - **[`ingest`]**: embeds crawled documents and writes them, skipping URLs
//!   the store already knows
//! - **[`chat`]**: wraps retrieval plus answer generation behind a reply that
//!   never surfaces a raw error

use itmo_qa_embed::EmbedError;
use std::time::Duration;

use crate::storage::StoreError;

pub mod chat;
pub mod ingest;
pub mod orchestrator;

pub use chat::{AnswerGenerator, ChatResponder, FALLBACK_REPLY};
pub use ingest::{IngestFailure, IngestRecord, IngestReport, Ingestor};
pub use orchestrator::{ContextBlock, RetrievalOrchestrator, RetrievedContext};

/// Failures while building a context
#[derive(Debug, thiserror::Error)]
pub enum RetrievalError {
    #[error("failed to embed question: {0}")]
    Embedding(#[from] EmbedError),

    #[error("similarity query failed: {0}")]
    Store(#[from] StoreError),

    #[error("context retrieval timed out after {0:?}")]
    Timeout(Duration),
}
