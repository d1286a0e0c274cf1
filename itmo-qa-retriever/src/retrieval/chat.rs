//! One-message-in, one-message-out answering.

use super::orchestrator::{RetrievalOrchestrator, RetrievedContext};
use crate::config::RetrievalConfig;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::error;

/// Reply sent when a question cannot be answered
pub const FALLBACK_REPLY: &str =
    "Sorry, I could not find an answer right now. Please try again a bit later.";

/// Produces an answer from a question and its retrieved context.
#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    async fn generate(&self, question: &str, context: &RetrievedContext) -> anyhow::Result<String>;
}

pub struct ChatResponder {
    orchestrator: RetrievalOrchestrator,
    generator: Arc<dyn AnswerGenerator>,
    specializations: Vec<String>,
    k_per_specialization: usize,
}

impl ChatResponder {
    pub fn new(
        orchestrator: RetrievalOrchestrator,
        generator: Arc<dyn AnswerGenerator>,
        config: &RetrievalConfig,
    ) -> Self {
        let orchestrator = match config.timeout() {
            Some(timeout) => orchestrator.with_timeout(timeout),
            None => orchestrator,
        };
        Self {
            orchestrator,
            generator,
            specializations: config.specializations.clone(),
            k_per_specialization: config.k_per_specialization,
        }
    }

    /// Answers `question`, replying with [`FALLBACK_REPLY`] on any failure.
    pub async fn respond(&self, question: &str) -> String {
        match self.try_respond(question).await {
            Ok(answer) => answer,
            Err(e) => {
                error!("Failed to answer question: {:#}", e);
                FALLBACK_REPLY.to_string()
            }
        }
    }

    /// Retrieval followed by generation, with errors intact.
    pub async fn try_respond(&self, question: &str) -> anyhow::Result<String> {
        let context = self
            .orchestrator
            .build_context(
                question,
                self.specializations.as_slice(),
                self.k_per_specialization,
            )
            .await?;
        self.generator.generate(question, &context).await
    }
}
