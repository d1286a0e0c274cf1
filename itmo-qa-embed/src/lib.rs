//! # itmo-qa-embed
//!
//! Text embedding providers for the ITMO question-answering service.
//!
//! Retrieval uses an asymmetric model pair: articles are encoded with the
//! *document* model when they are indexed, questions with the *query* model
//! when they are searched. [`EmbeddingProvider`] keeps the two modes apart so
//! callers cannot accidentally search document vectors with document vectors.
//!
//! ## Quick Start
//!
//! ```no_run
//! use itmo_qa_embed::{CloudEmbedConfig, CloudEmbedProvider, Credentials, EmbeddingProvider};
//!
//! # async fn example() -> itmo_qa_embed::Result<()> {
//! let provider = CloudEmbedProvider::new(CloudEmbedConfig::new(
//!     "b1g-folder-id",
//!     Credentials::ApiKey("secret".to_string()),
//! ))?;
//!
//! let question = provider.encode_query("How do I apply to the AI program?").await?;
//! assert_eq!(question.len(), provider.embedding_dimension());
//! # Ok(())
//! # }
//! ```
//!
//! ## Providers
//!
//! - [`CloudEmbedProvider`]: REST client for the cloud text-search models
//! - `LocalEmbedProvider`: local ONNX models via fastembed (`local-models` feature)

pub mod cloud;
pub mod config;
pub mod error;
#[cfg(feature = "local-models")]
pub mod local;
pub mod provider;

pub use cloud::CloudEmbedProvider;
pub use config::{CloudEmbedConfig, Credentials, LocalEmbedConfig};
pub use error::{EmbedError, Result};
#[cfg(feature = "local-models")]
pub use local::LocalEmbedProvider;
pub use provider::{EmbeddingMode, EmbeddingProvider, validate_embedding};
