//! Backend capability traits and their error types.
//!
//! The engine composes three pluggable roles: a storage/vector backend
//! ([`MemoryDb`]), an embedding generator, and a text generator. Built-in
//! implementations live in the submodules; callers may substitute their own
//! through the composer's override path.

pub mod openai;
pub mod qdrant;

use async_trait::async_trait;
use reqwest::StatusCode;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::search::SearchFilter;

/// One scored partition returned from the storage backend.
#[derive(Debug, Clone)]
pub struct MemoryRecord {
    /// Identifier of the source document the partition belongs to.
    pub source_id: String,
    /// Optional link back to the source document.
    pub link: Option<String>,
    /// Text excerpt stored for the partition.
    pub text: String,
    /// Relevance score in `[0, 1]` reported by the backend.
    pub relevance: f64,
    /// Position of the partition within its source document.
    pub partition_index: usize,
}

/// Errors returned by storage/vector backends.
#[derive(Debug, Error)]
pub enum MemoryDbError {
    /// Backend endpoint failed to parse or normalize.
    #[error("Invalid storage endpoint: {0}")]
    InvalidUrl(String),
    /// HTTP layer failed before receiving a response.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Backend responded with an unexpected status code.
    #[error("Unexpected storage response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned by the backend.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
    /// Fault reported by a non-HTTP or custom backend.
    #[error("Storage backend fault: {0}")]
    Backend(String),
    /// The in-flight query was cancelled by the caller.
    #[error("Storage query was cancelled")]
    Cancelled,
}

/// Errors raised by embedding generators.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// Provider was unable to produce embeddings for the supplied input.
    #[error("Failed to generate embeddings: {0}")]
    GenerationFailed(String),
    /// HTTP layer failed before receiving a response.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// The in-flight request was cancelled by the caller.
    #[error("Embedding request was cancelled")]
    Cancelled,
}

/// Errors raised by text generators.
#[derive(Debug, Error)]
pub enum TextGenerationError {
    /// Provider was unable to produce a completion.
    #[error("Failed to generate text: {0}")]
    GenerationFailed(String),
    /// HTTP layer failed before receiving a response.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// The in-flight request was cancelled by the caller.
    #[error("Text generation was cancelled")]
    Cancelled,
}

/// Storage/vector backend queried during search.
///
/// Implementations perform a read-only similarity query; retry policy, if
/// any, belongs to the implementation, never to the callers.
#[async_trait]
pub trait MemoryDb: Send + Sync {
    /// Query an index for partitions similar to `vector`.
    ///
    /// `filter` pairs are required matches (logical AND), `min_relevance` is
    /// an inclusive lower bound, and `limit` caps the number of returned
    /// records. Cancellation via `cancel` must surface as
    /// [`MemoryDbError::Cancelled`] without side effects.
    async fn query(
        &self,
        index: &str,
        vector: Vec<f32>,
        filter: &SearchFilter,
        min_relevance: f64,
        limit: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<MemoryRecord>, MemoryDbError>;
}

/// Interface implemented by embedding backends.
#[async_trait]
pub trait EmbeddingGenerator: Send + Sync {
    /// Produce an embedding vector for each supplied text.
    async fn embed(
        &self,
        texts: Vec<String>,
        cancel: &CancellationToken,
    ) -> Result<Vec<Vec<f32>>, EmbeddingError>;
}

/// Interface implemented by text-generation backends.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Produce a completion for the prompt within the given token budget.
    async fn generate(
        &self,
        prompt: &str,
        max_tokens: usize,
        cancel: &CancellationToken,
    ) -> Result<String, TextGenerationError>;
}
