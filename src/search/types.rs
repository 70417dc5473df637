//! Result value objects produced by the search executor.

use serde::Serialize;

/// Ranked outcome of one search request.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    /// The original free-text query.
    pub query: String,
    /// Citations ordered by descending relevance.
    pub citations: Vec<Citation>,
}

impl SearchResult {
    /// A result carrying the query but no citations.
    pub fn empty(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            citations: Vec::new(),
        }
    }
}

/// Generated answer to a question, grounded in the citations used to write it.
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    /// The original free-text question.
    pub question: String,
    /// Generated answer text, or the configured sentinel when no memory
    /// cleared the relevance threshold.
    pub text: String,
    /// Citations the answer was grounded in; empty for the sentinel case.
    pub citations: Vec<Citation>,
}

/// One cited source document with its matching excerpts.
#[derive(Debug, Clone, Serialize)]
pub struct Citation {
    /// Identifier of the source document.
    pub source_id: String,
    /// Link back to the source document, when stored.
    pub link: Option<String>,
    /// Matching excerpts ordered by their position in the document.
    pub partitions: Vec<Partition>,
}

impl Citation {
    /// Overall relevance of the citation: its best partition score.
    pub fn relevance(&self) -> f64 {
        self.partitions
            .iter()
            .map(|partition| partition.relevance)
            .fold(0.0, f64::max)
    }
}

/// A single scored excerpt from a source document.
#[derive(Debug, Clone, Serialize)]
pub struct Partition {
    /// Text excerpt stored for the partition.
    pub text: String,
    /// Relevance score in `[0, 1]`.
    pub relevance: f64,
    /// Position of the partition within its source document.
    pub partition_index: usize,
}
