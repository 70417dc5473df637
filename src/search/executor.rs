//! Execution of tag-filtered, relevance-thresholded searches.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::backends::{
    EmbeddingError, EmbeddingGenerator, MemoryDb, MemoryDbError, MemoryRecord,
    TextGenerationError, TextGenerator,
};
use crate::config::SearchClientConfig;
use crate::search::filter::SearchFilter;
use crate::search::types::{Answer, Citation, Partition, SearchResult};

/// Sentinel for "no upper bound on returned citations".
pub const NO_RESULT_LIMIT: i64 = -1;

/// Errors surfaced while executing a search.
#[derive(Debug, Error)]
pub enum SearchError {
    /// A mandatory backend role was never filled on the engine.
    #[error("No {0} backend is attached to the engine")]
    MissingBackend(&'static str),
    /// Embedding the query text failed.
    #[error("Failed to embed the query: {0}")]
    Embedding(#[source] EmbeddingError),
    /// The storage backend reported a fault.
    #[error("Storage query failed: {0}")]
    MemoryDb(#[source] MemoryDbError),
    /// Generating the answer text failed.
    #[error("Answer generation failed: {0}")]
    TextGeneration(#[source] TextGenerationError),
    /// The caller cancelled the request; distinct from a search failure.
    #[error("Search was cancelled")]
    Cancelled,
}

impl From<EmbeddingError> for SearchError {
    fn from(error: EmbeddingError) -> Self {
        match error {
            EmbeddingError::Cancelled => Self::Cancelled,
            other => Self::Embedding(other),
        }
    }
}

impl From<MemoryDbError> for SearchError {
    fn from(error: MemoryDbError) -> Self {
        match error {
            MemoryDbError::Cancelled => Self::Cancelled,
            other => Self::MemoryDb(other),
        }
    }
}

impl From<TextGenerationError> for SearchError {
    fn from(error: TextGenerationError) -> Self {
        match error {
            TextGenerationError::Cancelled => Self::Cancelled,
            other => Self::TextGeneration(other),
        }
    }
}

/// Stateless per-request search runner over a composed engine's backends.
///
/// Holds shared handles only; construct one per engine (or per request, they
/// are interchangeable) and call [`SearchExecutor::search`] concurrently from
/// as many tasks as needed.
pub struct SearchExecutor {
    memory_db: Arc<dyn MemoryDb>,
    embedder: Arc<dyn EmbeddingGenerator>,
    text_generator: Option<Arc<dyn TextGenerator>>,
    tuning: SearchClientConfig,
}

impl std::fmt::Debug for SearchExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchExecutor")
            .field("text_generator", &self.text_generator.is_some())
            .field("tuning", &self.tuning)
            .finish()
    }
}

impl SearchExecutor {
    /// Assemble an executor from backend handles and search tuning.
    pub fn new(
        memory_db: Arc<dyn MemoryDb>,
        embedder: Arc<dyn EmbeddingGenerator>,
        tuning: SearchClientConfig,
    ) -> Self {
        Self {
            memory_db,
            embedder,
            text_generator: None,
            tuning,
        }
    }

    /// Attach a text generator, enabling [`SearchExecutor::ask`].
    pub fn with_text_generator(mut self, generator: Arc<dyn TextGenerator>) -> Self {
        self.text_generator = Some(generator);
        self
    }

    /// Run one search request.
    ///
    /// `relevance_threshold` is an inclusive lower bound in `[0, 1]`;
    /// `result_count` caps the number of returned citations, with any
    /// negative value (canonically [`NO_RESULT_LIMIT`]) meaning unbounded.
    /// Backend faults propagate unmodified; cancellation surfaces as
    /// [`SearchError::Cancelled`]. No retries are attempted here.
    pub async fn search(
        &self,
        index: &str,
        query: &str,
        filter: &SearchFilter,
        relevance_threshold: f64,
        result_count: i64,
        cancel: &CancellationToken,
    ) -> Result<SearchResult, SearchError> {
        if result_count == 0 {
            return Ok(SearchResult::empty(query));
        }

        let threshold = relevance_threshold.clamp(0.0, 1.0);
        let backend_limit = if result_count < 0 {
            self.tuning.max_matches_count
        } else {
            (result_count as usize).min(self.tuning.max_matches_count)
        };

        tracing::debug!(
            index,
            threshold,
            result_count,
            backend_limit,
            tags = filter.pairs().len(),
            "Executing search"
        );

        let mut vectors = self
            .embedder
            .embed(vec![query.to_string()], cancel)
            .await?;
        let vector = vectors.pop().ok_or_else(|| {
            SearchError::Embedding(EmbeddingError::GenerationFailed(
                "no vectors returned for the query".to_string(),
            ))
        })?;

        let records = self
            .memory_db
            .query(index, vector, filter, threshold, backend_limit, cancel)
            .await?;

        let mut citations = rank_and_group(records, threshold);
        if result_count >= 0 {
            citations.truncate(result_count as usize);
        }

        tracing::debug!(index, citations = citations.len(), "Search completed");
        Ok(SearchResult {
            query: query.to_string(),
            citations,
        })
    }

    /// Answer a question from the memories matching `filter`.
    ///
    /// Runs an unbounded search, then asks the attached text generator to
    /// write an answer grounded in the retrieved partitions, spending at most
    /// the configured `AnswerTokens`. When nothing clears the threshold the
    /// configured `EmptyAnswer` sentinel is returned without invoking the
    /// generator; when memories matched but no generator is attached, this
    /// fails with [`SearchError::MissingBackend`].
    pub async fn ask(
        &self,
        index: &str,
        question: &str,
        filter: &SearchFilter,
        relevance_threshold: f64,
        cancel: &CancellationToken,
    ) -> Result<Answer, SearchError> {
        let result = self
            .search(
                index,
                question,
                filter,
                relevance_threshold,
                NO_RESULT_LIMIT,
                cancel,
            )
            .await?;

        if result.citations.is_empty() {
            tracing::debug!(index, "No memories cleared the threshold");
            return Ok(Answer {
                question: question.to_string(),
                text: self.tuning.empty_answer.clone(),
                citations: Vec::new(),
            });
        }

        let generator = self
            .text_generator
            .clone()
            .ok_or(SearchError::MissingBackend("text-generation"))?;
        let prompt = build_prompt(question, &result.citations);
        let text = generator
            .generate(&prompt, self.tuning.answer_tokens, cancel)
            .await?;

        Ok(Answer {
            question: question.to_string(),
            text,
            citations: result.citations,
        })
    }
}

/// Lay out retrieved partitions as facts ahead of the question.
fn build_prompt(question: &str, citations: &[Citation]) -> String {
    let mut prompt = String::from("Facts:\n");
    for citation in citations {
        for partition in &citation.partitions {
            prompt.push_str(&partition.text);
            prompt.push('\n');
        }
    }
    prompt.push_str("\nQuestion: ");
    prompt.push_str(question);
    prompt.push_str("\nAnswer: ");
    prompt
}

/// Threshold, rank, and group flat records into ordered citations.
///
/// Records are re-checked against the inclusive threshold (backends usually
/// filter already), stably sorted by descending relevance so backend order
/// breaks ties, then grouped by source document. Citations inherit the order
/// of their best record; partitions inside a citation follow document order.
fn rank_and_group(records: Vec<MemoryRecord>, threshold: f64) -> Vec<Citation> {
    let mut kept: Vec<MemoryRecord> = records
        .into_iter()
        .filter(|record| record.relevance >= threshold)
        .collect();
    kept.sort_by(|a, b| {
        b.relevance
            .partial_cmp(&a.relevance)
            .unwrap_or(Ordering::Equal)
    });

    let mut citations: Vec<Citation> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();
    for record in kept {
        let partition = Partition {
            text: record.text,
            relevance: record.relevance,
            partition_index: record.partition_index,
        };
        match positions.get(&record.source_id) {
            Some(&position) => citations[position].partitions.push(partition),
            None => {
                positions.insert(record.source_id.clone(), citations.len());
                citations.push(Citation {
                    source_id: record.source_id,
                    link: record.link,
                    partitions: vec![partition],
                });
            }
        }
    }

    for citation in &mut citations {
        citation
            .partitions
            .sort_by_key(|partition| partition.partition_index);
    }
    citations
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct FixedMemoryDb {
        records: Vec<MemoryRecord>,
        seen_filters: Mutex<Vec<SearchFilter>>,
        seen_limits: Mutex<Vec<usize>>,
    }

    impl FixedMemoryDb {
        fn new(records: Vec<MemoryRecord>) -> Self {
            Self {
                records,
                seen_filters: Mutex::new(Vec::new()),
                seen_limits: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl MemoryDb for FixedMemoryDb {
        async fn query(
            &self,
            _index: &str,
            _vector: Vec<f32>,
            filter: &SearchFilter,
            _min_relevance: f64,
            limit: usize,
            cancel: &CancellationToken,
        ) -> Result<Vec<MemoryRecord>, MemoryDbError> {
            if cancel.is_cancelled() {
                return Err(MemoryDbError::Cancelled);
            }
            self.seen_filters.lock().unwrap().push(filter.clone());
            self.seen_limits.lock().unwrap().push(limit);
            Ok(self.records.clone())
        }
    }

    struct FixedTextGenerator {
        reply: String,
        seen_prompts: Mutex<Vec<String>>,
        seen_budgets: Mutex<Vec<usize>>,
    }

    impl FixedTextGenerator {
        fn new(reply: &str) -> Self {
            Self {
                reply: reply.to_string(),
                seen_prompts: Mutex::new(Vec::new()),
                seen_budgets: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl TextGenerator for FixedTextGenerator {
        async fn generate(
            &self,
            prompt: &str,
            max_tokens: usize,
            cancel: &CancellationToken,
        ) -> Result<String, TextGenerationError> {
            if cancel.is_cancelled() {
                return Err(TextGenerationError::Cancelled);
            }
            self.seen_prompts.lock().unwrap().push(prompt.to_string());
            self.seen_budgets.lock().unwrap().push(max_tokens);
            Ok(self.reply.clone())
        }
    }

    struct FixedEmbedder;

    #[async_trait]
    impl EmbeddingGenerator for FixedEmbedder {
        async fn embed(
            &self,
            texts: Vec<String>,
            cancel: &CancellationToken,
        ) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            if cancel.is_cancelled() {
                return Err(EmbeddingError::Cancelled);
            }
            Ok(texts.iter().map(|_| vec![0.1, 0.2, 0.3]).collect())
        }
    }

    fn record(source: &str, relevance: f64, partition_index: usize) -> MemoryRecord {
        MemoryRecord {
            source_id: source.to_string(),
            link: Some(format!("https://example.test/{source}")),
            text: format!("{source}#{partition_index}"),
            relevance,
            partition_index,
        }
    }

    fn make_executor(records: Vec<MemoryRecord>) -> (SearchExecutor, Arc<FixedMemoryDb>) {
        let db = Arc::new(FixedMemoryDb::new(records));
        let executor = SearchExecutor::new(
            db.clone(),
            Arc::new(FixedEmbedder),
            SearchClientConfig::default(),
        );
        (executor, db)
    }

    #[tokio::test]
    async fn threshold_is_an_inclusive_lower_bound() {
        let (executor, _) = make_executor(vec![
            record("a", 0.9, 0),
            record("b", 0.6, 0),
            record("c", 0.3, 0),
        ]);

        let result = executor
            .search(
                "idx",
                "q",
                &SearchFilter::new(),
                0.5,
                NO_RESULT_LIMIT,
                &CancellationToken::new(),
            )
            .await
            .expect("search");

        let sources: Vec<&str> = result
            .citations
            .iter()
            .map(|citation| citation.source_id.as_str())
            .collect();
        assert_eq!(sources, ["a", "b"]);

        // Exactly-at-threshold records are kept.
        let (executor, _) = executor_with_threshold_record();
        let result = executor
            .search(
                "idx",
                "q",
                &SearchFilter::new(),
                0.6,
                NO_RESULT_LIMIT,
                &CancellationToken::new(),
            )
            .await
            .expect("search");
        assert_eq!(result.citations.len(), 1);
    }

    fn executor_with_threshold_record() -> (SearchExecutor, Arc<FixedMemoryDb>) {
        make_executor(vec![record("edge", 0.6, 0)])
    }

    #[tokio::test]
    async fn result_count_caps_citations_and_minus_one_lifts_the_cap() {
        let records = vec![
            record("a", 0.9, 0),
            record("b", 0.6, 0),
            record("c", 0.3, 0),
        ];

        let (executor, _) = make_executor(records.clone());
        let capped = executor
            .search(
                "idx",
                "q",
                &SearchFilter::new(),
                0.5,
                1,
                &CancellationToken::new(),
            )
            .await
            .expect("search");
        assert_eq!(capped.citations.len(), 1);
        assert_eq!(capped.citations[0].source_id, "a");

        let (executor, _) = make_executor(records);
        let unbounded = executor
            .search(
                "idx",
                "q",
                &SearchFilter::new(),
                0.0,
                NO_RESULT_LIMIT,
                &CancellationToken::new(),
            )
            .await
            .expect("search");
        assert_eq!(unbounded.citations.len(), 3);
    }

    #[tokio::test]
    async fn zero_result_count_short_circuits_to_an_empty_result() {
        let (executor, db) = make_executor(vec![record("a", 0.9, 0)]);
        let result = executor
            .search(
                "idx",
                "q",
                &SearchFilter::new(),
                0.0,
                0,
                &CancellationToken::new(),
            )
            .await
            .expect("search");
        assert!(result.citations.is_empty());
        assert!(db.seen_limits.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn backend_limit_never_exceeds_max_matches_count() {
        let db = Arc::new(FixedMemoryDb::new(Vec::new()));
        let executor = SearchExecutor::new(
            db.clone(),
            Arc::new(FixedEmbedder),
            SearchClientConfig {
                max_matches_count: 10,
                ..SearchClientConfig::default()
            },
        );

        executor
            .search(
                "idx",
                "q",
                &SearchFilter::new(),
                0.0,
                500,
                &CancellationToken::new(),
            )
            .await
            .expect("search");
        executor
            .search(
                "idx",
                "q",
                &SearchFilter::new(),
                0.0,
                NO_RESULT_LIMIT,
                &CancellationToken::new(),
            )
            .await
            .expect("search");

        assert_eq!(*db.seen_limits.lock().unwrap(), vec![10, 10]);
    }

    #[tokio::test]
    async fn records_group_into_citations_by_source() {
        let (executor, _) = make_executor(vec![
            record("doc-a", 0.7, 3),
            record("doc-b", 0.8, 0),
            record("doc-a", 0.9, 1),
        ]);

        let result = executor
            .search(
                "idx",
                "q",
                &SearchFilter::new(),
                0.0,
                NO_RESULT_LIMIT,
                &CancellationToken::new(),
            )
            .await
            .expect("search");

        assert_eq!(result.citations.len(), 2);
        // doc-a owns the best partition, so it ranks first.
        let first = &result.citations[0];
        assert_eq!(first.source_id, "doc-a");
        assert!((first.relevance() - 0.9).abs() < 1e-9);
        // Partitions inside a citation follow document order.
        let indexes: Vec<usize> = first
            .partitions
            .iter()
            .map(|partition| partition.partition_index)
            .collect();
        assert_eq!(indexes, [1, 3]);
        assert_eq!(result.citations[1].source_id, "doc-b");
    }

    #[tokio::test]
    async fn filter_is_forwarded_to_the_backend() {
        let (executor, db) = make_executor(Vec::new());
        let filter = SearchFilter::for_chat("chat-1", Some("notes"));

        executor
            .search(
                "idx",
                "q",
                &filter,
                0.0,
                NO_RESULT_LIMIT,
                &CancellationToken::new(),
            )
            .await
            .expect("search");

        let seen = db.seen_filters.lock().unwrap();
        assert_eq!(seen.as_slice(), [filter]);
    }

    #[tokio::test]
    async fn ask_grounds_the_answer_in_retrieved_partitions() {
        let generator = Arc::new(FixedTextGenerator::new("the meeting moved to friday"));
        let (executor, _) = make_executor(vec![record("doc-a", 0.9, 0)]);
        let executor = executor.with_text_generator(generator.clone());

        let answer = executor
            .ask(
                "idx",
                "when is the meeting?",
                &SearchFilter::new(),
                0.5,
                &CancellationToken::new(),
            )
            .await
            .expect("answer");

        assert_eq!(answer.text, "the meeting moved to friday");
        assert_eq!(answer.question, "when is the meeting?");
        assert_eq!(answer.citations.len(), 1);

        // The prompt carries the retrieved fact and the question, and the
        // configured token budget reaches the generator.
        let prompts = generator.seen_prompts.lock().unwrap();
        assert!(prompts[0].contains("doc-a#0"));
        assert!(prompts[0].contains("Question: when is the meeting?"));
        assert_eq!(
            *generator.seen_budgets.lock().unwrap(),
            vec![SearchClientConfig::default().answer_tokens]
        );
    }

    #[tokio::test]
    async fn ask_returns_the_empty_answer_sentinel_without_generating() {
        let generator = Arc::new(FixedTextGenerator::new("should never be produced"));
        let (executor, _) = make_executor(vec![record("doc-a", 0.2, 0)]);
        let executor = executor.with_text_generator(generator.clone());

        let answer = executor
            .ask("idx", "q", &SearchFilter::new(), 0.5, &CancellationToken::new())
            .await
            .expect("sentinel answer");

        assert_eq!(answer.text, SearchClientConfig::default().empty_answer);
        assert!(answer.citations.is_empty());
        assert!(generator.seen_prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn ask_without_a_generator_names_the_missing_role() {
        let (executor, _) = make_executor(vec![record("doc-a", 0.9, 0)]);

        let error = executor
            .ask("idx", "q", &SearchFilter::new(), 0.5, &CancellationToken::new())
            .await
            .expect_err("no text generator attached");
        assert!(matches!(
            error,
            SearchError::MissingBackend("text-generation")
        ));
    }

    #[tokio::test]
    async fn cancellation_is_not_reported_as_a_failure() {
        let (executor, _) = make_executor(vec![record("a", 0.9, 0)]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let error = executor
            .search("idx", "q", &SearchFilter::new(), 0.0, NO_RESULT_LIMIT, &cancel)
            .await
            .expect_err("cancelled");
        assert!(matches!(error, SearchError::Cancelled));
    }

    #[tokio::test]
    async fn backend_faults_propagate_as_memory_db_errors() {
        struct FailingDb;

        #[async_trait]
        impl MemoryDb for FailingDb {
            async fn query(
                &self,
                _index: &str,
                _vector: Vec<f32>,
                _filter: &SearchFilter,
                _min_relevance: f64,
                _limit: usize,
                _cancel: &CancellationToken,
            ) -> Result<Vec<MemoryRecord>, MemoryDbError> {
                Err(MemoryDbError::Backend("index unavailable".into()))
            }
        }

        let executor = SearchExecutor::new(
            Arc::new(FailingDb),
            Arc::new(FixedEmbedder),
            SearchClientConfig::default(),
        );
        let error = executor
            .search(
                "idx",
                "q",
                &SearchFilter::new(),
                0.0,
                NO_RESULT_LIMIT,
                &CancellationToken::new(),
            )
            .await
            .expect_err("backend fault");
        assert!(matches!(error, SearchError::MemoryDb(_)));
    }
}
