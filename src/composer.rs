//! One-time composition of configuration and backends into an engine.
//!
//! Composition runs exactly once, synchronously, at process startup: the raw
//! configuration tree is normalized, the mandatory settings are validated
//! eagerly (every rule evaluated before any backend is built), and the
//! selected backends are constructed in a fixed order. The resulting
//! [`Engine`] is immutable; share it behind an `Arc` rather than through
//! ambient global state.

use std::sync::Arc;

use serde_json::Value;

use crate::backends::{EmbeddingGenerator, MemoryDb, TextGenerator};
use crate::config::{ConfigError, MemoryConfig, SearchClientConfig};
use crate::registry::BackendRegistry;
use crate::search::{SearchError, SearchExecutor};

/// Composed, read-only memory engine.
///
/// Backend roles left unfilled by composition (an unmatched selector with no
/// override) stay empty; [`Engine::search_executor`] reports which mandatory
/// role is missing when search is attempted anyway.
pub struct Engine {
    config: MemoryConfig,
    search_client: SearchClientConfig,
    memory_db: Option<Arc<dyn MemoryDb>>,
    embedder: Option<Arc<dyn EmbeddingGenerator>>,
    text_generator: Option<Arc<dyn TextGenerator>>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("search_client", &self.search_client)
            .field("memory_db", &self.memory_db.is_some())
            .field("embedder", &self.embedder.is_some())
            .field("text_generator", &self.text_generator.is_some())
            .finish()
    }
}

impl Engine {
    /// The normalized configuration the engine was composed from.
    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    /// Search-client tuning attached during composition.
    pub fn search_client(&self) -> &SearchClientConfig {
        &self.search_client
    }

    /// Storage backend handle, when the role was filled.
    pub fn memory_db(&self) -> Option<Arc<dyn MemoryDb>> {
        self.memory_db.clone()
    }

    /// Retrieval embedding generator handle, when the role was filled.
    pub fn embedder(&self) -> Option<Arc<dyn EmbeddingGenerator>> {
        self.embedder.clone()
    }

    /// Text generator handle, when the role was filled.
    pub fn text_generator(&self) -> Option<Arc<dyn TextGenerator>> {
        self.text_generator.clone()
    }

    /// Build a search executor over the engine's backends.
    ///
    /// Fails with [`SearchError::MissingBackend`] when the storage backend or
    /// the retrieval embedding generator was never attached. The text
    /// generator is optional here; without one the executor searches but
    /// cannot answer.
    pub fn search_executor(&self) -> Result<SearchExecutor, SearchError> {
        let memory_db = self
            .memory_db
            .clone()
            .ok_or(SearchError::MissingBackend("storage"))?;
        let embedder = self
            .embedder
            .clone()
            .ok_or(SearchError::MissingBackend("embedding"))?;
        let mut executor = SearchExecutor::new(memory_db, embedder, self.search_client.clone());
        if let Some(generator) = self.text_generator.clone() {
            executor = executor.with_text_generator(generator);
        }
        Ok(executor)
    }
}

/// Builder that turns raw configuration plus registered factories into an
/// [`Engine`].
///
/// Custom backends supplied through the `with_*` methods take precedence over
/// registry resolution for their role; this is the extension path for
/// selectors no built-in factory matches.
pub struct ServiceComposer {
    registry: BackendRegistry,
    memory_db: Option<Arc<dyn MemoryDb>>,
    embedder: Option<Arc<dyn EmbeddingGenerator>>,
    text_generator: Option<Arc<dyn TextGenerator>>,
}

impl ServiceComposer {
    /// Create a composer over a populated registry.
    pub fn new(registry: BackendRegistry) -> Self {
        Self {
            registry,
            memory_db: None,
            embedder: None,
            text_generator: None,
        }
    }

    /// Supply a custom storage backend, bypassing registry resolution.
    pub fn with_memory_db(mut self, backend: Arc<dyn MemoryDb>) -> Self {
        self.memory_db = Some(backend);
        self
    }

    /// Supply a custom retrieval embedding generator.
    pub fn with_embedder(mut self, backend: Arc<dyn EmbeddingGenerator>) -> Self {
        self.embedder = Some(backend);
        self
    }

    /// Supply a custom text generator.
    pub fn with_text_generator(mut self, backend: Arc<dyn TextGenerator>) -> Self {
        self.text_generator = Some(backend);
        self
    }

    /// Normalize, validate, and compose the engine.
    ///
    /// Validation is eager and collective: every mandatory-setting rule is
    /// checked before any backend is built, and all violations are reported
    /// in one [`ConfigError::MissingFields`] naming the fields.
    pub fn compose(self, raw: Value) -> Result<Engine, ConfigError> {
        let config = MemoryConfig::from_value(raw)?;
        validate(&config)?;

        // Search-client tuning is attached unconditionally, never gated on a
        // backend selector.
        let search_client = config.retrieval.search_client.clone();

        let memory_db = match self.memory_db {
            Some(backend) => Some(backend),
            None => build_backend(
                "storage",
                &config.retrieval.memory_db_type,
                &config,
                |selector| self.registry.resolve_memory_db(selector),
            )?,
        };
        let embedder = match self.embedder {
            Some(backend) => Some(backend),
            None => build_backend(
                "embedding",
                &config.retrieval.embedding_generator_type,
                &config,
                |selector| self.registry.resolve_embedder(selector),
            )?,
        };
        let text_generator = match self.text_generator {
            Some(backend) => Some(backend),
            None => build_backend(
                "text-generation",
                &config.text_generator_type,
                &config,
                |selector| self.registry.resolve_text_generator(selector),
            )?,
        };

        tracing::info!(
            storage = memory_db.is_some(),
            embedding = embedder.is_some(),
            text_generation = text_generator.is_some(),
            "Memory engine composed"
        );

        Ok(Engine {
            config,
            search_client,
            memory_db,
            embedder,
            text_generator,
        })
    }
}

/// Resolve one role's selector and run its factory.
///
/// An unmatched selector is a resolution gap, not an error: the role is left
/// empty so an externally supplied backend can stand in. Factory failures
/// abort composition.
fn build_backend<T: ?Sized>(
    role: &'static str,
    selector: &str,
    config: &MemoryConfig,
    resolve: impl Fn(&str) -> Option<Arc<dyn Fn(&Value) -> anyhow::Result<Arc<T>> + Send + Sync>>,
) -> Result<Option<Arc<T>>, ConfigError> {
    let selector = selector.trim();
    if selector.is_empty() {
        return Ok(None);
    }

    match resolve(selector) {
        Some(factory) => {
            let section = config.service_section(selector);
            let backend = factory(&section).map_err(|source| ConfigError::Backend {
                role,
                selector: selector.to_string(),
                source,
            })?;
            tracing::debug!(role, selector, "Backend attached");
            Ok(Some(backend))
        }
        None => {
            tracing::debug!(
                role,
                selector,
                "No built-in backend matches selector; expecting a custom implementation"
            );
            Ok(None)
        }
    }
}

fn validate(config: &MemoryConfig) -> Result<(), ConfigError> {
    let mut missing: Vec<&str> = Vec::new();

    if config.text_generator_type.trim().is_empty() {
        missing.push("TextGeneratorType");
    }
    if config.data_ingestion.embedding_generation_enabled
        && !config
            .data_ingestion
            .embedding_generator_types
            .iter()
            .any(|selector| !selector.trim().is_empty())
    {
        missing.push("DataIngestion.EmbeddingGeneratorTypes");
    }
    if config.retrieval.embedding_generator_type.trim().is_empty() {
        missing.push("Retrieval.EmbeddingGeneratorType");
    }

    if missing.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::MissingFields(missing.join(", ")))
    }
}
