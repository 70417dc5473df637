//! Named backend factories with case-insensitive resolution.
//!
//! Each pluggable role (storage/vector store, embedding generator, text
//! generator) has its own lookup table from a lowercased selector string to a
//! factory. The tables are populated once before composition and never
//! mutated afterwards; multiple selector strings may alias one factory.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::backends::openai::{OpenAiEmbedder, OpenAiSettings, OpenAiTextGenerator};
use crate::backends::qdrant::{QdrantMemoryDb, QdrantSettings};
use crate::backends::{EmbeddingGenerator, MemoryDb, TextGenerator};

/// Factory producing a storage backend from its named sub-configuration.
pub type MemoryDbFactory =
    Arc<dyn Fn(&Value) -> anyhow::Result<Arc<dyn MemoryDb>> + Send + Sync>;
/// Factory producing an embedding generator from its named sub-configuration.
pub type EmbedderFactory =
    Arc<dyn Fn(&Value) -> anyhow::Result<Arc<dyn EmbeddingGenerator>> + Send + Sync>;
/// Factory producing a text generator from its named sub-configuration.
pub type TextGeneratorFactory =
    Arc<dyn Fn(&Value) -> anyhow::Result<Arc<dyn TextGenerator>> + Send + Sync>;

/// Per-role factory tables keyed by lowercased selector string.
#[derive(Clone, Default)]
pub struct BackendRegistry {
    memory_dbs: HashMap<String, MemoryDbFactory>,
    embedders: HashMap<String, EmbedderFactory>,
    text_generators: HashMap<String, TextGeneratorFactory>,
}

impl BackendRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry preloaded with the built-in backends.
    ///
    /// Built-ins and their selector aliases:
    /// - storage: `Qdrant`, `QdrantMemoryDb`
    /// - embedding: `OpenAI`, `OpenAIEmbedding`
    /// - text generation: `OpenAI`, `OpenAIText`
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();

        let qdrant: MemoryDbFactory = Arc::new(|section: &Value| {
            let settings: QdrantSettings = serde_json::from_value(section.clone())?;
            Ok(Arc::new(QdrantMemoryDb::new(settings)?) as Arc<dyn MemoryDb>)
        });
        registry.register_memory_db("Qdrant", qdrant.clone());
        registry.register_memory_db("QdrantMemoryDb", qdrant);

        let embedder: EmbedderFactory = Arc::new(|section: &Value| {
            let settings = openai_settings(section)?;
            Ok(Arc::new(OpenAiEmbedder::new(settings)?) as Arc<dyn EmbeddingGenerator>)
        });
        registry.register_embedder("OpenAI", embedder.clone());
        registry.register_embedder("OpenAIEmbedding", embedder);

        let text: TextGeneratorFactory = Arc::new(|section: &Value| {
            let settings = openai_settings(section)?;
            Ok(Arc::new(OpenAiTextGenerator::new(settings)?) as Arc<dyn TextGenerator>)
        });
        registry.register_text_generator("OpenAI", text.clone());
        registry.register_text_generator("OpenAIText", text);

        registry
    }

    /// Register a storage backend factory under a selector key.
    pub fn register_memory_db(&mut self, key: &str, factory: MemoryDbFactory) {
        self.memory_dbs.insert(key.to_ascii_lowercase(), factory);
    }

    /// Register an embedding generator factory under a selector key.
    pub fn register_embedder(&mut self, key: &str, factory: EmbedderFactory) {
        self.embedders.insert(key.to_ascii_lowercase(), factory);
    }

    /// Register a text generator factory under a selector key.
    pub fn register_text_generator(&mut self, key: &str, factory: TextGeneratorFactory) {
        self.text_generators
            .insert(key.to_ascii_lowercase(), factory);
    }

    /// Resolve a storage backend factory, case-insensitively.
    ///
    /// `None` is a resolution gap, not an error: the composer leaves the role
    /// empty and expects a custom backend through the override path.
    pub fn resolve_memory_db(&self, selector: &str) -> Option<MemoryDbFactory> {
        self.memory_dbs.get(&selector.to_ascii_lowercase()).cloned()
    }

    /// Resolve an embedding generator factory, case-insensitively.
    pub fn resolve_embedder(&self, selector: &str) -> Option<EmbedderFactory> {
        self.embedders.get(&selector.to_ascii_lowercase()).cloned()
    }

    /// Resolve a text generator factory, case-insensitively.
    pub fn resolve_text_generator(&self, selector: &str) -> Option<TextGeneratorFactory> {
        self.text_generators
            .get(&selector.to_ascii_lowercase())
            .cloned()
    }
}

/// Read OpenAI settings from a sub-section, defaulting when the section is
/// absent (the hosted endpoint needs no mandatory fields).
fn openai_settings(section: &Value) -> anyhow::Result<OpenAiSettings> {
    if section.is_null() {
        return Ok(OpenAiSettings::default());
    }
    Ok(serde_json::from_value(section.clone())?)
}
