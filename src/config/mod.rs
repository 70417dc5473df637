//! Typed memory configuration sections and configuration errors.

pub mod tree;

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

/// Errors encountered while composing services from configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The raw configuration was absent or not an object at the root.
    #[error("Configuration root is missing or not an object")]
    MissingRoot,
    /// The normalized configuration did not match the expected shape.
    #[error("Invalid configuration: {0}")]
    Invalid(#[from] serde_json::Error),
    /// One or more mandatory settings were absent or empty.
    #[error("Missing required configuration: {0}")]
    MissingFields(String),
    /// A resolved backend factory failed to construct its backend.
    #[error("Failed to build {role} backend '{selector}': {source}")]
    Backend {
        /// Role the factory was registered under.
        role: &'static str,
        /// Selector string that resolved to the failing factory.
        selector: String,
        /// Underlying construction error reported by the factory.
        #[source]
        source: anyhow::Error,
    },
}

/// Normalized root configuration for the memory engine.
///
/// Field names mirror the external configuration keys (PascalCase). Named
/// backend sub-sections, e.g. a `"Qdrant"` object next to the known keys,
/// are captured verbatim in [`MemoryConfig::services`] and handed to the
/// matching factory during composition.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct MemoryConfig {
    /// Selector naming the text-generation backend.
    pub text_generator_type: String,
    /// Ingestion-side settings.
    pub data_ingestion: DataIngestionConfig,
    /// Retrieval-side settings.
    pub retrieval: RetrievalConfig,
    /// Named backend sub-sections keyed by selector string.
    #[serde(flatten)]
    pub services: BTreeMap<String, Value>,
}

/// Data-ingestion section of the memory configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct DataIngestionConfig {
    /// Whether embedding generation is active during ingestion.
    pub embedding_generation_enabled: bool,
    /// Selectors for the ingestion-side embedding generators.
    pub embedding_generator_types: Vec<String>,
}

/// Retrieval section of the memory configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct RetrievalConfig {
    /// Selector naming the retrieval-side embedding generator.
    pub embedding_generator_type: String,
    /// Selector naming the storage/vector backend.
    pub memory_db_type: String,
    /// Search-client tuning, attached to the engine unconditionally.
    pub search_client: SearchClientConfig,
}

/// Tuning knobs for the search client.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase", default)]
pub struct SearchClientConfig {
    /// Upper bound on matches requested from the storage backend.
    pub max_matches_count: usize,
    /// Token budget reserved for generated answers.
    pub answer_tokens: usize,
    /// Sentinel answer returned when no memory clears the threshold.
    pub empty_answer: String,
}

impl Default for SearchClientConfig {
    fn default() -> Self {
        Self {
            max_matches_count: 100,
            answer_tokens: 300,
            empty_answer: "INFO NOT FOUND".to_string(),
        }
    }
}

impl MemoryConfig {
    /// Normalize a raw configuration value and deserialize the typed sections.
    pub fn from_value(raw: Value) -> Result<Self, ConfigError> {
        if !raw.is_object() {
            return Err(ConfigError::MissingRoot);
        }
        let normalized = tree::normalize_value(raw);
        let config: Self = serde_json::from_value(normalized)?;
        Ok(config)
    }

    /// Look up the named sub-section for a selector, case-insensitively.
    ///
    /// Returns `Value::Null` when no section carries the selector's name, in
    /// which case the factory decides whether defaults suffice.
    pub fn service_section(&self, selector: &str) -> Value {
        self.services
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(selector))
            .map(|(_, section)| section.clone())
            .unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn from_value_reads_known_sections_and_trims_selectors() {
        let config = MemoryConfig::from_value(json!({
            "TextGeneratorType": " AzureOpenAIText ",
            "DataIngestion": {
                "EmbeddingGenerationEnabled": true,
                "EmbeddingGeneratorTypes": ["AzureOpenAIEmbedding"]
            },
            "Retrieval": {
                "EmbeddingGeneratorType": "AzureOpenAIEmbedding",
                "MemoryDbType": "AzureAISearch",
                "SearchClient": { "MaxMatchesCount": 25 }
            }
        }))
        .expect("valid configuration");

        assert_eq!(config.text_generator_type, "AzureOpenAIText");
        assert!(config.data_ingestion.embedding_generation_enabled);
        assert_eq!(config.retrieval.memory_db_type, "AzureAISearch");
        assert_eq!(config.retrieval.search_client.max_matches_count, 25);
        assert_eq!(config.retrieval.search_client.answer_tokens, 300);
    }

    #[test]
    fn from_value_rejects_non_object_roots() {
        assert!(matches!(
            MemoryConfig::from_value(json!(null)),
            Err(ConfigError::MissingRoot)
        ));
        assert!(matches!(
            MemoryConfig::from_value(json!("config")),
            Err(ConfigError::MissingRoot)
        ));
    }

    #[test]
    fn service_section_lookup_is_case_insensitive() {
        let config = MemoryConfig::from_value(json!({
            "TextGeneratorType": "OpenAI",
            "Qdrant": { "Endpoint": "http://127.0.0.1:6333" }
        }))
        .expect("valid configuration");

        let section = config.service_section("QDRANT");
        assert_eq!(section["Endpoint"], "http://127.0.0.1:6333");
        assert_eq!(config.service_section("Missing"), Value::Null);
    }

    #[test]
    fn missing_sections_fall_back_to_defaults() {
        let config = MemoryConfig::from_value(json!({})).expect("empty object is shape-valid");
        assert!(config.text_generator_type.is_empty());
        assert!(!config.data_ingestion.embedding_generation_enabled);
        assert_eq!(config.retrieval.search_client, SearchClientConfig::default());
    }
}
