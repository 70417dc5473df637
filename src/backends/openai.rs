//! Built-in OpenAI-compatible embedding and text-generation backends.
//!
//! Both clients speak the `/v1/embeddings` and `/v1/chat/completions` wire
//! formats, so any compatible endpoint (OpenAI, Azure-style gateways, local
//! servers) can be targeted through the `Endpoint` setting.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::backends::{EmbeddingError, EmbeddingGenerator, TextGenerationError, TextGenerator};

const DEFAULT_ENDPOINT: &str = "https://api.openai.com";
const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
const DEFAULT_TEXT_MODEL: &str = "gpt-4o-mini";

/// Settings read from the OpenAI configuration sub-section.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct OpenAiSettings {
    /// Base URL of the API endpoint.
    pub endpoint: String,
    /// Optional bearer token.
    #[serde(rename = "APIKey")]
    pub api_key: Option<String>,
    /// Model used for embedding requests.
    pub embedding_model: String,
    /// Model used for chat-completion requests.
    pub text_model: String,
}

impl Default for OpenAiSettings {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_key: None,
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            text_model: DEFAULT_TEXT_MODEL.to_string(),
        }
    }
}

/// Join a base endpoint with a `/v1` API path, tolerating pre-versioned bases.
fn api_endpoint(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    if base.ends_with("/v1") {
        format!("{base}/{path}")
    } else {
        format!("{base}/v1/{path}")
    }
}

/// Embedding generator backed by an OpenAI-compatible `/v1/embeddings` API.
pub struct OpenAiEmbedder {
    client: Client,
    settings: OpenAiSettings,
}

impl OpenAiEmbedder {
    /// Construct an embedder from the named configuration sub-section.
    pub fn new(settings: OpenAiSettings) -> Result<Self, EmbeddingError> {
        let client = Client::builder().user_agent("tagmem/0.1").build()?;
        tracing::debug!(
            endpoint = %settings.endpoint,
            model = %settings.embedding_model,
            "Initialized OpenAI embedder"
        );
        Ok(Self { client, settings })
    }

    async fn request_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let url = api_endpoint(&self.settings.endpoint, "embeddings");
        let mut request = self.client.post(url).json(&json!({
            "model": self.settings.embedding_model,
            "input": texts,
        }));
        if let Some(key) = &self.settings.api_key
            && !key.is_empty()
        {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::GenerationFailed(format!(
                "unexpected status {status}: {body}"
            )));
        }

        let payload: EmbeddingsResponse = response.json().await?;
        let mut data = payload.data;
        data.sort_by_key(|item| item.index);
        Ok(data.into_iter().map(|item| item.embedding).collect())
    }
}

#[async_trait]
impl EmbeddingGenerator for OpenAiEmbedder {
    async fn embed(
        &self,
        texts: Vec<String>,
        cancel: &CancellationToken,
    ) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Err(EmbeddingError::GenerationFailed(
                "no texts provided".to_string(),
            ));
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(EmbeddingError::Cancelled),
            result = self.request_embeddings(texts) => result,
        }
    }
}

/// Text generator backed by an OpenAI-compatible `/v1/chat/completions` API.
pub struct OpenAiTextGenerator {
    client: Client,
    settings: OpenAiSettings,
}

impl OpenAiTextGenerator {
    /// Construct a text generator from the named configuration sub-section.
    pub fn new(settings: OpenAiSettings) -> Result<Self, TextGenerationError> {
        let client = Client::builder().user_agent("tagmem/0.1").build()?;
        tracing::debug!(
            endpoint = %settings.endpoint,
            model = %settings.text_model,
            "Initialized OpenAI text generator"
        );
        Ok(Self { client, settings })
    }

    async fn request_completion(
        &self,
        prompt: &str,
        max_tokens: usize,
    ) -> Result<String, TextGenerationError> {
        let url = api_endpoint(&self.settings.endpoint, "chat/completions");
        let mut request = self.client.post(url).json(&json!({
            "model": self.settings.text_model,
            "messages": [{ "role": "user", "content": prompt }],
            "max_tokens": max_tokens,
        }));
        if let Some(key) = &self.settings.api_key
            && !key.is_empty()
        {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(TextGenerationError::GenerationFailed(format!(
                "unexpected status {status}: {body}"
            )));
        }

        let payload: ChatCompletionResponse = response.json().await?;
        payload
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| {
                TextGenerationError::GenerationFailed("response carried no choices".to_string())
            })
    }
}

#[async_trait]
impl TextGenerator for OpenAiTextGenerator {
    async fn generate(
        &self,
        prompt: &str,
        max_tokens: usize,
        cancel: &CancellationToken,
    ) -> Result<String, TextGenerationError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(TextGenerationError::Cancelled),
            result = self.request_completion(prompt, max_tokens) => result,
        }
    }
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingItem {
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}
