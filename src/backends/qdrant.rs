//! Built-in Qdrant storage backend.
//!
//! A thin HTTP client over Qdrant's query API. Each search index maps to a
//! Qdrant collection; tag predicates become `must` match clauses against the
//! point payloads.

use async_trait::async_trait;
use reqwest::{Client, Method};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tokio_util::sync::CancellationToken;

use crate::backends::{MemoryDb, MemoryDbError, MemoryRecord};
use crate::search::SearchFilter;

/// Settings read from the `"Qdrant"` configuration sub-section.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct QdrantSettings {
    /// Base URL of the Qdrant instance.
    pub endpoint: String,
    /// Optional API key sent with every request.
    #[serde(rename = "APIKey", default)]
    pub api_key: Option<String>,
}

/// Qdrant-backed [`MemoryDb`] implementation.
#[derive(Debug)]
pub struct QdrantMemoryDb {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl QdrantMemoryDb {
    /// Construct a client from the named configuration sub-section.
    pub fn new(settings: QdrantSettings) -> Result<Self, MemoryDbError> {
        let client = Client::builder().user_agent("tagmem/0.1").build()?;
        let base_url =
            normalize_base_url(&settings.endpoint).map_err(MemoryDbError::InvalidUrl)?;
        tracing::debug!(
            url = %base_url,
            has_api_key = settings
                .api_key
                .as_deref()
                .map(|value| !value.is_empty())
                .unwrap_or(false),
            "Initialized Qdrant memory DB"
        );

        Ok(Self {
            client,
            base_url,
            api_key: settings.api_key,
        })
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let base = self.base_url.trim_end_matches('/');
        let path = path.trim_start_matches('/');
        let mut req = self.client.request(method, format!("{base}/{path}"));
        if let Some(api_key) = &self.api_key
            && !api_key.is_empty()
        {
            req = req.header("api-key", api_key);
        }
        req
    }

    async fn run_query(
        &self,
        index: &str,
        body: Value,
    ) -> Result<Vec<MemoryRecord>, MemoryDbError> {
        let response = self
            .request(Method::POST, &format!("collections/{index}/points/query"))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = MemoryDbError::UnexpectedStatus { status, body };
            tracing::error!(index, error = %error, "Qdrant query failed");
            return Err(error);
        }

        let payload: QueryResponse = response.json().await?;
        let points = match payload.result {
            QueryResponseResult::Points(points) => points,
            QueryResponseResult::Object { points } => points,
        };
        Ok(points.into_iter().map(map_point).collect())
    }
}

#[async_trait]
impl MemoryDb for QdrantMemoryDb {
    async fn query(
        &self,
        index: &str,
        vector: Vec<f32>,
        filter: &SearchFilter,
        min_relevance: f64,
        limit: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<MemoryRecord>, MemoryDbError> {
        let mut body = json!({
            "query": vector,
            "limit": limit,
            "with_payload": true,
            "score_threshold": min_relevance,
        });
        if let Some(filter_value) = tag_filter(filter) {
            body.as_object_mut()
                .expect("query body is an object")
                .insert("filter".into(), filter_value);
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(MemoryDbError::Cancelled),
            result = self.run_query(index, body) => result,
        }
    }
}

/// Compose the Qdrant `must` filter from required tag pairs.
fn tag_filter(filter: &SearchFilter) -> Option<Value> {
    let must: Vec<Value> = filter
        .pairs()
        .iter()
        .map(|(name, value)| {
            json!({
                "key": name,
                "match": { "value": value }
            })
        })
        .collect();

    if must.is_empty() {
        None
    } else {
        Some(json!({ "must": must }))
    }
}

fn map_point(point: RawScoredPoint) -> MemoryRecord {
    let payload = point.payload.unwrap_or_default();
    let source_id = payload
        .get("document_id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| stringify_point_id(point.id));
    let link = payload
        .get("link")
        .and_then(Value::as_str)
        .filter(|value| !value.trim().is_empty())
        .map(str::to_string);
    let text = payload
        .get("text")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let partition_index = payload
        .get("partition_index")
        .and_then(Value::as_u64)
        .unwrap_or(0) as usize;

    MemoryRecord {
        source_id,
        link,
        text,
        relevance: point.score,
        partition_index,
    }
}

fn normalize_base_url(url: &str) -> Result<String, String> {
    let mut parsed = reqwest::Url::parse(url).map_err(|err| err.to_string())?;
    let path = parsed.path().trim_end_matches('/').to_string();
    parsed.set_path(&path);
    Ok(parsed.to_string())
}

fn stringify_point_id(id: Value) -> String {
    match id {
        Value::String(text) => text,
        Value::Number(number) => number.to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    result: QueryResponseResult,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum QueryResponseResult {
    Points(Vec<RawScoredPoint>),
    Object { points: Vec<RawScoredPoint> },
}

#[derive(Debug, Deserialize)]
struct RawScoredPoint {
    #[serde(default)]
    id: Value,
    score: f64,
    #[serde(default)]
    payload: Option<Map<String, Value>>,
}
