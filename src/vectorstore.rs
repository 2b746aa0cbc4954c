use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

use crate::config::VectorStoreConfig;
use crate::{RagError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorMatch {
    pub id: String,
    pub score: f32,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Top-k similarity search within a single namespace.
    async fn query(&self, embedding: &[f32], namespace: &str, top_k: usize)
        -> Result<Vec<VectorMatch>>;

    /// Vector counts per namespace, for audit tooling.
    async fn namespace_stats(&self) -> Result<HashMap<String, usize>>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    vector: &'a [f32],
    top_k: usize,
    namespace: &'a str,
    include_metadata: bool,
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<VectorMatch>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatsResponse {
    #[serde(default)]
    namespaces: HashMap<String, NamespaceSummary>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NamespaceSummary {
    #[serde(default)]
    vector_count: usize,
}

/// Pinecone-compatible index client speaking the REST data-plane API.
pub struct PineconeStore {
    client: Client,
    index_host: String,
    api_key: String,
}

impl PineconeStore {
    pub fn new(config: &VectorStoreConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;

        Ok(Self {
            client,
            index_host: config.index_host.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }
}

#[async_trait]
impl VectorStore for PineconeStore {
    async fn query(
        &self,
        embedding: &[f32],
        namespace: &str,
        top_k: usize,
    ) -> Result<Vec<VectorMatch>> {
        let request = QueryRequest {
            vector: embedding,
            top_k,
            namespace,
            include_metadata: true,
        };

        let response = self
            .client
            .post(format!("{}/query", self.index_host))
            .header("Api-Key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| RagError::VectorStore(format!("index query failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(RagError::VectorStore(format!(
                "index returned {} for namespace '{}': {}",
                status, namespace, body
            )));
        }

        let parsed: QueryResponse = response
            .json()
            .await
            .map_err(|e| RagError::VectorStore(format!("malformed query response: {}", e)))?;

        Ok(parsed.matches)
    }

    async fn namespace_stats(&self) -> Result<HashMap<String, usize>> {
        let response = self
            .client
            .post(format!("{}/describe_index_stats", self.index_host))
            .header("Api-Key", &self.api_key)
            .json(&serde_json::json!({}))
            .send()
            .await
            .map_err(|e| RagError::VectorStore(format!("index stats call failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(RagError::VectorStore(format!(
                "index stats returned {}: {}",
                status, body
            )));
        }

        let parsed: StatsResponse = response
            .json()
            .await
            .map_err(|e| RagError::VectorStore(format!("malformed stats response: {}", e)))?;

        Ok(parsed
            .namespaces
            .into_iter()
            .map(|(name, summary)| (name, summary.vector_count))
            .collect())
    }
}
