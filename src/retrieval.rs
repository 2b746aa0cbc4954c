use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::RetrievalConfig;
use crate::embedding::EmbeddingClient;
use crate::vectorstore::{VectorMatch, VectorStore};
use crate::Result;

/// One retrieved chunk of source text plus its provenance. Ephemeral,
/// per-request only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Passage {
    pub text: String,
    pub source: String,
    pub namespace: String,
    pub score: f32,
    pub metadata: HashMap<String, Value>,
}

impl Passage {
    fn from_match(m: VectorMatch, namespace: &str) -> Self {
        let text = m
            .metadata
            .get("text")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let source = m
            .metadata
            .get("source")
            .or_else(|| m.metadata.get("file_name"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        Self {
            text,
            source,
            namespace: namespace.to_string(),
            score: m.score,
            metadata: m.metadata,
        }
    }
}

#[async_trait]
pub trait Retriever: Send + Sync {
    async fn retrieve(&self, query: &str, k_total: usize) -> Result<Vec<Passage>>;
}

/// Splits a total result budget across `n` namespaces: floor share each, the
/// remainder going to the earliest-listed namespaces, never less than 1 per
/// namespace. Sums to `k_total` when `k_total >= n`, to `n` otherwise.
pub fn split_budget(k_total: usize, n: usize) -> Vec<usize> {
    if n == 0 {
        return Vec::new();
    }
    let base = k_total / n;
    let remainder = k_total % n;
    (0..n)
        .map(|i| {
            let quota = base + usize::from(i < remainder);
            quota.max(1)
        })
        .collect()
}

/// Drops later passages sharing a (text-prefix, source) key with an earlier
/// one. The prefix is measured in characters so multi-byte text never splits
/// a codepoint. First occurrence wins; input order is preserved.
pub fn dedupe_passages(passages: Vec<Passage>, prefix_len: usize) -> Vec<Passage> {
    let mut seen: HashSet<(String, String)> = HashSet::new();
    let mut kept = Vec::with_capacity(passages.len());

    for passage in passages {
        let prefix: String = passage.text.chars().take(prefix_len).collect();
        if seen.insert((prefix, passage.source.clone())) {
            kept.push(passage);
        }
    }

    kept
}

/// Fans a query out across the configured namespaces, one store call per
/// namespace in list order, and merges the deduplicated results.
pub struct FanOutRetriever {
    embedding: Arc<dyn EmbeddingClient>,
    store: Arc<dyn VectorStore>,
    namespaces: Vec<String>,
    config: RetrievalConfig,
}

impl FanOutRetriever {
    pub fn new(
        embedding: Arc<dyn EmbeddingClient>,
        store: Arc<dyn VectorStore>,
        namespaces: Vec<String>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            embedding,
            store,
            namespaces,
            config,
        }
    }
}

#[async_trait]
impl Retriever for FanOutRetriever {
    async fn retrieve(&self, query: &str, k_total: usize) -> Result<Vec<Passage>> {
        // An embedding failure is a total retrieval failure; per-namespace
        // query failures below are recovered as empty result sets.
        let embedding = self.embedding.embed_query(query).await?;

        let quotas = split_budget(k_total, self.namespaces.len());
        let mut merged: Vec<Passage> = Vec::new();

        for (namespace, quota) in self.namespaces.iter().zip(quotas) {
            match self.store.query(&embedding, namespace, quota).await {
                Ok(matches) => {
                    debug!(
                        namespace = %namespace,
                        quota,
                        returned = matches.len(),
                        "namespace query complete"
                    );
                    merged.extend(
                        matches
                            .into_iter()
                            .map(|m| Passage::from_match(m, namespace)),
                    );
                }
                Err(e) => {
                    warn!(namespace = %namespace, error = %e, "namespace query failed, skipping");
                }
            }
        }

        Ok(dedupe_passages(merged, self.config.dedupe_prefix_len))
    }
}
