use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{info, warn};

use crate::embedding::EmbeddingClient;
use crate::vectorstore::VectorStore;
use crate::{RagError, Result};

/// Broad probes used to sample namespace contents. Retrieval is
/// relevance-based, so absence of a file here does not prove it was never
/// ingested; an empty namespace is still a hard failure.
const PROBE_QUERIES: &[&str] = &[
    "overview of the regulation",
    "contract measurement approach",
    "definitions and scope",
    "reporting requirements",
];

const PROBE_TOP_K: usize = 25;

#[derive(Debug)]
pub struct NamespaceAudit {
    pub name: String,
    pub vector_count: usize,
    pub observed_sources: BTreeSet<String>,
}

#[derive(Debug)]
pub struct AuditReport {
    pub namespaces: Vec<NamespaceAudit>,
    pub missing: Vec<String>,
}

impl AuditReport {
    pub fn is_healthy(&self) -> bool {
        self.missing.is_empty() && self.namespaces.iter().all(|ns| ns.vector_count > 0)
    }
}

/// Samples every configured namespace with probe queries and cross-checks
/// index statistics. A misconfigured index or absent credentials surfaces as
/// an error here and becomes a non-zero process exit.
pub async fn run_audit(
    namespaces: &[String],
    embedding: Arc<dyn EmbeddingClient>,
    store: Arc<dyn VectorStore>,
) -> Result<AuditReport> {
    if namespaces.is_empty() {
        return Err(RagError::Config(
            "no namespaces configured to audit".to_string(),
        ));
    }

    let stats = store.namespace_stats().await?;

    let mut probes: Vec<Vec<f32>> = Vec::with_capacity(PROBE_QUERIES.len());
    for query in PROBE_QUERIES {
        probes.push(embedding.embed_query(query).await?);
    }

    let mut report = AuditReport {
        namespaces: Vec::new(),
        missing: Vec::new(),
    };

    for namespace in namespaces {
        let Some(&vector_count) = stats.get(namespace) else {
            warn!(namespace = %namespace, "namespace absent from index stats");
            report.missing.push(namespace.clone());
            continue;
        };

        let mut observed_sources = BTreeSet::new();
        for vector in &probes {
            let matches = store.query(vector, namespace, PROBE_TOP_K).await?;
            for m in matches {
                let source = m
                    .metadata
                    .get("source")
                    .or_else(|| m.metadata.get("file_name"))
                    .and_then(serde_json::Value::as_str);
                if let Some(source) = source {
                    observed_sources.insert(source.to_string());
                }
            }
        }

        info!(
            namespace = %namespace,
            vector_count,
            sources = observed_sources.len(),
            "namespace audited"
        );

        report.namespaces.push(NamespaceAudit {
            name: namespace.clone(),
            vector_count,
            observed_sources,
        });
    }

    Ok(report)
}
