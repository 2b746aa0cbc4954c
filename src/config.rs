use serde::{Deserialize, Serialize};

use crate::{RagError, Result};

/// Process-wide configuration, read once at startup and passed explicitly
/// into each component. No module-level state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagConfig {
    pub server: ServerConfig,
    pub embedding: EmbeddingConfig,
    pub vector_store: VectorStoreConfig,
    pub completion: CompletionConfig,
    pub retrieval: RetrievalConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub allowed_origins: Vec<String>,
    /// When set, `/ask` and `/ask-stream` require a matching X-API-KEY header.
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub api_base: String,
    pub api_key: String,
    pub model: String,
    pub dimension: usize,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorStoreConfig {
    /// Index endpoint, e.g. https://my-index-abc123.svc.us-east1.pinecone.io
    pub index_host: String,
    pub api_key: String,
    /// Ordered namespace list; order decides dedup tie-breaks.
    pub namespaces: Vec<String>,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionConfig {
    pub api_base: String,
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Total result budget split across namespaces.
    pub top_k: usize,
    /// Character prefix length used as the dedup key.
    pub dedupe_prefix_len: usize,
    /// Display truncation applied to source snippets.
    pub snippet_max_len: usize,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
                allowed_origins: vec![
                    "http://localhost:3000".to_string(),
                    "http://127.0.0.1:3000".to_string(),
                ],
                api_key: None,
            },
            embedding: EmbeddingConfig {
                api_base: "https://api.openai.com/v1".to_string(),
                api_key: String::new(),
                model: "text-embedding-3-large".to_string(),
                dimension: 3072,
                timeout_ms: 15_000,
            },
            vector_store: VectorStoreConfig {
                index_host: "http://localhost:5080".to_string(),
                api_key: String::new(),
                namespaces: vec!["default".to_string()],
                timeout_ms: 10_000,
            },
            completion: CompletionConfig {
                api_base: "https://api.openai.com/v1".to_string(),
                api_key: String::new(),
                model: "gpt-4o-mini".to_string(),
                temperature: 0.0,
                timeout_ms: 60_000,
            },
            retrieval: RetrievalConfig {
                top_k: 8,
                dedupe_prefix_len: 120,
                snippet_max_len: 300,
            },
        }
    }
}

impl RagConfig {
    /// Builds and validates the configuration from the process environment.
    /// Fails fast on missing credentials or an empty namespace list.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let openai_key = required("OPENAI_API_KEY")?;
        let openai_base = optional("OPENAI_API_BASE").unwrap_or(defaults.embedding.api_base);

        let config = Self {
            server: ServerConfig {
                host: optional("HOST").unwrap_or(defaults.server.host),
                port: parse_var("PORT", defaults.server.port)?,
                allowed_origins: optional("ALLOWED_ORIGINS")
                    .map(|raw| parse_list(&raw))
                    .unwrap_or(defaults.server.allowed_origins),
                api_key: optional("BACKEND_API_KEY"),
            },
            embedding: EmbeddingConfig {
                api_base: openai_base.clone(),
                api_key: openai_key.clone(),
                model: optional("EMBEDDING_MODEL").unwrap_or(defaults.embedding.model),
                dimension: parse_var("EMBEDDING_DIMENSION", defaults.embedding.dimension)?,
                timeout_ms: parse_var("EMBEDDING_TIMEOUT_MS", defaults.embedding.timeout_ms)?,
            },
            vector_store: VectorStoreConfig {
                index_host: required("PINECONE_INDEX_HOST")?,
                api_key: required("PINECONE_API_KEY")?,
                namespaces: parse_list(&required("PINECONE_NAMESPACES")?),
                timeout_ms: parse_var("VECTOR_STORE_TIMEOUT_MS", defaults.vector_store.timeout_ms)?,
            },
            completion: CompletionConfig {
                api_base: openai_base,
                api_key: openai_key,
                model: optional("COMPLETION_MODEL").unwrap_or(defaults.completion.model),
                temperature: parse_var("COMPLETION_TEMPERATURE", defaults.completion.temperature)?,
                timeout_ms: parse_var("COMPLETION_TIMEOUT_MS", defaults.completion.timeout_ms)?,
            },
            retrieval: RetrievalConfig {
                top_k: parse_var("RETRIEVAL_TOP_K", defaults.retrieval.top_k)?,
                dedupe_prefix_len: defaults.retrieval.dedupe_prefix_len,
                snippet_max_len: defaults.retrieval.snippet_max_len,
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.vector_store.namespaces.is_empty() {
            return Err(RagError::Config(
                "at least one vector store namespace must be configured".to_string(),
            ));
        }
        if self.retrieval.top_k == 0 {
            return Err(RagError::Config(
                "retrieval top_k must be at least 1".to_string(),
            ));
        }
        if self.retrieval.dedupe_prefix_len == 0 {
            return Err(RagError::Config(
                "dedupe prefix length must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn required(name: &str) -> Result<String> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| RagError::Config(format!("missing required environment variable {}", name)))
}

fn optional(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T> {
    match optional(name) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| RagError::Config(format!("invalid value for {}: {}", name, raw))),
        None => Ok(default),
    }
}

/// Splits a comma-separated list, trimming blanks and dropping empties.
pub fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
