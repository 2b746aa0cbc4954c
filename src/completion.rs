use async_stream::stream;
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

use crate::config::CompletionConfig;
use crate::prompt::ChatMessage;
use crate::{RagError, Result};

/// Incremental text fragments from a streamed completion. Items arrive in
/// receipt order; an `Err` item ends the stream.
pub type TokenStream = BoxStream<'static, Result<String>>;

#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Blocks until the full completion is available.
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String>;

    /// Opens an incremental completion. Connection-time failures are returned
    /// directly; mid-stream failures arrive as `Err` items.
    async fn complete_stream(&self, messages: &[ChatMessage]) -> Result<TokenStream>;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    stream: bool,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Deserialize)]
struct ChunkChoice {
    delta: ChunkDelta,
}

#[derive(Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

/// OpenAI-compatible chat completion client.
pub struct OpenAiCompletion {
    client: Client,
    api_base: String,
    api_key: String,
    model: String,
    temperature: f32,
}

impl OpenAiCompletion {
    pub fn new(config: &CompletionConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
        })
    }

    async fn send(&self, messages: &[ChatMessage], streaming: bool) -> Result<reqwest::Response> {
        let request = ChatRequest {
            model: &self.model,
            messages,
            temperature: self.temperature,
            stream: streaming,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.api_base))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| RagError::Completion(format!("completion API call failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(RagError::Completion(format!(
                "completion API returned {}: {}",
                status, body
            )));
        }

        Ok(response)
    }
}

#[async_trait]
impl CompletionClient for OpenAiCompletion {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let response = self.send(messages, false).await?;

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| RagError::Completion(format!("malformed completion response: {}", e)))?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| RagError::Completion("completion API returned no choices".to_string()))
    }

    async fn complete_stream(&self, messages: &[ChatMessage]) -> Result<TokenStream> {
        let response = self.send(messages, true).await?;
        let mut bytes = response.bytes_stream();

        let tokens = stream! {
            let mut buffer = String::new();
            'receive: while let Some(chunk) = bytes.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        yield Err(RagError::Completion(format!(
                            "completion stream aborted: {}",
                            e
                        )));
                        break 'receive;
                    }
                };
                buffer.push_str(&String::from_utf8_lossy(&chunk));

                while let Some(newline) = buffer.find('\n') {
                    let line = buffer[..newline].trim().to_string();
                    buffer.drain(..=newline);

                    let Some(data) = line.strip_prefix("data:") else {
                        continue;
                    };
                    let data = data.trim();
                    if data == "[DONE]" {
                        break 'receive;
                    }

                    match serde_json::from_str::<ChatChunk>(data) {
                        Ok(parsed) => {
                            let fragment = parsed
                                .choices
                                .into_iter()
                                .next()
                                .and_then(|c| c.delta.content);
                            if let Some(fragment) = fragment.filter(|f| !f.is_empty()) {
                                yield Ok(fragment);
                            }
                        }
                        Err(e) => {
                            // Skip unparseable frames rather than killing the
                            // stream; transport errors above still terminate.
                            warn!(error = %e, "skipping malformed completion chunk");
                        }
                    }
                }
            }
        };

        Ok(tokens.boxed())
    }
}
