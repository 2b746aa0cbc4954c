use async_stream::stream;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::error;

use crate::completion::CompletionClient;
use crate::config::RetrievalConfig;
use crate::prompt::PromptAssembler;
use crate::retrieval::{Passage, Retriever};
use crate::Result;

/// One event of a streamed answer. Exactly one `meta` opens the stream,
/// `token`s follow in emission order, and exactly one `done` or `error`
/// terminates it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamEvent {
    Meta { sources: Vec<SourceRef> },
    Token { value: String },
    Done { answer: String },
    Error { message: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceRef {
    pub snippet: String,
    pub metadata: HashMap<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub answer: String,
    pub sources: Vec<SourceRef>,
}

/// Collapses newlines to spaces and truncates to `max_len` display
/// characters, marking truncation with an ellipsis.
pub fn snippet(text: &str, max_len: usize) -> String {
    let flattened = text.replace('\n', " ").trim().to_string();
    if flattened.chars().count() <= max_len {
        return flattened;
    }
    let cut: String = flattened.chars().take(max_len.saturating_sub(3)).collect();
    format!("{}...", cut)
}

fn to_source_refs(passages: &[Passage], max_len: usize) -> Vec<SourceRef> {
    passages
        .iter()
        .map(|p| SourceRef {
            snippet: snippet(&p.text, max_len),
            metadata: p.metadata.clone(),
        })
        .collect()
}

/// Ties retrieval, prompt assembly, and completion together for both the
/// batched and streaming answer paths.
pub struct AnswerService {
    retriever: Arc<dyn Retriever>,
    completion: Arc<dyn CompletionClient>,
    assembler: PromptAssembler,
    config: RetrievalConfig,
}

impl AnswerService {
    pub fn new(
        retriever: Arc<dyn Retriever>,
        completion: Arc<dyn CompletionClient>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            retriever,
            completion,
            assembler: PromptAssembler,
            config,
        }
    }

    /// Batched mode: blocks until the full completion is back. No retry; any
    /// downstream failure propagates to the caller.
    pub async fn ask(&self, query: &str) -> Result<Answer> {
        let passages = self.retriever.retrieve(query, self.config.top_k).await?;
        let messages = self.assembler.assemble(query, &passages);
        let answer = self.completion.complete(&messages).await?;

        Ok(Answer {
            answer,
            sources: to_source_refs(&passages, self.config.snippet_max_len),
        })
    }

    /// Streaming mode. The `meta` event is emitted as soon as retrieval
    /// finishes, before the model call, so callers can render sources early.
    /// Dropping the returned stream stops all further work.
    pub fn ask_stream(&self, query: String) -> BoxStream<'static, StreamEvent> {
        let retriever = Arc::clone(&self.retriever);
        let completion = Arc::clone(&self.completion);
        let assembler = self.assembler.clone();
        let config = self.config.clone();

        let events = stream! {
            let passages = match retriever.retrieve(&query, config.top_k).await {
                Ok(passages) => passages,
                Err(e) => {
                    error!(error = %e, "retrieval failed during stream");
                    yield StreamEvent::Error {
                        message: e.to_string(),
                    };
                    return;
                }
            };

            yield StreamEvent::Meta {
                sources: to_source_refs(&passages, config.snippet_max_len),
            };

            let messages = assembler.assemble(&query, &passages);
            let mut tokens = match completion.complete_stream(&messages).await {
                Ok(tokens) => tokens,
                Err(e) => {
                    error!(error = %e, "failed to open completion stream");
                    yield StreamEvent::Error {
                        message: e.to_string(),
                    };
                    return;
                }
            };

            let mut answer = String::new();
            while let Some(fragment) = tokens.next().await {
                match fragment {
                    Ok(value) => {
                        answer.push_str(&value);
                        yield StreamEvent::Token { value };
                    }
                    Err(e) => {
                        error!(error = %e, "completion stream failed mid-flight");
                        yield StreamEvent::Error {
                            message: e.to_string(),
                        };
                        return;
                    }
                }
            }

            yield StreamEvent::Done { answer };
        };

        events.boxed()
    }
}
