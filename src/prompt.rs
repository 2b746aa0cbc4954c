use serde::{Deserialize, Serialize};

use crate::retrieval::Passage;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

const SYSTEM_PREAMBLE: &str = "You are an assistant answering questions about regulatory \
documents. Answer based solely on the provided context. If the context does not contain \
the answer, say so instead of guessing.";

/// Formats retrieved passages and the question into a system/user message
/// pair. Performs no token-budget truncation: an oversize context fails at
/// the completion call and surfaces as that call's error.
#[derive(Debug, Clone, Default)]
pub struct PromptAssembler;

impl PromptAssembler {
    /// Concatenates passage texts separated by blank lines.
    pub fn build_context(&self, passages: &[Passage]) -> String {
        passages
            .iter()
            .map(|p| p.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    pub fn assemble(&self, query: &str, passages: &[Passage]) -> Vec<ChatMessage> {
        let context = self.build_context(passages);
        let body = format!("Context:\n{}\n\nQuestion: {}", context, query);
        vec![ChatMessage::system(SYSTEM_PREAMBLE), ChatMessage::user(body)]
    }
}
