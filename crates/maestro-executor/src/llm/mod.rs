//! In-process LLM clients used when no external runner is configured.
//!
//! Every provider implements [`LlmClient`]; streaming follows the
//! channel-plus-join-handle shape so callers can forward chunks as they
//! arrive and still get the aggregated text at the end. Clients are
//! stateless over HTTP and safe to share across tasks.

pub mod gemini;
pub mod ollama;
pub mod openai;

pub use gemini::GeminiClient;
pub use ollama::OllamaClient;
pub use openai::OpenAiClient;

use async_trait::async_trait;
use maestro_core::MaestroResult;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

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

#[derive(Debug, Clone, Default)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub content: String,
    pub finish_reason: String,
    pub usage: Usage,
}

/// Receiver of text chunks plus the handle resolving to the full text.
pub type ChatStream = (mpsc::Receiver<String>, JoinHandle<MaestroResult<String>>);

#[async_trait]
pub trait LlmClient: Send + Sync + std::fmt::Debug {
    async fn chat(&self, messages: &[ChatMessage]) -> MaestroResult<ChatResponse>;
    /// Start a streaming completion. Chunks arrive on the receiver in
    /// generation order; the join handle yields the accumulated text.
    async fn stream(&self, messages: &[ChatMessage]) -> MaestroResult<ChatStream>;
    fn name(&self) -> String;
}
