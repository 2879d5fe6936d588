//! Client for a local Ollama endpoint. No API key; responses stream as
//! NDJSON rather than SSE.

use super::{ChatMessage, ChatResponse, ChatStream, LlmClient, Usage};
use async_trait::async_trait;
use futures_util::StreamExt;
use maestro_core::{MaestroError, MaestroResult};
use tokio::sync::mpsc;

pub const OLLAMA_BASE_URL: &str = "http://localhost:11434";

#[derive(Debug)]
pub struct OllamaClient {
    model: String,
    base_url: String,
    http: reqwest::Client,
}

impl OllamaClient {
    pub fn new(model: impl Into<String>, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            model: model.into(),
            base_url: if base_url.is_empty() {
                OLLAMA_BASE_URL.to_string()
            } else {
                base_url
            },
            http: reqwest::Client::new(),
        }
    }

    fn request(&self, messages: &[ChatMessage], stream: bool) -> reqwest::RequestBuilder {
        let body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "stream": stream,
        });
        self.http
            .post(format!("{}/api/chat", self.base_url))
            .header("Content-Type", "application/json")
            .json(&body)
    }
}

#[async_trait]
impl LlmClient for OllamaClient {
    async fn chat(&self, messages: &[ChatMessage]) -> MaestroResult<ChatResponse> {
        let resp = self.request(messages, false).send().await.map_err(|e| {
            MaestroError::Http(format!("Ollama connection failed (is Ollama running?): {e}"))
        })?;

        let status = resp.status();
        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| MaestroError::Http(e.to_string()))?;
        if !status.is_success() {
            return Err(MaestroError::Http(format!(
                "Ollama API error {status}: {body}"
            )));
        }

        Ok(ChatResponse {
            content: body["message"]["content"].as_str().unwrap_or_default().to_string(),
            finish_reason: "stop".to_string(),
            usage: Usage::default(),
        })
    }

    async fn stream(&self, messages: &[ChatMessage]) -> MaestroResult<ChatStream> {
        let resp = self.request(messages, true).send().await.map_err(|e| {
            MaestroError::Http(format!("Ollama connection failed (is Ollama running?): {e}"))
        })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_else(|_| "unknown error".to_string());
            return Err(MaestroError::Http(format!(
                "Ollama API error {status}: {body}"
            )));
        }

        let (tx, rx) = mpsc::channel::<String>(256);
        let mut byte_stream = resp.bytes_stream();

        let handle = tokio::spawn(async move {
            let mut buffer = String::new();
            let mut full_text = String::new();

            while let Some(chunk) = byte_stream.next().await {
                let chunk = chunk.map_err(|e| MaestroError::Http(e.to_string()))?;
                buffer.push_str(&String::from_utf8_lossy(&chunk));

                while let Some(line_end) = buffer.find('\n') {
                    let line = buffer[..line_end].trim().to_string();
                    buffer = buffer[line_end + 1..].to_string();
                    if line.is_empty() {
                        continue;
                    }

                    let event: serde_json::Value = match serde_json::from_str(&line) {
                        Ok(v) => v,
                        Err(_) => continue,
                    };
                    if let Some(content) = event["message"]["content"].as_str() {
                        if !content.is_empty() {
                            full_text.push_str(content);
                            let _ = tx.send(content.to_string()).await;
                        }
                    }
                    if event["done"].as_bool() == Some(true) {
                        return Ok(full_text);
                    }
                }
            }

            Ok(full_text)
        });

        Ok((rx, handle))
    }

    fn name(&self) -> String {
        format!("ollama:{}", self.model)
    }
}
