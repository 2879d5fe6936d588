//! OpenAI chat-completions client, also used for every OpenAI-compatible
//! endpoint (Groq, Together, DeepSeek, OpenRouter, custom base URLs).

use super::{ChatMessage, ChatResponse, ChatStream, LlmClient, Usage};
use async_trait::async_trait;
use futures_util::StreamExt;
use maestro_core::{MaestroError, MaestroResult};
use tokio::sync::mpsc;

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Debug)]
pub struct OpenAiClient {
    model: String,
    api_key: String,
    base_url: String,
    http: reqwest::Client,
}

impl OpenAiClient {
    pub fn new(model: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self::compatible(model, api_key, OPENAI_BASE_URL)
    }

    /// Client for any endpoint speaking the OpenAI chat-completions API.
    pub fn compatible(
        model: impl Into<String>,
        api_key: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        let base_url = base_url.into();
        Self {
            model: model.into(),
            api_key: api_key.into(),
            base_url: if base_url.is_empty() {
                OPENAI_BASE_URL.to_string()
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
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn chat(&self, messages: &[ChatMessage]) -> MaestroResult<ChatResponse> {
        let resp = self
            .request(messages, false)
            .send()
            .await
            .map_err(|e| MaestroError::Http(e.to_string()))?;

        let status = resp.status();
        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| MaestroError::Http(e.to_string()))?;
        if !status.is_success() {
            return Err(MaestroError::Http(format!(
                "OpenAI API error {status}: {body}"
            )));
        }

        let choice = &body["choices"][0];
        let content = choice["message"]["content"]
            .as_str()
            .ok_or_else(|| MaestroError::Http("no response from OpenAI".to_string()))?
            .to_string();

        Ok(ChatResponse {
            content,
            finish_reason: choice["finish_reason"].as_str().unwrap_or("stop").to_string(),
            usage: Usage {
                prompt_tokens: body["usage"]["prompt_tokens"].as_u64().unwrap_or(0),
                completion_tokens: body["usage"]["completion_tokens"].as_u64().unwrap_or(0),
                total_tokens: body["usage"]["total_tokens"].as_u64().unwrap_or(0),
            },
        })
    }

    async fn stream(&self, messages: &[ChatMessage]) -> MaestroResult<ChatStream> {
        let resp = self
            .request(messages, true)
            .send()
            .await
            .map_err(|e| MaestroError::Http(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_else(|_| "unknown error".to_string());
            return Err(MaestroError::Http(format!(
                "OpenAI API error {status}: {body}"
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

                    if line.is_empty() || line.starts_with(':') {
                        continue;
                    }
                    let Some(data) = line.strip_prefix("data: ") else {
                        continue;
                    };
                    if data == "[DONE]" {
                        continue;
                    }
                    let event: serde_json::Value = match serde_json::from_str(data) {
                        Ok(v) => v,
                        Err(_) => continue,
                    };
                    if let Some(content) = event["choices"][0]["delta"]["content"].as_str() {
                        if !content.is_empty() {
                            full_text.push_str(content);
                            let _ = tx.send(content.to_string()).await;
                        }
                    }
                }
            }

            Ok(full_text)
        });

        Ok((rx, handle))
    }

    fn name(&self) -> String {
        format!("openai:{}", self.model)
    }
}
