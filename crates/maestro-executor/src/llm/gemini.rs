//! Google Gemini client. Gemini has no system role; the system prompt is
//! folded into the first user message, and "assistant" maps to "model".

use super::{ChatMessage, ChatResponse, ChatStream, LlmClient, Usage};
use async_trait::async_trait;
use futures_util::StreamExt;
use maestro_core::{MaestroError, MaestroResult};
use tokio::sync::mpsc;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Debug)]
pub struct GeminiClient {
    model: String,
    api_key: String,
    base_url: String,
    http: reqwest::Client,
}

impl GeminiClient {
    pub fn new(model: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            api_key: api_key.into(),
            base_url: GEMINI_BASE_URL.to_string(),
            http: reqwest::Client::new(),
        }
    }

    fn contents(messages: &[ChatMessage]) -> Vec<serde_json::Value> {
        let mut contents = Vec::new();
        let mut system_prompt = String::new();

        for msg in messages {
            if msg.role == "system" {
                system_prompt = msg.content.clone();
                continue;
            }

            let role = if msg.role == "assistant" {
                "model"
            } else {
                msg.role.as_str()
            };
            let mut content = msg.content.clone();
            if !system_prompt.is_empty() && role == "user" {
                content = format!("{system_prompt}\n\n{content}");
                system_prompt.clear();
            }

            contents.push(serde_json::json!({
                "role": role,
                "parts": [{"text": content}],
            }));
        }

        contents
    }

    fn request(&self, messages: &[ChatMessage], stream: bool) -> reqwest::RequestBuilder {
        let method = if stream {
            "streamGenerateContent?alt=sse"
        } else {
            "generateContent"
        };
        let body = serde_json::json!({ "contents": Self::contents(messages) });
        self.http
            .post(format!(
                "{}/models/{}:{method}",
                self.base_url, self.model
            ))
            .header("Content-Type", "application/json")
            .header("X-goog-api-key", &self.api_key)
            .json(&body)
    }
}

fn candidate_text(body: &serde_json::Value) -> Option<&str> {
    body["candidates"][0]["content"]["parts"][0]["text"].as_str()
}

#[async_trait]
impl LlmClient for GeminiClient {
    async fn chat(&self, messages: &[ChatMessage]) -> MaestroResult<ChatResponse> {
        let resp = self
            .request(messages, false)
            .send()
            .await
            .map_err(|e| MaestroError::Http(format!("Gemini API request failed: {e}")))?;

        let status = resp.status();
        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| MaestroError::Http(e.to_string()))?;
        if !status.is_success() {
            return Err(MaestroError::Http(format!(
                "Gemini API error {status}: {body}"
            )));
        }

        let content = candidate_text(&body)
            .ok_or_else(|| MaestroError::Http("no response from Gemini".to_string()))?
            .to_string();

        Ok(ChatResponse {
            content,
            finish_reason: body["candidates"][0]["finishReason"]
                .as_str()
                .unwrap_or("stop")
                .to_string(),
            usage: Usage::default(),
        })
    }

    async fn stream(&self, messages: &[ChatMessage]) -> MaestroResult<ChatStream> {
        let resp = self
            .request(messages, true)
            .send()
            .await
            .map_err(|e| MaestroError::Http(format!("Gemini API request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_else(|_| "unknown error".to_string());
            return Err(MaestroError::Http(format!(
                "Gemini API error {status}: {body}"
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

                    let Some(data) = line.strip_prefix("data: ") else {
                        continue;
                    };
                    let event: serde_json::Value = match serde_json::from_str(data) {
                        Ok(v) => v,
                        Err(_) => continue,
                    };
                    if let Some(text) = candidate_text(&event) {
                        if !text.is_empty() {
                            full_text.push_str(text);
                            let _ = tx.send(text.to_string()).await;
                        }
                    }
                }
            }

            Ok(full_text)
        });

        Ok((rx, handle))
    }

    fn name(&self) -> String {
        format!("gemini:{}", self.model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_prompt_folds_into_first_user_message() {
        let contents = GeminiClient::contents(&[
            ChatMessage::system("Be terse."),
            ChatMessage::user("hi"),
            ChatMessage {
                role: "assistant".to_string(),
                content: "hello".to_string(),
            },
            ChatMessage::user("again"),
        ]);

        assert_eq!(contents.len(), 3);
        assert_eq!(contents[0]["role"], "user");
        assert_eq!(contents[0]["parts"][0]["text"], "Be terse.\n\nhi");
        assert_eq!(contents[1]["role"], "model");
        assert_eq!(contents[2]["parts"][0]["text"], "again");
    }
}
