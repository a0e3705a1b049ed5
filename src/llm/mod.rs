//! Provider boundary for classification and generation calls
//!
//! The pipeline treats the model provider as an opaque request/response
//! boundary: given a prompt (and, for classification, a JSON schema), it
//! returns text or structured output, and it may fail or time out. One trait
//! with two calls keeps the extractor and the chat boundary trivially
//! substitutable with a deterministic stub in tests.

use crate::config::LlmConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Provider failure; the caller decides how it maps into its own taxonomy
#[derive(Debug, Error)]
#[error("provider: {0}")]
pub struct ProviderError(pub String);

/// One chat turn sent to the provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// The classification/generation seam injected into the extractor and the
/// live chat boundary
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Structured classification: the provider must answer with JSON
    /// matching `schema`. Validation of the fields happens downstream.
    async fn classify(
        &self,
        prompt: &str,
        schema: &serde_json::Value,
    ) -> Result<serde_json::Value, ProviderError>;

    /// Free-form chat completion under a system prompt
    async fn generate(
        &self,
        system: &str,
        messages: &[ChatMessage],
    ) -> Result<String, ProviderError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// HTTP implementation (OpenAI-compatible chat completions)
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: String,
}

/// Provider client speaking the OpenAI-compatible `/chat/completions` shape
/// (works against Ollama and hosted endpoints alike)
pub struct HttpLanguageModel {
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    client: reqwest::Client,
}

impl HttpLanguageModel {
    pub fn new(config: &LlmConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            client,
        })
    }

    async fn chat_completion(
        &self,
        messages: Vec<ChatMessage>,
        temperature: f32,
    ) -> Result<String, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);

        let request = ChatCompletionRequest {
            model: self.model.clone(),
            messages,
            temperature: Some(temperature),
            max_tokens: Some(self.max_tokens),
        };

        let mut req = self.client.post(&url).json(&request);

        // Bearer header only when configured (local providers need none)
        if !self.api_key.is_empty() {
            req = req.header("Authorization", format!("Bearer {}", self.api_key));
        }

        let response = req
            .send()
            .await
            .map_err(|e| ProviderError(format!("request failed: {e}")))?;

        // Surface the response body on HTTP errors; provider error payloads
        // are the only useful debugging signal
        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unable to read body".to_string());
            return Err(ProviderError(format!("HTTP {status}: {body}")));
        }

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| ProviderError(format!("unparseable response: {e}")))?;

        completion
            .choices
            .first()
            .map(|c| c.message.content.clone())
            .ok_or_else(|| ProviderError("no choices in response".to_string()))
    }
}

#[async_trait]
impl LanguageModel for HttpLanguageModel {
    async fn classify(
        &self,
        prompt: &str,
        schema: &serde_json::Value,
    ) -> Result<serde_json::Value, ProviderError> {
        let system = format!(
            "You are a behavioral analysis system. You MUST answer with valid JSON \
             matching this schema and nothing else. No markdown, no explanation.\n\n{schema}"
        );
        let messages = vec![
            ChatMessage {
                role: "system".to_string(),
                content: system,
            },
            ChatMessage::user(prompt),
        ];

        // Temperature 0 for reproducible classification
        let raw = self.chat_completion(messages, 0.0).await?;
        let text = extract_json(&raw);

        if text.trim().is_empty() {
            return Err(ProviderError("empty classification response".to_string()));
        }

        serde_json::from_str(text)
            .map_err(|e| ProviderError(format!("invalid JSON from provider: {e}")))
    }

    async fn generate(
        &self,
        system: &str,
        messages: &[ChatMessage],
    ) -> Result<String, ProviderError> {
        let mut wire = Vec::with_capacity(messages.len() + 1);
        wire.push(ChatMessage {
            role: "system".to_string(),
            content: system.to_string(),
        });
        wire.extend_from_slice(messages);

        self.chat_completion(wire, 0.7).await
    }
}

/// Pull a JSON document out of a possibly fenced or chatty completion.
///
/// Models frequently wrap JSON in markdown fences or prepend prose despite
/// instructions; tolerate both before giving up.
fn extract_json(response: &str) -> &str {
    let trimmed = response.trim();

    // ```json ... ``` fences
    if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        let after = after.strip_prefix("json").unwrap_or(after);
        if let Some(end) = after.find("```") {
            return after[..end].trim();
        }
    }

    // First bracketed document, object or array
    let object = trimmed
        .find('{')
        .and_then(|s| trimmed.rfind('}').map(|e| (s, e)));
    let array = trimmed
        .find('[')
        .and_then(|s| trimmed.rfind(']').map(|e| (s, e)));
    let candidate = match (object, array) {
        (Some(o), Some(a)) => Some(if a.0 < o.0 { a } else { o }),
        (Some(o), None) => Some(o),
        (None, Some(a)) => Some(a),
        (None, None) => None,
    };
    if let Some((start, end)) = candidate {
        if start < end {
            return &trimmed[start..=end];
        }
    }

    trimmed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_plain_json() {
        assert_eq!(extract_json(r#"{"a":1}"#), r#"{"a":1}"#);
    }

    #[test]
    fn strips_markdown_fences() {
        let fenced = "```json\n[{\"dimension\": \"Patience\"}]\n```";
        assert_eq!(extract_json(fenced), "[{\"dimension\": \"Patience\"}]");
    }

    #[test]
    fn pulls_array_out_of_prose() {
        let chatty = "Here are the scores:\n[1, 2, 3]\nHope that helps!";
        assert_eq!(extract_json(chatty), "[1, 2, 3]");
    }

    #[test]
    fn passes_through_non_json() {
        assert_eq!(extract_json("  nothing here  "), "nothing here");
    }
}
