//! Client for OpenAI-protocol `/chat/completions` endpoints.
//!
//! Covers DeepSeek, Qwen, OpenRouter-fronted models and self-hosted vLLM
//! gateways: they all speak the same wire format and differ only in
//! `base_url` and `model`.

use crate::config::{CredentialPatch, RemoteLlmConfig};
use crate::error::{LlmError, Result};
use crate::{ChatStream, LlmClient, Message, Role};
use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::RwLock;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tooling::async_utils::retry::{with_retry, RetryPolicy};

/// Chat client for any OpenAI-protocol-compatible provider.
pub struct OpenAiCompatibleClient {
    config: Arc<RwLock<RemoteLlmConfig>>,
    http: Client,
    retry_policy: RetryPolicy,
}

impl OpenAiCompatibleClient {
    /// Create a new client with the given configuration.
    pub fn new(config: RemoteLlmConfig) -> Self {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .expect("failed to build HTTP client");

        let retry_policy = RetryPolicy::new((config.max_retries as usize).max(1));
        Self { config: Arc::new(RwLock::new(config)), http, retry_policy }
    }

    /// Current configuration snapshot, for composing clients (e.g.
    /// [`super::long_context::LongContextClient`]) that need the base URL
    /// and API key for a side-channel request.
    pub fn current_config(&self) -> RemoteLlmConfig {
        self.config.read().clone()
    }

    /// Shared HTTP client, for composing clients that issue their own requests.
    pub fn http_client(&self) -> &Client {
        &self.http
    }

    fn to_wire_messages(&self, messages: &[Message], system_prompt: Option<&str>) -> Vec<OpenAiMessage> {
        let mut wire = Vec::with_capacity(messages.len() + 1);
        if let Some(system) = system_prompt {
            wire.push(OpenAiMessage { role: "system".to_string(), content: WireContent::Text(system.to_string()) });
        }
        wire.extend(messages.iter().map(convert_message));
        wire
    }

    fn build_request(
        &self,
        config: &RemoteLlmConfig,
        messages: &[Message],
        system_prompt: Option<&str>,
        json_mode: bool,
        stream: bool,
    ) -> OpenAiRequest {
        OpenAiRequest {
            model: config.model.clone(),
            messages: self.to_wire_messages(messages, system_prompt),
            response_format: json_mode.then(|| ResponseFormat { format_type: "json_object".to_string() }),
            stream,
        }
    }

    async fn send(&self, req_body: &OpenAiRequest, config: &RemoteLlmConfig) -> Result<reqwest::Response> {
        let url = format!("{}/chat/completions", config.base_url.trim_end_matches('/'));
        let response = self
            .http
            .post(&url)
            .header("Authorization", format!("Bearer {}", config.api_key))
            .json(req_body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(match status.as_u16() {
                401 => LlmError::AuthenticationError(error_text),
                429 => LlmError::RateLimitExceeded(error_text),
                _ => LlmError::ProviderError(format!("{} error {}: {}", config.base_url, status, error_text)),
            });
        }

        Ok(response)
    }

    /// Retries connection errors, timeouts, and 429/5xx responses with
    /// backoff. This covers network flake, not syntax-invalid diagram
    /// output — that retry budget belongs to the validate-revise loop, not
    /// here, so the two counters are never conflated.
    async fn send_with_retry(&self, req_body: &OpenAiRequest, config: &RemoteLlmConfig) -> Result<reqwest::Response> {
        with_retry(&self.retry_policy, || self.send(req_body, config)).await
    }
}

#[async_trait]
impl LlmClient for OpenAiCompatibleClient {
    async fn chat(&self, messages: &[Message], system_prompt: Option<&str>, json_mode: bool) -> Result<String> {
        let config = self.current_config();
        let req_body = self.build_request(&config, messages, system_prompt, json_mode, false);
        let response = self.send_with_retry(&req_body, &config).await?;

        let parsed: OpenAiResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::InvalidResponse("provider returned no choices".to_string()))?;

        Ok(choice.message.content.unwrap_or_default())
    }

    async fn chat_stream(
        &self,
        messages: &[Message],
        system_prompt: Option<&str>,
        json_mode: bool,
    ) -> Result<ChatStream> {
        let config = self.current_config();
        let req_body = self.build_request(&config, messages, system_prompt, json_mode, true);
        let response = self.send(&req_body, &config).await?;

        let byte_stream = response.bytes_stream();
        let stream = byte_stream.filter_map(|chunk| async move {
            let chunk = match chunk {
                Ok(c) => c,
                Err(e) => return Some(Err(LlmError::HttpError(e))),
            };
            let text = String::from_utf8_lossy(&chunk);
            for line in text.lines() {
                let Some(data) = line.strip_prefix("data: ") else { continue };
                if data == "[DONE]" {
                    return None;
                }
                if let Ok(event) = serde_json::from_str::<OpenAiStreamChunk>(data) {
                    if let Some(delta) = event.choices.into_iter().next().and_then(|c| c.delta.content) {
                        return Some(Ok(delta));
                    }
                }
            }
            None
        });

        Ok(Box::pin(stream))
    }

    fn update_config(&self, update: CredentialPatch) {
        self.config.write().apply_patch(&update);
    }

    fn model_name(&self) -> String {
        self.config.read().model.clone()
    }
}

fn convert_message(message: &Message) -> OpenAiMessage {
    let role = match message.role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
    }
    .to_string();

    let content = if message.images.is_empty() {
        WireContent::Text(message.content.clone())
    } else {
        // Image parts first, then the text instruction — matches the
        // vision-request shape of `image_url` multimodal turns.
        let mut parts: Vec<ContentPart> = message
            .images
            .iter()
            .map(|url| ContentPart::ImageUrl { image_url: ImageUrl { url: url.clone() } })
            .collect();
        if !message.content.is_empty() {
            parts.push(ContentPart::Text { text: message.content.clone() });
        }
        WireContent::Parts(parts)
    };

    OpenAiMessage { role, content }
}

#[derive(Debug, Serialize)]
struct OpenAiRequest {
    model: String,
    messages: Vec<OpenAiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiMessage {
    role: String,
    content: WireContent,
}

/// A message's content: either plain text, or a multimodal content-parts
/// array (used when a turn carries one or more images).
#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum WireContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize, Deserialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamChunk {
    choices: Vec<OpenAiStreamChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamChoice {
    delta: OpenAiStreamDelta,
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamDelta {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let config = RemoteLlmConfig::new("test-key", "https://api.deepseek.com", "deepseek-chat");
        let _client = OpenAiCompatibleClient::new(config);
    }

    #[test]
    fn test_message_conversion() {
        let msg = Message::human("Hello");
        let converted = convert_message(&msg);
        assert_eq!(converted.role, "user");
        assert!(matches!(converted.content, WireContent::Text(ref t) if t == "Hello"));
    }

    #[test]
    fn test_message_with_image_converts_to_content_parts() {
        let msg = Message::human_with_images("describe this", vec!["data:image/png;base64,abc".to_string()]);
        let converted = convert_message(&msg);

        match converted.content {
            WireContent::Parts(parts) => {
                assert_eq!(parts.len(), 2);
                assert!(matches!(&parts[0], ContentPart::ImageUrl { image_url } if image_url.url == "data:image/png;base64,abc"));
                assert!(matches!(&parts[1], ContentPart::Text { text } if text == "describe this"));
            }
            WireContent::Text(_) => panic!("expected multimodal content parts"),
        }
    }

    #[test]
    fn test_to_wire_messages_prepends_system_prompt() {
        let config = RemoteLlmConfig::new("test-key", "https://api.deepseek.com", "deepseek-chat");
        let client = OpenAiCompatibleClient::new(config);
        let messages = vec![Message::human("Hello")];

        let wire = client.to_wire_messages(&messages, Some("You are helpful"));

        assert_eq!(wire.len(), 2);
        assert_eq!(wire[0].role, "system");
        assert!(matches!(&wire[0].content, WireContent::Text(t) if t == "You are helpful"));
        assert_eq!(wire[1].role, "user");
    }

    #[test]
    fn test_update_config_hot_reloads_credentials() {
        let config = RemoteLlmConfig::new("old-key", "https://api.deepseek.com", "deepseek-chat");
        let client = OpenAiCompatibleClient::new(config);

        client.update_config(CredentialPatch {
            api_key: Some("new-key".to_string()),
            api_url: None,
            model_name: Some("deepseek-reasoner".to_string()),
        });

        assert_eq!(client.model_name(), "deepseek-reasoner");
        assert_eq!(client.current_config().api_key, "new-key");
    }
}
