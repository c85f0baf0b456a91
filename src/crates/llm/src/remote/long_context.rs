//! File-upload chat for long-context providers (the Qwen-Long protocol).
//!
//! Rather than inlining a document's text into the prompt, the document is
//! uploaded once with `purpose=file-extract`; the returned file id is then
//! referenced from a *separate* system message as `fileid://{file_id}`.
//! Qwen-Long's backend mis-parses the file reference when it's concatenated
//! with other system text, so the file-id message and the caller-supplied
//! `system_prompt` are kept as two distinct system turns.

use crate::config::{CredentialPatch, RemoteLlmConfig};
use crate::error::{LlmError, Result};
use crate::remote::OpenAiCompatibleClient;
use crate::{ChatStream, LlmClient, Message};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;

/// Wraps an [`OpenAiCompatibleClient`] with file-upload support.
pub struct LongContextClient {
    inner: OpenAiCompatibleClient,
}

impl LongContextClient {
    pub fn new(config: RemoteLlmConfig) -> Self {
        Self { inner: OpenAiCompatibleClient::new(config) }
    }

    async fn upload_file(&self, file_path: &Path) -> Result<String> {
        let config = self.inner.current_config();
        let file_name = file_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("document")
            .to_string();
        let bytes = tokio::fs::read(file_path)
            .await
            .map_err(|e| LlmError::Other(format!("failed to read {}: {}", file_path.display(), e)))?;

        let part = reqwest::multipart::Part::bytes(bytes).file_name(file_name);
        let form = reqwest::multipart::Form::new()
            .text("purpose", "file-extract")
            .part("file", part);

        let url = format!("{}/files", config.base_url.trim_end_matches('/'));
        let response = self
            .inner
            .http_client()
            .post(&url)
            .header("Authorization", format!("Bearer {}", config.api_key))
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::ProviderError(format!("file upload failed ({}): {}", status, body)));
        }

        let parsed: FileUploadResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
        Ok(parsed.id)
    }
}

#[derive(Debug, Deserialize)]
struct FileUploadResponse {
    id: String,
}

#[async_trait]
impl LlmClient for LongContextClient {
    async fn chat(&self, messages: &[Message], system_prompt: Option<&str>, json_mode: bool) -> Result<String> {
        self.inner.chat(messages, system_prompt, json_mode).await
    }

    async fn chat_stream(
        &self,
        messages: &[Message],
        system_prompt: Option<&str>,
        json_mode: bool,
    ) -> Result<ChatStream> {
        self.inner.chat_stream(messages, system_prompt, json_mode).await
    }

    async fn chat_with_file(
        &self,
        messages: &[Message],
        system_prompt: Option<&str>,
        file_path: &Path,
        json_mode: bool,
    ) -> Result<String> {
        let file_id = self.upload_file(file_path).await?;

        // fileid:// and the caller's system prompt must stay as two separate
        // system turns, never concatenated into one.
        let mut wire_messages = vec![Message::system(format!("fileid://{}", file_id))];
        if let Some(system) = system_prompt {
            wire_messages.push(Message::system(system));
        }
        wire_messages.extend_from_slice(messages);

        self.inner.chat(&wire_messages, None, json_mode).await
    }

    fn update_config(&self, update: CredentialPatch) {
        self.inner.update_config(update);
    }

    fn model_name(&self) -> String {
        self.inner.model_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let config = RemoteLlmConfig::new(
            "test-key",
            "https://dashscope.aliyuncs.com/compatible-mode/v1",
            "qwen-long",
        );
        let _client = LongContextClient::new(config);
    }
}
