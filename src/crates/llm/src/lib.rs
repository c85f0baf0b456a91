//! LLM client abstraction and provider implementations for the diagram pipeline.
//!
//! # Providers
//!
//! The diagram pipeline only talks to OpenAI-protocol-compatible chat
//! endpoints (DeepSeek, Qwen, OpenRouter, self-hosted gateways) and, for
//! document ingestion, providers that support Qwen-Long-style file upload
//! (upload a document, then reference it from the system prompt with a
//! `fileid://` URI instead of inlining its contents).
//!
//! # Example
//!
//! ```rust,ignore
//! use llm::{LlmClient, Message};
//! use llm::config::RemoteLlmConfig;
//! use llm::remote::OpenAiCompatibleClient;
//!
//! # async fn run() -> llm::Result<()> {
//! let config = RemoteLlmConfig::from_env(
//!     "DEEPSEEK_API_KEY",
//!     "https://api.deepseek.com",
//!     "deepseek-chat",
//! )?;
//! let client = OpenAiCompatibleClient::new(config);
//!
//! let messages = vec![Message::human("Summarize this repository.")];
//! let answer = client.chat(&messages, None, false).await?;
//! println!("{}", answer);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod remote;

pub use config::{CredentialPatch as LlmConfigUpdate, RemoteLlmConfig};
pub use error::{LlmError, Result};

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Role of a single turn in a chat conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single conversational turn.
///
/// `images`, when non-empty, carries `data:` or `http(s)` image URLs sent
/// alongside `content` as a multimodal content-parts array rather than
/// inlined as text — providers that don't support vision input simply never
/// see this field populated (`Message::human` leaves it empty).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into(), images: Vec::new() }
    }

    pub fn human(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into(), images: Vec::new() }
    }

    /// A user turn carrying one or more images (as `data:` URLs or
    /// `http(s)` URLs) alongside its text instruction.
    pub fn human_with_images(content: impl Into<String>, images: Vec<String>) -> Self {
        Self { role: Role::User, content: content.into(), images }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into(), images: Vec::new() }
    }
}

/// A stream of incremental content chunks from an in-progress completion.
pub type ChatStream = BoxStream<'static, Result<String>>;

/// A chat-completion-capable LLM client.
///
/// Implementors back the Router, Code Generator, Code Reviser and
/// DocumentAnalyzer components; all of them only need non-streaming chat,
/// streaming chat for the UI-facing generation paths, and — for providers
/// that support it — uploading a document and referencing it from the
/// prompt rather than inlining its text.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Run a single chat completion and return the assistant's reply text.
    ///
    /// `system_prompt`, if given, is sent as a leading system turn.
    /// `json_mode` requests the provider constrain output to a single JSON
    /// object; callers still parse the result themselves (via
    /// `tooling::json_repair`) since providers are not strictly compliant.
    async fn chat(
        &self,
        messages: &[Message],
        system_prompt: Option<&str>,
        json_mode: bool,
    ) -> Result<String>;

    /// Run a chat completion, yielding content chunks as they arrive.
    async fn chat_stream(
        &self,
        messages: &[Message],
        system_prompt: Option<&str>,
        json_mode: bool,
    ) -> Result<ChatStream>;

    /// Chat with a previously-uploaded file available to the model as
    /// context, without inlining the file's content into the prompt.
    ///
    /// Providers that do not support file upload return
    /// [`LlmError::Unsupported`].
    async fn chat_with_file(
        &self,
        _messages: &[Message],
        _system_prompt: Option<&str>,
        _file_path: &Path,
        _json_mode: bool,
    ) -> Result<String> {
        Err(LlmError::Unsupported(
            "this provider does not support file-upload chat".to_string(),
        ))
    }

    /// Hot-reload API credentials/endpoint without restarting the process.
    fn update_config(&self, update: LlmConfigUpdate);

    /// Identifier of the model currently in use, for logging.
    fn model_name(&self) -> String;
}
