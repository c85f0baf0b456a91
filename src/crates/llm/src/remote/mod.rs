//! Remote LLM provider implementations.
//!
//! - [`OpenAiCompatibleClient`] talks to any provider exposing an
//!   OpenAI-protocol `/chat/completions` endpoint — DeepSeek, Qwen,
//!   OpenRouter and self-hosted gateways all qualify, distinguished only by
//!   `base_url`/`model` in [`crate::config::RemoteLlmConfig`].
//! - [`LongContextClient`] wraps an `OpenAiCompatibleClient` with the
//!   Qwen-Long file-upload protocol for providers that support it.

pub mod long_context;
pub mod openai_compatible;

pub use long_context::LongContextClient;
pub use openai_compatible::OpenAiCompatibleClient;
