//! Configuration for remote LLM providers.

use crate::error::{LlmError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for an OpenAI-protocol-compatible remote LLM endpoint.
///
/// Almost every provider used by the diagram pipeline (DeepSeek, Qwen,
/// OpenRouter-fronted models, self-hosted vLLM gateways) speaks the same
/// `/chat/completions` wire format, so a single config type parameterized by
/// `base_url` and `model` covers all of them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteLlmConfig {
    /// API key for authentication.
    pub api_key: String,

    /// Base URL for the API, e.g. "https://api.deepseek.com".
    pub base_url: String,

    /// Model name/identifier.
    pub model: String,

    /// Request timeout duration.
    #[serde(default = "default_timeout")]
    pub timeout: Duration,

    /// Maximum retries for failed requests.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Organization ID (optional, for providers that support it).
    pub organization: Option<String>,
}

impl RemoteLlmConfig {
    /// Create a new remote LLM configuration.
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: base_url.into(),
            model: model.into(),
            timeout: default_timeout(),
            max_retries: default_max_retries(),
            organization: None,
        }
    }

    /// Create configuration from an environment variable holding the API key.
    pub fn from_env(
        env_var: &str,
        base_url: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self> {
        let api_key = std::env::var(env_var)
            .map_err(|_| LlmError::ApiKeyNotFound(format!("Environment variable: {}", env_var)))?;

        Ok(Self::new(api_key, base_url, model))
    }

    /// Set the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the maximum number of retries.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the organization ID.
    pub fn with_organization(mut self, organization: impl Into<String>) -> Self {
        self.organization = Some(organization.into());
        self
    }

    /// Apply a hot-reload patch received from the UI/config layer.
    ///
    /// The patch is the camelCase shape the frontend sends
    /// (`apiKey`/`apiUrl`/`modelName`); fields left absent keep their
    /// current value.
    pub fn apply_patch(&mut self, patch: &CredentialPatch) {
        if let Some(api_key) = &patch.api_key {
            self.api_key = api_key.clone();
        }
        if let Some(api_url) = &patch.api_url {
            self.base_url = api_url.clone();
        }
        if let Some(model_name) = &patch.model_name {
            self.model = model_name.clone();
        }
    }
}

/// Credential/endpoint patch used to hot-reload a live [`RemoteLlmConfig`]
/// without restarting the process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialPatch {
    pub api_key: Option<String>,
    pub api_url: Option<String>,
    pub model_name: Option<String>,
}

fn default_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_max_retries() -> u32 {
    3
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_config_builder() {
        let config = RemoteLlmConfig::new("test-key", "https://api.deepseek.com", "deepseek-chat")
            .with_timeout(Duration::from_secs(120))
            .with_organization("org-123");

        assert_eq!(config.api_key, "test-key");
        assert_eq!(config.base_url, "https://api.deepseek.com");
        assert_eq!(config.model, "deepseek-chat");
        assert_eq!(config.timeout, Duration::from_secs(120));
        assert_eq!(config.organization, Some("org-123".to_string()));
    }

    #[test]
    fn test_apply_patch_only_overwrites_present_fields() {
        let mut config = RemoteLlmConfig::new("old-key", "https://old.example.com", "old-model");
        let patch = CredentialPatch {
            api_key: Some("new-key".to_string()),
            api_url: None,
            model_name: Some("new-model".to_string()),
        };
        config.apply_patch(&patch);

        assert_eq!(config.api_key, "new-key");
        assert_eq!(config.base_url, "https://old.example.com");
        assert_eq!(config.model, "new-model");
    }

    #[test]
    fn test_patch_deserializes_from_camel_case_json() {
        let json = r#"{"apiKey":"k","apiUrl":"https://x","modelName":"m"}"#;
        let patch: CredentialPatch = serde_json::from_str(json).unwrap();
        assert_eq!(patch.api_key, Some("k".to_string()));
        assert_eq!(patch.api_url, Some("https://x".to_string()));
        assert_eq!(patch.model_name, Some("m".to_string()));
    }
}
