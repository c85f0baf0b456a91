//! Layered configuration: defaults, overridden by an optional TOML file,
//! overridden again by environment variables — the pattern every
//! `tooling::config::ConfigBuilder` implementor in this workspace follows.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tooling::config::{get_env_bool, get_env_or, get_env_parse, ConfigBuilder};
use tooling::{Result as ToolingResult, ToolingError};

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Directory under which every [`pipeline::ProjectWorkspace`] is rooted.
    pub projects_root: PathBuf,

    /// Workspace name used when a request doesn't name one explicitly.
    pub default_workspace: String,

    /// Chat-completion backend shared by the Router, Code Generator, Code
    /// Reviser, and Document Analyzer.
    pub llm: LlmSettings,

    /// Embedding backend shared by the Graph Builder, Retriever, Router
    /// (experience memory), and Code Reviser (mistake memory).
    pub embedder: EmbedderSettings,

    /// External renderer used by the Validator.
    pub validator_endpoint: String,

    /// Bounded worker-pool size for Graph Builder Stage 2/3 fan-out.
    pub concurrency_pool_size: usize,

    /// Maximum retry attempts for transient LLM/embedder network failures.
    /// Independent of the validate-revise loop's own fixed attempt bound.
    pub network_max_retries: u32,

    /// Address the axum server binds to, e.g. "0.0.0.0:8080".
    pub bind_address: String,

    /// Directory repo-analysis shallow-clones are checked out into.
    pub repo_clone_dir: PathBuf,

    /// Default cap on source files selected for repo analysis, when a
    /// request doesn't override it.
    pub max_repo_analysis_files: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSettings {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedderSettings {
    pub base_url: String,
    pub model: String,
    pub dimension: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            projects_root: PathBuf::from("./projects"),
            default_workspace: "default".to_string(),
            llm: LlmSettings {
                api_key: String::new(),
                base_url: "https://api.deepseek.com".to_string(),
                model: "deepseek-chat".to_string(),
            },
            embedder: EmbedderSettings {
                base_url: "https://api.deepseek.com".to_string(),
                model: "deepseek-embedding".to_string(),
                dimension: 1024,
            },
            validator_endpoint: "http://localhost:9000/validate".to_string(),
            concurrency_pool_size: 8,
            network_max_retries: 3,
            bind_address: "0.0.0.0:8080".to_string(),
            repo_clone_dir: PathBuf::from("./repo_clones"),
            max_repo_analysis_files: 30,
        }
    }
}

impl AppConfig {
    /// Load a TOML config file at `path`, if it exists, layered over
    /// defaults, then apply environment-variable overrides, then validate.
    pub fn load(path: Option<&PathBuf>) -> ToolingResult<Self> {
        let mut config = Self::default();

        if let Some(path) = path {
            if path.exists() {
                let text = std::fs::read_to_string(path).map_err(ToolingError::Io)?;
                let from_file: Self = toml::from_str(&text).map_err(|e| ToolingError::General(format!("invalid config file {}: {}", path.display(), e)))?;
                config.merge(from_file);
            }
        }

        let from_env = Self::from_env("DIAGRAM_PIPELINE_")?;
        config.merge(from_env);

        config.validate()?;
        Ok(config)
    }
}

impl ConfigBuilder for AppConfig {
    fn validate(&self) -> ToolingResult<()> {
        if self.concurrency_pool_size == 0 {
            return Err(ToolingError::General("concurrency_pool_size must be non-zero".to_string()));
        }
        if self.projects_root.as_os_str().is_empty() {
            return Err(ToolingError::General("projects_root must not be empty".to_string()));
        }
        if self.embedder.dimension == 0 {
            return Err(ToolingError::General("embedder.dimension must be non-zero".to_string()));
        }
        Ok(())
    }

    fn from_env(prefix: &str) -> ToolingResult<Self> {
        let mut config = Self::default();

        if let Some(root) = get_env_or(&format!("{}PROJECTS_ROOT", prefix), "").ok().filter(|s| !s.is_empty()) {
            config.projects_root = PathBuf::from(root);
        }
        if let Some(workspace) = get_env_or(&format!("{}DEFAULT_WORKSPACE", prefix), "").ok().filter(|s| !s.is_empty()) {
            config.default_workspace = workspace;
        }
        if let Ok(Some(key)) = tooling::config::get_env(&format!("{}LLM_API_KEY", prefix)) {
            config.llm.api_key = key;
        }
        if let Some(url) = get_env_or(&format!("{}LLM_BASE_URL", prefix), "").ok().filter(|s| !s.is_empty()) {
            config.llm.base_url = url;
        }
        if let Some(model) = get_env_or(&format!("{}LLM_MODEL", prefix), "").ok().filter(|s| !s.is_empty()) {
            config.llm.model = model;
        }
        if let Some(url) = get_env_or(&format!("{}EMBEDDER_BASE_URL", prefix), "").ok().filter(|s| !s.is_empty()) {
            config.embedder.base_url = url;
        }
        if let Some(model) = get_env_or(&format!("{}EMBEDDER_MODEL", prefix), "").ok().filter(|s| !s.is_empty()) {
            config.embedder.model = model;
        }
        if let Some(dim) = get_env_parse::<usize>(&format!("{}EMBEDDER_DIMENSION", prefix))? {
            config.embedder.dimension = dim;
        }
        if let Some(endpoint) = get_env_or(&format!("{}VALIDATOR_ENDPOINT", prefix), "").ok().filter(|s| !s.is_empty()) {
            config.validator_endpoint = endpoint;
        }
        if let Some(pool) = get_env_parse::<usize>(&format!("{}CONCURRENCY_POOL_SIZE", prefix))? {
            config.concurrency_pool_size = pool;
        }
        if let Some(retries) = get_env_parse::<u32>(&format!("{}NETWORK_MAX_RETRIES", prefix))? {
            config.network_max_retries = retries;
        }
        if let Some(addr) = get_env_or(&format!("{}BIND_ADDRESS", prefix), "").ok().filter(|s| !s.is_empty()) {
            config.bind_address = addr;
        }
        if let Some(dir) = get_env_or(&format!("{}REPO_CLONE_DIR", prefix), "").ok().filter(|s| !s.is_empty()) {
            config.repo_clone_dir = PathBuf::from(dir);
        }
        if let Some(max_files) = get_env_parse::<usize>(&format!("{}MAX_REPO_ANALYSIS_FILES", prefix))? {
            config.max_repo_analysis_files = max_files;
        }
        let _ = get_env_bool(&format!("{}VERBOSE", prefix))?;

        Ok(config)
    }

    fn merge(&mut self, other: Self) -> &mut Self {
        let defaults = Self::default();

        if other.projects_root != defaults.projects_root {
            self.projects_root = other.projects_root;
        }
        if other.default_workspace != defaults.default_workspace {
            self.default_workspace = other.default_workspace;
        }
        if !other.llm.api_key.is_empty() {
            self.llm.api_key = other.llm.api_key;
        }
        if other.llm.base_url != defaults.llm.base_url {
            self.llm.base_url = other.llm.base_url;
        }
        if other.llm.model != defaults.llm.model {
            self.llm.model = other.llm.model;
        }
        if other.embedder.base_url != defaults.embedder.base_url {
            self.embedder.base_url = other.embedder.base_url;
        }
        if other.embedder.model != defaults.embedder.model {
            self.embedder.model = other.embedder.model;
        }
        if other.embedder.dimension != defaults.embedder.dimension {
            self.embedder.dimension = other.embedder.dimension;
        }
        if other.validator_endpoint != defaults.validator_endpoint {
            self.validator_endpoint = other.validator_endpoint;
        }
        if other.concurrency_pool_size != defaults.concurrency_pool_size {
            self.concurrency_pool_size = other.concurrency_pool_size;
        }
        if other.network_max_retries != defaults.network_max_retries {
            self.network_max_retries = other.network_max_retries;
        }
        if other.bind_address != defaults.bind_address {
            self.bind_address = other.bind_address;
        }
        if other.repo_clone_dir != defaults.repo_clone_dir {
            self.repo_clone_dir = other.repo_clone_dir;
        }
        if other.max_repo_analysis_files != defaults.max_repo_analysis_files {
            self.max_repo_analysis_files = other.max_repo_analysis_files;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_validates() {
        assert!(AppConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_pool_size_rejected() {
        let mut config = AppConfig::default();
        config.concurrency_pool_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_projects_root_rejected() {
        let mut config = AppConfig::default();
        config.projects_root = PathBuf::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_merge_overrides_non_default_fields_only() {
        let mut base = AppConfig::default();
        let mut override_config = AppConfig::default();
        override_config.concurrency_pool_size = 16;
        override_config.bind_address = "127.0.0.1:3000".to_string();

        base.merge(override_config);

        assert_eq!(base.concurrency_pool_size, 16);
        assert_eq!(base.bind_address, "127.0.0.1:3000");
        assert_eq!(base.default_workspace, "default");
    }

    #[test]
    fn test_load_with_missing_file_falls_back_to_defaults() {
        let config = AppConfig::load(Some(&PathBuf::from("/nonexistent/diagram-pipeline.toml"))).unwrap();
        assert_eq!(config.default_workspace, "default");
    }
}
