//! External diagram-syntax validation: a renderer round-trip, plus a
//! static pre-check that short-circuits the common `subgraph` collision
//! without ever calling out to the network.

use async_trait::async_trait;
use regex::Regex;
use std::sync::OnceLock;

/// Outcome of a single validation pass.
#[derive(Debug, Clone)]
pub struct ValidationOutcome {
    pub valid: bool,
    pub error: Option<String>,
}

impl ValidationOutcome {
    pub fn ok() -> Self {
        Self { valid: true, error: None }
    }

    pub fn fail(error: impl Into<String>) -> Self {
        Self { valid: false, error: Some(error.into()) }
    }
}

/// Renders `code` through an external service and reports whether it
/// parsed. Implementations should never panic on a malformed diagram —
/// that's exactly what a `valid: false` result communicates.
#[async_trait]
pub trait Validator: Send + Sync {
    async fn check(&self, code: &str) -> ValidationOutcome;
}

fn subgraph_reserved_word_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"classDef\s+subgraph").unwrap())
}

/// Reject `code` immediately if it reuses the reserved `subgraph` word as
/// a `classDef` name — the renderer would reject it anyway, so this skips
/// the round-trip.
pub fn static_hard_check(code: &str) -> Option<ValidationOutcome> {
    if subgraph_reserved_word_pattern().is_match(code) {
        Some(ValidationOutcome::fail("`subgraph` is a reserved word and cannot be used as a classDef name"))
    } else {
        None
    }
}

/// Calls an external render-and-validate endpoint (e.g. a self-hosted
/// kroki-compatible service) and treats any non-2xx response as a
/// validation failure rather than a hard error — a renderer rejection is
/// expected, recoverable pipeline state, not a backend outage.
pub struct RemoteValidator {
    endpoint: String,
    client: reqwest::Client,
}

impl RemoteValidator {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self { endpoint: endpoint.into(), client: reqwest::Client::new() }
    }
}

#[async_trait]
impl Validator for RemoteValidator {
    async fn check(&self, code: &str) -> ValidationOutcome {
        if let Some(outcome) = static_hard_check(code) {
            return outcome;
        }

        let response = match self.client.post(&self.endpoint).body(code.to_string()).send().await {
            Ok(r) => r,
            Err(e) => return ValidationOutcome::fail(format!("validator unreachable: {}", e)),
        };

        if response.status().is_success() {
            ValidationOutcome::ok()
        } else {
            let error = response.text().await.unwrap_or_else(|_| "renderer rejected the diagram".to_string());
            ValidationOutcome::fail(error)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_hard_check_catches_reserved_classdef() {
        let outcome = static_hard_check("flowchart TD\nclassDef subgraph fill:#fff").unwrap();
        assert!(!outcome.valid);
    }

    #[test]
    fn test_static_hard_check_passes_clean_code() {
        assert!(static_hard_check("flowchart TD\n    A --> B").is_none());
    }
}
