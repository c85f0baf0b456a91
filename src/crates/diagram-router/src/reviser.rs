//! Code Reviser: syntax-only repair of a diagram that failed validation,
//! pure instruction-driven optimization, and mistake-book learning.
//!
//! Grounded on `original_source/backend/code_revise.py`'s `revise_code`,
//! `optimize_code`, and `record_mistake`.

use crate::error::{Result, RouterError};
use crate::generator::clean_code;
use ingest::embedder::Embedder;
use llm::{LlmClient, Message};
use std::sync::Arc;
use tracing::warn;
use vector_index::{ExperienceMemory, ExperienceRecord};

const MISTAKE_SEARCH_TOP_K: usize = 6;
const MISTAKE_SEARCH_OVERSAMPLE: usize = 3;
const MISTAKE_SEARCH_THRESHOLD: f32 = 0.40;
const MISTAKE_QUERY_CHAR_LIMIT: usize = 200;

/// One prior failed attempt, carried forward in the "Failed Attempts"
/// section so the reviser doesn't repeat a dead end.
#[derive(Debug, Clone)]
pub struct FailedAttempt {
    pub code: String,
    pub error: String,
}

pub struct CodeReviser {
    client: Arc<dyn LlmClient>,
    embedder: Arc<dyn Embedder>,
    mistakes: ExperienceMemory,
}

impl CodeReviser {
    pub fn new(client: Arc<dyn LlmClient>, embedder: Arc<dyn Embedder>, mistakes: ExperienceMemory) -> Self {
        Self { client, embedder, mistakes }
    }

    /// Fix `code` given the validator's `error`, without changing its
    /// logic — syntax repair only.
    pub async fn revise_code(&self, code: &str, error: &str, previous_attempts: &[FailedAttempt], use_mistake_book: bool) -> Result<String> {
        let mistake_context =
            if use_mistake_book { self.mistake_reference(mistake_query(code, error)).await } else { String::new() };

        let failed_attempts_section = if previous_attempts.is_empty() {
            String::new()
        } else {
            let mut section = String::from("Failed Attempts (do not repeat these):\n");
            for attempt in previous_attempts {
                section.push_str(&format!("- Code:\n{}\n  Error: {}\n", attempt.code, attempt.error));
            }
            section
        };

        let prompt = format!(
            "{}{}The following diagram code failed validation with error: {}\n\nCode:\n{}\n\nFix ONLY the syntax \
             error. Do not change the diagram's logic or structure. Respond with ONLY the corrected code.",
            mistake_context, failed_attempts_section, error, code
        );

        let response = self.client.chat(&[Message::human(prompt)], Some(REVISE_SYSTEM_PROMPT), false).await?;
        Ok(clean_code(&response))
    }

    /// Pure LLM transform driven by a free-form `instruction`; no retrieval.
    /// Callers feed the result back through the standard validate-revise loop.
    pub async fn optimize_code(&self, code: &str, instruction: &str) -> Result<String> {
        let prompt = format!("Instruction: {}\n\nCode:\n{}\n\nApply the instruction. Respond with ONLY the resulting code.", instruction, code);
        let response = self.client.chat(&[Message::human(prompt)], Some(OPTIMIZE_SYSTEM_PROMPT), false).await?;
        Ok(clean_code(&response))
    }

    /// Distill a `(bad_code, error, fixed_code)` triple into a generic
    /// `{q, a}` rule, dedup by `q`, persist, hot-insert.
    pub async fn record_mistake(&self, bad_code: &str, error: &str, fixed_code: &str) -> Result<()> {
        let prompt = format!(
            "Distill this fix into a generic, reusable rule. Respond as JSON: {{\"q\": \"<error feature>\", \"a\": \
             \"<fix strategy>\"}}.\n\nBroken code:\n{}\n\nError: {}\n\nFixed code:\n{}",
            bad_code, error, fixed_code
        );
        let response = match self.client.chat(&[Message::human(prompt)], Some(MISTAKE_SYSTEM_PROMPT), true).await {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "record_mistake call failed, skipping");
                return Ok(());
            }
        };

        let Ok(parsed) = tooling::json_repair::extract_json_object(&response) else {
            warn!("record_mistake response was not parseable JSON, skipping");
            return Ok(());
        };
        let (Some(q), Some(a)) = (parsed.get("q").and_then(|v| v.as_str()), parsed.get("a").and_then(|v| v.as_str())) else {
            return Ok(());
        };

        let record = ExperienceRecord { q: q.to_string(), a: a.to_string(), extra: Default::default() };
        let embedding = self.embedder.encode(&[record.q.clone()]).await.map_err(|e| RouterError::BackendUnavailable(e.to_string()))?;
        self.mistakes.record(&record, embedding.into_iter().next().unwrap_or_default()).map_err(|e| RouterError::Other(e.to_string()))?;
        Ok(())
    }

    async fn mistake_reference(&self, query: &str) -> String {
        let embedding = match self.embedder.encode(&[query.to_string()]).await {
            Ok(mut v) => v.pop().unwrap_or_default(),
            Err(e) => {
                warn!(error = %e, "mistake-book embedding failed, skipping");
                return String::new();
            }
        };

        let hits = self
            .mistakes
            .search(&embedding, MISTAKE_SEARCH_TOP_K, MISTAKE_SEARCH_OVERSAMPLE, Some(MISTAKE_SEARCH_THRESHOLD))
            .unwrap_or_default();

        if hits.is_empty() {
            return String::new();
        }

        let mut context = String::from("Known mistakes and fixes:\n");
        for hit in hits {
            context.push_str(&format!("- {}\n", hit.payload));
        }
        context.push('\n');
        context
    }
}

/// The text the mistake-book search is keyed on: the validator error if
/// present, else the first [`MISTAKE_QUERY_CHAR_LIMIT`] chars of the code.
fn mistake_query<'a>(code: &'a str, error: &'a str) -> &'a str {
    if error.is_empty() {
        let end = code.char_indices().nth(MISTAKE_QUERY_CHAR_LIMIT).map(|(i, _)| i).unwrap_or(code.len());
        &code[..end]
    } else {
        error
    }
}

const REVISE_SYSTEM_PROMPT: &str =
    "You fix syntax errors in diagram source code without altering its logic or structure. Output only code.";
const OPTIMIZE_SYSTEM_PROMPT: &str = "You apply a requested transformation to diagram source code. Output only code.";
const MISTAKE_SYSTEM_PROMPT: &str = "You distill a code fix into a generic, reusable rule. Output strict JSON only.";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mistake_query_prefers_error_over_code() {
        assert_eq!(mistake_query("some code", "parse error"), "parse error");
    }

    #[test]
    fn test_mistake_query_falls_back_to_truncated_code() {
        let code = "x".repeat(300);
        assert_eq!(mistake_query(&code, "").len(), MISTAKE_QUERY_CHAR_LIMIT);
    }

    #[test]
    fn test_mistake_query_does_not_panic_on_multibyte_boundary() {
        // "é" is 2 bytes in UTF-8; repeating it past the char limit means a
        // raw byte slice at MISTAKE_QUERY_CHAR_LIMIT would land mid-character.
        let code = "é".repeat(300);
        let truncated = mistake_query(&code, "");
        assert_eq!(truncated.chars().count(), MISTAKE_QUERY_CHAR_LIMIT);
    }
}
