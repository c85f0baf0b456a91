//! Code Generator: turns a Router blueprint into clean diagram source.
//!
//! Grounded on `original_source/backend/codez_gen.py`'s `generate_code`:
//! template skeleton + richness directive appended to the prompt, then a
//! `_clean_code`-style fence/language-tag strip on the response.

use crate::error::Result;
use crate::templates::{DiagramType, RichnessBand};
use llm::{LlmClient, Message};
use std::sync::Arc;

pub struct CodeGenerator {
    client: Arc<dyn LlmClient>,
}

impl CodeGenerator {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self { client }
    }

    /// Generate diagram source for `diagram_type` from `blueprint`, with
    /// `richness` in `[0.0, 1.0]` controlling the node-count budget.
    pub async fn generate_code(&self, blueprint: &str, diagram_type: DiagramType, richness: f32) -> Result<String> {
        let band = RichnessBand::from_richness(richness.clamp(0.0, 1.0));
        let prompt = format!(
            "Diagram type: {}\n\nSkeleton reference:\n{}\n\nBlueprint:\n{}\n\n{}\n\nRespond with ONLY the diagram \
             source code, no explanation.",
            diagram_type.as_str(),
            diagram_type.skeleton(),
            blueprint,
            band.directive()
        );

        let response = self.client.chat(&[Message::human(prompt)], Some(GENERATOR_SYSTEM_PROMPT), false).await?;
        Ok(clean_code(&response))
    }
}

const GENERATOR_SYSTEM_PROMPT: &str =
    "You generate clean, syntactically valid diagram source code from a structured blueprint. Never include prose.";

/// Strip a surrounding Markdown code fence and a leading language tag
/// (e.g. ` ```mermaid `), matching `codez_gen.py`'s `_clean_code`.
pub fn clean_code(raw: &str) -> String {
    let trimmed = raw.trim();
    let without_fence = trimmed
        .strip_prefix("```")
        .map(|rest| rest.strip_suffix("```").unwrap_or(rest))
        .unwrap_or(trimmed)
        .trim();

    let known_tags = ["mermaid", "dot", "graphviz", "json", "yaml"];
    let mut lines = without_fence.lines();
    match lines.next() {
        Some(first) if known_tags.contains(&first.trim().to_lowercase().as_str()) => {
            lines.collect::<Vec<_>>().join("\n").trim().to_string()
        }
        _ => without_fence.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_code_strips_fence_and_language_tag() {
        let raw = "```mermaid\nflowchart TD\n    A --> B\n```";
        assert_eq!(clean_code(raw), "flowchart TD\n    A --> B");
    }

    #[test]
    fn test_clean_code_passes_through_unfenced_code() {
        let raw = "flowchart TD\n    A --> B";
        assert_eq!(clean_code(raw), raw);
    }

    #[test]
    fn test_clean_code_strips_fence_without_language_tag() {
        let raw = "```\ndigraph G { A -> B; }\n```";
        assert_eq!(clean_code(raw), "digraph G { A -> B; }");
    }
}
