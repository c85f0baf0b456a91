//! Policy/Retrieval Router: picks a diagram template and extracts a
//! structured blueprint, optionally primed with prior successful strategies.
//!
//! Grounded on `original_source/backend/router.py`'s `route_and_analyze` /
//! `analyze_specific_mode` / `learn_from_success`, ported onto the
//! try-LLM-then-fall-back shape of the teacher's `orchestrator`'s routing
//! layer.

use crate::error::{Result, RouterError};
use crate::templates::{DiagramType, ALL_DIAGRAM_TYPES};
use ingest::embedder::Embedder;
use llm::{LlmClient, Message};
use serde::Deserialize;
use std::sync::Arc;
use tracing::warn;
use vector_index::{ExperienceMemory, ExperienceRecord};

const EXPERIENCE_THRESHOLD: f32 = 0.40;
const EXPERIENCE_TOP_K: usize = 3;
const EXPERIENCE_OVERSAMPLE: usize = 3;

/// The Router's decision: which template to use and the extracted
/// structured analysis that seeds the Code Generator's prompt.
#[derive(Debug, Clone)]
pub struct RouteOutcome {
    pub reason: String,
    pub target_prompt_file: String,
    pub analysis_content: String,
}

#[derive(Debug, Deserialize)]
struct RouteResponse {
    #[serde(default)]
    diagram_type: String,
    #[serde(default)]
    reason: String,
    #[serde(default)]
    blueprint: String,
}

pub struct Router {
    client: Arc<dyn LlmClient>,
    embedder: Arc<dyn Embedder>,
    experience: ExperienceMemory,
}

impl Router {
    pub fn new(client: Arc<dyn LlmClient>, embedder: Arc<dyn Embedder>, experience: ExperienceMemory) -> Self {
        Self { client, embedder, experience }
    }

    /// Select a diagram template and extract its blueprint from `context`.
    pub async fn route_and_analyze(&self, context: &str, target: Option<&str>, use_experience: bool) -> Result<RouteOutcome> {
        let reference_memory = if use_experience { self.reference_memory(context).await } else { String::new() };

        let template_list = ALL_DIAGRAM_TYPES.iter().map(|t| t.as_str()).collect::<Vec<_>>().join(", ");
        let prompt = format!(
            "Available diagram templates: {}\n\n{}Context:\n{}\n\nPick the single best-fitting template and extract a \
             structured blueprint (not prose). Respond as JSON: {{\"diagram_type\", \"reason\", \"blueprint\"}}.",
            template_list, reference_memory, context
        );

        let response_text = self.client.chat(&[Message::human(prompt)], Some(ROUTER_SYSTEM_PROMPT), true).await?;
        let parsed = parse_route_response(&response_text)?;

        let diagram_type = DiagramType::parse(&parsed.diagram_type).unwrap_or(DiagramType::Flowchart);
        let filename = target.map(normalize_to_md).unwrap_or_else(|| format!("{}.md", diagram_type.as_str()));

        Ok(RouteOutcome { reason: parsed.reason, target_prompt_file: filename, analysis_content: parsed.blueprint })
    }

    /// Skip template selection; force `specific_type` regardless of what
    /// the model might hallucinate into the filename.
    pub async fn analyze_specific_mode(&self, context: &str, target: &str, specific_type: DiagramType) -> Result<RouteOutcome> {
        let prompt = format!(
            "Context:\n{}\n\nExtract a structured blueprint (not prose) for a {} diagram. Respond as JSON: \
             {{\"reason\", \"blueprint\"}}.",
            context,
            specific_type.as_str()
        );

        let response_text = self.client.chat(&[Message::human(prompt)], Some(ROUTER_SYSTEM_PROMPT), true).await?;
        let parsed = parse_route_response(&response_text)?;

        Ok(RouteOutcome { reason: parsed.reason, target_prompt_file: normalize_to_md(target), analysis_content: parsed.blueprint })
    }

    /// Distill a successful generation into a `{q, a}` experience record,
    /// dedup by `q`, persist, and hot-insert into the router index.
    pub async fn learn_from_success(&self, user_query: &str, valid_code: &str) -> Result<()> {
        let prompt = format!(
            "Distill this successful diagram-generation case into a reusable rule. Respond as JSON: \
             {{\"q\": \"<scenario abstract>\", \"a\": \"<design strategy>\"}}.\n\nQuery: {}\n\nGenerated code:\n{}",
            user_query, valid_code
        );
        let response_text = match self.client.chat(&[Message::human(prompt)], Some(LEARN_SYSTEM_PROMPT), true).await {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "learn_from_success call failed, skipping");
                return Ok(());
            }
        };

        let Ok(parsed) = tooling::json_repair::extract_json_object(&response_text) else {
            warn!("learn_from_success response was not parseable JSON, skipping");
            return Ok(());
        };
        let (Some(q), Some(a)) = (parsed.get("q").and_then(|v| v.as_str()), parsed.get("a").and_then(|v| v.as_str())) else {
            return Ok(());
        };

        let mut extra = std::collections::HashMap::new();
        extra.insert("source_code".to_string(), valid_code.to_string());
        let record = ExperienceRecord { q: q.to_string(), a: a.to_string(), extra };

        let embedding = self.embedder.encode(&[record.q.clone()]).await.map_err(|e| RouterError::BackendUnavailable(e.to_string()))?;
        self.experience.record(&record, embedding.into_iter().next().unwrap_or_default()).map_err(|e| RouterError::Other(e.to_string()))?;
        Ok(())
    }

    async fn reference_memory(&self, context: &str) -> String {
        let embedding = match self.embedder.encode(&[context.to_string()]).await {
            Ok(mut v) => v.pop().unwrap_or_default(),
            Err(e) => {
                warn!(error = %e, "reference memory embedding failed, skipping");
                return String::new();
            }
        };

        let hits = self
            .experience
            .search(&embedding, EXPERIENCE_TOP_K, EXPERIENCE_OVERSAMPLE, Some(EXPERIENCE_THRESHOLD))
            .unwrap_or_default();

        if hits.is_empty() {
            return String::new();
        }

        let mut memory = String::from("Reference Memory (prior successful strategies):\n");
        for hit in hits {
            memory.push_str(&format!("- {}\n", hit.payload));
        }
        memory.push('\n');
        memory
    }
}

const ROUTER_SYSTEM_PROMPT: &str = "You are a diagram design router. You select the best-fitting diagram template for \
a given context and extract a structured blueprint. Output strict JSON only.";
const LEARN_SYSTEM_PROMPT: &str = "You distill a successful diagram-generation case into a reusable strategy rule. \
Output strict JSON only.";

fn parse_route_response(text: &str) -> Result<RouteResponse> {
    let value = tooling::json_repair::extract_json_object(text).map_err(|e| RouterError::ParseFailure(e.to_string()))?;
    serde_json::from_value(value).map_err(|e| RouterError::ParseFailure(e.to_string()))
}

fn normalize_to_md(name: &str) -> String {
    if name.ends_with(".md") {
        name.to_string()
    } else {
        format!("{}.md", name.trim_end_matches('.'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_to_md_adds_suffix() {
        assert_eq!(normalize_to_md("flowchart"), "flowchart.md");
        assert_eq!(normalize_to_md("flowchart.md"), "flowchart.md");
    }

    #[test]
    fn test_parse_route_response_recovers_from_fenced_json() {
        let text = "```json\n{\"diagram_type\": \"flowchart\", \"reason\": \"r\", \"blueprint\": \"b\"}\n```";
        let parsed = parse_route_response(text).unwrap();
        assert_eq!(parsed.diagram_type, "flowchart");
        assert_eq!(parsed.blueprint, "b");
    }

    #[test]
    fn test_parse_route_response_errors_on_garbage() {
        let err = parse_route_response("not json").unwrap_err();
        assert!(matches!(err, RouterError::ParseFailure(_)));
    }
}
