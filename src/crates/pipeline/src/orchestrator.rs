//! Pipeline Orchestrator: the generate/validate/revise loop, ingestion
//! corpus assembly, and repo-analysis background task.
//!
//! Grounded on `original_source/backend/app.py`'s generate-validate-revise
//! flow, wrapped in the teacher's `orca::executor::task_executor`
//! bounded-retry shape (here: a fixed attempt count rather than a
//! wall-clock timeout, since the loop's own exit condition is attempt
//! count, not duration).

use crate::error::{PipelineError, Result};
use crate::tasks::{TaskStatus, TaskTracker};
use crate::validator::{ValidationOutcome, Validator};
use crate::workspace::{FileStatus, ProjectWorkspace};
use diagram_router::reviser::FailedAttempt;
use diagram_router::templates::DiagramType;
use diagram_router::{CodeGenerator, CodeReviser, Router};
use ingest::document_analyzer::DocumentAnalyzer;
use ingest::embedder::Embedder;
use ingest::git_loader::GitLoader;
use ingest::{chunk_text, Chunk, Granularity};
use knowledge_graph::{ChunkLookup, GraphBuilder, KnowledgeStore, Retriever};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};
use vector_index::{Entry, VectorIndex};

const MAX_RETRIES: usize = 3;
const GRAPH_CORPUS_TOKEN_BUDGET_PER_FILE: usize = 2400;
const DIRECT_ANALYSIS_TOKEN_BUDGET_BASE: usize = 1200;

/// Source file extensions that must be routed through the document
/// analyzer rather than read as plain text — images (vision) and the
/// binary document formats `git_loader`'s classifier calls `documentation`.
const ANALYZER_REQUIRED_EXTS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp", "bmp", "pdf", "doc", "docx"];

/// Final result of a generate/fix/optimize request: the best-effort code
/// plus the residual error, if the loop never converged. Never an `Err` —
/// a validator rejection is expected pipeline state, not a hard failure.
#[derive(Debug, Clone)]
pub struct LoopOutcome {
    pub code: String,
    pub error: Option<String>,
    pub revisions: usize,
}

/// Wires the Retriever, Router, Code Generator, Code Reviser, and an
/// external Validator into the shared validate-revise loop used by
/// `/generate`, `/fix`, and `/optimize`.
pub struct PipelineOrchestrator {
    pub router: Router,
    pub generator: CodeGenerator,
    pub reviser: CodeReviser,
    pub retriever: Retriever,
    pub validator: Arc<dyn Validator>,
    pub document_analyzer: DocumentAnalyzer,
    pub embedder: Arc<dyn Embedder>,
    pub graph_builder: GraphBuilder,
    pub git_loader: GitLoader,
}

impl PipelineOrchestrator {
    /// Retrieve context (graph or raw query) → route to a template and
    /// extract a blueprint → generate code → validate-revise.
    pub async fn generate(
        &self,
        store: &KnowledgeStore,
        chunks: &dyn ChunkLookup,
        query: &str,
        use_graph: bool,
        use_experience: bool,
        richness: f32,
        explicit_type: Option<DiagramType>,
    ) -> Result<LoopOutcome> {
        let context = if use_graph { self.retriever.retrieve(store, query, 20, chunks).await? } else { query.to_string() };

        let route = match explicit_type {
            Some(diagram_type) => {
                self.router.analyze_specific_mode(&context, &format!("{}.md", diagram_type.as_str()), diagram_type).await?
            }
            None => self.router.route_and_analyze(&context, None, use_experience).await?,
        };

        let diagram_type = DiagramType::parse(route.target_prompt_file.trim_end_matches(".md")).unwrap_or(DiagramType::Flowchart);
        let code = self.generator.generate_code(&route.analysis_content, diagram_type, richness).await?;

        let outcome = self.validate_revise(code, use_experience).await;
        info!(diagram_type = diagram_type.as_str(), revisions = outcome.revisions, "generate pipeline finished");

        if outcome.error.is_none() {
            if let Err(e) = self.router.learn_from_success(query, &outcome.code).await {
                warn!(error = %e, "learn_from_success failed, continuing");
            }
        }

        Ok(outcome)
    }

    /// Apply a free-form optimize instruction to existing code, then run
    /// the same validate-revise loop a generation would.
    pub async fn optimize(&self, code: &str, instruction: &str, use_mistake_book: bool) -> Result<LoopOutcome> {
        let optimized = self.reviser.optimize_code(code, instruction).await?;
        Ok(self.validate_revise(optimized, use_mistake_book).await)
    }

    /// The shared validate-revise loop: up to [`MAX_RETRIES`] revision
    /// attempts, recording the first failure as a mistake once the loop
    /// eventually succeeds after at least one revision.
    pub async fn validate_revise(&self, initial_code: String, use_mistake_book: bool) -> LoopOutcome {
        let mut code = initial_code;
        let mut history: Vec<FailedAttempt> = Vec::new();
        let mut last_outcome = ValidationOutcome::ok();

        for attempt in 0..=MAX_RETRIES {
            last_outcome = self.validator.check(&code).await;
            if last_outcome.valid {
                break;
            }

            let error = last_outcome.error.clone().unwrap_or_default();
            history.push(FailedAttempt { code: code.clone(), error: error.clone() });

            if attempt == MAX_RETRIES {
                break;
            }

            let prior_attempts = &history[..history.len() - 1];
            code = match self.reviser.revise_code(&code, &error, prior_attempts, use_mistake_book).await {
                Ok(revised) => revised,
                Err(e) => {
                    warn!(error = %e, "revision call failed, stopping with best-effort code");
                    break;
                }
            };
        }

        if last_outcome.valid && !history.is_empty() {
            let first_fail = &history[0];
            if let Err(e) = self.reviser.record_mistake(&first_fail.code, &first_fail.error, &code).await {
                warn!(error = %e, "record_mistake failed, continuing");
            }
        }

        LoopOutcome {
            code,
            error: if last_outcome.valid { None } else { last_outcome.error },
            revisions: history.len(),
        }
    }

    /// Assemble a single corpus out of `file_sources` (caller already
    /// filtered to stale/new files): plain-text files are concatenated
    /// directly, everything else is summarized first via the document
    /// analyzer under a fixed per-file token budget.
    pub async fn build_ingestion_corpus(&self, file_sources: &[(String, bool)]) -> String {
        let mut corpus = String::new();
        for (source, is_plain_text) in file_sources {
            if *is_plain_text {
                match tokio::fs::read_to_string(source).await {
                    Ok(text) => {
                        corpus.push_str(&text);
                        corpus.push_str("\n\n");
                    }
                    Err(e) => warn!(source = %source, error = %e, "failed to read plain-text source, skipping file"),
                }
                continue;
            }

            match self.document_analyzer.analyze(source, None, Some(GRAPH_CORPUS_TOKEN_BUDGET_PER_FILE)).await {
                Ok(summary) => {
                    corpus.push_str(&summary);
                    corpus.push_str("\n\n");
                }
                Err(e) => warn!(source = %source, error = %e, "document analysis failed, skipping file"),
            }
        }
        info!(files = file_sources.len(), corpus_bytes = corpus.len(), "ingestion corpus assembled");
        corpus
    }

    /// Direct-analysis mode (no graph build, analyze-and-report only): the
    /// per-file token allowance shrinks as the file count grows, since
    /// every file's summary shares one downstream prompt.
    pub fn direct_analysis_budget(file_count: usize) -> usize {
        DIRECT_ANALYSIS_TOKEN_BUDGET_BASE / file_count.max(1)
    }

    /// Scan `workspace`'s uploads for files stale against their
    /// `last_graph_sync`, batch them into a corpus, chunk it, embed the
    /// small chunks, run the Graph Builder's four stages over the result,
    /// and persist `store`. Drives `task_id` through `tasks`' pending ->
    /// processing -> success | error transitions and mirrors each stale
    /// file's record to `indexed` on completion.
    pub async fn ingest_workspace(
        &self,
        workspace: &ProjectWorkspace,
        store: &KnowledgeStore,
        tasks: &TaskTracker,
        task_id: &str,
        user_intent: &str,
    ) -> Result<()> {
        tasks.transition(task_id, TaskStatus::Processing, "scanning uploads for stale files", crate::unix_timestamp());

        let mut files = workspace.load_files()?;
        let mut stale_indices = Vec::new();
        let mut sources = Vec::new();
        for (idx, record) in files.iter().enumerate() {
            let mtime = match std::fs::metadata(&record.location).and_then(|m| m.modified()) {
                Ok(m) => m.duration_since(std::time::UNIX_EPOCH).map(|d| d.as_secs_f64()).unwrap_or(0.0),
                Err(e) => {
                    warn!(file = %record.location.display(), error = %e, "failed to stat uploaded file, skipping");
                    continue;
                }
            };
            if record.is_stale(mtime) {
                let is_plain_text = !needs_document_analyzer(&record.location);
                sources.push((record.location.to_string_lossy().to_string(), is_plain_text));
                stale_indices.push(idx);
            }
        }

        if stale_indices.is_empty() {
            tasks.complete(task_id, serde_json::json!({"ingested_files": 0}), crate::unix_timestamp());
            return Ok(());
        }

        let corpus = self.build_ingestion_corpus(&sources).await;
        if corpus.trim().is_empty() {
            let message = "ingestion corpus was empty after assembly";
            tasks.transition(task_id, TaskStatus::Error, message, crate::unix_timestamp());
            return Err(PipelineError::Other(message.to_string()));
        }

        let chunks = chunk_text(&corpus, &workspace.name)?;
        let small_chunks: Vec<&Chunk> = chunks.iter().filter(|c| c.granularity == Granularity::Small).collect();
        let small_texts: Vec<String> = small_chunks.iter().map(|c| c.text.clone()).collect();

        tasks.transition(task_id, TaskStatus::Processing, "embedding chunks", crate::unix_timestamp());
        let vectors = self.embedder.encode(&small_texts).await.map_err(|e| PipelineError::BackendUnavailable(e.to_string()))?;

        let small_index = VectorIndex::new(self.embedder.dimension());
        for (chunk, vector) in small_chunks.iter().zip(vectors) {
            small_index
                .upsert(Entry { id: chunk.id.clone(), vector, payload: chunk.text.clone(), metadata: Default::default() })
                .map_err(|e| PipelineError::Other(e.to_string()))?;
        }

        let big_chunks: Vec<Chunk> = chunks.into_iter().filter(|c| c.granularity == Granularity::Big).collect();

        tasks.transition(task_id, TaskStatus::Processing, "building knowledge graph", crate::unix_timestamp());
        self.graph_builder.build(store, user_intent, &big_chunks, &small_index, None).await?;
        store.save(workspace.graph_db_dir().join("graph.json"))?;

        let sync_time = crate::unix_timestamp();
        for idx in &stale_indices {
            if let Some(record) = files.get_mut(*idx) {
                record.last_graph_sync = sync_time;
                record.status = FileStatus::Indexed;
            }
        }
        workspace.save_files(&files)?;

        info!(files = stale_indices.len(), node_count = store.len(), "ingestion into knowledge graph complete");
        tasks.complete(task_id, serde_json::json!({"ingested_files": stale_indices.len()}), sync_time);
        Ok(())
    }

    /// Shallow-clone `repo_url`, classify and score its files, analyze the
    /// top `max_files` source files via the document analyzer, assemble a
    /// single contextual report, then run the standard generate pipeline
    /// in direct-analysis mode (the report is already the full context, so
    /// graph retrieval is skipped). Drives `task_id` the same way
    /// [`PipelineOrchestrator::ingest_workspace`] does.
    pub async fn analyze_repo(
        &self,
        store: &KnowledgeStore,
        chunks: &dyn ChunkLookup,
        tasks: &TaskTracker,
        task_id: &str,
        repo_url: &str,
        max_files: usize,
    ) -> Result<LoopOutcome> {
        tasks.transition(task_id, TaskStatus::Processing, "cloning repository", crate::unix_timestamp());
        let repo_path = self.git_loader.clone_repo(repo_url, false).await?;

        let classified = self.git_loader.classify_files(&repo_path)?;
        let tree = self.git_loader.generate_tree_structure(&repo_path).unwrap_or_default();
        let selected = self.git_loader.smart_select_files(&classified.source_code, max_files);

        tasks.transition(task_id, TaskStatus::Processing, format!("analyzing {} files", selected.len()), crate::unix_timestamp());
        let budget = Self::direct_analysis_budget(selected.len());

        let mut report = format!("Repository layout:\n{}\n\n", tree);
        for path in &selected {
            let source = path.to_string_lossy().to_string();
            match self.document_analyzer.analyze(&source, None, Some(budget)).await {
                Ok(summary) => report.push_str(&format!("## {}\n{}\n\n", path.display(), summary)),
                Err(e) => warn!(file = %source, error = %e, "repo file analysis failed, skipping"),
            }
        }

        tasks.transition(task_id, TaskStatus::Processing, "generating diagram from repo analysis", crate::unix_timestamp());
        let outcome = self.generate(store, chunks, &report, false, true, 0.5, None).await?;

        tasks.complete(
            task_id,
            serde_json::json!({"code": outcome.code, "error": outcome.error, "revisions": outcome.revisions}),
            crate::unix_timestamp(),
        );
        Ok(outcome)
    }
}

fn needs_document_analyzer(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| ANALYZER_REQUIRED_EXTS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct AlwaysValid;

    #[async_trait]
    impl Validator for AlwaysValid {
        async fn check(&self, _code: &str) -> ValidationOutcome {
            ValidationOutcome::ok()
        }
    }

    struct AlwaysInvalid;

    #[async_trait]
    impl Validator for AlwaysInvalid {
        async fn check(&self, _code: &str) -> ValidationOutcome {
            ValidationOutcome::fail("renderer rejected the diagram")
        }
    }

    #[test]
    fn test_direct_analysis_budget_shrinks_with_file_count() {
        assert_eq!(PipelineOrchestrator::direct_analysis_budget(1), 1200);
        assert_eq!(PipelineOrchestrator::direct_analysis_budget(4), 300);
        assert_eq!(PipelineOrchestrator::direct_analysis_budget(0), 1200);
    }

    #[tokio::test]
    async fn test_always_valid_validator_passes_immediately() {
        let validator = AlwaysValid;
        assert!(validator.check("flowchart TD\n    A --> B").await.valid);
    }

    #[tokio::test]
    async fn test_always_invalid_validator_fails() {
        let validator = AlwaysInvalid;
        assert!(!validator.check("anything").await.valid);
    }

    #[test]
    fn test_needs_document_analyzer_routes_images_and_binary_docs() {
        assert!(needs_document_analyzer(Path::new("diagram.png")));
        assert!(needs_document_analyzer(Path::new("spec.pdf")));
        assert!(!needs_document_analyzer(Path::new("notes.md")));
        assert!(!needs_document_analyzer(Path::new("main.rs")));
    }
}
