//! Shared application state handed to every axum handler.
//!
//! Grounded on `orchestrator::api::routes::AppState` — a small `Clone`
//! struct of `Arc`s passed into `Router::with_state`.

use crate::config::AppConfig;
use crate::error::CliError;
use diagram_router::{CodeGenerator, CodeReviser, Router as DiagramRouter};
use ingest::document_analyzer::DocumentAnalyzer;
use ingest::embedder::{Embedder, RemoteEmbedder};
use ingest::git_loader::GitLoader;
use knowledge_graph::{BuilderConfig, ChunkLookup, GraphBuilder, KnowledgeStore, Retriever};
use llm::remote::OpenAiCompatibleClient;
use llm::RemoteLlmConfig;
use parking_lot::RwLock;
use pipeline::{PipelineOrchestrator, ProjectWorkspace, RemoteValidator, TaskTracker};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;
use vector_index::experience::load_records;
use vector_index::ExperienceMemory;

/// A project workspace's in-memory working set, hot-swapped as requests
/// target different workspaces — the Knowledge Store plus a lookup from
/// chunk id to chunk text, matching `ProjectWorkspace::switch_project`'s
/// in-memory counterpart in spec.md §4.12.
pub struct WorkspaceSession {
    pub workspace: ProjectWorkspace,
    pub store: KnowledgeStore,
    pub chunk_text: RwLock<HashMap<String, String>>,
}

impl ChunkLookup for WorkspaceSession {
    fn text_of(&self, chunk_id: &str) -> Option<String> {
        self.chunk_text.read().get(chunk_id).cloned()
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub orchestrator: Arc<PipelineOrchestrator>,
    pub sessions: Arc<RwLock<HashMap<String, Arc<WorkspaceSession>>>>,
    pub tasks: Arc<TaskTracker>,
}

impl AppState {
    pub fn new(config: AppConfig, orchestrator: PipelineOrchestrator) -> Self {
        Self {
            config: Arc::new(config),
            orchestrator: Arc::new(orchestrator),
            sessions: Arc::new(RwLock::new(HashMap::new())),
            tasks: Arc::new(TaskTracker::new()),
        }
    }

    /// Open (creating on first touch) the session for workspace `name`.
    pub fn session(&self, name: &str) -> pipeline::Result<Arc<WorkspaceSession>> {
        if let Some(session) = self.sessions.read().get(name) {
            return Ok(session.clone());
        }

        let workspace = match ProjectWorkspace::open(&self.config.projects_root, name) {
            Ok(w) => w,
            Err(pipeline::PipelineError::NotFound(_)) => ProjectWorkspace::create(&self.config.projects_root, name)?,
            Err(e) => return Err(e),
        };

        let graph_path = workspace.graph_db_dir().join("graph.json");
        let store = KnowledgeStore::load(&graph_path).unwrap_or_else(|_| KnowledgeStore::new());

        let session = Arc::new(WorkspaceSession { workspace, store, chunk_text: RwLock::new(HashMap::new()) });
        self.sessions.write().insert(name.to_string(), session.clone());
        Ok(session)
    }
}

/// Load `path`'s experience records, embed each question, and hydrate a
/// fresh [`ExperienceMemory`] — the caller-side half of the cold-start
/// rehydration this crate leaves to its users, since `vector-index` has no
/// embedder of its own.
async fn rehydrate_experience_memory(path: std::path::PathBuf, dimension: usize, embedder: &dyn Embedder) -> ExperienceMemory {
    let memory = ExperienceMemory::new(dimension, path.clone());
    let records = match load_records(&path) {
        Ok(records) => records,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to load experience records, starting empty");
            return memory;
        }
    };
    if records.is_empty() {
        return memory;
    }

    let queries: Vec<String> = records.iter().map(|r| r.q.clone()).collect();
    match embedder.encode(&queries).await {
        Ok(vectors) => {
            for (record, vector) in records.into_iter().zip(vectors) {
                if let Err(e) = memory.hydrate(&record, vector) {
                    warn!(error = %e, "failed to hydrate experience record, skipping");
                }
            }
        }
        Err(e) => warn!(path = %path.display(), error = %e, "failed to embed experience records at startup, starting empty"),
    }

    memory
}

/// Construct the full dependency graph (LLM client, embedder, router,
/// generator, reviser, retriever, validator, document analyzer) from
/// config, wiring it into one [`PipelineOrchestrator`].
pub async fn build_orchestrator(config: &AppConfig) -> Result<PipelineOrchestrator, CliError> {
    let llm_config = RemoteLlmConfig::new(config.llm.api_key.clone(), config.llm.base_url.clone(), config.llm.model.clone())
        .with_max_retries(config.network_max_retries);
    let client: Arc<dyn llm::LlmClient> = Arc::new(OpenAiCompatibleClient::new(llm_config));

    let embedder: Arc<dyn Embedder> = Arc::new(
        RemoteEmbedder::new(config.embedder.base_url.clone(), config.embedder.model.clone(), config.embedder.dimension)
            .map_err(|e| CliError::Startup(format!("embedder configuration invalid: {}", e)))?,
    );

    let router_memory_path = config.projects_root.join("_router_memory.json");
    let mistake_memory_path = config.projects_root.join("_mistake_memory.json");

    let router_experience = rehydrate_experience_memory(router_memory_path, config.embedder.dimension, embedder.as_ref()).await;
    let mistakes = rehydrate_experience_memory(mistake_memory_path, config.embedder.dimension, embedder.as_ref()).await;

    let graph_builder = GraphBuilder::new(
        client.clone(),
        embedder.clone(),
        BuilderConfig { worker_pool: config.concurrency_pool_size, ..BuilderConfig::default() },
    );
    let git_loader = GitLoader::new(config.repo_clone_dir.clone())
        .map_err(|e| CliError::Startup(format!("git loader base dir invalid: {}", e)))?;

    Ok(PipelineOrchestrator {
        router: DiagramRouter::new(client.clone(), embedder.clone(), router_experience),
        generator: CodeGenerator::new(client.clone()),
        reviser: CodeReviser::new(client.clone(), embedder.clone(), mistakes),
        retriever: Retriever::new(embedder.clone()),
        validator: Arc::new(RemoteValidator::new(config.validator_endpoint.clone())),
        document_analyzer: DocumentAnalyzer::new(client),
        embedder,
        graph_builder,
        git_loader,
    })
}
