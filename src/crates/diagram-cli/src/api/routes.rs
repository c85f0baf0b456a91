//! HTTP route definitions.
//!
//! Grounded on `orchestrator::api::routes::create_router` (a flat
//! `Router::new().route(...).with_state(app_state)` builder) and
//! `orchestrator::api::handlers::health` for the health-check shape.

use crate::api::state::AppState;
use crate::error::ApiError;
use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use diagram_router::templates::DiagramType;
use serde::{Deserialize, Serialize};

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/workspaces/:name/generate", post(generate))
        .route("/api/v1/workspaces/:name/fix", post(fix))
        .route("/api/v1/workspaces/:name/optimize", post(optimize))
        .route("/api/v1/workspaces/:name/ingest", post(ingest))
        .route("/api/v1/workspaces/:name/repo", post(analyze_repo))
        .route("/api/v1/tasks/:task_id", get(get_task))
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

#[derive(Debug, Deserialize)]
struct GenerateRequest {
    query: String,
    #[serde(default = "default_true")]
    use_graph: bool,
    #[serde(default = "default_true")]
    use_experience: bool,
    #[serde(default = "default_richness")]
    richness: f32,
    diagram_type: Option<String>,
}

fn default_true() -> bool {
    true
}

fn default_richness() -> f32 {
    0.5
}

#[derive(Debug, Serialize)]
struct GenerateResponse {
    code: String,
    error: Option<String>,
    revisions: usize,
}

async fn generate(State(state): State<AppState>, Path(name): Path<String>, Json(request): Json<GenerateRequest>) -> Result<Json<GenerateResponse>, ApiError> {
    let session = state.session(&name)?;
    let explicit_type = request.diagram_type.as_deref().and_then(DiagramType::parse);

    let outcome = state
        .orchestrator
        .generate(&session.store, session.as_ref(), &request.query, request.use_graph, request.use_experience, request.richness, explicit_type)
        .await?;

    Ok(Json(GenerateResponse { code: outcome.code, error: outcome.error, revisions: outcome.revisions }))
}

#[derive(Debug, Deserialize)]
struct FixRequest {
    code: String,
    error: String,
}

async fn fix(State(state): State<AppState>, Path(_name): Path<String>, Json(request): Json<FixRequest>) -> Json<GenerateResponse> {
    let history = vec![diagram_router::reviser::FailedAttempt { code: request.code.clone(), error: request.error }];
    let revised = state.orchestrator.reviser.revise_code(&history[0].code, &history[0].error, &[], true).await;

    match revised {
        Ok(code) => {
            let outcome = state.orchestrator.validate_revise(code, true).await;
            Json(GenerateResponse { code: outcome.code, error: outcome.error, revisions: outcome.revisions })
        }
        Err(e) => Json(GenerateResponse { code: request.code, error: Some(e.to_string()), revisions: 0 }),
    }
}

#[derive(Debug, Deserialize)]
struct OptimizeRequest {
    code: String,
    instruction: String,
}

async fn optimize(State(state): State<AppState>, Path(_name): Path<String>, Json(request): Json<OptimizeRequest>) -> Result<Json<GenerateResponse>, ApiError> {
    let outcome = state
        .orchestrator
        .optimize(&request.code, &request.instruction, true)
        .await
        .map_err(ApiError::from)?;

    Ok(Json(GenerateResponse { code: outcome.code, error: outcome.error, revisions: outcome.revisions }))
}

#[derive(Debug, Deserialize, Default)]
struct IngestRequest {
    #[serde(default)]
    user_intent: String,
}

#[derive(Debug, Serialize)]
struct TaskAccepted {
    task_id: String,
}

/// Scan the workspace's uploads for stale/new files and run them through
/// the Graph Builder. Long-running: dispatched to a background task, the
/// response carries only the task id for polling via `/tasks/:task_id`.
async fn ingest(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(request): Json<IngestRequest>,
) -> Result<Json<TaskAccepted>, ApiError> {
    let session = state.session(&name)?;
    let task_id = uuid::Uuid::new_v4().to_string();
    state.tasks.start(&task_id, "queued", pipeline::unix_timestamp());

    let orchestrator = state.orchestrator.clone();
    let tasks = state.tasks.clone();
    let spawned_task_id = task_id.clone();
    tokio::spawn(async move {
        let result = orchestrator
            .ingest_workspace(&session.workspace, &session.store, &tasks, &spawned_task_id, &request.user_intent)
            .await;
        if let Err(e) = result {
            tasks.transition(&spawned_task_id, pipeline::TaskStatus::Error, e.to_string(), pipeline::unix_timestamp());
        }
    });

    Ok(Json(TaskAccepted { task_id }))
}

#[derive(Debug, Deserialize)]
struct RepoAnalysisRequest {
    repo_url: String,
    max_files: Option<usize>,
}

/// Clone a repository, analyze its top-scored source files, and run the
/// standard generate pipeline over the assembled report. Also dispatched
/// to a background task.
async fn analyze_repo(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(request): Json<RepoAnalysisRequest>,
) -> Result<Json<TaskAccepted>, ApiError> {
    let session = state.session(&name)?;
    let max_files = request.max_files.unwrap_or(state.config.max_repo_analysis_files);
    let task_id = uuid::Uuid::new_v4().to_string();
    state.tasks.start(&task_id, "queued", pipeline::unix_timestamp());

    let orchestrator = state.orchestrator.clone();
    let tasks = state.tasks.clone();
    let spawned_task_id = task_id.clone();
    tokio::spawn(async move {
        let result = orchestrator
            .analyze_repo(&session.store, session.as_ref(), &tasks, &spawned_task_id, &request.repo_url, max_files)
            .await;
        if let Err(e) = result {
            tasks.transition(&spawned_task_id, pipeline::TaskStatus::Error, e.to_string(), pipeline::unix_timestamp());
        }
    });

    Ok(Json(TaskAccepted { task_id }))
}

async fn get_task(State(state): State<AppState>, Path(task_id): Path<String>) -> Result<Json<pipeline::TaskState>, ApiError> {
    let task = state.tasks.get(&task_id).map_err(ApiError::from)?;
    Ok(Json(task))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_richness_is_midband() {
        assert_eq!(default_richness(), 0.5);
    }
}
