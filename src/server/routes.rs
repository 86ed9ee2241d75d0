//! Request handlers

use super::{ApiError, AppState};
use crate::document::FragmentSummary;
use crate::orchestrator::{Task, TaskReport};
use crate::retrieval::Query;
use axum::extract::{Query as Params, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Serialize)]
pub struct RootResponse {
    pub status: &'static str,
    pub message: &'static str,
    pub version: &'static str,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub environment: String,
    pub debug: bool,
    pub documents: usize,
    pub fragments: usize,
}

#[derive(Debug, Deserialize)]
pub struct AnalyzeParams {
    pub document_id: Option<String>,
    pub query: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RetrieveParams {
    pub query: String,
    pub limit: Option<usize>,
}

#[derive(Serialize)]
pub struct RetrieveResponse {
    pub query: String,
    pub limit: usize,
    pub results: Vec<FragmentSummary>,
    pub status: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct TaskRequest {
    pub task: String,
    #[serde(default)]
    pub context: Map<String, Value>,
}

pub async fn root() -> Json<RootResponse> {
    Json(RootResponse {
        status: "healthy",
        message: "Intelligent Enterprise Document Processing API",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let corpus = state.engine.corpus();
    Json(HealthResponse {
        status: "healthy",
        environment: state.environment.clone(),
        debug: state.debug,
        documents: corpus.document_count(),
        fragments: corpus.fragment_count(),
    })
}

/// Answer `query` within one document, or summarize it when no query is given
pub async fn analyze(
    State(state): State<AppState>,
    Params(params): Params<AnalyzeParams>,
) -> Result<Json<TaskReport>, ApiError> {
    let query = params.query.unwrap_or_default();
    let description = match (&params.document_id, query.trim().is_empty()) {
        (Some(id), true) => format!("Analyze document {}", id),
        _ => query.clone(),
    };

    let mut task = Task::new(description).with("query", query);
    if let Some(id) = params.document_id {
        task = task.with("document_id", id);
    }

    run(&state, task).await
}

pub async fn retrieve(
    State(state): State<AppState>,
    Params(params): Params<RetrieveParams>,
) -> Result<Json<RetrieveResponse>, ApiError> {
    let limit = params.limit.unwrap_or(state.default_limit);
    let fragments = state
        .engine
        .retrieve(&Query::new(params.query.clone(), limit))
        .await?;

    Ok(Json(RetrieveResponse {
        query: params.query,
        limit,
        results: fragments.iter().map(FragmentSummary::from).collect(),
        status: "success",
    }))
}

pub async fn create_task(
    State(state): State<AppState>,
    Json(request): Json<TaskRequest>,
) -> Result<Json<TaskReport>, ApiError> {
    run(&state, Task::new(request.task).with_context(request.context)).await
}

async fn run(state: &AppState, task: Task) -> Result<Json<TaskReport>, ApiError> {
    let report = state.engine.dispatch(task).await;
    Ok(Json(report.into_result()?))
}
