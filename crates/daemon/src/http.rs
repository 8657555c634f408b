//! HTTP transport over [`ForgeService`]. Handlers only decode, delegate and
//! map errors.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use mcpforge_core::api::{
    DeployRequest, DeployResponse, ErrorBody, GenerateResponse, LogResponse, PreviewResponse,
    StopRequest, StopResponse,
};
use mcpforge_core::model::{PreprocessJob, ProcessInfo, RegistryEntry, WorkflowSpec};
use mcpforge_core::ForgeError;
use thiserror::Error;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::orchestrator::{artifact_path, ForgeService};

/// Shared handler state.
pub type AppState = Arc<ForgeService>;

/// All routes, with request tracing and permissive CORS.
pub fn router(svc: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/generate_preview", post(generate_preview))
        .route("/api/generate", post(generate))
        .route("/api/deploy", post(deploy))
        .route("/api/stop", post(stop))
        .route("/api/servers", get(servers))
        .route("/api/processes", get(processes))
        .route("/api/logs/{name}/{version}", get(logs))
        .route("/api/preprocess/{id}", get(preprocess))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(svc)
}

/// Handler failure, rendered as an [`ErrorBody`].
#[derive(Debug, Error)]
pub enum ApiError {
    /// Undecodable request body.
    #[error("{0}")]
    BadRequest(String),
    /// Failure of the underlying operation.
    #[error(transparent)]
    Forge(#[from] ForgeError),
}

impl From<JsonRejection> for ApiError {
    fn from(e: JsonRejection) -> Self {
        ApiError::BadRequest(e.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, kind) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg, "invalid"),
            ApiError::Forge(e) => {
                let status = match &e {
                    ForgeError::Validation(_) | ForgeError::InvalidPath(_) => StatusCode::BAD_REQUEST,
                    ForgeError::NotFound(_) | ForgeError::UnknownProcess(_) => StatusCode::NOT_FOUND,
                    ForgeError::Synthesis { .. } => StatusCode::BAD_GATEWAY,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                if status.is_server_error() && status != StatusCode::BAD_GATEWAY {
                    tracing::error!(error = %e, "request failed");
                }
                let kind = e.category();
                let error = match e {
                    // Surface the backend's own text unchanged.
                    ForgeError::Synthesis { body, .. } => body,
                    other => other.to_string(),
                };
                (status, error, kind)
            }
        };
        let body = ErrorBody {
            error,
            kind: kind.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

async fn healthz() -> &'static str {
    "ok"
}

async fn generate_preview(
    State(svc): State<AppState>,
    req: Result<Json<WorkflowSpec>, JsonRejection>,
) -> ApiResult<PreviewResponse> {
    let Json(spec) = req?;
    let preview = svc.generate_preview(&spec).await?;
    Ok(Json(PreviewResponse { preview }))
}

async fn generate(
    State(svc): State<AppState>,
    req: Result<Json<WorkflowSpec>, JsonRejection>,
) -> ApiResult<GenerateResponse> {
    let Json(spec) = req?;
    Ok(Json(svc.generate(&spec).await?))
}

async fn deploy(
    State(svc): State<AppState>,
    req: Result<Json<DeployRequest>, JsonRejection>,
) -> ApiResult<DeployResponse> {
    let Json(req) = req?;
    let path = artifact_path(&req.path)?;
    let pid = svc.deploy(&path).await?;
    Ok(Json(DeployResponse { pid }))
}

async fn stop(
    State(svc): State<AppState>,
    req: Result<Json<StopRequest>, JsonRejection>,
) -> ApiResult<StopResponse> {
    let Json(req) = req?;
    svc.stop(req.pid).await?;
    Ok(Json(StopResponse { stopped: true }))
}

async fn servers(State(svc): State<AppState>) -> ApiResult<Vec<RegistryEntry>> {
    Ok(Json(svc.list().await?))
}

async fn processes(State(svc): State<AppState>) -> Json<Vec<ProcessInfo>> {
    Json(svc.processes().await)
}

async fn logs(
    State(svc): State<AppState>,
    Path((name, version)): Path<(String, String)>,
) -> ApiResult<LogResponse> {
    let log = svc.read_log(&name, &version).await?;
    Ok(Json(LogResponse { log }))
}

async fn preprocess(
    State(svc): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<PreprocessJob> {
    Ok(Json(svc.preprocess_status(&id).await?))
}
