//! Training run API handlers

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{ApiError, ApiResult};
use crate::models::{RunStatus, TrainingConfig, TrainingMetadata, TrainingRun};
use crate::worker;
use crate::AppState;

/// POST /training-runs request
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRunRequest {
    pub name: String,
    pub description: Option<String>,
    pub input_file_id: String,
    pub output_file_id: String,
    /// Measured latency in samples from the detect-latency endpoint
    #[serde(default)]
    pub latency_samples: i64,
    pub training: TrainingConfig,
    pub metadata: Option<TrainingMetadata>,
}

/// POST /training-runs response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRunResponse {
    pub run_id: String,
    pub status: RunStatus,
}

/// GET /training-runs query parameters
#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub status: Option<RunStatus>,
    pub limit: Option<usize>,
}

/// POST /training-runs
///
/// Validates the referenced uploads, persists the QUEUED record, hands the
/// run to a background worker and returns immediately.
pub async fn create_training_run(
    State(state): State<AppState>,
    Json(request): Json<CreateRunRequest>,
) -> ApiResult<Json<CreateRunResponse>> {
    let input = state
        .files
        .get(&request.input_file_id)
        .await
        .ok_or_else(|| ApiError::NotFound("One or both files not found".to_string()))?;
    let output = state
        .files
        .get(&request.output_file_id)
        .await
        .ok_or_else(|| ApiError::NotFound("One or both files not found".to_string()))?;
    if !input.stored_path.exists() || !output.stored_path.exists() {
        return Err(ApiError::NotFound(
            "One or both files missing on disk".to_string(),
        ));
    }

    let mut training = request.training;
    if request.latency_samples != 0 {
        training.delay_samples = request.latency_samples;
    }
    let run = TrainingRun::new(request.name, request.description, training, request.metadata);
    let run_id = run.run_id.clone();
    let status = run.status;

    state.store.create(run).await?;

    tracing::info!(run_id = %run_id, "Training run created");
    worker::spawn(state.clone(), run_id.clone(), input, output);

    Ok(Json(CreateRunResponse { run_id, status }))
}

/// GET /training-runs/:run_id
pub async fn get_training_run(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let run = state
        .store
        .get(&run_id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("Run not found: {}", run_id)))?;

    let model_path = state.store.resolve_model_path(&run_id).await;
    let nam_url = model_path
        .as_ref()
        .map(|_| format!("/api/training-runs/{}/model", run_id));
    let nam_filename = model_path
        .as_ref()
        .and_then(|p| p.file_name())
        .map(|n| n.to_string_lossy().into_owned());

    Ok(Json(json!({
        "runId": run.run_id,
        "name": run.name,
        "description": run.description,
        "status": run.status,
        "createdAt": run.created_at,
        "startedAt": run.started_at,
        "updatedAt": run.updated_at,
        "completedAt": run.completed_at,
        "progress": run.progress,
        "training": run.training,
        "metadata": run.metadata,
        "metrics": run.metrics_history,
        "metricsSummary": run.metrics,
        "logs": run.logs,
        "modelPath": model_path.as_ref().or(run.model_path.as_ref()),
        "namUrl": nam_url,
        "namFilename": nam_filename,
        "error": run.error,
    })))
}

/// GET /training-runs
pub async fn list_training_runs(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Json<serde_json::Value> {
    let limit = params.limit.unwrap_or(100);
    let runs = state.store.list(params.status, limit).await;

    let items: Vec<serde_json::Value> = runs
        .iter()
        .map(|run| {
            let nam_filename = run
                .model_path
                .as_ref()
                .and_then(|p| p.file_name())
                .map(|n| n.to_string_lossy().into_owned());
            let nam_url = run
                .model_path
                .as_ref()
                .map(|_| format!("/api/training-runs/{}/model", run.run_id));
            json!({
                "runId": run.run_id,
                "name": run.name,
                "status": run.status,
                "createdAt": run.created_at,
                "completedAt": run.completed_at,
                "architecture": run.training.architecture,
                "device": run.training.device,
                "qualityScore": run.metrics.as_ref().map(|m| m.quality_score),
                "namStatus": if run.model_path.is_some() { "NAM CREATED" } else { "" },
                "namUrl": nam_url,
                "namFilename": nam_filename,
            })
        })
        .collect();

    Json(json!({ "items": items }))
}

/// GET /training-runs/:run_id/metrics
///
/// 202 Accepted while the summary has not been written yet.
pub async fn get_training_run_metrics(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> ApiResult<Response> {
    let run = state
        .store
        .get(&run_id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("Run not found: {}", run_id)))?;

    match run.metrics {
        None => Ok((
            StatusCode::ACCEPTED,
            Json(json!({ "detail": "Metrics not ready yet" })),
        )
            .into_response()),
        Some(metrics) => Ok(Json(json!({
            "runId": run_id,
            "metrics": metrics,
            "metricsHistory": run.metrics_history,
        }))
        .into_response()),
    }
}

/// GET /training-runs/:run_id/model
///
/// Download the exported artifact as an opaque byte stream.
pub async fn download_model(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> ApiResult<Response> {
    state
        .store
        .get(&run_id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("Run not found: {}", run_id)))?;

    let model_path = state
        .store
        .resolve_model_path(&run_id)
        .await
        .ok_or_else(|| {
            ApiError::NotFound(format!("Model file not available for run: {}", run_id))
        })?;

    let filename = model_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "model.nam".to_string());
    let content = tokio::fs::read(&model_path).await?;

    Ok((
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        content,
    )
        .into_response())
}

/// POST /training-runs/:run_id/stop
///
/// Accepts the stop request and flips the record toward CANCELLED. In-flight
/// training is not preempted; the marker simply wins the terminal write.
pub async fn stop_training_run(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let run = state
        .store
        .get(&run_id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("Run not found: {}", run_id)))?;

    if run.is_terminal() {
        return Err(ApiError::BadRequest(format!(
            "Run already in terminal state: {:?}",
            run.status
        )));
    }

    let run = state
        .store
        .modify(&run_id, |r| {
            if !r.transition_to(RunStatus::Cancelled) {
                return false;
            }
            r.append_log("INFO", "Stop requested");
            true
        })
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Run not found: {}", run_id)))?;

    tracing::info!(run_id = %run_id, "Training run cancelled");
    Ok(Json(json!({ "runId": run_id, "status": run.status })))
}

/// DELETE /training-runs/:run_id
///
/// Removes the run record and its workspace; reports per-path outcomes.
pub async fn delete_training_run(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let report = state.store.delete(&run_id).await?;
    Ok(Json(json!({
        "runId": run_id,
        "removedPaths": report.removed_paths,
        "failures": report.failures,
    })))
}

/// Build training run routes
pub fn run_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/training-runs",
            post(create_training_run).get(list_training_runs),
        )
        .route(
            "/training-runs/:run_id",
            get(get_training_run).delete(delete_training_run),
        )
        .route("/training-runs/:run_id/metrics", get(get_training_run_metrics))
        .route("/training-runs/:run_id/model", get(download_model))
        .route("/training-runs/:run_id/stop", post(stop_training_run))
}
