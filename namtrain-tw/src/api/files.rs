//! File upload, inspection and latency detection handlers

use axum::{
    extract::{Multipart, Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::audio::{self, wav};
use crate::error::{ApiError, ApiResult};
use crate::models::FileRecord;
use crate::AppState;

/// POST /files response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub file_id: String,
    pub filename: String,
    pub size_bytes: u64,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// POST /files/detect-latency request
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LatencyDetectionRequest {
    pub input_file_id: String,
    pub output_file_id: String,
}

/// POST /files
///
/// Multipart upload; the audio lands under a generated identifier with a
/// normalized extension.
pub async fn upload_file(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Json<UploadResponse>> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Malformed multipart body: {}", e)))?
    {
        let Some(filename) = field.file_name().map(str::to_string) else {
            continue;
        };
        let content = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(format!("Upload read failed: {}", e)))?;

        let record = state.files.store_upload(&filename, &content).await?;
        return Ok(Json(UploadResponse {
            file_id: record.file_id,
            filename: record.original_filename,
            size_bytes: record.size_bytes,
            created_at: record.created_at,
        }));
    }

    Err(ApiError::BadRequest(
        "Multipart body contains no file field".to_string(),
    ))
}

/// GET /files/:file_id/inspect
///
/// Static format inspection of a stored WAV, with trainer-suitability flags.
pub async fn inspect_file(
    State(state): State<AppState>,
    Path(file_id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let record = lookup_on_disk(&state, &file_id).await?;

    let info = wav::inspect(&record.stored_path)
        .map_err(|e| ApiError::BadRequest(format!("Cannot inspect {}: {}", file_id, e)))?;
    let bit_depth = info.bits_per_sample;

    Ok(Json(json!({
        "fileId": record.file_id,
        "filename": record.original_filename,
        "format": {
            "container": "wav",
            "sampleRate": info.sample_rate,
            "bitDepth": bit_depth,
            "channels": info.channels,
            "durationSeconds": info.duration_seconds(),
            "numSamples": info.num_frames,
        },
        "validForNam": {
            "sampleRateOk": info.sample_rate == 48_000,
            "bitDepthOk": matches!(bit_depth, 16 | 24 | 32),
            "channelsOk": info.channels == 1,
        },
    })))
}

/// POST /files/detect-latency
///
/// Cross-correlate two uploaded files and report the measured offset.
pub async fn detect_latency(
    State(state): State<AppState>,
    Json(request): Json<LatencyDetectionRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let input = lookup_on_disk(&state, &request.input_file_id).await?;
    let output = lookup_on_disk(&state, &request.output_file_id).await?;

    // Decode and correlation are CPU-bound over potentially minutes of
    // audio, so they run off the async executor
    let report = tokio::task::spawn_blocking(move || -> Result<_, ApiError> {
        let input_audio = wav::read(&input.stored_path)
            .map_err(|e| ApiError::BadRequest(format!("Cannot decode input: {}", e)))?;
        let output_audio = wav::read(&output.stored_path)
            .map_err(|e| ApiError::BadRequest(format!("Cannot decode output: {}", e)))?;
        Ok(audio::detect_latency(
            &input_audio.channel(0),
            &output_audio.channel(0),
            input_audio.sample_rate,
            output_audio.sample_rate,
        )?)
    })
    .await
    .map_err(|e| ApiError::Internal(format!("Latency detection task failed: {}", e)))??;

    Ok(Json(json!({
        "inputFileId": request.input_file_id,
        "outputFileId": request.output_file_id,
        "latencySamples": report.latency_samples,
        "latencyMs": report.latency_ms,
        "confidence": report.confidence,
        "alignmentPreview": report.alignment_preview,
    })))
}

/// Fetch a file record and confirm its backing file still exists
async fn lookup_on_disk(state: &AppState, file_id: &str) -> ApiResult<FileRecord> {
    let record = state
        .files
        .get(file_id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("File not found: {}", file_id)))?;
    if !record.stored_path.exists() {
        return Err(ApiError::NotFound(format!(
            "File missing on disk: {}",
            file_id
        )));
    }
    Ok(record)
}

/// Build file routes
pub fn file_routes() -> Router<AppState> {
    Router::new()
        .route("/files", post(upload_file))
        .route("/files/:file_id/inspect", get(inspect_file))
        .route("/files/detect-latency", post(detect_latency))
}
