//! Run orchestrator
//!
//! One background task per run, spawned fire-and-forget at creation time.
//! Every status write, here and in the stop handler, goes through the
//! store's atomic mutation, so a concurrent stop and the task's own
//! terminal write resolve to whichever landed first. Errors stay inside the
//! task and surface as the run's FAILED state, never as a crash.

use crate::audio::repair;
use crate::models::{FileRecord, MetricsSummary, RunStatus};
use crate::trainer::TrainJob;
use crate::AppState;
use anyhow::Context;
use std::path::Path;
use tracing::{error, info, warn};

/// Spawn the background training task for a freshly created run
pub fn spawn(state: AppState, run_id: String, input: FileRecord, output: FileRecord) {
    tokio::spawn(async move {
        info!(run_id = %run_id, "Training task started");
        if let Err(e) = run(&state, &run_id, &input, &output).await {
            mark_failed(&state, &run_id, &e).await;
        }
    });
}

async fn run(
    state: &AppState,
    run_id: &str,
    input: &FileRecord,
    output: &FileRecord,
) -> anyhow::Result<()> {
    let Some(run) = state
        .store
        .modify(run_id, |r| {
            if !r.transition_to(RunStatus::Running) {
                return false;
            }
            r.started_at = Some(namtrain_common::time::now());
            r.append_log("INFO", "Training started");
            true
        })
        .await?
    else {
        error!(run_id, "Run record missing, nothing to train");
        return Ok(());
    };
    if run.status != RunStatus::Running {
        info!(run_id, status = ?run.status, "Run already terminal, not starting");
        return Ok(());
    }

    let run_dir = state.store.run_dir(run_id);
    prepare_workspace(&run_dir, input, output)
        .await
        .context("Workspace preparation failed")?;

    let job = TrainJob {
        run_id: run_id.to_string(),
        name: run.name.clone(),
        run_dir: run_dir.clone(),
        config: run.training.clone(),
        latency_samples: run.training.delay_samples,
        metadata: run.metadata.clone(),
    };
    state.trainer.train(&job).await?;

    // The terminal write goes through the same atomic mutation: a stop
    // request that landed during training wins, and a terminal state is
    // never overwritten.
    let Some(run) = state
        .store
        .modify(run_id, |r| {
            if !r.transition_to(RunStatus::Completed) {
                return false;
            }
            r.model_path = crate::export::find_latest_export(&run_dir);
            r.metrics = Some(MetricsSummary::placeholder());
            r.append_log("INFO", "Training completed");
            true
        })
        .await?
    else {
        warn!(run_id, "Run deleted while training, discarding result");
        return Ok(());
    };
    if run.status != RunStatus::Completed {
        info!(run_id, status = ?run.status, "Run already terminal, leaving result untouched");
        return Ok(());
    }

    // Idempotent cache-fill; also re-validates what we just wrote
    state.store.resolve_model_path(run_id).await;

    info!(run_id, "Training completed");
    Ok(())
}

/// Prepare the run workspace: copy both inputs in, then repair each copy
///
/// The input file lands twice: under the fixed name `input.wav` the trainer
/// expects and under its original basename for operator convenience. Repair
/// failures are per-file, logged, and never block the run.
async fn prepare_workspace(
    run_dir: &Path,
    input: &FileRecord,
    output: &FileRecord,
) -> anyhow::Result<()> {
    tokio::fs::create_dir_all(run_dir).await?;

    let input_copy = run_dir.join("input.wav");
    let output_copy = run_dir.join("output.wav");
    tokio::fs::copy(&input.stored_path, &input_copy)
        .await
        .with_context(|| format!("Copy input {} failed", input.stored_path.display()))?;
    tokio::fs::copy(&output.stored_path, &output_copy)
        .await
        .with_context(|| format!("Copy output {} failed", output.stored_path.display()))?;

    // Repair decodes and rewrites whole files; keep it off the runtime
    // threads
    let (input_repair, output_repair) = (input_copy.clone(), output_copy.clone());
    tokio::task::spawn_blocking(move || {
        repair::repair_audio_in_place(&input_repair);
        repair::repair_audio_in_place(&output_repair);
    })
    .await
    .context("Audio repair task failed")?;

    // Repaired input under its original basename as well
    let original_name = Path::new(&input.original_filename)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "input.wav".to_string());
    if original_name != "input.wav" && original_name != "output.wav" {
        tokio::fs::copy(&input_copy, run_dir.join(&original_name)).await?;
    }

    Ok(())
}

/// Record the terminal FAILED state; never re-raises
async fn mark_failed(state: &AppState, run_id: &str, cause: &anyhow::Error) {
    error!(run_id, error = %cause, "Training failed");
    *state.last_error.write().await = Some(format!("{:#}", cause));

    let message = format!("{:#}", cause);
    let result = state
        .store
        .modify(run_id, |r| {
            if !r.transition_to(RunStatus::Failed) {
                return false;
            }
            r.error = Some(message.clone());
            r.append_log("ERROR", message.clone());
            true
        })
        .await;
    if let Err(e) = result {
        error!(run_id, error = %e, "Failed to persist FAILED state");
    }
}
