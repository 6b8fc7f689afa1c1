//! External trainer boundary
//!
//! Training itself is an opaque, long-running external routine. The service
//! hands it a prepared workspace plus a configuration bundle and waits; on
//! success the trainer has written artifacts into the workspace's versioned
//! export layout, on failure it exits non-zero. `ProcessTrainer` is the real
//! implementation; tests substitute their own through the `Trainer` trait.

use crate::models::{TrainingConfig, TrainingMetadata};
use async_trait::async_trait;
use serde::Serialize;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use tracing::info;

/// Everything the external trainer needs for one run
#[derive(Debug, Clone)]
pub struct TrainJob {
    pub run_id: String,
    pub name: String,
    /// Prepared workspace containing `input.wav` and `output.wav`
    pub run_dir: PathBuf,
    pub config: TrainingConfig,
    /// Measured latency in samples; overrides the config's expected offset
    pub latency_samples: i64,
    pub metadata: Option<TrainingMetadata>,
}

impl TrainJob {
    /// Effective input/output delay handed to the trainer
    pub fn effective_delay(&self) -> i64 {
        if self.latency_samples != 0 {
            self.latency_samples
        } else {
            self.config.delay_samples
        }
    }
}

/// Configuration document written into the workspace for the trainer
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TrainerConfigFile<'a> {
    name: &'a str,
    architecture: crate::models::Architecture,
    epochs: u32,
    batch_size: u32,
    learning_rate: f64,
    device: crate::models::Device,
    delay: i64,
    /// Validation bypass is an explicit flag through the trainer's public
    /// interface, never a runtime patch of its internals
    ignore_checks: bool,
    metadata: &'a Option<TrainingMetadata>,
}

/// Filename of the trainer configuration inside the workspace
pub const TRAINER_CONFIG_FILE: &str = "train_config.json";

/// Seam between the orchestrator and the external training routine
#[async_trait]
pub trait Trainer: Send + Sync {
    /// Run training to completion; errors become the run's FAILED state
    async fn train(&self, job: &TrainJob) -> anyhow::Result<()>;
}

/// Spawns the configured trainer executable with the workspace as its
/// working directory
pub struct ProcessTrainer {
    command: String,
}

impl ProcessTrainer {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

#[async_trait]
impl Trainer for ProcessTrainer {
    async fn train(&self, job: &TrainJob) -> anyhow::Result<()> {
        let config = TrainerConfigFile {
            name: &job.name,
            architecture: job.config.architecture,
            epochs: job.config.epochs,
            batch_size: job.config.batch_size,
            learning_rate: job.config.learning_rate,
            device: job.config.device,
            delay: job.effective_delay(),
            ignore_checks: job.config.ignore_checks,
            metadata: &job.metadata,
        };
        let config_path = job.run_dir.join(TRAINER_CONFIG_FILE);
        tokio::fs::write(&config_path, serde_json::to_vec_pretty(&config)?).await?;

        info!(
            run_id = %job.run_id,
            command = %self.command,
            delay = config.delay,
            "Invoking external trainer"
        );

        let output = Command::new(&self.command)
            .arg(&job.run_dir)
            .current_dir(&job.run_dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to launch trainer '{}': {}", self.command, e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail: String = stderr
                .lines()
                .rev()
                .take(5)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect::<Vec<_>>()
                .join("\n");
            anyhow::bail!("Trainer exited with {}: {}", output.status, tail);
        }

        info!(run_id = %job.run_id, "Trainer finished");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Architecture, Device};

    fn job_with_delays(latency_samples: i64, delay_samples: i64) -> TrainJob {
        TrainJob {
            run_id: "run_x".to_string(),
            name: "amp".to_string(),
            run_dir: PathBuf::from("/tmp/run_x"),
            config: TrainingConfig {
                architecture: Architecture::Standard,
                epochs: 10,
                batch_size: 16,
                learning_rate: 0.004,
                device: Device::Auto,
                ignore_checks: true,
                delay_samples,
            },
            latency_samples,
            metadata: None,
        }
    }

    #[test]
    fn test_measured_latency_overrides_config() {
        assert_eq!(job_with_delays(480, 100).effective_delay(), 480);
    }

    #[test]
    fn test_config_delay_used_when_no_measurement() {
        assert_eq!(job_with_delays(0, 100).effective_delay(), 100);
    }

    #[tokio::test]
    async fn test_missing_trainer_executable_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut job = job_with_delays(0, 0);
        job.run_dir = dir.path().to_path_buf();

        let trainer = ProcessTrainer::new("/nonexistent/namtrain-no-such-binary");
        let result = trainer.train(&job).await;
        assert!(result.is_err());

        // The config document is still written before the launch attempt
        assert!(dir.path().join(TRAINER_CONFIG_FILE).exists());
    }

    #[tokio::test]
    async fn test_failing_trainer_surfaces_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let mut job = job_with_delays(0, 0);
        job.run_dir = dir.path().to_path_buf();

        // `false` exits 1 with no output; the error carries the exit status
        let trainer = ProcessTrainer::new("false");
        let err = trainer.train(&job).await.unwrap_err();
        assert!(err.to_string().contains("exited"));
    }
}
