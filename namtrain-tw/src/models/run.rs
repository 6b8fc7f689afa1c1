//! Training run state machine
//!
//! A run progresses QUEUED → RUNNING → COMPLETED or FAILED, with CANCELLED
//! reachable from any non-terminal state via the stop endpoint. UNKNOWN only
//! appears on records synthesized during startup recovery when a workspace
//! directory carries neither a durable record nor a discoverable export.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Training run lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RunStatus {
    /// Created, no work started yet
    Queued,
    /// Workspace preparation or training in progress
    Running,
    /// Training returned successfully
    Completed,
    /// Workspace preparation or training raised an error
    Failed,
    /// Stopped by an external request
    Cancelled,
    /// Recovered from a workspace with no durable record and no export
    Unknown,
}

impl RunStatus {
    /// Terminal states never transition again
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Completed | RunStatus::Failed | RunStatus::Cancelled
        )
    }
}

/// Model architecture preset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Architecture {
    Nano,
    Lite,
    Standard,
    Large,
}

/// Training device preference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    Cpu,
    Gpu,
    Auto,
}

/// Training configuration snapshot, immutable once the run is created
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingConfig {
    pub architecture: Architecture,
    pub epochs: u32,
    pub batch_size: u32,
    pub learning_rate: f64,
    pub device: Device,
    /// Ask the trainer to bypass its input validation checks
    pub ignore_checks: bool,
    /// Expected input/output offset in samples, used when no measured
    /// latency accompanies the run
    #[serde(default)]
    pub delay_samples: i64,
}

/// Free-form gear/tone description attached to a run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingMetadata {
    pub modeled_by: Option<String>,
    pub gear_make: Option<String>,
    pub gear_model: Option<String>,
    pub gear_type: Option<String>,
    pub tone_type: Option<String>,
    pub reamp_send_level_db: Option<f64>,
    pub reamp_return_level_db: Option<f64>,
    pub tags: Option<Vec<String>>,
}

/// Post-training quality summary
///
/// Real scoring does not exist yet; completed runs record the all-zero
/// placeholder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSummary {
    pub snr_db: f64,
    pub rms_error: f64,
    pub spectral_error_db: f64,
    pub time_alignment_error_samples: i64,
    pub quality_score: f64,
}

impl MetricsSummary {
    /// Placeholder summary written on successful completion
    pub fn placeholder() -> Self {
        Self {
            snr_db: 0.0,
            rms_error: 0.0,
            spectral_error_db: 0.0,
            time_alignment_error_samples: 0,
            quality_score: 0.0,
        }
    }
}

/// One captured log line
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogLine {
    pub timestamp: DateTime<Utc>,
    pub level: String,
    pub message: String,
}

/// Training run record: in-memory entry and durable JSON document share this
/// exact shape, written whole on every update
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingRun {
    /// Unique run identifier, assigned once at creation
    ///
    /// Defaulted so recovery can key a legacy record missing the field by
    /// its directory name instead.
    #[serde(default)]
    pub run_id: String,

    pub name: String,
    pub description: Option<String>,
    pub status: RunStatus,

    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,

    pub training: TrainingConfig,
    pub metadata: Option<TrainingMetadata>,

    /// Orchestrator-owned progress indicator, opaque to the store
    pub progress: Option<serde_json::Value>,
    pub metrics: Option<MetricsSummary>,
    #[serde(default)]
    pub metrics_history: Vec<serde_json::Value>,
    #[serde(default)]
    pub logs: Vec<LogLine>,

    /// Resolved artifact location; re-validated on every read, never trusted
    pub model_path: Option<PathBuf>,
    /// Human-readable failure cause, present only in the FAILED state
    pub error: Option<String>,
}

impl TrainingRun {
    /// Create a new run in the QUEUED state
    pub fn new(
        name: String,
        description: Option<String>,
        training: TrainingConfig,
        metadata: Option<TrainingMetadata>,
    ) -> Self {
        let now = namtrain_common::time::now();
        Self {
            run_id: format!("run_{}", uuid::Uuid::new_v4().simple()),
            name,
            description,
            status: RunStatus::Queued,
            created_at: now,
            started_at: None,
            updated_at: now,
            completed_at: None,
            training,
            metadata,
            progress: None,
            metrics: None,
            metrics_history: Vec::new(),
            logs: Vec::new(),
            model_path: None,
            error: None,
        }
    }

    /// Transition to a new state
    ///
    /// Status is monotonic: any transition out of a terminal state is
    /// refused and `false` is returned. Entering a terminal state stamps
    /// `completed_at`; every accepted transition stamps `updated_at`.
    pub fn transition_to(&mut self, new_status: RunStatus) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = new_status;
        self.updated_at = namtrain_common::time::now();
        if new_status.is_terminal() {
            self.completed_at = Some(self.updated_at);
        }
        true
    }

    /// Append a log line, stamping the current time
    pub fn append_log(&mut self, level: &str, message: impl Into<String>) {
        self.logs.push(LogLine {
            timestamp: namtrain_common::time::now(),
            level: level.to_string(),
            message: message.into(),
        });
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
