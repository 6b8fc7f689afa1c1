//! Data model for the training worker

pub mod file_record;
pub mod run;

pub use file_record::FileRecord;
pub use run::{
    Architecture, Device, LogLine, MetricsSummary, RunStatus, TrainingConfig, TrainingMetadata,
    TrainingRun,
};
