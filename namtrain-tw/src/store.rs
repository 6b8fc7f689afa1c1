//! Run store: authoritative, crash-recoverable record of every training run
//!
//! In-memory index backed by one durable JSON document per run at
//! `<runs_root>/<run_id>/run.json`. The documents are the source of truth
//! across restarts; the workspace directory tree is the fallback when a
//! crash (or manual manipulation) left a workspace without a record.

use crate::export;
use crate::models::{RunStatus, TrainingRun};
use namtrain_common::{Error, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Durable record filename inside each run workspace
pub const RECORD_FILE_NAME: &str = "run.json";

/// One path that could not be removed during deletion
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteFailure {
    pub path: PathBuf,
    pub error: String,
}

/// Best-effort deletion report
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteReport {
    pub removed_paths: Vec<PathBuf>,
    pub failures: Vec<DeleteFailure>,
}

/// Crash-recoverable run store
pub struct RunStore {
    runs_dir: PathBuf,
    runs: RwLock<HashMap<String, TrainingRun>>,
}

impl RunStore {
    pub fn new(runs_dir: impl Into<PathBuf>) -> Self {
        Self {
            runs_dir: runs_dir.into(),
            runs: RwLock::new(HashMap::new()),
        }
    }

    /// Workspace directory for a run
    pub fn run_dir(&self, run_id: &str) -> PathBuf {
        self.runs_dir.join(run_id)
    }

    fn record_path(&self, run_id: &str) -> PathBuf {
        self.run_dir(run_id).join(RECORD_FILE_NAME)
    }

    /// Insert a new run and durably write its record
    ///
    /// Identifiers are generated, never supplied, so a duplicate is a
    /// programmer error.
    pub async fn create(&self, run: TrainingRun) -> Result<()> {
        let mut runs = self.runs.write().await;
        if runs.contains_key(&run.run_id) {
            return Err(Error::Internal(format!(
                "Run id already exists: {}",
                run.run_id
            )));
        }
        self.persist(&run).await?;
        runs.insert(run.run_id.clone(), run);
        Ok(())
    }

    /// Fetch a run by identifier
    pub async fn get(&self, run_id: &str) -> Option<TrainingRun> {
        self.runs.read().await.get(run_id).cloned()
    }

    /// Overwrite a run's in-memory entry and durable record
    ///
    /// Callers supply the entire record; there is no partial-field patching.
    pub async fn update(&self, run: TrainingRun) -> Result<()> {
        let mut runs = self.runs.write().await;
        self.persist(&run).await?;
        runs.insert(run.run_id.clone(), run);
        Ok(())
    }

    /// Mutate a run under the write lock and persist the result
    ///
    /// The closure sees the current record and returns whether it changed
    /// anything; an unchanged record is not rewritten. Status transitions go
    /// through here so a concurrent writer can never resurrect a state it
    /// read before the other side's write landed. The mutation is applied to
    /// a clone and written durably first; the in-memory entry only changes
    /// once the record is on disk, so a failed persist leaves memory and
    /// disk agreeing on the old state. Returns the record as it stands
    /// after the call, or `None` for an unknown run.
    pub async fn modify<F>(&self, run_id: &str, mutate: F) -> Result<Option<TrainingRun>>
    where
        F: FnOnce(&mut TrainingRun) -> bool,
    {
        let mut runs = self.runs.write().await;
        let Some(current) = runs.get(run_id) else {
            return Ok(None);
        };
        let mut candidate = current.clone();
        if !mutate(&mut candidate) {
            return Ok(Some(candidate));
        }
        self.persist(&candidate).await?;
        runs.insert(run_id.to_string(), candidate.clone());
        Ok(Some(candidate))
    }

    /// List runs ordered by creation time descending
    ///
    /// Resolves each returned run's artifact path lazily; the only write
    /// this performs is caching a newly discovered path.
    pub async fn list(
        &self,
        status_filter: Option<RunStatus>,
        limit: usize,
    ) -> Vec<TrainingRun> {
        let mut selected: Vec<TrainingRun> = {
            let runs = self.runs.read().await;
            runs.values()
                .filter(|r| status_filter.map(|s| r.status == s).unwrap_or(true))
                .cloned()
                .collect()
        };
        selected.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        selected.truncate(limit);

        for run in &mut selected {
            run.model_path = self.resolve_model_path(&run.run_id).await;
        }
        selected
    }

    /// Resolve the run's exported artifact path, caching a new discovery
    ///
    /// A cached path is re-validated against the filesystem, never trusted.
    /// Resolution is idempotent: repeated calls with no new export yield the
    /// same path and write the durable record at most once.
    pub async fn resolve_model_path(&self, run_id: &str) -> Option<PathBuf> {
        {
            let runs = self.runs.read().await;
            let run = runs.get(run_id)?;
            if let Some(path) = &run.model_path {
                if path.exists() {
                    return Some(path.clone());
                }
            }
        }

        let discovered = export::find_latest_export(&self.run_dir(run_id))?;

        // Cache-fill under the write lock so a concurrent full-record update
        // from the worker is never clobbered with a stale clone.
        let mut runs = self.runs.write().await;
        let run = runs.get_mut(run_id)?;
        if run.model_path.as_deref() != Some(discovered.as_path()) {
            run.model_path = Some(discovered.clone());
            let snapshot = run.clone();
            if let Err(e) = self.persist(&snapshot).await {
                warn!(run_id, error = %e, "Failed to persist resolved model path");
            }
        }
        Some(discovered)
    }

    /// Remove a run's in-memory entry and its entire workspace
    ///
    /// Deletion is best-effort: individual path failures are collected and
    /// reported, never aborting the rest of the removal. The in-memory
    /// entry is gone regardless of filesystem outcome.
    pub async fn delete(&self, run_id: &str) -> Result<DeleteReport> {
        {
            let mut runs = self.runs.write().await;
            if runs.remove(run_id).is_none() {
                return Err(Error::NotFound(format!("Run not found: {}", run_id)));
            }
        }

        let run_dir = self.run_dir(run_id);
        let mut report = DeleteReport::default();
        if !run_dir.exists() {
            return Ok(report);
        }

        // Deepest paths first so directories are empty when their turn comes
        for entry in WalkDir::new(&run_dir).contents_first(true) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    report.failures.push(DeleteFailure {
                        path: e.path().map(Path::to_path_buf).unwrap_or_default(),
                        error: e.to_string(),
                    });
                    continue;
                }
            };
            let path = entry.path().to_path_buf();
            let result = if entry.file_type().is_dir() {
                std::fs::remove_dir(&path)
            } else {
                std::fs::remove_file(&path)
            };
            match result {
                Ok(()) => report.removed_paths.push(path),
                Err(e) => report.failures.push(DeleteFailure {
                    path,
                    error: e.to_string(),
                }),
            }
        }

        info!(
            run_id,
            removed = report.removed_paths.len(),
            failed = report.failures.len(),
            "Run deleted"
        );
        Ok(report)
    }

    /// Number of indexed runs
    pub async fn len(&self) -> usize {
        self.runs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.runs.read().await.is_empty()
    }

    /// Write the full durable record for a run
    async fn persist(&self, run: &TrainingRun) -> Result<()> {
        let dir = self.run_dir(&run.run_id);
        tokio::fs::create_dir_all(&dir).await?;
        let json = serde_json::to_vec_pretty(run)?;
        tokio::fs::write(self.record_path(&run.run_id), json).await?;
        Ok(())
    }

    /// Rehydrate the in-memory index from the runs directory
    ///
    /// Executed once at process start, before the store serves any request.
    /// Each immediate subdirectory is a candidate run named by its directory.
    /// An unparseable record is logged and skipped; a workspace without a
    /// record gets a minimal synthesized record, persisted immediately so
    /// future restarts read it directly.
    pub async fn recover(&self) -> Result<usize> {
        if !self.runs_dir.exists() {
            return Ok(0);
        }

        let mut recovered = 0usize;
        let mut entries = tokio::fs::read_dir(&self.runs_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let dir_name = entry.file_name().to_string_lossy().into_owned();

            let record_path = path.join(RECORD_FILE_NAME);
            let run = if record_path.exists() {
                match self.parse_record(&record_path, &dir_name).await {
                    Some(run) => run,
                    None => continue,
                }
            } else {
                let run = self.synthesize_record(&path, &dir_name);
                if let Err(e) = self.persist(&run).await {
                    warn!(run_id = %dir_name, error = %e, "Failed to persist synthesized record");
                }
                run
            };

            debug!(run_id = %run.run_id, status = ?run.status, "Recovered run");
            self.runs.write().await.insert(run.run_id.clone(), run);
            recovered += 1;
        }

        info!(count = recovered, "Run store recovery complete");
        Ok(recovered)
    }

    async fn parse_record(&self, record_path: &Path, dir_name: &str) -> Option<TrainingRun> {
        let content = match tokio::fs::read_to_string(record_path).await {
            Ok(content) => content,
            Err(e) => {
                warn!(path = %record_path.display(), error = %e, "Cannot read run record, skipping");
                return None;
            }
        };
        match serde_json::from_str::<TrainingRun>(&content) {
            Ok(mut run) => {
                if run.run_id.is_empty() {
                    run.run_id = dir_name.to_string();
                }
                Some(run)
            }
            Err(e) => {
                warn!(path = %record_path.display(), error = %e, "Unparseable run record, skipping");
                None
            }
        }
    }

    /// Build a minimal record for a workspace with no durable record
    ///
    /// Timestamps come from the directory's modification time. Status is
    /// COMPLETED when an export is discoverable, else UNKNOWN.
    fn synthesize_record(&self, run_dir: &Path, dir_name: &str) -> TrainingRun {
        let timestamp = std::fs::metadata(run_dir)
            .and_then(|m| m.modified())
            .map(namtrain_common::time::from_system_time)
            .unwrap_or_else(|_| namtrain_common::time::now());

        let model_path = export::find_latest_export(run_dir);
        let status = if model_path.is_some() {
            RunStatus::Completed
        } else {
            RunStatus::Unknown
        };

        warn!(
            run_id = %dir_name,
            status = ?status,
            "Workspace has no run record, synthesizing"
        );

        TrainingRun {
            run_id: dir_name.to_string(),
            name: dir_name.to_string(),
            description: None,
            status,
            created_at: timestamp,
            started_at: Some(timestamp),
            updated_at: timestamp,
            completed_at: (status == RunStatus::Completed).then_some(timestamp),
            training: crate::models::TrainingConfig {
                architecture: crate::models::Architecture::Standard,
                epochs: 0,
                batch_size: 0,
                learning_rate: 0.0,
                device: crate::models::Device::Auto,
                ignore_checks: false,
                delay_samples: 0,
            },
            metadata: None,
            progress: None,
            metrics: None,
            metrics_history: Vec::new(),
            logs: Vec::new(),
            model_path,
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Architecture, Device, TrainingConfig};

    fn test_config() -> TrainingConfig {
        TrainingConfig {
            architecture: Architecture::Lite,
            epochs: 10,
            batch_size: 16,
            learning_rate: 0.004,
            device: Device::Cpu,
            ignore_checks: false,
            delay_samples: 0,
        }
    }

    fn test_run(name: &str) -> TrainingRun {
        TrainingRun::new(name.to_string(), None, test_config(), None)
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let dir = tempfile::tempdir().unwrap();
        let store = RunStore::new(dir.path());

        let run = test_run("amp");
        let run_id = run.run_id.clone();
        store.create(run).await.unwrap();

        let fetched = store.get(&run_id).await.unwrap();
        assert_eq!(fetched.name, "amp");
        assert_eq!(fetched.status, RunStatus::Queued);
        assert!(store.record_path(&run_id).exists(), "durable record written");
    }

    #[tokio::test]
    async fn test_duplicate_create_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = RunStore::new(dir.path());

        let run = test_run("amp");
        store.create(run.clone()).await.unwrap();
        assert!(store.create(run).await.is_err());
    }

    #[tokio::test]
    async fn test_update_overwrites_whole_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = RunStore::new(dir.path());

        let mut run = test_run("amp");
        let run_id = run.run_id.clone();
        store.create(run.clone()).await.unwrap();

        run.transition_to(RunStatus::Running);
        run.append_log("INFO", "started");
        store.update(run).await.unwrap();

        let fetched = store.get(&run_id).await.unwrap();
        assert_eq!(fetched.status, RunStatus::Running);
        assert_eq!(fetched.logs.len(), 1);

        // Durable record matches the in-memory entry
        let on_disk: TrainingRun =
            serde_json::from_str(&std::fs::read_to_string(store.record_path(&run_id)).unwrap())
                .unwrap();
        assert_eq!(on_disk.status, RunStatus::Running);
    }

    #[tokio::test]
    async fn test_modify_refuses_exit_from_terminal() {
        let dir = tempfile::tempdir().unwrap();
        let store = RunStore::new(dir.path());

        let mut run = test_run("amp");
        let run_id = run.run_id.clone();
        run.transition_to(RunStatus::Cancelled);
        store.create(run).await.unwrap();
        let record_before = std::fs::read(store.record_path(&run_id)).unwrap();

        let after = store
            .modify(&run_id, |r| r.transition_to(RunStatus::Completed))
            .await
            .unwrap()
            .unwrap();

        // Transition refused; record not rewritten
        assert_eq!(after.status, RunStatus::Cancelled);
        let record_after = std::fs::read(store.record_path(&run_id)).unwrap();
        assert_eq!(record_before, record_after);
    }

    #[tokio::test]
    async fn test_modify_persist_failure_leaves_memory_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let store = RunStore::new(dir.path());

        let run = test_run("amp");
        let run_id = run.run_id.clone();
        store.create(run).await.unwrap();

        // Force the durable write to fail: the record path is a directory
        std::fs::remove_file(store.record_path(&run_id)).unwrap();
        std::fs::create_dir(store.record_path(&run_id)).unwrap();

        let result = store
            .modify(&run_id, |r| r.transition_to(RunStatus::Running))
            .await;
        assert!(result.is_err());

        // In-memory entry still matches the last durably written state
        assert_eq!(store.get(&run_id).await.unwrap().status, RunStatus::Queued);
    }

    #[tokio::test]
    async fn test_modify_unknown_run_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = RunStore::new(dir.path());
        let result = store.modify("run_missing", |_| true).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_list_order_filter_limit() {
        let dir = tempfile::tempdir().unwrap();
        let store = RunStore::new(dir.path());

        for i in 0..5 {
            let mut run = test_run(&format!("run {}", i));
            run.created_at = run.created_at + chrono::Duration::seconds(i);
            run.updated_at = run.created_at;
            if i == 4 {
                run.transition_to(RunStatus::Failed);
            }
            store.create(run).await.unwrap();
        }

        let all = store.list(None, 100).await;
        assert_eq!(all.len(), 5);
        assert_eq!(all[0].name, "run 4", "newest first");

        let failed = store.list(Some(RunStatus::Failed), 100).await;
        assert_eq!(failed.len(), 1);

        let limited = store.list(None, 2).await;
        assert_eq!(limited.len(), 2);
    }

    #[tokio::test]
    async fn test_resolve_model_path_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = RunStore::new(dir.path());

        let run = test_run("amp");
        let run_id = run.run_id.clone();
        store.create(run).await.unwrap();

        assert!(store.resolve_model_path(&run_id).await.is_none());

        let export_dir = store.run_dir(&run_id).join("exported_models/version_1");
        std::fs::create_dir_all(&export_dir).unwrap();
        std::fs::write(export_dir.join("amp.nam"), b"model").unwrap();

        let first = store.resolve_model_path(&run_id).await.unwrap();
        let record_after_first = std::fs::read(store.record_path(&run_id)).unwrap();

        let second = store.resolve_model_path(&run_id).await.unwrap();
        let record_after_second = std::fs::read(store.record_path(&run_id)).unwrap();

        assert_eq!(first, second);
        assert_eq!(
            record_after_first, record_after_second,
            "second resolution must not rewrite the durable record"
        );
        assert_eq!(store.get(&run_id).await.unwrap().model_path, Some(first));
    }

    #[tokio::test]
    async fn test_cached_path_revalidated() {
        let dir = tempfile::tempdir().unwrap();
        let store = RunStore::new(dir.path());

        let mut run = test_run("amp");
        let run_id = run.run_id.clone();
        run.model_path = Some(dir.path().join("gone.nam"));
        store.create(run).await.unwrap();

        // Cached path does not exist on disk and no export is present
        assert!(store.resolve_model_path(&run_id).await.is_none());
    }

    #[tokio::test]
    async fn test_delete_reports_every_path() {
        let dir = tempfile::tempdir().unwrap();
        let store = RunStore::new(dir.path());

        let run = test_run("amp");
        let run_id = run.run_id.clone();
        store.create(run).await.unwrap();

        let run_dir = store.run_dir(&run_id);
        std::fs::create_dir_all(run_dir.join("exported_models/version_1")).unwrap();
        std::fs::write(run_dir.join("input.wav"), b"wav").unwrap();
        std::fs::write(
            run_dir.join("exported_models/version_1/model.nam"),
            b"model",
        )
        .unwrap();

        let report = store.delete(&run_id).await.unwrap();

        // 3 files (run.json, input.wav, model.nam) + 3 dirs (version_1,
        // exported_models, the run dir itself)
        assert_eq!(report.removed_paths.len(), 6);
        assert!(report.failures.is_empty());
        assert!(!run_dir.exists());
        assert!(store.get(&run_id).await.is_none());
    }

    #[tokio::test]
    async fn test_delete_unknown_run_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = RunStore::new(dir.path());
        assert!(matches!(
            store.delete("run_missing").await,
            Err(Error::NotFound(_))
        ));
    }
}
