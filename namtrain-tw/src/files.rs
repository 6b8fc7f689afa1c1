//! Uploaded file registry
//!
//! Uploads are persisted under a generated identifier with a normalized
//! extension; their metadata lives in an in-memory index for the lifetime of
//! the process. A run that references an identifier this registry does not
//! know is an input-validation failure at run creation time, nothing more.

use crate::models::FileRecord;
use namtrain_common::Result;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::info;

/// In-memory registry over the files directory
pub struct FileRegistry {
    files_dir: PathBuf,
    files: RwLock<HashMap<String, FileRecord>>,
}

impl FileRegistry {
    pub fn new(files_dir: impl Into<PathBuf>) -> Self {
        Self {
            files_dir: files_dir.into(),
            files: RwLock::new(HashMap::new()),
        }
    }

    /// Persist an upload and register its metadata
    pub async fn store_upload(&self, original_filename: &str, content: &[u8]) -> Result<FileRecord> {
        let extension = normalized_extension(original_filename);
        let file_id = format!("file_{}", uuid::Uuid::new_v4().simple());
        let stored_path = self.files_dir.join(format!("{}{}", file_id, extension));

        tokio::fs::create_dir_all(&self.files_dir).await?;
        tokio::fs::write(&stored_path, content).await?;

        let record = FileRecord {
            file_id: file_id.clone(),
            original_filename: original_filename.to_string(),
            stored_path,
            size_bytes: content.len() as u64,
            created_at: namtrain_common::time::now(),
        };

        info!(
            file_id = %record.file_id,
            filename = %record.original_filename,
            size_bytes = record.size_bytes,
            "Upload stored"
        );

        self.files.write().await.insert(file_id, record.clone());
        Ok(record)
    }

    /// Fetch a file record by identifier
    pub async fn get(&self, file_id: &str) -> Option<FileRecord> {
        self.files.read().await.get(file_id).cloned()
    }
}

/// Lowercased extension of the original filename, defaulting to `.wav`
fn normalized_extension(filename: &str) -> String {
    Path::new(filename)
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy().to_lowercase()))
        .unwrap_or_else(|| ".wav".to_string())
}
