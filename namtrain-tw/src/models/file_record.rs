//! Uploaded file metadata

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Metadata for one uploaded audio asset, immutable once created
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    /// Generated identifier (`file_` prefix + uuid hex)
    pub file_id: String,
    /// Filename as supplied by the client
    pub original_filename: String,
    /// Absolute storage path under the files directory
    pub stored_path: PathBuf,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
}
