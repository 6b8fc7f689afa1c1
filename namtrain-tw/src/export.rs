//! Model export resolution
//!
//! The external trainer writes artifacts into a versioned layout under the
//! run workspace: `exported_models/<name><N>/<model>.nam`. Older trainer
//! builds wrote `.nam` files directly into `exported_models/`. Resolution
//! prefers the newest versioned directory and falls back to the flat layout;
//! an absent export is a normal state, never an error.

use std::path::{Path, PathBuf};

/// Exports subdirectory inside a run workspace
pub const EXPORT_DIR_NAME: &str = "exported_models";

/// Artifact file extension
pub const ARTIFACT_EXTENSION: &str = "nam";

/// Find the current exported artifact for a run workspace, if any
pub fn find_latest_export(run_dir: &Path) -> Option<PathBuf> {
    let export_dir = run_dir.join(EXPORT_DIR_NAME);
    if !export_dir.is_dir() {
        return None;
    }

    if let Some(version_dir) = latest_version_dir(&export_dir) {
        return first_artifact(&version_dir);
    }

    // Legacy flat layout
    first_artifact(&export_dir)
}

/// Select the versioned subdirectory with the highest trailing integer,
/// ties broken by name so the choice is deterministic
fn latest_version_dir(export_dir: &Path) -> Option<PathBuf> {
    let mut best: Option<(u64, String, PathBuf)> = None;

    let entries = std::fs::read_dir(export_dir).ok()?;
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        let Some(version) = trailing_integer(&name) else {
            continue;
        };
        let candidate = (version, name, path);
        match &best {
            Some((v, n, _)) if (*v, n.as_str()) >= (candidate.0, candidate.1.as_str()) => {}
            _ => best = Some(candidate),
        }
    }

    best.map(|(_, _, path)| path)
}

/// Parse the trailing decimal integer of a directory name, e.g.
/// `version_12` → 12. Names without trailing digits are not versioned.
fn trailing_integer(name: &str) -> Option<u64> {
    let digits: String = name
        .chars()
        .rev()
        .take_while(|c| c.is_ascii_digit())
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}

/// First `.nam` file in lexicographic order inside a directory
fn first_artifact(dir: &Path) -> Option<PathBuf> {
    let mut artifacts: Vec<PathBuf> = std::fs::read_dir(dir)
        .ok()?
        .flatten()
        .map(|e| e.path())
        .filter(|p| {
            p.is_file()
                && p.extension()
                    .map(|ext| ext.eq_ignore_ascii_case(ARTIFACT_EXTENSION))
                    .unwrap_or(false)
        })
        .collect();
    artifacts.sort();
    artifacts.into_iter().next()
}
