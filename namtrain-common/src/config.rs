//! Configuration loading and data folder resolution
//!
//! The data folder holds everything the service persists: uploaded audio
//! files under `files/` and one workspace directory per training run under
//! `runs/`.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Environment variable naming the data folder
pub const ROOT_ENV_VAR: &str = "NAMTRAIN_ROOT";

/// Environment variable naming the external trainer command
pub const TRAINER_ENV_VAR: &str = "NAMTRAIN_TRAINER_CMD";

/// Default external trainer command when nothing is configured
pub const DEFAULT_TRAINER_COMMAND: &str = "nam-train";

/// TOML configuration file contents
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Data folder override
    pub root_folder: Option<String>,
    /// External trainer command override
    pub trainer_command: Option<String>,
}

impl TomlConfig {
    /// Load the platform configuration file, if one exists
    ///
    /// A missing file yields the default (empty) configuration; a file that
    /// exists but does not parse is an error.
    pub fn load() -> Result<Self> {
        match find_config_file() {
            Some(path) => {
                debug!(path = %path.display(), "Loading config file");
                Self::load_from(&path)
            }
            None => {
                debug!("No config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Load configuration from a specific TOML file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
    }
}

/// Data folder resolution priority order:
/// 1. Command-line argument (highest priority)
/// 2. `NAMTRAIN_ROOT` environment variable
/// 3. TOML config file (`root_folder` key)
/// 4. OS-dependent compiled default (fallback)
pub fn resolve_root_folder(cli_arg: Option<&str>, toml_config: &TomlConfig) -> PathBuf {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return PathBuf::from(path);
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(ROOT_ENV_VAR) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    // Priority 3: TOML config file
    if let Some(path) = &toml_config.root_folder {
        return PathBuf::from(path);
    }

    // Priority 4: OS-dependent compiled default
    default_root_folder()
}

/// Resolve the external trainer command: ENV over TOML over compiled default
pub fn resolve_trainer_command(toml_config: &TomlConfig) -> String {
    if let Ok(cmd) = std::env::var(TRAINER_ENV_VAR) {
        if !cmd.trim().is_empty() {
            return cmd;
        }
    }
    toml_config
        .trainer_command
        .clone()
        .unwrap_or_else(|| DEFAULT_TRAINER_COMMAND.to_string())
}

/// Get default configuration file path for the platform, if present
fn find_config_file() -> Option<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("namtrain").join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/namtrain/config.toml");
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

/// Get OS-dependent default data folder path
fn default_root_folder() -> PathBuf {
    match dirs::data_local_dir() {
        Some(dir) => dir.join("namtrain"),
        None => {
            warn!("No platform data directory, falling back to ./namtrain_data");
            PathBuf::from("./namtrain_data")
        }
    }
}

/// On-disk layout of the data folder
#[derive(Debug, Clone)]
pub struct DataLayout {
    root: PathBuf,
}

impl DataLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding uploaded audio files
    pub fn files_dir(&self) -> PathBuf {
        self.root.join("files")
    }

    /// Directory holding one workspace per training run
    pub fn runs_dir(&self) -> PathBuf {
        self.root.join("runs")
    }

    /// Create the data folder tree if missing
    pub fn ensure_directories(&self) -> Result<()> {
        std::fs::create_dir_all(self.files_dir())?;
        std::fs::create_dir_all(self.runs_dir())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_cli_arg_takes_priority() {
        std::env::set_var(ROOT_ENV_VAR, "/tmp/from-env");
        let config = TomlConfig {
            root_folder: Some("/tmp/from-toml".to_string()),
            trainer_command: None,
        };
        let root = resolve_root_folder(Some("/tmp/from-cli"), &config);
        assert_eq!(root, PathBuf::from("/tmp/from-cli"));
        std::env::remove_var(ROOT_ENV_VAR);
    }

    #[test]
    #[serial]
    fn test_env_over_toml() {
        std::env::set_var(ROOT_ENV_VAR, "/tmp/from-env");
        let config = TomlConfig {
            root_folder: Some("/tmp/from-toml".to_string()),
            trainer_command: None,
        };
        let root = resolve_root_folder(None, &config);
        assert_eq!(root, PathBuf::from("/tmp/from-env"));
        std::env::remove_var(ROOT_ENV_VAR);
    }

    #[test]
    #[serial]
    fn test_toml_over_default() {
        std::env::remove_var(ROOT_ENV_VAR);
        let config = TomlConfig {
            root_folder: Some("/tmp/from-toml".to_string()),
            trainer_command: None,
        };
        let root = resolve_root_folder(None, &config);
        assert_eq!(root, PathBuf::from("/tmp/from-toml"));
    }

    #[test]
    #[serial]
    fn test_trainer_command_default() {
        std::env::remove_var(TRAINER_ENV_VAR);
        let cmd = resolve_trainer_command(&TomlConfig::default());
        assert_eq!(cmd, DEFAULT_TRAINER_COMMAND);
    }

    #[test]
    #[serial]
    fn test_trainer_command_env_override() {
        std::env::set_var(TRAINER_ENV_VAR, "/opt/bin/custom-trainer");
        let config = TomlConfig {
            root_folder: None,
            trainer_command: Some("from-toml".to_string()),
        };
        assert_eq!(resolve_trainer_command(&config), "/opt/bin/custom-trainer");
        std::env::remove_var(TRAINER_ENV_VAR);
    }

    #[test]
    fn test_toml_config_parse() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "root_folder = \"/srv/namtrain\"\ntrainer_command = \"nam-full\"\n",
        )
        .unwrap();

        let config = TomlConfig::load_from(&path).unwrap();
        assert_eq!(config.root_folder.as_deref(), Some("/srv/namtrain"));
        assert_eq!(config.trainer_command.as_deref(), Some("nam-full"));
    }

    #[test]
    fn test_toml_config_parse_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "root_folder = [not toml").unwrap();
        assert!(TomlConfig::load_from(&path).is_err());
    }

    #[test]
    fn test_data_layout_directories() {
        let dir = tempfile::tempdir().unwrap();
        let layout = DataLayout::new(dir.path().join("data"));
        layout.ensure_directories().unwrap();
        assert!(layout.files_dir().is_dir());
        assert!(layout.runs_dir().is_dir());
    }
}
