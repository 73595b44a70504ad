//! Configuration surfaces for backup and restore runs
//!
//! Both structs load from a flat JSON key/value file and are validated before
//! an engine is built from them, so the pipeline itself only ever sees
//! resolved paths and sane integers. Unknown keys are ignored, which lets one
//! file carry both the backup and the restore surface.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::BackupError;
use crate::paths::DEFAULT_PRESERVE_LEVELS;
use crate::Result;

fn default_preserve_levels() -> usize {
    DEFAULT_PRESERVE_LEVELS
}

/// Settings for one backup run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupConfig {
    /// Directories to back up
    pub backup_dirs: Vec<PathBuf>,
    /// Destination directory receiving the final artifacts
    pub dest_dir: PathBuf,
    /// Base name shared by every artifact generation
    pub backup_file_base: String,
    /// File whose contents are the symmetric passphrase
    pub password_file: PathBuf,
    /// Upper bound on retained artifacts after rotation
    pub max_backups: usize,
    /// Trailing segments of each backup root kept in archive entry names
    #[serde(default = "default_preserve_levels")]
    pub preserve_levels: usize,
}

impl BackupConfig {
    /// Load a backup configuration from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Check the configuration against the filesystem before a run starts.
    pub fn validate(&self) -> Result<()> {
        if self.backup_dirs.is_empty() {
            return Err(BackupError::validation(
                "at least one backup directory is required",
            ));
        }
        if self.backup_file_base.is_empty() {
            return Err(BackupError::validation("backup_file_base must not be empty"));
        }
        if !self.dest_dir.is_dir() {
            return Err(BackupError::validation(format!(
                "destination directory does not exist: {}",
                self.dest_dir.display()
            )));
        }
        if !self.password_file.is_file() {
            return Err(BackupError::validation(format!(
                "password file does not exist: {}",
                self.password_file.display()
            )));
        }
        if self.max_backups == 0 {
            return Err(BackupError::validation("max_backups must be at least 1"));
        }
        Ok(())
    }
}

/// Settings for one restore run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestoreConfig {
    /// The encrypted artifact to restore from
    pub backup_file: PathBuf,
    /// Directory the archive contents are extracted into
    pub extract_path: PathBuf,
    /// File whose contents are the symmetric passphrase
    pub password_file: PathBuf,
}

impl RestoreConfig {
    /// Load a restore configuration from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Check the configuration against the filesystem before a run starts.
    ///
    /// The extraction directory is not required to exist yet; callers create
    /// it before the run.
    pub fn validate(&self) -> Result<()> {
        if !self.backup_file.is_file() {
            return Err(BackupError::validation(format!(
                "backup file does not exist: {}",
                self.backup_file.display()
            )));
        }
        if !self.password_file.is_file() {
            return Err(BackupError::validation(format!(
                "password file does not exist: {}",
                self.password_file.display()
            )));
        }
        Ok(())
    }
}
