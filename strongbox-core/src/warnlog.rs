/*!
Shared warning sink for non-fatal anomalies.

Backup and restore runs append one line per warning or error to a plain-text
log next to the artifacts they produce. The file is opened once per run in
append mode and never truncated, so it accumulates across runs. Every append
is mirrored through the structured logger so console output stays complete.
*/

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Local;
use tracing::warn;

use crate::Result;

/// File name for warnings produced by backup runs, under the destination directory.
pub const BACKUP_WARNING_LOG: &str = "backup_warnings.log";

/// File name for warnings produced by restore runs, under the extraction directory.
pub const RESTORE_WARNING_LOG: &str = "restore_warnings.log";

/// Append-only warning log shared by every component of a pipeline run.
///
/// Appends are serialized through a mutex; no concurrent access is expected
/// by design, but nothing breaks if it happens within one process.
#[derive(Debug)]
pub struct WarningLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl WarningLog {
    /// Open the warning log at `path` in append mode, creating it if needed.
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
        })
    }

    /// Open the backup-run warning log under the destination directory.
    pub fn for_backup(dest_dir: &Path) -> Result<Self> {
        Self::open(&dest_dir.join(BACKUP_WARNING_LOG))
    }

    /// Open the restore-run warning log under the extraction directory.
    pub fn for_restore(extract_dir: &Path) -> Result<Self> {
        Self::open(&extract_dir.join(RESTORE_WARNING_LOG))
    }

    /// Location of the underlying log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record a non-fatal anomaly.
    pub fn warn(&self, message: &str) {
        warn!("{message}");
        self.append("WARNING", message);
    }

    /// Record a run-fatal failure at the orchestrator boundary.
    pub fn error(&self, message: &str) {
        tracing::error!("{message}");
        self.append("ERROR", message);
    }

    fn append(&self, level: &str, message: &str) {
        let line = format!(
            "{} - {} - {}\n",
            Local::now().format("%Y-%m-%d %H:%M:%S"),
            level,
            message
        );
        let mut file = match self.file.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        // A failed append must not fail the run the log is reporting on.
        if let Err(e) = file.write_all(line.as_bytes()) {
            warn!(path = %self.path.display(), error = %e, "could not append to warning log");
        }
    }
}
