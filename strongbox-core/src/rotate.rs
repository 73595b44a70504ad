/*!
Retention of encrypted artifacts in the destination directory.

Only files shaped like `{base}.{timestamp}.gz.{suffix}` are considered;
anything else in the destination is left alone. The embedded timestamp is
fixed-width, so lexicographic name order is chronological order.
*/

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::info;

use crate::warnlog::WarningLog;
use crate::Result;

/// One retained backup artifact, oldest-first when returned in a list.
#[derive(Debug, Clone)]
pub struct ArtifactInfo {
    pub name: String,
    pub path: PathBuf,
    pub size: u64,
    pub modified: SystemTime,
}

fn scan(dest_dir: &Path, base: &str, suffix: &str) -> Result<Vec<(String, PathBuf)>> {
    let prefix = format!("{base}.");
    let tail = format!(".gz.{suffix}");

    let mut found = Vec::new();
    for entry in fs::read_dir(dest_dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with(&prefix) && name.ends_with(&tail) {
            found.push((name, entry.path()));
        }
    }
    found.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(found)
}

/// Delete the oldest matching artifacts until at most `max_backups` remain.
///
/// A deletion that fails is warned and given up on, not retried; the next
/// rotation will see the file again. Returns how many files were removed.
pub fn rotate_backups(
    dest_dir: &Path,
    base: &str,
    suffix: &str,
    max_backups: usize,
    warnings: &WarningLog,
) -> Result<usize> {
    let mut backups = scan(dest_dir, base, suffix)?;

    let mut removed = 0;
    while backups.len() > max_backups {
        let (name, path) = backups.remove(0);
        match fs::remove_file(&path) {
            Ok(()) => {
                removed += 1;
                info!(artifact = %name, "removed old backup");
            }
            Err(e) => {
                warnings.warn(&format!("Failed to remove old backup {}: {e}", path.display()));
            }
        }
    }

    if removed > 0 {
        info!(removed, kept = backups.len(), "rotation complete");
    }
    Ok(removed)
}

/// All matching artifacts in the destination, oldest first.
pub fn list_artifacts(dest_dir: &Path, base: &str, suffix: &str) -> Result<Vec<ArtifactInfo>> {
    let mut artifacts = Vec::new();
    for (name, path) in scan(dest_dir, base, suffix)? {
        let meta = fs::metadata(&path)?;
        artifacts.push(ArtifactInfo {
            name,
            size: meta.len(),
            modified: meta.modified()?,
            path,
        });
    }
    Ok(artifacts)
}
