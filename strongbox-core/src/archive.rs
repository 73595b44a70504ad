/*!
Container archive construction.

Walks each backup target, applies the exclusion rules, and streams directory
and file entries into one uncompressed tar, with entry names produced by the
path preservation resolver. Permission failures on individual entries are
soft (warned, counted, skipped); any other failure while processing a target
aborts the whole run. The asymmetry is deliberate and load-bearing: a backup
that silently dropped arbitrary errors would look complete without being
complete.
*/

use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tar::Builder;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::error::BackupError;
use crate::paths::PathPreserver;
use crate::warnlog::WarningLog;
use crate::Result;

/// Substring patterns excluded from every archive unless overridden.
pub const DEFAULT_EXCLUDES: &[&str] = &["/.git/", "/.git", "__pycache__", ".pyc", ".pyo"];

/// Archive contribution beyond this multiple of source size is anomalous.
const DEFAULT_SIZE_ANOMALY_FACTOR: u64 = 2;

/// Write adapter counting every byte handed to the archive file, so each
/// appended entry's exact contribution can be read off as a counter delta.
struct CountingWriter<W: Write> {
    inner: W,
    written: u64,
}

impl<W: Write> CountingWriter<W> {
    fn new(inner: W) -> Self {
        Self { inner, written: 0 }
    }

    fn bytes_written(&self) -> u64 {
        self.written
    }
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.inner.write(buf)?;
        self.written += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Totals reported by the archive stage.
#[derive(Debug, Clone, Default)]
pub struct ArchiveStats {
    /// Files (and symlinks) written into the archive
    pub files_processed: u64,
    /// Entries skipped because of permission failures
    pub entries_skipped: u64,
    /// Cumulative size of the sources as read from the filesystem
    pub source_bytes: u64,
    /// Cumulative bytes those entries added to the archive
    pub archive_bytes: u64,
}

impl ArchiveStats {
    /// Archive bytes per source byte; zero when nothing was read.
    pub fn ratio(&self) -> f64 {
        if self.source_bytes == 0 {
            0.0
        } else {
            self.archive_bytes as f64 / self.source_bytes as f64
        }
    }
}

/// Streams backup targets into a single container archive.
pub struct ArchiveBuilder {
    preserver: PathPreserver,
    excludes: Vec<String>,
    size_anomaly_factor: u64,
    warnings: Arc<WarningLog>,
}

impl ArchiveBuilder {
    pub fn new(preserver: PathPreserver, warnings: Arc<WarningLog>) -> Self {
        Self {
            preserver,
            excludes: DEFAULT_EXCLUDES.iter().map(|s| s.to_string()).collect(),
            size_anomaly_factor: DEFAULT_SIZE_ANOMALY_FACTOR,
            warnings,
        }
    }

    /// Replace the default exclusion substrings.
    pub fn with_excludes(mut self, excludes: Vec<String>) -> Self {
        self.excludes = excludes;
        self
    }

    /// Tune the size-anomaly heuristic's factor.
    pub fn with_size_anomaly_factor(mut self, factor: u64) -> Self {
        self.size_anomaly_factor = factor;
        self
    }

    /// Substring containment against the path's string form, same
    /// permissiveness for directories and files.
    fn is_excluded(&self, path: &Path) -> bool {
        let path = path.to_string_lossy();
        self.excludes.iter().any(|pattern| path.contains(pattern.as_str()))
    }

    /// Stream every target into a tar at `tar_path` and report totals.
    pub fn build(&self, targets: &[PathBuf], tar_path: &Path) -> Result<ArchiveStats> {
        let mut builder = Builder::new(CountingWriter::new(File::create(tar_path)?));
        builder.follow_symlinks(false);

        let mut stats = ArchiveStats::default();

        for target in targets {
            if !target.exists() {
                self.warnings
                    .warn(&format!("Directory does not exist: {}", target.display()));
                continue;
            }

            info!(target = %target.display(), "backing up directory");
            match self.append_target(&mut builder, target, &mut stats) {
                Ok(()) => {}
                Err(e) if is_permission_denied(&e) => {
                    self.warnings.warn(&format!(
                        "Permission error accessing {}: {e}",
                        target.display()
                    ));
                }
                Err(e) => {
                    return Err(BackupError::directory(format!(
                        "Error processing {}: {e}",
                        target.display()
                    )));
                }
            }
        }

        builder.finish()?;

        info!(
            files = stats.files_processed,
            skipped = stats.entries_skipped,
            source_bytes = stats.source_bytes,
            archive_bytes = stats.archive_bytes,
            ratio = stats.ratio(),
            "archive stage complete"
        );
        Ok(stats)
    }

    fn append_target(
        &self,
        builder: &mut Builder<CountingWriter<File>>,
        target: &Path,
        stats: &mut ArchiveStats,
    ) -> Result<()> {
        let mut skipped: u64 = 0;

        let walker = WalkDir::new(target)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !self.is_excluded(e.path()));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let path = e
                        .path()
                        .map(|p| p.display().to_string())
                        .unwrap_or_else(|| target.display().to_string());
                    if walk_error_is_permission(&e) {
                        skipped += 1;
                        self.warnings
                            .warn(&format!("Permission denied, skipping directory: {path}"));
                        continue;
                    }
                    return Err(io::Error::from(e).into());
                }
            };

            // The target root itself gets no entry; names start at its children.
            if entry.depth() == 0 {
                continue;
            }

            let arc_path = self.preserver.resolve(entry.path(), target);

            if entry.file_type().is_dir() {
                debug!(name = %arc_path.display(), "adding directory");
                match builder.append_dir(&arc_path, entry.path()) {
                    Ok(()) => {}
                    Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
                        skipped += 1;
                        self.warnings.warn(&format!(
                            "Permission denied, skipping directory: {}",
                            entry.path().display()
                        ));
                    }
                    Err(e) => return Err(e.into()),
                }
            } else {
                let source_size = match entry.metadata() {
                    Ok(meta) => meta.len(),
                    Err(_) => {
                        self.warnings
                            .warn(&format!("Could not get size for: {}", entry.path().display()));
                        0
                    }
                };

                let before = builder.get_ref().bytes_written();
                debug!(name = %arc_path.display(), "adding file");
                match builder.append_path_with_name(entry.path(), &arc_path) {
                    Ok(()) => {
                        let contribution = builder.get_ref().bytes_written() - before;
                        stats.files_processed += 1;
                        stats.source_bytes += source_size;
                        stats.archive_bytes += contribution;

                        if contribution > source_size.saturating_mul(self.size_anomaly_factor) {
                            self.warnings.warn(&format!(
                                "Large size increase for {}: source {source_size} bytes, \
                                 archive contribution {contribution} bytes",
                                entry.path().display()
                            ));
                        }
                    }
                    Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
                        skipped += 1;
                        self.warnings.warn(&format!(
                            "Permission denied, skipping file: {}",
                            entry.path().display()
                        ));
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        }

        if skipped > 0 {
            stats.entries_skipped += skipped;
            self.warnings.warn(&format!(
                "Skipped {skipped} files/directories due to permissions in {}",
                target.display()
            ));
        }
        Ok(())
    }
}

fn is_permission_denied(err: &BackupError) -> bool {
    matches!(err, BackupError::Io(e) if e.kind() == io::ErrorKind::PermissionDenied)
}

fn walk_error_is_permission(err: &walkdir::Error) -> bool {
    err.io_error()
        .map(|e| e.kind() == io::ErrorKind::PermissionDenied)
        .unwrap_or(false)
}
