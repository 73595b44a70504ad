/*!
Safe staging of live SQLite databases.

Copying a database file that a running service holds open risks catching it
mid-write. Files that look like SQLite databases are snapshotted through the
online backup API instead, which yields a consistent point-in-time copy even
with a writer attached. `stage_tree` applies the treatment to a whole
directory, producing a tree the regular pipeline can archive as an ordinary
backup target.
*/

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use rusqlite::backup::{Backup, StepResult};
use rusqlite::{Connection, OpenFlags};
use tracing::info;
use walkdir::WalkDir;

use crate::error::BackupError;
use crate::warnlog::WarningLog;
use crate::Result;

/// A path is treated as a SQLite database when it is a regular file with a
/// `.db` extension (any case) that SQLite can open and answer a schema query
/// from. The extension gate keeps staging from probing every file it sees.
pub fn is_sqlite_database(path: &Path) -> bool {
    let named_like_db = path.is_file()
        && path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("db"))
            .unwrap_or(false);
    if !named_like_db {
        return false;
    }

    match Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY) {
        Ok(conn) => conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table'")
            .and_then(|mut stmt| stmt.query([]).map(|mut rows| rows.next().is_ok()))
            .unwrap_or(false),
        Err(_) => false,
    }
}

/// How one staged file was handled.
enum Staged {
    Copied,
    Snapshotted,
}

/// Counts from one `stage_tree` run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageSummary {
    pub files_copied: u64,
    pub databases_snapshotted: u64,
    pub failures: u64,
}

/// Stages files into a backup-ready tree, snapshotting SQLite databases and
/// byte-copying everything else.
pub struct SqliteStager {
    warnings: Arc<WarningLog>,
}

impl SqliteStager {
    pub fn new(warnings: Arc<WarningLog>) -> Self {
        Self { warnings }
    }

    /// Consistent point-in-time copy of a database via the online backup
    /// API. Parent directories of `dest` are created as needed.
    pub fn snapshot_database(&self, source: &Path, dest: &Path) -> Result<()> {
        let source_bytes = fs::metadata(source)?.len();
        info!(database = %source.display(), bytes = source_bytes, "snapshotting database");

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }

        let started = Instant::now();
        let src = Connection::open_with_flags(source, OpenFlags::SQLITE_OPEN_READ_ONLY)
            .map_err(|e| BackupError::sqlite(format!("Failed to open source database: {e}")))?;
        let mut dst = Connection::open(dest)
            .map_err(|e| BackupError::sqlite(format!("Failed to create snapshot database: {e}")))?;
        let backup = Backup::new(&src, &mut dst)
            .map_err(|e| BackupError::sqlite(format!("Failed to initialize snapshot: {e}")))?;

        // All pages in one step.
        match backup
            .step(-1)
            .map_err(|e| BackupError::sqlite(format!("Snapshot failed: {e}")))?
        {
            StepResult::Done => {}
            other => {
                return Err(BackupError::sqlite(format!(
                    "Snapshot of {} stopped before completion: {other:?}",
                    source.display()
                )));
            }
        }
        drop(backup);

        let snapshot_bytes = fs::metadata(dest)?.len();
        info!(
            database = %source.display(),
            source_bytes,
            snapshot_bytes,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "database snapshot complete"
        );
        Ok(())
    }

    /// Stage one file under `staging_base`, keeping its path relative to
    /// `relative_to`. Best effort: a failure is logged and reported as
    /// `false`, it aborts nothing.
    pub fn stage_path(&self, source: &Path, staging_base: &Path, relative_to: &Path) -> bool {
        let rel = match source.strip_prefix(relative_to) {
            Ok(rel) => rel,
            Err(_) => {
                self.warnings.error(&format!(
                    "Failed to handle {}: not under {}",
                    source.display(),
                    relative_to.display()
                ));
                return false;
            }
        };
        match self.stage_file(source, &staging_base.join(rel)) {
            Ok(_) => true,
            Err(e) => {
                self.warnings
                    .error(&format!("Failed to handle {}: {e}", source.display()));
                false
            }
        }
    }

    /// Stage every file under `source_dir` into `staging_dir`, mirroring the
    /// tree structure. Databases get snapshots, the rest plain copies.
    pub fn stage_tree(&self, source_dir: &Path, staging_dir: &Path) -> Result<StageSummary> {
        info!(source = %source_dir.display(), "staging directory tree");
        let mut summary = StageSummary::default();

        for entry in WalkDir::new(source_dir).follow_links(false) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    summary.failures += 1;
                    self.warnings
                        .warn(&format!("Could not read entry while staging: {e}"));
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            let rel = match entry.path().strip_prefix(source_dir) {
                Ok(rel) => rel.to_path_buf(),
                Err(_) => continue,
            };
            match self.stage_file(entry.path(), &staging_dir.join(rel)) {
                Ok(Staged::Snapshotted) => summary.databases_snapshotted += 1,
                Ok(Staged::Copied) => summary.files_copied += 1,
                Err(e) => {
                    summary.failures += 1;
                    self.warnings
                        .error(&format!("Failed to handle {}: {e}", entry.path().display()));
                }
            }
        }

        info!(
            databases = summary.databases_snapshotted,
            files = summary.files_copied,
            failures = summary.failures,
            "staging complete"
        );
        Ok(summary)
    }

    fn stage_file(&self, source: &Path, dest: &Path) -> Result<Staged> {
        if is_sqlite_database(source) {
            self.snapshot_database(source, dest)?;
            Ok(Staged::Snapshotted)
        } else {
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(source, dest)?;
            Ok(Staged::Copied)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_database(path: &Path, rows: usize) {
        let conn = Connection::open(path).unwrap();
        conn.execute_batch("CREATE TABLE tracks (id INTEGER PRIMARY KEY, title TEXT)")
            .unwrap();
        for i in 0..rows {
            conn.execute("INSERT INTO tracks (title) VALUES (?1)", [format!("track {i}")])
                .unwrap();
        }
    }

    fn row_count(path: &Path) -> i64 {
        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY).unwrap();
        conn.query_row("SELECT count(*) FROM tracks", [], |row| row.get(0))
            .unwrap()
    }

    fn stager(dir: &TempDir) -> SqliteStager {
        let warnings = Arc::new(WarningLog::for_backup(dir.path()).unwrap());
        SqliteStager::new(warnings)
    }

    #[test]
    fn test_database_detection() {
        let dir = TempDir::new().unwrap();

        let real = dir.path().join("library.db");
        create_database(&real, 3);
        assert!(is_sqlite_database(&real));

        let upper = dir.path().join("LIBRARY.DB");
        create_database(&upper, 1);
        assert!(is_sqlite_database(&upper));

        // Valid database, wrong extension: staging must not probe it.
        let sqlite_ext = dir.path().join("library.sqlite");
        create_database(&sqlite_ext, 1);
        assert!(!is_sqlite_database(&sqlite_ext));

        let garbage = dir.path().join("fake.db");
        fs::write(&garbage, b"not a database at all").unwrap();
        assert!(!is_sqlite_database(&garbage));

        assert!(!is_sqlite_database(&dir.path().join("absent.db")));

        let dir_named_db = dir.path().join("folder.db");
        fs::create_dir(&dir_named_db).unwrap();
        assert!(!is_sqlite_database(&dir_named_db));
    }

    #[test]
    fn test_snapshot_preserves_rows_and_creates_parents() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("library.db");
        create_database(&source, 25);

        let dest = dir.path().join("staged/nested/library.db");
        stager(&dir).snapshot_database(&source, &dest).unwrap();

        assert_eq!(row_count(&dest), 25);
        assert_eq!(row_count(&source), 25);
    }

    #[test]
    fn test_stage_path_branches_on_file_kind() {
        let dir = TempDir::new().unwrap();
        let tree = dir.path().join("app");
        fs::create_dir_all(tree.join("media")).unwrap();
        let db = tree.join("media/index.db");
        create_database(&db, 4);
        let plain = tree.join("settings.xml");
        fs::write(&plain, b"<prefs/>").unwrap();

        let staging = dir.path().join("staging");
        let stager = stager(&dir);

        assert!(stager.stage_path(&db, &staging, &tree));
        assert!(stager.stage_path(&plain, &staging, &tree));

        assert_eq!(row_count(&staging.join("media/index.db")), 4);
        assert_eq!(fs::read(staging.join("settings.xml")).unwrap(), b"<prefs/>");
    }

    #[test]
    fn test_stage_path_outside_root_fails_softly() {
        let dir = TempDir::new().unwrap();
        let outside = dir.path().join("outside.txt");
        fs::write(&outside, b"stray").unwrap();
        let tree = dir.path().join("app");
        fs::create_dir(&tree).unwrap();

        assert!(!stager(&dir).stage_path(&outside, &dir.path().join("staging"), &tree));

        let log =
            fs::read_to_string(dir.path().join(crate::warnlog::BACKUP_WARNING_LOG)).unwrap();
        assert!(log.contains("Failed to handle"));
    }

    #[test]
    fn test_stage_tree_counts_and_mirrors_structure() {
        let dir = TempDir::new().unwrap();
        let tree = dir.path().join("app");
        fs::create_dir_all(tree.join("databases")).unwrap();
        create_database(&tree.join("databases/library.db"), 10);
        fs::write(tree.join("databases/notes.txt"), b"plain").unwrap();
        fs::write(tree.join("prefs.xml"), b"<x/>").unwrap();
        // Named like a database but not one: must fall through to a copy.
        fs::write(tree.join("databases/broken.db"), b"junk").unwrap();

        let staging = dir.path().join("staging");
        let summary = stager(&dir).stage_tree(&tree, &staging).unwrap();

        assert_eq!(summary.databases_snapshotted, 1);
        assert_eq!(summary.files_copied, 3);
        assert_eq!(summary.failures, 0);

        assert_eq!(row_count(&staging.join("databases/library.db")), 10);
        assert_eq!(fs::read(staging.join("databases/broken.db")).unwrap(), b"junk");
        assert_eq!(fs::read(staging.join("prefs.xml")).unwrap(), b"<x/>");
    }
}
