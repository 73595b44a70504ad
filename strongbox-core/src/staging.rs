/*!
Ephemeral staging area for pipeline intermediates.

Every pipeline run owns exactly one staging directory. Intermediates (the
container archive, the compressed stream, the decrypted copy) only ever live
here, and the whole directory is removed on every exit path, success or
failure, when the owning run drops it.
*/

use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::Result;

/// Exclusively-owned scratch directory for one pipeline run.
pub struct StagingArea {
    dir: TempDir,
}

impl StagingArea {
    /// Create a fresh staging directory under the system temp location.
    pub fn new() -> Result<Self> {
        Ok(Self {
            dir: TempDir::new()?,
        })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Absolute path for a staged intermediate with the given file name.
    pub fn file(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }
}
