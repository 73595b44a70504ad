/*!
Pipeline orchestration for backup and restore runs.

This module contains the core business logic for both directions of the
pipeline. `BackupEngine` drives archive, compress, encrypt, and rotate over
a staging area that is removed on every exit path; `RestoreEngine` mirrors
it with decrypt, decompress, and a validated extract. Either engine folds
any stage failure into a single terminal error after recording it in the
warning log.
*/

use std::fs::{self, File};
use std::io::Read;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Local};
use sha2::{Digest, Sha256};
use tar::Archive;
use tracing::info;

use crate::archive::{ArchiveBuilder, ArchiveStats};
use crate::compression::{decompress_file, Compressor};
use crate::config::{BackupConfig, RestoreConfig};
use crate::encryption::{CipherTool, GpgCipher};
use crate::error::BackupError;
use crate::paths::PathPreserver;
use crate::rotate::rotate_backups;
use crate::staging::StagingArea;
use crate::warnlog::WarningLog;
use crate::Result;

/// File name for a compressed artifact stamped at `when`. The cipher tool
/// appends its own suffix when the artifact is encrypted.
pub fn backup_file_name(base: &str, when: DateTime<Local>) -> String {
    format!("{base}.{}.gz", when.format("%Y%m%d%H%M%S"))
}

/// Hex SHA-256 of a file, streamed in 64 KiB chunks.
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let read = file.read(&mut buf)?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// A name is safe when it can only land inside the extraction directory:
/// relative, and free of parent-directory segments. Checked per component,
/// so `a/..b/c` passes while `a/../c` does not.
fn entry_name_is_safe(path: &Path) -> bool {
    !path.is_absolute() && !path.components().any(|c| matches!(c, Component::ParentDir))
}

/// Engine for complete backup runs.
///
/// One `run` walks the linear pipeline:
/// 1. Archive every configured target into a staged tar
/// 2. Compress the tar and drop the uncompressed copy
/// 3. Copy the compressed archive to the destination and encrypt it there
/// 4. Rotate old artifacts down to the configured retention
///
/// The staging area lives only for the duration of the run. A failure in any
/// stage skips everything after it, is written to the warning log, and
/// surfaces as a single `BackupFailed` wrapping the cause.
pub struct BackupEngine<C>
where
    C: CipherTool,
{
    config: BackupConfig,
    cipher: C,
    warnings: Arc<WarningLog>,
}

impl BackupEngine<GpgCipher> {
    /// Build an engine from validated configuration, encrypting with gpg.
    pub fn from_config(config: BackupConfig) -> Result<Self> {
        config.validate()?;
        let warnings = Arc::new(WarningLog::for_backup(&config.dest_dir)?);
        let cipher = GpgCipher::new(Arc::clone(&warnings));
        Self::with_cipher(config, cipher, warnings)
    }
}

impl<C> BackupEngine<C>
where
    C: CipherTool,
{
    /// Build an engine around an explicit cipher tool. The tool is probed
    /// up front so a missing binary fails the run before any work is done.
    pub fn with_cipher(config: BackupConfig, cipher: C, warnings: Arc<WarningLog>) -> Result<Self> {
        if !cipher.is_available() {
            return Err(BackupError::encryption(format!(
                "{} is not available on this system",
                cipher.name()
            )));
        }
        Ok(Self {
            config,
            cipher,
            warnings,
        })
    }

    /// Run the full pipeline and return the path of the encrypted artifact.
    pub fn run(&self) -> Result<PathBuf> {
        match self.run_pipeline() {
            Ok(artifact) => Ok(artifact),
            Err(e) => {
                self.warnings.error(&format!("Backup failed: {e}"));
                Err(BackupError::BackupFailed(e.to_string()))
            }
        }
    }

    fn run_pipeline(&self) -> Result<PathBuf> {
        info!(
            targets = self.config.backup_dirs.len(),
            dest = %self.config.dest_dir.display(),
            "starting backup"
        );

        let staging = StagingArea::new()?;
        let tar_path = staging.file("backup.tar");
        let gz_path = staging.file("backup.tar.gz");

        info!("creating container archive");
        let stats = self.build_archive(&tar_path)?;

        info!("compressing archive");
        let compressor = Compressor::new(Arc::clone(&self.warnings));
        compressor.compress_file(&tar_path, &gz_path)?;
        // The uncompressed tar is dead weight from here on.
        fs::remove_file(&tar_path)?;

        info!("encrypting archive");
        let artifact_name = backup_file_name(&self.config.backup_file_base, Local::now());
        let dest_gz = self.config.dest_dir.join(&artifact_name);
        fs::copy(&gz_path, &dest_gz)?;

        let encrypted = match self.cipher.encrypt(&dest_gz, &self.config.password_file) {
            Ok(path) => path,
            Err(e) => {
                // Never leave the unencrypted copy behind in the destination.
                let _ = fs::remove_file(&dest_gz);
                return Err(e);
            }
        };
        fs::remove_file(&dest_gz)?;

        info!("rotating old backups");
        rotate_backups(
            &self.config.dest_dir,
            &self.config.backup_file_base,
            self.cipher.suffix(),
            self.config.max_backups,
            &self.warnings,
        )?;

        let digest = sha256_file(&encrypted)?;
        info!(
            artifact = %encrypted.display(),
            sha256 = %digest,
            files = stats.files_processed,
            skipped = stats.entries_skipped,
            "backup completed successfully"
        );
        Ok(encrypted)
    }

    fn build_archive(&self, tar_path: &Path) -> Result<ArchiveStats> {
        let preserver =
            PathPreserver::new(self.config.preserve_levels, Arc::clone(&self.warnings));
        let builder = ArchiveBuilder::new(preserver, Arc::clone(&self.warnings));
        builder.build(&self.config.backup_dirs, tar_path)
    }
}

/// Engine for restoring an encrypted artifact into a directory.
///
/// The pipeline mirrors the backup run in reverse: decrypt into staging,
/// decompress into staging, then extract. Every archive entry name is
/// checked before anything is written; one unsafe name rejects the whole
/// archive with zero files extracted.
pub struct RestoreEngine<C>
where
    C: CipherTool,
{
    config: RestoreConfig,
    cipher: C,
    warnings: Arc<WarningLog>,
}

impl RestoreEngine<GpgCipher> {
    /// Build an engine from validated configuration, decrypting with gpg.
    /// The extraction directory is created here if it does not exist yet.
    pub fn from_config(config: RestoreConfig) -> Result<Self> {
        config.validate()?;
        fs::create_dir_all(&config.extract_path)?;
        let warnings = Arc::new(WarningLog::for_restore(&config.extract_path)?);
        let cipher = GpgCipher::new(Arc::clone(&warnings));
        Self::with_cipher(config, cipher, warnings)
    }
}

impl<C> RestoreEngine<C>
where
    C: CipherTool,
{
    /// Build an engine around an explicit cipher tool. The caller is
    /// responsible for the extraction directory existing.
    pub fn with_cipher(
        config: RestoreConfig,
        cipher: C,
        warnings: Arc<WarningLog>,
    ) -> Result<Self> {
        if !cipher.is_available() {
            return Err(BackupError::encryption(format!(
                "{} is not available on this system",
                cipher.name()
            )));
        }
        Ok(Self {
            config,
            cipher,
            warnings,
        })
    }

    /// Run the full restore pipeline.
    pub fn run(&self) -> Result<()> {
        match self.run_pipeline() {
            Ok(()) => Ok(()),
            Err(e) => {
                self.warnings.error(&format!("Restore failed: {e}"));
                Err(BackupError::RestoreFailed(e.to_string()))
            }
        }
    }

    fn run_pipeline(&self) -> Result<()> {
        info!(
            backup = %self.config.backup_file.display(),
            extract = %self.config.extract_path.display(),
            "starting restore"
        );

        let staging = StagingArea::new()?;
        let gz_path = staging.file("backup.gz");
        let tar_path = staging.file("backup.tar");

        info!("decrypting backup file");
        self.cipher
            .decrypt(&self.config.backup_file, &gz_path, &self.config.password_file)?;

        info!("decompressing backup file");
        decompress_file(&gz_path, &tar_path)?;

        info!(extract = %self.config.extract_path.display(), "extracting files");
        self.extract_archive(&tar_path)?;

        info!("restore completed successfully");
        Ok(())
    }

    /// Validate every entry name, then extract. The archive is read twice
    /// so a malicious entry late in the stream still means nothing was
    /// written at all.
    fn extract_archive(&self, tar_path: &Path) -> Result<()> {
        let mut archive = Archive::new(File::open(tar_path)?);
        for entry in archive.entries()? {
            let entry = entry?;
            let name = entry.path()?;
            if !entry_name_is_safe(&name) {
                let message =
                    format!("Potentially unsafe path in archive: {}", name.display());
                self.warnings.warn(&message);
                return Err(BackupError::validation(message));
            }
        }

        let mut archive = Archive::new(File::open(tar_path)?);
        archive
            .unpack(&self.config.extract_path)
            .map_err(|e| BackupError::directory(format!("Extraction failed: {e}")))
    }
}
