/*!
Symmetric passphrase encryption through an external tool.

The pipeline talks to a `CipherTool` seam rather than a specific binary. The
shipped implementation drives GnuPG as a non-interactive subprocess; a
library-backed implementation can slot in behind the same trait without
touching the orchestrators. GnuPG writes diagnostic chatter to stderr during
perfectly successful runs, so stderr is always surfaced as a warning and only
a non-zero exit status counts as failure. The passphrase itself is read by
the tool from a file and never appears in logs.
*/

use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use std::sync::Arc;

use tracing::info;

use crate::error::BackupError;
use crate::warnlog::WarningLog;
use crate::Result;

/// Symmetric passphrase-based encryption seam.
pub trait CipherTool {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// File name suffix appended to encrypted artifacts, without the dot.
    fn suffix(&self) -> &'static str;

    /// Whether the tool can run on the current host.
    fn is_available(&self) -> bool;

    /// Encrypt `input` to its `{input}.{suffix}` sibling and return that path.
    fn encrypt(&self, input: &Path, passphrase_file: &Path) -> Result<PathBuf>;

    /// Decrypt `input` into `output`.
    fn decrypt(&self, input: &Path, output: &Path, passphrase_file: &Path) -> Result<()>;
}

/// Artifact suffix used by [`GpgCipher`], without the dot.
pub const GPG_SUFFIX: &str = "gpg";

/// Sibling path an encrypted artifact lands at.
pub fn encrypted_name(input: &Path, suffix: &str) -> PathBuf {
    let mut name = input.as_os_str().to_os_string();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}

/// GnuPG symmetric encryption, invoked as a subprocess.
pub struct GpgCipher {
    warnings: Arc<WarningLog>,
}

impl GpgCipher {
    pub fn new(warnings: Arc<WarningLog>) -> Self {
        Self { warnings }
    }

    fn finish(&self, output: Output, action: &str) -> Result<()> {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let stderr = stderr.trim();
        if !stderr.is_empty() {
            // Chatter on stderr is normal for gpg and not a failure by itself.
            self.warnings.warn(&format!("gpg output: {stderr}"));
        }
        if !output.status.success() {
            return Err(BackupError::encryption(format!(
                "gpg {action} exited with {}: {stderr}",
                output.status
            )));
        }
        Ok(())
    }
}

impl CipherTool for GpgCipher {
    fn name(&self) -> &'static str {
        "gpg"
    }

    fn suffix(&self) -> &'static str {
        GPG_SUFFIX
    }

    fn is_available(&self) -> bool {
        Command::new("gpg")
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|status| status.success())
            .unwrap_or(false)
    }

    fn encrypt(&self, input: &Path, passphrase_file: &Path) -> Result<PathBuf> {
        info!(input = %input.display(), "encrypting artifact");
        let output = Command::new("gpg")
            .arg("--batch")
            .arg("--yes")
            .arg("--passphrase-file")
            .arg(passphrase_file)
            .arg("-c")
            .arg(input)
            .output()
            .map_err(|e| BackupError::encryption(format!("could not run gpg: {e}")))?;

        self.finish(output, "encryption")?;
        Ok(encrypted_name(input, self.suffix()))
    }

    fn decrypt(&self, input: &Path, output: &Path, passphrase_file: &Path) -> Result<()> {
        info!(input = %input.display(), "decrypting artifact");
        let result = Command::new("gpg")
            .arg("--batch")
            .arg("--yes")
            .arg("--passphrase-file")
            .arg(passphrase_file)
            .arg("--output")
            .arg(output)
            .arg("--decrypt")
            .arg(input)
            .output()
            .map_err(|e| BackupError::encryption(format!("could not run gpg: {e}")))?;

        self.finish(result, "decryption")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_encrypted_name_appends_suffix() {
        assert_eq!(
            encrypted_name(Path::new("/backups/nightly.20250101120000.gz"), "gpg"),
            PathBuf::from("/backups/nightly.20250101120000.gz.gpg")
        );
    }

    #[test]
    fn test_gpg_roundtrip() {
        let dir = TempDir::new().unwrap();
        let warnings = Arc::new(WarningLog::for_backup(dir.path()).unwrap());
        let cipher = GpgCipher::new(warnings);
        if !cipher.is_available() {
            eprintln!("gpg not installed, skipping");
            return;
        }

        let passphrase = dir.path().join("pw.txt");
        fs::write(&passphrase, "correct horse battery staple\n").unwrap();

        let plaintext = dir.path().join("payload.gz");
        fs::write(&plaintext, b"compressed archive bytes").unwrap();

        let encrypted = match cipher.encrypt(&plaintext, &passphrase) {
            Ok(path) => path,
            Err(e) => {
                eprintln!("gpg not usable in batch mode ({e}), skipping");
                return;
            }
        };
        assert_eq!(encrypted, dir.path().join("payload.gz.gpg"));
        assert!(encrypted.is_file());
        assert_ne!(fs::read(&encrypted).unwrap(), b"compressed archive bytes");

        let decrypted = dir.path().join("payload.out");
        cipher.decrypt(&encrypted, &decrypted, &passphrase).unwrap();
        assert_eq!(fs::read(&decrypted).unwrap(), b"compressed archive bytes");
    }
}
