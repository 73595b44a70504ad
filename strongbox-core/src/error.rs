/*!
Error types for the strongbox core engine.
*/

use thiserror::Error;

/// Result type used throughout the strongbox core.
pub type Result<T> = std::result::Result<T, BackupError>;

/// Errors that can occur during backup and restore operations.
#[derive(Error, Debug)]
pub enum BackupError {
    /// I/O errors during file operations
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file parse errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Tree traversal, unsafe-path and extraction errors
    #[error("Directory error: {0}")]
    Directory(String),

    /// Compression/decompression errors
    #[error("Compression error: {0}")]
    Compression(String),

    /// Encryption/decryption errors
    #[error("Encryption error: {0}")]
    Encryption(String),

    /// Configuration validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Database snapshot errors
    #[cfg(feature = "sqlite")]
    #[error("SQLite error: {0}")]
    Sqlite(String),

    /// Top-level wrap for a failed backup run
    #[error("Backup failed: {0}")]
    BackupFailed(String),

    /// Top-level wrap for a failed restore run
    #[error("Restore failed: {0}")]
    RestoreFailed(String),
}

impl BackupError {
    /// Create a new directory error
    pub fn directory<S: Into<String>>(msg: S) -> Self {
        Self::Directory(msg.into())
    }

    /// Create a new compression error
    pub fn compression<S: Into<String>>(msg: S) -> Self {
        Self::Compression(msg.into())
    }

    /// Create a new encryption error
    pub fn encryption<S: Into<String>>(msg: S) -> Self {
        Self::Encryption(msg.into())
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a new database snapshot error
    #[cfg(feature = "sqlite")]
    pub fn sqlite<S: Into<String>>(msg: S) -> Self {
        Self::Sqlite(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_error_display() {
        let error = BackupError::validation("missing destination");
        assert_eq!(error.to_string(), "Validation error: missing destination");

        let error = BackupError::compression("both codecs failed");
        assert_eq!(error.to_string(), "Compression error: both codecs failed");

        let error = BackupError::encryption("gpg exited with status 2");
        assert_eq!(error.to_string(), "Encryption error: gpg exited with status 2");

        let error = BackupError::directory("unsafe path in archive");
        assert_eq!(error.to_string(), "Directory error: unsafe path in archive");
    }

    #[test]
    fn test_error_from_io_error() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let error = BackupError::from(io_error);

        match error {
            BackupError::Io(_) => {}
            _ => panic!("Expected Io error variant"),
        }
    }

    #[test]
    fn test_boundary_wraps_carry_cause_message() {
        let cause = BackupError::compression("pigz and gzip both failed");
        let wrapped = BackupError::BackupFailed(cause.to_string());
        assert!(wrapped.to_string().contains("pigz and gzip both failed"));

        let cause = BackupError::encryption("bad passphrase");
        let wrapped = BackupError::RestoreFailed(cause.to_string());
        assert!(wrapped.to_string().starts_with("Restore failed:"));
        assert!(wrapped.to_string().contains("bad passphrase"));
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<BackupError>();
        assert_sync::<BackupError>();
    }

    #[test]
    fn test_error_result_type() {
        fn returns_error() -> crate::Result<()> {
            Err(BackupError::validation("test error"))
        }

        let result = returns_error();
        assert!(result.is_err());
    }
}
