/*!
# Strongbox Core

Encrypted, compressed directory backup and restore pipeline.

This crate provides the engine for taking directory trees to encrypted
artifacts in a destination directory and back again:

- Staged pipeline: tar container, gzip compression, gpg encryption
- Path preservation so sibling targets with identical leaf names stay
  distinct inside the archive
- Retention rotation of encrypted artifacts in the destination
- Validated extraction that refuses an archive outright if any entry name
  could land outside the extraction directory
- Safe snapshots of live SQLite databases (feature `sqlite`, on by default)

## Architecture

Each stage sits behind a small seam. Compression codecs and cipher tools are
traits, the engines are generic over them, and tests substitute doubles
where the real tools would need external binaries. Operational warnings flow
through an injected [`WarningLog`] that persists every line to a log file
next to the artifacts it describes, in addition to normal tracing output.

## Usage

```rust,no_run
use strongbox_core::{BackupConfig, BackupEngine};

let config = BackupConfig {
    backup_dirs: vec!["/var/lib/app".into()],
    dest_dir: "/backups".into(),
    backup_file_base: "app".into(),
    password_file: "/etc/strongbox/passphrase".into(),
    max_backups: 7,
    preserve_levels: 2,
};

let engine = BackupEngine::from_config(config)?;
let artifact = engine.run()?;
println!("wrote {}", artifact.display());
# Ok::<(), strongbox_core::BackupError>(())
```
*/

pub mod config;
pub mod error;
pub mod warnlog;
pub mod paths;
pub mod staging;
pub mod archive;
pub mod compression;
pub mod encryption;
pub mod rotate;
pub mod engine;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use archive::{ArchiveBuilder, ArchiveStats, DEFAULT_EXCLUDES};
pub use compression::{decompress_file, Codec, Compressor, GzipCodec, PigzCodec};
pub use config::{BackupConfig, RestoreConfig};
pub use encryption::{encrypted_name, CipherTool, GpgCipher, GPG_SUFFIX};
pub use engine::{backup_file_name, sha256_file, BackupEngine, RestoreEngine};
pub use error::{BackupError, Result};
pub use paths::{PathPreserver, DEFAULT_PRESERVE_LEVELS};
pub use rotate::{list_artifacts, rotate_backups, ArtifactInfo};
pub use staging::StagingArea;
pub use warnlog::WarningLog;

#[cfg(feature = "sqlite")]
pub use sqlite::{is_sqlite_database, SqliteStager, StageSummary};
