/*!
Strongbox CLI - command-line frontend for the strongbox backup pipeline.

Wraps the core engines with configuration loading, logging setup, and a
listing view of the encrypted artifacts in the destination directory. Every
subcommand accepts a JSON configuration file, standalone flags, or a file
with flag overrides; the engines only ever see a fully resolved config.
*/

use std::path::PathBuf;
use std::time::SystemTime;

use clap::{Parser, Subcommand};
use strongbox_core::{
    list_artifacts, BackupConfig, BackupEngine, RestoreConfig, RestoreEngine,
    DEFAULT_PRESERVE_LEVELS, GPG_SUFFIX,
};
use tabled::{Table, Tabled};
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "strongbox")]
#[command(about = "Encrypted, compressed directory backup and restore")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a full backup: archive, compress, encrypt, rotate
    Backup {
        /// Path to the JSON configuration file; flags below override it
        #[arg(short, long, env = "STRONGBOX_CONFIG")]
        config: Option<PathBuf>,

        /// Directory to back up; repeatable, replaces the configured list
        #[arg(long)]
        source: Vec<PathBuf>,

        /// Destination directory for encrypted artifacts
        #[arg(long)]
        dest: Option<PathBuf>,

        /// Base name shared by every artifact generation
        #[arg(long)]
        base: Option<String>,

        /// Passphrase file for encryption
        #[arg(long)]
        passphrase_file: Option<PathBuf>,

        /// Retained artifact count after rotation
        #[arg(long)]
        max_backups: Option<usize>,

        /// Trailing source-root segments kept in archive entry names
        #[arg(long)]
        preserve_levels: Option<usize>,
    },
    /// Restore an encrypted backup into a directory
    Restore {
        /// Path to the JSON configuration file; flags below override it
        #[arg(short, long, env = "STRONGBOX_CONFIG")]
        config: Option<PathBuf>,

        /// Encrypted backup artifact to restore
        #[arg(long)]
        artifact: Option<PathBuf>,

        /// Directory to extract into (created if missing)
        #[arg(long)]
        extract_to: Option<PathBuf>,

        /// Passphrase file for decryption
        #[arg(long)]
        passphrase_file: Option<PathBuf>,
    },
    /// List encrypted artifacts in the destination directory
    List {
        /// Path to the JSON configuration file; flags below override it
        #[arg(short, long, env = "STRONGBOX_CONFIG")]
        config: Option<PathBuf>,

        /// Destination directory holding the artifacts
        #[arg(long)]
        dest: Option<PathBuf>,

        /// Base name the artifacts share
        #[arg(long)]
        base: Option<String>,
    },
}

#[derive(Tabled)]
struct ArtifactRow {
    #[tabled(rename = "Artifact")]
    name: String,
    #[tabled(rename = "Size")]
    size: String,
    #[tabled(rename = "Modified")]
    modified: String,
}

fn main() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    match cli.command {
        Commands::Backup {
            config,
            source,
            dest,
            base,
            passphrase_file,
            max_backups,
            preserve_levels,
        } => {
            let config = resolve_backup_config(
                config,
                source,
                dest,
                base,
                passphrase_file,
                max_backups,
                preserve_levels,
            )?;
            run_backup(config)?
        }
        Commands::Restore {
            config,
            artifact,
            extract_to,
            passphrase_file,
        } => {
            let config = resolve_restore_config(config, artifact, extract_to, passphrase_file)?;
            run_restore(config)?
        }
        Commands::List { config, dest, base } => list_backups(config, dest, base)?,
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug"))
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn resolve_backup_config(
    config: Option<PathBuf>,
    source: Vec<PathBuf>,
    dest: Option<PathBuf>,
    base: Option<String>,
    passphrase_file: Option<PathBuf>,
    max_backups: Option<usize>,
    preserve_levels: Option<usize>,
) -> Result<BackupConfig, anyhow::Error> {
    match config {
        Some(path) => {
            info!("Loading configuration from {}", path.display());
            let mut resolved = BackupConfig::load(&path)?;
            if !source.is_empty() {
                resolved.backup_dirs = source;
            }
            if let Some(dir) = dest {
                resolved.dest_dir = dir;
            }
            if let Some(name) = base {
                resolved.backup_file_base = name;
            }
            if let Some(file) = passphrase_file {
                resolved.password_file = file;
            }
            if let Some(count) = max_backups {
                resolved.max_backups = count;
            }
            if let Some(levels) = preserve_levels {
                resolved.preserve_levels = levels;
            }
            Ok(resolved)
        }
        None => {
            if source.is_empty() {
                anyhow::bail!("--source is required without --config");
            }
            Ok(BackupConfig {
                backup_dirs: source,
                dest_dir: dest
                    .ok_or_else(|| anyhow::anyhow!("--dest is required without --config"))?,
                backup_file_base: base
                    .ok_or_else(|| anyhow::anyhow!("--base is required without --config"))?,
                password_file: passphrase_file.ok_or_else(|| {
                    anyhow::anyhow!("--passphrase-file is required without --config")
                })?,
                max_backups: max_backups.ok_or_else(|| {
                    anyhow::anyhow!("--max-backups is required without --config")
                })?,
                preserve_levels: preserve_levels.unwrap_or(DEFAULT_PRESERVE_LEVELS),
            })
        }
    }
}

fn resolve_restore_config(
    config: Option<PathBuf>,
    artifact: Option<PathBuf>,
    extract_to: Option<PathBuf>,
    passphrase_file: Option<PathBuf>,
) -> Result<RestoreConfig, anyhow::Error> {
    match config {
        Some(path) => {
            info!("Loading configuration from {}", path.display());
            let mut resolved = RestoreConfig::load(&path)?;
            if let Some(file) = artifact {
                resolved.backup_file = file;
            }
            if let Some(dir) = extract_to {
                resolved.extract_path = dir;
            }
            if let Some(file) = passphrase_file {
                resolved.password_file = file;
            }
            Ok(resolved)
        }
        None => Ok(RestoreConfig {
            backup_file: artifact
                .ok_or_else(|| anyhow::anyhow!("--artifact is required without --config"))?,
            extract_path: extract_to
                .ok_or_else(|| anyhow::anyhow!("--extract-to is required without --config"))?,
            password_file: passphrase_file.ok_or_else(|| {
                anyhow::anyhow!("--passphrase-file is required without --config")
            })?,
        }),
    }
}

fn run_backup(config: BackupConfig) -> Result<(), anyhow::Error> {
    let engine = BackupEngine::from_config(config)?;
    match engine.run() {
        Ok(artifact) => {
            println!("✓ Backup completed: {}", artifact.display());
            Ok(())
        }
        Err(e) => {
            error!("✗ {}", e);
            Err(e.into())
        }
    }
}

fn run_restore(config: RestoreConfig) -> Result<(), anyhow::Error> {
    let extract_path = config.extract_path.clone();
    let engine = RestoreEngine::from_config(config)?;
    match engine.run() {
        Ok(()) => {
            println!("✓ Restore completed into {}", extract_path.display());
            Ok(())
        }
        Err(e) => {
            error!("✗ {}", e);
            Err(e.into())
        }
    }
}

fn list_backups(
    config: Option<PathBuf>,
    dest: Option<PathBuf>,
    base: Option<String>,
) -> Result<(), anyhow::Error> {
    let (dest_dir, file_base) = match config {
        Some(path) => {
            let loaded = BackupConfig::load(&path)?;
            (
                dest.unwrap_or(loaded.dest_dir),
                base.unwrap_or(loaded.backup_file_base),
            )
        }
        None => (
            dest.ok_or_else(|| anyhow::anyhow!("--dest is required without --config"))?,
            base.ok_or_else(|| anyhow::anyhow!("--base is required without --config"))?,
        ),
    };

    let artifacts = list_artifacts(&dest_dir, &file_base, GPG_SUFFIX)?;
    if artifacts.is_empty() {
        println!("No backups found in {}", dest_dir.display());
        return Ok(());
    }

    let rows: Vec<ArtifactRow> = artifacts
        .into_iter()
        .map(|artifact| ArtifactRow {
            name: artifact.name,
            size: format_size(artifact.size),
            modified: format_timestamp(artifact.modified),
        })
        .collect();

    let table = Table::new(rows);
    println!("{table}");
    Ok(())
}

fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.1} {}", size, UNITS[unit_index])
    }
}

fn format_timestamp(time: SystemTime) -> String {
    chrono::DateTime::<chrono::Local>::from(time)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}
