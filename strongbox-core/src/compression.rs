/*!
Compression strategies for the container archive.

The compressor holds a ranked list of codec candidates and tries them in
order: a parallel subprocess codec (`pigz`) for throughput, then the built-in
single-threaded gzip encoder. A candidate that is unavailable or fails is a
warning, not an error; the run only fails when every candidate does. Both
candidates emit standard gzip streams, so a single decompressor serves either
producer.
*/

use std::fs::File;
use std::io::{self, BufReader};
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::Arc;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use tracing::info;

use crate::error::BackupError;
use crate::warnlog::WarningLog;
use crate::Result;

/// Fixed moderate level for the single-threaded fallback codec.
const FALLBACK_GZIP_LEVEL: u32 = 6;

/// One compression strategy the pipeline can try.
///
/// Implementations must produce a stream that `decompress_file` accepts, so
/// the restore path never needs to know which candidate ran.
pub trait Codec {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Whether this codec can run on the current host.
    fn is_available(&self) -> bool;

    /// Compress `input` into `output`, replacing any existing file there.
    fn compress(&self, input: &Path, output: &Path) -> Result<()>;
}

/// Parallel gzip through the `pigz` binary.
#[derive(Debug, Clone, Default)]
pub struct PigzCodec;

impl PigzCodec {
    pub fn new() -> Self {
        Self
    }
}

impl Codec for PigzCodec {
    fn name(&self) -> &'static str {
        "pigz"
    }

    fn is_available(&self) -> bool {
        Command::new("pigz")
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|status| status.success())
            .unwrap_or(false)
    }

    fn compress(&self, input: &Path, output: &Path) -> Result<()> {
        let stdin = File::open(input)?;
        let stdout = File::create(output)?;

        let result = Command::new("pigz")
            .arg("-c")
            .stdin(Stdio::from(stdin))
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::piped())
            .output()?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(BackupError::compression(format!(
                "pigz exited with {}: {}",
                result.status,
                stderr.trim()
            )));
        }
        Ok(())
    }
}

/// Single-threaded gzip through flate2, the always-available fallback.
#[derive(Debug, Clone)]
pub struct GzipCodec {
    level: Compression,
}

impl GzipCodec {
    pub fn new() -> Self {
        Self {
            level: Compression::new(FALLBACK_GZIP_LEVEL),
        }
    }
}

impl Default for GzipCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Codec for GzipCodec {
    fn name(&self) -> &'static str {
        "gzip"
    }

    fn is_available(&self) -> bool {
        true
    }

    fn compress(&self, input: &Path, output: &Path) -> Result<()> {
        let mut reader = BufReader::new(File::open(input)?);
        let mut encoder = GzEncoder::new(File::create(output)?, self.level);

        io::copy(&mut reader, &mut encoder)
            .map_err(|e| BackupError::compression(format!("gzip encoding failed: {e}")))?;
        encoder
            .finish()
            .map_err(|e| BackupError::compression(format!("gzip encoding failed: {e}")))?;
        Ok(())
    }
}

/// Ranked candidate list driving the compression stage.
pub struct Compressor {
    candidates: Vec<Box<dyn Codec>>,
    warnings: Arc<WarningLog>,
}

impl Compressor {
    /// Default ranking: parallel pigz first, built-in gzip as fallback.
    pub fn new(warnings: Arc<WarningLog>) -> Self {
        Self::with_candidates(
            vec![Box::new(PigzCodec::new()), Box::new(GzipCodec::new())],
            warnings,
        )
    }

    /// Build a compressor with an explicit candidate ranking.
    pub fn with_candidates(candidates: Vec<Box<dyn Codec>>, warnings: Arc<WarningLog>) -> Self {
        Self {
            candidates,
            warnings,
        }
    }

    /// Compress `input` into `output` using the first candidate that works.
    pub fn compress_file(&self, input: &Path, output: &Path) -> Result<()> {
        for codec in &self.candidates {
            if !codec.is_available() {
                self.warnings.warn(&format!(
                    "{} not available, falling back to next codec",
                    codec.name()
                ));
                continue;
            }

            info!(codec = codec.name(), "compressing archive");
            match codec.compress(input, output) {
                Ok(()) => {
                    info!(codec = codec.name(), "compression completed successfully");
                    return Ok(());
                }
                Err(e) => {
                    self.warnings.warn(&format!(
                        "{} failed: {e}, falling back to next codec",
                        codec.name()
                    ));
                }
            }
        }

        Err(BackupError::compression("no compression codec succeeded"))
    }
}

/// Decompress a gzip stream produced by any of the codecs.
pub fn decompress_file(input: &Path, output: &Path) -> Result<()> {
    let mut decoder = GzDecoder::new(BufReader::new(File::open(input)?));
    let mut writer = File::create(output)?;

    io::copy(&mut decoder, &mut writer)
        .map_err(|e| BackupError::compression(format!("decompression failed: {e}")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    /// Candidate that claims availability and then always fails.
    struct BrokenCodec;

    impl Codec for BrokenCodec {
        fn name(&self) -> &'static str {
            "broken"
        }
        fn is_available(&self) -> bool {
            true
        }
        fn compress(&self, _input: &Path, _output: &Path) -> Result<()> {
            Err(BackupError::compression("synthetic failure"))
        }
    }

    /// Candidate that must never be asked to compress.
    struct AbsentCodec;

    impl Codec for AbsentCodec {
        fn name(&self) -> &'static str {
            "absent"
        }
        fn is_available(&self) -> bool {
            false
        }
        fn compress(&self, _input: &Path, _output: &Path) -> Result<()> {
            panic!("unavailable codec must not be invoked");
        }
    }

    fn warnings(dir: &TempDir) -> Arc<WarningLog> {
        Arc::new(WarningLog::for_backup(dir.path()).unwrap())
    }

    #[test]
    fn test_gzip_codec_file_roundtrip() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("archive.tar");
        let compressed = dir.path().join("archive.tar.gz");
        let restored = dir.path().join("archive.out");

        let payload = b"streaming archive payload ".repeat(500);
        fs::write(&input, &payload).unwrap();

        GzipCodec::new().compress(&input, &compressed).unwrap();
        assert!(fs::metadata(&compressed).unwrap().len() < payload.len() as u64);

        decompress_file(&compressed, &restored).unwrap();
        assert_eq!(fs::read(&restored).unwrap(), payload);
    }

    #[test]
    fn test_gzip_codec_empty_input() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("empty.tar");
        let compressed = dir.path().join("empty.tar.gz");
        let restored = dir.path().join("empty.out");
        fs::write(&input, b"").unwrap();

        GzipCodec::new().compress(&input, &compressed).unwrap();
        decompress_file(&compressed, &restored).unwrap();
        assert_eq!(fs::read(&restored).unwrap(), b"");
    }

    #[test]
    fn test_decompress_rejects_garbage() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("garbage.gz");
        fs::write(&input, b"this is not a gzip stream").unwrap();

        let result = decompress_file(&input, &dir.path().join("out"));
        assert!(matches!(result, Err(BackupError::Compression(_))));
    }

    #[test]
    fn test_unavailable_candidate_is_skipped() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("data.tar");
        let output = dir.path().join("data.tar.gz");
        fs::write(&input, b"payload payload payload").unwrap();

        let compressor = Compressor::with_candidates(
            vec![Box::new(AbsentCodec), Box::new(GzipCodec::new())],
            warnings(&dir),
        );
        compressor.compress_file(&input, &output).unwrap();

        let restored = dir.path().join("data.out");
        decompress_file(&output, &restored).unwrap();
        assert_eq!(fs::read(&restored).unwrap(), b"payload payload payload");

        let log = fs::read_to_string(dir.path().join(crate::warnlog::BACKUP_WARNING_LOG)).unwrap();
        assert!(log.contains("absent not available"));
    }

    #[test]
    fn test_failed_candidate_falls_back() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("data.tar");
        let output = dir.path().join("data.tar.gz");
        fs::write(&input, b"payload").unwrap();

        let compressor = Compressor::with_candidates(
            vec![Box::new(BrokenCodec), Box::new(GzipCodec::new())],
            warnings(&dir),
        );
        compressor.compress_file(&input, &output).unwrap();

        let log = fs::read_to_string(dir.path().join(crate::warnlog::BACKUP_WARNING_LOG)).unwrap();
        assert!(log.contains("broken failed"));
        assert!(log.contains("synthetic failure"));
    }

    #[test]
    fn test_all_candidates_failing_is_fatal() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("data.tar");
        fs::write(&input, b"payload").unwrap();

        let compressor = Compressor::with_candidates(
            vec![Box::new(BrokenCodec), Box::new(AbsentCodec)],
            warnings(&dir),
        );
        let result = compressor.compress_file(&input, &dir.path().join("out.gz"));
        assert!(matches!(result, Err(BackupError::Compression(_))));
    }

    #[test]
    fn test_pigz_output_matches_fallback_content() {
        let pigz = PigzCodec::new();
        if !pigz.is_available() {
            eprintln!("pigz not installed, skipping");
            return;
        }

        let dir = TempDir::new().unwrap();
        let input = dir.path().join("data.tar");
        let payload = b"parallel and fallback codecs must agree ".repeat(200);
        fs::write(&input, &payload).unwrap();

        let via_pigz = dir.path().join("pigz.gz");
        let via_gzip = dir.path().join("gzip.gz");
        pigz.compress(&input, &via_pigz).unwrap();
        GzipCodec::new().compress(&input, &via_gzip).unwrap();

        let out_pigz = dir.path().join("pigz.out");
        let out_gzip = dir.path().join("gzip.out");
        decompress_file(&via_pigz, &out_pigz).unwrap();
        decompress_file(&via_gzip, &out_gzip).unwrap();

        assert_eq!(fs::read(&out_pigz).unwrap(), payload);
        assert_eq!(fs::read(&out_gzip).unwrap(), payload);
    }
}
