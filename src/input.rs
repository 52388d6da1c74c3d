//! Input file validation and loading.
//!
//! Files are checked by extension and size before anything is read. Gzip
//! payloads pass validation but are refused when loaded since
//! decompression is not supported.

use crate::core::config::InputConfig;
use crate::core::{IntellimetricError, Result};
use crate::pool::ParseTask;
use std::path::{Path, PathBuf};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Failure code for an extension outside the allowed set
pub const INVALID_EXTENSION: &str = "INVALID_EXTENSION";
/// Failure code for a file above the size limit
pub const FILE_TOO_LARGE: &str = "FILE_TOO_LARGE";
/// Failure code for compressed payloads
pub const UNSUPPORTED_ENCODING: &str = "UNSUPPORTED_ENCODING";

/// A file that passed validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidFile {
    pub path: PathBuf,
    pub file_name: String,
    pub size_bytes: u64,
    /// True when the name ends with `.gz`
    pub is_gzipped: bool,
}

/// Checks extension and size of a file without reading it.
pub fn validate_file(path: &Path, size_bytes: u64, config: &InputConfig) -> Result<ValidFile> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let lower = file_name.to_lowercase();
    let is_gzipped = lower.ends_with(".gz");
    let ext = lower.rsplit('.').next().unwrap_or_default();

    let allowed = config
        .allowed_extensions
        .iter()
        .any(|allowed| allowed.eq_ignore_ascii_case(ext));
    if !allowed && !is_gzipped {
        return Err(IntellimetricError::InvalidFile {
            code: INVALID_EXTENSION,
            message: format!("Unsupported file extension: {}", ext),
        });
    }

    if size_bytes > config.max_file_bytes {
        return Err(IntellimetricError::InvalidFile {
            code: FILE_TOO_LARGE,
            message: format!(
                "File size {} bytes exceeds limit of {}",
                size_bytes, config.max_file_bytes
            ),
        });
    }

    Ok(ValidFile {
        path: path.to_path_buf(),
        file_name,
        size_bytes,
        is_gzipped,
    })
}

/// True when the bytes start with the gzip magic number
pub fn is_gzip(bytes: &[u8]) -> bool {
    bytes.starts_with(&GZIP_MAGIC)
}

/// Snapshot id derived from the file stem plus a random suffix
pub fn snapshot_id_for(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "snapshot".to_string());
    format!("{}-{}", stem, hex::encode(rand::random::<[u8; 4]>()))
}

/// Validates and reads a file into a [`ParseTask`].
pub async fn load_task(path: &Path, config: &InputConfig) -> Result<ParseTask> {
    let metadata = tokio::fs::metadata(path).await?;
    let valid = validate_file(path, metadata.len(), config)?;

    let bytes = tokio::fs::read(&valid.path).await?;
    if valid.is_gzipped || is_gzip(&bytes) {
        return Err(IntellimetricError::InvalidFile {
            code: UNSUPPORTED_ENCODING,
            message: format!("{} is gzip-compressed; decompress it first", valid.file_name),
        });
    }

    let raw_text = String::from_utf8(bytes).map_err(|e| {
        IntellimetricError::malformed_input(format!("{} is not valid UTF-8: {}", valid.file_name, e))
    })?;

    tracing::debug!(file_name = %valid.file_name, size = valid.size_bytes, "Loaded input file");
    Ok(ParseTask::new(snapshot_id_for(&valid.path), valid.file_name, raw_text).with_size(valid.size_bytes))
}
