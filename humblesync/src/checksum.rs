//! Dual SHA-1/MD5 checksum engine.
//!
//! The storefront supplies SHA-1 and/or MD5 digests per download struct, so
//! integrity verification computes both in one pass: every chunk read from
//! disk (or received from the network) feeds both hashers. Memory stays
//! bounded for multi-gigabyte files because nothing is ever buffered beyond
//! one chunk.
//!
//! [`verify`] is cache-aware: a digest pair already present in the checksum
//! cache short-circuits file I/O entirely unless the caller forces a
//! recomputation.

use std::io;
use std::path::{Path, PathBuf};

use md5::Md5;
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use tokio::io::AsyncReadExt;
use tracing::debug;

use crate::cache::SharedCache;
use crate::item::DownloadInfo;
use crate::progress::ProgressSink;

/// Chunk size for reading files during checksum calculation (64KB).
pub const BUFFER_SIZE: usize = 64 * 1024;

/// Result type for checksum operations.
pub type ChecksumResult<T> = Result<T, ChecksumError>;

/// Errors that can occur while hashing local files.
#[derive(Debug)]
pub enum ChecksumError {
    /// Failed to open or read a file.
    ///
    /// This is a hard error: an unreadable file must never be reported as
    /// a verification mismatch.
    ReadFailed { path: PathBuf, source: io::Error },
}

impl std::fmt::Display for ChecksumError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ReadFailed { path, source } => {
                write!(f, "failed to read {}: {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for ChecksumError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ReadFailed { source, .. } => Some(source),
        }
    }
}

/// A SHA-1/MD5 digest pair, hex-encoded lower-case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checksums {
    pub sha1: String,
    pub md5: String,
}

/// Incremental hasher feeding both digest algorithms.
#[derive(Default)]
pub struct DualHasher {
    sha1: Sha1,
    md5: Md5,
}

impl DualHasher {
    /// Creates a fresh hasher pair.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one chunk to both digests.
    pub fn update(&mut self, chunk: &[u8]) {
        self.sha1.update(chunk);
        self.md5.update(chunk);
    }

    /// Consumes the hasher and returns both digests.
    pub fn finalize(self) -> Checksums {
        Checksums {
            sha1: format!("{:x}", self.sha1.finalize()),
            md5: format!("{:x}", self.md5.finalize()),
        }
    }
}

/// Computes both digests of a file, reporting per-chunk progress.
///
/// # Errors
///
/// Returns [`ChecksumError::ReadFailed`] if the file cannot be opened or
/// read; the caller decides whether that means "effectively absent" or is
/// fatal.
pub async fn hash_file(path: &Path, sink: &dyn ProgressSink) -> ChecksumResult<Checksums> {
    let read_failed = |source: io::Error| ChecksumError::ReadFailed {
        path: path.to_path_buf(),
        source,
    };

    let mut file = tokio::fs::File::open(path).await.map_err(read_failed)?;
    let size = file.metadata().await.map_err(read_failed)?.len();

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let handle = sink.begin(&format!("Hashing: {}", file_name), Some(size));

    let mut hasher = DualHasher::new();
    let mut buffer = vec![0u8; BUFFER_SIZE];
    loop {
        let bytes_read = file.read(&mut buffer).await.map_err(read_failed)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
        handle.advance(bytes_read as u64);
    }
    handle.finish();

    Ok(hasher.finalize())
}

/// Checks whether the file behind `item` matches its vendor digests.
///
/// - Missing file: `Ok(false)` without any hashing.
/// - Cache hit on the item's identity: compares the cached pair unless
///   `force` requests a recomputation.
/// - Otherwise: hashes the file, stores the fresh pair in the cache, then
///   compares.
///
/// A match requires either the SHA-1 or the MD5 to equal the corresponding
/// vendor value (records often carry only one); comparison is
/// case-insensitive. An item with no vendor digest at all never verifies.
pub async fn verify(
    item: &DownloadInfo,
    cache: &SharedCache,
    sink: &dyn ProgressSink,
    force: bool,
) -> ChecksumResult<bool> {
    match tokio::fs::metadata(&item.file_path).await {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(source) => {
            return Err(ChecksumError::ReadFailed {
                path: item.file_path.clone(),
                source,
            })
        }
    }

    let cached = if force { None } else { cache.get(&item.file_name) };
    let checksums = match cached {
        Some(checksums) => {
            debug!(file = %item.file_name, "Using cached checksums");
            checksums
        }
        None => {
            let checksums = hash_file(&item.file_path, sink).await?;
            cache.insert(&item.file_name, checksums.clone());
            checksums
        }
    };

    Ok(item.matches_checksums(&checksums))
}
