//! Error types for archive extraction operations.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for extraction operations.
///
/// Every variant aborts the whole extraction call. Entries materialized before
/// the failure are left in place; only the failing entry's partial output is
/// removed.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// The input is not valid gzip, not a well-formed tar stream, or was
    /// truncated in the middle of a record.
    #[error("Corrupted archive: {0}")]
    Decode(#[source] io::Error),

    /// A security violation was detected during extraction.
    #[error("Security violation: {0}")]
    Security(#[from] SecurityError),

    /// A per-file or cumulative size bound was exceeded.
    #[error("Size limit exceeded: {0}")]
    SizeLimit(#[from] SizeLimitError),

    /// Creating a directory or writing a file failed.
    #[error("Filesystem error at {}: {source}", path.display())]
    Filesystem {
        /// Path the failing operation targeted
        path: PathBuf,
        /// Underlying OS error
        #[source]
        source: io::Error,
    },
}

impl ExtractError {
    pub(crate) fn filesystem(path: impl Into<PathBuf>, source: io::Error) -> Self {
        ExtractError::Filesystem {
            path: path.into(),
            source,
        }
    }
}

/// Security-related errors during extraction.
#[derive(Debug, Error)]
pub enum SecurityError {
    /// The entry resolves to a path outside the destination root
    /// (e.g. "../../../etc/passwd" or "/etc/passwd").
    #[error("Unsafe path detected: {0}")]
    UnsafePath(String),

    /// Symbolic and hard links are never extracted.
    #[error("Symlinks and hard links are not allowed: {name}")]
    LinkEntry {
        /// Entry name as declared in the archive
        name: String,
        /// Link target as declared in the archive, if any
        target: Option<String>,
    },
}

/// Size accounting violations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SizeLimitError {
    /// The header declares a size above the per-file limit.
    #[error("{name} declares {declared} bytes, above the per-file limit of {limit} bytes")]
    DeclaredFileSize {
        /// Entry name
        name: String,
        /// Size taken from the entry header
        declared: u64,
        /// Configured per-file limit
        limit: u64,
    },

    /// Writing the next chunk would push the current file past the per-file limit.
    #[error("file would reach {attempted} bytes, above the per-file limit of {limit} bytes")]
    FileSize {
        /// Bytes the file would hold after the rejected chunk
        attempted: u64,
        /// Configured per-file limit
        limit: u64,
    },

    /// Writing the next chunk would push the archive past the total limit.
    #[error("archive would reach {attempted} bytes, above the total limit of {limit} bytes")]
    TotalSize {
        /// Bytes the archive would hold after the rejected chunk
        attempted: u64,
        /// Configured total limit
        limit: u64,
    },

    /// The entry produced far more bytes than its own header declared.
    #[error("{name} wrote {written} bytes, more than twice its declared {declared} bytes")]
    DeclaredSizeMismatch {
        /// Entry name
        name: String,
        /// Size taken from the entry header
        declared: u64,
        /// Bytes actually written
        written: u64,
    },
}
