//! # Extractor
//!
//! Streaming, defensive extraction of gzip-compressed tar archives received
//! from untrusted clients.
//!
//! The archive is decoded and written in a single pass without buffering it
//! in memory. Three attack classes are handled at the same time:
//!
//! - **Path traversal**: every entry name is resolved against the destination
//!   root and rejected if it escapes it (`..` segments, absolute names).
//! - **Size bombs**: per-file and cumulative limits are enforced against bytes
//!   actually written, never against sizes declared in entry headers.
//! - **Links**: symbolic and hard link entries abort the extraction.
//!
//! Special files (fifos, devices) are skipped with a warning.
//!
//! ## Example
//!
//! ```rust,no_run
//! use extractor::{extract_with_limits, Limits};
//! use std::fs::File;
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let archive = File::open("bundle.tar.gz")?;
//! let limits = Limits::default();
//!
//! let stats = extract_with_limits(Path::new("output"), archive, &limits)?;
//!
//! println!("Extracted {} files ({} bytes)", stats.files_extracted, stats.bytes_written);
//! # Ok(())
//! # }
//! ```

pub mod accountant;
pub mod error;
pub mod extract;
pub mod safety;
pub mod types;

// Re-export main types
pub use error::{ExtractError, SecurityError, SizeLimitError};
pub use safety::EntryType;
pub use types::{ExtractStats, Limits, MAX_FILE_SIZE, MAX_TOTAL_SIZE};

use std::io::Read;
use std::path::Path;

/// Extract a gzip-compressed tar stream with the default [`Limits`].
///
/// # Errors
///
/// Returns an error if:
/// - The stream is not valid gzip or tar, or is truncated
/// - An entry resolves outside `destination`
/// - A per-file or total size limit is exceeded
/// - The archive contains a symbolic or hard link
/// - A directory or file cannot be created or written
pub fn extract<R: Read>(destination: &Path, input: R) -> Result<ExtractStats, ExtractError> {
    extract::extract_archive(destination, input, &Limits::default())
}

/// Extract a gzip-compressed tar stream with explicit size limits.
///
/// Each call keeps its own running totals, so concurrent calls into
/// non-overlapping destinations are independent.
pub fn extract_with_limits<R: Read>(
    destination: &Path,
    input: R,
    limits: &Limits,
) -> Result<ExtractStats, ExtractError> {
    extract::extract_archive(destination, input, limits)
}
