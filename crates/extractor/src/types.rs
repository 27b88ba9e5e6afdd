//! Type definitions for archive extraction.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default per-file limit: 2 GiB.
pub const MAX_FILE_SIZE: u64 = 2 * 1024 * 1024 * 1024;

/// Default limit for all files of one archive together: 8 GiB.
pub const MAX_TOTAL_SIZE: u64 = 8 * 1024 * 1024 * 1024;

/// Size bounds applied to a single extraction call.
///
/// Both bounds are enforced against bytes actually written to disk. The size
/// declared in an entry header is only used for an early rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Limits {
    /// Maximum number of bytes a single regular file may hold
    pub max_file_size: u64,

    /// Maximum number of bytes all regular files of one archive may hold
    pub max_total_size: u64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_file_size: MAX_FILE_SIZE,
            max_total_size: MAX_TOTAL_SIZE,
        }
    }
}

/// Statistics about a completed extraction operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractStats {
    /// Number of regular files written
    pub files_extracted: u64,

    /// Number of directory entries processed (created or already present)
    pub directories_created: u64,

    /// Number of entries skipped because their type is not supported
    pub entries_skipped: u64,

    /// Total bytes written to disk
    pub bytes_written: u64,

    /// Duration of the extraction operation (in seconds)
    #[serde(with = "duration_serde")]
    pub duration: Duration,
}

// Helper module for Duration serialization
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs_f64().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}
