//! Size accounting for a single extraction call.
//!
//! Limits are enforced against bytes that are physically written, never
//! against the sizes declared in entry headers. The declared size only feeds
//! two cheap sanity checks: an early rejection of hostile headers and a ratio
//! check once a file is complete.

use crate::error::SizeLimitError;
use crate::types::Limits;
use std::io::{self, Write};

/// Running byte totals for one extraction call.
#[derive(Debug)]
pub struct SizeAccountant {
    limits: Limits,
    total_written: u64,
}

impl SizeAccountant {
    pub fn new(limits: Limits) -> Self {
        Self {
            limits,
            total_written: 0,
        }
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    /// Bytes written by all files committed so far.
    pub fn total_written(&self) -> u64 {
        self.total_written
    }

    /// Rejects entries whose header already declares more than the per-file limit.
    pub fn check_declared(&self, name: &str, declared: u64) -> Result<(), SizeLimitError> {
        if declared > self.limits.max_file_size {
            return Err(SizeLimitError::DeclaredFileSize {
                name: name.to_string(),
                declared,
                limit: self.limits.max_file_size,
            });
        }
        Ok(())
    }

    /// Checks whether a chunk of `len` bytes may be appended to a file that
    /// already holds `file_written` bytes.
    ///
    /// A chunk that lands exactly on a limit is accepted.
    ///
    /// # Examples
    ///
    /// ```
    /// use extractor::accountant::SizeAccountant;
    /// use extractor::Limits;
    ///
    /// let accountant = SizeAccountant::new(Limits { max_file_size: 10, max_total_size: 20 });
    ///
    /// assert!(accountant.check_chunk(0, 10).is_ok());
    /// assert!(accountant.check_chunk(5, 6).is_err());
    /// ```
    pub fn check_chunk(&self, file_written: u64, len: u64) -> Result<(), SizeLimitError> {
        let file_attempted = file_written.saturating_add(len);
        if file_attempted > self.limits.max_file_size {
            return Err(SizeLimitError::FileSize {
                attempted: file_attempted,
                limit: self.limits.max_file_size,
            });
        }

        let total_attempted = self.total_written.saturating_add(file_attempted);
        if total_attempted > self.limits.max_total_size {
            return Err(SizeLimitError::TotalSize {
                attempted: total_attempted,
                limit: self.limits.max_total_size,
            });
        }

        Ok(())
    }

    /// Rejects a completed file that wrote more than twice its declared size.
    pub fn check_declared_ratio(
        name: &str,
        declared: u64,
        written: u64,
    ) -> Result<(), SizeLimitError> {
        if written > declared.saturating_mul(2) {
            return Err(SizeLimitError::DeclaredSizeMismatch {
                name: name.to_string(),
                declared,
                written,
            });
        }
        Ok(())
    }

    /// Wraps `inner` so that every write is checked against both limits.
    pub fn track<W: Write>(&mut self, inner: W) -> TrackingWriter<'_, W> {
        TrackingWriter {
            inner,
            accountant: self,
            written: 0,
            violation: None,
        }
    }
}

/// Writer for one file that refuses chunks which would breach a size limit.
///
/// Bytes are only added to the accountant's running total by [`commit`];
/// a file that fails mid-way leaves the total untouched.
///
/// [`commit`]: TrackingWriter::commit
pub struct TrackingWriter<'a, W> {
    inner: W,
    accountant: &'a mut SizeAccountant,
    written: u64,
    violation: Option<SizeLimitError>,
}

impl<W: Write> TrackingWriter<'_, W> {
    /// Bytes written to this file so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    /// The limit violation that made the last write fail, if any.
    pub fn take_violation(&mut self) -> Option<SizeLimitError> {
        self.violation.take()
    }

    /// Adds this file's bytes to the running total and returns them.
    pub fn commit(self) -> u64 {
        self.accountant.total_written += self.written;
        self.written
    }
}

impl<W: Write> Write for TrackingWriter<'_, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if let Err(violation) = self.accountant.check_chunk(self.written, buf.len() as u64) {
            self.violation = Some(violation.clone());
            return Err(io::Error::other(violation));
        }

        let n = self.inner.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
