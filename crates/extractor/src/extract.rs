//! Streaming extraction of gzip-compressed tar archives.
//!
//! Entries are pulled from the decoder one at a time and materialized
//! immediately; nothing is buffered beyond a single copy chunk. Every entry
//! goes through the same sequence:
//!
//! 1. the declared size is pre-checked against the per-file limit,
//! 2. the entry name is resolved against the destination root,
//! 3. the entry type decides whether a directory is created, a file is
//!    written through the size accountant, or the archive is rejected.
//!
//! The first failure aborts the whole extraction. Only the failing entry's
//! partial output is removed; earlier entries stay on disk.

use crate::accountant::SizeAccountant;
use crate::error::{ExtractError, SecurityError};
use crate::safety::{resolve_target, EntryType};
use crate::types::{ExtractStats, Limits};
use flate2::read::MultiGzDecoder;
use std::fs::{self, DirBuilder, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Permissions for directories whose header carries no permission bits.
const DEFAULT_DIR_MODE: u32 = 0o755;

/// Permissions for files whose header carries no permission bits.
const DEFAULT_FILE_MODE: u32 = 0o644;

const PERMISSION_BITS: u32 = 0o777;

const COPY_BUFFER_SIZE: usize = 64 * 1024;

/// Extract a gzip-compressed tar stream below `destination`.
///
/// The destination is created if it does not exist and is resolved once to
/// a canonical path; every entry is checked against that resolved root.
///
/// # Arguments
///
/// * `destination` - Directory the archive is extracted into
/// * `input` - Gzip-compressed tar stream, read to exhaustion or first failure
/// * `limits` - Per-file and total size bounds
///
/// # Returns
///
/// Returns `ExtractStats` with extraction statistics on success.
pub fn extract_archive<R: Read>(
    destination: &Path,
    input: R,
    limits: &Limits,
) -> Result<ExtractStats, ExtractError> {
    let start_time = Instant::now();
    let root = prepare_destination(destination)?;

    // Concatenated gzip members form one stream, and zero blocks between
    // entries are padding rather than the end of the archive
    let mut archive = tar::Archive::new(MultiGzDecoder::new(input));
    archive.set_ignore_zeros(true);
    let mut accountant = SizeAccountant::new(*limits);
    let mut stats = ExtractStats::default();

    let entries = archive.entries().map_err(ExtractError::Decode)?;
    for entry in entries {
        let mut entry = entry.map_err(ExtractError::Decode)?;
        process_entry(&root, &mut entry, &mut accountant, &mut stats)?;
    }

    stats.bytes_written = accountant.total_written();
    stats.duration = start_time.elapsed();

    info!(
        destination = %root.display(),
        files = stats.files_extracted,
        directories = stats.directories_created,
        skipped = stats.entries_skipped,
        bytes = stats.bytes_written,
        "archive extracted"
    );

    Ok(stats)
}

/// Creates the destination if needed and resolves it to a canonical path.
fn prepare_destination(destination: &Path) -> Result<PathBuf, ExtractError> {
    fs::create_dir_all(destination).map_err(|e| ExtractError::filesystem(destination, e))?;
    fs::canonicalize(destination).map_err(|e| ExtractError::filesystem(destination, e))
}

fn process_entry<R: Read>(
    root: &Path,
    entry: &mut tar::Entry<'_, R>,
    accountant: &mut SizeAccountant,
    stats: &mut ExtractStats,
) -> Result<(), ExtractError> {
    let name = entry.path().map_err(ExtractError::Decode)?.into_owned();
    let display_name = name.display().to_string();

    let header = entry.header();
    let declared = header.size().map_err(ExtractError::Decode)?;
    let mode = header.mode().map_err(ExtractError::Decode)?;
    let type_flag = header.entry_type();
    let entry_type = EntryType::from_tar(type_flag);

    accountant.check_declared(&display_name, declared)?;
    let target = resolve_target(root, &name)?;

    debug!(entry = %display_name, ?entry_type, declared, "processing entry");

    match entry_type {
        EntryType::Directory => {
            materialize_directory(&target, mode)?;
            stats.directories_created += 1;
        }
        EntryType::File => {
            let file = FileEntry {
                target: &target,
                name: &display_name,
                declared,
                mode,
            };
            materialize_file(&file, entry, accountant)?;
            stats.files_extracted += 1;
        }
        EntryType::Symlink | EntryType::Hardlink => {
            let link_target = entry
                .link_name()
                .ok()
                .flatten()
                .map(|link| link.display().to_string());
            return Err(SecurityError::LinkEntry {
                name: display_name,
                target: link_target,
            }
            .into());
        }
        EntryType::Other => {
            warn!(
                entry = %display_name,
                type_flag = type_flag.as_byte(),
                "skipping unsupported entry type"
            );
            stats.entries_skipped += 1;
        }
    }

    Ok(())
}

/// Creates a directory entry, or accepts an existing directory as-is.
fn materialize_directory(target: &Path, mode: u32) -> Result<(), ExtractError> {
    if let Ok(metadata) = fs::metadata(target) {
        if metadata.is_dir() {
            return Ok(());
        }
        return Err(ExtractError::filesystem(
            target,
            io::Error::new(
                io::ErrorKind::AlreadyExists,
                "path exists but is not a directory",
            ),
        ));
    }

    create_dir_all(target, permission_or(mode, DEFAULT_DIR_MODE))
        .map_err(|e| ExtractError::filesystem(target, e))
}

/// A regular-file entry that passed the path and declared-size checks.
struct FileEntry<'a> {
    target: &'a Path,
    name: &'a str,
    declared: u64,
    mode: u32,
}

/// Writes a regular file, removing it again if anything goes wrong after it
/// was opened.
fn materialize_file<R: Read>(
    file: &FileEntry<'_>,
    content: &mut R,
    accountant: &mut SizeAccountant,
) -> Result<u64, ExtractError> {
    if let Some(parent) = file.target.parent() {
        create_dir_all(parent, DEFAULT_DIR_MODE)
            .map_err(|e| ExtractError::filesystem(parent, e))?;
    }

    let handle = open_target(file.target, permission_or(file.mode, DEFAULT_FILE_MODE))
        .map_err(|e| ExtractError::filesystem(file.target, e))?;

    fill_or_remove(file, handle, content, accountant)
}

/// Writes the entry into the already created target, removing it on failure.
fn fill_or_remove<W: Write, R: Read>(
    file: &FileEntry<'_>,
    handle: W,
    content: &mut R,
    accountant: &mut SizeAccountant,
) -> Result<u64, ExtractError> {
    let result = write_contents(file, handle, content, accountant);
    if result.is_err() {
        remove_partial(file.target);
    }
    result
}

/// Streams entry content into `handle` through the size accountant.
fn write_contents<W: Write, R: Read>(
    file: &FileEntry<'_>,
    handle: W,
    content: &mut R,
    accountant: &mut SizeAccountant,
) -> Result<u64, ExtractError> {
    let mut writer = accountant.track(handle);
    let mut buf = vec![0u8; COPY_BUFFER_SIZE];

    loop {
        let n = match content.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(ExtractError::Decode(e)),
        };

        if let Err(e) = writer.write_all(&buf[..n]) {
            return Err(match writer.take_violation() {
                Some(violation) => violation.into(),
                None => ExtractError::filesystem(file.target, e),
            });
        }
    }

    let written = writer.written();
    if written < file.declared {
        return Err(ExtractError::Decode(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!(
                "{} ended after {} of {} declared bytes",
                file.name, written, file.declared
            ),
        )));
    }
    SizeAccountant::check_declared_ratio(file.name, file.declared, written)?;

    writer
        .flush()
        .map_err(|e| ExtractError::filesystem(file.target, e))?;

    Ok(writer.commit())
}

fn remove_partial(target: &Path) {
    if let Err(e) = fs::remove_file(target) {
        warn!(
            path = %target.display(),
            error = %e,
            "failed to remove partially written file"
        );
    }
}

/// Masks header permission bits, substituting `default` when none are set.
fn permission_or(mode: u32, default: u32) -> u32 {
    match mode & PERMISSION_BITS {
        0 => default,
        bits => bits,
    }
}

fn create_dir_all(path: &Path, mode: u32) -> io::Result<()> {
    let mut builder = DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(mode);
    }
    #[cfg(not(unix))]
    let _ = mode;
    builder.create(path)
}

fn open_target(target: &Path, mode: u32) -> io::Result<File> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(mode);
    }
    #[cfg(not(unix))]
    let _ = mode;
    options.open(target)
}
