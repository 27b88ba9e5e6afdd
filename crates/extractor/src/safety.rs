//! Security and safety checks for archive extraction.
//!
//! This module decides whether an archive entry may be materialized at all:
//! it resolves entry names against the destination root to prevent
//! path traversal (tar-slip), and classifies entry types so that links and
//! special files never reach the filesystem.

use crate::error::SecurityError;
use std::path::{Component, Path, PathBuf};

/// Entry type for dispatching archive entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryType {
    /// Regular file
    File,
    /// Directory
    Directory,
    /// Symbolic link
    Symlink,
    /// Hard link
    Hardlink,
    /// Other special file types (fifo, device, etc.)
    Other,
}

impl EntryType {
    /// Classifies a tar type flag.
    ///
    /// Metadata records such as GNU long names and PAX headers are consumed by
    /// the tar reader itself and never reach this point as entries.
    pub fn from_tar(entry_type: tar::EntryType) -> Self {
        match entry_type {
            tar::EntryType::Regular | tar::EntryType::Continuous => EntryType::File,
            tar::EntryType::Directory => EntryType::Directory,
            tar::EntryType::Symlink => EntryType::Symlink,
            tar::EntryType::Link => EntryType::Hardlink,
            _ => EntryType::Other,
        }
    }

    /// Whether this is a symbolic or hard link.
    pub fn is_link(self) -> bool {
        matches!(self, EntryType::Symlink | EntryType::Hardlink)
    }
}

/// Lexically normalizes a path: drops "." components and lets ".." remove
/// the preceding component. Nothing is looked up on disk.
///
/// ".." at the root stays at the root, matching how the kernel resolves
/// "/..".
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();

    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => {
                normalized.push(component.as_os_str());
            }
            Component::CurDir => continue,
            Component::ParentDir => {
                normalized.pop();
            }
            Component::Normal(part) => normalized.push(part),
        }
    }

    normalized
}

/// Returns `true` if `target` is `root` itself or lies below it.
///
/// The comparison is component-wise, so a root of `/foo` never matches
/// `/foobar`. Both paths are expected to be normalized.
pub fn is_within_root(root: &Path, target: &Path) -> bool {
    target.starts_with(root)
}

/// Resolves an untrusted entry name against the destination root.
///
/// The name is joined onto the root and the result is normalized before the
/// containment check, so names like `a/../b` are accepted while
/// `../escape.txt`, `a/../../escape.txt` and absolute names such as
/// `/etc/passwd` are rejected.
///
/// The returned path is the one to use for every filesystem operation on the
/// entry.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use extractor::safety::resolve_target;
///
/// let root = Path::new("/srv/cache");
///
/// let target = resolve_target(root, Path::new("dir/./file.txt")).unwrap();
/// assert_eq!(target, Path::new("/srv/cache/dir/file.txt"));
///
/// // Path traversal attempt - rejected
/// assert!(resolve_target(root, Path::new("../../etc/passwd")).is_err());
///
/// // Absolute path - rejected
/// assert!(resolve_target(root, Path::new("/etc/passwd")).is_err());
/// ```
pub fn resolve_target(root: &Path, name: &Path) -> Result<PathBuf, SecurityError> {
    let root = normalize_path(root);
    let target = normalize_path(&root.join(name));

    if is_within_root(&root, &target) {
        Ok(target)
    } else {
        Err(SecurityError::UnsafePath(name.display().to_string()))
    }
}
