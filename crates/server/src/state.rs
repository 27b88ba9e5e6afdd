use crate::config::Credentials;
use extractor::safety::resolve_target;
use extractor::Limits;
use std::io;
use std::path::{Path, PathBuf};

/// Shared state handed to every handler.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Canonical upload directory
    pub root: PathBuf,
    /// Basic-auth credentials, if authentication is enabled
    pub credentials: Option<Credentials>,
    /// Size limits applied to each archive extraction
    pub limits: Limits,
}

impl AppState {
    /// Creates the upload directory if needed and resolves it once.
    pub fn new(directory: &Path, credentials: Option<Credentials>) -> io::Result<Self> {
        std::fs::create_dir_all(directory)?;
        let root = std::fs::canonicalize(directory)?;

        Ok(Self {
            root,
            credentials,
            limits: Limits::default(),
        })
    }

    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Resolves a client-supplied path inside the upload directory.
    ///
    /// Leading slashes are ignored, so `/a/b` and `a/b` name the same file.
    /// Returns `None` when the path escapes the upload directory.
    pub fn resolve(&self, user_path: &str) -> Option<PathBuf> {
        let relative = user_path.trim_start_matches('/');
        resolve_target(&self.root, Path::new(relative)).ok()
    }
}
