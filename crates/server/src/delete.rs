//! `DELETE /upload` and `DELETE /delete`.

use crate::error::ApiError;
use crate::form::FormValues;
use crate::state::AppState;
use crate::upload::UPLOAD_DENIED;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::{info, warn};

pub(crate) const ROOT_DENIED: &str = "DENIED: You should not try to get outside the root directory.";

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub message: String,
    pub path: String,
}

#[derive(Debug, Serialize)]
pub struct CleanupResponse {
    pub message: String,
    pub path: String,
    pub days: i64,
    pub count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_count: Option<usize>,
}

/// Removes a single file or a whole directory tree.
pub async fn delete_upload(
    State(state): State<Arc<AppState>>,
    form: FormValues,
) -> Result<(StatusCode, Json<DeleteResponse>), ApiError> {
    let path = form.get("path").to_string();
    let target = state
        .resolve(&path)
        .ok_or_else(|| ApiError::Forbidden(UPLOAD_DENIED.to_string()))?;

    if target == state.root {
        return Err(ApiError::Forbidden(
            "DENIED: You should not delete the upload directory.".to_string(),
        ));
    }

    let metadata = tokio::fs::symlink_metadata(&target)
        .await
        .map_err(|_| ApiError::NotFound("Could not find your file".to_string()))?;

    let removed = if metadata.is_dir() {
        tokio::fs::remove_dir_all(&target).await
    } else {
        tokio::fs::remove_file(&target).await
    };
    removed.map_err(|err| ApiError::BadRequest(format!("Could not delete your file: {}", err)))?;

    info!(path = %path, "deleted upload");
    Ok((
        StatusCode::ACCEPTED,
        Json(DeleteResponse {
            message: format!("File {} has been deleted", path),
            path,
        }),
    ))
}

/// Removes the direct children of a directory that were last modified more
/// than `days` days ago.
///
/// Regular files always qualify. With `recursive` set, stale directories
/// qualify too, but only empty ones are removed; a non-empty directory is
/// logged and left in place.
pub async fn delete_old_files(
    State(state): State<Arc<AppState>>,
    form: FormValues,
) -> Result<(StatusCode, Json<CleanupResponse>), ApiError> {
    let path = form.get("path").to_string();
    let days = form.get("days").trim().parse::<i64>().unwrap_or(0);
    let recursive = parse_bool(form.get("recursive"))
        .ok_or_else(|| ApiError::BadRequest("Invalid recursive parameter".to_string()))?;

    let directory = state
        .resolve(&path)
        .ok_or_else(|| ApiError::Forbidden(ROOT_DENIED.to_string()))?;

    if tokio::fs::metadata(&directory).await.is_err() {
        return Err(ApiError::NotFound("Not Found".to_string()));
    }

    let stale = find_stale_entries(&directory, days, recursive)
        .await
        .map_err(|_| ApiError::Internal("Failed to find old files".to_string()))?;

    if stale.is_empty() {
        return Ok((
            StatusCode::ACCEPTED,
            Json(CleanupResponse {
                message: "No old files found to delete".to_string(),
                path,
                days,
                count: 0,
                deleted_count: None,
            }),
        ));
    }

    let mut deleted = 0;
    for entry in &stale {
        // Directories must already be empty; their contents are never swept
        let removed = if entry.is_dir {
            tokio::fs::remove_dir(&entry.path).await
        } else {
            tokio::fs::remove_file(&entry.path).await
        };

        match removed {
            Ok(()) => deleted += 1,
            Err(err) => warn!(path = %entry.path.display(), error = %err, "failed to delete old entry"),
        }
    }

    info!(path = %path, days, recursive, deleted, "deleted old files");
    Ok((
        StatusCode::ACCEPTED,
        Json(CleanupResponse {
            message: "Old files deleted successfully".to_string(),
            path,
            days,
            count: deleted,
            deleted_count: Some(deleted),
        }),
    ))
}

/// Parses a boolean the way Go's `strconv.ParseBool` does. An empty value
/// means `false`.
fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "" | "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
        _ => None,
    }
}

#[derive(Debug)]
struct StaleEntry {
    path: PathBuf,
    is_dir: bool,
}

async fn find_stale_entries(
    directory: &Path,
    days: i64,
    recursive: bool,
) -> io::Result<Vec<StaleEntry>> {
    let days = u64::try_from(days).unwrap_or(0);
    let threshold = Duration::from_secs(days.saturating_mul(SECONDS_PER_DAY));
    let now = SystemTime::now();

    let mut entries = tokio::fs::read_dir(directory).await?;
    let mut stale = Vec::new();

    while let Some(entry) = entries.next_entry().await? {
        // Does not follow symlinks, so links are neither files nor directories
        let Ok(metadata) = entry.metadata().await else {
            continue;
        };
        let is_dir = metadata.is_dir();
        if !(metadata.is_file() || (recursive && is_dir)) {
            continue;
        }

        let Ok(modified) = metadata.modified() else {
            continue;
        };
        let age = now.duration_since(modified).unwrap_or_default();
        if age > threshold {
            stale.push(StaleEntry {
                path: entry.path(),
                is_dir,
            });
        }
    }

    Ok(stale)
}
