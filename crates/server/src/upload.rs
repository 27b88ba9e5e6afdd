//! `POST /upload`: store a file, or extract a tar.gz archive, under the
//! upload directory.

use crate::error::ApiError;
use crate::state::AppState;
use axum::extract::multipart::Field;
use axum::extract::{Multipart, Query, State};
use axum::http::StatusCode;
use axum::Json;
use extractor::ExtractStats;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tempfile::NamedTempFile;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

pub(crate) const UPLOAD_DENIED: &str = "DENIED: You should not upload outside the upload directory.";

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub message: String,
    pub filename: String,
    pub path: String,
    pub size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extracted: Option<ExtractStats>,
}

/// The `file` part of an upload, spooled to disk.
struct SpooledFile {
    filename: String,
    temp: NamedTempFile,
    size: u64,
}

pub async fn upload(
    State(state): State<Arc<AppState>>,
    Query(mut params): Query<HashMap<String, String>>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadResponse>), ApiError> {
    let mut spooled = None;

    while let Some(field) = multipart.next_field().await? {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };

        if name == "file" {
            spooled = Some(spool(field).await?);
        } else {
            let value = field.text().await?;
            params.insert(name, value);
        }
    }

    let Some(file) = spooled else {
        return Err(ApiError::BadRequest("Missing form field: file".to_string()));
    };

    let path = match params.remove("path") {
        Some(path) if !path.is_empty() => path,
        _ => file.filename.clone(),
    };
    let untargz = params.get("targz").is_some_and(|value| value == "true");

    let destination = state
        .resolve(&path)
        .ok_or_else(|| ApiError::Forbidden(UPLOAD_DENIED.to_string()))?;

    let extracted = if untargz {
        tokio::fs::create_dir_all(&destination).await?;

        let archive = file.temp.reopen()?;
        let limits = state.limits;
        let target = destination.clone();
        let stats = tokio::task::spawn_blocking(move || {
            extractor::extract_with_limits(&target, archive, &limits)
        })
        .await
        .map_err(|err| ApiError::Internal(err.to_string()))?
        .inspect_err(|err| warn!(path = %path, error = %err, "archive extraction failed"))?;

        Some(stats)
    } else {
        if destination == state.root {
            return Err(ApiError::BadRequest(
                "Cannot overwrite the upload directory".to_string(),
            ));
        }
        store(&file, &destination).await?;
        None
    };

    info!(
        path = %path,
        size = file.size,
        extracted = extracted.is_some(),
        "upload stored"
    );

    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            message: format!("File has been uploaded to {}", path),
            filename: file.filename,
            path,
            size: file.size,
            extracted,
        }),
    ))
}

/// Streams a multipart field into a temporary file so the remaining fields
/// can be read regardless of their order.
async fn spool(mut field: Field<'_>) -> Result<SpooledFile, ApiError> {
    let filename = field.file_name().map(str::to_string).unwrap_or_default();
    let temp = NamedTempFile::new()?;
    let mut writer = File::from_std(temp.reopen()?);

    let mut size = 0u64;
    while let Some(chunk) = field.chunk().await? {
        writer.write_all(&chunk).await?;
        size += chunk.len() as u64;
    }
    writer.flush().await?;

    debug!(filename = %filename, size, "spooled upload");
    Ok(SpooledFile {
        filename,
        temp,
        size,
    })
}

async fn store(file: &SpooledFile, destination: &std::path::Path) -> Result<(), ApiError> {
    if let Some(parent) = destination.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let mut source = File::from_std(file.temp.reopen()?);
    let mut target = File::create(destination).await?;
    tokio::io::copy(&mut source, &mut target).await?;
    target.flush().await?;
    Ok(())
}
