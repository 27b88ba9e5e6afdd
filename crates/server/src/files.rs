use crate::delete::ROOT_DENIED;
use crate::error::ApiError;
use crate::state::AppState;
use axum::extract::{Path as UrlPath, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use std::sync::Arc;

/// `HEAD /{*path}`: reports when a stored file was last modified.
pub async fn last_modified(
    State(state): State<Arc<AppState>>,
    UrlPath(path): UrlPath<String>,
) -> Result<impl IntoResponse, ApiError> {
    let target = state
        .resolve(&path)
        .ok_or_else(|| ApiError::Forbidden(ROOT_DENIED.to_string()))?;

    let metadata = tokio::fs::metadata(&target)
        .await
        .map_err(|_| ApiError::NotFound("Not Found".to_string()))?;
    let modified = metadata.modified()?;

    Ok((
        StatusCode::OK,
        [(header::LAST_MODIFIED, httpdate::fmt_http_date(modified))],
    ))
}
