//! HTTP basic authentication for mutating routes.
//!
//! Downloads, `HEAD` metadata requests and the health check stay public;
//! everything else requires the configured credentials.

use crate::config::Credentials;
use crate::state::AppState;
use axum::extract::{Request, State};
use axum::http::{header, Method, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use base64::prelude::{Engine, BASE64_STANDARD};
use serde_json::json;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::debug;

const REALM: &str = "Basic realm=\"Restricted\"";

pub async fn require_basic_auth(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let Some(credentials) = state.credentials.as_ref() else {
        return next.run(request).await;
    };

    if is_public(request.method(), request.uri().path()) {
        return next.run(request).await;
    }

    let supplied = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(decode_basic);

    match supplied {
        Some((username, password)) if credentials_match(credentials, &username, &password) => {
            next.run(request).await
        }
        _ => {
            debug!(path = %request.uri().path(), "rejecting unauthenticated request");
            unauthorized()
        }
    }
}

/// Requests that never need credentials.
fn is_public(method: &Method, path: &str) -> bool {
    if path == "/health" {
        return true;
    }
    (method == Method::GET || method == Method::HEAD) && path != "/upload" && path != "/delete"
}

/// Decodes an `Authorization: Basic ...` header value into username and password.
fn decode_basic(value: &str) -> Option<(String, String)> {
    let (scheme, encoded) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }

    let decoded = BASE64_STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some((username.to_string(), password.to_string()))
}

fn credentials_match(expected: &Credentials, username: &str, password: &str) -> bool {
    let username_ok = expected.username.as_bytes().ct_eq(username.as_bytes());
    let password_ok = expected.password.as_bytes().ct_eq(password.as_bytes());
    bool::from(username_ok & password_ok)
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, REALM)],
        Json(json!({ "message": "Unauthorized" })),
    )
        .into_response()
}
