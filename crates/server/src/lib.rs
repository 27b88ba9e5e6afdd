//! # Cache server
//!
//! HTTP front end of the artifact cache. Clients upload files or tar.gz
//! bundles, which are unpacked with [`extractor`], download them again as
//! static files, and prune old entries.
//!
//! ## Example
//!
//! ```rust,no_run
//! use cache_server::config::ServerConfig;
//!
//! # async fn run() -> std::io::Result<()> {
//! cache_server::serve(ServerConfig::default()).await
//! # }
//! ```

pub mod auth;
pub mod config;
pub mod delete;
pub mod error;
pub mod files;
pub mod form;
pub mod health;
pub mod state;
pub mod upload;

pub use config::{Credentials, ServerConfig};
pub use error::ApiError;
pub use state::AppState;

use axum::extract::DefaultBodyLimit;
use axum::routing::{delete, get, get_service, post, MethodRouter};
use axum::{middleware, Router};
use std::io;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Builds the application router over `state`.
pub fn router(state: Arc<AppState>) -> Router {
    let files: MethodRouter<Arc<AppState>> =
        get_service(ServeDir::new(&state.root)).head(files::last_modified);

    Router::new()
        .route("/health", get(health::health))
        .route(
            "/upload",
            post(upload::upload)
                .delete(delete::delete_upload)
                .layer(DefaultBodyLimit::disable()),
        )
        .route("/delete", delete(delete::delete_old_files))
        .route("/{*path}", files)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_basic_auth,
        ))
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Binds the configured address and serves until Ctrl-C.
pub async fn serve(config: ServerConfig) -> io::Result<()> {
    let state = Arc::new(AppState::new(&config.directory, config.credentials.clone())?);
    let listener = TcpListener::bind(config.bind_address()).await?;

    info!(
        address = %listener.local_addr()?,
        directory = %state.root.display(),
        auth = state.credentials.is_some(),
        "serving uploads"
    );

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}
