//! HTTP surface of the gallery.
//!
//! - `GET /api/folders`
//! - `GET /api/folders/:folder_name?page&pageSize`
//! - `GET /api/images/:folder_name/:image_name?auth`
//!
//! Every route sits behind the authentication gate.

pub mod gate;
pub mod handlers;

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::Request;
use axum::middleware::from_fn_with_state;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::trace::{DefaultOnResponse, TraceLayer};
use tower_http::LatencyUnit;
use tracing::{info, Level, Span};

use crate::auth::SharedSecret;
use crate::catalog::FolderScanner;
use crate::config::ServerConfig;

/// Path prefix of the image-byte endpoint, the only one that accepts the
/// query-parameter credential channel.
pub const IMAGE_ROUTE_PREFIX: &str = "/api/images/";

/// State shared by all handlers.
#[derive(Clone)]
pub struct AppState {
    pub scanner: FolderScanner,
    pub secret: Arc<SharedSecret>,
    pub default_page_size: u32,
}

impl AppState {
    pub fn new(scanner: FolderScanner, secret: SharedSecret, default_page_size: u32) -> Self {
        Self {
            scanner,
            secret: Arc::new(secret),
            default_page_size: default_page_size.max(1),
        }
    }

    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new(
            FolderScanner::new(&config.root),
            SharedSecret::new(config.secret.clone()),
            config.page_size,
        )
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/folders", get(handlers::list_folders))
        .route("/api/folders/:folder_name", get(handlers::list_images))
        .route(
            "/api/images/:folder_name/:image_name",
            get(handlers::get_image),
        )
        .layer(from_fn_with_state(state.clone(), gate::require_credentials))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(request_span)
                .on_response(
                    DefaultOnResponse::new()
                        .level(Level::DEBUG)
                        .latency_unit(LatencyUnit::Millis),
                ),
        )
        .with_state(state)
}

/// Binds the configured address and serves until Ctrl-C.
pub async fn serve(config: ServerConfig) -> Result<()> {
    if !config.root.is_dir() {
        tracing::warn!(root = ?config.root, "Gallery root is not a directory");
    }
    let listener = TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind))?;
    let router = build_router(AppState::from_config(&config));

    info!(addr = %config.bind, root = ?config.root, "Gallery server listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await
        .context("Server error")?;
    Ok(())
}

/// Span for one request. Records the path only: the query string may carry
/// credentials.
fn request_span(req: &Request) -> Span {
    tracing::debug_span!("request", method = %req.method(), path = %req.uri().path())
}
