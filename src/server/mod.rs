//! # HTTP API
//!
//! Thin axum layer in front of [`BatchService`]: multipart upload in, JSON
//! report out.

pub mod handlers;
pub mod response;

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{DefaultBodyLimit, Request};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::batch::BatchService;
use crate::observability;

pub use response::{BatchProcessResponse, BatchResultResponse, ErrorResponse, HealthResponse};

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub batch: Arc<BatchService>,
}

impl AppState {
    pub fn new(batch: Arc<BatchService>) -> Self {
        Self { batch }
    }
}

async fn track_requests(request: Request, next: Next) -> Response {
    let method = request.method().to_string();
    let start = Instant::now();
    let response = next.run(request).await;
    observability::record_request_metrics(&method, response.status().as_u16(), start.elapsed());
    response
}

/// Build the API router
///
/// `max_upload_bytes` caps the whole multipart body of a batch request.
pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api = Router::new()
        .route("/batch", post(handlers::batch_process))
        .layer(DefaultBodyLimit::max(max_upload_bytes));

    Router::new()
        .route("/health", get(handlers::health))
        .nest("/api", api)
        .layer(middleware::from_fn(track_requests))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
