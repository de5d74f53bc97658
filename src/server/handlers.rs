//! Route handlers

use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::Json;
use tracing::{debug, info, warn};

use super::response::{BatchProcessResponse, ErrorResponse, HealthResponse};
use super::AppState;
use crate::batch::BatchInput;
use crate::errors::{error_logging, AppError};

/// Multipart field carrying the uploaded images
pub const FILES_FIELD: &str = "files";

type ApiError = (StatusCode, Json<ErrorResponse>);

fn bad_request(message: &str) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(ErrorResponse::new(message)))
}

/// `GET /health`
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
    })
}

/// `POST /api/batch`
///
/// Reads every `files` part of the multipart body into memory, runs the batch
/// and answers with per-file results in upload order.
pub async fn batch_process(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<BatchProcessResponse>, ApiError> {
    let mut multipart = multipart.map_err(|e| {
        warn!("Rejected batch upload: {}", e);
        bad_request("Failed to parse form")
    })?;

    let mut inputs = Vec::new();
    while let Some(field) = multipart.next_field().await.map_err(|e| {
        warn!("Failed to read multipart field: {}", e);
        bad_request("Failed to parse form")
    })? {
        if field.name() != Some(FILES_FIELD) {
            debug!(field = ?field.name(), "Ignoring multipart field");
            continue;
        }

        let filename = field.file_name().unwrap_or("unknown").to_string();
        let data = field.bytes().await.map_err(|e| {
            warn!(filename = %filename, "Failed to read file data: {}", e);
            bad_request("Failed to parse form")
        })?;

        inputs.push(BatchInput::new(inputs.len(), filename, data.to_vec()));
    }

    if inputs.is_empty() {
        return Err(bad_request("No files uploaded"));
    }

    info!(files = inputs.len(), "Batch upload received");

    match state.batch.run(inputs).await {
        Ok(report) => Ok(Json(BatchProcessResponse::from(&report))),
        Err(AppError::Validation(message)) => {
            error_logging::log_validation_error(&message, "batch_process", "batch", None);
            Err((StatusCode::BAD_REQUEST, Json(ErrorResponse::new(message))))
        }
        Err(e) => {
            error_logging::log_internal_error(&e, "server", "batch_process");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("Batch processing failed")),
            ))
        }
    }
}
