//! JSON bodies returned by the HTTP API

use serde::{Deserialize, Serialize};

use crate::batch::{BatchItemResult, BatchReport, FailureCategory, RecognitionOutcome};

/// Error body: `{"error": "..."}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

/// Per-file entry of a batch response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResultResponse {
    pub filename: String,
    pub lines: usize,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_category: Option<FailureCategory>,
    pub preview: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_file: Option<String>,
}

impl From<&BatchItemResult> for BatchResultResponse {
    fn from(item: &BatchItemResult) -> Self {
        match &item.outcome {
            RecognitionOutcome::Success {
                line_count,
                preview_text,
                output_file,
                ..
            } => Self {
                filename: item.filename.clone(),
                lines: *line_count,
                success: true,
                error: None,
                error_category: None,
                preview: preview_text.clone(),
                output_file: output_file.clone(),
            },
            RecognitionOutcome::Failure { category, message } => Self {
                filename: item.filename.clone(),
                lines: 0,
                success: false,
                error: Some(message.clone()),
                error_category: Some(*category),
                preview: String::new(),
                output_file: None,
            },
        }
    }
}

/// Body of a successful `POST /api/batch`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchProcessResponse {
    pub total_files: usize,
    pub success_count: usize,
    pub failure_count: usize,
    pub results: Vec<BatchResultResponse>,
    /// Human-readable elapsed time, e.g. `1.204s`
    pub processing_time: String,
}

impl From<&BatchReport> for BatchProcessResponse {
    fn from(report: &BatchReport) -> Self {
        Self {
            total_files: report.total_files(),
            success_count: report.success_count(),
            failure_count: report.failure_count(),
            results: report.results().iter().map(BatchResultResponse::from).collect(),
            processing_time: format!("{:?}", report.elapsed()),
        }
    }
}
