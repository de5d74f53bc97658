//! # Result Storage Module
//!
//! Persists full recognition results (text plus word boxes) so that the batch
//! response can stay small and only carry a preview and a file reference.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::errors::{AppError, AppResult};
use crate::recognition::{DetailedResult, TextBox};

/// Destination for successful recognition results
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Persist one result and return the name it was stored under
    async fn save(&self, filename: &str, result: &DetailedResult) -> AppResult<String>;
}

/// Document written for every persisted result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredResult {
    pub filename: String,
    pub full_text: String,
    pub boxes: Vec<TextBox>,
    pub total_lines: usize,
    pub language: String,
    pub processed_at: DateTime<Utc>,
}

/// Writes each result as `ocr_<uuid>.json` into a directory
#[derive(Debug, Clone)]
pub struct JsonResultStore {
    output_dir: PathBuf,
}

impl JsonResultStore {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Create the output directory if it does not exist yet
    pub async fn ensure_dir(&self) -> AppResult<()> {
        tokio::fs::create_dir_all(&self.output_dir).await.map_err(|e| {
            AppError::FileSystem(format!(
                "Failed to create output directory {}: {}",
                self.output_dir.display(),
                e
            ))
        })
    }

    /// Check that the directory accepts writes by creating and removing a probe file
    pub async fn check_writable(&self) -> AppResult<()> {
        let probe = self.output_dir.join(format!(".probe_{}", Uuid::new_v4()));
        tokio::fs::write(&probe, b"ok").await.map_err(|e| {
            AppError::FileSystem(format!(
                "Output directory {} is not writable: {}",
                self.output_dir.display(),
                e
            ))
        })?;
        tokio::fs::remove_file(&probe).await?;
        Ok(())
    }
}

#[async_trait]
impl ResultStore for JsonResultStore {
    async fn save(&self, filename: &str, result: &DetailedResult) -> AppResult<String> {
        let name = format!("ocr_{}.json", Uuid::new_v4());
        let path = self.output_dir.join(&name);

        let document = StoredResult {
            filename: filename.to_string(),
            full_text: result.full_text.clone(),
            boxes: result.boxes.clone(),
            total_lines: result.total_lines,
            language: result.language.clone(),
            processed_at: Utc::now(),
        };
        let json = serde_json::to_vec_pretty(&document)
            .map_err(|e| AppError::Internal(format!("Failed to serialize OCR result: {}", e)))?;

        tokio::fs::write(&path, json).await.map_err(|e| {
            AppError::FileSystem(format!("Failed to write {}: {}", path.display(), e))
        })?;

        debug!(path = %path.display(), source = filename, "OCR result persisted");
        Ok(name)
    }
}
