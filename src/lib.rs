//! # ocr-batch
//!
//! A self-hosted HTTP service that runs Tesseract OCR over batches of uploaded
//! images with a fixed concurrency budget, isolating per-file failures and
//! reporting results in upload order.

pub mod batch;
pub mod config;
pub mod errors;
pub mod instance_manager;
pub mod observability;
pub mod observability_config;
pub mod ocr;
pub mod ocr_config;
pub mod ocr_errors;
pub mod recognition;
pub mod server;
pub mod storage;

// Re-export types for easier access
pub use batch::{BatchInput, BatchReport, BatchService, FailureCategory, RecognitionOutcome};
pub use recognition::{DetailedResult, RecognitionEngine};
