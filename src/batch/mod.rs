//! # Batch Processing Module
//!
//! Bounded-concurrency OCR over many uploaded files.
//!
//! - [`ItemProcessor`] handles one file: decode, wait for a worker slot,
//!   recognize under a deadline, persist.
//! - [`BatchOrchestrator`] runs the processor for every file with a fixed
//!   concurrency budget and returns outcomes in input order.
//! - [`assemble`] folds outcomes into a [`BatchReport`].
//! - [`BatchService`] wires the three together with configured limits.

pub mod orchestrator;
pub mod outcome;
pub mod processor;
pub mod report;

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{info, Instrument};

pub use orchestrator::BatchOrchestrator;
pub use outcome::{
    make_preview, BatchInput, FailureCategory, RecognitionOutcome, PREVIEW_CHAR_LIMIT,
    PREVIEW_TRUNCATION_MARKER,
};
pub use processor::{BatchContext, ItemProcessor};
pub use report::{assemble, BatchItemResult, BatchReport};

use crate::config::BatchConfig;
use crate::errors::{AppError, AppResult};
use crate::observability;

/// Entry point for running a whole batch with configured limits
pub struct BatchService {
    orchestrator: BatchOrchestrator,
    config: BatchConfig,
    shutdown: CancellationToken,
}

impl BatchService {
    pub fn new(processor: ItemProcessor, config: BatchConfig) -> Self {
        Self {
            orchestrator: BatchOrchestrator::new(Arc::new(processor)),
            config,
            shutdown: CancellationToken::new(),
        }
    }

    /// Derive every batch's cancellation from `token` (cancelled at shutdown)
    pub fn with_shutdown_token(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Run a batch that is cancelled only by service shutdown
    pub async fn run(&self, inputs: Vec<BatchInput>) -> AppResult<BatchReport> {
        self.run_with_cancellation(self.shutdown.child_token(), inputs)
            .await
    }

    /// Run a batch under a caller-owned cancellation token
    ///
    /// If the returned future is dropped before completion (for example
    /// because the HTTP client went away) the batch is cancelled.
    pub async fn run_with_cancellation(
        &self,
        cancel: CancellationToken,
        inputs: Vec<BatchInput>,
    ) -> AppResult<BatchReport> {
        if inputs.len() > self.config.max_files {
            return Err(AppError::Validation(format!(
                "Too many files in batch: {} (maximum allowed: {})",
                inputs.len(),
                self.config.max_files
            )));
        }

        let start = Instant::now();
        let span = observability::batch_span(inputs.len(), self.config.max_concurrency);

        let mut ctx = BatchContext::new(
            cancel.clone(),
            Duration::from_secs(self.config.item_timeout_secs),
        );
        if let Some(secs) = self.config.batch_timeout_secs {
            ctx = ctx.with_batch_timeout(Duration::from_secs(secs));
        }

        let identities: Vec<(usize, String)> = inputs
            .iter()
            .map(|input| (input.index, input.filename.clone()))
            .collect();

        let guard = cancel.drop_guard();
        let outcomes = self
            .orchestrator
            .run_batch(&ctx, inputs, self.config.max_concurrency)
            .instrument(span)
            .await;
        let _ = guard.disarm();
        let outcomes = outcomes?;

        let results = identities
            .into_iter()
            .zip(outcomes)
            .map(|((index, filename), outcome)| BatchItemResult {
                index,
                filename,
                outcome,
            })
            .collect();

        let report = assemble(start, results);
        observability::record_batch_metrics(&report);

        info!(
            total_files = report.total_files(),
            success_count = report.success_count(),
            failure_count = report.failure_count(),
            elapsed_ms = report.elapsed().as_millis(),
            "Batch completed"
        );
        Ok(report)
    }
}
