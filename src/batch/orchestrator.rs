//! # Bounded Batch Orchestrator
//!
//! Fans a batch out to one task per item and collects the outcomes back in
//! input order. A semaphore with `max_concurrency` permits bounds how many
//! items talk to the engine at the same time.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::{error, info};

use super::outcome::{BatchInput, FailureCategory, RecognitionOutcome};
use super::processor::{BatchContext, ItemProcessor};
use crate::errors::{AppError, AppResult};

pub struct BatchOrchestrator {
    processor: Arc<ItemProcessor>,
}

impl BatchOrchestrator {
    pub fn new(processor: Arc<ItemProcessor>) -> Self {
        Self { processor }
    }

    /// Process every input with at most `max_concurrency` engine calls in flight
    ///
    /// `outcomes[i]` always belongs to `inputs[i]`, whatever order the items
    /// finish in. Item failures are reported as outcomes; the only errors are
    /// an empty batch and a zero concurrency limit.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Validation`] if `inputs` is empty or
    /// `max_concurrency` is zero.
    pub async fn run_batch(
        &self,
        ctx: &BatchContext,
        inputs: Vec<BatchInput>,
        max_concurrency: usize,
    ) -> AppResult<Vec<RecognitionOutcome>> {
        if inputs.is_empty() {
            return Err(AppError::Validation(
                "Batch must contain at least one input".to_string(),
            ));
        }
        if max_concurrency == 0 {
            return Err(AppError::Validation(
                "max_concurrency must be greater than 0".to_string(),
            ));
        }

        let total = inputs.len();
        info!(total, max_concurrency, "Starting batch");

        let gate = Arc::new(Semaphore::new(max_concurrency));
        let handles: Vec<_> = inputs
            .into_iter()
            .map(|input| {
                let index = input.index;
                let processor = Arc::clone(&self.processor);
                let gate = Arc::clone(&gate);
                let ctx = ctx.clone();
                let handle =
                    tokio::spawn(async move { processor.process(&ctx, input, &gate).await });
                (index, handle)
            })
            .collect();

        // Awaiting in spawn order keeps results index-addressed
        let mut outcomes = Vec::with_capacity(total);
        for (index, handle) in handles {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) if e.is_panic() => {
                    error!(index, "Batch worker panicked");
                    RecognitionOutcome::failure(
                        FailureCategory::EngineError,
                        "OCR worker panicked",
                    )
                }
                Err(_) => RecognitionOutcome::failure(
                    FailureCategory::Cancelled,
                    "OCR worker was cancelled",
                ),
            };
            outcomes.push(outcome);
        }

        Ok(outcomes)
    }
}
