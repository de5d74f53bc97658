//! # Per-Item Processor
//!
//! Turns one [`BatchInput`] into exactly one [`RecognitionOutcome`]. Every
//! failure mode is converted into an outcome; nothing escapes as an error.
//!
//! Engine calls run in their own task that owns the admission permit, so the
//! number of calls actually executing never exceeds the batch's concurrency
//! limit, including calls whose items already timed out.

use std::sync::Arc;
use std::time::{Duration, Instant as StdInstant};

use tokio::sync::Semaphore;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use super::outcome::{BatchInput, FailureCategory, RecognitionOutcome};
use crate::errors::error_logging;
use crate::ocr;
use crate::ocr_config::OcrConfig;
use crate::recognition::RecognitionEngine;
use crate::storage::ResultStore;

/// Cancellation and deadlines shared by every item of one batch
#[derive(Debug, Clone)]
pub struct BatchContext {
    cancel: CancellationToken,
    item_timeout: Duration,
    batch_deadline: Option<Instant>,
}

impl BatchContext {
    pub fn new(cancel: CancellationToken, item_timeout: Duration) -> Self {
        Self {
            cancel,
            item_timeout,
            batch_deadline: None,
        }
    }

    /// Bound the whole batch to `timeout` from now
    pub fn with_batch_timeout(mut self, timeout: Duration) -> Self {
        self.batch_deadline = Some(Instant::now() + timeout);
        self
    }

    pub fn with_batch_deadline(mut self, deadline: Instant) -> Self {
        self.batch_deadline = Some(deadline);
        self
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn item_timeout(&self) -> Duration {
        self.item_timeout
    }

    pub fn batch_deadline(&self) -> Option<Instant> {
        self.batch_deadline
    }

    /// Deadline for an engine call starting now: the earlier of the item
    /// timeout and the batch deadline
    pub fn item_deadline(&self) -> Instant {
        let item = Instant::now() + self.item_timeout;
        match self.batch_deadline {
            Some(batch) if batch < item => batch,
            _ => item,
        }
    }

    fn batch_deadline_reached(&self) -> bool {
        self.batch_deadline
            .is_some_and(|deadline| Instant::now() >= deadline)
    }
}

struct InflightGauge;

impl InflightGauge {
    fn enter() -> Self {
        metrics::gauge!("batch_inflight_items").increment(1.0);
        InflightGauge
    }
}

impl Drop for InflightGauge {
    fn drop(&mut self) {
        metrics::gauge!("batch_inflight_items").decrement(1.0);
    }
}

async fn sleep_until_batch_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Processes single batch items against the shared recognition engine
pub struct ItemProcessor {
    engine: Arc<dyn RecognitionEngine>,
    ocr_config: Arc<OcrConfig>,
    store: Option<Arc<dyn ResultStore>>,
}

impl ItemProcessor {
    pub fn new(engine: Arc<dyn RecognitionEngine>, ocr_config: OcrConfig) -> Self {
        Self {
            engine,
            ocr_config: Arc::new(ocr_config),
            store: None,
        }
    }

    /// Persist successful results through `store`
    pub fn with_store(mut self, store: Arc<dyn ResultStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Decode, recognize under deadline and normalize one item
    ///
    /// Decoding runs on the blocking pool before a slot of `gate` is taken.
    /// The slot belongs to the engine call: when the item times out or is
    /// cancelled it stops waiting, but the slot is only returned once the
    /// engine call itself has finished.
    pub async fn process(
        &self,
        ctx: &BatchContext,
        input: BatchInput,
        gate: &Arc<Semaphore>,
    ) -> RecognitionOutcome {
        if ctx.cancellation().is_cancelled() {
            return RecognitionOutcome::failure(
                FailureCategory::Cancelled,
                "Batch cancelled before processing started",
            );
        }

        let BatchInput {
            index,
            filename,
            bytes,
        } = input;
        let byte_len = bytes.len() as u64;

        let config = Arc::clone(&self.ocr_config);
        let decoded =
            tokio::task::spawn_blocking(move || ocr::decode_image(&bytes, &config)).await;
        let image = match decoded {
            Ok(Ok(image)) => image,
            Ok(Err(e)) => {
                debug!(index, filename = %filename, error = %e, "Item failed to decode");
                return RecognitionOutcome::failure(FailureCategory::DecodeError, e.to_string());
            }
            Err(e) => {
                warn!(index, filename = %filename, error = %e, "Decoder task failed");
                return RecognitionOutcome::failure(
                    FailureCategory::DecodeError,
                    format!("Invalid image: decoder failed: {e}"),
                );
            }
        };

        let permit = tokio::select! {
            biased;
            _ = ctx.cancellation().cancelled() => {
                return RecognitionOutcome::failure(
                    FailureCategory::Cancelled,
                    "Batch cancelled while waiting for a worker slot",
                );
            }
            _ = sleep_until_batch_deadline(ctx.batch_deadline()) => {
                return RecognitionOutcome::failure(
                    FailureCategory::Timeout,
                    "Batch deadline exceeded while waiting for a worker slot",
                );
            }
            permit = Arc::clone(gate).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => {
                    return RecognitionOutcome::failure(
                        FailureCategory::Cancelled,
                        "Worker pool closed",
                    );
                }
            },
        };

        let started = StdInstant::now();
        let deadline = ctx.item_deadline();

        let engine = Arc::clone(&self.engine);
        let call = tokio::spawn(async move {
            // Held until the engine returns, even after the item stopped waiting
            let _slot = permit;
            let _inflight = InflightGauge::enter();
            engine.recognize(image).await
        });

        let recognized = tokio::select! {
            biased;
            _ = ctx.cancellation().cancelled() => Err(RecognitionOutcome::failure(
                FailureCategory::Cancelled,
                "Batch cancelled during recognition",
            )),
            joined = tokio::time::timeout_at(deadline, call) => match joined {
                Ok(Ok(Ok(detailed))) => Ok(detailed),
                Ok(Ok(Err(e))) => {
                    error_logging::log_ocr_error(
                        &e,
                        "recognize",
                        Some(filename.as_str()),
                        Some(byte_len),
                        Some(started.elapsed()),
                    );
                    Err(RecognitionOutcome::failure(
                        FailureCategory::EngineError,
                        format!("OCR failed: {e}"),
                    ))
                }
                Ok(Err(e)) if e.is_panic() => {
                    error!(index, filename = %filename, "OCR engine panicked");
                    Err(RecognitionOutcome::failure(
                        FailureCategory::EngineError,
                        "OCR failed: engine panicked",
                    ))
                }
                Ok(Err(_)) => Err(RecognitionOutcome::failure(
                    FailureCategory::Cancelled,
                    "OCR call was aborted",
                )),
                Err(_) => {
                    let message = if ctx.batch_deadline_reached() {
                        "Batch deadline exceeded during recognition".to_string()
                    } else {
                        format!("OCR timed out after {:?}", ctx.item_timeout())
                    };
                    warn!(index, filename = %filename, "{message}");
                    Err(RecognitionOutcome::failure(FailureCategory::Timeout, message))
                }
            },
        };

        let detailed = match recognized {
            Ok(detailed) => detailed,
            Err(outcome) => return outcome,
        };

        let mut outcome =
            RecognitionOutcome::success(detailed.full_text.clone(), detailed.total_lines);

        if let Some(store) = &self.store {
            match store.save(&filename, &detailed).await {
                Ok(name) => {
                    if let RecognitionOutcome::Success { output_file, .. } = &mut outcome {
                        *output_file = Some(name);
                    }
                }
                Err(e) => error_logging::log_filesystem_error(
                    &e,
                    "persist_result",
                    Some(filename.as_str()),
                    Some(byte_len),
                ),
            }
        }

        debug!(
            index,
            filename = %filename,
            lines = detailed.total_lines,
            duration_ms = started.elapsed().as_millis(),
            "Item recognized"
        );
        outcome
    }
}
