//! # Batch Service Tests
//!
//! End-to-end behaviour of `BatchService`: report assembly, configured
//! limits, result persistence and cancellation ownership.

mod test_helpers;

#[cfg(test)]
mod tests {
    use crate::test_helpers::*;
    use ocr_batch::batch::{BatchService, FailureCategory, ItemProcessor, RecognitionOutcome};
    use ocr_batch::config::BatchConfig;
    use ocr_batch::errors::AppError;
    use ocr_batch::ocr_config::OcrConfig;
    use ocr_batch::storage::{JsonResultStore, StoredResult};
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::{NamedTempFile, TempDir};
    use tokio_util::sync::CancellationToken;

    fn persisting_service(engine: Arc<ScriptedEngine>, store: JsonResultStore) -> BatchService {
        let processor =
            ItemProcessor::new(engine, OcrConfig::default()).with_store(Arc::new(store));
        BatchService::new(processor, batch_config(2, 5))
    }

    /// Success and failure counts always add up to the number of files
    #[tokio::test]
    async fn test_report_counts_add_up() {
        let engine = Arc::new(ScriptedEngine::new().failing(0).failing(3));
        let service = batch_service(engine, batch_config(3, 5));

        let report = service.run(image_inputs(6)).await.unwrap();

        assert_eq!(report.total_files(), 6);
        assert_eq!(report.success_count(), 4);
        assert_eq!(report.failure_count(), 2);
        assert_eq!(report.results().len(), 6);
        for (position, result) in report.results().iter().enumerate() {
            assert_eq!(result.index, position);
            assert_eq!(result.filename, format!("page_{position}.png"));
        }
    }

    /// Batches above the configured file limit are rejected before any work
    #[tokio::test]
    async fn test_max_files_limit() {
        let engine = Arc::new(ScriptedEngine::new());
        let config = BatchConfig {
            max_files: 2,
            ..Default::default()
        };
        let service = batch_service(engine.clone(), config);

        let result = service.run(image_inputs(3)).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
        assert_eq!(engine.calls(), 0);
    }

    /// Long recognized text is previewed as 100 characters plus a marker
    #[tokio::test]
    async fn test_preview_in_report() {
        let long = "a".repeat(150);
        let engine = Arc::new(ScriptedEngine::new().with_text(0, long.clone()).with_text(1, "corto"));
        let service = batch_service(engine, batch_config(2, 5));

        let report = service.run(image_inputs(2)).await.unwrap();

        match &report.results()[0].outcome {
            RecognitionOutcome::Success {
                recognized_text,
                preview_text,
                ..
            } => {
                assert_eq!(recognized_text, &long);
                assert_eq!(preview_text, &format!("{}...", "a".repeat(100)));
            }
            other => panic!("expected success, got {other:?}"),
        }
        match &report.results()[1].outcome {
            RecognitionOutcome::Success { preview_text, .. } => assert_eq!(preview_text, "corto"),
            other => panic!("expected success, got {other:?}"),
        }
    }

    /// Successful results are written as JSON and referenced by name
    #[tokio::test]
    async fn test_results_are_persisted() {
        let dir = TempDir::new().unwrap();
        let store = JsonResultStore::new(dir.path());
        let engine = Arc::new(ScriptedEngine::new().with_text(0, "Total 12,50 EUR").failing(1));

        let report = persisting_service(engine, store)
            .run(image_inputs(2))
            .await
            .unwrap();

        let output_file = match &report.results()[0].outcome {
            RecognitionOutcome::Success { output_file, .. } => output_file.clone().unwrap(),
            other => panic!("expected success, got {other:?}"),
        };
        assert!(output_file.starts_with("ocr_"));
        assert!(output_file.ends_with(".json"));

        let contents = std::fs::read_to_string(dir.path().join(&output_file)).unwrap();
        let stored: StoredResult = serde_json::from_str(&contents).unwrap();
        assert_eq!(stored.filename, "page_0.png");
        assert_eq!(stored.full_text, "Total 12,50 EUR");
        assert_eq!(stored.total_lines, 3);
        assert_eq!(stored.boxes.len(), 3);
        assert_eq!(stored.language, "spa");

        // Failed items are never persisted
        let written = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(written, 1);
    }

    /// A store that cannot write leaves the outcome a success without a file
    #[tokio::test]
    async fn test_persistence_failure_keeps_success() {
        let not_a_dir = NamedTempFile::new().unwrap();
        let store = JsonResultStore::new(not_a_dir.path());
        let engine = Arc::new(ScriptedEngine::new());

        let report = persisting_service(engine, store)
            .run(image_inputs(1))
            .await
            .unwrap();

        assert_eq!(report.success_count(), 1);
        match &report.results()[0].outcome {
            RecognitionOutcome::Success {
                output_file,
                recognized_text,
                ..
            } => {
                assert_eq!(output_file, &None);
                assert_eq!(recognized_text, &expected_text(0));
            }
            other => panic!("expected success, got {other:?}"),
        }
    }

    /// Completing normally leaves the caller's token untouched
    #[tokio::test]
    async fn test_completed_batch_does_not_cancel_token() {
        let service = batch_service(Arc::new(ScriptedEngine::new()), batch_config(2, 5));
        let token = CancellationToken::new();

        let report = service
            .run_with_cancellation(token.clone(), image_inputs(2))
            .await
            .unwrap();

        assert_eq!(report.success_count(), 2);
        assert!(!token.is_cancelled());
    }

    /// Abandoning a running batch cancels it
    #[tokio::test]
    async fn test_dropped_batch_is_cancelled() {
        let engine = Arc::new(ScriptedEngine::new().hanging(0));
        let service = batch_service(engine, batch_config(1, 30));
        let token = CancellationToken::new();

        let abandoned = tokio::time::timeout(
            Duration::from_millis(20),
            service.run_with_cancellation(token.clone(), image_inputs(1)),
        )
        .await;

        assert!(abandoned.is_err());
        assert!(token.is_cancelled());
    }

    /// Service shutdown cancels batches started afterwards
    #[tokio::test]
    async fn test_shutdown_token_cancels_batches() {
        let shutdown = CancellationToken::new();
        let engine = Arc::new(ScriptedEngine::new());
        let service =
            batch_service(engine.clone(), batch_config(2, 5)).with_shutdown_token(shutdown.clone());
        shutdown.cancel();

        let report = service.run(image_inputs(2)).await.unwrap();

        assert_eq!(report.failure_count(), 2);
        assert!(report
            .results()
            .iter()
            .all(|r| r.outcome.category() == Some(FailureCategory::Cancelled)));
        assert_eq!(engine.calls(), 0);
    }
}
