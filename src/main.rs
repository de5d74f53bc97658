use anyhow::Result;
use ocr_batch::batch::{BatchService, ItemProcessor};
use ocr_batch::config::AppConfig;
use ocr_batch::observability::{self, ReadinessProbe};
use ocr_batch::ocr::TesseractEngine;
use ocr_batch::recognition::RecognitionEngine;
use ocr_batch::server::{self, AppState};
use ocr_batch::storage::JsonResultStore;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Resolve on Ctrl-C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file first
    dotenvy::dotenv().ok();

    // Load and validate configuration before anything else starts
    let config = AppConfig::from_env()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;
    config.validate().map_err(|e| {
        anyhow::anyhow!("Configuration validation failed: {}. Please check your environment.", e)
    })?;

    // Initialize complete observability stack (metrics, tracing, logging)
    let telemetry = observability::init_observability(&config.observability).await?;
    info!("{}", config.summary());

    // Prepare result storage
    let store = if config.storage.persist_results {
        let store = JsonResultStore::new(&config.storage.output_dir);
        store.ensure_dir().await?;
        info!(output_dir = %store.output_dir().display(), "Result persistence enabled");
        Some(store)
    } else {
        info!("Result persistence disabled");
        None
    };

    // Initialize OCR engine (fails fast when language data is missing)
    let engine = Arc::new(TesseractEngine::new(config.ocr.clone())?);
    info!(
        languages = %engine.config().languages,
        "OCR engine initialized"
    );

    observability::start_metrics_server(
        telemetry.metrics_handle(),
        config.server.metrics_port,
        ReadinessProbe::new(config.ocr.clone(), store.clone()),
    )
    .await?;

    // Every batch derives its cancellation from this token
    let shutdown = CancellationToken::new();

    let recognizer: Arc<dyn RecognitionEngine> = engine.clone();
    let mut processor = ItemProcessor::new(recognizer, config.ocr.clone());
    if let Some(store) = store {
        processor = processor.with_store(Arc::new(store));
    }
    let batch = BatchService::new(processor, config.batch.clone())
        .with_shutdown_token(shutdown.clone());

    let app = server::router(
        AppState::new(Arc::new(batch)),
        config.server.max_batch_upload_bytes,
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("OCR batch server listening on {}", addr);

    let signal_token = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            signal_token.cancel();
        })
        .await?;

    engine.shutdown();
    telemetry.shutdown();
    info!("Server shutdown complete");
    Ok(())
}
