//! Observability module for centralized metrics, tracing, and logging setup.
//!
//! This module provides:
//! - Structured logging with configurable levels (JSON or pretty)
//! - Metrics collection and Prometheus export
//! - Optional distributed tracing export with OpenTelemetry OTLP
//! - A separate listener serving `/metrics`, `/health/live` and `/health/ready`

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Result;
use hyper::server::conn::http1;
use hyper_util::rt::TokioIo;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use opentelemetry::{global, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::trace::{Sampler, SdkTracerProvider};
use opentelemetry_sdk::Resource;
use tokio::net::TcpListener;
use tracing_subscriber::prelude::*;

use crate::batch::BatchReport;
use crate::observability_config::{LogFormat, ObservabilityConfig, SERVICE_NAME};
use crate::ocr::{self, OcrConfig};
use crate::storage::JsonResultStore;

/// Handles kept alive for the lifetime of the process
pub struct Observability {
    metrics_handle: Option<PrometheusHandle>,
    tracer_provider: Option<SdkTracerProvider>,
}

impl Observability {
    /// Prometheus handle, `None` when metrics export is disabled
    pub fn metrics_handle(&self) -> Option<PrometheusHandle> {
        self.metrics_handle.clone()
    }

    /// Flush and stop trace export
    pub fn shutdown(self) {
        if let Some(provider) = self.tracer_provider {
            if let Err(e) = provider.shutdown() {
                tracing::warn!("Failed to shut down tracer provider: {}", e);
            }
        }
    }
}

/// What `/health/ready` has to verify
#[derive(Clone)]
pub struct ReadinessProbe {
    ocr: OcrConfig,
    store: Option<JsonResultStore>,
}

impl ReadinessProbe {
    pub fn new(ocr: OcrConfig, store: Option<JsonResultStore>) -> Self {
        Self { ocr, store }
    }
}

/// Initialize the complete observability stack with the given configuration
pub async fn init_observability(config: &ObservabilityConfig) -> Result<Observability> {
    // Validate configuration
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid observability configuration: {}", e))?;

    // Initialize tracing first
    init_tracing_with_config(config)?;

    // Initialize metrics
    let metrics_handle = if config.enable_metrics_export {
        Some(init_metrics_with_config(config)?)
    } else {
        tracing::info!("Metrics export disabled");
        None
    };

    // Initialize OpenTelemetry tracing
    let tracer_provider = init_opentelemetry_tracing_with_config(config)?;

    tracing::info!(
        environment = %config.environment,
        otlp_endpoint = ?config.otlp_endpoint,
        metrics_port = %config.metrics_port,
        "Observability stack initialized successfully"
    );

    Ok(Observability {
        metrics_handle,
        tracer_provider,
    })
}

/// Initialize structured logging with tracing and configuration
fn init_tracing_with_config(config: &ObservabilityConfig) -> Result<()> {
    // Create the filter based on configuration
    let mut filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(format!("ocr_batch={}", config.log_level).parse()?)
        .add_directive("tower_http=info".parse()?)
        .add_directive("hyper=warn".parse()?);

    // Add observability-specific log level
    if let Ok(obs_log) = std::env::var("OBSERVABILITY_LOG_LEVEL") {
        filter = filter.add_directive(format!("ocr_batch::observability={}", obs_log).parse()?);
    }

    // Initialize based on environment (pretty for development, JSON for others)
    if config.log_format == LogFormat::Pretty {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .pretty()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_thread_names(false),
            )
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_thread_names(true),
            )
            .try_init()?;
    }

    tracing::info!(
        environment = %config.environment,
        log_level = %config.log_level,
        log_format = %config.log_format,
        "Tracing initialized with structured logging"
    );
    Ok(())
}

/// Initialize metrics collection with Prometheus exporter and configuration
fn init_metrics_with_config(config: &ObservabilityConfig) -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    metrics::describe_counter!("batch_runs_total", "Batches processed");
    metrics::describe_counter!("batch_items_total", "Batch items by outcome");
    metrics::describe_histogram!("batch_duration_seconds", "Wall-clock time per batch");
    metrics::describe_gauge!("batch_inflight_items", "Items currently inside the OCR engine");
    metrics::describe_counter!("ocr_operations_total", "OCR engine calls by result");

    tracing::info!(
        metrics_enabled = %config.enable_metrics_export,
        "Metrics collection initialized"
    );
    Ok(handle)
}

/// Initialize OpenTelemetry distributed tracing with configuration
fn init_opentelemetry_tracing_with_config(
    config: &ObservabilityConfig,
) -> Result<Option<SdkTracerProvider>> {
    // Only initialize if OTLP endpoint is configured
    let Some(endpoint) = &config.otlp_endpoint else {
        tracing::info!("OpenTelemetry tracing disabled (no OTLP endpoint configured)");
        return Ok(None);
    };

    let otlp_exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint.clone())
        .build()?;

    let resource = Resource::builder()
        .with_service_name(SERVICE_NAME)
        .with_attributes(
            config
                .tags
                .iter()
                .map(|(key, value)| KeyValue::new(key.clone(), value.clone())),
        )
        .build();

    let mut builder = SdkTracerProvider::builder()
        .with_batch_exporter(otlp_exporter)
        .with_resource(resource);
    if let Some(ratio) = config.trace_sampling_ratio {
        builder = builder.with_sampler(Sampler::TraceIdRatioBased(ratio));
    }
    let tracer_provider = builder.build();

    // Set global tracer provider
    global::set_tracer_provider(tracer_provider.clone());

    tracing::info!(
        otlp_endpoint = %endpoint,
        trace_sampling_ratio = ?config.trace_sampling_ratio,
        "OpenTelemetry tracing initialized with OTLP export"
    );

    Ok(Some(tracer_provider))
}

/// Serve metrics and health probes on their own port
pub async fn start_metrics_server(
    metrics_handle: Option<PrometheusHandle>,
    port: u16,
    readiness: ReadinessProbe,
) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Starting metrics server with health checks on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Metrics server listening on {}", addr);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    let metrics_handle = metrics_handle.clone();
                    let readiness = readiness.clone();

                    tokio::spawn(async move {
                        let io = TokioIo::new(stream);

                        let service = hyper::service::service_fn(
                            move |req: hyper::Request<hyper::body::Incoming>| {
                                let metrics_handle = metrics_handle.clone();
                                let readiness = readiness.clone();
                                async move {
                                    match (req.method(), req.uri().path(), metrics_handle) {
                                        (&hyper::Method::GET, "/metrics", Some(handle)) => {
                                            let mut response = hyper::Response::new(handle.render());
                                            response.headers_mut().insert(
                                                "content-type",
                                                hyper::header::HeaderValue::from_static("text/plain; version=0.0.4; charset=utf-8"),
                                            );
                                            Ok::<_, std::convert::Infallible>(response)
                                        }
                                        (&hyper::Method::GET, "/health/live", _) => {
                                            Ok(hyper::Response::new("OK".to_string()))
                                        }
                                        (&hyper::Method::GET, "/health/ready", _) => {
                                            match perform_readiness_checks(&readiness).await {
                                                Ok(_) => Ok(hyper::Response::new("OK".to_string())),
                                                Err(e) => {
                                                    let mut response = hyper::Response::new(
                                                        format!("NOT READY: {}", e),
                                                    );
                                                    *response.status_mut() =
                                                        hyper::StatusCode::SERVICE_UNAVAILABLE;
                                                    Ok(response)
                                                }
                                            }
                                        }
                                        _ => {
                                            let mut response =
                                                hyper::Response::new("Not Found".to_string());
                                            *response.status_mut() = hyper::StatusCode::NOT_FOUND;
                                            Ok(response)
                                        }
                                    }
                                }
                            },
                        );

                        if let Err(err) = http1::Builder::new().serve_connection(io, service).await
                        {
                            tracing::error!("Error serving connection: {:?}", err);
                        }
                    });
                }
                Err(e) => {
                    tracing::error!("Error accepting connection: {}", e);
                }
            }
        }
    });

    Ok(())
}

/// Perform readiness checks: OCR engine can start, output directory accepts writes
pub async fn perform_readiness_checks(readiness: &ReadinessProbe) -> Result<()> {
    ocr::check_ocr_health(&readiness.ocr).await?;

    if let Some(store) = &readiness.store {
        store
            .check_writable()
            .await
            .map_err(|e| anyhow::anyhow!("Storage health check failed: {}", e))?;
    }

    Ok(())
}

/// Create a span for OCR operations
pub fn ocr_span(operation: &str) -> tracing::Span {
    tracing::info_span!("ocr_operation", operation = operation, component = "ocr")
}

/// Create a span covering one batch run
pub fn batch_span(batch_size: usize, max_concurrency: usize) -> tracing::Span {
    tracing::info_span!(
        "batch_operation",
        batch_size = batch_size,
        max_concurrency = max_concurrency,
        component = "batch"
    )
}

/// Record OCR operation metrics
pub fn record_ocr_metrics(success: bool, duration: Duration, image_size: u64) {
    metrics::counter!("ocr_operations_total", "result" => if success { "success" } else { "failure" }).increment(1);
    metrics::histogram!("ocr_duration_seconds").record(duration.as_secs_f64());
    metrics::histogram!("ocr_image_size_bytes").record(image_size as f64);
}

/// Record metrics for a finished batch
pub fn record_batch_metrics(report: &BatchReport) {
    metrics::counter!("batch_runs_total").increment(1);
    metrics::histogram!("batch_duration_seconds").record(report.elapsed().as_secs_f64());
    for result in report.results() {
        metrics::counter!("batch_items_total", "outcome" => result.outcome.label()).increment(1);
    }
}

/// Record request metrics
pub fn record_request_metrics(method: &str, status: u16, duration: Duration) {
    let method = method.to_string();
    let status = status.to_string();
    metrics::counter!("requests_total", "method" => method, "status" => status).increment(1);
    metrics::histogram!("request_duration_seconds").record(duration.as_secs_f64());
}
