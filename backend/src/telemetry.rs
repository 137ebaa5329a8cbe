//! Span export.
//!
//! Handlers create spans with the `tracing` macros; [`init`] installs a
//! global subscriber that forwards closed spans to an OTLP collector through
//! a batching processor. Export happens on a background thread and failures
//! are dropped there, so they never reach a request.
//!
//! Log records are not routed here: they go through `log`/`env_logger`.

use opentelemetry::trace::TracerProvider as _;
use opentelemetry::KeyValue;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::trace::TracerProvider;
use opentelemetry_sdk::{runtime, Resource};
use thiserror::Error;
use tracing::Span;
use tracing_subscriber::layer::SubscriberExt;

pub const PREDICTION_SPAN: &str = "model_prediction";
pub const PREDICTED_CLASS: &str = "predicted_class";

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub service_name: String,
    /// OTLP/gRPC endpoint, e.g. `http://localhost:4317`. Export is disabled
    /// when unset.
    pub otlp_endpoint: Option<String>,
}

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("failed to build OTLP exporter: {0}")]
    Exporter(String),

    #[error("a global tracing subscriber is already installed")]
    AlreadyInstalled(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// Keeps the tracer provider alive; flushes pending spans when dropped.
pub struct TelemetryGuard {
    provider: Option<TracerProvider>,
}

impl TelemetryGuard {
    /// Flushes pending spans and stops the exporter.
    ///
    /// Blocks until the final export completes or times out. The exporter's
    /// gRPC channel runs on the async runtime that called [`init`], so call
    /// this from a blocking thread (`spawn_blocking`), never from one of that
    /// runtime's worker threads.
    pub fn shutdown(mut self) {
        self.flush();
    }

    fn flush(&mut self) {
        if let Some(provider) = self.provider.take() {
            if let Err(e) = provider.shutdown() {
                log::warn!("Trace provider shutdown failed: {}", e);
            }
        }
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        self.flush();
    }
}

/// Installs the process-wide span pipeline. Must be called once, before the
/// server starts accepting requests, from within the async runtime.
pub fn init(config: &TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    let Some(endpoint) = config.otlp_endpoint.as_deref() else {
        tracing::subscriber::set_global_default(tracing_subscriber::registry())?;
        return Ok(TelemetryGuard { provider: None });
    };

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()
        .map_err(|e| TelemetryError::Exporter(e.to_string()))?;

    let provider = TracerProvider::builder()
        .with_batch_exporter(exporter, runtime::TokioCurrentThread)
        .with_resource(Resource::new(vec![KeyValue::new(
            "service.name",
            config.service_name.clone(),
        )]))
        .build();

    let tracer = provider.tracer(env!("CARGO_PKG_NAME"));
    let subscriber =
        tracing_subscriber::registry().with(tracing_opentelemetry::layer().with_tracer(tracer));
    tracing::subscriber::set_global_default(subscriber)?;

    Ok(TelemetryGuard {
        provider: Some(provider),
    })
}

/// Opens the span wrapping one model invocation. The span closes when the
/// returned handle is dropped.
pub fn prediction_span() -> Span {
    tracing::info_span!(
        "model_prediction",
        predicted_class = tracing::field::Empty,
        otel.status_code = tracing::field::Empty,
        error.message = tracing::field::Empty,
    )
}

/// Records the label as a string attribute.
pub fn record_prediction(span: &Span, label: &str) {
    span.record(PREDICTED_CLASS, label);
}

pub fn record_failure(span: &Span, error: &dyn std::fmt::Display) {
    span.record("otel.status_code", "ERROR");
    span.record("error.message", error.to_string().as_str());
}
