//! Tracing subscriber setup and OpenTelemetry span context access.

use availability_core::context::{AmbientContext, MessageContext};
use opentelemetry::trace::{SpanContext, TraceContextExt, TracerProvider as _};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::trace::SdkTracerProvider;
use tracing::Span;
use tracing_opentelemetry::OpenTelemetrySpanExt;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::error::AppError;

const SERVICE_NAME: &str = "availability";

/// Installs the global subscriber: env filter (default `info`), JSON log
/// lines and an OpenTelemetry layer. Spans are exported over OTLP when
/// `otlp_endpoint` is set; otherwise they only provide trace and span IDs.
///
/// The returned provider must be shut down before exit to flush spans.
///
/// # Errors
///
/// Returns `AppError::Telemetry` if the exporter cannot be built or a global
/// subscriber is already installed.
pub fn init_tracing(otlp_endpoint: Option<&str>) -> Result<SdkTracerProvider, AppError> {
    let mut builder = SdkTracerProvider::builder()
        .with_resource(Resource::builder().with_service_name(SERVICE_NAME).build());
    if let Some(endpoint) = otlp_endpoint {
        let exporter = opentelemetry_otlp::SpanExporter::builder()
            .with_tonic()
            .with_endpoint(endpoint)
            .build()
            .map_err(|e| AppError::Telemetry(format!("cannot build OTLP exporter: {e}")))?;
        builder = builder.with_batch_exporter(exporter);
    }
    let provider = builder.build();
    let tracer = provider.tracer(SERVICE_NAME);

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().json())
        .with(tracing_opentelemetry::layer().with_tracer(tracer))
        .try_init()
        .map_err(|e| AppError::Telemetry(e.to_string()))?;

    Ok(provider)
}

/// Renders a span context as `trace_id:span_id:0:flags`, the format consumers
/// of the span-context slot expect.
#[must_use]
pub fn render_span_context(span_context: &SpanContext) -> String {
    format!(
        "{}:{}:0:{:x}",
        span_context.trace_id(),
        span_context.span_id(),
        span_context.trace_flags().to_u8()
    )
}

/// Ambient context backed by the current `tracing` span's OpenTelemetry
/// context.
#[derive(Debug, Clone, Copy, Default)]
pub struct OtelAmbientContext;

impl AmbientContext for OtelAmbientContext {
    fn current(&self) -> MessageContext {
        let context = Span::current().context();
        let span = context.span();
        let span_context = span.span_context();
        if !span_context.is_valid() {
            return MessageContext::default();
        }
        MessageContext {
            correlation_id: None,
            span_context: Some(render_span_context(span_context)),
        }
    }
}
