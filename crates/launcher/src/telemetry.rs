//! Telemetry setup for OpenTelemetry integration
//!
//! # Environment Variables
//!
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (e.g., http://localhost:4317)
//! - `OTEL_SERVICE_NAME`: Service name (default: stevedore-worker)
//!
//! ```text
//! OTEL_EXPORTER_OTLP_ENDPOINT=http://localhost:4317 \
//! OTEL_SERVICE_NAME=stevedore-dev \
//!     stevedore-worker high low
//! ```

/// Endpoint to export to, if OpenTelemetry is configured
pub fn otlp_endpoint() -> Option<String> {
    std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
        .ok()
        .filter(|e| !e.is_empty())
}

/// Tracing layer exporting spans over OTLP, when configured.
///
/// Runs before the subscriber exists, so problems go to stderr.
#[cfg(feature = "telemetry")]
pub fn layer<S>(
) -> Option<tracing_opentelemetry::OpenTelemetryLayer<S, opentelemetry_sdk::trace::Tracer>>
where
    S: tracing::Subscriber + for<'span> tracing_subscriber::registry::LookupSpan<'span>,
{
    let endpoint = otlp_endpoint()?;
    match init_tracer(&endpoint) {
        Ok(tracer) => Some(tracing_opentelemetry::layer().with_tracer(tracer)),
        Err(e) => {
            eprintln!("Failed to initialize OpenTelemetry (continuing without it): {e:#}");
            None
        }
    }
}

#[cfg(feature = "telemetry")]
fn init_tracer(endpoint: &str) -> anyhow::Result<opentelemetry_sdk::trace::Tracer> {
    use opentelemetry::trace::TracerProvider as _;
    use opentelemetry::KeyValue;
    use opentelemetry_otlp::WithExportConfig;
    use opentelemetry_sdk::Resource;

    let service_name =
        std::env::var("OTEL_SERVICE_NAME").unwrap_or_else(|_| "stevedore-worker".to_string());

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()?;

    let provider = opentelemetry_sdk::trace::TracerProvider::builder()
        .with_batch_exporter(exporter, opentelemetry_sdk::runtime::Tokio)
        .with_resource(Resource::new(vec![KeyValue::new(
            "service.name",
            service_name.clone(),
        )]))
        .build();

    let tracer = provider.tracer(service_name);
    opentelemetry::global::set_tracer_provider(provider);
    Ok(tracer)
}

/// Without the `telemetry` feature there is nothing to export
#[cfg(not(feature = "telemetry"))]
pub fn layer() -> Option<tracing_subscriber::layer::Identity> {
    if otlp_endpoint().is_some() {
        eprintln!("OpenTelemetry endpoint set but feature 'telemetry' not enabled");
        eprintln!("Rebuild with: cargo build --features telemetry");
    }
    None
}
