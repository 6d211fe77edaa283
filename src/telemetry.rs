#![allow(unused_imports)] // some used only for telemetry feature
use opentelemetry::trace::{TraceId, TracerProvider};
use thiserror::Error;
use tracing_subscriber::{EnvFilter, Registry, prelude::*};

#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("failed to initialize tracer: {0}")]
    TracerInit(String),

    #[error("failed to initialize tracing subscriber: {0}")]
    SubscriberInit(String),
}

///  Fetch an opentelemetry::trace::TraceId as hex through the full tracing stack
pub fn get_trace_id() -> TraceId {
    use opentelemetry::trace::TraceContextExt as _; // opentelemetry::Context -> opentelemetry::trace::Span
    use tracing_opentelemetry::OpenTelemetrySpanExt as _; // tracing::Span to opentelemetry::Context
    tracing::Span::current()
        .context()
        .span()
        .span_context()
        .trace_id()
}

#[cfg(feature = "telemetry")]
fn resource() -> opentelemetry_sdk::Resource {
    use opentelemetry::KeyValue;
    opentelemetry_sdk::Resource::builder()
        .with_service_name(env!("CARGO_PKG_NAME"))
        .with_attribute(KeyValue::new("service.version", env!("CARGO_PKG_VERSION")))
        .build()
}

#[cfg(feature = "telemetry")]
fn init_tracer(endpoint: &str) -> Result<opentelemetry_sdk::trace::SdkTracer, TelemetryError> {
    use opentelemetry_otlp::{SpanExporter, WithExportConfig};
    let exporter = SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()
        .map_err(|e| TelemetryError::TracerInit(e.to_string()))?;

    let provider = opentelemetry_sdk::trace::SdkTracerProvider::builder()
        .with_resource(resource())
        .with_batch_exporter(exporter)
        .build();

    opentelemetry::global::set_tracer_provider(provider.clone());
    Ok(provider.tracer("tracing-otel-subscriber"))
}

/// Initialize tracing
///
/// Logs go to stderr, stdout belongs to whoever runs the provider.
/// `RUST_LOG` wins over `debug`.
pub fn init(debug: bool) -> Result<(), TelemetryError> {
    let default_level = if debug { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let logger = tracing_subscriber::fmt::layer()
        .compact()
        .with_writer(std::io::stderr);

    // Decide on layers
    let reg = Registry::default().with(env_filter).with(logger);

    #[cfg(feature = "telemetry")]
    let result = match std::env::var("OPENTELEMETRY_ENDPOINT_URL") {
        Ok(endpoint) => {
            let otel = tracing_opentelemetry::OpenTelemetryLayer::new(init_tracer(&endpoint)?);
            reg.with(otel).try_init()
        }
        Err(_) => reg.try_init(),
    };
    #[cfg(not(feature = "telemetry"))]
    let result = reg.try_init();

    result.map_err(|e| TelemetryError::SubscriberInit(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trace_id_is_invalid_without_exporter() {
        assert_eq!(get_trace_id(), TraceId::INVALID);
    }
}
