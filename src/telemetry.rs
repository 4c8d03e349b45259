//! Process-wide logging and OpenTelemetry setup
//!
//! Installed once at process start. Charm code only ever uses the `tracing`
//! macros; whether spans leave the process depends on
//! `OTEL_EXPORTER_OTLP_ENDPOINT`.

use opentelemetry::KeyValue;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{runtime, trace as sdktrace, Resource};
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::error::{Error, Result};

pub const OTEL_ENDPOINT_ENV: &str = "OTEL_EXPORTER_OTLP_ENDPOINT";

/// Initialise the global subscriber
///
/// `json` switches the stdout layer to structured JSON lines.
pub fn init_telemetry(service_name: &str, json: bool) -> Result<()> {
    let env_filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env_lossy();

    let (text_layer, json_layer) = if json {
        (None, Some(fmt::layer().json().with_target(true)))
    } else {
        (Some(fmt::layer().with_target(true)), None)
    };

    let otel_endpoint = std::env::var(OTEL_ENDPOINT_ENV).ok();
    let otel_layer = match otel_endpoint.as_deref() {
        Some(endpoint) => {
            let tracer = opentelemetry_otlp::new_pipeline()
                .tracing()
                .with_exporter(
                    opentelemetry_otlp::new_exporter()
                        .tonic()
                        .with_endpoint(endpoint),
                )
                .with_trace_config(sdktrace::config().with_resource(Resource::new(vec![
                    KeyValue::new("service.name", service_name.to_string()),
                ])))
                .install_batch(runtime::Tokio)
                .map_err(|e| Error::ConfigError(format!("OTLP exporter: {e}")))?;
            Some(tracing_opentelemetry::layer().with_tracer(tracer))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(text_layer)
        .with(json_layer)
        .with(otel_layer)
        .try_init()
        .map_err(|e| Error::ConfigError(format!("tracing subscriber: {e}")))?;

    match otel_endpoint {
        Some(endpoint) => info!("OpenTelemetry tracing initialized ({})", endpoint),
        None => info!(
            "OpenTelemetry tracing disabled ({} not set)",
            OTEL_ENDPOINT_ENV
        ),
    }
    Ok(())
}

/// Flush any spans still buffered by the batch exporter
pub fn shutdown_telemetry() {
    opentelemetry::global::shutdown_tracer_provider();
}
