//! # Telemetry
//!
//! Installs the global `tracing` subscriber used by the graph engine and,
//! when an OTLP endpoint is configured, exports spans over gRPC.
//!
//! Spans emitted by the engine:
//!
//! ```text
//! graph_run{nodes} ──────────────────────────────────────────▶
//!   graph_node{node_id=root} ─────────────────────────────▶
//!     http_request{method} ────▶
//!     graph_node{node_id=successor} ───────────────▶
//!       http_request{method} ────▶
//! ```
//!
//! Successor spans nest under the node that triggered them, so an exported
//! trace follows the dependency path through the graph.
//!
//! ## Environment
//!
//! - `RUST_LOG`: filter directives, overriding `log_level`
//! - `OTEL_SERVICE_NAME`: service name attached to exported spans
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: collector URL; no export when unset
//! - `OTEL_TRACES_SAMPLER_ARG`: sampling ratio, clamped to `0.0..=1.0`
//!
//! ## Example
//!
//! ```ignore
//! init_telemetry(TelemetryConfig::from_env())?;
//!
//! let summary = graph.run().await?;
//!
//! shutdown_telemetry();
//! ```

use opentelemetry::trace::TracerProvider as _;
use opentelemetry::{global, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::runtime::Tokio;
use opentelemetry_sdk::trace::{RandomIdGenerator, Sampler, Tracer, TracerProvider};
use opentelemetry_sdk::{trace as sdktrace, Resource};
use tracing::Level;
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

// ============================================================================
// CONFIG
// ============================================================================

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub service_name: String,

    /// gRPC collector URL, e.g. `http://localhost:4317`. Console only when `None`.
    pub otlp_endpoint: Option<String>,

    /// Fraction of traces exported, `0.0..=1.0`.
    pub sampling_ratio: f64,

    pub enable_console_logging: bool,

    /// Default level when `RUST_LOG` is unset.
    pub log_level: Level,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "request-graph".to_string(),
            otlp_endpoint: None,
            sampling_ratio: 1.0,
            enable_console_logging: true,
            log_level: Level::INFO,
        }
    }
}

impl TelemetryConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(name) = std::env::var("OTEL_SERVICE_NAME") {
            config.service_name = name;
        }

        if let Ok(endpoint) = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT") {
            if !endpoint.trim().is_empty() {
                config.otlp_endpoint = Some(endpoint);
            }
        }

        if let Some(ratio) = std::env::var("OTEL_TRACES_SAMPLER_ARG")
            .ok()
            .and_then(|r| r.parse::<f64>().ok())
        {
            config.sampling_ratio = ratio.clamp(0.0, 1.0);
        }

        config
    }
}

// ============================================================================
// INIT / SHUTDOWN
// ============================================================================

/// Installs the global subscriber.
///
/// Returns the OTLP tracer when an endpoint is configured. Fails if a global
/// subscriber is already installed or the exporter cannot be built.
pub fn init_telemetry(config: TelemetryConfig) -> anyhow::Result<Option<Tracer>> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.to_string()));

    match &config.otlp_endpoint {
        Some(endpoint) => {
            let tracer = otlp_tracer(&config.service_name, endpoint, config.sampling_ratio)?;

            tracing_subscriber::registry()
                .with(env_filter)
                .with(OpenTelemetryLayer::new(tracer.clone()))
                .with(
                    config
                        .enable_console_logging
                        .then(|| tracing_subscriber::fmt::layer().compact()),
                )
                .try_init()?;

            tracing::info!(
                service_name = %config.service_name,
                endpoint = %endpoint,
                sampling_ratio = config.sampling_ratio,
                "OTLP telemetry initialized"
            );
            Ok(Some(tracer))
        }
        None => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    config
                        .enable_console_logging
                        .then(|| tracing_subscriber::fmt::layer().compact()),
                )
                .try_init()?;

            tracing::debug!("Console telemetry initialized");
            Ok(None)
        }
    }
}

/// Flushes buffered spans. Call before the process exits.
pub fn shutdown_telemetry() {
    global::shutdown_tracer_provider();
    tracing::debug!("Telemetry shut down");
}

fn sampler_for(ratio: f64) -> Sampler {
    if ratio >= 1.0 {
        Sampler::AlwaysOn
    } else if ratio <= 0.0 {
        Sampler::AlwaysOff
    } else {
        Sampler::TraceIdRatioBased(ratio)
    }
}

fn otlp_tracer(service_name: &str, endpoint: &str, sampling_ratio: f64) -> anyhow::Result<Tracer> {
    let exporter = opentelemetry_otlp::new_exporter()
        .tonic()
        .with_endpoint(endpoint)
        .build_span_exporter()?;

    let provider = TracerProvider::builder()
        .with_batch_exporter(exporter, Tokio)
        .with_config(
            sdktrace::Config::default()
                .with_sampler(sampler_for(sampling_ratio))
                .with_id_generator(RandomIdGenerator::default())
                .with_resource(Resource::new(vec![
                    KeyValue::new("service.name", service_name.to_string()),
                    KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
                ])),
        )
        .build();

    let tracer = provider.tracer(service_name.to_string());
    global::set_tracer_provider(provider);

    Ok(tracer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = TelemetryConfig::default();
        assert_eq!(config.service_name, "request-graph");
        assert!(config.otlp_endpoint.is_none());
        assert_eq!(config.sampling_ratio, 1.0);
        assert!(config.enable_console_logging);
        assert_eq!(config.log_level, Level::INFO);
    }

    #[test]
    fn test_sampler_selection() {
        assert!(matches!(sampler_for(1.0), Sampler::AlwaysOn));
        assert!(matches!(sampler_for(0.0), Sampler::AlwaysOff));
        assert!(matches!(sampler_for(0.25), Sampler::TraceIdRatioBased(r) if r == 0.25));
    }

    #[test]
    fn test_console_init_then_second_init_fails() {
        let config = TelemetryConfig {
            enable_console_logging: false,
            ..Default::default()
        };
        // another test binary thread may have installed a subscriber first
        let first = init_telemetry(config.clone());
        if let Ok(tracer) = first {
            assert!(tracer.is_none());
        }
        assert!(init_telemetry(config).is_err());
    }
}
