//! Logging, tracing and metrics export
//!
//! Logs are JSON lines carrying the current span. When an OTLP endpoint is
//! configured, spans and the instruments in [`crate::metrics`] are pushed
//! over gRPC as well; the returned [`TelemetryGuard`] flushes them when the
//! controller stops.

use opentelemetry::trace::TracerProvider as _;
use opentelemetry::{global, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::trace::TracerProvider;
use opentelemetry_sdk::{runtime, Resource};
use tracing::warn;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::Error;

/// Filter used when `RUST_LOG` is not set
pub const DEFAULT_LOG_FILTER: &str = "info,tremor=debug,kube=info,tower=warn,hyper=warn";

const TELEMETRY_CONTEXT: &str = "telemetry";

/// Downward-API env vars copied onto the OpenTelemetry resource
const K8S_RESOURCE_ENV: &[(&str, &str)] = &[
    ("POD_NAME", "k8s.pod.name"),
    ("POD_NAMESPACE", "k8s.namespace.name"),
    ("NODE_NAME", "k8s.node.name"),
];

/// Telemetry settings for the operator process
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name on spans and metrics (e.g. "tremor-operator")
    pub service_name: String,

    /// OTLP collector (e.g. "http://otel-collector:4317"); `None` keeps
    /// everything in the local log stream
    pub otlp_endpoint: Option<String>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "tremor".to_string(),
            otlp_endpoint: std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").ok(),
        }
    }
}

/// Owns the OTLP providers installed by [`init_telemetry`].
///
/// Call [`TelemetryGuard::shutdown`] after the controller returns so batched
/// spans and the last metric interval reach the collector.
#[must_use = "dropping the guard skips the final OTLP flush"]
pub struct TelemetryGuard {
    tracer: Option<TracerProvider>,
    meter: Option<SdkMeterProvider>,
}

impl TelemetryGuard {
    /// Whether OTLP export is active
    pub fn exporting(&self) -> bool {
        self.tracer.is_some()
    }

    /// Flush and stop the exporters; failures are logged, not returned
    pub fn shutdown(self) {
        if let Some(tracer) = self.tracer {
            if let Err(e) = tracer.shutdown() {
                warn!(error = %e, "failed to flush spans on shutdown");
            }
        }
        if let Some(meter) = self.meter {
            if let Err(e) = meter.shutdown() {
                warn!(error = %e, "failed to flush metrics on shutdown");
            }
        }
    }
}

/// Install the global subscriber and, if configured, OTLP export.
///
/// Must be called once, from inside a Tokio runtime.
pub fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard, Error> {
    global::set_text_map_propagator(TraceContextPropagator::new());

    let mut guard = TelemetryGuard {
        tracer: None,
        meter: None,
    };

    let otel_layer = match &config.otlp_endpoint {
        Some(endpoint) => {
            let resource = build_resource(&config.service_name);
            let meter = otlp_meter_provider(endpoint, resource.clone())?;
            global::set_meter_provider(meter.clone());
            let tracer_provider = otlp_tracer_provider(endpoint, resource)?;
            global::set_tracer_provider(tracer_provider.clone());

            let tracer = tracer_provider.tracer(config.service_name.clone());
            guard.tracer = Some(tracer_provider);
            guard.meter = Some(meter);
            Some(tracing_opentelemetry::layer().with_tracer(tracer))
        }
        None => None,
    };

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(false)
        .with_target(true)
        .with_file(false)
        .with_line_number(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .with(otel_layer)
        .try_init()
        .map_err(|e| {
            Error::internal_with_context(
                TELEMETRY_CONTEXT,
                format!("failed to install subscriber: {}", e),
            )
        })?;

    Ok(guard)
}

/// Service identity plus whatever pod metadata the Deployment exposes
fn build_resource(service_name: &str) -> Resource {
    let mut attributes = vec![
        KeyValue::new(
            opentelemetry_semantic_conventions::resource::SERVICE_NAME,
            service_name.to_string(),
        ),
        KeyValue::new(
            opentelemetry_semantic_conventions::resource::SERVICE_VERSION,
            env!("CARGO_PKG_VERSION"),
        ),
    ];
    attributes.extend(
        K8S_RESOURCE_ENV
            .iter()
            .filter_map(|(var, key)| std::env::var(var).ok().map(|v| KeyValue::new(*key, v))),
    );
    Resource::new(attributes)
}

fn otlp_tracer_provider(endpoint: &str, resource: Resource) -> Result<TracerProvider, Error> {
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()
        .map_err(|e| {
            Error::internal_with_context(
                TELEMETRY_CONTEXT,
                format!("failed to build span exporter for {}: {}", endpoint, e),
            )
        })?;

    Ok(TracerProvider::builder()
        .with_batch_exporter(exporter, runtime::Tokio)
        .with_resource(resource)
        .build())
}

fn otlp_meter_provider(endpoint: &str, resource: Resource) -> Result<SdkMeterProvider, Error> {
    let exporter = opentelemetry_otlp::MetricExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()
        .map_err(|e| {
            Error::internal_with_context(
                TELEMETRY_CONTEXT,
                format!("failed to build metric exporter for {}: {}", endpoint, e),
            )
        })?;

    Ok(SdkMeterProvider::builder()
        .with_reader(PeriodicReader::builder(exporter, runtime::Tokio).build())
        .with_resource(resource)
        .build())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filter_parses() {
        assert!(DEFAULT_LOG_FILTER.parse::<EnvFilter>().is_ok());
    }

    #[test]
    fn resource_carries_service_identity() {
        let resource = build_resource("tremor-operator");
        let name = resource.get(opentelemetry::Key::from_static_str(
            opentelemetry_semantic_conventions::resource::SERVICE_NAME,
        ));
        assert_eq!(name.map(|v| v.to_string()).as_deref(), Some("tremor-operator"));
    }

    #[test]
    fn local_only_guard_has_nothing_to_flush() {
        let guard = TelemetryGuard {
            tracer: None,
            meter: None,
        };
        assert!(!guard.exporting());
        guard.shutdown();
    }
}
