use opentelemetry::{global, KeyValue};
use opentelemetry_appender_tracing::layer::OpenTelemetryTracingBridge;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use opentelemetry_sdk::{logs as sdklogs, runtime, trace as sdktrace, Resource};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::subscriber::{build_filter, TelemetryConfig, TelemetryError};

const DEFAULT_SERVICE_NAME: &str = "agentic-layer-agent";

pub(crate) struct OtlpProviders {
    meter_provider: SdkMeterProvider,
}

impl OtlpProviders {
    pub(crate) fn shutdown(self) {
        if let Err(e) = self.meter_provider.shutdown() {
            eprintln!("failed to flush OTLP metrics: {e}");
        }
        global::shutdown_tracer_provider();
        global::shutdown_logger_provider();
    }
}

fn exporter(config: &TelemetryConfig) -> opentelemetry_otlp::TonicExporterBuilder {
    let exporter = opentelemetry_otlp::new_exporter().tonic().with_env();
    match config.otlp_endpoint.as_deref() {
        Some(endpoint) => exporter.with_endpoint(endpoint),
        None => exporter,
    }
}

/// Install the OTLP log pipeline as the global logger provider.
fn install_log_pipeline(config: &TelemetryConfig, resource: Resource) -> Result<(), TelemetryError> {
    opentelemetry_otlp::new_pipeline()
        .logging()
        .with_exporter(exporter(config))
        .with_log_config(sdklogs::Config::default().with_resource(resource))
        .install_batch(runtime::Tokio)
        .map_err(|e| TelemetryError::Otlp(e.to_string()))?;
    Ok(())
}

/// Install OTLP traces, metrics and logs plus the stderr fmt layer.
///
/// Events are exported twice: as span events through `tracing-opentelemetry`
/// and as log records through the appender bridge.
pub(crate) fn init_otlp_subscriber(
    config: &TelemetryConfig,
) -> Result<OtlpProviders, TelemetryError> {
    let service_name = config
        .service_name
        .as_deref()
        .unwrap_or(DEFAULT_SERVICE_NAME)
        .to_string();
    let resource = Resource::new(vec![KeyValue::new("service.name", service_name)]);

    let tracer = opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_exporter(exporter(config))
        .with_trace_config(sdktrace::config().with_resource(resource.clone()))
        .install_batch(runtime::Tokio)
        .map_err(|e| TelemetryError::Otlp(e.to_string()))?;

    if let Some(provider) = tracer.provider() {
        global::set_tracer_provider(provider);
    }

    let meter_provider = opentelemetry_otlp::new_pipeline()
        .metrics(runtime::Tokio)
        .with_exporter(exporter(config))
        .with_resource(resource.clone())
        .build()
        .map_err(|e| TelemetryError::Otlp(e.to_string()))?;
    global::set_meter_provider(meter_provider.clone());

    install_log_pipeline(config, resource)?;
    let logs = OpenTelemetryTracingBridge::new(&global::logger_provider());

    let filter = build_filter(&config.level);
    let telemetry = tracing_opentelemetry::layer().with_tracer(tracer);

    let result = if config.json_output {
        tracing_subscriber::registry()
            .with(filter)
            .with(telemetry)
            .with(logs)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(telemetry)
            .with(logs)
            .with(fmt::layer().with_writer(std::io::stderr))
            .try_init()
    };
    result.map_err(|e| TelemetryError::AlreadyInstalled(e.to_string()))?;

    Ok(OtlpProviders { meter_provider })
}
