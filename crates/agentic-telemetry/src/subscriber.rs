use agentic_config::Settings;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Dependencies that log every connection at debug level.
const QUIET_TARGETS: &[&str] = &["hyper", "hyper_util", "h2", "reqwest", "tower", "tonic"];

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("global subscriber already installed: {0}")]
    AlreadyInstalled(String),

    #[error("OTLP pipeline setup failed: {0}")]
    Otlp(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_level")]
    pub level: String,

    #[serde(default)]
    pub json_output: bool,

    /// Overrides `OTEL_EXPORTER_OTLP_ENDPOINT` when set.
    #[serde(default)]
    pub otlp_endpoint: Option<String>,

    #[serde(default)]
    pub service_name: Option<String>,

    #[serde(default)]
    pub capture_http_bodies: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            json_output: false,
            otlp_endpoint: None,
            service_name: None,
            capture_http_bodies: false,
        }
    }
}

impl From<&Settings> for TelemetryConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            level: normalize_level(&settings.log_level),
            json_output: settings.json_logs,
            otlp_endpoint: None,
            service_name: settings.service_name.clone(),
            capture_http_bodies: settings.capture_http_bodies,
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

/// Map `LOGLEVEL` spellings (`WARNING`, `CRITICAL`, ...) onto tracing levels.
pub(crate) fn normalize_level(level: &str) -> String {
    match level.trim().to_ascii_lowercase().as_str() {
        "trace" => "trace",
        "debug" => "debug",
        "warn" | "warning" => "warn",
        "error" | "critical" | "fatal" => "error",
        "off" => "off",
        _ => "info",
    }
    .to_string()
}

pub(crate) fn build_filter(level: &str) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }

    let mut directives = normalize_level(level);
    for target in QUIET_TARGETS {
        directives.push_str(&format!(",{target}=warn"));
    }
    EnvFilter::new(directives)
}

/// Flushes exporters when dropped. Hold it for the lifetime of the process.
#[must_use = "dropping the guard shuts telemetry down"]
pub struct TelemetryGuard {
    #[cfg(feature = "otlp")]
    pub(crate) otlp: Option<crate::otlp::OtlpProviders>,
}

impl TelemetryGuard {
    #[cfg(not(feature = "otlp"))]
    fn noop() -> Self {
        Self {}
    }
}

/// Install stderr logging only.
pub fn init_subscriber(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let filter = build_filter(&config.level);

    let result = if config.json_output {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .try_init()
    };

    result.map_err(|e| TelemetryError::AlreadyInstalled(e.to_string()))
}

/// Install logging and, when built with `otlp`, the OpenTelemetry pipelines.
pub fn init(config: &TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    #[cfg(feature = "otlp")]
    {
        let providers = crate::otlp::init_otlp_subscriber(config)?;
        tracing::info!(
            capture_http_bodies = config.capture_http_bodies,
            "OpenTelemetry export enabled"
        );
        return Ok(TelemetryGuard {
            otlp: Some(providers),
        });
    }

    #[cfg(not(feature = "otlp"))]
    {
        init_subscriber(config)?;
        tracing::debug!("built without otlp feature, exporting logs to stderr only");
        Ok(TelemetryGuard::noop())
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        #[cfg(feature = "otlp")]
        if let Some(providers) = self.otlp.take() {
            providers.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TelemetryConfig::default();
        assert_eq!(config.level, "info");
        assert!(!config.json_output);
        assert!(config.otlp_endpoint.is_none());
        assert!(!config.capture_http_bodies);
    }

    #[test]
    fn normalizes_level_aliases() {
        assert_eq!(normalize_level("INFO"), "info");
        assert_eq!(normalize_level("WARNING"), "warn");
        assert_eq!(normalize_level("CRITICAL"), "error");
        assert_eq!(normalize_level("Debug"), "debug");
        assert_eq!(normalize_level("verbose"), "info");
    }

    #[test]
    fn config_from_settings() {
        let settings = Settings::from_lookup(|key| match key {
            "LOGLEVEL" => Some("WARNING".to_string()),
            "LOG_FORMAT" => Some("JSON".to_string()),
            "OTEL_CAPTURE_HTTP_BODIES" => Some("1".to_string()),
            _ => None,
        })
        .unwrap();

        let config = TelemetryConfig::from(&settings);
        assert_eq!(config.level, "warn");
        assert!(config.json_output);
        assert!(config.capture_http_bodies);
    }

    #[test]
    fn deserializes_with_defaults() {
        let config: TelemetryConfig = serde_json::from_str(r#"{"json_output": true}"#).unwrap();
        assert_eq!(config.level, "info");
        assert!(config.json_output);
    }
}
