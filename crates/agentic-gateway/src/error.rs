use agentic_agent::AgentError;
use agentic_config::ConfigError;
use agentic_telemetry::TelemetryError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Agent(#[from] AgentError),

    #[error(transparent)]
    Telemetry(#[from] TelemetryError),

    #[error("Gateway server error: {0}")]
    ServerError(String),
}
