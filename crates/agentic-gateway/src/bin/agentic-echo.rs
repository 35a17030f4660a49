//! Echo agent served over A2A, configured from the environment.

use std::sync::Arc;

use agentic_agent::{AgentError, LlmAgent, Model, ModelRequest, ModelResponse};
use agentic_config::Settings;
use agentic_gateway::{serve, to_a2a_from_settings};
use agentic_telemetry::TelemetryConfig;
use anyhow::Context;
use async_trait::async_trait;
use url::Url;

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8000;

/// Answers with the last user text.
struct EchoModel;

#[async_trait]
impl Model for EchoModel {
    fn name(&self) -> &str {
        "echo"
    }

    async fn generate(&self, request: &ModelRequest) -> Result<ModelResponse, AgentError> {
        let text = request.last_user_text().unwrap_or_default();
        Ok(ModelResponse::Text(text.to_string()))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::from_env().context("invalid agent configuration")?;
    let _telemetry = agentic_telemetry::init(&TelemetryConfig::from(&settings))?;

    let port = Url::parse(&settings.rpc_url)
        .ok()
        .and_then(|url| url.port_or_known_default())
        .unwrap_or(DEFAULT_PORT);

    let agent = LlmAgent::new("echo_agent", Arc::new(EchoModel))
        .with_description("Repeats what it is told")
        .with_instruction("Repeat the user's message.");
    let router = to_a2a_from_settings(agent, &settings).await?;

    serve(router, DEFAULT_HOST, port).await?;
    Ok(())
}
