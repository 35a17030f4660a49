//! Agent runtime error types

use agentic_mcp_client::McpClientError;
use agentic_protocol::A2aError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("model error: {0}")]
    Model(String),

    #[error("tool error: {tool} - {message}")]
    Tool { tool: String, message: String },

    #[error("tool not found: {name}")]
    ToolNotFound { name: String },

    #[error("sub-agent not found: {name}")]
    SubAgentNotFound { name: String },

    #[error("MCP error: {0}")]
    Mcp(#[from] McpClientError),

    #[error(
        "Could not connect to MCP server '{name}' at {url}. Ensure the server is running and accessible."
    )]
    McpServerUnavailable {
        name: String,
        url: String,
        #[source]
        source: McpClientError,
    },

    #[error("Network communication error fetching agent card for '{name}' from {url} after {attempts} attempts: {message}")]
    AgentCardUnavailable {
        name: String,
        url: String,
        attempts: u32,
        message: String,
    },

    #[error("remote agent '{agent}' failed: {source}")]
    RemoteAgent {
        agent: String,
        #[source]
        source: A2aError,
    },

    #[error("HTTP error talking to '{agent}': {message}")]
    Http { agent: String, message: String },

    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("agent exceeded {0} steps without a final answer")]
    StepLimit(usize),
}

impl AgentError {
    /// Whether the failure happened while resolving the agent at startup.
    pub fn is_startup_failure(&self) -> bool {
        matches!(
            self,
            Self::McpServerUnavailable { .. } | Self::AgentCardUnavailable { .. }
        )
    }
}
