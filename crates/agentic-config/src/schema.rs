use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// Timeout applied to MCP tool calls when the descriptor omits one.
pub const DEFAULT_TOOL_TIMEOUT_SECS: u64 = 30;

// ============================================================================
// Sub-agents
// ============================================================================

/// How the root agent talks to a remote sub-agent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionType {
    /// The sub-agent is exposed to the root agent as a callable tool.
    #[default]
    ToolCall,
    /// Control of the conversation is handed over to the sub-agent.
    Transfer,
}

/// A remote A2A agent the root agent may delegate to.
///
/// # Example
///
/// ```json
/// {
///   "billing": {
///     "url": "http://billing.local/.well-known/agent-card.json",
///     "interaction_type": "transfer"
///   }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubAgent {
    pub name: String,

    /// Location of the remote agent card.
    pub url: Url,

    #[serde(default)]
    pub interaction_type: InteractionType,
}

// ============================================================================
// MCP tools
// ============================================================================

/// An MCP server reachable over streamable HTTP.
///
/// # Example
///
/// ```json
/// {
///   "crm": {
///     "url": "http://crm.local/mcp",
///     "timeout": 60,
///     "propagate_headers": ["Authorization", "X-Tenant"]
///   }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct McpTool {
    pub name: String,

    pub url: Url,

    /// Request timeout in seconds (default: 30)
    #[serde(default = "default_tool_timeout")]
    pub timeout: u64,

    /// Inbound headers forwarded to this tool. `None` keeps the legacy
    /// behaviour of forwarding only `X-External-Token`.
    #[serde(default)]
    pub propagate_headers: Option<Vec<String>>,
}

impl McpTool {
    pub fn new(name: impl Into<String>, url: Url) -> Self {
        Self {
            name: name.into(),
            url,
            timeout: DEFAULT_TOOL_TIMEOUT_SECS,
            propagate_headers: None,
        }
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout = timeout_secs;
        self
    }

    pub fn with_propagate_headers<I, S>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.propagate_headers = Some(headers.into_iter().map(Into::into).collect());
        self
    }

    pub fn timeout_duration(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}

fn default_tool_timeout() -> u64 {
    DEFAULT_TOOL_TIMEOUT_SECS
}
