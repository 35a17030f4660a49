use agentic_config::McpTool;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct McpServerConfig {
    pub name: String,
    pub url: Url,
    pub timeout: Duration,
}

impl McpServerConfig {
    pub fn new(name: impl Into<String>, url: Url, timeout: Duration) -> Self {
        Self {
            name: name.into(),
            url,
            timeout,
        }
    }
}

impl From<&McpTool> for McpServerConfig {
    fn from(tool: &McpTool) -> Self {
        Self::new(tool.name.clone(), tool.url.clone(), tool.timeout_duration())
    }
}

/// A tool advertised by an MCP server through `tools/list`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiscoveredTool {
    pub server_name: String,
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}
