//! Tool trait and the tools built from configuration.

use std::sync::Arc;

use agentic_config::McpTool;
use agentic_mcp_client::{DiscoveredTool, McpHttpClient, McpServerConfig};
use agentic_protocol::Message;
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::agent::{Agent, InvocationContext};
use crate::error::AgentError;
use crate::propagation::HeaderProvider;
use crate::session::Session;

/// Context passed to tool execution
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    pub invocation_id: String,
    /// Snapshot of the calling session, absent outside a request.
    pub session: Option<Session>,
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON schema of the arguments.
    fn parameters(&self) -> Value {
        json!({"type": "object"})
    }

    async fn call(&self, args: Value, ctx: &ToolContext) -> Result<Value, AgentError>;
}

/// All tools exposed by one MCP server.
pub struct McpToolset {
    name: String,
    client: Arc<McpHttpClient>,
    header_provider: HeaderProvider,
    tools: Vec<DiscoveredTool>,
}

impl McpToolset {
    /// Connect to the server described by `descriptor` and list its tools.
    pub async fn connect(descriptor: &McpTool, capture_bodies: bool) -> Result<Self, AgentError> {
        let client = McpHttpClient::new(McpServerConfig::from(descriptor))
            .with_body_capture(capture_bodies);

        let tools = client.list_tools(&[]).await.map_err(|source| {
            tracing::error!(
                server = %descriptor.name,
                url = %descriptor.url,
                error = %source,
                "failed to list MCP tools"
            );
            AgentError::McpServerUnavailable {
                name: descriptor.name.clone(),
                url: descriptor.url.to_string(),
                source,
            }
        })?;

        tracing::info!(
            server = %descriptor.name,
            tools = tools.len(),
            "loaded MCP toolset"
        );

        Ok(Self {
            name: descriptor.name.clone(),
            client: Arc::new(client),
            header_provider: HeaderProvider::new(descriptor.propagate_headers.clone()),
            tools,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn discovered(&self) -> &[DiscoveredTool] {
        &self.tools
    }

    pub fn into_tools(self) -> Vec<Arc<dyn Tool>> {
        let client = self.client;
        let header_provider = self.header_provider;
        self.tools
            .into_iter()
            .map(|definition| {
                Arc::new(McpRemoteTool {
                    client: Arc::clone(&client),
                    header_provider: header_provider.clone(),
                    definition,
                }) as Arc<dyn Tool>
            })
            .collect()
    }
}

/// One tool of an MCP server.
pub struct McpRemoteTool {
    client: Arc<McpHttpClient>,
    header_provider: HeaderProvider,
    definition: DiscoveredTool,
}

#[async_trait]
impl Tool for McpRemoteTool {
    fn name(&self) -> &str {
        &self.definition.name
    }

    fn description(&self) -> &str {
        &self.definition.description
    }

    fn parameters(&self) -> Value {
        self.definition.input_schema.clone()
    }

    async fn call(&self, args: Value, ctx: &ToolContext) -> Result<Value, AgentError> {
        let headers = self.header_provider.headers(ctx.session.as_ref());
        tracing::debug!(
            tool = %self.definition.name,
            server = %self.definition.server_name,
            forwarded = ?headers.iter().map(|(name, _)| name.as_str()).collect::<Vec<_>>(),
            "calling MCP tool"
        );

        let result = self
            .client
            .call_tool(&self.definition.name, args, &headers)
            .await?;

        if result.get("isError").and_then(Value::as_bool).unwrap_or(false) {
            return Err(AgentError::Tool {
                tool: self.definition.name.clone(),
                message: content_text(&result),
            });
        }
        Ok(result)
    }
}

fn content_text(result: &Value) -> String {
    result
        .get("content")
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter(|entry| entry.get("type").and_then(Value::as_str) == Some("text"))
                .filter_map(|entry| entry.get("text").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join("\n")
        })
        .unwrap_or_default()
}

/// Instruction section listing MCP tools, empty when there are none.
pub fn mcp_tools_instruction(tools: &[DiscoveredTool]) -> String {
    if tools.is_empty() {
        return String::new();
    }
    let mut section = String::from("\n\nFollowing MCP tools are available:\n");
    let lines = tools
        .iter()
        .map(|tool| format!("- '{}': {}", tool.name, tool.description))
        .collect::<Vec<_>>();
    section.push_str(&lines.join("\n"));
    section
}

/// Exposes an agent as a tool; the agent answers in a session of its own.
pub struct AgentTool {
    agent: Arc<dyn Agent>,
}

impl AgentTool {
    pub fn new(agent: Arc<dyn Agent>) -> Self {
        Self { agent }
    }
}

#[async_trait]
impl Tool for AgentTool {
    fn name(&self) -> &str {
        self.agent.name()
    }

    fn description(&self) -> &str {
        self.agent.description()
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {"request": {"type": "string"}},
            "required": ["request"]
        })
    }

    async fn call(&self, args: Value, _ctx: &ToolContext) -> Result<Value, AgentError> {
        let request = match args.get("request").and_then(Value::as_str) {
            Some(text) => text.to_string(),
            None => args.to_string(),
        };

        let mut ctx = InvocationContext::detached(self.agent.name()).await;
        let reply = self
            .agent
            .run(&mut ctx, &Message::user_text(request))
            .await?;
        Ok(json!({"result": reply.text()}))
    }
}
