//! Resolves configured sub-agents and tools onto an agent at startup.

use std::sync::Arc;
use std::time::Duration;

use agentic_config::{InteractionType, McpTool, SubAgent};
use futures::future::try_join_all;

use crate::agent::{Agent, LlmAgent};
use crate::error::AgentError;
use crate::remote::{fetch_agent_card, RemoteA2aAgent, DEFAULT_CARD_RETRIES};
use crate::tools::{mcp_tools_instruction, AgentTool, McpToolset, Tool};

const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(200);

#[derive(Clone)]
pub struct AgentFactory {
    http: reqwest::Client,
    card_retries: u32,
    retry_backoff: Duration,
    capture_bodies: bool,
}

impl Default for AgentFactory {
    fn default() -> Self {
        Self {
            http: reqwest::Client::new(),
            card_retries: DEFAULT_CARD_RETRIES,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
            capture_bodies: false,
        }
    }
}

impl AgentFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    /// Retries after the first failed agent card fetch.
    pub fn with_card_retries(mut self, retries: u32) -> Self {
        self.card_retries = retries;
        self
    }

    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    pub fn with_body_capture(mut self, enabled: bool) -> Self {
        self.capture_bodies = enabled;
        self
    }

    pub fn captures_bodies(&self) -> bool {
        self.capture_bodies
    }

    /// Attach remote sub-agents and MCP tools to `agent`.
    ///
    /// Fails when any agent card or MCP server cannot be reached, so that a
    /// misconfigured agent never starts serving.
    pub async fn load_agent(
        &self,
        mut agent: LlmAgent,
        sub_agents: &[SubAgent],
        tools: &[McpTool],
    ) -> Result<LlmAgent, AgentError> {
        let (transfer_agents, agent_tools) = self.load_sub_agents(sub_agents).await?;
        let toolsets = self.load_tools(tools).await?;

        let discovered = toolsets
            .iter()
            .flat_map(|toolset| toolset.discovered().iter().cloned())
            .collect::<Vec<_>>();
        agent.append_instruction(&mcp_tools_instruction(&discovered));

        agent.add_sub_agents(transfer_agents);
        agent.add_tools(agent_tools);
        agent.add_tools(toolsets.into_iter().flat_map(McpToolset::into_tools));

        tracing::info!(
            agent = agent.name(),
            sub_agents = agent.sub_agents().len(),
            tools = agent.tools().len(),
            "agent configured"
        );
        Ok(agent)
    }

    /// Remote agents split by interaction type: transfer targets and tools.
    pub async fn load_sub_agents(
        &self,
        sub_agents: &[SubAgent],
    ) -> Result<(Vec<Arc<dyn Agent>>, Vec<Arc<dyn Tool>>), AgentError> {
        let resolved = try_join_all(sub_agents.iter().map(|sub_agent| async move {
            let card = fetch_agent_card(
                &self.http,
                &sub_agent.name,
                &sub_agent.url,
                self.card_retries,
                self.retry_backoff,
            )
            .await?;
            let remote = RemoteA2aAgent::new(sub_agent.name.clone(), card, self.http.clone())
                .with_body_capture(self.capture_bodies);
            Ok::<_, AgentError>((sub_agent.interaction_type, Arc::new(remote) as Arc<dyn Agent>))
        }))
        .await?;

        let mut agents = Vec::new();
        let mut tools: Vec<Arc<dyn Tool>> = Vec::new();
        for (interaction_type, remote) in resolved {
            match interaction_type {
                InteractionType::ToolCall => tools.push(Arc::new(AgentTool::new(remote))),
                InteractionType::Transfer => agents.push(remote),
            }
        }
        Ok((agents, tools))
    }

    pub async fn load_tools(&self, tools: &[McpTool]) -> Result<Vec<McpToolset>, AgentError> {
        try_join_all(
            tools
                .iter()
                .map(|tool| McpToolset::connect(tool, self.capture_bodies)),
        )
        .await
    }
}
