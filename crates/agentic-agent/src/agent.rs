//! Agent seam and the instruction-driven agent that uses tools and sub-agents.

use std::sync::Arc;

use agentic_protocol::Message;
use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::AgentError;
use crate::session::{Event, InMemorySessionService, Session};
use crate::tools::{Tool, ToolContext};

const DEFAULT_MAX_STEPS: usize = 10;

/// Everything an agent needs for one turn.
pub struct InvocationContext {
    pub invocation_id: String,
    pub session: Session,
    pub session_service: InMemorySessionService,
}

impl InvocationContext {
    pub fn new(session: Session, session_service: InMemorySessionService) -> Self {
        Self {
            invocation_id: uuid::Uuid::new_v4().to_string(),
            session,
            session_service,
        }
    }

    /// A throwaway context with its own session, used when one agent calls
    /// another as a tool.
    pub async fn detached(app_name: &str) -> Self {
        let service = InMemorySessionService::new();
        let session = service.create_session(app_name, "agent_tool", None).await;
        Self::new(session, service)
    }

    pub async fn append_event(&mut self, event: Event) -> Result<(), AgentError> {
        self.session_service
            .append_event(&mut self.session, event)
            .await
    }
}

#[async_trait]
pub trait Agent: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// Answer `message` within the session carried by `ctx`.
    async fn run(
        &self,
        ctx: &mut InvocationContext,
        message: &Message,
    ) -> Result<Message, AgentError>;
}

/// Turn in the conversation sent to the model.
#[derive(Debug, Clone, PartialEq)]
pub enum Content {
    User(String),
    Model(String),
    ToolCall { name: String, args: Value },
    ToolResult { name: String, result: Value },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolDeclaration {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[derive(Debug, Clone)]
pub struct ModelRequest {
    pub instruction: String,
    pub contents: Vec<Content>,
    pub tools: Vec<ToolDeclaration>,
    /// `(name, description)` of agents the model may transfer to.
    pub sub_agents: Vec<(String, String)>,
    pub state: Map<String, Value>,
}

impl ModelRequest {
    pub fn last_user_text(&self) -> Option<&str> {
        self.contents.iter().rev().find_map(|content| match content {
            Content::User(text) => Some(text.as_str()),
            _ => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ModelResponse {
    Text(String),
    ToolCall { name: String, args: Value },
    Transfer { agent: String },
}

/// The reasoning loop's decision maker, usually an LLM client.
#[async_trait]
pub trait Model: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(&self, request: &ModelRequest) -> Result<ModelResponse, AgentError>;
}

/// Agent driven by a [`Model`], an instruction, tools, and sub-agents.
pub struct LlmAgent {
    name: String,
    description: String,
    instruction: String,
    model: Arc<dyn Model>,
    tools: Vec<Arc<dyn Tool>>,
    sub_agents: Vec<Arc<dyn Agent>>,
    max_steps: usize,
}

impl LlmAgent {
    pub fn new(name: impl Into<String>, model: Arc<dyn Model>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            instruction: String::new(),
            model,
            tools: Vec::new(),
            sub_agents: Vec::new(),
            max_steps: DEFAULT_MAX_STEPS,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.instruction = instruction.into();
        self
    }

    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn with_sub_agent(mut self, agent: Arc<dyn Agent>) -> Self {
        self.sub_agents.push(agent);
        self
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn instruction(&self) -> &str {
        &self.instruction
    }

    pub fn append_instruction(&mut self, section: &str) {
        self.instruction.push_str(section);
    }

    pub fn tools(&self) -> &[Arc<dyn Tool>] {
        &self.tools
    }

    pub fn sub_agents(&self) -> &[Arc<dyn Agent>] {
        &self.sub_agents
    }

    pub fn add_tools(&mut self, tools: impl IntoIterator<Item = Arc<dyn Tool>>) {
        self.tools.extend(tools);
    }

    pub fn add_sub_agents(&mut self, agents: impl IntoIterator<Item = Arc<dyn Agent>>) {
        self.sub_agents.extend(agents);
    }

    fn find_tool(&self, name: &str) -> Result<&Arc<dyn Tool>, AgentError> {
        self.tools
            .iter()
            .find(|tool| tool.name() == name)
            .ok_or_else(|| AgentError::ToolNotFound {
                name: name.to_string(),
            })
    }

    fn find_sub_agent(&self, name: &str) -> Result<&Arc<dyn Agent>, AgentError> {
        self.sub_agents
            .iter()
            .find(|agent| agent.name() == name)
            .ok_or_else(|| AgentError::SubAgentNotFound {
                name: name.to_string(),
            })
    }

    fn history(&self, session: &Session) -> Vec<Content> {
        session
            .events
            .iter()
            .filter_map(|event| {
                let text = event.text.clone()?;
                Some(if event.author == "user" {
                    Content::User(text)
                } else {
                    Content::Model(text)
                })
            })
            .collect()
    }

    fn request(&self, contents: Vec<Content>, session: &Session) -> ModelRequest {
        ModelRequest {
            instruction: self.instruction.clone(),
            contents,
            tools: self
                .tools
                .iter()
                .map(|tool| ToolDeclaration {
                    name: tool.name().to_string(),
                    description: tool.description().to_string(),
                    parameters: tool.parameters(),
                })
                .collect(),
            sub_agents: self
                .sub_agents
                .iter()
                .map(|agent| (agent.name().to_string(), agent.description().to_string()))
                .collect(),
            state: session.agent_state(),
        }
    }
}

#[async_trait]
impl Agent for LlmAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn run(
        &self,
        ctx: &mut InvocationContext,
        message: &Message,
    ) -> Result<Message, AgentError> {
        let mut contents = self.history(&ctx.session);
        let user_text = message.text();
        ctx.append_event(Event::new("user").with_text(user_text.clone()))
            .await?;
        contents.push(Content::User(user_text));

        for step in 0..self.max_steps {
            let request = self.request(contents.clone(), &ctx.session);
            let response = self.model.generate(&request).await?;
            tracing::debug!(agent = %self.name, step, model = self.model.name(), "model responded");

            match response {
                ModelResponse::Text(text) => {
                    ctx.append_event(Event::new(self.name.clone()).with_text(text.clone()))
                        .await?;
                    return Ok(Message::agent_text(text));
                }
                ModelResponse::ToolCall { name, args } => {
                    let tool = self.find_tool(&name)?;
                    let tool_ctx = ToolContext {
                        invocation_id: ctx.invocation_id.clone(),
                        session: Some(ctx.session.clone()),
                    };
                    tracing::info!(agent = %self.name, tool = %name, "calling tool");
                    let result = tool.call(args.clone(), &tool_ctx).await?;
                    contents.push(Content::ToolCall {
                        name: name.clone(),
                        args,
                    });
                    contents.push(Content::ToolResult { name, result });
                }
                ModelResponse::Transfer { agent } => {
                    let target = self.find_sub_agent(&agent)?;
                    tracing::info!(from = %self.name, to = %agent, "transferring to sub-agent");
                    return target.run(ctx, message).await;
                }
            }
        }

        Err(AgentError::StepLimit(self.max_steps))
    }
}
