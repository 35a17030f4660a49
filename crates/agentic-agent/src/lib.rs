//! Agent runtime seam for agentic-layer.
//!
//! Agents answer messages within sessions; tools and sub-agents are attached
//! from configuration by [`AgentFactory`]. Inbound request headers travel to
//! MCP tools through reserved session state and a per-tool [`HeaderProvider`].

pub mod agent;
pub mod error;
pub mod factory;
pub mod propagation;
pub mod remote;
pub mod session;
pub mod testing;
pub mod tools;

pub use agent::{
    Agent, Content, InvocationContext, LlmAgent, Model, ModelRequest, ModelResponse,
    ToolDeclaration,
};
pub use error::AgentError;
pub use factory::AgentFactory;
pub use propagation::{headers_to_propagate, HeaderProvider, EXTERNAL_TOKEN_HEADER};
pub use remote::{fetch_agent_card, RemoteA2aAgent, DEFAULT_CARD_RETRIES};
pub use session::{
    Event, EventActions, InMemorySessionService, Session, EXTERNAL_TOKEN_SESSION_KEY,
    HTTP_HEADERS_SESSION_KEY,
};
pub use tools::{mcp_tools_instruction, AgentTool, McpRemoteTool, McpToolset, Tool, ToolContext};
