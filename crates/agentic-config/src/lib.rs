pub mod loader;
pub mod schema;

pub use loader::{parse_sub_agents, parse_tools, ConfigError, Settings};
pub use schema::{InteractionType, McpTool, SubAgent, DEFAULT_TOOL_TIMEOUT_SECS};
