mod client;
mod types;

pub use client::{McpClientError, McpHttpClient};
pub use types::{DiscoveredTool, McpServerConfig};
