//! A2A web application for agentic-layer agents.
//!
//! [`to_a2a`] resolves an agent's configured sub-agents and MCP tools, then
//! serves it over A2A JSON-RPC with its agent card, a health endpoint and
//! HTTP tracing. Request headers are stored in session state so tools can
//! forward them.

pub mod error;
pub mod executor;
pub mod observability;
pub mod rpc;
pub mod server;
pub mod task_store;
pub mod testing;

pub use error::GatewayError;
pub use executor::{header_snapshot, A2aAgentExecutor};
pub use server::{serve, to_a2a, to_a2a_from_settings, A2aServer};
pub use task_store::InMemoryTaskStore;
