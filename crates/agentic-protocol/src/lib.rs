//! A2A (agent-to-agent) protocol types.
//!
//! Only the JSON-RPC surface served by the gateway is modelled here:
//! `message/send`, `tasks/get` and `tasks/cancel`, plus the agent card.

pub mod error;
pub mod jsonrpc;
pub mod types;

pub use error::A2aError;
pub use jsonrpc::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, JSONRPC_VERSION};
pub use types::{
    AgentCapabilities, AgentCard, AgentSkill, Artifact, Message, MessageKind,
    MessageSendConfiguration, MessageSendParams, Part, Role, SendMessageResult, Task,
    TaskIdParams, TaskKind, TaskQueryParams, TaskState, TaskStatus, AGENT_CARD_WELL_KNOWN_PATH,
};

pub const METHOD_MESSAGE_SEND: &str = "message/send";
pub const METHOD_TASKS_GET: &str = "tasks/get";
pub const METHOD_TASKS_CANCEL: &str = "tasks/cancel";
