//! Deterministic models and tools for tests.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use crate::agent::{Content, Model, ModelRequest, ModelResponse};
use crate::error::AgentError;
use crate::tools::{Tool, ToolContext};

#[derive(Debug, Clone)]
enum Reply {
    Message(String),
    ToolCall {
        tool: String,
        args: Value,
        final_message: String,
    },
    Transfer(String),
}

#[derive(Default)]
struct Script {
    rules: Vec<(String, Reply)>,
    requests: Vec<ModelRequest>,
}

/// Model answering by case-insensitive substring match on the last user
/// message. Clones share the script and the recorded requests.
#[derive(Clone, Default)]
pub struct ScriptedModel {
    script: Arc<Mutex<Script>>,
    fallback: Option<String>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fallback(mut self, text: impl Into<String>) -> Self {
        self.fallback = Some(text.into());
        self
    }

    pub fn respond_with_message(&self, pattern: &str, message: &str) {
        self.push(pattern, Reply::Message(message.to_string()));
    }

    /// Call `tool` first, then answer with `final_message` once its result is in.
    pub fn respond_with_tool_call(&self, pattern: &str, tool: &str, args: Value, final_message: &str) {
        self.push(
            pattern,
            Reply::ToolCall {
                tool: tool.to_string(),
                args,
                final_message: final_message.to_string(),
            },
        );
    }

    pub fn respond_with_transfer(&self, pattern: &str, agent: &str) {
        self.push(pattern, Reply::Transfer(agent.to_string()));
    }

    pub fn requests(&self) -> Vec<ModelRequest> {
        self.lock().requests.clone()
    }

    fn push(&self, pattern: &str, reply: Reply) {
        self.lock().rules.push((pattern.to_lowercase(), reply));
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl Model for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, request: &ModelRequest) -> Result<ModelResponse, AgentError> {
        let mut script = self.lock();
        script.requests.push(request.clone());

        let user_text = request.last_user_text().unwrap_or_default().to_lowercase();
        let reply = script
            .rules
            .iter()
            .find(|(pattern, _)| user_text.contains(pattern.as_str()))
            .map(|(_, reply)| reply.clone());

        let tool_done = matches!(request.contents.last(), Some(Content::ToolResult { .. }));
        match reply {
            Some(Reply::Message(text)) => Ok(ModelResponse::Text(text)),
            Some(Reply::ToolCall { final_message, .. }) if tool_done => {
                Ok(ModelResponse::Text(final_message))
            }
            Some(Reply::ToolCall { tool, args, .. }) => {
                Ok(ModelResponse::ToolCall { name: tool, args })
            }
            Some(Reply::Transfer(agent)) => Ok(ModelResponse::Transfer { agent }),
            None => self
                .fallback
                .clone()
                .map(ModelResponse::Text)
                .ok_or_else(|| AgentError::Model(format!("no scripted reply for '{user_text}'"))),
        }
    }
}

/// Tool returning a fixed value and recording what it was called with.
pub struct StaticTool {
    name: String,
    result: Value,
    calls: Mutex<Vec<(Value, ToolContext)>>,
}

impl StaticTool {
    pub fn new(name: impl Into<String>, result: Value) -> Self {
        Self {
            name: name.into(),
            result,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<(Value, ToolContext)> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Tool for StaticTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Returns a fixed value"
    }

    async fn call(&self, args: Value, ctx: &ToolContext) -> Result<Value, AgentError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((args, ctx.clone()));
        }
        Ok(self.result.clone())
    }
}
