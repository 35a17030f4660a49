use std::sync::Mutex;

use agentic_agent::{Agent, AgentError, InvocationContext, Session};
use agentic_protocol::Message;
use async_trait::async_trait;

/// Replies with the text it received.
pub struct EchoAgent {
    name: String,
}

impl EchoAgent {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

#[async_trait]
impl Agent for EchoAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Echoes the request"
    }

    async fn run(
        &self,
        _ctx: &mut InvocationContext,
        message: &Message,
    ) -> Result<Message, AgentError> {
        Ok(Message::agent_text(message.text()))
    }
}

pub struct FailingAgent {
    name: String,
    reason: String,
}

impl FailingAgent {
    pub fn new(name: &str, reason: &str) -> Self {
        Self {
            name: name.to_string(),
            reason: reason.to_string(),
        }
    }
}

#[async_trait]
impl Agent for FailingAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Always fails"
    }

    async fn run(
        &self,
        _ctx: &mut InvocationContext,
        _message: &Message,
    ) -> Result<Message, AgentError> {
        Err(AgentError::Model(self.reason.clone()))
    }
}

/// Records the session it was run in.
pub struct SessionRecordingAgent {
    name: String,
    sessions: Mutex<Vec<Session>>,
}

impl SessionRecordingAgent {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            sessions: Mutex::new(Vec::new()),
        }
    }

    pub fn last_session(&self) -> Option<Session> {
        self.sessions
            .lock()
            .ok()
            .and_then(|sessions| sessions.last().cloned())
    }
}

#[async_trait]
impl Agent for SessionRecordingAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Reports the visible session state"
    }

    async fn run(
        &self,
        ctx: &mut InvocationContext,
        _message: &Message,
    ) -> Result<Message, AgentError> {
        if let Ok(mut sessions) = self.sessions.lock() {
            sessions.push(ctx.session.clone());
        }
        let visible = serde_json::Value::Object(ctx.session.agent_state());
        Ok(Message::agent_text(visible.to_string()))
    }
}
