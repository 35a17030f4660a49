//! Runs the agent for A2A requests, capturing request headers into the session.

use std::sync::Arc;

use agentic_agent::{
    Agent, Event, InMemorySessionService, InvocationContext, Session, EXTERNAL_TOKEN_SESSION_KEY,
    HTTP_HEADERS_SESSION_KEY,
};
use agentic_protocol::{
    A2aError, Artifact, Message, MessageSendParams, Task, TaskKind, TaskState, TaskStatus,
};
use axum::http::HeaderMap;
use serde_json::{Map, Value};

use crate::task_store::InMemoryTaskStore;

const EXTERNAL_TOKEN_HEADER: &str = "x-external-token";

/// Inbound headers as a JSON object keyed by lower-cased name.
///
/// Values that are not valid UTF-8 are dropped.
pub fn header_snapshot(headers: &HeaderMap) -> Map<String, Value> {
    let mut snapshot = Map::new();
    for (name, value) in headers {
        if let Ok(value) = value.to_str() {
            snapshot.insert(name.as_str().to_ascii_lowercase(), Value::from(value));
        }
    }
    snapshot
}

#[derive(Clone)]
pub struct A2aAgentExecutor {
    agent: Arc<dyn Agent>,
    app_name: String,
    session_service: InMemorySessionService,
    task_store: InMemoryTaskStore,
}

impl A2aAgentExecutor {
    pub fn new(agent: Arc<dyn Agent>, task_store: InMemoryTaskStore) -> Self {
        let app_name = if agent.name().is_empty() {
            "agent".to_string()
        } else {
            agent.name().to_string()
        };
        Self {
            agent,
            app_name,
            session_service: InMemorySessionService::new(),
            task_store,
        }
    }

    pub fn agent(&self) -> &Arc<dyn Agent> {
        &self.agent
    }

    pub fn session_service(&self) -> &InMemorySessionService {
        &self.session_service
    }

    pub fn task_store(&self) -> &InMemoryTaskStore {
        &self.task_store
    }

    /// Handle `message/send`: run the agent and return the finished task.
    pub async fn execute(
        &self,
        params: MessageSendParams,
        headers: &HeaderMap,
    ) -> Result<Task, A2aError> {
        let message = params.message;
        let context_id = message
            .context_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let mut history = Vec::new();
        let task_id = match message.task_id.clone() {
            Some(task_id) => {
                let existing = self
                    .task_store
                    .get(&task_id)
                    .await
                    .ok_or_else(|| A2aError::TaskNotFound(task_id.clone()))?;
                if existing.status.state.is_terminal() {
                    return Err(A2aError::InvalidParams(format!(
                        "task {task_id} is already {:?}",
                        existing.status.state
                    )));
                }
                history = existing.history;
                task_id
            }
            None => uuid::Uuid::new_v4().to_string(),
        };

        let inbound = message.with_context(Some(context_id.clone()), Some(task_id.clone()));
        history.push(inbound.clone());

        let mut task = Task {
            id: task_id.clone(),
            context_id: context_id.clone(),
            status: TaskStatus::new(TaskState::Working, None),
            history,
            artifacts: Vec::new(),
            metadata: None,
            kind: TaskKind::Task,
        };
        self.task_store.save(task.clone()).await;

        let session = match self.prepare_session(&context_id, headers).await {
            Ok(session) => session,
            Err(error) => {
                tracing::error!(task_id = %task.id, error = %error, "session setup failed");
                self.fail_task(task, &error.to_string()).await;
                return Err(A2aError::Internal(error.to_string()));
            }
        };
        let mut ctx = InvocationContext::new(session, self.session_service.clone());

        tracing::info!(
            agent = self.agent.name(),
            task_id = %task_id,
            context_id = %context_id,
            "running agent"
        );

        match self.agent.run(&mut ctx, &inbound).await {
            Ok(reply) => {
                let reply = reply.with_context(Some(context_id), Some(task_id));
                task.artifacts.push(Artifact {
                    artifact_id: uuid::Uuid::new_v4().to_string(),
                    name: Some("response".to_string()),
                    parts: reply.parts.clone(),
                });
                task.history.push(reply.clone());
                task.status = TaskStatus::new(TaskState::Completed, Some(reply));
            }
            Err(error) => {
                tracing::error!(
                    agent = self.agent.name(),
                    task_id = %task.id,
                    error = %error,
                    "agent run failed"
                );
                task.status = failed_status(&task, &error.to_string());
            }
        }

        // A cancel that arrived while the agent ran wins.
        if let Some(current) = self.task_store.get(&task.id).await {
            if current.status.state == TaskState::Canceled {
                return Ok(current);
            }
        }

        self.task_store.save(task.clone()).await;
        Ok(task)
    }

    /// Store `task` as failed with `reason` as its status message, unless a
    /// cancel already finished it.
    async fn fail_task(&self, mut task: Task, reason: &str) -> Task {
        if let Some(current) = self.task_store.get(&task.id).await {
            if current.status.state == TaskState::Canceled {
                return current;
            }
        }
        task.status = failed_status(&task, reason);
        self.task_store.save(task.clone()).await;
        task
    }

    /// Get or create the session for `context_id` and replace its header
    /// snapshot with this request's headers through a state-delta event.
    async fn prepare_session(
        &self,
        context_id: &str,
        headers: &HeaderMap,
    ) -> Result<Session, agentic_agent::AgentError> {
        let user_id = format!("A2A_USER_{context_id}");
        let mut session = self
            .session_service
            .get_or_create_session(&self.app_name, &user_id, context_id)
            .await;

        // Both keys are rewritten on every request so nothing from an
        // earlier request on the same context is forwarded.
        let snapshot = header_snapshot(headers);
        let token = snapshot
            .get(EXTERNAL_TOKEN_HEADER)
            .cloned()
            .unwrap_or(Value::Null);
        let header_count = snapshot.len();

        let mut delta = Map::new();
        delta.insert(EXTERNAL_TOKEN_SESSION_KEY.to_string(), token);
        delta.insert(HTTP_HEADERS_SESSION_KEY.to_string(), Value::Object(snapshot));

        self.session_service
            .append_event(&mut session, Event::state_update(delta))
            .await?;
        tracing::debug!(
            session_id = %session.id,
            headers = header_count,
            "stored request headers in session via state_delta"
        );
        Ok(session)
    }
}

fn failed_status(task: &Task, reason: &str) -> TaskStatus {
    let reply = Message::agent_text(reason)
        .with_context(Some(task.context_id.clone()), Some(task.id.clone()));
    TaskStatus::new(TaskState::Failed, Some(reply))
}
