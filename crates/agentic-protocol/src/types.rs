use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Path under which every A2A agent publishes its card.
pub const AGENT_CARD_WELL_KNOWN_PATH: &str = "/.well-known/agent-card.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Agent,
}

/// A message part, tagged by `kind`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Part {
    Text {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        metadata: Option<Value>,
    },
    Data {
        data: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        metadata: Option<Value>,
    },
    File {
        file: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        metadata: Option<Value>,
    },
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text {
            text: text.into(),
            metadata: None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text, .. } => Some(text),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    #[default]
    Message,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub role: Role,
    pub parts: Vec<Part>,
    pub message_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    #[serde(default)]
    pub kind: MessageKind,
}

impl Message {
    pub fn new(role: Role, parts: Vec<Part>) -> Self {
        Self {
            role,
            parts,
            message_id: uuid::Uuid::new_v4().to_string(),
            context_id: None,
            task_id: None,
            metadata: None,
            kind: MessageKind::Message,
        }
    }

    pub fn user_text(text: impl Into<String>) -> Self {
        Self::new(Role::User, vec![Part::text(text)])
    }

    pub fn agent_text(text: impl Into<String>) -> Self {
        Self::new(Role::Agent, vec![Part::text(text)])
    }

    pub fn with_context(mut self, context_id: Option<String>, task_id: Option<String>) -> Self {
        self.context_id = context_id;
        self.task_id = task_id;
        self
    }

    /// All text parts joined by newlines.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(Part::as_text)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskState {
    Submitted,
    Working,
    InputRequired,
    Completed,
    Canceled,
    Failed,
    Rejected,
    AuthRequired,
    Unknown,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Canceled | Self::Failed | Self::Rejected
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStatus {
    pub state: TaskState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl TaskStatus {
    pub fn new(state: TaskState, message: Option<Message>) -> Self {
        Self {
            state,
            message,
            timestamp: Some(Utc::now().to_rfc3339()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    pub artifact_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    #[default]
    Task,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub context_id: String,
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<Message>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<Artifact>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    #[serde(default)]
    pub kind: TaskKind,
}

/// Result of `message/send`: either a task or a direct reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SendMessageResult {
    Task(Task),
    Message(Message),
}

impl SendMessageResult {
    /// Text of the agent's answer, wherever it is carried.
    pub fn reply_text(&self) -> String {
        match self {
            Self::Message(message) => message.text(),
            Self::Task(task) => {
                let from_artifacts = task
                    .artifacts
                    .iter()
                    .flat_map(|a| a.parts.iter())
                    .filter_map(Part::as_text)
                    .collect::<Vec<_>>()
                    .join("\n");
                if !from_artifacts.is_empty() {
                    return from_artifacts;
                }
                task.status
                    .message
                    .as_ref()
                    .map(Message::text)
                    .unwrap_or_default()
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageSendConfiguration {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accepted_output_modes: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocking: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageSendParams {
    pub message: Message,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub configuration: Option<MessageSendConfiguration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskQueryParams {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history_length: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskIdParams {
    pub id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentCapabilities {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub streaming: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub push_notifications: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_transition_history: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSkill {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// A2A agent card, the discovery document of an agent.
///
/// Deserialization also accepts snake_case field names, which some agents
/// publish.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentCard {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub url: String,
    #[serde(default = "default_card_version")]
    pub version: String,
    #[serde(default)]
    pub capabilities: AgentCapabilities,
    #[serde(default)]
    pub skills: Vec<AgentSkill>,
    #[serde(default, alias = "default_input_modes")]
    pub default_input_modes: Vec<String>,
    #[serde(default, alias = "default_output_modes")]
    pub default_output_modes: Vec<String>,
    #[serde(default, alias = "supports_authenticated_extended_card")]
    pub supports_authenticated_extended_card: bool,
}

fn default_card_version() -> String {
    "0.1.0".to_string()
}

impl AgentCard {
    /// Card for a plain-text agent served at `url`.
    pub fn text_agent(
        name: impl Into<String>,
        description: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            url: url.into(),
            version: default_card_version(),
            capabilities: AgentCapabilities::default(),
            skills: Vec::new(),
            default_input_modes: vec!["text/plain".to_string()],
            default_output_modes: vec!["text/plain".to_string()],
            supports_authenticated_extended_card: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deserializes_send_params() {
        let raw = json!({
            "message": {
                "role": "user",
                "parts": [{"kind": "text", "text": "Hello, agent!"}],
                "messageId": "m-1",
                "contextId": "c-1"
            },
            "metadata": {}
        });

        let params: MessageSendParams = serde_json::from_value(raw).unwrap();
        assert_eq!(params.message.role, Role::User);
        assert_eq!(params.message.message_id, "m-1");
        assert_eq!(params.message.context_id.as_deref(), Some("c-1"));
        assert_eq!(params.message.text(), "Hello, agent!");
    }

    #[test]
    fn serializes_task_with_kind_and_kebab_state() {
        let task = Task {
            id: "t-1".to_string(),
            context_id: "c-1".to_string(),
            status: TaskStatus {
                state: TaskState::InputRequired,
                message: None,
                timestamp: None,
            },
            history: Vec::new(),
            artifacts: Vec::new(),
            metadata: None,
            kind: TaskKind::Task,
        };

        let value = serde_json::to_value(&task).unwrap();
        assert_eq!(value["kind"], "task");
        assert_eq!(value["contextId"], "c-1");
        assert_eq!(value["status"]["state"], "input-required");
        assert!(value.get("history").is_none());
    }

    #[test]
    fn message_serializes_kind() {
        let value = serde_json::to_value(Message::agent_text("hi")).unwrap();
        assert_eq!(value["kind"], "message");
        assert_eq!(value["role"], "agent");
        assert_eq!(value["parts"][0]["kind"], "text");
    }

    #[test]
    fn send_result_distinguishes_task_and_message() {
        let message: SendMessageResult =
            serde_json::from_value(serde_json::to_value(Message::agent_text("pong")).unwrap())
                .unwrap();
        assert!(matches!(message, SendMessageResult::Message(_)));
        assert_eq!(message.reply_text(), "pong");

        let task: SendMessageResult = serde_json::from_value(json!({
            "id": "t-1",
            "contextId": "c-1",
            "status": {"state": "completed"},
            "artifacts": [{"artifactId": "a-1", "parts": [{"kind": "text", "text": "done"}]}],
            "kind": "task"
        }))
        .unwrap();
        assert!(matches!(task, SendMessageResult::Task(_)));
        assert_eq!(task.reply_text(), "done");
    }

    #[test]
    fn agent_card_accepts_snake_case_fields() {
        let card: AgentCard = serde_json::from_value(json!({
            "name": "remote",
            "description": "Mock agent remote",
            "url": "http://remote.local/",
            "version": "1.0.0",
            "capabilities": {},
            "skills": [],
            "default_input_modes": ["text/plain"],
            "default_output_modes": ["text/plain"],
            "supports_authenticated_extended_card": false
        }))
        .unwrap();
        assert_eq!(card.default_input_modes, vec!["text/plain"]);

        let value = serde_json::to_value(&card).unwrap();
        assert!(value.get("defaultInputModes").is_some());
    }

    #[test]
    fn terminal_states() {
        assert!(TaskState::Completed.is_terminal());
        assert!(TaskState::Canceled.is_terminal());
        assert!(!TaskState::Working.is_terminal());
        assert!(!TaskState::Submitted.is_terminal());
    }
}
