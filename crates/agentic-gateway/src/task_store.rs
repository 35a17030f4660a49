use std::collections::HashMap;
use std::sync::Arc;

use agentic_protocol::{A2aError, Task, TaskState, TaskStatus};
use tokio::sync::RwLock;

/// Tasks of this process, kept until shutdown.
#[derive(Clone, Default)]
pub struct InMemoryTaskStore {
    tasks: Arc<RwLock<HashMap<String, Task>>>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn save(&self, task: Task) {
        self.tasks.write().await.insert(task.id.clone(), task);
    }

    pub async fn get(&self, task_id: &str) -> Option<Task> {
        self.tasks.read().await.get(task_id).cloned()
    }

    /// Mark a task canceled. Tasks in a terminal state cannot be canceled.
    pub async fn cancel(&self, task_id: &str) -> Result<Task, A2aError> {
        let mut tasks = self.tasks.write().await;
        let task = tasks
            .get_mut(task_id)
            .ok_or_else(|| A2aError::TaskNotFound(task_id.to_string()))?;

        if task.status.state.is_terminal() {
            return Err(A2aError::TaskNotCancelable(format!(
                "task {task_id} is {:?}",
                task.status.state
            )));
        }

        task.status = TaskStatus::new(TaskState::Canceled, None);
        Ok(task.clone())
    }

    pub async fn task_count(&self) -> usize {
        self.tasks.read().await.len()
    }
}
