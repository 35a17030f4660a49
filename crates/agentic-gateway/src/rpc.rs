//! A2A JSON-RPC dispatch.

use agentic_protocol::{
    A2aError, JsonRpcRequest, JsonRpcResponse, MessageSendParams, Task, TaskIdParams,
    TaskQueryParams, METHOD_MESSAGE_SEND, METHOD_TASKS_CANCEL, METHOD_TASKS_GET,
};
use axum::http::HeaderMap;
use serde_json::Value;

use crate::executor::A2aAgentExecutor;

/// Decode one JSON-RPC request body and answer it.
///
/// Never fails: every problem is reported as a JSON-RPC error object.
/// Well-formed notifications (no `id` member) are handled but get no
/// response, so `None` is returned for them.
pub async fn dispatch(
    executor: &A2aAgentExecutor,
    body: &[u8],
    headers: &HeaderMap,
) -> Option<JsonRpcResponse> {
    let raw: Value = match serde_json::from_slice(body) {
        Ok(raw) => raw,
        Err(e) => {
            return Some(JsonRpcResponse::failure(Value::Null, &A2aError::Parse(e.to_string())));
        }
    };
    let notification = raw.is_object() && raw.get("id").is_none();
    let id = raw.get("id").cloned().unwrap_or(Value::Null);

    let request: JsonRpcRequest = match serde_json::from_value(raw) {
        Ok(request) => request,
        Err(e) => {
            return Some(JsonRpcResponse::failure(id, &A2aError::InvalidRequest(e.to_string())));
        }
    };
    if let Err(error) = request.validate() {
        return Some(JsonRpcResponse::failure(id, &error));
    }

    tracing::debug!(method = %request.method, notification, "A2A request");
    let response = match handle(executor, &request, headers).await {
        Ok(result) => JsonRpcResponse::success(id, result),
        Err(error) => {
            tracing::warn!(method = %request.method, code = error.code(), error = %error, "A2A request failed");
            JsonRpcResponse::failure(id, &error)
        }
    };
    (!notification).then_some(response)
}

async fn handle(
    executor: &A2aAgentExecutor,
    request: &JsonRpcRequest,
    headers: &HeaderMap,
) -> Result<Value, A2aError> {
    let task = match request.method.as_str() {
        METHOD_MESSAGE_SEND => {
            let params: MessageSendParams = request.parse_params()?;
            let history_length = params
                .configuration
                .as_ref()
                .and_then(|c| c.history_length);
            let task = executor.execute(params, headers).await?;
            trim_history(task, history_length)
        }
        METHOD_TASKS_GET => {
            let params: TaskQueryParams = request.parse_params()?;
            let task = executor
                .task_store()
                .get(&params.id)
                .await
                .ok_or_else(|| A2aError::TaskNotFound(params.id.clone()))?;
            trim_history(task, params.history_length)
        }
        METHOD_TASKS_CANCEL => {
            let params: TaskIdParams = request.parse_params()?;
            executor.task_store().cancel(&params.id).await?
        }
        other => return Err(A2aError::MethodNotFound(other.to_string())),
    };

    serde_json::to_value(task).map_err(|e| A2aError::Internal(e.to_string()))
}

fn trim_history(mut task: Task, history_length: Option<usize>) -> Task {
    if let Some(keep) = history_length {
        let excess = task.history.len().saturating_sub(keep);
        task.history.drain(..excess);
    }
    task
}
