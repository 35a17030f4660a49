use thiserror::Error;

use crate::jsonrpc::JsonRpcError;

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const INTERNAL_ERROR: i64 = -32603;
pub const TASK_NOT_FOUND: i64 = -32001;
pub const TASK_NOT_CANCELABLE: i64 = -32002;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum A2aError {
    #[error("Invalid JSON payload: {0}")]
    Parse(String),

    #[error("Request payload validation error: {0}")]
    InvalidRequest(String),

    #[error("Method not found: {0}")]
    MethodNotFound(String),

    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Task cannot be canceled: {0}")]
    TaskNotCancelable(String),

    /// Error reported by a remote agent with a code outside the table above.
    #[error("Remote agent error ({code}): {message}")]
    Remote { code: i64, message: String },
}

impl A2aError {
    pub fn code(&self) -> i64 {
        match self {
            Self::Parse(_) => PARSE_ERROR,
            Self::InvalidRequest(_) => INVALID_REQUEST,
            Self::MethodNotFound(_) => METHOD_NOT_FOUND,
            Self::InvalidParams(_) => INVALID_PARAMS,
            Self::Internal(_) => INTERNAL_ERROR,
            Self::TaskNotFound(_) => TASK_NOT_FOUND,
            Self::TaskNotCancelable(_) => TASK_NOT_CANCELABLE,
            Self::Remote { code, .. } => *code,
        }
    }

    pub fn to_rpc_error(&self) -> JsonRpcError {
        JsonRpcError {
            code: self.code(),
            message: self.to_string(),
            data: None,
        }
    }
}

impl From<JsonRpcError> for A2aError {
    fn from(error: JsonRpcError) -> Self {
        let message = error.message;
        match error.code {
            PARSE_ERROR => Self::Parse(message),
            INVALID_REQUEST => Self::InvalidRequest(message),
            METHOD_NOT_FOUND => Self::MethodNotFound(message),
            INVALID_PARAMS => Self::InvalidParams(message),
            INTERNAL_ERROR => Self::Internal(message),
            TASK_NOT_FOUND => Self::TaskNotFound(message),
            TASK_NOT_CANCELABLE => Self::TaskNotCancelable(message),
            code => Self::Remote { code, message },
        }
    }
}
