use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::A2aError;

pub const JSONRPC_VERSION: &str = "2.0";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    /// Absent for notifications.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    pub fn new<P: Serialize>(
        id: impl Into<Value>,
        method: impl Into<String>,
        params: &P,
    ) -> Result<Self, A2aError> {
        let params =
            serde_json::to_value(params).map_err(|e| A2aError::InvalidParams(e.to_string()))?;
        Ok(Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Some(id.into()),
            method: method.into(),
            params: Some(params),
        })
    }

    pub fn validate(&self) -> Result<(), A2aError> {
        if self.jsonrpc != JSONRPC_VERSION {
            return Err(A2aError::InvalidRequest(format!(
                "unsupported jsonrpc version '{}'",
                self.jsonrpc
            )));
        }
        match &self.id {
            None | Some(Value::String(_)) | Some(Value::Number(_)) | Some(Value::Null) => Ok(()),
            Some(other) => Err(A2aError::InvalidRequest(format!(
                "id must be a string or number, got {other}"
            ))),
        }
    }

    pub fn parse_params<T: DeserializeOwned>(&self) -> Result<T, A2aError> {
        let params = self
            .params
            .clone()
            .ok_or_else(|| A2aError::InvalidParams("missing params".to_string()))?;
        serde_json::from_value(params).map_err(|e| A2aError::InvalidParams(e.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: Value, error: &A2aError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(error.to_rpc_error()),
        }
    }

    pub fn into_result<T: DeserializeOwned>(self) -> Result<T, A2aError> {
        if let Some(error) = self.error {
            return Err(error.into());
        }
        let result = self
            .result
            .ok_or_else(|| A2aError::InvalidRequest("response has neither result nor error".into()))?;
        serde_json::from_value(result).map_err(|e| A2aError::Parse(e.to_string()))
    }
}
