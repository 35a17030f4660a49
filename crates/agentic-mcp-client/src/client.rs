use crate::types::{DiscoveredTool, McpServerConfig};
use agentic_telemetry::{capture_body, BodySnapshot};
use eventsource_stream::{EventStreamError, Eventsource};
use futures::StreamExt;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tokio::sync::Mutex;

const PROTOCOL_VERSION: &str = "2025-03-26";
const SESSION_HEADER: &str = "mcp-session-id";
const PROTOCOL_VERSION_HEADER: &str = "mcp-protocol-version";
const EVENT_STREAM: &str = "text/event-stream";

#[derive(Debug, Error)]
pub enum McpClientError {
    #[error("HTTP transport error for MCP server '{server}': {message}")]
    Transport { server: String, message: String },

    #[error("MCP server '{server}' answered with HTTP {status}")]
    HttpStatus { server: String, status: u16 },

    #[error("MCP session for '{server}' is no longer known to the server")]
    SessionExpired { server: String },

    #[error("failed to serialize JSON-RPC message: {0}")]
    Serialization(String),

    #[error("failed to parse JSON-RPC message: {0}")]
    Parse(String),

    #[error("JSON-RPC timeout calling '{method}' on '{server}'")]
    Timeout { server: String, method: String },

    #[error("MCP protocol error ({code}): {message}")]
    ProtocolError { code: i64, message: String },

    #[error("invalid MCP response: {0}")]
    InvalidResponse(String),
}

impl McpClientError {
    /// Errors after which the cached session must not be reused.
    ///
    /// A restarted server forgets its sessions but the client still holds the
    /// old id; every failure except a well-formed JSON-RPC error drops it.
    pub fn invalidates_session(&self) -> bool {
        !matches!(self, Self::ProtocolError { .. } | Self::Serialization(_))
    }
}

#[derive(Debug, Clone)]
struct McpSession {
    id: Option<String>,
    protocol_version: String,
}

/// Client for one MCP server speaking the streamable HTTP transport.
///
/// The session is negotiated lazily on first use and re-negotiated once
/// when an operation fails on a cached session.
pub struct McpHttpClient {
    config: McpServerConfig,
    http: reqwest::Client,
    session: Mutex<Option<McpSession>>,
    next_id: AtomicU64,
    capture_bodies: bool,
}

impl McpHttpClient {
    pub fn new(config: McpServerConfig) -> Self {
        Self::with_http_client(config, reqwest::Client::new())
    }

    pub fn with_http_client(config: McpServerConfig, http: reqwest::Client) -> Self {
        Self {
            config,
            http,
            session: Mutex::new(None),
            next_id: AtomicU64::new(1),
            capture_bodies: false,
        }
    }

    /// Log buffered request and response bodies at debug level.
    pub fn with_body_capture(mut self, enabled: bool) -> Self {
        self.capture_bodies = enabled;
        self
    }

    pub fn config(&self) -> &McpServerConfig {
        &self.config
    }

    pub async fn list_tools(
        &self,
        headers: &[(String, String)],
    ) -> Result<Vec<DiscoveredTool>, McpClientError> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let params = cursor
                .as_ref()
                .map(|c| json!({"cursor": c}))
                .unwrap_or_else(|| json!({}));

            let result = self.request_with_retry("tools/list", params, headers).await?;
            let page_tools = result
                .get("tools")
                .and_then(Value::as_array)
                .ok_or_else(|| {
                    McpClientError::InvalidResponse("tools/list response missing tools".to_string())
                })?;

            for tool in page_tools {
                tools.push(self.discovered_tool(tool)?);
            }

            cursor = result
                .get("nextCursor")
                .and_then(Value::as_str)
                .map(|s| s.to_string());

            if cursor.is_none() {
                break;
            }
        }

        Ok(tools)
    }

    pub async fn call_tool(
        &self,
        tool_name: &str,
        arguments: Value,
        headers: &[(String, String)],
    ) -> Result<Value, McpClientError> {
        let params = json!({"name": tool_name, "arguments": arguments});
        let result = self.request_with_retry("tools/call", params, headers).await?;
        Ok(parse_tools_call_result(result))
    }

    /// Forget the negotiated session; the next operation starts a new one.
    pub async fn invalidate_session(&self) {
        if let Some(session) = self.session.lock().await.take() {
            tracing::debug!(
                server = %self.config.name,
                session_id = ?session.id,
                "invalidated MCP session"
            );
        }
    }

    fn discovered_tool(&self, tool: &Value) -> Result<DiscoveredTool, McpClientError> {
        let name = tool
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| McpClientError::InvalidResponse("tool missing name".to_string()))?
            .to_string();

        Ok(DiscoveredTool {
            server_name: self.config.name.clone(),
            name,
            description: tool
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string(),
            input_schema: tool
                .get("inputSchema")
                .cloned()
                .unwrap_or_else(|| json!({})),
        })
    }

    async fn request_with_retry(
        &self,
        method: &str,
        params: Value,
        headers: &[(String, String)],
    ) -> Result<Value, McpClientError> {
        match self.request_in_session(method, params.clone(), headers).await {
            Ok(result) => Ok(result),
            Err(err) if err.invalidates_session() => {
                tracing::info!(
                    server = %self.config.name,
                    method,
                    error = %err,
                    "MCP operation failed, retrying on a fresh session"
                );
                self.invalidate_session().await;
                self.request_in_session(method, params, headers).await
            }
            Err(err) => Err(err),
        }
    }

    async fn request_in_session(
        &self,
        method: &str,
        params: Value,
        headers: &[(String, String)],
    ) -> Result<Value, McpClientError> {
        let session = self.ensure_session(headers).await?;
        let (result, _) = self
            .request(method, params, Some(&session), headers)
            .await?;
        Ok(result)
    }

    async fn ensure_session(
        &self,
        headers: &[(String, String)],
    ) -> Result<McpSession, McpClientError> {
        let mut guard = self.session.lock().await;
        if let Some(session) = guard.as_ref() {
            return Ok(session.clone());
        }

        let session = self.initialize(headers).await?;
        *guard = Some(session.clone());
        Ok(session)
    }

    async fn initialize(&self, headers: &[(String, String)]) -> Result<McpSession, McpClientError> {
        let params = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {"name": "agentic-layer", "version": env!("CARGO_PKG_VERSION")}
        });
        let (result, session_id) = self.request("initialize", params, None, headers).await?;

        let protocol_version = result
            .get("protocolVersion")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                McpClientError::InvalidResponse(
                    "initialize response missing protocolVersion".to_string(),
                )
            })?
            .to_string();

        let session = McpSession {
            id: session_id,
            protocol_version,
        };
        self.notify("notifications/initialized", &session, headers)
            .await?;

        tracing::debug!(
            server = %self.config.name,
            session_id = ?session.id,
            protocol_version = %session.protocol_version,
            "MCP session initialized"
        );
        Ok(session)
    }

    async fn request(
        &self,
        method: &str,
        params: Value,
        session: Option<&McpSession>,
        headers: &[(String, String)],
    ) -> Result<(Value, Option<String>), McpClientError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let payload = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params
        });

        let response = self.post(method, &payload, session, headers).await?;
        let session_id = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let message = self.read_response(method, id, response).await?;

        if let Some(error) = message.get("error") {
            let code = error.get("code").and_then(Value::as_i64).unwrap_or(-32000);
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string();
            return Err(McpClientError::ProtocolError { code, message });
        }

        let result = message.get("result").cloned().ok_or_else(|| {
            McpClientError::InvalidResponse(format!("response to '{method}' missing result"))
        })?;
        Ok((result, session_id))
    }

    async fn notify(
        &self,
        method: &str,
        session: &McpSession,
        headers: &[(String, String)],
    ) -> Result<(), McpClientError> {
        let payload = json!({"jsonrpc": "2.0", "method": method, "params": {}});
        self.post(method, &payload, Some(session), headers).await?;
        Ok(())
    }

    async fn post(
        &self,
        method: &str,
        payload: &Value,
        session: Option<&McpSession>,
        headers: &[(String, String)],
    ) -> Result<reqwest::Response, McpClientError> {
        let body =
            serde_json::to_vec(payload).map_err(|e| McpClientError::Serialization(e.to_string()))?;

        if self.capture_bodies {
            if let Some(text) = capture_body(Some("application/json"), BodySnapshot::Buffered(&body))
            {
                tracing::debug!(server = %self.config.name, "HTTP request body: {}", text);
            }
        }

        let mut request = self
            .http
            .post(self.config.url.clone())
            .timeout(self.config.timeout)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, format!("application/json, {EVENT_STREAM}"));

        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if let Some(session) = session {
            if let Some(id) = &session.id {
                request = request.header(SESSION_HEADER, id.as_str());
            }
            request = request.header(PROTOCOL_VERSION_HEADER, session.protocol_version.as_str());
        }

        let response = request
            .body(body)
            .send()
            .await
            .map_err(|e| self.transport_error(method, e))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND && session.and_then(|s| s.id.as_ref()).is_some() {
            return Err(McpClientError::SessionExpired {
                server: self.config.name.clone(),
            });
        }
        if !status.is_success() {
            return Err(McpClientError::HttpStatus {
                server: self.config.name.clone(),
                status: status.as_u16(),
            });
        }

        Ok(response)
    }

    async fn read_response(
        &self,
        method: &str,
        id: u64,
        response: reqwest::Response,
    ) -> Result<Value, McpClientError> {
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();
        if content_type.starts_with(EVENT_STREAM) {
            return self.read_event_stream(method, id, response).await;
        }

        let text = response
            .text()
            .await
            .map_err(|e| self.transport_error(method, e))?;

        if self.capture_bodies {
            if let Some(body) = capture_body(Some(&content_type), BodySnapshot::Buffered(text.as_bytes())) {
                tracing::debug!(server = %self.config.name, "HTTP response body: {}", body);
            }
        }

        serde_json::from_str(&text).map_err(|e| McpClientError::Parse(e.to_string()))
    }

    /// Read events until the response to request `id` arrives. The server may
    /// keep the stream open afterwards, so it is dropped at that point.
    async fn read_event_stream(
        &self,
        method: &str,
        id: u64,
        response: reqwest::Response,
    ) -> Result<Value, McpClientError> {
        let mut events = response.bytes_stream().eventsource();

        while let Some(event) = events.next().await {
            let event = event.map_err(|e| match e {
                EventStreamError::Transport(e) => self.transport_error(method, e),
                other => McpClientError::Parse(other.to_string()),
            })?;
            if event.data.is_empty() {
                continue;
            }

            let message: Value = match serde_json::from_str(&event.data) {
                Ok(message) => message,
                Err(e) => {
                    tracing::warn!(server = %self.config.name, error = %e, "failed to parse MCP event payload");
                    continue;
                }
            };
            if message.get("id").and_then(Value::as_u64) == Some(id) {
                return Ok(message);
            }
        }

        Err(McpClientError::InvalidResponse(format!(
            "event stream for '{method}' ended without a response with id {id}"
        )))
    }

    fn transport_error(&self, method: &str, error: reqwest::Error) -> McpClientError {
        if error.is_timeout() {
            McpClientError::Timeout {
                server: self.config.name.clone(),
                method: method.to_string(),
            }
        } else {
            McpClientError::Transport {
                server: self.config.name.clone(),
                message: error.to_string(),
            }
        }
    }
}

fn parse_tools_call_result(result: Value) -> Value {
    let is_error = result
        .get("isError")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    let content = result
        .get("content")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let mut parsed = json!({
        "isError": is_error,
        "content": content,
    });
    if let Some(structured) = result.get("structuredContent") {
        parsed["structuredContent"] = structured.clone();
    }
    parsed
}
