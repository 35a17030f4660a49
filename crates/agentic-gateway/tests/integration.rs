//! End-to-end tests for agentic-gateway.
//!
//! Tests cover:
//! 1. Agent card, JSON-RPC and health endpoints of a served agent
//! 2. Inbound headers reaching MCP tools through session state
//! 3. Startup failures for unreachable sub-agents and MCP servers

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use agentic_agent::testing::ScriptedModel;
use agentic_agent::{AgentFactory, LlmAgent};
use agentic_config::{InteractionType, McpTool, SubAgent};
use agentic_gateway::{to_a2a, GatewayError};
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use url::Url;

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

async fn start(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://127.0.0.1:{}", addr.port())
}

fn factory() -> AgentFactory {
    AgentFactory::new().with_retry_backoff(Duration::from_millis(10))
}

fn customer_agent(model: &ScriptedModel) -> LlmAgent {
    LlmAgent::new("customer_agent", Arc::new(model.clone()))
        .with_description("Answers customer questions")
        .with_instruction("You are a customer service agent.")
}

fn send_request(id: Value, text: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": "message/send",
        "params": {
            "message": {
                "role": "user",
                "parts": [{"kind": "text", "text": text}],
                "messageId": "msg-1",
                "contextId": "ctx-1",
                "kind": "message"
            }
        }
    })
}

#[derive(Default)]
struct CallLog {
    tool_calls: Vec<HeaderMap>,
}

async fn mcp_handler(
    State(log): State<Arc<Mutex<CallLog>>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let result = match body["method"].as_str().unwrap_or_default() {
        "initialize" => json!({"protocolVersion": "2025-03-26", "capabilities": {}}),
        "notifications/initialized" => return StatusCode::ACCEPTED.into_response(),
        "tools/list" => json!({"tools": [
            {"name": "get_customer", "description": "Retrieves customer information"}
        ]}),
        "tools/call" => {
            log.lock().unwrap().tool_calls.push(headers);
            json!({"content": [{"type": "text", "text": "John Doe"}]})
        }
        _ => json!({}),
    };
    Json(json!({"jsonrpc": "2.0", "id": body["id"], "result": result})).into_response()
}

async fn start_mcp() -> (Url, Arc<Mutex<CallLog>>) {
    let log = Arc::new(Mutex::new(CallLog::default()));
    let app = Router::new()
        .route("/mcp", post(mcp_handler))
        .with_state(log.clone());
    let base = start(app).await;
    (Url::parse(&format!("{base}/mcp")).unwrap(), log)
}

// ---------------------------------------------------------------------------
// Served agent
// ---------------------------------------------------------------------------

#[tokio::test]
async fn serves_agent_card_at_well_known_path() {
    let model = ScriptedModel::new();
    let router = to_a2a(customer_agent(&model), "http://localhost:8000/", &[], &[], None)
        .await
        .unwrap();
    let base = start(router).await;

    let card: Value = reqwest::get(format!("{base}/.well-known/agent-card.json"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(card["name"], "customer_agent");
    assert_eq!(card["description"], "Answers customer questions");
    assert_eq!(card["url"], "http://localhost:8000/");
    assert_eq!(card["defaultInputModes"], json!(["text/plain"]));
}

#[tokio::test]
async fn message_send_answers_with_request_id() {
    let model = ScriptedModel::new();
    model.respond_with_message("hello", "Hi, how can I help?");
    let router = to_a2a(customer_agent(&model), "http://localhost:8000/", &[], &[], None)
        .await
        .unwrap();
    let base = start(router).await;

    let response: Value = reqwest::Client::new()
        .post(format!("{base}/"))
        .json(&send_request(json!("req-42"), "hello there"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(response["jsonrpc"], "2.0");
    assert_eq!(response["id"], "req-42");
    assert_eq!(response["result"]["contextId"], "ctx-1");
    assert_eq!(response["result"]["status"]["state"], "completed");
    assert_eq!(
        response["result"]["artifacts"][0]["parts"][0]["text"],
        "Hi, how can I help?"
    );
}

#[tokio::test]
async fn notification_gets_empty_no_content_reply() {
    let model = ScriptedModel::new();
    model.respond_with_message("hello", "Hi, how can I help?");
    let router = to_a2a(customer_agent(&model), "http://localhost:8000/", &[], &[], None)
        .await
        .unwrap();
    let base = start(router).await;

    let mut body = send_request(json!(1), "hello there");
    body.as_object_mut().unwrap().remove("id");
    let response = reqwest::Client::new()
        .post(format!("{base}/"))
        .json(&body)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), reqwest::StatusCode::NO_CONTENT);
    assert!(response.bytes().await.unwrap().is_empty());
}

#[tokio::test]
async fn health_endpoint_reports_ok() {
    let router = to_a2a(
        customer_agent(&ScriptedModel::new()),
        "http://localhost:8000/",
        &[],
        &[],
        None,
    )
    .await
    .unwrap();
    let base = start(router).await;

    let response = reqwest::get(format!("{base}/health")).await.unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let health: Value = response.json().await.unwrap();
    assert_eq!(health["status"], "ok");
}

// ---------------------------------------------------------------------------
// Header propagation
// ---------------------------------------------------------------------------

async fn serve_with_tool(tool: McpTool) -> String {
    let model = ScriptedModel::new();
    model.respond_with_tool_call(
        "customer",
        "get_customer",
        json!({"customer_id": "1"}),
        "Customer is John Doe",
    );
    let router = to_a2a(
        customer_agent(&model),
        "http://localhost:8000/",
        &[],
        &[tool],
        Some(factory()),
    )
    .await
    .unwrap();
    start(router).await
}

async fn send_with_headers(base: &str) -> Value {
    reqwest::Client::new()
        .post(format!("{base}/"))
        .header("Authorization", "Bearer secret")
        .header("X-External-Token", "legacy-token")
        .header("X-Request-Id", "abc")
        .json(&send_request(json!(1), "Look up customer 1"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

#[tokio::test]
async fn allow_listed_headers_reach_mcp_server() {
    let (url, log) = start_mcp().await;
    let tool = McpTool::new("crm", url).with_propagate_headers(["Authorization", "X-Request-Id"]);
    let base = serve_with_tool(tool).await;

    let response = send_with_headers(&base).await;
    assert_eq!(response["result"]["status"]["state"], "completed");

    let log = log.lock().unwrap();
    let headers = log.tool_calls.last().unwrap();
    assert_eq!(header(headers, "authorization").as_deref(), Some("Bearer secret"));
    assert_eq!(header(headers, "x-request-id").as_deref(), Some("abc"));
    assert_eq!(header(headers, "x-external-token"), None);
}

#[tokio::test]
async fn external_token_is_forwarded_by_default() {
    let (url, log) = start_mcp().await;
    let base = serve_with_tool(McpTool::new("crm", url)).await;

    let response = send_with_headers(&base).await;
    assert_eq!(
        response["result"]["artifacts"][0]["parts"][0]["text"],
        "Customer is John Doe"
    );

    let log = log.lock().unwrap();
    let headers = log.tool_calls.last().unwrap();
    assert_eq!(header(headers, "x-external-token").as_deref(), Some("legacy-token"));
    assert_eq!(header(headers, "authorization"), None);
}

// ---------------------------------------------------------------------------
// Startup failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unavailable_sub_agent_fails_startup() {
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    let app = Router::new().route(
        "/.well-known/agent-card.json",
        get(move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                StatusCode::SERVICE_UNAVAILABLE
            }
        }),
    );
    let base = start(app).await;
    let sub_agents = vec![SubAgent {
        name: "unavailable_agent".into(),
        url: Url::parse(&format!("{base}/.well-known/agent-card.json")).unwrap(),
        interaction_type: InteractionType::Transfer,
    }];

    let result = to_a2a(
        customer_agent(&ScriptedModel::new()),
        "http://localhost:8000/",
        &sub_agents,
        &[],
        Some(factory()),
    )
    .await;

    let err = result.err().unwrap();
    assert!(matches!(err, GatewayError::Agent(_)));
    assert!(err.to_string().contains("unavailable_agent"));
    assert_eq!(hits.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn unavailable_mcp_server_fails_startup() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let url = format!("http://{addr}/mcp");

    let result = to_a2a(
        customer_agent(&ScriptedModel::new()),
        "http://localhost:8000/",
        &[],
        &[McpTool::new("unavailable_tool", Url::parse(&url).unwrap())],
        Some(factory()),
    )
    .await;

    let message = result.err().unwrap().to_string();
    assert_eq!(
        message,
        format!(
            "Could not connect to MCP server 'unavailable_tool' at {url}. \
             Ensure the server is running and accessible."
        )
    );
}
