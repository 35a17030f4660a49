use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use agentic_agent::testing::ScriptedModel;
use agentic_agent::{
    Agent, AgentError, AgentFactory, Event, InMemorySessionService, InvocationContext, LlmAgent,
    HTTP_HEADERS_SESSION_KEY,
};
use agentic_config::{InteractionType, McpTool, SubAgent};
use agentic_protocol::Message;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Map, Value};
use url::Url;

async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn factory() -> AgentFactory {
    AgentFactory::new().with_retry_backoff(Duration::from_millis(10))
}

fn root_agent(model: &ScriptedModel) -> LlmAgent {
    LlmAgent::new("root_agent", Arc::new(model.clone()))
        .with_description("Routes requests")
        .with_instruction("You are a customer service agent.")
}

/// Remote A2A agent answering every `message/send` with a completed task.
async fn start_remote_agent(name: &str, answer: &str) -> Url {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());

    let card = json!({
        "name": name,
        "description": format!("{name} description"),
        "url": format!("{base}/"),
        "version": "0.1.0",
        "capabilities": {},
        "skills": [],
        "defaultInputModes": ["text/plain"],
        "defaultOutputModes": ["text/plain"]
    });
    let answer = answer.to_string();

    let app = Router::new()
        .route(
            "/.well-known/agent-card.json",
            get(move || {
                let card = card.clone();
                async move { Json(card) }
            }),
        )
        .route(
            "/",
            post(move |Json(request): Json<Value>| {
                let answer = answer.clone();
                async move {
                    let context_id = request["params"]["message"]["contextId"].clone();
                    Json(json!({
                        "jsonrpc": "2.0",
                        "id": request["id"],
                        "result": {
                            "kind": "task",
                            "id": "remote-task",
                            "contextId": context_id,
                            "status": {"state": "completed"},
                            "artifacts": [{"artifactId": "a1", "parts": [{"kind": "text", "text": answer}]}]
                        }
                    }))
                }
            }),
        );
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    Url::parse(&format!("{base}/.well-known/agent-card.json")).unwrap()
}

#[derive(Default)]
struct McpLog {
    calls: Vec<(String, Option<String>, Option<String>)>,
}

async fn mcp_handler(
    State(log): State<Arc<Mutex<McpLog>>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    let method = body["method"].as_str().unwrap_or_default().to_string();
    log.lock().unwrap().calls.push((
        method.clone(),
        header("authorization"),
        header("x-external-token"),
    ));

    let result = match method.as_str() {
        "initialize" => json!({"protocolVersion": "2025-03-26", "capabilities": {}}),
        "notifications/initialized" => return StatusCode::ACCEPTED.into_response(),
        "tools/list" => json!({"tools": [
            {"name": "get_customer", "description": "Retrieves customer information"},
            {"name": "update_customer", "description": "Updates customer records"}
        ]}),
        "tools/call" => json!({"content": [{"type": "text", "text": "John Doe"}]}),
        _ => json!({}),
    };
    Json(json!({"jsonrpc": "2.0", "id": body["id"], "result": result})).into_response()
}

async fn start_mcp() -> (Url, Arc<Mutex<McpLog>>) {
    let log = Arc::new(Mutex::new(McpLog::default()));
    let app = Router::new()
        .route("/mcp", post(mcp_handler))
        .with_state(log.clone());
    let base = serve(app).await;
    (Url::parse(&format!("{base}/mcp")).unwrap(), log)
}

#[tokio::test]
async fn sub_agents_split_by_interaction_type() {
    let billing = start_remote_agent("billing", "Invoice sent").await;
    let pricing = start_remote_agent("pricing", "42 EUR").await;
    let sub_agents = vec![
        SubAgent {
            name: "billing".into(),
            url: billing,
            interaction_type: InteractionType::Transfer,
        },
        SubAgent {
            name: "pricing".into(),
            url: pricing,
            interaction_type: InteractionType::ToolCall,
        },
    ];

    let model = ScriptedModel::new();
    let agent = factory()
        .load_agent(root_agent(&model), &sub_agents, &[])
        .await
        .unwrap();

    assert_eq!(agent.sub_agents().len(), 1);
    assert_eq!(agent.sub_agents()[0].name(), "billing");
    assert_eq!(agent.sub_agents()[0].description(), "billing description");
    assert_eq!(agent.tools().len(), 1);
    assert_eq!(agent.tools()[0].name(), "pricing");
}

#[tokio::test]
async fn transfer_reaches_remote_agent() {
    let billing = start_remote_agent("billing", "Invoice sent").await;
    let sub_agents = vec![SubAgent {
        name: "billing".into(),
        url: billing,
        interaction_type: InteractionType::Transfer,
    }];

    let model = ScriptedModel::new();
    model.respond_with_transfer("invoice", "billing");
    let agent = factory()
        .load_agent(root_agent(&model), &sub_agents, &[])
        .await
        .unwrap();

    let mut ctx = InvocationContext::detached("root_agent").await;
    let reply = agent
        .run(&mut ctx, &Message::user_text("Please send my invoice"))
        .await
        .unwrap();
    assert_eq!(reply.text(), "Invoice sent");
}

#[tokio::test]
async fn unavailable_sub_agent_fails_after_three_attempts() {
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
    let base = serve(app).await;

    let sub_agents = vec![SubAgent {
        name: "unavailable_agent".into(),
        url: Url::parse(&format!("{base}/.well-known/agent-card.json")).unwrap(),
        interaction_type: InteractionType::Transfer,
    }];

    let err = factory()
        .load_agent(root_agent(&ScriptedModel::new()), &sub_agents, &[])
        .await
        .err()
        .unwrap();

    assert!(matches!(err, AgentError::AgentCardUnavailable { attempts: 3, .. }));
    assert!(err.to_string().contains("Network communication error"));
    assert_eq!(hits.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn mcp_tool_descriptions_are_appended_to_instruction() {
    let (url, _) = start_mcp().await;
    let tools = vec![McpTool::new("customer_api", url)];

    let agent = factory()
        .load_agent(root_agent(&ScriptedModel::new()), &[], &tools)
        .await
        .unwrap();

    let instruction = agent.instruction();
    assert!(instruction.starts_with("You are a customer service agent."));
    assert!(instruction.contains("\n\nFollowing MCP tools are available:\n"));
    assert!(instruction.contains("- 'get_customer': Retrieves customer information"));
    assert!(instruction.contains("- 'update_customer': Updates customer records"));
    assert_eq!(agent.tools().len(), 2);
}

#[tokio::test]
async fn unavailable_mcp_server_fails_startup() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let url = format!("http://{addr}/mcp");
    let tools = vec![McpTool::new("unavailable_tool", Url::parse(&url).unwrap())];

    let err = factory()
        .load_agent(root_agent(&ScriptedModel::new()), &[], &tools)
        .await
        .err()
        .unwrap();

    let message = err.to_string();
    assert!(message.contains("Could not connect to MCP server 'unavailable_tool'"));
    assert!(message.contains(&url));
    assert!(message.contains("Ensure the server is running and accessible"));
}

async fn run_with_headers(tool: McpTool, inbound: Value) {
    let model = ScriptedModel::new();
    model.respond_with_tool_call(
        "customer",
        "get_customer",
        json!({"customer_id": "1"}),
        "Found John Doe",
    );
    let agent = factory()
        .load_agent(root_agent(&model), &[], &[tool])
        .await
        .unwrap();

    let service = InMemorySessionService::new();
    let session = service.create_session("root_agent", "user", None).await;
    let mut ctx = InvocationContext::new(session, service);
    let mut delta = Map::new();
    delta.insert(HTTP_HEADERS_SESSION_KEY.into(), inbound);
    ctx.append_event(Event::state_update(delta)).await.unwrap();

    let reply = agent
        .run(&mut ctx, &Message::user_text("Look up customer 1"))
        .await
        .unwrap();
    assert_eq!(reply.text(), "Found John Doe");
}

#[tokio::test]
async fn allow_listed_headers_reach_mcp_tool() {
    let (url, log) = start_mcp().await;
    let tool = McpTool::new("crm", url).with_propagate_headers(["Authorization"]);

    run_with_headers(
        tool,
        json!({"authorization": "Bearer X", "x-external-token": "tok"}),
    )
    .await;

    let log = log.lock().unwrap();
    let call = log
        .calls
        .iter()
        .find(|(method, _, _)| method == "tools/call")
        .unwrap();
    assert_eq!(call.1.as_deref(), Some("Bearer X"));
    assert_eq!(call.2, None);
}

#[tokio::test]
async fn only_external_token_reaches_tool_without_allow_list() {
    let (url, log) = start_mcp().await;
    let tool = McpTool::new("crm", url);

    run_with_headers(
        tool,
        json!({"authorization": "Bearer X", "x-external-token": "tok"}),
    )
    .await;

    let log = log.lock().unwrap();
    let call = log
        .calls
        .iter()
        .find(|(method, _, _)| method == "tools/call")
        .unwrap();
    assert_eq!(call.1, None);
    assert_eq!(call.2.as_deref(), Some("tok"));
}
