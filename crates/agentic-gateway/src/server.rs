use std::sync::Arc;
use std::time::Instant;

use agentic_agent::{Agent, AgentFactory, LlmAgent};
use agentic_config::{McpTool, Settings, SubAgent};
use agentic_protocol::{AgentCard, AGENT_CARD_WELL_KNOWN_PATH};
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{middleware, Json, Router};
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::error::GatewayError;
use crate::executor::A2aAgentExecutor;
use crate::observability::{capture_http_bodies, make_span, record_response};
use crate::rpc::dispatch;
use crate::task_store::InMemoryTaskStore;

struct AppState {
    executor: A2aAgentExecutor,
    card: AgentCard,
    start_time: Instant,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    active_tasks: usize,
    version: &'static str,
}

/// A2A server for a single agent.
pub struct A2aServer {
    executor: A2aAgentExecutor,
    card: AgentCard,
    capture_http_bodies: bool,
}

impl A2aServer {
    pub fn new(agent: Arc<dyn Agent>, rpc_url: &str) -> Self {
        let card = AgentCard::text_agent(agent.name(), agent.description(), rpc_url);
        match serde_json::to_string(&card) {
            Ok(json) => tracing::info!("Built agent card: {json}"),
            Err(e) => tracing::warn!(error = %e, "agent card is not serializable"),
        }
        Self {
            executor: A2aAgentExecutor::new(agent, InMemoryTaskStore::new()),
            card,
            capture_http_bodies: false,
        }
    }

    /// Record buffered request and response bodies on HTTP spans.
    pub fn with_body_capture(mut self, enabled: bool) -> Self {
        self.capture_http_bodies = enabled;
        self
    }

    pub fn card(&self) -> &AgentCard {
        &self.card
    }

    pub fn executor(&self) -> &A2aAgentExecutor {
        &self.executor
    }

    pub fn router(&self) -> Router {
        let state = Arc::new(AppState {
            executor: self.executor.clone(),
            card: self.card.clone(),
            start_time: Instant::now(),
        });
        let mut router = Router::new()
            .route(AGENT_CARD_WELL_KNOWN_PATH, get(agent_card_handler))
            .route("/", post(rpc_handler))
            .route("/health", get(health_handler))
            .with_state(state);

        if self.capture_http_bodies {
            router = router.layer(middleware::from_fn(capture_http_bodies));
        }
        router.layer(
            TraceLayer::new_for_http()
                .make_span_with(make_span)
                .on_response(record_response),
        )
    }

    pub async fn start(&self, host: &str, port: u16) -> Result<(), GatewayError> {
        serve(self.router(), host, port).await
    }
}

/// Resolve sub-agents and MCP tools onto `agent` and build its A2A router.
///
/// Any unreachable agent card or MCP server fails here, before serving.
pub async fn to_a2a(
    agent: LlmAgent,
    rpc_url: &str,
    sub_agents: &[SubAgent],
    tools: &[McpTool],
    factory: Option<AgentFactory>,
) -> Result<Router, GatewayError> {
    let factory = factory.unwrap_or_default();
    let capture_http_bodies = factory.captures_bodies();
    let agent = factory.load_agent(agent, sub_agents, tools).await?;

    let server = A2aServer::new(Arc::new(agent), rpc_url).with_body_capture(capture_http_bodies);
    Ok(server.router())
}

/// [`to_a2a`] configured from process settings.
pub async fn to_a2a_from_settings(
    agent: LlmAgent,
    settings: &Settings,
) -> Result<Router, GatewayError> {
    let factory = AgentFactory::new().with_body_capture(settings.capture_http_bodies);
    to_a2a(
        agent,
        &settings.rpc_url,
        &settings.sub_agents,
        &settings.tools,
        Some(factory),
    )
    .await
}

pub async fn serve(router: Router, host: &str, port: u16) -> Result<(), GatewayError> {
    let addr = format!("{}:{}", host, port);
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| GatewayError::ServerError(e.to_string()))?;

    tracing::info!("A2A server started on http://{}", addr);

    axum::serve(listener, router)
        .await
        .map_err(|e| GatewayError::ServerError(e.to_string()))?;

    Ok(())
}

async fn agent_card_handler(State(state): State<Arc<AppState>>) -> Json<AgentCard> {
    Json(state.card.clone())
}

async fn rpc_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    match dispatch(&state.executor, &body, &headers).await {
        Some(response) => Json(response).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let active_tasks = state.executor.task_store().task_count().await;
    let uptime_secs = state.start_time.elapsed().as_secs();
    Json(HealthResponse {
        status: "ok",
        uptime_secs,
        active_tasks,
        version: env!("CARGO_PKG_VERSION"),
    })
}
