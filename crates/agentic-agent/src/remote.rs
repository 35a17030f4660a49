//! Agents living behind another A2A endpoint.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use agentic_protocol::{
    A2aError, AgentCard, JsonRpcRequest, JsonRpcResponse, Message, MessageSendConfiguration,
    MessageSendParams, SendMessageResult, METHOD_MESSAGE_SEND,
};
use agentic_telemetry::{capture_body, BodySnapshot};
use async_trait::async_trait;
use url::Url;

use crate::agent::{Agent, InvocationContext};
use crate::error::AgentError;

/// Retries after the first failed card fetch.
pub const DEFAULT_CARD_RETRIES: u32 = 2;

/// Fetch an agent card, retrying transport failures and non-success
/// statuses `retries` times with linear backoff.
pub async fn fetch_agent_card(
    http: &reqwest::Client,
    name: &str,
    card_url: &Url,
    retries: u32,
    backoff: Duration,
) -> Result<AgentCard, AgentError> {
    let attempts = retries + 1;
    let mut last_error = String::new();

    for attempt in 1..=attempts {
        match try_fetch_card(http, card_url).await {
            Ok(card) => return Ok(card),
            Err(message) => {
                tracing::warn!(
                    agent = name,
                    url = %card_url,
                    attempt,
                    attempts,
                    error = %message,
                    "agent card fetch failed"
                );
                last_error = message;
            }
        }
        if attempt < attempts {
            tokio::time::sleep(backoff * attempt).await;
        }
    }

    Err(AgentError::AgentCardUnavailable {
        name: name.to_string(),
        url: card_url.to_string(),
        attempts,
        message: last_error,
    })
}

async fn try_fetch_card(http: &reqwest::Client, card_url: &Url) -> Result<AgentCard, String> {
    let response = http
        .get(card_url.clone())
        .send()
        .await
        .map_err(|e| e.to_string())?;

    let status = response.status();
    if !status.is_success() {
        return Err(format!("HTTP {}", status.as_u16()));
    }

    response
        .json::<AgentCard>()
        .await
        .map_err(|e| format!("invalid agent card: {e}"))
}

/// Proxy for an agent reached over A2A `message/send`.
pub struct RemoteA2aAgent {
    name: String,
    card: AgentCard,
    http: reqwest::Client,
    capture_bodies: bool,
    next_id: AtomicU64,
}

impl RemoteA2aAgent {
    pub fn new(name: impl Into<String>, card: AgentCard, http: reqwest::Client) -> Self {
        Self {
            name: name.into(),
            card,
            http,
            capture_bodies: false,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn with_body_capture(mut self, enabled: bool) -> Self {
        self.capture_bodies = enabled;
        self
    }

    pub fn card(&self) -> &AgentCard {
        &self.card
    }

    async fn send(&self, params: &MessageSendParams) -> Result<SendMessageResult, AgentError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = JsonRpcRequest::new(id, METHOD_MESSAGE_SEND, params)
            .map_err(|source| self.remote_error(source))?;
        let body = serde_json::to_vec(&request)
            .map_err(|e| self.remote_error(A2aError::InvalidParams(e.to_string())))?;

        if self.capture_bodies {
            if let Some(text) = capture_body(Some("application/json"), BodySnapshot::Buffered(&body))
            {
                tracing::debug!(agent = %self.name, "HTTP request body: {}", text);
            }
        }

        let response = self
            .http
            .post(&self.card.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| self.http_error(e.to_string()))?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = response
            .bytes()
            .await
            .map_err(|e| self.http_error(e.to_string()))?;

        if self.capture_bodies {
            if let Some(text) = capture_body(content_type.as_deref(), BodySnapshot::Buffered(&bytes)) {
                tracing::debug!(agent = %self.name, "HTTP response body: {}", text);
            }
        }

        if !status.is_success() {
            return Err(self.http_error(format!("HTTP {}", status.as_u16())));
        }

        let response: JsonRpcResponse = serde_json::from_slice(&bytes)
            .map_err(|e| self.remote_error(A2aError::Parse(e.to_string())))?;
        response
            .into_result()
            .map_err(|source| self.remote_error(source))
    }

    fn remote_error(&self, source: A2aError) -> AgentError {
        AgentError::RemoteAgent {
            agent: self.name.clone(),
            source,
        }
    }

    fn http_error(&self, message: String) -> AgentError {
        AgentError::Http {
            agent: self.name.clone(),
            message,
        }
    }
}

#[async_trait]
impl Agent for RemoteA2aAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.card.description
    }

    async fn run(
        &self,
        ctx: &mut InvocationContext,
        message: &Message,
    ) -> Result<Message, AgentError> {
        let outbound = Message::user_text(message.text())
            .with_context(Some(ctx.session.id.clone()), None);
        let params = MessageSendParams {
            message: outbound,
            configuration: Some(MessageSendConfiguration {
                blocking: Some(true),
                ..Default::default()
            }),
            metadata: None,
        };

        tracing::info!(agent = %self.name, url = %self.card.url, "sending message to remote agent");
        let result = self.send(&params).await?;
        Ok(Message::agent_text(result.reply_text()))
    }
}
