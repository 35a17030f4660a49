//! HTTP spans and body capture for the A2A server.

use std::time::Duration;

use agentic_protocol::AGENT_CARD_WELL_KNOWN_PATH;
use agentic_telemetry::{capture_body, is_text_content, BodySnapshot};
use axum::body::{Body, HttpBody};
use axum::extract::Request;
use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::field::Empty;
use tracing::Span;

pub const REQUEST_BODY_FIELD: &str = "http.request.body";
pub const RESPONSE_BODY_FIELD: &str = "http.response.body";

/// Bodies announcing more than this are forwarded without being buffered.
pub const MAX_CAPTURE_BUFFER: u64 = 2 * 1024 * 1024;

const EVENT_STREAM: &str = "text/event-stream";

/// Span for one inbound request. Agent card fetches double as health
/// checks and get no span.
pub fn make_span(request: &Request) -> Span {
    let path = request.uri().path();
    if path == AGENT_CARD_WELL_KNOWN_PATH {
        return Span::none();
    }
    tracing::info_span!(
        "http.request",
        http.request.method = %request.method(),
        url.path = %path,
        http.response.status_code = Empty,
        http.request.body = Empty,
        http.response.body = Empty,
    )
}

pub fn record_response(response: &Response, latency: Duration, span: &Span) {
    if span.is_none() {
        return;
    }
    span.record("http.response.status_code", response.status().as_u16());
    tracing::info!(
        status = response.status().as_u16(),
        latency_ms = latency.as_millis() as u64,
        "request completed"
    );
}

fn content_type(headers: &HeaderMap) -> Option<String> {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Whether a body with this content type is read into memory for capture.
fn is_capturable(content_type: Option<&str>) -> bool {
    match content_type {
        Some(ct) => !ct.to_ascii_lowercase().starts_with(EVENT_STREAM) && is_text_content(ct),
        None => false,
    }
}

/// Declared length of a body, from `Content-Length` or the body itself.
/// Bodies without one are still streaming and are never buffered.
fn announced_size<B: HttpBody>(headers: &HeaderMap, body: &B) -> Option<u64> {
    headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .or_else(|| body.size_hint().exact())
}

/// Middleware recording buffered text bodies on the current request span.
pub async fn capture_http_bodies(request: Request, next: Next) -> Response {
    let request = match capture_request_body(request).await {
        Ok(request) => request,
        Err(response) => return response,
    };
    let response = next.run(request).await;
    capture_response_body(response).await
}

async fn capture_request_body(request: Request) -> Result<Request, Response> {
    let content_type = content_type(request.headers());
    if !is_capturable(content_type.as_deref()) {
        return Ok(request);
    }
    let Some(size) = announced_size(request.headers(), request.body()) else {
        return Ok(request);
    };
    if size > MAX_CAPTURE_BUFFER {
        tracing::debug!(size, "request body too large to capture");
        return Ok(request);
    }

    let (parts, body) = request.into_parts();
    match axum::body::to_bytes(body, size as usize).await {
        Ok(bytes) => {
            if let Some(text) = capture_body(content_type.as_deref(), BodySnapshot::Buffered(&bytes))
            {
                Span::current().record(REQUEST_BODY_FIELD, text.as_str());
            }
            Ok(Request::from_parts(parts, Body::from(bytes)))
        }
        Err(e) => {
            tracing::warn!(error = %e, "failed to read request body");
            Err((StatusCode::BAD_REQUEST, "failed to read request body").into_response())
        }
    }
}

async fn capture_response_body(response: Response) -> Response {
    let content_type = content_type(response.headers());
    if !is_capturable(content_type.as_deref()) {
        return response;
    }
    let Some(size) = announced_size(response.headers(), response.body()) else {
        return response;
    };
    if size > MAX_CAPTURE_BUFFER {
        tracing::debug!(size, "response body too large to capture");
        return response;
    }

    let (parts, body) = response.into_parts();
    match axum::body::to_bytes(body, size as usize).await {
        Ok(bytes) => {
            if let Some(text) = capture_body(content_type.as_deref(), BodySnapshot::Buffered(&bytes))
            {
                Span::current().record(RESPONSE_BODY_FIELD, text.as_str());
            }
            Response::from_parts(parts, Body::from(bytes))
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to read response body");
            (StatusCode::INTERNAL_SERVER_ERROR, "failed to read response body").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_card_requests_get_no_span() {
        let request = Request::builder()
            .uri(AGENT_CARD_WELL_KNOWN_PATH)
            .body(Body::empty())
            .unwrap();
        assert!(make_span(&request).is_none());
    }

    #[tokio::test]
    async fn request_body_survives_capture() {
        let request = Request::builder()
            .method("POST")
            .uri("/")
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"jsonrpc":"2.0"}"#))
            .unwrap();

        let request = capture_request_body(request).await.unwrap();
        let bytes = axum::body::to_bytes(request.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&bytes[..], br#"{"jsonrpc":"2.0"}"#);
    }

    #[tokio::test]
    async fn event_streams_are_left_alone() {
        let response = Response::builder()
            .status(StatusCode::OK)
            .header(CONTENT_TYPE, "text/event-stream")
            .body(Body::from("data: {}\n\n"))
            .unwrap();

        let response = capture_response_body(response).await;
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&bytes[..], b"data: {}\n\n");
    }

    #[tokio::test]
    async fn binary_bodies_are_left_alone() {
        let response = Response::builder()
            .header(CONTENT_TYPE, "image/png")
            .body(Body::from(vec![0x89, 0x50]))
            .unwrap();

        let response = capture_response_body(response).await;
        assert_eq!(response.body().size_hint().exact(), Some(2));
    }

    #[tokio::test]
    async fn oversized_request_body_is_not_buffered() {
        let size = MAX_CAPTURE_BUFFER as usize + 1;
        let request = Request::builder()
            .method("POST")
            .uri("/")
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(vec![b'a'; size]))
            .unwrap();

        let request = capture_request_body(request).await.unwrap();
        // Still the original body, not a rebuilt buffered one.
        assert_eq!(request.body().size_hint().exact(), Some(size as u64));
        let bytes = axum::body::to_bytes(request.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(bytes.len(), size);
    }

    #[tokio::test]
    async fn unreadable_request_body_is_rejected() {
        let request = Request::builder()
            .method("POST")
            .uri("/")
            .header(CONTENT_TYPE, "application/json")
            .header(CONTENT_LENGTH, "4")
            .body(Body::from(r#"{"jsonrpc":"2.0"}"#))
            .unwrap();

        let response = capture_request_body(request).await.unwrap_err();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unreadable_response_body_becomes_server_error() {
        let response = Response::builder()
            .header(CONTENT_TYPE, "application/json")
            .header(CONTENT_LENGTH, "2")
            .body(Body::from(r#"{"result":{}}"#))
            .unwrap();

        let response = capture_response_body(response).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
