//! Logging and OpenTelemetry bootstrap for agentic-layer services.
//!
//! [`init`] installs the global `tracing` subscriber. With the `otlp`
//! feature it also exports spans, metrics and log records over OTLP.
//! The [`body`] module decides whether an HTTP body may be attached to a
//! span.

pub mod body;
#[cfg(feature = "otlp")]
mod otlp;
mod subscriber;

pub use body::{capture_body, is_text_content, truncate_body, BodySnapshot, MAX_BODY_SIZE};
pub use subscriber::{init, init_subscriber, TelemetryConfig, TelemetryError, TelemetryGuard};
