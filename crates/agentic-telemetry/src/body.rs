//! Best-effort capture of HTTP bodies for traces.
//!
//! Only text-like payloads that are already fully buffered are captured,
//! and never more than [`MAX_BODY_SIZE`] bytes of them.

/// Upper bound for a captured body, in bytes.
pub const MAX_BODY_SIZE: usize = 100 * 1024;

const TEXT_CONTENT_TYPES: &[&str] = &[
    "application/json",
    "application/xml",
    "text/",
    "application/x-www-form-urlencoded",
];

/// How much of a body is available without touching the underlying stream.
#[derive(Debug, Clone, Copy)]
pub enum BodySnapshot<'a> {
    /// The complete body is in memory.
    Buffered(&'a [u8]),
    /// The body is still being streamed; reading it would consume it.
    Streaming,
}

/// Whether the content type is text-based and safe to log.
pub fn is_text_content(content_type: &str) -> bool {
    let content_type = content_type.to_ascii_lowercase();
    TEXT_CONTENT_TYPES
        .iter()
        .any(|text_type| content_type.contains(text_type))
}

/// Decode a body lossily and cut it at [`MAX_BODY_SIZE`] on a char boundary.
pub fn truncate_body(body: &[u8]) -> String {
    let limit = body.len().min(MAX_BODY_SIZE);
    let mut text = String::from_utf8_lossy(&body[..limit]).into_owned();

    if text.len() > MAX_BODY_SIZE {
        let mut cut = MAX_BODY_SIZE;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        text.truncate(cut);
    }
    text
}

/// Returns the text to attach to a span, or `None` when the body must be skipped.
pub fn capture_body(content_type: Option<&str>, body: BodySnapshot<'_>) -> Option<String> {
    let BodySnapshot::Buffered(bytes) = body else {
        return None;
    };
    if bytes.is_empty() || !is_text_content(content_type.unwrap_or_default()) {
        return None;
    }
    Some(truncate_body(bytes))
}
