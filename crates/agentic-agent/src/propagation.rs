//! Which inbound headers reach which tool.

use std::collections::HashMap;

use crate::session::Session;

/// Forwarded when a tool has no explicit allow-list.
pub const EXTERNAL_TOKEN_HEADER: &str = "X-External-Token";

/// Select the inbound headers a tool may receive.
///
/// Names match case-insensitively and are forwarded with the spelling used
/// in `allow_list`. Without an allow-list only [`EXTERNAL_TOKEN_HEADER`] is
/// forwarded; an empty allow-list forwards nothing.
pub fn headers_to_propagate(
    inbound: &HashMap<String, String>,
    allow_list: Option<&[String]>,
) -> Vec<(String, String)> {
    let by_lower_name: HashMap<String, &String> = inbound
        .iter()
        .map(|(name, value)| (name.to_ascii_lowercase(), value))
        .collect();

    let legacy = [EXTERNAL_TOKEN_HEADER.to_string()];
    let wanted = allow_list.unwrap_or(&legacy);

    let mut forwarded: Vec<(String, String)> = Vec::new();
    for name in wanted {
        let lower = name.to_ascii_lowercase();
        if forwarded
            .iter()
            .any(|(existing, _)| existing.eq_ignore_ascii_case(name))
        {
            continue;
        }
        if let Some(value) = by_lower_name.get(&lower) {
            forwarded.push((name.clone(), (*value).clone()));
        }
    }
    forwarded
}

/// Per-tool header source, evaluated on every tool invocation.
#[derive(Debug, Clone, Default)]
pub struct HeaderProvider {
    allow_list: Option<Vec<String>>,
}

impl HeaderProvider {
    pub fn new(allow_list: Option<Vec<String>>) -> Self {
        Self { allow_list }
    }

    pub fn allow_list(&self) -> Option<&[String]> {
        self.allow_list.as_deref()
    }

    /// Headers to send for a call made within `session`.
    pub fn headers(&self, session: Option<&Session>) -> Vec<(String, String)> {
        let Some(session) = session else {
            return Vec::new();
        };

        if session.has_header_snapshot() || self.allow_list.is_some() {
            return headers_to_propagate(&session.http_headers(), self.allow_list());
        }

        // Sessions written before the header snapshot existed only carry the token.
        session
            .external_token()
            .map(|token| vec![(EXTERNAL_TOKEN_HEADER.to_string(), token.to_string())])
            .unwrap_or_default()
    }
}
