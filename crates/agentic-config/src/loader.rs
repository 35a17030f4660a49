use crate::schema::{InteractionType, McpTool, SubAgent, DEFAULT_TOOL_TIMEOUT_SECS};
use indexmap::IndexMap;
use serde::Deserialize;
use std::env;
use thiserror::Error;
use url::Url;

pub const SUB_AGENTS_VAR: &str = "SUB_AGENTS";
pub const AGENT_TOOLS_VAR: &str = "AGENT_TOOLS";
pub const RPC_URL_VAR: &str = "AGENT_A2A_RPC_URL";
pub const LOG_LEVEL_VAR: &str = "LOGLEVEL";
pub const LOG_FORMAT_VAR: &str = "LOG_FORMAT";
pub const CAPTURE_BODIES_VAR: &str = "OTEL_CAPTURE_HTTP_BODIES";
pub const SERVICE_NAME_VAR: &str = "OTEL_SERVICE_NAME";

const DEFAULT_RPC_URL: &str = "http://localhost:8000/";
const DEFAULT_LOG_LEVEL: &str = "INFO";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid JSON in {var} environment variable: {source}")]
    InvalidJson {
        var: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid JSON in {var} environment variable, unexpected shape: {source}")]
    InvalidShape {
        var: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid URL for '{name}' in {var}: {message}")]
    InvalidUrl {
        var: &'static str,
        name: String,
        message: String,
    },
}

#[derive(Debug, Deserialize)]
struct SubAgentEntry {
    url: String,
    #[serde(default)]
    interaction_type: InteractionType,
}

#[derive(Debug, Deserialize)]
struct ToolEntry {
    url: String,
    #[serde(default)]
    timeout: Option<u64>,
    #[serde(default)]
    propagate_headers: Option<Vec<String>>,
}

/// Parse sub-agents from a JSON object keyed by agent name.
///
/// Format: `{"agent_name": {"url": "http://agent_url", "interaction_type": "transfer|tool_call"}, ...}`
pub fn parse_sub_agents(config: &str) -> Result<Vec<SubAgent>, ConfigError> {
    let entries: IndexMap<String, SubAgentEntry> = parse_map(SUB_AGENTS_VAR, config)?;

    entries
        .into_iter()
        .map(|(name, entry)| {
            let url = parse_http_url(SUB_AGENTS_VAR, &name, &entry.url)?;
            Ok(SubAgent {
                name,
                url,
                interaction_type: entry.interaction_type,
            })
        })
        .collect()
}

/// Parse MCP tools from a JSON object keyed by tool name.
///
/// Format: `{"tool_name": {"url": "http://tool_url", "timeout": 30, "propagate_headers": ["Authorization"]}, ...}`
pub fn parse_tools(config: &str) -> Result<Vec<McpTool>, ConfigError> {
    let entries: IndexMap<String, ToolEntry> = parse_map(AGENT_TOOLS_VAR, config)?;

    entries
        .into_iter()
        .map(|(name, entry)| {
            let url = parse_http_url(AGENT_TOOLS_VAR, &name, &entry.url)?;
            Ok(McpTool {
                name,
                url,
                timeout: entry.timeout.unwrap_or(DEFAULT_TOOL_TIMEOUT_SECS),
                propagate_headers: entry.propagate_headers,
            })
        })
        .collect()
}

fn parse_map<T>(var: &'static str, config: &str) -> Result<IndexMap<String, T>, ConfigError>
where
    T: for<'de> Deserialize<'de>,
{
    serde_json::from_str(config).map_err(|source| {
        if source.is_data() {
            ConfigError::InvalidShape { var, source }
        } else {
            ConfigError::InvalidJson { var, source }
        }
    })
}

fn parse_http_url(var: &'static str, name: &str, raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw).map_err(|e| ConfigError::InvalidUrl {
        var,
        name: name.to_string(),
        message: format!("{raw}: {e}"),
    })?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ConfigError::InvalidUrl {
            var,
            name: name.to_string(),
            message: format!("unsupported scheme '{other}' in {raw}"),
        }),
    }
}

/// Process-level settings read from the environment at startup.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Log level name, `LOGLEVEL` (default: INFO)
    pub log_level: String,

    /// `LOG_FORMAT=JSON` switches to structured output
    pub json_logs: bool,

    /// Public URL advertised in the agent card, `AGENT_A2A_RPC_URL`
    pub rpc_url: String,

    pub sub_agents: Vec<SubAgent>,

    pub tools: Vec<McpTool>,

    /// Attach HTTP bodies to spans, `OTEL_CAPTURE_HTTP_BODIES`
    pub capture_http_bodies: bool,

    pub service_name: Option<String>,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build settings from an arbitrary variable source. Descriptor JSON is
    /// parsed eagerly so malformed configuration fails here, before serving.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let sub_agents = match non_empty(SUB_AGENTS_VAR) {
            Some(raw) => parse_sub_agents(&raw)?,
            None => Vec::new(),
        };
        let tools = match non_empty(AGENT_TOOLS_VAR) {
            Some(raw) => parse_tools(&raw)?,
            None => Vec::new(),
        };

        let rpc_url = non_empty(RPC_URL_VAR).unwrap_or_else(|| DEFAULT_RPC_URL.to_string());
        parse_http_url(RPC_URL_VAR, "rpc_url", &rpc_url)?;

        Ok(Self {
            log_level: non_empty(LOG_LEVEL_VAR).unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
            json_logs: non_empty(LOG_FORMAT_VAR)
                .map(|v| v.eq_ignore_ascii_case("json"))
                .unwrap_or(false),
            rpc_url,
            sub_agents,
            tools,
            capture_http_bodies: non_empty(CAPTURE_BODIES_VAR)
                .map(|v| parse_flag(&v))
                .unwrap_or(false),
            service_name: non_empty(SERVICE_NAME_VAR),
        })
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
