use crate::util::parse_bool_str;
use anyhow::{anyhow, Result};
use serde_json::Value;
use std::fs::OpenOptions;
use std::io::IsTerminal;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_PATH: &str = "/tmp/panelchat.log";
const DEBUG_PAYLOAD_ENV: &str = "PANELCHAT_DEBUG_PAYLOAD";
const LOG_PATH_ENV: &str = "PANELCHAT_LOG_PATH";
const LOG_FILTER_ENV: &str = "PANELCHAT_LOG";
const DEFAULT_LOG_FILTER: &str = "info";

/// Install the global tracing subscriber.
///
/// Logs go to `PANELCHAT_LOG_PATH` when set. Otherwise, when stderr is a
/// terminal the TUI owns the screen, so logs go to a file in /tmp; when it is
/// not (pipes, CI) they go to stderr.
pub fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_env(LOG_FILTER_ENV)
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    match resolve_log_path() {
        Some(path) => {
            let file = open_log_file(&path)?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
                .map_err(|error| anyhow!("failed to install log subscriber: {error}"))
        }
        None => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init()
            .map_err(|error| anyhow!("failed to install log subscriber: {error}")),
    }
}

pub fn debug_payload_enabled() -> bool {
    std::env::var(DEBUG_PAYLOAD_ENV)
        .ok()
        .and_then(|v| parse_bool_str(&v))
        .unwrap_or(false)
}

pub fn emit_debug_payload(request_url: &str, payload: &Value) {
    let formatted_payload = serde_json::to_string_pretty(payload)
        .unwrap_or_else(|_| "<payload serialization error>".to_string());
    tracing::debug!(
        target: "panelchat::api",
        url = request_url,
        "request payload:\n{formatted_payload}"
    );
}

pub fn emit_sse_parse_error(data: &str, parse_error: &serde_json::Error) {
    tracing::warn!(
        target: "panelchat::api",
        error = %parse_error,
        "sse payload is not valid JSON; skipping line: {data}"
    );
}

pub fn emit_tool_argument_error(
    tool_name: &str,
    tool_id: &str,
    raw_arguments: &str,
    parse_error: &serde_json::Error,
) {
    tracing::warn!(
        target: "panelchat::api",
        tool = tool_name,
        id = tool_id,
        error = %parse_error,
        "tool call arguments are not valid JSON: {raw_arguments}"
    );
}

fn resolve_log_path() -> Option<String> {
    std::env::var(LOG_PATH_ENV)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .or_else(|| {
            if std::io::stderr().is_terminal() {
                Some(DEFAULT_LOG_PATH.to_string())
            } else {
                None
            }
        })
}

fn open_log_file(path: &str) -> Result<std::fs::File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(Path::new(path))
        .map_err(|error| anyhow!("cannot open log file '{path}': {error}"))
}
