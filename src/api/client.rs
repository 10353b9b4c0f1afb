use super::logging::{debug_payload_enabled, emit_debug_payload};
use crate::config::Config;
use crate::router::{IN_PANEL_TOOLS, MEMORY_TOOL, PANEL_TOOLS, THEME_TOOL};
use crate::types::ApiMessage;
use crate::util::is_local_endpoint_url;
use anyhow::{anyhow, Result};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde_json::{json, Value};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

const SYSTEM_PROMPT: &str = "You are the guide for a personal portfolio.\n\
Answer briefly and conversationally.\n\
When a question is about a project, experience, skill, post or game, open the matching panel with a tool call while you answer.\n\
Use in-panel tools (scroll, highlight, focus) to point at the exact entry you are talking about.\n\
Call hide_panel when the visitor asks to close it.\n\
When the visitor shares their name, company, role or interests, call remember_visitor.\n\
Never invent project slugs; only use slugs you were given.";

/// Supplies scripted response bodies instead of the network.
pub trait MockStreamProducer: Send + Sync {
    fn create_mock_stream(&self, messages: &[ApiMessage]) -> Result<ByteStream>;
}

#[derive(Clone)]
pub struct ChatClient {
    http: reqwest::Client,
    api_key: Option<String>,
    model: String,
    api_url: String,
    connect_timeout: Duration,
    mock_stream_producer: Option<Arc<dyn MockStreamProducer>>,
}

impl ChatClient {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            http: reqwest::Client::new(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            api_url: config.api_url.clone(),
            connect_timeout: config.connect_timeout,
            mock_stream_producer: None,
        })
    }

    pub fn new_mock(mock_producer: Arc<dyn MockStreamProducer>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: None,
            model: "mock-model".to_string(),
            api_url: "http://localhost:8000/v1/chat/completions".to_string(),
            connect_timeout: Duration::from_secs(1),
            mock_stream_producer: Some(mock_producer),
        }
    }

    pub fn is_local_endpoint(&self) -> bool {
        is_local_endpoint_url(&self.api_url)
    }

    /// Open a streaming completion and return the raw response body.
    ///
    /// Only the wait for the response head is bounded by the connect
    /// timeout. The body may stream for as long as the model keeps talking.
    pub async fn create_stream(&self, messages: &[ApiMessage]) -> Result<ByteStream> {
        if let Some(producer) = &self.mock_stream_producer {
            return producer.create_mock_stream(messages);
        }

        let payload = self.request_payload(messages);
        if debug_payload_enabled() {
            emit_debug_payload(&self.api_url, &payload);
        }

        let mut request = self
            .http
            .post(&self.api_url)
            .header("content-type", "application/json")
            .header("accept", "text/event-stream")
            .json(&payload);
        if let Some(api_key) = &self.api_key {
            request = request.header("authorization", format!("Bearer {api_key}"));
        }

        let response = tokio::time::timeout(self.connect_timeout, request.send())
            .await
            .map_err(|_| {
                anyhow!(
                    "API request to '{}' timed out after {} ms waiting for a response",
                    self.api_url,
                    self.connect_timeout.as_millis()
                )
            })?
            .map_err(|error| map_api_request_error(error, &self.api_url))?
            .error_for_status()
            .map_err(|error| map_api_request_error(error, &self.api_url))?;

        tracing::debug!(url = %self.api_url, status = %response.status(), "stream opened");

        let request_url = self.api_url.clone();
        let stream = response
            .bytes_stream()
            .map(move |item| item.map_err(|error| map_api_request_error(error, &request_url)));
        Ok(Box::pin(stream))
    }

    fn request_payload(&self, messages: &[ApiMessage]) -> Value {
        let mut wire_messages = Vec::with_capacity(messages.len() + 1);
        wire_messages.push(json!({ "role": "system", "content": SYSTEM_PROMPT }));
        for message in messages {
            wire_messages.push(json!({ "role": message.role, "content": message.content }));
        }

        json!({
            "model": self.model,
            "stream": true,
            "messages": wire_messages,
            "tools": tool_definitions(),
            "tool_choice": "auto",
        })
    }
}

fn map_api_request_error(error: reqwest::Error, request_url: &str) -> anyhow::Error {
    if error.is_connect() && is_local_endpoint_url(request_url) {
        return anyhow!(
            "cannot reach local API endpoint '{}': {}. Start your local server or update PANELCHAT_API_URL.",
            request_url,
            error
        );
    }
    if error.is_connect() {
        return anyhow!("cannot reach API endpoint '{}': {}", request_url, error);
    }
    if error.is_timeout() {
        return anyhow!("API request to '{}' timed out: {}", request_url, error);
    }
    if let Some(status) = error.status() {
        return anyhow!(
            "API endpoint '{}' returned HTTP {}: {}",
            request_url,
            status,
            error
        );
    }
    anyhow!("API request to '{}' failed: {}", request_url, error)
}

fn function_tool(name: &str, description: &str, properties: Value, required: &[&str]) -> Value {
    json!({
        "type": "function",
        "function": {
            "name": name,
            "description": description,
            "parameters": {
                "type": "object",
                "properties": properties,
                "required": required,
            }
        }
    })
}

fn string_prop(description: &str) -> Value {
    json!({ "type": "string", "description": description })
}

fn tool_definitions() -> Value {
    json!([
        function_tool(
            "show_project",
            "Open the panel on one project.",
            json!({ "slug": string_prop("Project slug") }),
            &["slug"],
        ),
        function_tool(
            "show_projects",
            "Open the project grid, optionally filtered.",
            json!({
                "category": string_prop("Project category"),
                "filter": string_prop("Free-text filter")
            }),
            &[],
        ),
        function_tool(
            "compare_projects",
            "Open a side-by-side comparison of two projects.",
            json!({
                "slug": string_prop("First project slug"),
                "slug2": string_prop("Second project slug")
            }),
            &["slug", "slug2"],
        ),
        function_tool("show_experience", "Open the work experience timeline.", json!({}), &[]),
        function_tool(
            "show_skills",
            "Open the skills overview.",
            json!({ "category": string_prop("Skill category") }),
            &[],
        ),
        function_tool("show_education", "Open the education panel.", json!({}), &[]),
        function_tool("show_contact", "Open the contact panel.", json!({}), &[]),
        function_tool("show_resume", "Open the resume.", json!({}), &[]),
        function_tool(
            "show_blog_post",
            "Open one blog post.",
            json!({ "slug": string_prop("Post slug") }),
            &["slug"],
        ),
        function_tool(
            "show_blog",
            "Open the blog index.",
            json!({ "filter": string_prop("Tag or text filter") }),
            &[],
        ),
        function_tool(
            "play_game",
            "Open a mini game in the panel.",
            json!({ "game": string_prop("Game identifier") }),
            &["game"],
        ),
        function_tool(
            "show_insight",
            "Show a single highlighted insight card.",
            json!({
                "title": string_prop("Card title"),
                "metric": string_prop("Metric name"),
                "value": string_prop("Metric value"),
                "detail": string_prop("Supporting detail")
            }),
            &["title"],
        ),
        function_tool("hide_panel", "Close the side panel.", json!({}), &[]),
        function_tool(
            "scroll_to_experience",
            "Scroll the experience timeline to a company.",
            json!({ "company": string_prop("Company name") }),
            &["company"],
        ),
        function_tool(
            "highlight_experience",
            "Highlight one experience entry.",
            json!({ "company": string_prop("Company name") }),
            &["company"],
        ),
        function_tool(
            "highlight_year",
            "Highlight a year on the experience timeline.",
            json!({ "year": string_prop("Four-digit year") }),
            &["year"],
        ),
        function_tool(
            "highlight_skill",
            "Highlight a skill in the skills panel.",
            json!({
                "skill": string_prop("Skill name"),
                "category": string_prop("Skill category")
            }),
            &["skill"],
        ),
        function_tool(
            "focus_project_image",
            "Focus one image in a project's gallery.",
            json!({
                "slug": string_prop("Project slug"),
                "index": { "type": "integer", "minimum": 0, "description": "Zero-based image index" }
            }),
            &["slug", "index"],
        ),
        function_tool(
            "highlight_project_field",
            "Highlight a field (stack, role, outcome...) of a project.",
            json!({
                "slug": string_prop("Project slug"),
                "field": string_prop("Field name")
            }),
            &["slug", "field"],
        ),
        function_tool(
            "scroll_to_section",
            "Scroll a blog post to a section heading.",
            json!({
                "slug": string_prop("Post slug"),
                "section": string_prop("Section heading")
            }),
            &["slug", "section"],
        ),
        function_tool(
            "highlight_comparison",
            "Highlight one row of a project comparison.",
            json!({
                "slug": string_prop("First project slug"),
                "slug2": string_prop("Second project slug"),
                "field": string_prop("Compared field")
            }),
            &["slug", "slug2", "field"],
        ),
        function_tool(
            "set_theme",
            "Switch the UI theme.",
            json!({ "theme": { "type": "string", "enum": ["light", "dark", "toggle"] } }),
            &[],
        ),
        function_tool(
            "remember_visitor",
            "Remember facts the visitor shared about themselves.",
            json!({
                "name": string_prop("Visitor name"),
                "company": string_prop("Visitor company"),
                "role": string_prop("Visitor role"),
                "interest": string_prop("What they are interested in"),
                "note": string_prop("Anything else worth remembering")
            }),
            &[],
        ),
    ])
}

/// Every tool name the router understands, for keeping definitions in sync.
pub fn routed_tool_names() -> Vec<&'static str> {
    PANEL_TOOLS
        .iter()
        .chain(IN_PANEL_TOOLS.iter())
        .copied()
        .chain([THEME_TOOL, MEMORY_TOOL])
        .collect()
}
