use anyhow::{bail, Result};
use std::path::PathBuf;
use std::time::Duration;

use crate::util::{is_http_url, is_local_endpoint_url, parse_millis};

pub const DEFAULT_API_URL: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 15_000;
const DEFAULT_ACTION_STAGGER_MS: u64 = 150;
const DEFAULT_PANEL_TRANSITION_MS: u64 = 300;

#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: Option<String>,
    pub model: String,
    pub api_url: String,
    pub memory_url: Option<String>,
    pub theme_path: Option<PathBuf>,
    pub connect_timeout: Duration,
    pub action_stagger: Duration,
    pub panel_transition: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            api_url: DEFAULT_API_URL.to_string(),
            memory_url: None,
            theme_path: None,
            connect_timeout: Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS),
            action_stagger: Duration::from_millis(DEFAULT_ACTION_STAGGER_MS),
            panel_transition: Duration::from_millis(DEFAULT_PANEL_TRANSITION_MS),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let api_url = non_empty_env("PANELCHAT_API_URL").unwrap_or_else(|| DEFAULT_API_URL.into());
        let api_key = non_empty_env("PANELCHAT_API_KEY").or_else(|| non_empty_env("OPENAI_API_KEY"));
        let model = non_empty_env("PANELCHAT_MODEL").unwrap_or_else(|| DEFAULT_MODEL.into());

        Ok(Self {
            api_key,
            model,
            api_url,
            memory_url: non_empty_env("PANELCHAT_MEMORY_URL"),
            theme_path: non_empty_env("PANELCHAT_THEME_PATH").map(PathBuf::from),
            connect_timeout: millis_env("PANELCHAT_CONNECT_TIMEOUT_MS", DEFAULT_CONNECT_TIMEOUT_MS)?,
            action_stagger: millis_env("PANELCHAT_ACTION_STAGGER_MS", DEFAULT_ACTION_STAGGER_MS)?,
            panel_transition: millis_env(
                "PANELCHAT_PANEL_TRANSITION_MS",
                DEFAULT_PANEL_TRANSITION_MS,
            )?,
        })
    }

    pub fn validate(&self) -> Result<()> {
        if !is_http_url(&self.api_url) {
            bail!(
                "Invalid PANELCHAT_API_URL '{}': expected http:// or https:// URL",
                self.api_url
            );
        }

        if !self.is_local_endpoint() && self.api_key.is_none() {
            bail!(
                "PANELCHAT_API_KEY (or OPENAI_API_KEY) must be set for non-local endpoints (url: '{}')",
                self.api_url
            );
        }

        if self.model.trim().is_empty() {
            bail!("PANELCHAT_MODEL must not be empty");
        }

        if let Some(memory_url) = &self.memory_url {
            if !is_http_url(memory_url) {
                bail!(
                    "Invalid PANELCHAT_MEMORY_URL '{}': expected http:// or https:// URL",
                    memory_url
                );
            }
        }

        if self.connect_timeout.is_zero() {
            bail!("PANELCHAT_CONNECT_TIMEOUT_MS must be greater than zero");
        }

        Ok(())
    }

    pub fn is_local_endpoint(&self) -> bool {
        is_local_endpoint_url(&self.api_url)
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn millis_env(name: &str, default_ms: u64) -> Result<Duration> {
    match non_empty_env(name) {
        None => Ok(Duration::from_millis(default_ms)),
        Some(raw) => match parse_millis(&raw) {
            Some(duration) => Ok(duration),
            None => bail!("Invalid {name} '{raw}': expected a whole number of milliseconds"),
        },
    }
}
