use serde::Serialize;
use serde_json::{json, Value};
use std::time::Duration;

/// Something the visitor told the model about themselves.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VisitorFact {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interest: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl VisitorFact {
    pub fn from_args(args: &Value) -> Self {
        let field = |key: &str| {
            args.get(key)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(ToOwned::to_owned)
        };
        Self {
            name: field("name"),
            company: field("company"),
            role: field("role"),
            interest: field("interest"),
            note: field("note"),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.company.is_none()
            && self.role.is_none()
            && self.interest.is_none()
            && self.note.is_none()
    }
}

/// Receives visitor facts. Implementations must return without waiting on I/O.
pub trait VisitorMemorySink: Send + Sync {
    fn remember(&self, session_id: &str, fact: VisitorFact);
}

/// Posts facts as JSON to a remote store on a background task.
#[derive(Clone)]
pub struct HttpVisitorMemory {
    http: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl HttpVisitorMemory {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            url: url.into(),
            timeout,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn payload(session_id: &str, fact: &VisitorFact) -> Value {
        json!({ "session_id": session_id, "fact": fact })
    }
}

impl VisitorMemorySink for HttpVisitorMemory {
    fn remember(&self, session_id: &str, fact: VisitorFact) {
        if fact.is_empty() {
            tracing::debug!("remember_visitor called without any fact; skipping");
            return;
        }

        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                tracing::warn!("no async runtime for visitor memory; dropping fact");
                return;
            }
        };

        let request = self
            .http
            .post(&self.url)
            .timeout(self.timeout)
            .json(&Self::payload(session_id, &fact));
        let url = self.url.clone();
        let session_id = session_id.to_string();

        handle.spawn(async move {
            match request.send().await.and_then(|r| r.error_for_status()) {
                Ok(_) => tracing::debug!(%session_id, "visitor fact stored"),
                Err(error) => {
                    tracing::warn!(%url, %session_id, %error, "failed to store visitor fact")
                }
            }
        });
    }
}
