use crate::api::client::{ByteStream, MockStreamProducer};
use crate::types::ApiMessage;
use anyhow::{anyhow, Result};
use bytes::Bytes;
use futures::stream;
use std::sync::{Arc, Mutex};

type ScriptedChunk = std::result::Result<Bytes, String>;

/// Replays scripted response bodies, one per `create_stream` call.
#[derive(Clone)]
pub struct MockApiClient {
    responses: Arc<Mutex<Vec<Vec<ScriptedChunk>>>>,
    requests: Arc<Mutex<Vec<Vec<ApiMessage>>>>,
}

impl MockApiClient {
    /// Each inner string is one SSE event; `\n\n` framing is added when
    /// missing and every event arrives as its own chunk.
    pub fn new(responses: Vec<Vec<String>>) -> Self {
        let scripted = responses
            .into_iter()
            .map(|events| {
                events
                    .into_iter()
                    .map(|event| {
                        let framed = if event.ends_with("\n\n") {
                            event
                        } else {
                            format!("{event}\n\n")
                        };
                        Ok(Bytes::from(framed))
                    })
                    .collect()
            })
            .collect();
        Self::scripted(scripted)
    }

    /// Chunks are delivered exactly as given, split wherever the test wants.
    pub fn raw(responses: Vec<Vec<Bytes>>) -> Self {
        let scripted = responses
            .into_iter()
            .map(|chunks| chunks.into_iter().map(Ok).collect())
            .collect();
        Self::scripted(scripted)
    }

    /// One response that yields `chunks` and then fails the read.
    pub fn failing_after(chunks: Vec<Bytes>, message: &str) -> Self {
        let mut scripted: Vec<ScriptedChunk> = chunks.into_iter().map(Ok).collect();
        scripted.push(Err(message.to_string()));
        Self::scripted(vec![scripted])
    }

    fn scripted(responses: Vec<Vec<ScriptedChunk>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Message lists received so far, in call order.
    pub fn requests(&self) -> Vec<Vec<ApiMessage>> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }
}

impl MockStreamProducer for MockApiClient {
    fn create_mock_stream(&self, messages: &[ApiMessage]) -> Result<ByteStream> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(messages.to_vec());
        }

        let mut responses_guard = self
            .responses
            .lock()
            .map_err(|_| anyhow!("MockApiClient: response script poisoned"))?;
        if responses_guard.is_empty() {
            return Err(anyhow!("MockApiClient: No more responses configured"));
        }
        let chunks: Vec<Result<Bytes>> = responses_guard
            .remove(0)
            .into_iter()
            .map(|chunk| chunk.map_err(|message| anyhow!(message)))
            .collect();

        Ok(Box::pin(stream::iter(chunks)))
    }
}
