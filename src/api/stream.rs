use super::client::ByteStream;
use super::logging::{emit_sse_parse_error, emit_tool_argument_error};
use crate::types::{ChatChunk, StreamEvent, ToolCallFragment};
use anyhow::Result;
use futures::{stream, Stream, StreamExt};
use serde_json::Value;
use std::collections::{BTreeMap, VecDeque};
use std::pin::Pin;

pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent>> + Send>>;

const DONE_SENTINEL: &str = "[DONE]";

/// A tool call being assembled from argument fragments at one slot index.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingToolCall {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

impl PendingToolCall {
    fn new(id: String, name: String) -> Self {
        Self {
            id,
            name,
            arguments: String::new(),
        }
    }

    /// Parse the buffered arguments. An empty buffer means `{}`.
    fn finalize(self) -> StreamEvent {
        if self.arguments.trim().is_empty() {
            return StreamEvent::ToolCall {
                id: self.id,
                name: self.name,
                arguments: Value::Object(serde_json::Map::new()),
            };
        }

        match serde_json::from_str::<Value>(&self.arguments) {
            Ok(arguments) => StreamEvent::ToolCall {
                id: self.id,
                name: self.name,
                arguments,
            },
            Err(error) => {
                emit_tool_argument_error(&self.name, &self.id, &self.arguments, &error);
                StreamEvent::error(format!(
                    "invalid arguments for tool '{}' ({}): {error}; raw arguments: {}",
                    self.name, self.id, self.arguments
                ))
            }
        }
    }
}

/// Incremental decoder for chat-completions SSE bodies.
///
/// Bytes are pushed as they arrive; complete `data:` lines are turned into
/// events immediately. Text is emitted in stream order, tool calls only when
/// their slot is displaced, at `[DONE]`, or at end of input.
#[derive(Debug, Default)]
pub struct StreamDecoder {
    buffer: Vec<u8>,
    pending: BTreeMap<usize, PendingToolCall>,
    finished: bool,
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// True once `[DONE]` or end of input has been processed.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        if self.finished {
            return events;
        }

        let mut buffer = std::mem::take(&mut self.buffer);
        buffer.extend_from_slice(chunk);
        let mut start = 0;
        // '\n' never occurs inside a multi-byte UTF-8 sequence, so lines can
        // be cut on raw bytes and decoded whole.
        while let Some(end) = buffer[start..].iter().position(|b| *b == b'\n') {
            let line_end = start + end;
            let line = String::from_utf8_lossy(&buffer[start..line_end]);
            start = line_end + 1;
            self.process_line(&line, &mut events);
            if self.finished {
                return events;
            }
        }

        buffer.drain(..start);
        self.buffer = buffer;
        events
    }

    /// End of input. Pending calls are flushed but no `Done` is emitted
    /// unless the sentinel was part of an unterminated final line.
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        if self.finished {
            return events;
        }

        if !self.buffer.is_empty() {
            let line = std::mem::take(&mut self.buffer);
            let line = String::from_utf8_lossy(&line).into_owned();
            self.process_line(&line, &mut events);
        }

        if !self.finished {
            if !self.pending.is_empty() {
                tracing::debug!(
                    pending = self.pending.len(),
                    "stream ended without [DONE]; flushing pending tool calls"
                );
            }
            self.flush_pending(&mut events);
            self.finished = true;
        }

        events
    }

    /// Drop all state without finalizing pending calls (turn cancelled).
    pub fn discard(&mut self) {
        self.buffer.clear();
        self.pending.clear();
        self.finished = true;
    }

    fn process_line(&mut self, line: &str, events: &mut Vec<StreamEvent>) {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.trim().is_empty() || line.starts_with(':') {
            return;
        }
        let Some(payload) = line.strip_prefix("data:") else {
            return;
        };
        let payload = payload.trim();

        if payload == DONE_SENTINEL {
            self.flush_pending(events);
            events.push(StreamEvent::Done);
            self.finished = true;
            return;
        }

        match serde_json::from_str::<ChatChunk>(payload) {
            Ok(chunk) => self.apply_chunk(chunk, events),
            Err(error) => {
                emit_sse_parse_error(payload, &error);
                events.push(StreamEvent::error(format!(
                    "malformed stream payload: {error}"
                )));
            }
        }
    }

    fn apply_chunk(&mut self, chunk: ChatChunk, events: &mut Vec<StreamEvent>) {
        if let Some(error) = &chunk.error {
            let message = error
                .message
                .clone()
                .unwrap_or_else(|| "provider reported an error".to_string());
            events.push(StreamEvent::error(message));
        }

        let Some(delta) = chunk.first_delta() else {
            return;
        };

        if let Some(content) = delta.content.as_deref() {
            if !content.is_empty() {
                events.push(StreamEvent::text(content));
            }
        }

        for fragment in delta.tool_calls.iter().flatten() {
            self.apply_fragment(fragment, events);
        }
    }

    fn apply_fragment(&mut self, fragment: &ToolCallFragment, events: &mut Vec<StreamEvent>) {
        let function = fragment.function.as_ref();
        let id = fragment.id.as_deref().filter(|id| !id.is_empty());
        let name = function
            .and_then(|f| f.name.as_deref())
            .filter(|name| !name.is_empty());
        let arguments = function.and_then(|f| f.arguments.as_deref());

        if let (Some(id), Some(name)) = (id, name) {
            // Providers may reuse a slot index without closing the previous
            // call; the old call is emitted before the new one takes the slot.
            if let Some(displaced) = self.pending.remove(&fragment.index) {
                tracing::debug!(
                    index = fragment.index,
                    displaced = %displaced.name,
                    "slot index reused; flushing previous tool call"
                );
                events.push(displaced.finalize());
            }
            self.pending.insert(
                fragment.index,
                PendingToolCall::new(id.to_string(), name.to_string()),
            );
        }

        let Some(arguments) = arguments.filter(|a| !a.is_empty()) else {
            return;
        };
        match self.pending.get_mut(&fragment.index) {
            Some(call) => call.arguments.push_str(arguments),
            None => tracing::debug!(
                index = fragment.index,
                "argument fragment for an empty slot; dropping"
            ),
        }
    }

    fn flush_pending(&mut self, events: &mut Vec<StreamEvent>) {
        for (_, call) in std::mem::take(&mut self.pending) {
            events.push(call.finalize());
        }
    }
}

struct DecodeState {
    input: Option<ByteStream>,
    decoder: StreamDecoder,
    ready: VecDeque<StreamEvent>,
}

/// Decode a response body lazily.
///
/// The body is read only as fast as events are pulled. It is dropped after
/// `Done`, at end of input, after a read error (yielded as the final item),
/// or when the returned stream itself is dropped.
pub fn decode_stream(input: ByteStream) -> EventStream {
    let state = DecodeState {
        input: Some(input),
        decoder: StreamDecoder::new(),
        ready: VecDeque::new(),
    };

    Box::pin(stream::unfold(state, |mut state| async move {
        loop {
            if let Some(event) = state.ready.pop_front() {
                return Some((Ok(event), state));
            }

            let input = state.input.as_mut()?;
            match input.next().await {
                Some(Ok(chunk)) => {
                    state.ready.extend(state.decoder.push(&chunk));
                    if state.decoder.is_finished() {
                        state.input = None;
                    }
                }
                Some(Err(error)) => {
                    state.input = None;
                    state.decoder.discard();
                    return Some((Err(error), state));
                }
                None => {
                    state.input = None;
                    state.ready.extend(state.decoder.finish());
                }
            }
        }
    }))
}
