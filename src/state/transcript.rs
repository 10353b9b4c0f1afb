use serde::Serialize;

pub const INTERRUPTED_NOTICE: &str = "[response interrupted, please retry]";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    Tool,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TranscriptEntry {
    pub role: Role,
    pub content: String,
    /// Error entries that can be answered by re-sending the last prompt.
    pub retryable: bool,
}

impl TranscriptEntry {
    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            retryable: false,
        }
    }
}

/// What the user sees of the conversation.
#[derive(Debug, Default)]
pub struct Transcript {
    entries: Vec<TranscriptEntry>,
    active_assistant: Option<usize>,
    last_prompt: Option<String>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn push_user(&mut self, prompt: &str) {
        self.active_assistant = None;
        self.last_prompt = Some(prompt.to_string());
        self.entries.push(TranscriptEntry::new(Role::User, prompt));
    }

    /// Append streamed text to the assistant entry of the current turn,
    /// creating it on first use.
    pub fn append_text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        let index = match self.active_assistant {
            Some(index) => index,
            None => {
                self.entries.push(TranscriptEntry::new(Role::Assistant, ""));
                let index = self.entries.len() - 1;
                self.active_assistant = Some(index);
                index
            }
        };
        self.entries[index].content.push_str(text);
    }

    /// One-line record of a panel change or delivered action.
    pub fn push_tool_note(&mut self, note: impl Into<String>) {
        self.entries.push(TranscriptEntry::new(Role::Tool, note));
    }

    pub fn has_partial_response(&self) -> bool {
        self.active_assistant
            .and_then(|index| self.entries.get(index))
            .is_some_and(|entry| !entry.content.is_empty())
    }

    /// Surface a failure. After partial output the message is marked as
    /// interrupted; before any output a standalone retryable entry is added.
    pub fn push_error(&mut self, message: &str) {
        let partial = self
            .active_assistant
            .filter(|_| self.has_partial_response());
        match partial {
            Some(index) => {
                let entry = &mut self.entries[index];
                if !entry.content.ends_with(INTERRUPTED_NOTICE) {
                    if !entry.content.ends_with('\n') {
                        entry.content.push('\n');
                    }
                    entry.content.push_str(INTERRUPTED_NOTICE);
                }
            }
            None => {
                let mut entry = TranscriptEntry::new(Role::Error, message);
                entry.retryable = self.last_prompt.is_some();
                self.entries.push(entry);
            }
        }
    }

    /// Non-fatal stream error that does not end the turn.
    pub fn push_notice(&mut self, message: &str) {
        self.entries.push(TranscriptEntry::new(Role::Error, message));
    }

    /// The current turn is over; later text starts a new assistant entry.
    pub fn end_turn(&mut self) {
        self.active_assistant = None;
    }

    pub fn retry_prompt(&self) -> Option<&str> {
        self.last_prompt.as_deref()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.active_assistant = None;
        self.last_prompt = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_accumulates_into_one_entry() {
        let mut transcript = Transcript::new();
        transcript.push_user("hi");
        transcript.append_text("Hel");
        transcript.append_text("lo");
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript.entries()[1].role, Role::Assistant);
        assert_eq!(transcript.entries()[1].content, "Hello");
    }

    #[test]
    fn test_error_after_partial_content_marks_interrupted() {
        let mut transcript = Transcript::new();
        transcript.push_user("tell me");
        transcript.append_text("Once upon");
        transcript.push_error("connection reset");

        assert_eq!(transcript.len(), 2);
        let entry = &transcript.entries()[1];
        assert_eq!(entry.content, format!("Once upon\n{INTERRUPTED_NOTICE}"));

        transcript.push_error("again");
        assert_eq!(transcript.entries()[1].content.matches(INTERRUPTED_NOTICE).count(), 1);
    }

    #[test]
    fn test_error_before_content_is_retryable_entry() {
        let mut transcript = Transcript::new();
        transcript.push_user("tell me");
        transcript.push_error("HTTP 500");

        let entry = transcript.entries().last().unwrap();
        assert_eq!(entry.role, Role::Error);
        assert_eq!(entry.content, "HTTP 500");
        assert!(entry.retryable);
        assert_eq!(transcript.retry_prompt(), Some("tell me"));
    }

    #[test]
    fn test_end_turn_starts_new_assistant_entry() {
        let mut transcript = Transcript::new();
        transcript.push_user("a");
        transcript.append_text("one");
        transcript.end_turn();
        transcript.append_text("two");
        assert_eq!(transcript.len(), 3);
        assert!(transcript.entries().iter().all(|entry| !entry.retryable));
    }

    #[test]
    fn test_clear_forgets_prompt() {
        let mut transcript = Transcript::new();
        transcript.push_user("a");
        transcript.clear();
        assert!(transcript.is_empty());
        assert_eq!(transcript.retry_prompt(), None);
    }
}
