use super::panel::PanelController;
use super::transcript::Transcript;
use crate::api::{decode_stream, ChatClient};
use crate::router::{ToolCallRouter, VisitorMemorySink};
use crate::types::{ApiMessage, PanelAction, StreamEvent, ThemeChoice};
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub type TurnId = u64;

/// Progress of a turn task, sent to the frontend loop.
#[derive(Debug, Clone, PartialEq)]
pub enum UiUpdate {
    Event { turn: TurnId, event: StreamEvent },
    /// The body ended. `clean` is true only when `[DONE]` was seen.
    TurnFinished { turn: TurnId, clean: bool },
    /// The request could not be made, or the body failed mid-read.
    TurnFailed { turn: TurnId, message: String },
}

impl UiUpdate {
    pub fn turn(&self) -> TurnId {
        match self {
            UiUpdate::Event { turn, .. }
            | UiUpdate::TurnFinished { turn, .. }
            | UiUpdate::TurnFailed { turn, .. } => *turn,
        }
    }
}

struct ActiveTurn {
    id: TurnId,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct ChatSession {
    client: Arc<ChatClient>,
    router: ToolCallRouter,
    history: Vec<ApiMessage>,
    transcript: Transcript,
    active: Option<ActiveTurn>,
    next_turn: TurnId,
    reply: String,
}

impl ChatSession {
    pub fn new(client: ChatClient, memory: Option<Arc<dyn VisitorMemorySink>>) -> Self {
        let mut router = ToolCallRouter::new(uuid::Uuid::new_v4().to_string());
        if let Some(memory) = memory {
            router = router.with_memory(memory);
        }
        Self {
            client: Arc::new(client),
            router,
            history: Vec::new(),
            transcript: Transcript::new(),
            active: None,
            next_turn: 1,
            reply: String::new(),
        }
    }

    pub fn session_id(&self) -> &str {
        self.router.session_id()
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn history(&self) -> &[ApiMessage] {
        &self.history
    }

    pub fn is_busy(&self) -> bool {
        self.active.is_some()
    }

    pub fn active_turn(&self) -> Option<TurnId> {
        self.active.as_ref().map(|turn| turn.id)
    }

    /// Record the prompt and start streaming the reply on a background task.
    /// Returns `None` while another turn is still running.
    pub fn start_turn(
        &mut self,
        prompt: &str,
        tx: mpsc::UnboundedSender<UiUpdate>,
    ) -> Option<TurnId> {
        if self.is_busy() {
            tracing::debug!("turn already in progress; ignoring prompt");
            return None;
        }
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return None;
        }
        self.transcript.push_user(prompt);
        self.history.push(ApiMessage::user(prompt));
        Some(self.spawn_turn(tx))
    }

    /// Re-send the last prompt after a failure.
    pub fn retry_turn(&mut self, tx: mpsc::UnboundedSender<UiUpdate>) -> Option<TurnId> {
        if self.is_busy() {
            return None;
        }
        let prompt = self.transcript.retry_prompt()?.to_string();
        let last_is_prompt = self
            .history
            .last()
            .is_some_and(|message| message.role == "user" && message.content == prompt);
        if !last_is_prompt {
            self.history.push(ApiMessage::user(prompt.as_str()));
        }
        self.transcript.end_turn();
        Some(self.spawn_turn(tx))
    }

    fn spawn_turn(&mut self, tx: mpsc::UnboundedSender<UiUpdate>) -> TurnId {
        let id = self.next_turn;
        self.next_turn += 1;
        self.reply.clear();

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_turn(
            Arc::clone(&self.client),
            self.history.clone(),
            id,
            cancel.clone(),
            tx,
        ));
        tracing::debug!(turn = id, messages = self.history.len(), "turn started");
        self.active = Some(ActiveTurn { id, cancel, handle });
        id
    }

    /// Apply one update from a turn task. Theme changes are handed back to
    /// the caller, which owns the theme.
    pub fn apply_update<D>(
        &mut self,
        update: UiUpdate,
        panel: &mut PanelController<D>,
    ) -> Option<ThemeChoice>
    where
        D: FnMut(PanelAction),
    {
        if self.active_turn() != Some(update.turn()) {
            tracing::trace!(turn = update.turn(), "ignoring update from stale turn");
            return None;
        }

        match update {
            UiUpdate::Event { event, .. } => return self.apply_event(event, panel),
            UiUpdate::TurnFinished { turn, clean } => {
                if !clean {
                    tracing::warn!(turn, "response ended without [DONE]");
                    self.transcript.push_error("response ended unexpectedly");
                }
                self.finish_turn(clean);
            }
            UiUpdate::TurnFailed { turn, message } => {
                tracing::warn!(turn, %message, "turn failed");
                self.transcript.push_error(&message);
                self.finish_turn(false);
            }
        }
        None
    }

    fn apply_event<D>(
        &mut self,
        event: StreamEvent,
        panel: &mut PanelController<D>,
    ) -> Option<ThemeChoice>
    where
        D: FnMut(PanelAction),
    {
        match event {
            StreamEvent::Text { content } => {
                self.reply.push_str(&content);
                self.transcript.append_text(&content);
            }
            StreamEvent::ToolCall {
                id,
                name,
                arguments,
            } => {
                tracing::debug!(%id, %name, "tool call");
                let routed = self.router.route(&name, &arguments);
                if let Some(state) = routed.panel_state {
                    self.transcript.push_tool_note(state.describe());
                    panel.apply_state(state);
                }
                match routed.action {
                    Some(PanelAction::ThemeChange { theme }) => return Some(theme),
                    Some(action) => panel.enqueue(action),
                    None => {}
                }
            }
            StreamEvent::Error { message } => {
                self.transcript.push_notice(&message);
            }
            StreamEvent::Done => {}
        }
        None
    }

    fn finish_turn(&mut self, clean: bool) {
        if clean && !self.reply.is_empty() {
            self.history
                .push(ApiMessage::assistant(std::mem::take(&mut self.reply)));
        }
        self.reply.clear();
        self.transcript.end_turn();
        self.active = None;
    }

    /// Stop the running turn: the body read is aborted, half-built tool
    /// calls are discarded and no queued panel action fires.
    pub fn cancel_turn<D>(&mut self, panel: &mut PanelController<D>) -> bool
    where
        D: FnMut(PanelAction),
    {
        let Some(active) = self.active.take() else {
            return false;
        };
        tracing::info!(turn = active.id, "turn cancelled");
        active.cancel.cancel();
        panel.cancel_pending();
        self.transcript.end_turn();
        self.transcript.push_notice("response cancelled");
        self.reply.clear();
        true
    }

    pub fn new_chat<D>(&mut self, panel: &mut PanelController<D>)
    where
        D: FnMut(PanelAction),
    {
        if let Some(active) = self.active.take() {
            active.cancel.cancel();
        }
        self.history.clear();
        self.transcript.clear();
        self.reply.clear();
        panel.reset();
    }
}

impl Drop for ChatSession {
    fn drop(&mut self) {
        if let Some(active) = self.active.take() {
            active.cancel.cancel();
            active.handle.abort();
        }
    }
}

async fn run_turn(
    client: Arc<ChatClient>,
    messages: Vec<ApiMessage>,
    turn: TurnId,
    cancel: CancellationToken,
    tx: mpsc::UnboundedSender<UiUpdate>,
) {
    let opened = tokio::select! {
        _ = cancel.cancelled() => return,
        opened = client.create_stream(&messages) => opened,
    };
    let body = match opened {
        Ok(body) => body,
        Err(error) => {
            let _ = tx.send(UiUpdate::TurnFailed {
                turn,
                message: format!("{error:#}"),
            });
            return;
        }
    };

    let mut events = decode_stream(body);
    let mut clean = false;
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!(turn, "dropping response body");
                return;
            }
            next = events.next() => next,
        };
        match next {
            Some(Ok(event)) => {
                clean |= matches!(event, StreamEvent::Done);
                if tx.send(UiUpdate::Event { turn, event }).is_err() {
                    return;
                }
            }
            Some(Err(error)) => {
                let _ = tx.send(UiUpdate::TurnFailed {
                    turn,
                    message: format!("{error:#}"),
                });
                return;
            }
            None => break,
        }
    }
    let _ = tx.send(UiUpdate::TurnFinished { turn, clean });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::mock_client::MockApiClient;
    use crate::state::transcript::Role;
    use crate::types::{PanelType, StreamEvent};
    use bytes::Bytes;
    use std::sync::Mutex;
    use std::time::Duration;

    type Delivered = Arc<Mutex<Vec<PanelAction>>>;

    fn panel() -> (PanelController<impl FnMut(PanelAction)>, Delivered) {
        let delivered: Delivered = Arc::new(Mutex::new(Vec::new()));
        let sink = delivered.clone();
        (
            PanelController::new(move |action| sink.lock().unwrap().push(action)),
            delivered,
        )
    }

    fn session(mock: MockApiClient) -> ChatSession {
        ChatSession::new(ChatClient::new_mock(Arc::new(mock)), None)
    }

    async fn drive<D: FnMut(PanelAction)>(
        session: &mut ChatSession,
        panel: &mut PanelController<D>,
        rx: &mut mpsc::UnboundedReceiver<UiUpdate>,
    ) -> Vec<ThemeChoice> {
        let mut themes = Vec::new();
        while session.is_busy() {
            let update = rx.recv().await.expect("turn task hung up");
            themes.extend(session.apply_update(update, panel));
        }
        themes
    }

    #[tokio::test]
    async fn test_turn_streams_text_and_opens_panel() {
        let mock = MockApiClient::new(vec![vec![
            r#"data: {"choices":[{"delta":{"content":"Here is "}}]}"#.to_string(),
            r#"data: {"choices":[{"delta":{"tool_calls":[{"index":0,"id":"c1","function":{"name":"show_project","arguments":""}}]}}]}"#.to_string(),
            r#"data: {"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"{\"slug\":\"demo\"}"}}]}}]}"#.to_string(),
            r#"data: {"choices":[{"delta":{"content":"the project."}}]}"#.to_string(),
            "data: [DONE]".to_string(),
        ]]);
        let mut session = session(mock);
        let (mut panel, _delivered) = panel();
        let (tx, mut rx) = mpsc::unbounded_channel();

        assert!(session.start_turn("show me demo", tx).is_some());
        drive(&mut session, &mut panel, &mut rx).await;

        assert_eq!(panel.state().panel_type(), Some(PanelType::Project));
        assert_eq!(panel.state().slug.as_deref(), Some("demo"));
        let entries = session.transcript().entries();
        assert_eq!(entries[0].role, Role::User);
        assert_eq!(entries[1].content, "Here is the project.");
        assert_eq!(entries[2].role, Role::Tool);
        assert_eq!(
            session.history(),
            &[
                ApiMessage::user("show me demo"),
                ApiMessage::assistant("Here is the project.")
            ]
        );
    }

    #[tokio::test]
    async fn test_theme_change_is_returned_to_caller() {
        let mock = MockApiClient::new(vec![vec![
            r#"data: {"choices":[{"delta":{"tool_calls":[{"index":0,"id":"c1","function":{"name":"set_theme","arguments":"{\"theme\":\"light\"}"}}]}}]}"#.to_string(),
            "data: [DONE]".to_string(),
        ]]);
        let mut session = session(mock);
        let (mut panel, delivered) = panel();
        let (tx, mut rx) = mpsc::unbounded_channel();

        session.start_turn("light mode please", tx);
        let themes = drive(&mut session, &mut panel, &mut rx).await;
        assert_eq!(themes, vec![ThemeChoice::Light]);
        assert!(!panel.state().is_open());
        assert!(delivered.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failure_before_content_is_retryable() {
        let mock = MockApiClient::failing_after(vec![], "connection reset");
        let mut session = session(mock);
        let (mut panel, _delivered) = panel();
        let (tx, mut rx) = mpsc::unbounded_channel();

        session.start_turn("hello", tx.clone());
        drive(&mut session, &mut panel, &mut rx).await;

        let last = session.transcript().entries().last().unwrap();
        assert_eq!(last.role, Role::Error);
        assert!(last.retryable);
        assert!(last.content.contains("connection reset"));
        assert_eq!(session.history(), &[ApiMessage::user("hello")]);

        // Script is exhausted, so the retry fails fast but reuses the prompt.
        assert!(session.retry_turn(tx).is_some());
        drive(&mut session, &mut panel, &mut rx).await;
        assert_eq!(session.history(), &[ApiMessage::user("hello")]);
    }

    #[tokio::test]
    async fn test_unclean_end_marks_partial_reply() {
        let mock = MockApiClient::new(vec![vec![
            r#"data: {"choices":[{"delta":{"content":"Partial"}}]}"#.to_string(),
        ]]);
        let mut session = session(mock);
        let (mut panel, _delivered) = panel();
        let (tx, mut rx) = mpsc::unbounded_channel();

        session.start_turn("hi", tx);
        drive(&mut session, &mut panel, &mut rx).await;

        let reply = &session.transcript().entries()[1];
        assert!(reply.content.starts_with("Partial\n"));
        assert!(reply.content.ends_with(crate::state::transcript::INTERRUPTED_NOTICE));
        assert_eq!(session.history().len(), 1);
    }

    #[tokio::test]
    async fn test_cancel_ignores_late_updates() {
        let first = Bytes::from(
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n".to_string(),
        );
        let mock = MockApiClient::raw(vec![vec![first]]);
        let mut session = session(mock);
        let (mut panel, _delivered) = panel();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let turn = session.start_turn("hi", tx.clone()).unwrap();
        let update = rx.recv().await.unwrap();
        assert_eq!(update.turn(), turn);

        assert!(session.cancel_turn(&mut panel));
        assert!(!session.is_busy());
        assert!(session.apply_update(update, &mut panel).is_none());
        assert!(session
            .transcript()
            .entries()
            .iter()
            .all(|entry| !entry.content.contains("Hel")));

        // A late update from the cancelled turn is ignored.
        let late = UiUpdate::TurnFinished { turn, clean: true };
        session.apply_update(late, &mut panel);
        assert_eq!(session.history().len(), 1);

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!session.cancel_turn(&mut panel));
    }

    #[tokio::test]
    async fn test_new_chat_resets_everything() {
        let mock = MockApiClient::new(vec![vec![
            r#"data: {"choices":[{"delta":{"tool_calls":[{"index":0,"id":"c1","function":{"name":"show_resume","arguments":"{}"}}]}}]}"#.to_string(),
            "data: [DONE]".to_string(),
        ]]);
        let mut session = session(mock);
        let (mut panel, _delivered) = panel();
        let (tx, mut rx) = mpsc::unbounded_channel();

        session.start_turn("resume?", tx);
        drive(&mut session, &mut panel, &mut rx).await;
        assert!(panel.state().is_open());

        session.new_chat(&mut panel);
        assert!(session.history().is_empty());
        assert!(session.transcript().is_empty());
        assert!(!panel.state().is_open());
    }

    #[test]
    fn test_stream_event_done_carries_no_turn_state() {
        let update = UiUpdate::Event {
            turn: 3,
            event: StreamEvent::Done,
        };
        assert_eq!(update.turn(), 3);
    }
}
