use crate::api::ChatClient;
use crate::config::Config;
use crate::router::{HttpVisitorMemory, VisitorMemorySink};
use crate::state::{
    BoxedActionHandler, ChatSession, PanelController, ThemePreference, UiUpdate,
};
use crate::terminal::{self, TerminalSession};
use crate::types::{PanelAction, PanelState, StreamEvent};
use crate::ui::layout::split_chat_layout;
use crate::ui::render::{
    render_header, render_input, render_panel, render_status_line, render_transcript, Palette,
};
use crate::ui::text::clamp_to_char_boundary;
use anyhow::Result;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncBufReadExt;
use tokio::sync::mpsc;
use tokio::time::Instant;

const TUI_TICK_INTERVAL: Duration = Duration::from_millis(33);
const SCROLL_STEP: usize = 5;

/// What a key press asks the app to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyCommand {
    Submit,
    CancelTurn,
    NewChat,
    Retry,
    Quit,
    ScrollUp,
    ScrollDown,
    Insert(char),
    Backspace,
    Delete,
    Left,
    Right,
    Home,
    End,
}

pub fn key_command(key: KeyEvent) -> Option<KeyCommand> {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    let command = match key.code {
        KeyCode::Char('c') if ctrl => KeyCommand::Quit,
        KeyCode::Char('n') if ctrl => KeyCommand::NewChat,
        KeyCode::Char('r') if ctrl => KeyCommand::Retry,
        KeyCode::Char('a') if ctrl => KeyCommand::Home,
        KeyCode::Char('e') if ctrl => KeyCommand::End,
        KeyCode::Char(_) if ctrl => return None,
        KeyCode::Char(ch) => KeyCommand::Insert(ch),
        KeyCode::Enter => KeyCommand::Submit,
        KeyCode::Esc => KeyCommand::CancelTurn,
        KeyCode::PageUp => KeyCommand::ScrollUp,
        KeyCode::PageDown => KeyCommand::ScrollDown,
        KeyCode::Backspace => KeyCommand::Backspace,
        KeyCode::Delete => KeyCommand::Delete,
        KeyCode::Left => KeyCommand::Left,
        KeyCode::Right => KeyCommand::Right,
        KeyCode::Home => KeyCommand::Home,
        KeyCode::End => KeyCommand::End,
        _ => return None,
    };
    Some(command)
}

/// Line-mode commands; anything else is a prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineCommand {
    Quit,
    NewChat,
    Retry,
    Prompt(String),
    Empty,
}

pub fn parse_line_command(line: &str) -> LineCommand {
    match line.trim() {
        "" => LineCommand::Empty,
        "q" | "quit" | "exit" | "/q" | "/quit" | "/exit" => LineCommand::Quit,
        "/new" => LineCommand::NewChat,
        "/retry" => LineCommand::Retry,
        prompt => LineCommand::Prompt(prompt.to_string()),
    }
}

pub struct App {
    session: ChatSession,
    panel: PanelController<BoxedActionHandler>,
    delivered_rx: mpsc::UnboundedReceiver<PanelAction>,
    shown_panel: PanelState,
    panel_effects: Vec<PanelAction>,
    theme: ThemePreference,
    update_tx: mpsc::UnboundedSender<UiUpdate>,
    update_rx: mpsc::UnboundedReceiver<UiUpdate>,
    model: String,
    input: String,
    cursor: usize,
    scroll_back: usize,
    should_quit: bool,
}

impl App {
    pub fn new(config: Config) -> Result<Self> {
        let client = ChatClient::new(&config)?;
        let memory = config.memory_url.as_ref().map(|url| {
            Arc::new(HttpVisitorMemory::new(url.clone(), config.connect_timeout))
                as Arc<dyn VisitorMemorySink>
        });
        Ok(Self::with_session(
            ChatSession::new(client, memory),
            &config,
        ))
    }

    pub fn with_session(session: ChatSession, config: &Config) -> Self {
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        let (delivered_tx, delivered_rx) = mpsc::unbounded_channel();
        let deliver: BoxedActionHandler = Box::new(move |action| {
            let _ = delivered_tx.send(action);
        });

        Self {
            session,
            panel: PanelController::with_timing(
                deliver,
                config.action_stagger,
                config.panel_transition,
            ),
            delivered_rx,
            shown_panel: PanelState::closed(),
            panel_effects: Vec::new(),
            theme: ThemePreference::load_initial(config.theme_path.clone()),
            update_tx,
            update_rx,
            model: config.model.clone(),
            input: String::new(),
            cursor: 0,
            scroll_back: 0,
            should_quit: false,
        }
    }

    pub async fn run(&mut self) -> Result<()> {
        tracing::info!(session = self.session.session_id(), model = %self.model, "starting");
        if terminal::is_interactive() {
            let mut screen = TerminalSession::enter()?;
            self.run_tui(&mut screen).await
        } else {
            self.run_lines().await
        }
    }

    async fn run_tui(&mut self, screen: &mut TerminalSession) -> Result<()> {
        let mut tick = tokio::time::interval(TUI_TICK_INTERVAL);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        while !self.should_quit {
            self.panel.tick();
            self.drain_delivered(None);
            self.draw(screen)?;
            self.process_terminal_events()?;
            if self.should_quit {
                break;
            }

            let deadline = self.panel.next_deadline();
            tokio::select! {
                _ = tick.tick() => {}
                _ = sleep_until_deadline(deadline) => {}
                update = self.update_rx.recv() => {
                    if let Some(update) = update {
                        self.handle_update(update);
                    }
                }
            }
        }
        Ok(())
    }

    fn draw(&mut self, screen: &mut TerminalSession) -> Result<()> {
        let palette = Palette::for_theme(self.theme.current());
        let header = format!("panelchat  {}  [{}]", self.model, self.theme.current().name());
        let status = self.status_line_text();
        let progress = self.panel.transition_progress();
        let entries = self.session.transcript().entries();
        let panel_state = self.panel.state();
        let effects = &self.panel_effects;
        let input = &self.input;
        let cursor = self.cursor;
        let scroll_back = self.scroll_back;

        screen.terminal().draw(|frame| {
            let layout = split_chat_layout(frame.area(), progress);
            render_header(frame, layout.header, &header, palette);
            render_transcript(frame, layout.transcript, entries, scroll_back, palette);
            if let Some(area) = layout.panel {
                render_panel(frame, area, panel_state, effects, palette);
            }
            render_status_line(frame, layout.status, &status, palette);
            render_input(frame, layout.input, input, cursor, palette);
        })?;
        Ok(())
    }

    fn status_line_text(&self) -> String {
        let activity = if self.session.is_busy() {
            "streaming (Esc to cancel)"
        } else {
            "ready"
        };
        let pending = self.panel.pending_actions();
        let mut status = format!("{activity}  |  Ctrl+N new chat  Ctrl+R retry  Ctrl+C quit");
        if pending > 0 {
            status.push_str(&format!("  |  {pending} panel action(s) pending"));
        }
        status
    }

    fn process_terminal_events(&mut self) -> Result<()> {
        while event::poll(Duration::from_millis(0))? {
            match event::read()? {
                Event::Key(key)
                    if key.kind == KeyEventKind::Press || key.kind == KeyEventKind::Repeat =>
                {
                    if let Some(command) = key_command(key) {
                        self.apply_key_command(command);
                    }
                }
                Event::Paste(text) => self.paste(&text),
                _ => {}
            }
        }
        Ok(())
    }

    fn apply_key_command(&mut self, command: KeyCommand) {
        match command {
            KeyCommand::Submit => {
                if self.session.is_busy() {
                    return;
                }
                let prompt = std::mem::take(&mut self.input);
                self.cursor = 0;
                self.scroll_back = 0;
                self.session.start_turn(&prompt, self.update_tx.clone());
            }
            KeyCommand::CancelTurn => {
                self.session.cancel_turn(&mut self.panel);
            }
            KeyCommand::NewChat => {
                self.session.new_chat(&mut self.panel);
                self.panel_effects.clear();
                self.shown_panel = PanelState::closed();
                self.scroll_back = 0;
            }
            KeyCommand::Retry => {
                self.scroll_back = 0;
                self.session.retry_turn(self.update_tx.clone());
            }
            KeyCommand::Quit => self.should_quit = true,
            KeyCommand::ScrollUp => self.scroll_back = self.scroll_back.saturating_add(SCROLL_STEP),
            KeyCommand::ScrollDown => {
                self.scroll_back = self.scroll_back.saturating_sub(SCROLL_STEP)
            }
            KeyCommand::Insert(ch) => {
                self.input.insert(self.cursor, ch);
                self.cursor += ch.len_utf8();
            }
            KeyCommand::Backspace => {
                if let Some(index) = self.previous_char_start() {
                    self.input.remove(index);
                    self.cursor = index;
                }
            }
            KeyCommand::Delete => {
                if self.cursor < self.input.len() {
                    self.input.remove(self.cursor);
                }
            }
            KeyCommand::Left => {
                if let Some(index) = self.previous_char_start() {
                    self.cursor = index;
                }
            }
            KeyCommand::Right => {
                if let Some(ch) = self.input[self.cursor..].chars().next() {
                    self.cursor += ch.len_utf8();
                }
            }
            KeyCommand::Home => self.cursor = 0,
            KeyCommand::End => self.cursor = self.input.len(),
        }
        self.cursor = clamp_to_char_boundary(&self.input, self.cursor);
    }

    /// Pasted line breaks become spaces so a paste never submits.
    fn paste(&mut self, text: &str) {
        let text = text.replace("\r\n", " ").replace(['\r', '\n'], " ");
        self.input.insert_str(self.cursor, &text);
        self.cursor += text.len();
    }

    fn previous_char_start(&self) -> Option<usize> {
        self.input[..self.cursor]
            .char_indices()
            .next_back()
            .map(|(index, _)| index)
    }

    fn handle_update(&mut self, update: UiUpdate) {
        if let Some(choice) = self.session.apply_update(update, &mut self.panel) {
            self.theme.apply(choice);
        }
        self.drain_delivered(None);
    }

    /// Pull delivered actions into the panel view. Effects shown for a
    /// previous panel target are dropped when the target changes.
    fn drain_delivered(&mut self, mut echo: Option<&mut dyn Write>) {
        if !self.shown_panel.same_target(self.panel.state()) {
            self.shown_panel = self.panel.state().clone();
            self.panel_effects.clear();
        }
        while let Ok(action) = self.delivered_rx.try_recv() {
            tracing::debug!(action = %action.describe(), "panel action delivered");
            if let Some(out) = echo.as_mut() {
                let _ = writeln!(out, "[action] {}", action.describe());
            }
            self.panel_effects.push(action);
        }
    }

    async fn run_lines(&mut self) -> Result<()> {
        let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
        let mut stdout = std::io::stdout();

        while !self.should_quit {
            write!(stdout, "> ")?;
            stdout.flush()?;
            let Some(line) = lines.next_line().await? else {
                break;
            };
            let started = match parse_line_command(&line) {
                LineCommand::Empty => continue,
                LineCommand::Quit => break,
                LineCommand::NewChat => {
                    self.session.new_chat(&mut self.panel);
                    self.panel_effects.clear();
                    writeln!(stdout, "[new chat]")?;
                    continue;
                }
                LineCommand::Retry => self.session.retry_turn(self.update_tx.clone()),
                LineCommand::Prompt(prompt) => {
                    self.session.start_turn(&prompt, self.update_tx.clone())
                }
            };
            if started.is_none() {
                writeln!(stdout, "[nothing to send]")?;
                continue;
            }
            self.drive_line_turn(&mut stdout).await?;
        }
        Ok(())
    }

    /// Print one turn as it streams, then let queued panel actions finish.
    async fn drive_line_turn(&mut self, out: &mut std::io::Stdout) -> Result<()> {
        let mut last_panel = self.panel.state().clone();
        loop {
            let busy = self.session.is_busy();
            let deadline = self.panel.next_deadline();
            if !busy && deadline.is_none() {
                break;
            }

            tokio::select! {
                update = self.update_rx.recv(), if busy => {
                    let Some(update) = update else { break };
                    echo_update(out, &update)?;
                    let theme_before = self.theme.current();
                    if let Some(choice) = self.session.apply_update(update, &mut self.panel) {
                        let theme = self.theme.apply(choice);
                        if theme != theme_before {
                            writeln!(out, "\n[theme] {}", theme.name())?;
                        }
                    }
                }
                _ = sleep_until_deadline(deadline) => {
                    self.panel.tick();
                }
                _ = tokio::signal::ctrl_c(), if busy => {
                    self.session.cancel_turn(&mut self.panel);
                    writeln!(out, "\n[cancelled]")?;
                }
            }

            if self.panel.state() != &last_panel {
                last_panel = self.panel.state().clone();
                writeln!(out, "\n[panel] {}", last_panel.describe())?;
            }
            self.drain_delivered(Some(&mut *out as &mut dyn Write));
            out.flush()?;
        }
        writeln!(out)?;
        Ok(())
    }
}

fn echo_update(out: &mut impl Write, update: &UiUpdate) -> Result<()> {
    match update {
        UiUpdate::Event {
            event: StreamEvent::Text { content },
            ..
        } => write!(out, "{content}")?,
        UiUpdate::Event {
            event: StreamEvent::Error { message },
            ..
        } => writeln!(out, "\n[error] {message}")?,
        UiUpdate::TurnFailed { message, .. } => writeln!(out, "\n[error] {message} (/retry)")?,
        UiUpdate::TurnFinished { clean: false, .. } => writeln!(out, "\n[interrupted] (/retry)")?,
        _ => {}
    }
    Ok(())
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
