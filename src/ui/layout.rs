use ratatui::layout::{Constraint, Direction, Layout, Rect};

/// Share of the body width a fully open panel takes.
const PANEL_WIDTH_PERCENT: u16 = 45;
const MIN_TRANSCRIPT_WIDTH: u16 = 20;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChatLayout {
    pub header: Rect,
    pub transcript: Rect,
    pub panel: Option<Rect>,
    pub status: Rect,
    pub input: Rect,
}

/// Split the screen into header, body, status and input rows. The body is
/// shared between the transcript and a side panel whose width follows the
/// open transition (`0.0` hidden, `1.0` fully open).
pub fn split_chat_layout(area: Rect, panel_progress: f32) -> ChatLayout {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Min(1),
            Constraint::Length(1),
            Constraint::Length(1),
        ])
        .split(area);
    let body = rows[1];

    let panel_width = panel_width(body.width, panel_progress);
    let (transcript, panel) = if panel_width == 0 {
        (body, None)
    } else {
        let columns = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Min(1), Constraint::Length(panel_width)])
            .split(body);
        (columns[0], Some(columns[1]))
    };

    ChatLayout {
        header: rows[0],
        transcript,
        panel,
        status: rows[2],
        input: rows[3],
    }
}

fn panel_width(body_width: u16, progress: f32) -> u16 {
    let progress = progress.clamp(0.0, 1.0);
    let full = (u32::from(body_width) * u32::from(PANEL_WIDTH_PERCENT) / 100) as u16;
    let full = full.min(body_width.saturating_sub(MIN_TRANSCRIPT_WIDTH));
    (f32::from(full) * progress).round() as u16
}
