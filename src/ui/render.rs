use crate::state::{Role, Theme, TranscriptEntry};
use crate::types::{PanelAction, PanelState};
use crate::ui::text::{input_window, truncate_with_ellipsis, wrap_lines};
use ratatui::{
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Frame,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Palette {
    pub background: Color,
    pub text: Color,
    pub muted: Color,
    pub user: Color,
    pub tool: Color,
    pub error: Color,
    pub accent: Color,
    pub input_bg: Color,
}

impl Palette {
    pub fn for_theme(theme: Theme) -> Self {
        match theme {
            Theme::Dark => Self {
                background: Color::Rgb(18, 18, 18),
                text: Color::Gray,
                muted: Color::DarkGray,
                user: Color::Cyan,
                tool: Color::Magenta,
                error: Color::LightRed,
                accent: Color::Yellow,
                input_bg: Color::Rgb(30, 30, 30),
            },
            Theme::Light => Self {
                background: Color::Rgb(246, 246, 240),
                text: Color::Black,
                muted: Color::Rgb(110, 110, 110),
                user: Color::Blue,
                tool: Color::Rgb(140, 40, 140),
                error: Color::Red,
                accent: Color::Rgb(180, 100, 0),
                input_bg: Color::Rgb(228, 228, 220),
            },
        }
    }
}

pub fn render_header(frame: &mut Frame<'_>, area: Rect, title: &str, palette: Palette) {
    if area.height == 0 || area.width == 0 {
        return;
    }
    frame.render_widget(
        Paragraph::new(truncate_with_ellipsis(title, area.width as usize)).style(
            Style::default()
                .fg(palette.accent)
                .bg(palette.background)
                .add_modifier(Modifier::BOLD),
        ),
        area,
    );
}

/// Wrapped transcript rows, oldest first.
pub fn transcript_lines(entries: &[TranscriptEntry], width: usize, palette: Palette) -> Vec<Line<'static>> {
    let mut lines = Vec::new();
    for entry in entries {
        let (prefix, style) = match entry.role {
            Role::User => ("> ", Style::default().fg(palette.user).add_modifier(Modifier::BOLD)),
            Role::Assistant => ("", Style::default().fg(palette.text)),
            Role::Tool => ("* ", Style::default().fg(palette.tool)),
            Role::Error => ("! ", Style::default().fg(palette.error)),
        };
        let mut content = format!("{prefix}{}", entry.content);
        if entry.retryable {
            content.push_str("  (Ctrl+R to retry)");
        }
        for row in wrap_lines(&content, width) {
            lines.push(Line::styled(row, style));
        }
        if entry.role == Role::Assistant {
            lines.push(Line::from(""));
        }
    }
    lines
}

/// `scroll_back` counts rows up from the newest; zero follows the tail.
pub fn render_transcript(
    frame: &mut Frame<'_>,
    area: Rect,
    entries: &[TranscriptEntry],
    scroll_back: usize,
    palette: Palette,
) {
    if area.height == 0 || area.width == 0 {
        return;
    }
    let lines = transcript_lines(entries, area.width as usize, palette);
    let height = area.height as usize;
    let max_back = lines.len().saturating_sub(height);
    let start = max_back - scroll_back.min(max_back);
    let visible: Vec<Line<'static>> = lines.into_iter().skip(start).take(height).collect();

    frame.render_widget(
        Paragraph::new(visible).style(Style::default().bg(palette.background)),
        area,
    );
}

/// Rows shown inside the side panel for a given state and the actions
/// delivered to it so far.
pub fn panel_lines(state: &PanelState, effects: &[PanelAction]) -> Vec<String> {
    let mut lines = Vec::new();
    let fields = [
        ("slug", &state.slug),
        ("vs", &state.slug2),
        ("category", &state.category),
        ("filter", &state.filter),
        ("game", &state.game),
    ];
    for (label, value) in fields {
        if let Some(value) = value {
            lines.push(format!("{label}: {value}"));
        }
    }
    if let Some(insight) = &state.insight {
        lines.push(insight.title.clone());
        if let Some(metric) = &insight.metric {
            let value = insight.value.as_deref().unwrap_or("-");
            lines.push(format!("{metric}: {value}"));
        }
        if let Some(detail) = &insight.detail {
            lines.push(detail.clone());
        }
    }
    if !effects.is_empty() {
        lines.push(String::new());
        for (index, effect) in effects.iter().enumerate() {
            let marker = if index + 1 == effects.len() { ">" } else { " " };
            lines.push(format!("{marker} {}", effect.describe()));
        }
    }
    lines
}

pub fn render_panel(
    frame: &mut Frame<'_>,
    area: Rect,
    state: &PanelState,
    effects: &[PanelAction],
    palette: Palette,
) {
    if area.width < 3 || area.height < 3 {
        return;
    }
    let title = state
        .panel_type()
        .map(|panel_type| panel_type.label())
        .unwrap_or_default();
    let block = Block::default()
        .borders(Borders::LEFT | Borders::TOP | Borders::BOTTOM)
        .title(Span::styled(
            format!(" {title} "),
            Style::default().fg(palette.accent).add_modifier(Modifier::BOLD),
        ))
        .style(Style::default().fg(palette.muted).bg(palette.background));
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let width = inner.width as usize;
    let content = panel_lines(state, effects);
    let last_effect_row = if effects.is_empty() {
        None
    } else {
        content.len().checked_sub(1)
    };
    let rows: Vec<Line<'static>> = content
        .into_iter()
        .enumerate()
        .map(|(index, row)| {
            let style = if Some(index) == last_effect_row {
                Style::default().fg(palette.accent).add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(palette.text)
            };
            Line::styled(truncate_with_ellipsis(&row, width), style)
        })
        .collect();
    frame.render_widget(Paragraph::new(rows), inner);
}

pub fn render_status_line(frame: &mut Frame<'_>, area: Rect, status: &str, palette: Palette) {
    if area.height == 0 || area.width == 0 {
        return;
    }
    frame.render_widget(
        Paragraph::new(truncate_with_ellipsis(status, area.width as usize))
            .style(Style::default().fg(palette.muted).bg(palette.background)),
        area,
    );
}

pub fn render_input(
    frame: &mut Frame<'_>,
    area: Rect,
    input: &str,
    cursor_byte: usize,
    palette: Palette,
) {
    if area.height == 0 || area.width <= 2 {
        return;
    }
    let width = area.width.saturating_sub(2) as usize;
    let (visible, column) = input_window(input, cursor_byte, width);
    frame.render_widget(
        Paragraph::new(format!("> {visible}"))
            .style(Style::default().fg(palette.text).bg(palette.input_bg)),
        area,
    );
    let cursor_x = area
        .x
        .saturating_add(2 + column as u16)
        .min(area.x.saturating_add(area.width.saturating_sub(1)));
    frame.set_cursor_position((cursor_x, area.y));
}
