//! Maps the model's tool calls onto panel state and in-panel actions.
//!
//! The tool names are a contract with the model, not with this crate, so an
//! unknown name is not an error: it routes to nothing.

mod memory;

pub use memory::{HttpVisitorMemory, VisitorFact, VisitorMemorySink};

use crate::types::{Insight, PanelAction, PanelState, PanelType, ThemeChoice};
use serde_json::Value;
use std::sync::Arc;

/// Tools that open (or close) the panel without an in-panel effect.
pub const PANEL_TOOLS: &[&str] = &[
    "show_project",
    "show_projects",
    "compare_projects",
    "show_experience",
    "show_skills",
    "show_education",
    "show_contact",
    "show_resume",
    "show_blog_post",
    "show_blog",
    "play_game",
    "show_insight",
    "hide_panel",
];

/// Tools that act inside a panel and force that panel open.
pub const IN_PANEL_TOOLS: &[&str] = &[
    "scroll_to_experience",
    "highlight_experience",
    "highlight_year",
    "highlight_skill",
    "focus_project_image",
    "highlight_project_field",
    "scroll_to_section",
    "highlight_comparison",
];

pub const THEME_TOOL: &str = "set_theme";
pub const MEMORY_TOOL: &str = "remember_visitor";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RouteResult {
    pub panel_state: Option<PanelState>,
    pub action: Option<PanelAction>,
}

impl RouteResult {
    fn panel(state: PanelState) -> Self {
        Self {
            panel_state: Some(state),
            action: None,
        }
    }

    fn panel_with_action(state: PanelState, action: PanelAction) -> Self {
        Self {
            panel_state: Some(state),
            action: Some(action),
        }
    }

    fn action(action: PanelAction) -> Self {
        Self {
            panel_state: None,
            action: Some(action),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.panel_state.is_none() && self.action.is_none()
    }
}

/// Pure routing: same input, same output, no side effects.
pub fn route_tool_call(name: &str, args: &Value) -> RouteResult {
    match name {
        "show_project" => RouteResult::panel(
            PanelState::opened(PanelType::Project).with_slug(str_arg(args, "slug")),
        ),
        "show_projects" => RouteResult::panel(
            PanelState::opened(PanelType::Projects)
                .with_category(str_arg(args, "category"))
                .with_filter(str_arg(args, "filter")),
        ),
        "compare_projects" => RouteResult::panel(compare_panel(args)),
        "show_experience" => RouteResult::panel(PanelState::opened(PanelType::Experience)),
        "show_skills" => RouteResult::panel(
            PanelState::opened(PanelType::Skills).with_category(str_arg(args, "category")),
        ),
        "show_education" => RouteResult::panel(PanelState::opened(PanelType::Education)),
        "show_contact" => RouteResult::panel(PanelState::opened(PanelType::Contact)),
        "show_resume" => RouteResult::panel(PanelState::opened(PanelType::Resume)),
        "show_blog_post" => RouteResult::panel(
            PanelState::opened(PanelType::BlogPost).with_slug(str_arg(args, "slug")),
        ),
        "show_blog" => RouteResult::panel(
            PanelState::opened(PanelType::Blog).with_filter(str_arg(args, "filter")),
        ),
        "play_game" => RouteResult::panel(
            PanelState::opened(PanelType::Game).with_game(str_arg(args, "game")),
        ),
        "show_insight" => RouteResult::panel(
            PanelState::opened(PanelType::Insight).with_insight(Insight {
                title: str_arg(args, "title").unwrap_or_default(),
                metric: str_arg(args, "metric"),
                value: str_arg(args, "value"),
                detail: str_arg(args, "detail"),
            }),
        ),
        "hide_panel" => RouteResult::panel(PanelState::closed()),

        "scroll_to_experience" => RouteResult::panel_with_action(
            PanelState::opened(PanelType::Experience),
            PanelAction::ScrollToEntry {
                entry: required_str(args, "company"),
            },
        ),
        "highlight_experience" => RouteResult::panel_with_action(
            PanelState::opened(PanelType::Experience),
            PanelAction::HighlightEntry {
                entry: required_str(args, "company"),
            },
        ),
        "highlight_year" => RouteResult::panel_with_action(
            PanelState::opened(PanelType::Experience),
            PanelAction::HighlightYear {
                year: required_str(args, "year"),
            },
        ),
        "highlight_skill" => RouteResult::panel_with_action(
            PanelState::opened(PanelType::Skills).with_category(str_arg(args, "category")),
            PanelAction::HighlightSkill {
                skill: required_str(args, "skill"),
            },
        ),
        "focus_project_image" => {
            let slug = str_arg(args, "slug");
            RouteResult::panel_with_action(
                PanelState::opened(PanelType::Project).with_slug(slug.clone()),
                PanelAction::FocusIndex {
                    slug: slug.unwrap_or_default(),
                    index: index_arg(args, "index").unwrap_or(0),
                },
            )
        }
        "highlight_project_field" => {
            let slug = str_arg(args, "slug");
            RouteResult::panel_with_action(
                PanelState::opened(PanelType::Project).with_slug(slug.clone()),
                PanelAction::HighlightField {
                    slug: slug.unwrap_or_default(),
                    field: required_str(args, "field"),
                },
            )
        }
        "scroll_to_section" => {
            let slug = str_arg(args, "slug");
            RouteResult::panel_with_action(
                PanelState::opened(PanelType::BlogPost).with_slug(slug.clone()),
                PanelAction::ScrollToSection {
                    slug: slug.unwrap_or_default(),
                    section: required_str(args, "section"),
                },
            )
        }
        "highlight_comparison" => RouteResult::panel_with_action(
            compare_panel(args),
            PanelAction::HighlightRow {
                field: required_str(args, "field"),
            },
        ),

        THEME_TOOL => RouteResult::action(PanelAction::ThemeChange {
            theme: ThemeChoice::parse(args.get("theme").and_then(Value::as_str)),
        }),
        MEMORY_TOOL => RouteResult::default(),

        unknown => {
            tracing::debug!(tool = unknown, "unrecognized tool call; ignoring");
            RouteResult::default()
        }
    }
}

/// Router bound to one chat session, with the visitor-memory side effect.
#[derive(Clone)]
pub struct ToolCallRouter {
    session_id: String,
    memory: Option<Arc<dyn VisitorMemorySink>>,
}

impl ToolCallRouter {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            memory: None,
        }
    }

    pub fn with_memory(mut self, memory: Arc<dyn VisitorMemorySink>) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Route a call. `remember_visitor` hands its fact to the memory sink and
    /// returns immediately; the sink's outcome never reaches the result.
    pub fn route(&self, name: &str, args: &Value) -> RouteResult {
        if name == MEMORY_TOOL {
            match &self.memory {
                Some(memory) => memory.remember(&self.session_id, VisitorFact::from_args(args)),
                None => tracing::debug!("visitor memory not configured; dropping fact"),
            }
            return RouteResult::default();
        }
        route_tool_call(name, args)
    }
}

fn compare_panel(args: &Value) -> PanelState {
    PanelState::opened(PanelType::Compare)
        .with_slug(str_arg(args, "slug"))
        .with_slug2(str_arg(args, "slug2"))
}

/// Non-empty trimmed string argument. Numbers are accepted and rendered,
/// since models sometimes send `"year": 2021`.
fn str_arg(args: &Value, key: &str) -> Option<String> {
    match args.get(key)? {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn required_str(args: &Value, key: &str) -> String {
    str_arg(args, key).unwrap_or_default()
}

fn index_arg(args: &Value, key: &str) -> Option<usize> {
    match args.get(key)? {
        Value::Number(n) => n.as_u64().and_then(|n| usize::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
