use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PanelType {
    Project,
    Projects,
    Compare,
    Experience,
    Skills,
    Education,
    Contact,
    Resume,
    BlogPost,
    Blog,
    Game,
    Insight,
}

impl PanelType {
    pub fn label(self) -> &'static str {
        match self {
            PanelType::Project => "Project",
            PanelType::Projects => "Projects",
            PanelType::Compare => "Compare",
            PanelType::Experience => "Experience",
            PanelType::Skills => "Skills",
            PanelType::Education => "Education",
            PanelType::Contact => "Contact",
            PanelType::Resume => "Resume",
            PanelType::BlogPost => "Blog post",
            PanelType::Blog => "Blog",
            PanelType::Game => "Game",
            PanelType::Insight => "Insight",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Insight {
    pub title: String,
    pub metric: Option<String>,
    pub value: Option<String>,
    pub detail: Option<String>,
}

/// Side panel state. A panel is open exactly when it has a type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PanelState {
    panel_type: Option<PanelType>,
    pub slug: Option<String>,
    pub slug2: Option<String>,
    pub category: Option<String>,
    pub filter: Option<String>,
    pub game: Option<String>,
    pub insight: Option<Insight>,
}

impl PanelState {
    pub fn closed() -> Self {
        Self::default()
    }

    pub fn opened(panel_type: PanelType) -> Self {
        Self {
            panel_type: Some(panel_type),
            ..Self::default()
        }
    }

    pub fn is_open(&self) -> bool {
        self.panel_type.is_some()
    }

    pub fn panel_type(&self) -> Option<PanelType> {
        self.panel_type
    }

    pub fn with_slug(mut self, slug: Option<String>) -> Self {
        self.slug = slug;
        self
    }

    pub fn with_slug2(mut self, slug2: Option<String>) -> Self {
        self.slug2 = slug2;
        self
    }

    pub fn with_category(mut self, category: Option<String>) -> Self {
        self.category = category;
        self
    }

    pub fn with_filter(mut self, filter: Option<String>) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_game(mut self, game: Option<String>) -> Self {
        self.game = game;
        self
    }

    pub fn with_insight(mut self, insight: Insight) -> Self {
        self.insight = Some(insight);
        self
    }

    pub fn describe(&self) -> String {
        let Some(panel_type) = self.panel_type else {
            return "panel closed".to_string();
        };
        let mut description = format!("{} panel", panel_type.label());
        let target = [&self.slug, &self.slug2, &self.game, &self.category, &self.filter]
            .into_iter()
            .flatten()
            .map(String::as_str)
            .collect::<Vec<_>>();
        if !target.is_empty() {
            description.push_str(": ");
            description.push_str(&target.join(" / "));
        }
        if let Some(insight) = &self.insight {
            description.push_str(": ");
            description.push_str(&insight.title);
        }
        description
    }

    /// Lay this patch over the panel already on screen. Fields the patch
    /// leaves unset keep their current values when both show the same panel
    /// type; any other patch replaces the state.
    pub fn merged_over(self, current: &PanelState) -> PanelState {
        if !self.is_open() || self.panel_type != current.panel_type {
            return self;
        }
        PanelState {
            panel_type: self.panel_type,
            slug: self.slug.or_else(|| current.slug.clone()),
            slug2: self.slug2.or_else(|| current.slug2.clone()),
            category: self.category.or_else(|| current.category.clone()),
            filter: self.filter.or_else(|| current.filter.clone()),
            game: self.game.or_else(|| current.game.clone()),
            insight: self.insight.or_else(|| current.insight.clone()),
        }
    }

    /// True when both states show the same content: same type and the same
    /// primary identifiers. Actions queued for one are valid for the other.
    pub fn same_target(&self, other: &PanelState) -> bool {
        self.panel_type == other.panel_type && self.slug == other.slug && self.slug2 == other.slug2
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThemeChoice {
    Light,
    Dark,
    Toggle,
}

impl ThemeChoice {
    /// Unknown or missing names mean "flip the current theme".
    pub fn parse(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            Some("light") => ThemeChoice::Light,
            Some("dark") => ThemeChoice::Dark,
            _ => ThemeChoice::Toggle,
        }
    }
}

/// Effect to run inside an already-open panel, or on global UI state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PanelAction {
    ScrollToEntry { entry: String },
    HighlightEntry { entry: String },
    HighlightYear { year: String },
    HighlightSkill { skill: String },
    FocusIndex { slug: String, index: usize },
    HighlightField { slug: String, field: String },
    ScrollToSection { slug: String, section: String },
    HighlightRow { field: String },
    ThemeChange { theme: ThemeChoice },
}

impl PanelAction {
    /// Whether the action needs an open panel. Theme changes apply globally.
    pub fn targets_panel(&self) -> bool {
        !matches!(self, PanelAction::ThemeChange { .. })
    }

    pub fn describe(&self) -> String {
        match self {
            PanelAction::ScrollToEntry { entry } => format!("scroll to {entry}"),
            PanelAction::HighlightEntry { entry } => format!("highlight {entry}"),
            PanelAction::HighlightYear { year } => format!("highlight year {year}"),
            PanelAction::HighlightSkill { skill } => format!("highlight skill {skill}"),
            PanelAction::FocusIndex { slug, index } => format!("focus {slug} image #{index}"),
            PanelAction::HighlightField { slug, field } => format!("highlight {slug}.{field}"),
            PanelAction::ScrollToSection { slug, section } => {
                format!("scroll {slug} to section {section}")
            }
            PanelAction::HighlightRow { field } => format!("highlight row {field}"),
            PanelAction::ThemeChange { theme } => format!("theme {theme:?}"),
        }
    }
}
