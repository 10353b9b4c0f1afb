use crate::types::ThemeChoice;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Theme {
    Light,
    #[default]
    Dark,
}

impl Theme {
    pub fn name(self) -> &'static str {
        match self {
            Theme::Light => "light",
            Theme::Dark => "dark",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "light" => Some(Theme::Light),
            "dark" => Some(Theme::Dark),
            _ => None,
        }
    }

    fn toggled(self) -> Self {
        match self {
            Theme::Light => Theme::Dark,
            Theme::Dark => Theme::Light,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ThemePreference {
    current: Theme,
    path: Option<PathBuf>,
}

impl ThemePreference {
    pub fn new(current: Theme, path: Option<PathBuf>) -> Self {
        Self { current, path }
    }

    /// Read the stored theme once. A missing or unreadable file falls back
    /// to the default without failing startup.
    pub fn load_initial(path: Option<PathBuf>) -> Self {
        let current = path
            .as_deref()
            .and_then(read_theme_file)
            .unwrap_or_default();
        Self { current, path }
    }

    pub fn current(&self) -> Theme {
        self.current
    }

    /// Apply a choice and return the resulting theme. Persistence is
    /// started only when the theme actually changed.
    pub fn apply(&mut self, choice: ThemeChoice) -> Theme {
        let next = match choice {
            ThemeChoice::Light => Theme::Light,
            ThemeChoice::Dark => Theme::Dark,
            ThemeChoice::Toggle => self.current.toggled(),
        };
        if next != self.current {
            self.current = next;
            tracing::info!(theme = next.name(), "theme changed");
            self.persist();
        }
        self.current
    }

    /// Fire-and-forget write of the current theme. Errors are logged only.
    pub fn persist(&self) {
        let Some(path) = self.path.clone() else {
            return;
        };
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(path = %path.display(), "no async runtime; theme not persisted");
            return;
        };
        let name = self.current.name();
        handle.spawn(async move {
            if let Err(error) = tokio::fs::write(&path, name).await {
                tracing::warn!(path = %path.display(), %error, "failed to persist theme");
            }
        });
    }
}

fn read_theme_file(path: &Path) -> Option<Theme> {
    match std::fs::read_to_string(path) {
        Ok(contents) => {
            let theme = Theme::parse(&contents);
            if theme.is_none() {
                tracing::warn!(path = %path.display(), "ignoring unrecognized stored theme");
            }
            theme
        }
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => None,
        Err(error) => {
            tracing::warn!(path = %path.display(), %error, "failed to read stored theme");
            None
        }
    }
}
