pub mod panel;
pub mod session;
pub mod theme;
pub mod transcript;

pub use panel::{BoxedActionHandler, PanelController, DEFAULT_PANEL_TRANSITION};
pub use session::{ChatSession, TurnId, UiUpdate};
pub use theme::{Theme, ThemePreference};
pub use transcript::{Role, Transcript, TranscriptEntry, INTERRUPTED_NOTICE};
