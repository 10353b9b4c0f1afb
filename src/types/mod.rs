pub mod api;
pub mod panel;

pub use api::{
    ApiMessage, ChatChunk, ChunkChoice, ChunkDelta, FunctionFragment, ProviderError, StreamEvent,
    ToolCallFragment,
};
pub use panel::{Insight, PanelAction, PanelState, PanelType, ThemeChoice};
