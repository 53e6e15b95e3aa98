//! Marginalia Core Library
//!
//! Platform-agnostic ink model for annotating documents: strokes grouped by
//! attempt, the gesture state machine, undo/redo and persistence plumbing.

pub mod config;
pub mod geometry;
pub mod gesture;
pub mod history;
pub mod input;
pub mod repository;
pub mod selection;
pub mod store;
pub mod stroke;
pub mod time;
pub mod tools;
pub mod viewport;

pub use config::{ConfigError, ExportConfig, ExportFormat, GestureConfig, InkConfig};
pub use gesture::{GestureMachine, GestureMode, Redraw};
pub use history::{Command, History};
pub use input::{PointerInput, PointerKind};
pub use repository::{InkRepository, MemoryRepository, PersistOutbox, RepositoryError, RepositoryResult};
pub use selection::{AttemptCard, Selection, TranslateTarget};
pub use store::{Hydration, HydrationTicket, InkContext, InkStore, StoreError};
pub use stroke::{AttemptId, DocumentId, InkPoint, SessionId, Stroke, StrokeError, StrokeId, StrokeOwner};
pub use tools::{BrushKind, BrushStyle, InkColor, Tool, ToolSettings};
pub use viewport::Viewport;

#[cfg(not(target_arch = "wasm32"))]
pub use repository::FileRepository;
