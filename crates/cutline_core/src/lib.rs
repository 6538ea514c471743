//! Timeline engine for a multi-track, non-linear editor.
//!
//! [`editor::Editor`] is the entry point: it owns the [`types::Timeline`],
//! the edit [`history::History`], the zoom/pan [`viewport::ViewState`] and
//! the pointer/keyboard state machine.

pub mod config;
pub mod cuts;
pub mod editor;
pub mod error;
pub mod history;
pub mod interaction;
pub mod placement;
pub mod timeline;
pub mod types;
pub mod viewport;

pub use config::EngineConfig;
pub use cuts::CutList;
pub use editor::{AddClipOutcome, Editor, EditorEvent, EditorSnapshot};
pub use error::{CoreError, Result, Violation};
pub use interaction::{InputEvent, InteractionState, Tool};
pub use placement::PlacementDecision;
pub use types::{Clip, ClipId, MediaId, MediaKind, MediaRef, Range, TimeUs, Timeline, Track, TrackId, TrackKind};
pub use viewport::{ViewSnapshot, ViewState};
