use thiserror::Error;

use crate::types::{ClipId, MediaId, TimeUs, TrackId};

/// The invariant a rejected mutation would have broken.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Violation {
    #[error("media kind {media:?} cannot be placed on a {track:?} track")]
    KindMismatch {
        media: crate::types::MediaKind,
        track: crate::types::TrackKind,
    },

    #[error("clip overlaps clip {other} on track {track}")]
    Overlap { track: TrackId, other: ClipId },

    #[error("time out of range: {0}")]
    OutOfRange(String),

    #[error("track does not exist: {0}")]
    DanglingTrack(TrackId),

    #[error("media does not exist: {0}")]
    DanglingMedia(MediaId),

    #[error("track is locked: {0}")]
    TrackLocked(TrackId),

    #[error("invalid range {start}..{end}")]
    InvalidRange { start: TimeUs, end: TimeUs },
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invariant violation: {0}")]
    InvariantViolation(#[from] Violation),

    #[error("Clip not found: {0}")]
    ClipNotFound(ClipId),

    #[error("Track not found: {0}")]
    TrackNotFound(TrackId),

    #[error("Media not found: {0}")]
    MediaNotFound(MediaId),

    #[error("split point {at} is outside clip interval {start}..{end}")]
    SplitOutOfRange {
        at: TimeUs,
        start: TimeUs,
        end: TimeUs,
    },

    #[error("cut index {index} out of bounds ({len} cuts)")]
    CutNotFound { index: usize, len: usize },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("Nothing to undo")]
    NothingToUndo,

    #[error("Nothing to redo")]
    NothingToRedo,

    #[error("could not replay \"{description}\": {source}")]
    HistoryReplay {
        description: String,
        #[source]
        source: Box<CoreError>,
    },
}

impl CoreError {
    /// The violated invariant, if this error is one.
    pub fn violation(&self) -> Option<&Violation> {
        match self {
            CoreError::InvariantViolation(v) => Some(v),
            CoreError::HistoryReplay { source, .. } => source.violation(),
            _ => None,
        }
    }

    /// Boundary errors from undo/redo that callers usually ignore.
    pub fn is_history_boundary(&self) -> bool {
        matches!(self, CoreError::NothingToUndo | CoreError::NothingToRedo)
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
