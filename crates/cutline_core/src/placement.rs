//! Drop/move placement: exact position on the requested track, or a new track.
//!
//! Conflicts are never resolved by shifting the clip in time.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::*;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PlacementDecision {
    /// Place on this track at exactly this offset.
    Place { track_id: TrackId, offset: TimeUs },
    /// Create a track of the media's kind first, then place there.
    NeedsNewTrack { offset: TimeUs },
}

impl PlacementDecision {
    pub fn offset(&self) -> TimeUs {
        match self {
            PlacementDecision::Place { offset, .. } | PlacementDecision::NeedsNewTrack { offset } => {
                *offset
            }
        }
    }

    pub fn needs_new_track(&self) -> bool {
        matches!(self, PlacementDecision::NeedsNewTrack { .. })
    }
}

/// Decide where a clip of `media_kind` lasting `content_duration` goes.
///
/// `moving` names a clip already on the timeline that should not collide
/// with itself (internal drags).
pub fn resolve_placement(
    timeline: &Timeline,
    media_kind: MediaKind,
    requested_offset: TimeUs,
    requested_track: Option<TrackId>,
    content_duration: TimeUs,
    moving: Option<ClipId>,
) -> PlacementDecision {
    let offset = requested_offset.max(TimeUs::ZERO);
    let wanted = media_kind.track_kind();

    let has_compatible = timeline.tracks.values().any(|t| t.kind == wanted);
    if !has_compatible {
        debug!(?media_kind, "no compatible track, new track needed");
        return PlacementDecision::NeedsNewTrack { offset };
    }

    let Some(track) = requested_track
        .and_then(|id| timeline.track(id))
        .filter(|t| t.kind == wanted && !t.locked)
    else {
        return PlacementDecision::NeedsNewTrack { offset };
    };

    let end = offset + content_duration;
    let conflict = timeline
        .clips
        .values()
        .filter(|c| c.track_id == track.id && Some(c.id) != moving)
        .any(|c| c.overlaps(offset, end));

    if conflict {
        debug!(track_id = %track.id, offset = %offset, "placement conflict, new track needed");
        PlacementDecision::NeedsNewTrack { offset }
    } else {
        PlacementDecision::Place {
            track_id: track.id,
            offset,
        }
    }
}

/// Vertical layout of track rows below the ruler band.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct RowLayout {
    pub ruler_height: f64,
    pub track_height: f64,
}

impl RowLayout {
    /// Top edge of the row at display index `row`.
    pub fn row_top(&self, row: usize) -> f64 {
        self.ruler_height + row as f64 * self.track_height
    }

    pub fn row_center(&self, row: usize) -> f64 {
        self.row_top(row) + self.track_height / 2.0
    }

    /// Display row under `y`, if any. The ruler band is not a row.
    pub fn row_at(&self, y: f64, row_count: usize) -> Option<usize> {
        if y < self.ruler_height || self.track_height <= 0.0 {
            return None;
        }
        let row = ((y - self.ruler_height) / self.track_height).floor() as usize;
        (row < row_count).then_some(row)
    }

    pub fn in_ruler(&self, y: f64) -> bool {
        (0.0..self.ruler_height).contains(&y)
    }
}

/// The compatible, unlocked track whose row center is nearest to `y`.
pub fn nearest_compatible_track(
    timeline: &Timeline,
    layout: &RowLayout,
    media_kind: MediaKind,
    y: f64,
) -> Option<TrackId> {
    let wanted = media_kind.track_kind();
    timeline
        .tracks_sorted()
        .iter()
        .enumerate()
        .filter(|(_, t)| t.kind == wanted && !t.locked)
        .map(|(row, t)| (t.id, (layout.row_center(row) - y).abs()))
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(id, _)| id)
}
