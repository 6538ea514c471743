//! Cut ranges: a single tentative preview plus the committed pool.
//!
//! Accepted cuts are kept sorted and disjoint. An inserted cut that overlaps
//! or touches existing cuts is merged with them into one covering range.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CoreError, Result, Violation};
use crate::types::{Range, TimeUs};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CutList {
    accepted: Vec<Range>,
    preview: Option<Range>,
}

impl CutList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn accepted(&self) -> &[Range] {
        &self.accepted
    }

    pub fn preview(&self) -> Option<Range> {
        self.preview
    }

    pub fn len(&self) -> usize {
        self.accepted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accepted.is_empty()
    }

    /// Insert a committed cut, merging it with any cut it overlaps or touches.
    /// Returns the index of the resulting range.
    pub fn add_cut(&mut self, range: Range) -> Result<usize> {
        if !range.is_well_formed() {
            return Err(Violation::InvalidRange {
                start: range.start,
                end: range.end,
            }
            .into());
        }

        let mut merged = range;
        let mut kept = Vec::with_capacity(self.accepted.len() + 1);
        for existing in self.accepted.drain(..) {
            if existing.touches(&merged) {
                merged = Range::new(
                    merged.start.min(existing.start),
                    merged.end.max(existing.end),
                );
            } else {
                kept.push(existing);
            }
        }

        let index = kept
            .iter()
            .position(|r| r.start > merged.start)
            .unwrap_or(kept.len());
        kept.insert(index, merged);
        self.accepted = kept;

        debug!(
            start = %merged.start,
            end = %merged.end,
            count = self.accepted.len(),
            "cut accepted"
        );
        Ok(index)
    }

    pub fn remove_cut(&mut self, index: usize) -> Result<Range> {
        if index >= self.accepted.len() {
            return Err(CoreError::CutNotFound {
                index,
                len: self.accepted.len(),
            });
        }
        Ok(self.accepted.remove(index))
    }

    /// Drop every accepted cut, returning them.
    pub fn clear_all_cuts(&mut self) -> Vec<Range> {
        std::mem::take(&mut self.accepted)
    }

    /// Replace the tentative range shown while a selection is in progress.
    pub fn set_preview(&mut self, range: Option<Range>) {
        self.preview = range.map(Range::normalized);
    }

    /// Overwrite the accepted pool wholesale. Used to restore history snapshots.
    pub(crate) fn restore_accepted(&mut self, accepted: Vec<Range>) {
        self.accepted = accepted;
    }

    /// Accepted pool is sorted, disjoint and well formed.
    pub fn is_consistent(&self) -> bool {
        self.accepted.iter().all(Range::is_well_formed)
            && self
                .accepted
                .windows(2)
                .all(|pair| pair[0].end < pair[1].start)
    }

    pub fn total_cut_duration(&self) -> TimeUs {
        self.accepted
            .iter()
            .fold(TimeUs::ZERO, |acc, r| acc + r.duration())
    }

    /// The parts of `[0, duration]` that survive the accepted cuts.
    pub fn kept_segments(&self, duration: TimeUs) -> Vec<Range> {
        if duration <= TimeUs::ZERO {
            return vec![];
        }
        let mut kept = Vec::new();
        let mut t = TimeUs::ZERO;
        for cut in &self.accepted {
            if cut.start >= duration {
                break;
            }
            if cut.start > t {
                kept.push(Range::new(t, cut.start));
            }
            t = t.max(cut.end);
        }
        if t < duration {
            kept.push(Range::new(t, duration));
        }
        kept
    }

    /// Accepted cuts as `(start, end)` seconds, the shape the export collaborator takes.
    pub fn as_seconds_pairs(&self) -> Vec<(f64, f64)> {
        self.accepted
            .iter()
            .map(|r| (r.start.as_seconds(), r.end.as_seconds()))
            .collect()
    }
}
