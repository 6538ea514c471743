use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::ops::{Add, Sub};
use std::path::PathBuf;
use uuid::Uuid;

use crate::cuts::CutList;

pub type MediaId = Uuid;
pub type TrackId = Uuid;
pub type ClipId = Uuid;

// ---------------------------------------------------------------------------
// TimeUs
// ---------------------------------------------------------------------------

/// Timeline or source time in whole microseconds.
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
pub struct TimeUs(pub i64);

impl TimeUs {
    pub const ZERO: Self = Self(0);

    /// Largest magnitude `from_seconds` produces, about 31 years. Sums of two
    /// such values stay far from `i64` overflow.
    pub const LIMIT_SECS: f64 = 1.0e9;

    /// Converts seconds, rounding to the nearest microsecond and clamping to
    /// `±LIMIT_SECS`. Non-finite input maps to zero.
    pub fn from_seconds(s: f64) -> Self {
        if !s.is_finite() {
            return Self::ZERO;
        }
        let s = s.clamp(-Self::LIMIT_SECS, Self::LIMIT_SECS);
        Self((s * 1_000_000.0).round() as i64)
    }

    pub fn as_seconds(&self) -> f64 {
        self.0 as f64 / 1_000_000.0
    }
}

impl Add for TimeUs {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }
}

impl Sub for TimeUs {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self(self.0.saturating_sub(rhs.0))
    }
}

impl fmt::Display for TimeUs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let total_us = self.0.unsigned_abs();
        let total_ms = total_us / 1_000;
        let ms = total_ms % 1_000;
        let total_secs = total_ms / 1_000;
        let secs = total_secs % 60;
        let total_mins = total_secs / 60;
        let mins = total_mins % 60;
        let hours = total_mins / 60;
        if self.0 < 0 {
            write!(f, "-{:02}:{:02}:{:02}.{:03}", hours, mins, secs, ms)
        } else {
            write!(f, "{:02}:{:02}:{:02}.{:03}", hours, mins, secs, ms)
        }
    }
}

// ---------------------------------------------------------------------------
// MediaKind / TrackKind
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Video,
    Audio,
    Image,
}

impl MediaKind {
    /// The kind of track this media lives on. Stills share video tracks.
    pub fn track_kind(&self) -> TrackKind {
        match self {
            MediaKind::Video | MediaKind::Image => TrackKind::Video,
            MediaKind::Audio => TrackKind::Audio,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TrackKind {
    Video,
    Audio,
}

impl TrackKind {
    pub fn accepts(&self, media: MediaKind) -> bool {
        media.track_kind() == *self
    }
}

// ---------------------------------------------------------------------------
// ProbeResult / MediaRef
// ---------------------------------------------------------------------------

/// Facts reported by the probing collaborator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProbeResult {
    pub duration_us: TimeUs,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub audio_rate: u32,
    pub audio_channels: u8,
    pub video_codec: String,
    pub audio_codec: String,
    pub container: String,
}

/// An external media source. `duration_us` is `None` for stills.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MediaRef {
    pub id: MediaId,
    pub name: String,
    pub path: PathBuf,
    pub kind: MediaKind,
    pub duration_us: Option<TimeUs>,
    #[serde(default)]
    pub probe: Option<ProbeResult>,
}

impl MediaRef {
    pub fn new(
        name: impl Into<String>,
        path: impl Into<PathBuf>,
        kind: MediaKind,
        duration_us: Option<TimeUs>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            path: path.into(),
            kind,
            duration_us,
            probe: None,
        }
    }

    /// Builds a reference from a probe; the probe's duration becomes authoritative.
    pub fn from_probe(
        name: impl Into<String>,
        path: impl Into<PathBuf>,
        kind: MediaKind,
        probe: ProbeResult,
    ) -> Self {
        let duration_us = match kind {
            MediaKind::Image => None,
            MediaKind::Video | MediaKind::Audio => Some(probe.duration_us),
        };
        Self {
            probe: Some(probe),
            ..Self::new(name, path, kind, duration_us)
        }
    }
}

// ---------------------------------------------------------------------------
// Track
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Track {
    pub id: TrackId,
    pub kind: TrackKind,
    /// Vertical stacking; unique, not necessarily contiguous.
    pub order: i32,
    pub name: String,
    pub muted: bool,
    pub locked: bool,
    pub enabled: bool,
    /// 0-100, only meaningful for audio tracks.
    pub volume: u8,
}

// ---------------------------------------------------------------------------
// Clip
// ---------------------------------------------------------------------------

/// A placed piece of media. `start_time`/`end_time` are source in/out points,
/// `offset` is the timeline position.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Clip {
    pub id: ClipId,
    pub media_id: MediaId,
    pub track_id: TrackId,
    pub start_time: TimeUs,
    pub end_time: TimeUs,
    pub offset: TimeUs,
}

impl Clip {
    pub fn content_duration(&self) -> TimeUs {
        self.end_time - self.start_time
    }

    pub fn timeline_start(&self) -> TimeUs {
        self.offset
    }

    pub fn timeline_end(&self) -> TimeUs {
        self.offset + self.content_duration()
    }

    /// Half-open interval intersection; touching clips do not overlap.
    pub fn overlaps(&self, start: TimeUs, end: TimeUs) -> bool {
        start < self.timeline_end() && end > self.timeline_start()
    }

    /// Strictly inside the clip, i.e. a valid split point.
    pub fn contains_strictly(&self, t: TimeUs) -> bool {
        self.timeline_start() < t && t < self.timeline_end()
    }
}

// ---------------------------------------------------------------------------
// Range
// ---------------------------------------------------------------------------

/// A cut: a timeline interval marked for removal from the composition.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Range {
    pub start: TimeUs,
    pub end: TimeUs,
}

impl Range {
    pub fn new(start: TimeUs, end: TimeUs) -> Self {
        Self { start, end }
    }

    pub fn from_seconds(start: f64, end: f64) -> Self {
        Self::new(TimeUs::from_seconds(start), TimeUs::from_seconds(end))
    }

    /// Orders the endpoints so `start <= end`.
    pub fn normalized(self) -> Self {
        if self.end < self.start {
            Self::new(self.end, self.start)
        } else {
            self
        }
    }

    pub fn duration(&self) -> TimeUs {
        self.end - self.start
    }

    pub fn is_well_formed(&self) -> bool {
        self.start >= TimeUs::ZERO && self.start < self.end
    }

    /// Overlapping or sharing an endpoint.
    pub fn touches(&self, other: &Range) -> bool {
        self.start <= other.end && other.start <= self.end
    }
}

// ---------------------------------------------------------------------------
// Timeline
// ---------------------------------------------------------------------------

/// The edit document: media registry, tracks, clips and cuts.
///
/// Entities live in id-keyed maps; clips refer to tracks and media by id only.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Timeline {
    pub media: BTreeMap<MediaId, MediaRef>,
    pub tracks: BTreeMap<TrackId, Track>,
    pub clips: BTreeMap<ClipId, Clip>,
    pub cuts: CutList,
}
