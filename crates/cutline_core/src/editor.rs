//! The editor facade: one owner for the timeline, its history, the view and
//! the interaction state. Every mutation goes through here so derived state
//! (effective duration, selection, change events) stays in step.

use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::time::Instant;
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::error::{CoreError, Result, Violation};
use crate::history::*;
use crate::interaction::{InteractionState, PendingPress, Tool};
use crate::placement::{resolve_placement, PlacementDecision};
use crate::types::*;
use crate::viewport::{ViewSnapshot, ViewState};

/// Change notifications for consumers holding caches keyed by entity id.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EditorEvent {
    TimelineChanged,
    ClipRemoved { clip_id: ClipId },
    TrackRemoved { track_id: TrackId },
    MediaRemoved { media_id: MediaId },
}

/// Result of a strict `add_clip` request.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AddClipOutcome {
    Added { clip: Clip },
    /// The requested slot is taken; nothing was changed.
    NeedsNewTrack { offset: TimeUs },
}

/// Read-only view of everything a renderer or player needs.
#[derive(Debug, Clone, Serialize)]
pub struct EditorSnapshot {
    pub media: Vec<MediaRef>,
    pub tracks: Vec<Track>,
    /// Ordered by track order, then offset.
    pub clips: Vec<Clip>,
    pub accepted_cuts: Vec<Range>,
    pub preview_cut: Option<Range>,
    pub view: ViewSnapshot,
    pub playhead: f64,
    pub selection: Option<ClipId>,
    pub tool: Tool,
    pub state: InteractionState,
    pub can_undo: bool,
    pub can_redo: bool,
}

type SeekCallback = Box<dyn FnMut(f64) + Send>;

pub struct Editor {
    pub(crate) timeline: Timeline,
    pub(crate) history: History,
    pub(crate) view: ViewState,
    pub(crate) config: EngineConfig,
    pub(crate) selection: Option<ClipId>,
    pub(crate) playhead: f64,
    pub(crate) tool: Tool,
    pub(crate) text_focus: bool,
    pub(crate) state: InteractionState,
    pub(crate) pending: Option<PendingPress>,
    on_seek: Option<SeekCallback>,
    events: Vec<EditorEvent>,
}

impl fmt::Debug for Editor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Editor")
            .field("timeline", &self.timeline)
            .field("history", &self.history)
            .field("view", &self.view)
            .field("selection", &self.selection)
            .field("playhead", &self.playhead)
            .field("tool", &self.tool)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Default for Editor {
    fn default() -> Self {
        Self::new(EngineConfig::default(), 1000.0)
    }
}

impl Editor {
    pub fn new(config: EngineConfig, viewport_width: f64) -> Self {
        let config = config.validated();
        let view = ViewState::new(viewport_width, config.default_duration_secs, &config);
        Self {
            timeline: Timeline::new(),
            history: History::new(config.history_max_len),
            view,
            config,
            selection: None,
            playhead: 0.0,
            tool: Tool::Select,
            text_focus: false,
            state: InteractionState::Idle,
            pending: None,
            on_seek: None,
            events: Vec::new(),
        }
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn view(&self) -> &ViewState {
        &self.view
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn selection(&self) -> Option<ClipId> {
        self.selection
    }

    pub fn playhead(&self) -> f64 {
        self.playhead
    }

    pub fn tool(&self) -> Tool {
        self.tool
    }

    pub fn state(&self) -> &InteractionState {
        &self.state
    }

    pub fn effective_duration(&self) -> f64 {
        self.view.effective_duration()
    }

    pub fn snapshot(&self) -> EditorSnapshot {
        let tracks: Vec<Track> = self.timeline.tracks_sorted().into_iter().cloned().collect();
        let clips = tracks
            .iter()
            .flat_map(|t| self.timeline.clips_on_track(t.id))
            .copied()
            .collect();
        EditorSnapshot {
            media: self.timeline.media.values().cloned().collect(),
            tracks,
            clips,
            accepted_cuts: self.timeline.cuts.accepted().to_vec(),
            preview_cut: self.timeline.cuts.preview(),
            view: self.view.snapshot(),
            playhead: self.playhead,
            selection: self.selection,
            tool: self.tool,
            state: self.state.clone(),
            can_undo: self.history.can_undo(),
            can_redo: self.history.can_redo(),
        }
    }

    /// Take the change notifications accumulated since the last call.
    pub fn drain_events(&mut self) -> Vec<EditorEvent> {
        std::mem::take(&mut self.events)
    }

    // -----------------------------------------------------------------------
    // Playhead, selection, tool
    // -----------------------------------------------------------------------

    /// Called whenever the engine itself moves the playhead (scrub, keys).
    pub fn set_on_seek<F>(&mut self, callback: F)
    where
        F: FnMut(f64) + Send + 'static,
    {
        self.on_seek = Some(Box::new(callback));
    }

    /// Move the playhead from outside, e.g. a player reporting its position.
    /// Does not fire the seek callback. Returns the clamped time.
    pub fn seek(&mut self, t: f64) -> f64 {
        if !t.is_finite() {
            warn!(t, "seek rejected");
            return self.playhead;
        }
        self.playhead = t.clamp(0.0, self.effective_duration());
        self.playhead
    }

    /// Engine-driven playhead move: clamps, keeps it on screen and notifies.
    pub(crate) fn seek_internal(&mut self, t: f64) {
        let before = self.playhead;
        let t = self.seek(t);
        self.view.ensure_visible(t, self.config.visible_margin_fraction);
        if t != before {
            if let Some(callback) = self.on_seek.as_mut() {
                callback(t);
            }
        }
    }

    pub fn select(&mut self, clip_id: Option<ClipId>) {
        self.selection = clip_id.filter(|id| self.timeline.clip(*id).is_some());
    }

    pub fn set_tool(&mut self, tool: Tool) {
        if self.tool != tool {
            self.cancel_interaction();
            debug!(?tool, "tool changed");
            self.tool = tool;
        }
    }

    /// While a text field has focus, keyboard input is ignored.
    pub fn set_text_focus(&mut self, focused: bool) {
        self.text_focus = focused;
    }

    // -----------------------------------------------------------------------
    // View
    // -----------------------------------------------------------------------

    pub fn set_zoom(&mut self, zoom: f64, focal_pixel: Option<f64>, animated: bool) -> bool {
        self.view.set_zoom(zoom, focal_pixel, animated)
    }

    pub fn set_pan(&mut self, pan: f64) -> bool {
        self.view.set_pan(pan)
    }

    pub fn set_viewport_width(&mut self, width: f64) -> bool {
        self.view.set_viewport_width(width)
    }

    /// Drive zoom animation. Returns true while more frames are needed.
    pub fn tick(&mut self, now: Instant) -> bool {
        self.view.tick(now)
    }

    // -----------------------------------------------------------------------
    // Media and tracks
    // -----------------------------------------------------------------------

    /// Register a media reference. Not an undoable edit.
    pub fn add_media(&mut self, media: MediaRef) -> MediaId {
        let id = self.timeline.add_media(media);
        self.after_change();
        id
    }

    /// Remove a media reference and every clip using it, as one undoable step.
    pub fn remove_media(&mut self, media_id: MediaId) -> Result<()> {
        self.commit(Box::new(RemoveMediaCommand::new(media_id)))
    }

    pub fn add_track(&mut self, kind: TrackKind) -> Result<Track> {
        let cmd = AddTrackCommand::new(&self.timeline, kind);
        let track = cmd.track().clone();
        self.commit(Box::new(cmd))?;
        Ok(track)
    }

    /// Remove a track and its clips.
    pub fn remove_track(&mut self, track_id: TrackId) -> Result<()> {
        self.commit(Box::new(RemoveTrackCommand::new(track_id)))
    }

    pub fn rename_track(&mut self, track_id: TrackId, name: impl Into<String>) -> Result<()> {
        self.timeline.rename_track(track_id, name)?;
        self.after_change();
        Ok(())
    }

    pub fn set_track_muted(&mut self, track_id: TrackId, muted: bool) -> Result<()> {
        self.timeline.set_track_muted(track_id, muted)?;
        self.after_change();
        Ok(())
    }

    pub fn set_track_locked(&mut self, track_id: TrackId, locked: bool) -> Result<()> {
        self.timeline.set_track_locked(track_id, locked)?;
        self.after_change();
        Ok(())
    }

    pub fn set_track_enabled(&mut self, track_id: TrackId, enabled: bool) -> Result<()> {
        self.timeline.set_track_enabled(track_id, enabled)?;
        self.after_change();
        Ok(())
    }

    pub fn set_track_volume(&mut self, track_id: TrackId, volume: u8) -> Result<()> {
        self.timeline.set_track_volume(track_id, volume)?;
        self.after_change();
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Clips
    // -----------------------------------------------------------------------

    /// Add a clip exactly where asked. An occupied slot is reported as
    /// `NeedsNewTrack` without touching the timeline; every other violation
    /// is an error.
    pub fn add_clip(
        &mut self,
        media_id: MediaId,
        track_id: TrackId,
        offset: TimeUs,
        start_time: TimeUs,
        end_time: TimeUs,
    ) -> Result<AddClipOutcome> {
        let cmd = AddClipCommand::new(media_id, track_id, offset, start_time, end_time);
        let clip = *cmd.clip();
        match self.timeline.validate_clip(&clip, &[]) {
            Err(CoreError::InvariantViolation(Violation::Overlap { .. })) => {
                debug!(%track_id, %offset, "add_clip slot taken");
                return Ok(AddClipOutcome::NeedsNewTrack { offset });
            }
            Err(e) => {
                warn!(%track_id, error = %e, "add_clip rejected");
                return Err(e);
            }
            Ok(()) => {}
        }
        self.commit(Box::new(cmd))?;
        Ok(AddClipOutcome::Added { clip })
    }

    /// Drop a whole media item near `offset`, on `track_id` when it fits
    /// there, otherwise on a freshly created track of the right kind.
    pub fn place_media(
        &mut self,
        media_id: MediaId,
        track_id: Option<TrackId>,
        offset: TimeUs,
    ) -> Result<Clip> {
        let media = self
            .timeline
            .media(media_id)
            .ok_or(CoreError::MediaNotFound(media_id))?;
        let kind = media.kind;
        let duration = media
            .duration_us
            .unwrap_or_else(|| TimeUs::from_seconds(self.config.default_image_secs));

        let decision = resolve_placement(&self.timeline, kind, offset, track_id, duration, None);
        let clip = |track_id, offset| Clip {
            id: uuid::Uuid::new_v4(),
            media_id,
            track_id,
            start_time: TimeUs::ZERO,
            end_time: duration,
            offset,
        };
        let cmd = match decision {
            PlacementDecision::Place { track_id, offset } => {
                PlaceMediaCommand::on_track(clip(track_id, offset))
            }
            PlacementDecision::NeedsNewTrack { offset } => {
                let track = self.timeline.next_track(kind.track_kind());
                PlaceMediaCommand::with_new_track(track.clone(), clip(track.id, offset))
            }
        };
        let placed = *cmd.clip();
        self.commit(Box::new(cmd))?;
        self.selection = Some(placed.id);
        Ok(placed)
    }

    /// Strict move: fails if the target slot is not valid.
    pub fn move_clip(&mut self, clip_id: ClipId, track_id: TrackId, offset: TimeUs) -> Result<()> {
        self.commit(Box::new(MoveClipCommand::new(clip_id, track_id, offset)))
    }

    /// Move through the placement resolver, creating a track when the
    /// requested slot is taken. Returns the clip as placed.
    pub fn relocate_clip(
        &mut self,
        clip_id: ClipId,
        track_id: Option<TrackId>,
        offset: TimeUs,
    ) -> Result<Clip> {
        let clip = *self
            .timeline
            .clip(clip_id)
            .ok_or(CoreError::ClipNotFound(clip_id))?;
        let kind = self
            .timeline
            .media(clip.media_id)
            .map(|m| m.kind)
            .ok_or(CoreError::MediaNotFound(clip.media_id))?;

        let decision = resolve_placement(
            &self.timeline,
            kind,
            offset,
            track_id,
            clip.content_duration(),
            Some(clip_id),
        );
        let cmd: Box<dyn Command> = match decision {
            PlacementDecision::Place { track_id, offset } => {
                if track_id == clip.track_id && offset == clip.offset {
                    return Ok(clip);
                }
                Box::new(MoveClipCommand::new(clip_id, track_id, offset))
            }
            PlacementDecision::NeedsNewTrack { offset } => {
                let track = self.timeline.next_track(kind.track_kind());
                Box::new(MoveToNewTrackCommand::new(clip_id, track, offset))
            }
        };
        self.commit(cmd)?;
        self.timeline
            .clip(clip_id)
            .copied()
            .ok_or(CoreError::ClipNotFound(clip_id))
    }

    pub fn resize_clip(&mut self, clip_id: ClipId, start_time: TimeUs, end_time: TimeUs) -> Result<()> {
        self.commit(Box::new(ResizeClipCommand::new(clip_id, start_time, end_time)))
    }

    /// Split at timeline time `at`. Returns the left and right halves.
    pub fn split_clip(&mut self, clip_id: ClipId, at: TimeUs) -> Result<(Clip, Clip)> {
        let cmd = SplitClipCommand::new(clip_id, at);
        let right_id = cmd.right_id();
        self.commit(Box::new(cmd))?;
        let left = self.timeline.clip(clip_id).copied();
        let right = self.timeline.clip(right_id).copied();
        left.zip(right).ok_or(CoreError::ClipNotFound(right_id))
    }

    pub fn delete_clip(&mut self, clip_id: ClipId) -> Result<()> {
        self.commit(Box::new(DeleteClipCommand::new(clip_id)))
    }

    // -----------------------------------------------------------------------
    // Cuts
    // -----------------------------------------------------------------------

    pub fn add_cut(&mut self, range: Range) -> Result<()> {
        self.commit(Box::new(AddCutCommand::new(range)))
    }

    pub fn remove_cut(&mut self, index: usize) -> Result<()> {
        self.commit(Box::new(RemoveCutCommand::new(index)))
    }

    pub fn clear_cuts(&mut self) -> Result<()> {
        self.commit(Box::new(ClearCutsCommand::new()))
    }

    /// Tentative range for live feedback. Not recorded in history.
    pub fn set_preview(&mut self, range: Option<Range>) {
        self.timeline.cuts.set_preview(range);
    }

    // -----------------------------------------------------------------------
    // History
    // -----------------------------------------------------------------------

    pub fn undo(&mut self) -> Result<()> {
        self.cancel_interaction();
        let before = Ids::of(&self.timeline);
        self.history.undo(&mut self.timeline)?;
        self.after_edit(before);
        Ok(())
    }

    pub fn redo(&mut self) -> Result<()> {
        self.cancel_interaction();
        let before = Ids::of(&self.timeline);
        self.history.redo(&mut self.timeline)?;
        self.after_edit(before);
        Ok(())
    }

    /// Forget all undo/redo steps, e.g. after loading a saved document.
    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    /// Record an edit. Any gesture still in progress ends first, so a live
    /// resize never outlives the clip it is resizing.
    pub(crate) fn commit(&mut self, cmd: Box<dyn Command>) -> Result<()> {
        self.cancel_interaction();
        let before = Ids::of(&self.timeline);
        if let Err(e) = self.history.execute(cmd, &mut self.timeline) {
            warn!(error = %e, "edit rejected");
            return Err(e);
        }
        self.after_edit(before);
        Ok(())
    }

    fn after_edit(&mut self, before: Ids) {
        let after = Ids::of(&self.timeline);
        for &clip_id in before.clips.difference(&after.clips) {
            self.events.push(EditorEvent::ClipRemoved { clip_id });
        }
        for &track_id in before.tracks.difference(&after.tracks) {
            self.events.push(EditorEvent::TrackRemoved { track_id });
        }
        for &media_id in before.media.difference(&after.media) {
            self.events.push(EditorEvent::MediaRemoved { media_id });
        }
        if self
            .selection
            .is_some_and(|id| self.timeline.clip(id).is_none())
        {
            self.selection = None;
        }
        self.after_change();
    }

    /// Recompute derived state and note that the timeline changed.
    fn after_change(&mut self) {
        self.sync_duration();
        self.events.push(EditorEvent::TimelineChanged);
    }

    /// Effective duration: the longer of the longest registered media and
    /// the content end plus a buffer; the default when there is nothing.
    fn sync_duration(&mut self) {
        let content_end = self.timeline.content_end();
        let longest = self.timeline.longest_media();
        let secs = if content_end == TimeUs::ZERO && longest.is_none() {
            self.config.default_duration_secs
        } else {
            let padded = content_end.as_seconds() + self.config.duration_buffer_secs;
            longest.map_or(padded, |d| d.as_seconds().max(padded))
        };
        if secs != self.view.effective_duration() {
            self.view.set_effective_duration(secs);
        }
        self.playhead = self.playhead.clamp(0.0, self.effective_duration());
    }
}

/// Entity ids present before an edit, for computing removal events.
struct Ids {
    clips: BTreeSet<ClipId>,
    tracks: BTreeSet<TrackId>,
    media: BTreeSet<MediaId>,
}

impl Ids {
    fn of(timeline: &Timeline) -> Self {
        Self {
            clips: timeline.clips.keys().copied().collect(),
            tracks: timeline.tracks.keys().copied().collect(),
            media: timeline.media.keys().copied().collect(),
        }
    }
}
