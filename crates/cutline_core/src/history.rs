use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{CoreError, Result};
use crate::types::*;

/// A command that can be executed, undone, and described.
///
/// `execute` captures whatever it needs to invert itself, so it must run
/// before `undo`. Both may run again on redo.
pub trait Command: std::fmt::Debug + Send {
    fn execute(&mut self, timeline: &mut Timeline) -> Result<()>;
    fn undo(&mut self, timeline: &mut Timeline) -> Result<()>;
    fn description(&self) -> &str;
}

/// Linear undo/redo log.
///
/// `cursor` counts applied commands: `commands[..cursor]` are live,
/// `commands[cursor..]` are the redo branch.
#[derive(Debug)]
pub struct History {
    commands: Vec<Box<dyn Command>>,
    cursor: usize,
    max_len: usize,
}

impl History {
    pub fn new(max_len: usize) -> Self {
        Self {
            commands: Vec::new(),
            cursor: 0,
            max_len: max_len.max(1),
        }
    }

    /// Execute a command and record it. Discards the redo branch.
    /// On error nothing is recorded and the timeline is untouched.
    pub fn execute(&mut self, mut cmd: Box<dyn Command>, timeline: &mut Timeline) -> Result<()> {
        apply(timeline, |scratch| cmd.execute(scratch))?;
        self.commands.truncate(self.cursor);
        debug!(command = cmd.description(), position = self.cursor + 1, "command executed");
        self.commands.push(cmd);
        self.cursor += 1;
        if self.commands.len() > self.max_len {
            self.commands.remove(0);
            self.cursor -= 1;
        }
        Ok(())
    }

    /// Undo the last applied command. On failure the timeline and the
    /// cursor are left as they were.
    pub fn undo(&mut self, timeline: &mut Timeline) -> Result<()> {
        if self.cursor == 0 {
            return Err(CoreError::NothingToUndo);
        }
        let cmd = &mut self.commands[self.cursor - 1];
        apply(timeline, |scratch| cmd.undo(scratch)).map_err(|e| replay_error(&**cmd, e))?;
        debug!(command = cmd.description(), "undo");
        self.cursor -= 1;
        Ok(())
    }

    /// Reapply the next command on the redo branch.
    pub fn redo(&mut self, timeline: &mut Timeline) -> Result<()> {
        if self.cursor >= self.commands.len() {
            return Err(CoreError::NothingToRedo);
        }
        let cmd = &mut self.commands[self.cursor];
        apply(timeline, |scratch| cmd.execute(scratch))
            .map_err(|e| replay_error(&**cmd, e))?;
        debug!(command = cmd.description(), "redo");
        self.cursor += 1;
        Ok(())
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor < self.commands.len()
    }

    /// Number of applied commands.
    pub fn position(&self) -> usize {
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn clear(&mut self) {
        self.commands.clear();
        self.cursor = 0;
    }

    pub fn undo_description(&self) -> Option<&str> {
        self.cursor
            .checked_sub(1)
            .and_then(|i| self.commands.get(i))
            .map(|cmd| cmd.description())
    }

    pub fn redo_description(&self) -> Option<&str> {
        self.commands.get(self.cursor).map(|cmd| cmd.description())
    }
}

/// Run `f` against a scratch copy and commit only if it succeeds and the
/// result still satisfies every invariant.
fn apply<F>(timeline: &mut Timeline, f: F) -> Result<()>
where
    F: FnOnce(&mut Timeline) -> Result<()>,
{
    let mut scratch = timeline.clone();
    f(&mut scratch)?;
    scratch.check_invariants()?;
    *timeline = scratch;
    Ok(())
}

fn replay_error(cmd: &dyn Command, source: CoreError) -> CoreError {
    warn!(command = cmd.description(), error = %source, "history replay failed");
    CoreError::HistoryReplay {
        description: cmd.description().to_string(),
        source: Box::new(source),
    }
}

fn missing(what: &str) -> CoreError {
    CoreError::InvalidInput(format!("command has no saved {what}; execute must run first"))
}

// ---------------------------------------------------------------------------
// AddClipCommand
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct AddClipCommand {
    clip: Clip,
}

impl AddClipCommand {
    pub fn new(
        media_id: MediaId,
        track_id: TrackId,
        offset: TimeUs,
        start_time: TimeUs,
        end_time: TimeUs,
    ) -> Self {
        Self {
            clip: Clip {
                id: Uuid::new_v4(),
                media_id,
                track_id,
                start_time,
                end_time,
                offset,
            },
        }
    }

    pub fn clip(&self) -> &Clip {
        &self.clip
    }
}

impl Command for AddClipCommand {
    fn execute(&mut self, timeline: &mut Timeline) -> Result<()> {
        timeline.insert_clip(self.clip)
    }

    fn undo(&mut self, timeline: &mut Timeline) -> Result<()> {
        timeline.delete_clip(self.clip.id).map(|_| ())
    }

    fn description(&self) -> &str {
        "Add clip"
    }
}

// ---------------------------------------------------------------------------
// PlaceMediaCommand
// ---------------------------------------------------------------------------

/// Drop a media item, creating its track first when placement asked for one.
/// Undoes as a single step.
#[derive(Debug)]
pub struct PlaceMediaCommand {
    new_track: Option<Track>,
    clip: Clip,
}

impl PlaceMediaCommand {
    /// Place onto an existing track.
    pub fn on_track(clip: Clip) -> Self {
        Self {
            new_track: None,
            clip,
        }
    }

    /// Create `track` and place the clip on it.
    pub fn with_new_track(track: Track, clip: Clip) -> Self {
        Self {
            clip: Clip {
                track_id: track.id,
                ..clip
            },
            new_track: Some(track),
        }
    }

    pub fn clip(&self) -> &Clip {
        &self.clip
    }

    pub fn new_track(&self) -> Option<&Track> {
        self.new_track.as_ref()
    }
}

impl Command for PlaceMediaCommand {
    fn execute(&mut self, timeline: &mut Timeline) -> Result<()> {
        if let Some(track) = &self.new_track {
            timeline.insert_track(track.clone())?;
        }
        timeline.insert_clip(self.clip)
    }

    fn undo(&mut self, timeline: &mut Timeline) -> Result<()> {
        timeline.delete_clip(self.clip.id)?;
        if let Some(track) = &self.new_track {
            timeline.remove_track(track.id)?;
        }
        Ok(())
    }

    fn description(&self) -> &str {
        if self.new_track.is_some() {
            "Add clip on new track"
        } else {
            "Add clip"
        }
    }
}

// ---------------------------------------------------------------------------
// DeleteClipCommand
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct DeleteClipCommand {
    clip_id: ClipId,
    removed: Option<Clip>,
}

impl DeleteClipCommand {
    pub fn new(clip_id: ClipId) -> Self {
        Self {
            clip_id,
            removed: None,
        }
    }
}

impl Command for DeleteClipCommand {
    fn execute(&mut self, timeline: &mut Timeline) -> Result<()> {
        self.removed = Some(timeline.delete_clip(self.clip_id)?);
        Ok(())
    }

    fn undo(&mut self, timeline: &mut Timeline) -> Result<()> {
        let clip = self.removed.ok_or_else(|| missing("removed clip"))?;
        timeline.insert_clip(clip)
    }

    fn description(&self) -> &str {
        "Delete clip"
    }
}

// ---------------------------------------------------------------------------
// MoveClipCommand
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct MoveClipCommand {
    clip_id: ClipId,
    new_track_id: TrackId,
    new_offset: TimeUs,
    old: Option<(TrackId, TimeUs)>,
}

impl MoveClipCommand {
    pub fn new(clip_id: ClipId, new_track_id: TrackId, new_offset: TimeUs) -> Self {
        Self {
            clip_id,
            new_track_id,
            new_offset,
            old: None,
        }
    }
}

impl Command for MoveClipCommand {
    fn execute(&mut self, timeline: &mut Timeline) -> Result<()> {
        let clip = timeline
            .clip(self.clip_id)
            .ok_or(CoreError::ClipNotFound(self.clip_id))?;
        self.old = Some((clip.track_id, clip.offset));
        timeline.move_clip(self.clip_id, self.new_track_id, self.new_offset)
    }

    fn undo(&mut self, timeline: &mut Timeline) -> Result<()> {
        let (track_id, offset) = self.old.ok_or_else(|| missing("position"))?;
        timeline.move_clip(self.clip_id, track_id, offset)
    }

    fn description(&self) -> &str {
        "Move clip"
    }
}

// ---------------------------------------------------------------------------
// MoveToNewTrackCommand
// ---------------------------------------------------------------------------

/// Internal drag whose placement needed a fresh track.
#[derive(Debug)]
pub struct MoveToNewTrackCommand {
    track: Track,
    inner: MoveClipCommand,
}

impl MoveToNewTrackCommand {
    pub fn new(clip_id: ClipId, track: Track, new_offset: TimeUs) -> Self {
        Self {
            inner: MoveClipCommand::new(clip_id, track.id, new_offset),
            track,
        }
    }
}

impl Command for MoveToNewTrackCommand {
    fn execute(&mut self, timeline: &mut Timeline) -> Result<()> {
        timeline.insert_track(self.track.clone())?;
        self.inner.execute(timeline)
    }

    fn undo(&mut self, timeline: &mut Timeline) -> Result<()> {
        self.inner.undo(timeline)?;
        timeline.remove_track(self.track.id).map(|_| ())
    }

    fn description(&self) -> &str {
        "Move clip to new track"
    }
}

// ---------------------------------------------------------------------------
// ResizeClipCommand
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct ResizeClipCommand {
    clip_id: ClipId,
    new_start: TimeUs,
    new_end: TimeUs,
    old: Option<(TimeUs, TimeUs)>,
}

impl ResizeClipCommand {
    pub fn new(clip_id: ClipId, new_start: TimeUs, new_end: TimeUs) -> Self {
        Self {
            clip_id,
            new_start,
            new_end,
            old: None,
        }
    }
}

impl Command for ResizeClipCommand {
    fn execute(&mut self, timeline: &mut Timeline) -> Result<()> {
        let clip = timeline
            .clip(self.clip_id)
            .ok_or(CoreError::ClipNotFound(self.clip_id))?;
        self.old = Some((clip.start_time, clip.end_time));
        timeline.resize_clip(self.clip_id, self.new_start, self.new_end)
    }

    fn undo(&mut self, timeline: &mut Timeline) -> Result<()> {
        let (start, end) = self.old.ok_or_else(|| missing("in/out points"))?;
        timeline.resize_clip(self.clip_id, start, end)
    }

    fn description(&self) -> &str {
        "Resize clip"
    }
}

// ---------------------------------------------------------------------------
// SplitClipCommand
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct SplitClipCommand {
    clip_id: ClipId,
    at: TimeUs,
    right_id: ClipId,
    original: Option<Clip>,
}

impl SplitClipCommand {
    pub fn new(clip_id: ClipId, at: TimeUs) -> Self {
        Self {
            clip_id,
            at,
            right_id: Uuid::new_v4(),
            original: None,
        }
    }

    /// Id the right half gets, stable across redo.
    pub fn right_id(&self) -> ClipId {
        self.right_id
    }
}

impl Command for SplitClipCommand {
    fn execute(&mut self, timeline: &mut Timeline) -> Result<()> {
        let original = *timeline
            .clip(self.clip_id)
            .ok_or(CoreError::ClipNotFound(self.clip_id))?;
        timeline.split_clip_with_id(self.clip_id, self.at, self.right_id)?;
        self.original = Some(original);
        Ok(())
    }

    fn undo(&mut self, timeline: &mut Timeline) -> Result<()> {
        let original = self.original.ok_or_else(|| missing("original clip"))?;
        timeline.delete_clip(self.right_id)?;
        timeline.replace_clip(original)
    }

    fn description(&self) -> &str {
        "Split clip"
    }
}

// ---------------------------------------------------------------------------
// AddTrackCommand / RemoveTrackCommand
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct AddTrackCommand {
    track: Track,
}

impl AddTrackCommand {
    /// Prepare the track `timeline` would append next.
    pub fn new(timeline: &Timeline, kind: TrackKind) -> Self {
        Self {
            track: timeline.next_track(kind),
        }
    }

    pub fn track(&self) -> &Track {
        &self.track
    }
}

impl Command for AddTrackCommand {
    fn execute(&mut self, timeline: &mut Timeline) -> Result<()> {
        timeline.insert_track(self.track.clone())
    }

    fn undo(&mut self, timeline: &mut Timeline) -> Result<()> {
        timeline.remove_track(self.track.id).map(|_| ())
    }

    fn description(&self) -> &str {
        "Add track"
    }
}

#[derive(Debug)]
pub struct RemoveTrackCommand {
    track_id: TrackId,
    removed: Option<(Track, Vec<Clip>)>,
}

impl RemoveTrackCommand {
    pub fn new(track_id: TrackId) -> Self {
        Self {
            track_id,
            removed: None,
        }
    }
}

impl Command for RemoveTrackCommand {
    fn execute(&mut self, timeline: &mut Timeline) -> Result<()> {
        self.removed = Some(timeline.remove_track(self.track_id)?);
        Ok(())
    }

    fn undo(&mut self, timeline: &mut Timeline) -> Result<()> {
        let (track, clips) = self.removed.clone().ok_or_else(|| missing("track"))?;
        timeline.insert_track(track)?;
        for clip in clips {
            timeline.insert_clip(clip)?;
        }
        Ok(())
    }

    fn description(&self) -> &str {
        "Remove track"
    }
}

// ---------------------------------------------------------------------------
// RemoveMediaCommand
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct RemoveMediaCommand {
    media_id: MediaId,
    removed: Option<(MediaRef, Vec<Clip>)>,
}

impl RemoveMediaCommand {
    pub fn new(media_id: MediaId) -> Self {
        Self {
            media_id,
            removed: None,
        }
    }

    pub fn removed_clips(&self) -> &[Clip] {
        self.removed.as_ref().map_or(&[], |(_, clips)| clips.as_slice())
    }
}

impl Command for RemoveMediaCommand {
    fn execute(&mut self, timeline: &mut Timeline) -> Result<()> {
        self.removed = Some(timeline.remove_media(self.media_id)?);
        Ok(())
    }

    fn undo(&mut self, timeline: &mut Timeline) -> Result<()> {
        let (media, clips) = self.removed.clone().ok_or_else(|| missing("media"))?;
        timeline.add_media(media);
        for clip in clips {
            timeline.insert_clip(clip)?;
        }
        Ok(())
    }

    fn description(&self) -> &str {
        "Remove media"
    }
}

// ---------------------------------------------------------------------------
// Cut commands
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct AddCutCommand {
    range: Range,
    before: Option<Vec<Range>>,
}

impl AddCutCommand {
    pub fn new(range: Range) -> Self {
        Self {
            range,
            before: None,
        }
    }
}

impl Command for AddCutCommand {
    fn execute(&mut self, timeline: &mut Timeline) -> Result<()> {
        let before = timeline.cuts.accepted().to_vec();
        timeline.cuts.add_cut(self.range)?;
        self.before = Some(before);
        Ok(())
    }

    fn undo(&mut self, timeline: &mut Timeline) -> Result<()> {
        let before = self.before.clone().ok_or_else(|| missing("cut list"))?;
        timeline.cuts.restore_accepted(before);
        Ok(())
    }

    fn description(&self) -> &str {
        "Add cut"
    }
}

#[derive(Debug)]
pub struct RemoveCutCommand {
    index: usize,
    removed: Option<Range>,
}

impl RemoveCutCommand {
    pub fn new(index: usize) -> Self {
        Self {
            index,
            removed: None,
        }
    }
}

impl Command for RemoveCutCommand {
    fn execute(&mut self, timeline: &mut Timeline) -> Result<()> {
        self.removed = Some(timeline.cuts.remove_cut(self.index)?);
        Ok(())
    }

    fn undo(&mut self, timeline: &mut Timeline) -> Result<()> {
        let range = self.removed.ok_or_else(|| missing("cut"))?;
        timeline.cuts.add_cut(range).map(|_| ())
    }

    fn description(&self) -> &str {
        "Remove cut"
    }
}

#[derive(Debug, Default)]
pub struct ClearCutsCommand {
    removed: Vec<Range>,
}

impl ClearCutsCommand {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Command for ClearCutsCommand {
    fn execute(&mut self, timeline: &mut Timeline) -> Result<()> {
        self.removed = timeline.cuts.clear_all_cuts();
        Ok(())
    }

    fn undo(&mut self, timeline: &mut Timeline) -> Result<()> {
        timeline.cuts.restore_accepted(self.removed.clone());
        Ok(())
    }

    fn description(&self) -> &str {
        "Clear cuts"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
