use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{CoreError, Result, Violation};
use crate::types::*;

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    // -----------------------------------------------------------------------
    // Media
    // -----------------------------------------------------------------------

    /// Register an external media reference. Re-registering an id replaces it.
    pub fn add_media(&mut self, media: MediaRef) -> MediaId {
        let id = media.id;
        self.media.insert(id, media);
        id
    }

    pub fn media(&self, id: MediaId) -> Option<&MediaRef> {
        self.media.get(&id)
    }

    /// Remove a media reference together with every clip that uses it.
    pub fn remove_media(&mut self, id: MediaId) -> Result<(MediaRef, Vec<Clip>)> {
        if !self.media.contains_key(&id) {
            return Err(CoreError::MediaNotFound(id));
        }
        let dependents: Vec<ClipId> = self
            .clips
            .values()
            .filter(|c| c.media_id == id)
            .map(|c| c.id)
            .collect();
        for clip_id in &dependents {
            let clip = &self.clips[clip_id];
            self.ensure_unlocked(clip.track_id)?;
        }

        let removed_clips: Vec<Clip> = dependents
            .iter()
            .filter_map(|clip_id| self.clips.remove(clip_id))
            .collect();
        let media = self
            .media
            .remove(&id)
            .ok_or(CoreError::MediaNotFound(id))?;
        debug!(media_id = %id, clips = removed_clips.len(), "media removed");
        Ok((media, removed_clips))
    }

    /// Longest known duration among registered media.
    pub fn longest_media(&self) -> Option<TimeUs> {
        self.media.values().filter_map(|m| m.duration_us).max()
    }

    // -----------------------------------------------------------------------
    // Tracks
    // -----------------------------------------------------------------------

    /// Append a new track below the existing ones.
    pub fn add_track(&mut self, kind: TrackKind) -> Track {
        let track = self.next_track(kind);
        self.tracks.insert(track.id, track.clone());
        debug!(track_id = %track.id, ?kind, order = track.order, "track added");
        track
    }

    /// Build, without inserting, the track `add_track` would create.
    pub fn next_track(&self, kind: TrackKind) -> Track {
        let order = self
            .tracks
            .values()
            .map(|t| t.order)
            .max()
            .map_or(0, |max| max + 1);
        let same_kind = self.tracks.values().filter(|t| t.kind == kind).count();
        let name = match kind {
            TrackKind::Video => format!("Video {}", same_kind + 1),
            TrackKind::Audio => format!("Audio {}", same_kind + 1),
        };
        Track {
            id: Uuid::new_v4(),
            kind,
            order,
            name,
            muted: false,
            locked: false,
            enabled: true,
            volume: 100,
        }
    }

    /// Put back a previously removed track, keeping its id and order.
    pub fn insert_track(&mut self, track: Track) -> Result<()> {
        if self.tracks.contains_key(&track.id) {
            return Err(CoreError::InvalidInput(format!(
                "track {} already exists",
                track.id
            )));
        }
        if self.tracks.values().any(|t| t.order == track.order) {
            return Err(CoreError::InvalidInput(format!(
                "track order {} already taken",
                track.order
            )));
        }
        self.tracks.insert(track.id, track);
        Ok(())
    }

    /// Remove a track and cascade-delete its clips.
    pub fn remove_track(&mut self, id: TrackId) -> Result<(Track, Vec<Clip>)> {
        self.ensure_unlocked(id)?;
        let track = self.tracks.remove(&id).ok_or(CoreError::TrackNotFound(id))?;
        let dependents: Vec<ClipId> = self
            .clips
            .values()
            .filter(|c| c.track_id == id)
            .map(|c| c.id)
            .collect();
        let mut removed: Vec<Clip> = dependents
            .iter()
            .filter_map(|clip_id| self.clips.remove(clip_id))
            .collect();
        removed.sort_by_key(|c| c.offset);
        debug!(track_id = %id, clips = removed.len(), "track removed");
        Ok((track, removed))
    }

    pub fn track(&self, id: TrackId) -> Option<&Track> {
        self.tracks.get(&id)
    }

    /// Tracks in display order.
    pub fn tracks_sorted(&self) -> Vec<&Track> {
        let mut tracks: Vec<&Track> = self.tracks.values().collect();
        tracks.sort_by_key(|t| t.order);
        tracks
    }

    pub fn rename_track(&mut self, id: TrackId, name: impl Into<String>) -> Result<()> {
        self.track_mut(id)?.name = name.into();
        Ok(())
    }

    pub fn set_track_muted(&mut self, id: TrackId, muted: bool) -> Result<()> {
        self.track_mut(id)?.muted = muted;
        Ok(())
    }

    pub fn set_track_locked(&mut self, id: TrackId, locked: bool) -> Result<()> {
        self.track_mut(id)?.locked = locked;
        Ok(())
    }

    pub fn set_track_enabled(&mut self, id: TrackId, enabled: bool) -> Result<()> {
        self.track_mut(id)?.enabled = enabled;
        Ok(())
    }

    pub fn set_track_volume(&mut self, id: TrackId, volume: u8) -> Result<()> {
        if volume > 100 {
            return Err(CoreError::InvalidInput(format!(
                "volume {volume} exceeds 100"
            )));
        }
        self.track_mut(id)?.volume = volume;
        Ok(())
    }

    fn track_mut(&mut self, id: TrackId) -> Result<&mut Track> {
        self.tracks.get_mut(&id).ok_or(CoreError::TrackNotFound(id))
    }

    fn ensure_unlocked(&self, id: TrackId) -> Result<()> {
        match self.tracks.get(&id) {
            Some(track) if track.locked => Err(Violation::TrackLocked(id).into()),
            Some(_) => Ok(()),
            None => Err(CoreError::TrackNotFound(id)),
        }
    }

    // -----------------------------------------------------------------------
    // Clips
    // -----------------------------------------------------------------------

    pub fn clip(&self, id: ClipId) -> Option<&Clip> {
        self.clips.get(&id)
    }

    /// Clips on a track ordered by timeline position.
    pub fn clips_on_track(&self, track_id: TrackId) -> Vec<&Clip> {
        let mut clips: Vec<&Clip> = self
            .clips
            .values()
            .filter(|c| c.track_id == track_id)
            .collect();
        clips.sort_by_key(|c| c.offset);
        clips
    }

    /// End of the furthest clip, zero when empty.
    pub fn content_end(&self) -> TimeUs {
        self.clips
            .values()
            .map(Clip::timeline_end)
            .max()
            .unwrap_or(TimeUs::ZERO)
    }

    /// Create a clip on a track. Nothing is committed on error.
    pub fn add_clip(
        &mut self,
        media_id: MediaId,
        track_id: TrackId,
        offset: TimeUs,
        start_time: TimeUs,
        end_time: TimeUs,
    ) -> Result<Clip> {
        let clip = Clip {
            id: Uuid::new_v4(),
            media_id,
            track_id,
            start_time,
            end_time,
            offset,
        };
        self.insert_clip(clip)?;
        Ok(clip)
    }

    /// Insert a fully specified clip, keeping its id.
    pub fn insert_clip(&mut self, clip: Clip) -> Result<()> {
        if self.clips.contains_key(&clip.id) {
            return Err(CoreError::InvalidInput(format!(
                "clip {} already exists",
                clip.id
            )));
        }
        self.validate_clip(&clip, &[])?;
        self.clips.insert(clip.id, clip);
        debug!(
            clip_id = %clip.id,
            track_id = %clip.track_id,
            offset = %clip.offset,
            duration = %clip.content_duration(),
            "clip added"
        );
        Ok(())
    }

    /// Overwrite an existing clip with a new version of itself.
    pub fn replace_clip(&mut self, clip: Clip) -> Result<()> {
        let current = self
            .clips
            .get(&clip.id)
            .ok_or(CoreError::ClipNotFound(clip.id))?;
        self.ensure_unlocked(current.track_id)?;
        self.validate_clip(&clip, &[clip.id])?;
        self.clips.insert(clip.id, clip);
        Ok(())
    }

    /// Move a clip to a (possibly different) track and timeline position.
    pub fn move_clip(&mut self, id: ClipId, new_track_id: TrackId, new_offset: TimeUs) -> Result<()> {
        let current = *self.clips.get(&id).ok_or(CoreError::ClipNotFound(id))?;
        let moved = Clip {
            track_id: new_track_id,
            offset: new_offset,
            ..current
        };
        self.replace_clip(moved)?;
        debug!(clip_id = %id, track_id = %new_track_id, offset = %new_offset, "clip moved");
        Ok(())
    }

    /// Change a clip's source in/out points.
    ///
    /// Moving the in-point shifts `offset` by the same amount so the clip's
    /// right edge stays where it was on the timeline.
    pub fn resize_clip(&mut self, id: ClipId, new_start: TimeUs, new_end: TimeUs) -> Result<()> {
        let current = *self.clips.get(&id).ok_or(CoreError::ClipNotFound(id))?;
        let resized = Clip {
            start_time: new_start,
            end_time: new_end,
            offset: current.offset + (new_start - current.start_time),
            ..current
        };
        self.replace_clip(resized)?;
        debug!(clip_id = %id, start = %new_start, end = %new_end, "clip resized");
        Ok(())
    }

    /// Split a clip at a timeline position strictly inside it.
    /// The left half keeps the original id.
    pub fn split_clip(&mut self, id: ClipId, at: TimeUs) -> Result<(Clip, Clip)> {
        self.split_clip_with_id(id, at, Uuid::new_v4())
    }

    /// Split with a caller-chosen id for the right half, so redo is reproducible.
    pub fn split_clip_with_id(
        &mut self,
        id: ClipId,
        at: TimeUs,
        right_id: ClipId,
    ) -> Result<(Clip, Clip)> {
        let current = *self.clips.get(&id).ok_or(CoreError::ClipNotFound(id))?;
        if !current.contains_strictly(at) {
            warn!(clip_id = %id, at = %at, "split rejected: outside clip");
            return Err(CoreError::SplitOutOfRange {
                at,
                start: current.timeline_start(),
                end: current.timeline_end(),
            });
        }
        self.ensure_unlocked(current.track_id)?;
        if self.clips.contains_key(&right_id) {
            return Err(CoreError::InvalidInput(format!(
                "clip {right_id} already exists"
            )));
        }

        let split_source = current.start_time + (at - current.offset);
        let left = Clip {
            end_time: split_source,
            ..current
        };
        let right = Clip {
            id: right_id,
            start_time: split_source,
            offset: at,
            ..current
        };

        self.clips.insert(left.id, left);
        self.clips.insert(right.id, right);
        debug!(clip_id = %id, right_id = %right_id, at = %at, "clip split");
        Ok((left, right))
    }

    pub fn delete_clip(&mut self, id: ClipId) -> Result<Clip> {
        let track_id = self
            .clips
            .get(&id)
            .map(|c| c.track_id)
            .ok_or(CoreError::ClipNotFound(id))?;
        self.ensure_unlocked(track_id)?;
        let clip = self.clips.remove(&id).ok_or(CoreError::ClipNotFound(id))?;
        debug!(clip_id = %id, "clip deleted");
        Ok(clip)
    }

    // -----------------------------------------------------------------------
    // Invariants
    // -----------------------------------------------------------------------

    /// Check a candidate clip against every invariant, ignoring the listed
    /// clip ids when testing for overlap.
    pub fn validate_clip(&self, clip: &Clip, ignore: &[ClipId]) -> Result<()> {
        self.validate_clip_inner(clip, ignore, true)
    }

    fn validate_clip_inner(&self, clip: &Clip, ignore: &[ClipId], check_lock: bool) -> Result<()> {
        let track = self
            .tracks
            .get(&clip.track_id)
            .ok_or(Violation::DanglingTrack(clip.track_id))?;
        let media = self
            .media
            .get(&clip.media_id)
            .ok_or(Violation::DanglingMedia(clip.media_id))?;

        if check_lock && track.locked {
            return Err(Violation::TrackLocked(track.id).into());
        }
        if !track.kind.accepts(media.kind) {
            warn!(clip_id = %clip.id, media = ?media.kind, track = ?track.kind, "kind mismatch");
            return Err(Violation::KindMismatch {
                media: media.kind,
                track: track.kind,
            }
            .into());
        }

        if clip.offset < TimeUs::ZERO {
            return Err(Violation::OutOfRange(format!("offset {} is negative", clip.offset)).into());
        }
        if clip.start_time < TimeUs::ZERO {
            return Err(
                Violation::OutOfRange(format!("in-point {} is negative", clip.start_time)).into(),
            );
        }
        if clip.start_time >= clip.end_time {
            return Err(Violation::OutOfRange(format!(
                "in-point {} is not before out-point {}",
                clip.start_time, clip.end_time
            ))
            .into());
        }
        if let Some(duration) = media.duration_us {
            if clip.end_time > duration {
                return Err(Violation::OutOfRange(format!(
                    "out-point {} exceeds media duration {}",
                    clip.end_time, duration
                ))
                .into());
            }
        }

        let (start, end) = (clip.timeline_start(), clip.timeline_end());
        if let Some(other) = self.clips.values().find(|other| {
            other.track_id == clip.track_id
                && other.id != clip.id
                && !ignore.contains(&other.id)
                && other.overlaps(start, end)
        }) {
            warn!(clip_id = %clip.id, other = %other.id, "overlap rejected");
            return Err(Violation::Overlap {
                track: clip.track_id,
                other: other.id,
            }
            .into());
        }
        Ok(())
    }

    /// Full sweep over every stored entity. Lock state guards edits, not
    /// stored data, so it is not checked here.
    pub fn check_invariants(&self) -> Result<()> {
        let mut orders: Vec<i32> = self.tracks.values().map(|t| t.order).collect();
        orders.sort_unstable();
        if orders.windows(2).any(|w| w[0] == w[1]) {
            return Err(CoreError::InvalidInput("duplicate track order".into()));
        }

        for clip in self.clips.values() {
            self.validate_clip_inner(clip, &[], false)?;
        }

        if !self.cuts.is_consistent() {
            return Err(CoreError::InvalidInput(
                "accepted cuts overlap or are malformed".into(),
            ));
        }
        Ok(())
    }
}
