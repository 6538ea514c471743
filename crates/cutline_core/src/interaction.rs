//! Pointer and keyboard state machine.
//!
//! Input arrives as [`InputEvent`]s; the editor hit-tests them through the
//! viewport and row layout, moves between [`InteractionState`]s and turns
//! finished gestures into history commands. Rejected edits are logged and
//! the machine returns to `Idle`; only a failed undo/redo replay surfaces
//! as an error.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::editor::Editor;
use crate::error::{CoreError, Result};
use crate::history::ResizeClipCommand;
use crate::placement::{nearest_compatible_track, resolve_placement, PlacementDecision};
use crate::types::*;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Tool {
    #[default]
    Select,
    Split,
    Resize,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PointerButton {
    #[default]
    Primary,
    Middle,
    Secondary,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Modifiers {
    #[serde(default)]
    pub shift: bool,
    #[serde(default)]
    pub ctrl: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Key {
    ArrowLeft,
    ArrowRight,
    Home,
    End,
    Delete,
    Backspace,
    Escape,
    Char(char),
}

/// Raw input in viewport pixel coordinates. `y` is measured from the top of
/// the ruler band.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputEvent {
    PointerDown {
        x: f64,
        y: f64,
        #[serde(default)]
        button: PointerButton,
        #[serde(default)]
        modifiers: Modifiers,
    },
    PointerMove {
        x: f64,
        y: f64,
    },
    PointerUp {
        x: f64,
        y: f64,
    },
    /// The window lost the pointer (blur, capture stolen).
    PointerCaptureLost,
    DragEnter {
        media_id: MediaId,
    },
    DragOver {
        x: f64,
        y: f64,
    },
    Drop {
        x: f64,
        y: f64,
    },
    DragLeave,
    Wheel {
        x: f64,
        #[serde(default)]
        dx: f64,
        #[serde(default)]
        dy: f64,
        #[serde(default)]
        modifiers: Modifiers,
    },
    Key {
        key: Key,
        #[serde(default)]
        modifiers: Modifiers,
    },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Edge {
    Left,
    Right,
}

/// Where a drop would land, recomputed on every drag move.
#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct DropPreview {
    pub track_id: Option<TrackId>,
    pub decision: PlacementDecision,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum DragKind {
    InternalClip {
        clip_id: ClipId,
        /// Seconds between the grab point and the clip's left edge.
        grab_offset: f64,
        preview: Option<DropPreview>,
    },
    ExternalMedia {
        media_id: MediaId,
        preview: Option<DropPreview>,
    },
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum InteractionState {
    #[default]
    Idle,
    Scrubbing,
    Panning {
        last_x: f64,
    },
    /// Rubber-band cut selection; `anchor` in seconds.
    Selecting {
        anchor: f64,
    },
    Resizing {
        clip_id: ClipId,
        edge: Edge,
        /// The clip as it was at press time, restored on cancel.
        original: Clip,
    },
    Dragging {
        drag: DragKind,
    },
}

impl InteractionState {
    pub fn is_idle(&self) -> bool {
        matches!(self, InteractionState::Idle)
    }
}

/// A press on a clip that may still turn into a drag.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct PendingPress {
    clip_id: ClipId,
    x: f64,
    y: f64,
    grab_offset: f64,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(tag = "target", rename_all = "snake_case")]
pub enum HitTarget {
    Ruler,
    Clip { clip_id: ClipId, edge: Option<Edge> },
    Track { track_id: TrackId },
    Empty,
}

/// Collapse runs of consecutive pointer moves (and drag-overs) to the last
/// one of each run. Everything else keeps its place and order.
pub fn coalesce_pointer_moves(events: impl IntoIterator<Item = InputEvent>) -> Vec<InputEvent> {
    let mut out: Vec<InputEvent> = Vec::new();
    for event in events {
        let same_run = matches!(
            (out.last(), &event),
            (Some(InputEvent::PointerMove { .. }), InputEvent::PointerMove { .. })
                | (Some(InputEvent::DragOver { .. }), InputEvent::DragOver { .. })
        );
        if same_run {
            if let Some(last) = out.last_mut() {
                *last = event;
                continue;
            }
        }
        out.push(event);
    }
    out
}

impl Editor {
    /// What sits under `(x, y)`. The ruler band wins over everything.
    pub fn hit_test(&self, x: f64, y: f64) -> HitTarget {
        let layout = self.config.row_layout();
        if layout.in_ruler(y) {
            return HitTarget::Ruler;
        }
        let tracks = self.timeline.tracks_sorted();
        let Some(row) = layout.row_at(y, tracks.len()) else {
            return HitTarget::Empty;
        };
        let track_id = tracks[row].id;
        let tolerance = self.config.hit_tolerance_px;

        let spans: Vec<(ClipId, f64, f64)> = self
            .timeline
            .clips_on_track(track_id)
            .into_iter()
            .map(|c| {
                (
                    c.id,
                    self.view.time_to_pixel(c.timeline_start().as_seconds()),
                    self.view.time_to_pixel(c.timeline_end().as_seconds()),
                )
            })
            .collect();

        // Prefer a clip the pointer is actually inside, then the nearest one
        // within tolerance. Where two clips touch, the nearer edge wins and an
        // exact tie goes to the clip starting there.
        let inside = spans
            .iter()
            .filter(|(_, l, r)| (*l..=*r).contains(&x))
            .min_by(|a, b| {
                edge_distance(x, a)
                    .total_cmp(&edge_distance(x, b))
                    .then(b.1.total_cmp(&a.1))
            });
        let near = || {
            spans
                .iter()
                .filter(|(_, l, r)| x >= l - tolerance && x <= r + tolerance)
                .min_by(|a, b| edge_distance(x, a).total_cmp(&edge_distance(x, b)))
        };
        match inside.or_else(near) {
            Some(&(clip_id, left, right)) => {
                let edge = if (x - left).abs() <= tolerance && (x - left).abs() <= (x - right).abs() {
                    Some(Edge::Left)
                } else if (x - right).abs() <= tolerance {
                    Some(Edge::Right)
                } else {
                    None
                };
                HitTarget::Clip { clip_id, edge }
            }
            None => HitTarget::Track { track_id },
        }
    }

    /// Feed a batch of queued input, coalescing pointer moves first.
    pub fn handle_events(&mut self, events: impl IntoIterator<Item = InputEvent>) -> Result<()> {
        for event in coalesce_pointer_moves(events) {
            self.handle_event(event)?;
        }
        Ok(())
    }

    /// Process one input event. Rejected edits are logged, not returned.
    pub fn handle_event(&mut self, event: InputEvent) -> Result<()> {
        match event {
            InputEvent::PointerDown {
                x,
                y,
                button,
                modifiers,
            } => self.pointer_down(x, y, button, modifiers),
            InputEvent::PointerMove { x, y } => {
                self.pointer_move(x, y);
                Ok(())
            }
            InputEvent::PointerUp { x, y } => self.pointer_up(x, y),
            InputEvent::PointerCaptureLost => {
                self.cancel_interaction();
                Ok(())
            }
            InputEvent::DragEnter { media_id } => {
                if self.timeline.media(media_id).is_none() {
                    warn!(%media_id, "drag of unknown media ignored");
                    return Ok(());
                }
                self.cancel_interaction();
                self.state = InteractionState::Dragging {
                    drag: DragKind::ExternalMedia {
                        media_id,
                        preview: None,
                    },
                };
                debug!(%media_id, "external drag entered");
                Ok(())
            }
            InputEvent::DragOver { x, y } => {
                self.update_drag(x, y);
                Ok(())
            }
            InputEvent::Drop { x, y } => self.drop_external(x, y),
            InputEvent::DragLeave => {
                if matches!(
                    self.state,
                    InteractionState::Dragging {
                        drag: DragKind::ExternalMedia { .. }
                    }
                ) {
                    self.state = InteractionState::Idle;
                }
                Ok(())
            }
            InputEvent::Wheel {
                x,
                dx,
                dy,
                modifiers,
            } => {
                self.wheel(x, dx, dy, modifiers);
                Ok(())
            }
            InputEvent::Key { key, modifiers } => self.key(key, modifiers),
        }
    }

    /// Abandon any gesture in progress: a live resize is reverted, the cut
    /// preview is discarded and an external drag is dropped.
    pub fn cancel_interaction(&mut self) {
        self.pending = None;
        match std::mem::take(&mut self.state) {
            InteractionState::Resizing { original, .. } => {
                // A clip removed mid-gesture stays removed.
                if let Some(live) = self.timeline.clips.get_mut(&original.id) {
                    *live = original;
                }
            }
            InteractionState::Selecting { .. } => self.timeline.cuts.set_preview(None),
            InteractionState::Idle => return,
            _ => {}
        }
        debug!("interaction cancelled");
    }

    // -----------------------------------------------------------------------
    // Pointer
    // -----------------------------------------------------------------------

    fn pointer_down(&mut self, x: f64, y: f64, button: PointerButton, modifiers: Modifiers) -> Result<()> {
        if !x.is_finite() || !y.is_finite() {
            warn!(x, y, "pointer position rejected");
            return Ok(());
        }
        self.cancel_interaction();
        let hit = self.hit_test(x, y);
        let t = self.time_at(x);

        if button == PointerButton::Middle {
            self.state = InteractionState::Panning { last_x: x };
            return Ok(());
        }
        if hit == HitTarget::Ruler {
            if button == PointerButton::Primary {
                self.state = InteractionState::Scrubbing;
                self.seek_internal(t);
            }
            return Ok(());
        }
        if button == PointerButton::Secondary || modifiers.shift {
            self.state = InteractionState::Selecting { anchor: t };
            debug!(anchor = t, "range selection started");
            return Ok(());
        }

        match (self.tool, hit) {
            (Tool::Select, HitTarget::Clip { clip_id, .. }) => {
                self.selection = Some(clip_id);
                let offset = self
                    .timeline
                    .clip(clip_id)
                    .map_or(0.0, |c| c.offset.as_seconds());
                self.pending = Some(PendingPress {
                    clip_id,
                    x,
                    y,
                    grab_offset: t - offset,
                });
                Ok(())
            }
            (Tool::Split, HitTarget::Clip { clip_id, .. }) => {
                let result = self.split_clip(clip_id, TimeUs::from_seconds(t));
                if let Ok((left, _)) = &result {
                    self.selection = Some(left.id);
                }
                settle(result)
            }
            (Tool::Resize, HitTarget::Clip { clip_id, edge }) => {
                match (edge, self.selection == Some(clip_id)) {
                    (Some(edge), true) => {
                        if let Some(&original) = self.timeline.clip(clip_id) {
                            debug!(%clip_id, ?edge, "resize started");
                            self.state = InteractionState::Resizing {
                                clip_id,
                                edge,
                                original,
                            };
                        }
                    }
                    _ => self.selection = Some(clip_id),
                }
                Ok(())
            }
            (_, _) => {
                self.selection = None;
                Ok(())
            }
        }
    }

    fn pointer_move(&mut self, x: f64, y: f64) {
        if !x.is_finite() || !y.is_finite() {
            warn!(x, y, "pointer position rejected");
            return;
        }
        let t = self.time_at(x);
        match self.state.clone() {
            InteractionState::Idle => {
                let Some(press) = self.pending else { return };
                let travel = (x - press.x).hypot(y - press.y);
                if travel > self.config.drag_threshold_px {
                    self.pending = None;
                    debug!(clip_id = %press.clip_id, "clip drag started");
                    self.state = InteractionState::Dragging {
                        drag: DragKind::InternalClip {
                            clip_id: press.clip_id,
                            grab_offset: press.grab_offset,
                            preview: None,
                        },
                    };
                    self.update_drag(x, y);
                }
            }
            InteractionState::Scrubbing => self.seek_internal(t),
            InteractionState::Panning { last_x } => {
                self.view.pan_by(last_x - x);
                self.state = InteractionState::Panning { last_x: x };
            }
            InteractionState::Selecting { anchor } => {
                let range = Range::from_seconds(anchor, t).normalized();
                self.timeline
                    .cuts
                    .set_preview(range.is_well_formed().then_some(range));
            }
            InteractionState::Resizing {
                clip_id,
                edge,
                original,
            } => self.resize_live(clip_id, edge, &original, t),
            InteractionState::Dragging { .. } => self.update_drag(x, y),
        }
    }

    fn pointer_up(&mut self, x: f64, y: f64) -> Result<()> {
        if x.is_finite() && y.is_finite() {
            self.pointer_move(x, y);
        }
        self.pending = None;
        match std::mem::take(&mut self.state) {
            InteractionState::Idle | InteractionState::Scrubbing | InteractionState::Panning { .. } => {
                Ok(())
            }
            InteractionState::Selecting { anchor } => {
                self.timeline.cuts.set_preview(None);
                let range = Range::from_seconds(anchor, self.time_at(x)).normalized();
                if range.duration().as_seconds() < self.config.min_cut_secs {
                    debug!(duration = %range.duration(), "selection too short, discarded");
                    return Ok(());
                }
                settle(self.add_cut(range))
            }
            InteractionState::Resizing { clip_id, original, .. } => {
                let Some(live) = self.timeline.clip(clip_id).copied() else {
                    return Ok(());
                };
                // Put the pre-drag clip back so the edit is recorded as one step.
                self.timeline.clips.insert(original.id, original);
                if (live.start_time, live.end_time) == (original.start_time, original.end_time) {
                    return Ok(());
                }
                let cmd = ResizeClipCommand::new(clip_id, live.start_time, live.end_time);
                settle(self.commit(Box::new(cmd)))
            }
            InteractionState::Dragging {
                drag: DragKind::InternalClip {
                    clip_id, preview, ..
                },
            } => {
                let Some(preview) = preview else {
                    return Ok(());
                };
                let result = self.relocate_clip(clip_id, preview.track_id, preview.decision.offset());
                settle(result)
            }
            InteractionState::Dragging {
                drag: DragKind::ExternalMedia { media_id, preview },
            } => self.place_dragged_media(media_id, preview),
        }
    }

    // -----------------------------------------------------------------------
    // Dragging
    // -----------------------------------------------------------------------

    /// Recompute the target track and placement for the current drag.
    fn update_drag(&mut self, x: f64, y: f64) {
        if !x.is_finite() || !y.is_finite() {
            return;
        }
        let (clip_id, dragged_media, grab_offset) = match &self.state {
            InteractionState::Dragging {
                drag: DragKind::InternalClip {
                    clip_id,
                    grab_offset,
                    ..
                },
            } => (Some(*clip_id), None, *grab_offset),
            InteractionState::Dragging {
                drag: DragKind::ExternalMedia { media_id, .. },
            } => (None, Some(*media_id), 0.0),
            _ => return,
        };
        let moving = clip_id.and_then(|id| self.timeline.clip(id)).copied();
        let Some(media_id) = dragged_media.or(moving.map(|c| c.media_id)) else {
            self.state = InteractionState::Idle;
            return;
        };
        let Some(media) = self.timeline.media(media_id) else {
            self.state = InteractionState::Idle;
            return;
        };
        let kind = media.kind;
        let duration = match moving {
            Some(clip) => clip.content_duration(),
            None => media
                .duration_us
                .unwrap_or_else(|| TimeUs::from_seconds(self.config.default_image_secs)),
        };

        let offset = TimeUs::from_seconds((self.pixel_time(x) - grab_offset).max(0.0));
        let track_id =
            nearest_compatible_track(&self.timeline, &self.config.row_layout(), kind, y);
        let decision = resolve_placement(
            &self.timeline,
            kind,
            offset,
            track_id,
            duration,
            moving.map(|c| c.id),
        );
        let new_preview = Some(DropPreview { track_id, decision });

        if let InteractionState::Dragging { drag } = &mut self.state {
            match drag {
                DragKind::InternalClip { preview, .. } | DragKind::ExternalMedia { preview, .. } => {
                    *preview = new_preview;
                }
            }
        }
    }

    fn drop_external(&mut self, x: f64, y: f64) -> Result<()> {
        let InteractionState::Dragging {
            drag: DragKind::ExternalMedia { .. },
        } = &self.state
        else {
            return Ok(());
        };
        self.update_drag(x, y);
        match std::mem::take(&mut self.state) {
            InteractionState::Dragging {
                drag: DragKind::ExternalMedia { media_id, preview },
            } => self.place_dragged_media(media_id, preview),
            _ => Ok(()),
        }
    }

    fn place_dragged_media(&mut self, media_id: MediaId, preview: Option<DropPreview>) -> Result<()> {
        let Some(preview) = preview else {
            debug!(%media_id, "drop without position ignored");
            return Ok(());
        };
        let result = self.place_media(media_id, preview.track_id, preview.decision.offset());
        if let Ok(clip) = &result {
            debug!(clip_id = %clip.id, track_id = %clip.track_id, "media dropped");
        }
        settle(result)
    }

    // -----------------------------------------------------------------------
    // Resizing
    // -----------------------------------------------------------------------

    /// Apply a live resize directly to the timeline. Invalid positions leave
    /// the last valid size in place.
    fn resize_live(&mut self, clip_id: ClipId, edge: Edge, original: &Clip, t: f64) {
        let Some(current) = self.timeline.clip(clip_id).copied() else {
            return;
        };
        // Source time under the pointer, anchored to the clip as pressed.
        let source = original.start_time + (TimeUs::from_seconds(t) - original.offset);
        let (start, end) = match edge {
            Edge::Left => (source.max(TimeUs::ZERO), current.end_time),
            Edge::Right => (current.start_time, source),
        };
        if start >= end {
            return;
        }
        if let Err(e) = self.timeline.resize_clip(clip_id, start, end) {
            debug!(%clip_id, error = %e, "live resize held at last valid size");
        }
    }

    // -----------------------------------------------------------------------
    // Wheel and keyboard
    // -----------------------------------------------------------------------

    fn wheel(&mut self, x: f64, dx: f64, dy: f64, modifiers: Modifiers) {
        if modifiers.ctrl {
            if dy == 0.0 || !dy.is_finite() {
                return;
            }
            let step = self.config.wheel_zoom_step;
            let factor = if dy < 0.0 { step } else { 1.0 / step };
            self.view.zoom_by(factor, Some(x), true);
        } else {
            let delta = if dx != 0.0 { dx } else { dy };
            self.view.pan_by(delta);
        }
    }

    fn key(&mut self, key: Key, modifiers: Modifiers) -> Result<()> {
        if self.text_focus {
            return Ok(());
        }
        let step = if modifiers.shift {
            self.config.coarse_step_secs
        } else {
            self.config.fine_step_secs
        };
        match key {
            Key::ArrowLeft => self.seek_internal(self.playhead - step),
            Key::ArrowRight => self.seek_internal(self.playhead + step),
            Key::Home => self.seek_internal(0.0),
            Key::End => self.seek_internal(self.effective_duration()),
            Key::Delete | Key::Backspace => {
                self.cancel_interaction();
                if let Some(clip_id) = self.selection {
                    return settle(self.delete_clip(clip_id));
                }
            }
            Key::Escape => self.cancel_interaction(),
            Key::Char(c) if modifiers.ctrl => match c.to_ascii_lowercase() {
                'z' if modifiers.shift => return self.keyboard_history(false),
                'z' => return self.keyboard_history(true),
                'y' => return self.keyboard_history(false),
                _ => {}
            },
            Key::Char(_) => {}
        }
        Ok(())
    }

    fn keyboard_history(&mut self, undo: bool) -> Result<()> {
        self.cancel_interaction();
        let result = if undo { self.undo() } else { self.redo() };
        settle(result)
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn pixel_time(&self, x: f64) -> f64 {
        self.view.pixel_to_time(x)
    }

    /// Timeline time under `x`, clamped to the timeline bounds.
    fn time_at(&self, x: f64) -> f64 {
        self.pixel_time(x).clamp(0.0, self.effective_duration())
    }
}

fn edge_distance(x: f64, span: &(ClipId, f64, f64)) -> f64 {
    (x - span.1).abs().min((x - span.2).abs())
}

/// Gesture edits report domain rejections through logs. A history replay
/// failure is the one error the caller must see.
fn settle<T>(result: Result<T>) -> Result<()> {
    match result {
        Ok(_) => Ok(()),
        Err(e @ CoreError::HistoryReplay { .. }) => Err(e),
        Err(e) if e.is_history_boundary() => {
            debug!(error = %e, "nothing to do");
            Ok(())
        }
        Err(e) => {
            debug!(error = %e, "gesture edit rejected");
            Ok(())
        }
    }
}
