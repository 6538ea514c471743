use cutline_core::editor::AddClipOutcome;
use cutline_core::interaction::{Key, Modifiers, PointerButton};
use cutline_core::*;
use proptest::prelude::*;
use std::io::Write;

const SEC: i64 = 1_000_000;

fn video(editor: &mut Editor, secs: i64) -> MediaId {
    editor.add_media(MediaRef::new(
        format!("v{secs}.mp4"),
        format!("/media/v{secs}.mp4"),
        MediaKind::Video,
        Some(TimeUs(secs * SEC)),
    ))
}

fn assert_no_overlap(timeline: &Timeline) {
    for track in timeline.tracks.values() {
        let clips = timeline.clips_on_track(track.id);
        for pair in clips.windows(2) {
            assert!(
                pair[0].timeline_end() <= pair[1].timeline_start(),
                "clips {} and {} overlap on track {}",
                pair[0].id,
                pair[1].id,
                track.id
            );
        }
    }
}

fn down(x: f64, y: f64) -> InputEvent {
    InputEvent::PointerDown {
        x,
        y,
        button: PointerButton::Primary,
        modifiers: Modifiers::default(),
    }
}

fn moved(x: f64, y: f64) -> InputEvent {
    InputEvent::PointerMove { x, y }
}

fn up(x: f64, y: f64) -> InputEvent {
    InputEvent::PointerUp { x, y }
}

fn key(key: Key) -> InputEvent {
    InputEvent::Key {
        key,
        modifiers: Modifiers::default(),
    }
}

/// Vertical centre of the first track row.
fn first_row_y(editor: &Editor) -> f64 {
    let config = editor.config();
    config.ruler_height_px + config.track_height_px / 2.0
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[test]
fn scenario_a_overlapping_add_needs_new_track() {
    let mut editor = Editor::default();
    let t1 = editor.add_track(TrackKind::Video).unwrap();
    assert_eq!(t1.order, 0);

    let ten = video(&mut editor, 10);
    let first = editor
        .add_clip(ten, t1.id, TimeUs(0), TimeUs(0), TimeUs(10 * SEC))
        .unwrap();
    assert!(matches!(first, AddClipOutcome::Added { .. }));

    let five = video(&mut editor, 5);
    let second = editor
        .add_clip(five, t1.id, TimeUs(3 * SEC), TimeUs(0), TimeUs(5 * SEC))
        .unwrap();
    assert_eq!(second, AddClipOutcome::NeedsNewTrack { offset: TimeUs(3 * SEC) });
    assert_eq!(editor.timeline().clips.len(), 1);
}

#[test]
fn scenario_b_resize_into_neighbour_fails() {
    let mut tl = Timeline::new();
    let media = tl.add_media(MediaRef::new("m", "/m", MediaKind::Video, Some(TimeUs(30 * SEC))));
    let t1 = tl.add_track(TrackKind::Video);
    let clip = tl
        .add_clip(media, t1.id, TimeUs(0), TimeUs(0), TimeUs(10 * SEC))
        .unwrap();

    let mut alone = tl.clone();
    alone.resize_clip(clip.id, TimeUs(0), TimeUs(15 * SEC)).unwrap();
    assert_eq!(alone.clip(clip.id).unwrap().timeline_end(), TimeUs(15 * SEC));

    tl.add_clip(media, t1.id, TimeUs(12 * SEC), TimeUs(0), TimeUs(8 * SEC))
        .unwrap();
    let before = tl.clone();
    let err = tl
        .resize_clip(clip.id, TimeUs(0), TimeUs(15 * SEC))
        .unwrap_err();
    assert!(matches!(err.violation(), Some(Violation::Overlap { .. })));
    assert_eq!(tl, before);
}

#[test]
fn scenario_c_focal_zoom() {
    let mut view = ViewState::new(1000.0, 100.0, &EngineConfig::default());
    assert_eq!(view.time_to_pixel(50.0), 500.0);

    assert!(view.set_zoom(2.0, Some(500.0), false));
    assert!((view.time_to_pixel(50.0) - 500.0).abs() < 1e-9);
    assert!(view.time_to_pixel(0.0) < 0.0);
}

#[test]
fn scenario_d_overlapping_cuts_merge_every_time() {
    for _ in 0..3 {
        let mut editor = Editor::default();
        editor.add_cut(Range::from_seconds(5.0, 10.0)).unwrap();
        editor.add_cut(Range::from_seconds(8.0, 12.0)).unwrap();
        assert_eq!(
            editor.timeline().cuts.accepted(),
            &[Range::from_seconds(5.0, 12.0)]
        );
    }
}

#[test]
fn scenario_e_split_outside_clip_changes_nothing() {
    let mut editor = Editor::default();
    let media = video(&mut editor, 10);
    let clip = editor.place_media(media, None, TimeUs(2 * SEC)).unwrap();
    let before = editor.timeline().clone();
    let history_len = editor.history().len();

    for at in [0, 2 * SEC, 12 * SEC, 20 * SEC] {
        let err = editor.split_clip(clip.id, TimeUs(at)).unwrap_err();
        assert!(matches!(err, CoreError::SplitOutOfRange { .. }));
    }
    assert_eq!(editor.timeline(), &before);
    assert_eq!(editor.history().len(), history_len);
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

#[test]
fn split_then_join_reconstructs_clip() {
    let mut tl = Timeline::new();
    let media = tl.add_media(MediaRef::new("m", "/m", MediaKind::Audio, Some(TimeUs(60 * SEC))));
    let track = tl.add_track(TrackKind::Audio);
    let original = tl
        .add_clip(media, track.id, TimeUs(7 * SEC), TimeUs(3 * SEC), TimeUs(40 * SEC))
        .unwrap();

    let (left, right) = tl.split_clip(original.id, TimeUs(19 * SEC + 250_000)).unwrap();
    assert_eq!(left.offset, original.offset);
    assert_eq!(left.start_time, original.start_time);
    assert_eq!(left.end_time, right.start_time);
    assert_eq!(left.timeline_end(), right.offset);
    assert_eq!(right.end_time, original.end_time);
    assert_eq!(right.timeline_end(), original.timeline_end());
    assert_eq!(
        left.content_duration() + right.content_duration(),
        original.content_duration()
    );
}

#[test]
fn audio_never_accepted_on_video_track() {
    let mut editor = Editor::default();
    let track = editor.add_track(TrackKind::Video).unwrap();
    let audio = editor.add_media(MediaRef::new(
        "a.wav",
        "/a.wav",
        MediaKind::Audio,
        Some(TimeUs(20 * SEC)),
    ));

    for offset in [0, SEC, 15 * SEC, 500 * SEC] {
        let err = editor
            .add_clip(audio, track.id, TimeUs(offset), TimeUs(0), TimeUs(SEC))
            .unwrap_err();
        assert!(matches!(err.violation(), Some(Violation::KindMismatch { .. })));
    }
    assert!(editor.timeline().clips.is_empty());
}

fn apply_edit(editor: &mut Editor, name: &str, clip: ClipId, track: TrackId) {
    match name {
        "move" => editor.move_clip(clip, track, TimeUs(40 * SEC)).unwrap(),
        "resize" => editor.resize_clip(clip, TimeUs(SEC), TimeUs(9 * SEC)).unwrap(),
        "split" => {
            editor.split_clip(clip, TimeUs(12 * SEC)).unwrap();
        }
        "delete" => editor.delete_clip(clip).unwrap(),
        "add track" => {
            editor.add_track(TrackKind::Audio).unwrap();
        }
        "remove track" => editor.remove_track(track).unwrap(),
        "add cut" => editor.add_cut(Range::from_seconds(1.5, 4.0)).unwrap(),
        "remove cut" => editor.remove_cut(0).unwrap(),
        "clear cuts" => editor.clear_cuts().unwrap(),
        other => panic!("unknown edit {other}"),
    }
}

#[test]
fn undo_restores_exact_prior_state_for_each_edit() {
    let mut editor = Editor::default();
    let media = video(&mut editor, 30);
    let track = editor.add_track(TrackKind::Video).unwrap();
    let clip = editor.place_media(media, Some(track.id), TimeUs(0)).unwrap();
    editor.add_cut(Range::from_seconds(1.0, 2.0)).unwrap();

    let edits = [
        "move",
        "resize",
        "split",
        "delete",
        "add track",
        "remove track",
        "add cut",
        "remove cut",
        "clear cuts",
    ];

    for name in edits {
        let before = editor.timeline().clone();
        apply_edit(&mut editor, name, clip.id, track.id);
        let after = editor.timeline().clone();
        assert_ne!(before, after, "{name} changed nothing");

        editor.undo().unwrap();
        assert_eq!(editor.timeline(), &before, "undo of {name}");
        editor.redo().unwrap();
        assert_eq!(editor.timeline(), &after, "redo of {name}");
        editor.undo().unwrap();
    }
}

#[test]
fn undo_of_place_on_new_track_is_single_step() {
    let mut editor = Editor::default();
    let media = video(&mut editor, 10);
    let track = editor.add_track(TrackKind::Video).unwrap();
    editor.place_media(media, Some(track.id), TimeUs(0)).unwrap();
    let before = editor.timeline().clone();

    let clip = editor.place_media(media, Some(track.id), TimeUs(5 * SEC)).unwrap();
    assert_ne!(clip.track_id, track.id);
    assert_eq!(editor.timeline().tracks.len(), 2);

    editor.undo().unwrap();
    assert_eq!(editor.timeline(), &before);
}

#[test]
fn undo_fails_cleanly_when_track_was_locked() {
    let mut editor = Editor::default();
    let media = video(&mut editor, 10);
    let track = editor.add_track(TrackKind::Video).unwrap();
    editor.place_media(media, Some(track.id), TimeUs(0)).unwrap();
    editor.set_track_locked(track.id, true).unwrap();

    let before = editor.timeline().clone();
    let position = editor.history().position();
    let err = editor.undo().unwrap_err();
    assert!(matches!(err, CoreError::HistoryReplay { .. }));
    assert!(matches!(err.violation(), Some(Violation::TrackLocked(_))));
    assert_eq!(editor.timeline(), &before);
    assert_eq!(editor.history().position(), position);
}

#[test]
fn scripted_session_through_input_events() {
    let mut editor = Editor::new(EngineConfig::default(), 1000.0);
    let media = video(&mut editor, 20);

    let json = format!(
        r#"[
            {{"type": "drag_enter", "media_id": "{media}"}},
            {{"type": "drag_over", "x": 10, "y": 50}},
            {{"type": "drag_over", "x": 20, "y": 50}},
            {{"type": "drop", "x": 0, "y": 50}},
            {{"type": "key", "key": "end"}}
        ]"#
    );
    let events: Vec<InputEvent> = serde_json::from_str(&json).unwrap();
    editor.handle_events(events).unwrap();

    let snap = editor.snapshot();
    assert_eq!(snap.tracks.len(), 1);
    assert_eq!(snap.clips.len(), 1);
    assert_eq!(snap.clips[0].offset, TimeUs(0));
    assert_eq!(snap.playhead, editor.effective_duration());
}

// ---------------------------------------------------------------------------
// Edits landing mid-gesture
// ---------------------------------------------------------------------------

fn editor_with_placed_clip() -> (Editor, Clip) {
    let mut editor = Editor::new(EngineConfig::default(), 1000.0);
    let media = video(&mut editor, 20);
    let track = editor.add_track(TrackKind::Video).unwrap();
    let clip = editor.place_media(media, Some(track.id), TimeUs(0)).unwrap();
    (editor, clip)
}

#[test]
fn delete_during_resize_then_escape_keeps_clip_deleted() {
    let (mut editor, clip) = editor_with_placed_clip();
    let y = first_row_y(&editor);
    let right = editor.view().time_to_pixel(clip.timeline_end().as_seconds());

    editor.set_tool(Tool::Resize);
    editor.select(Some(clip.id));
    editor.handle_events([down(right, y), moved(right - 100.0, y)]).unwrap();
    assert!(matches!(editor.state(), InteractionState::Resizing { .. }));
    assert!(editor.timeline().clip(clip.id).unwrap().end_time < clip.end_time);

    editor.handle_event(key(Key::Delete)).unwrap();
    assert!(editor.timeline().clip(clip.id).is_none());
    assert!(editor.state().is_idle());

    editor.handle_event(key(Key::Escape)).unwrap();
    assert!(editor.timeline().clip(clip.id).is_none());
    editor.timeline().check_invariants().unwrap();

    // The delete recorded the clip at its pre-gesture size.
    editor.undo().unwrap();
    assert_eq!(editor.timeline().clip(clip.id), Some(&clip));
    editor.redo().unwrap();
    assert!(editor.timeline().clip(clip.id).is_none());
}

#[test]
fn api_split_during_resize_splits_the_original_clip() {
    let (mut editor, clip) = editor_with_placed_clip();
    let y = first_row_y(&editor);
    let right = editor.view().time_to_pixel(clip.timeline_end().as_seconds());
    let before = editor.timeline().clone();

    editor.set_tool(Tool::Resize);
    editor.select(Some(clip.id));
    editor.handle_events([down(right, y), moved(right - 150.0, y)]).unwrap();

    let (left, right_half) = editor.split_clip(clip.id, TimeUs(5 * SEC)).unwrap();
    assert!(editor.state().is_idle());
    assert_eq!(right_half.timeline_end(), clip.timeline_end());
    assert_eq!(left.offset, clip.offset);

    // Releasing afterwards records nothing further.
    let position = editor.history().position();
    editor.handle_event(up(right - 150.0, y)).unwrap();
    assert_eq!(editor.history().position(), position);

    editor.undo().unwrap();
    assert_eq!(editor.timeline(), &before);
}

#[test]
fn delete_during_clip_drag_drops_the_gesture() {
    let (mut editor, clip) = editor_with_placed_clip();
    let y = first_row_y(&editor);
    let mid = editor.view().time_to_pixel(5.0);

    editor
        .handle_events([down(mid, y), moved(mid + 60.0, y), moved(mid + 120.0, y)])
        .unwrap();
    assert!(matches!(editor.state(), InteractionState::Dragging { .. }));

    editor.delete_clip(clip.id).unwrap();
    assert!(editor.state().is_idle());

    let position = editor.history().position();
    editor.handle_event(up(mid + 120.0, y)).unwrap();
    assert_eq!(editor.history().position(), position);
    assert!(editor.timeline().clips.is_empty());

    editor.undo().unwrap();
    assert_eq!(editor.timeline().clip(clip.id), Some(&clip));
}

#[test]
fn undo_during_clip_drag_ends_the_gesture() {
    let (mut editor, clip) = editor_with_placed_clip();
    let y = first_row_y(&editor);
    let mid = editor.view().time_to_pixel(5.0);

    editor.handle_events([down(mid, y), moved(mid + 80.0, y)]).unwrap();
    assert!(matches!(editor.state(), InteractionState::Dragging { .. }));

    editor.undo().unwrap();
    assert!(editor.state().is_idle());
    assert!(editor.timeline().clip(clip.id).is_none());
    editor.handle_event(up(mid + 80.0, y)).unwrap();
    assert!(editor.timeline().clips.is_empty());
    editor.timeline().check_invariants().unwrap();
}

// ---------------------------------------------------------------------------
// Extreme input
// ---------------------------------------------------------------------------

#[test]
fn external_drag_to_huge_x_stays_in_range() {
    let mut editor = Editor::new(EngineConfig::default(), 1000.0);
    let media = video(&mut editor, 20);
    let y = first_row_y(&editor);

    editor
        .handle_events([
            InputEvent::DragEnter { media_id: media },
            InputEvent::DragOver { x: 1e300, y },
            InputEvent::Drop { x: 1e300, y },
        ])
        .unwrap();

    editor.timeline().check_invariants().unwrap();
    let clip = editor.timeline().clips.values().next().copied().unwrap();
    assert!(clip.offset.as_seconds() <= TimeUs::LIMIT_SECS);
    assert!(editor.effective_duration().is_finite());
}

#[test]
fn clip_drag_to_huge_x_stays_in_range() {
    let (mut editor, clip) = editor_with_placed_clip();
    let y = first_row_y(&editor);
    let mid = editor.view().time_to_pixel(5.0);

    editor
        .handle_events([down(mid, y), moved(mid + 50.0, y), moved(1e300, y), up(1e300, y)])
        .unwrap();

    editor.timeline().check_invariants().unwrap();
    let moved_clip = editor.timeline().clip(clip.id).unwrap();
    assert!(moved_clip.offset > clip.offset);
    assert!(moved_clip.timeline_end().as_seconds() <= TimeUs::LIMIT_SECS + 20.0);
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[test]
fn editor_survives_inverted_zoom_and_zero_durations() {
    let config = EngineConfig {
        min_zoom: 8.0,
        max_zoom: 0.5,
        default_duration_secs: 0.0,
        default_image_secs: -1.0,
        ..EngineConfig::default()
    };
    let mut editor = Editor::new(config, 1000.0);
    assert!(editor.config().min_zoom <= editor.config().max_zoom);
    assert!(editor.effective_duration() > 0.0);

    let x = editor.view().time_to_pixel(3.0);
    assert!(x.is_finite());
    assert!(editor.view().pixel_to_time(x).is_finite());

    editor.set_zoom(100.0, Some(500.0), false);
    assert!(editor.view().zoom() <= 8.0);

    let image = editor.add_media(MediaRef::new("still.png", "/still.png", MediaKind::Image, None));
    let clip = editor.place_media(image, None, TimeUs(0)).unwrap();
    assert!(clip.content_duration() > TimeUs::ZERO);
}

#[test]
fn config_file_with_bad_values_loads_usable_defaults() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{ "min_zoom": -2, "max_zoom": 0, "track_height_px": 0, "history_max_len": 0 }}"#
    )
    .unwrap();

    let config = EngineConfig::load_from_file(file.path()).unwrap();
    let defaults = EngineConfig::default();
    assert_eq!(config.min_zoom, defaults.min_zoom);
    assert_eq!(config.max_zoom, defaults.max_zoom);
    assert_eq!(config.track_height_px, defaults.track_height_px);
    assert_eq!(config.history_max_len, defaults.history_max_len);

    let mut editor = Editor::new(config, 800.0);
    let media = video(&mut editor, 5);
    editor.place_media(media, None, TimeUs(0)).unwrap();
    editor.undo().unwrap();
    assert!(editor.timeline().clips.is_empty());
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum Op {
    Place { media: usize, track: usize, at: i64 },
    Add { media: usize, track: usize, at: i64 },
    Move { clip: usize, track: usize, at: i64 },
    Relocate { clip: usize, track: usize, at: i64 },
    Resize { clip: usize, end: i64 },
    Split { clip: usize, at: i64 },
    Undo,
    Redo,
}

/// Positions land on a half-second grid so clips touch and collide often.
fn op_strategy() -> impl Strategy<Value = Op> {
    let at = (0i64..60).prop_map(|half| half * SEC / 2);
    prop_oneof![
        2 => (0usize..3, 0usize..8, at.clone()).prop_map(|(media, track, at)| Op::Place { media, track, at }),
        1 => (0usize..3, 0usize..8, at.clone()).prop_map(|(media, track, at)| Op::Add { media, track, at }),
        1 => (0usize..64, 0usize..8, at.clone()).prop_map(|(clip, track, at)| Op::Move { clip, track, at }),
        1 => (0usize..64, 0usize..8, at.clone()).prop_map(|(clip, track, at)| Op::Relocate { clip, track, at }),
        1 => (0usize..64, 1i64..17).prop_map(|(clip, end)| Op::Resize { clip, end: end * SEC }),
        1 => (0usize..64, at).prop_map(|(clip, at)| Op::Split { clip, at }),
        1 => Just(Op::Undo),
        1 => Just(Op::Redo),
    ]
}

fn apply_op(editor: &mut Editor, medias: &[MediaId], op: &Op) -> Result<()> {
    let tracks: Vec<TrackId> = editor.timeline().tracks_sorted().iter().map(|t| t.id).collect();
    let clips: Vec<ClipId> = editor.timeline().clips.keys().copied().collect();
    let track = |n: usize| tracks[n % tracks.len()];
    let clip = |n: usize| clips.get(n % clips.len().max(1)).copied();

    match *op {
        Op::Place { media, track: t, at } => editor
            .place_media(medias[media % medias.len()], Some(track(t)), TimeUs(at))
            .map(|_| ()),
        Op::Add { media, track: t, at } => editor
            .add_clip(medias[media % medias.len()], track(t), TimeUs(at), TimeUs(0), TimeUs(3 * SEC))
            .map(|_| ()),
        Op::Move { clip: c, track: t, at } => match clip(c) {
            Some(id) => editor.move_clip(id, track(t), TimeUs(at)),
            None => Ok(()),
        },
        Op::Relocate { clip: c, track: t, at } => match clip(c) {
            Some(id) => editor.relocate_clip(id, Some(track(t)), TimeUs(at)).map(|_| ()),
            None => Ok(()),
        },
        Op::Resize { clip: c, end } => match clip(c) {
            Some(id) => editor.resize_clip(id, TimeUs(0), TimeUs(end)),
            None => Ok(()),
        },
        Op::Split { clip: c, at } => match clip(c) {
            Some(id) => editor.split_clip(id, TimeUs(at)).map(|_| ()),
            None => Ok(()),
        },
        Op::Undo => editor.undo(),
        Op::Redo => editor.redo(),
    }
}

proptest! {
    #[test]
    fn mapper_round_trips_across_zoom_and_pan(
        zoom in 0.1f64..10.0,
        pan in 0.0f64..10_000.0,
        fraction in 0.0f64..=1.0,
    ) {
        let mut view = ViewState::new(1280.0, 245.0, &EngineConfig::default());
        view.set_zoom(zoom, None, false);
        view.set_pan(pan);
        let t = 245.0 * fraction;
        let back = view.pixel_to_time(view.time_to_pixel(t));
        prop_assert!((back - t).abs() < 1e-9, "zoom {} pan {} t {} -> {}", zoom, pan, t, back);
    }

    #[test]
    fn no_overlap_after_any_operation_sequence(ops in proptest::collection::vec(op_strategy(), 1..120)) {
        let mut editor = Editor::default();
        let medias: Vec<MediaId> = [4, 9, 17].iter().map(|&s| video(&mut editor, s)).collect();
        editor.add_track(TrackKind::Video).unwrap();
        editor.add_track(TrackKind::Video).unwrap();
        editor.clear_history();

        for op in &ops {
            // Rejected edits are fine; they must leave the timeline sound.
            let _ = apply_op(&mut editor, &medias, op);
            assert_no_overlap(editor.timeline());
            prop_assert!(editor.timeline().check_invariants().is_ok(), "after {:?}", op);
        }
    }
}
