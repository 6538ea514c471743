use anyhow::{Context, Result};
use cutline_core::{EngineConfig, Editor, InputEvent, MediaRef, TrackKind};
use serde::Deserialize;
use std::path::{Path, PathBuf};

fn default_viewport_width() -> f64 {
    1000.0
}

/// A recorded editing session: what is in the media bin, which tracks
/// exist up front, and the input events to replay.
#[derive(Debug, Deserialize)]
pub struct Session {
    #[serde(default = "default_viewport_width")]
    pub viewport_width: f64,
    /// Media registered as is, ids included so events can refer to them.
    #[serde(default)]
    pub media: Vec<MediaRef>,
    /// Files probed with ffprobe before replay.
    #[serde(default)]
    pub imports: Vec<PathBuf>,
    #[serde(default)]
    pub tracks: Vec<TrackKind>,
    #[serde(default)]
    pub events: Vec<InputEvent>,
}

impl Session {
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read session {}", path.display()))?;
        serde_json::from_str(&data)
            .with_context(|| format!("failed to parse session {}", path.display()))
    }
}

/// Build an editor from the session and replay its events.
pub fn replay(session: Session, config: EngineConfig) -> Result<Editor> {
    let mut editor = Editor::new(config, session.viewport_width);

    for media in session.media {
        editor.add_media(media);
    }
    for path in &session.imports {
        let media = cutline_media::probe::import_media(path)
            .with_context(|| format!("failed to import {}", path.display()))?;
        editor.add_media(media);
    }
    for kind in session.tracks {
        editor.add_track(kind)?;
    }

    let count = session.events.len();
    editor
        .handle_events(session.events)
        .context("replay stopped on a history failure")?;
    tracing::info!(events = count, clips = editor.timeline().clips.len(), "session replayed");
    Ok(editor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cutline_core::{MediaKind, TimeUs};

    fn write_session(dir: &Path, json: &str) -> PathBuf {
        let path = dir.join("session.json");
        std::fs::write(&path, json).unwrap();
        path
    }

    #[test]
    fn replays_a_drop_onto_an_empty_timeline() {
        let media = MediaRef::new(
            "take.mp4",
            "/media/take.mp4",
            MediaKind::Video,
            Some(TimeUs::from_seconds(20.0)),
        );
        let json = format!(
            r#"{{
                "media": [{media}],
                "events": [
                    {{"type": "drag_enter", "media_id": "{id}"}},
                    {{"type": "drag_over", "x": 0, "y": 50}},
                    {{"type": "drop", "x": 0, "y": 50}}
                ]
            }}"#,
            media = serde_json::to_string(&media).unwrap(),
            id = media.id,
        );
        let dir = tempfile::tempdir().unwrap();
        let session = Session::load(&write_session(dir.path(), &json)).unwrap();
        assert_eq!(session.viewport_width, 1000.0);

        let editor = replay(session, EngineConfig::default()).unwrap();
        let snapshot = editor.snapshot();
        assert_eq!(snapshot.tracks.len(), 1);
        assert_eq!(snapshot.clips.len(), 1);
        assert_eq!(snapshot.clips[0].media_id, media.id);
    }

    #[test]
    fn declared_tracks_are_created_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_session(dir.path(), r#"{ "tracks": ["Video", "Audio"] }"#);
        let editor = replay(Session::load(&path).unwrap(), EngineConfig::default()).unwrap();
        let kinds: Vec<TrackKind> = editor
            .timeline()
            .tracks_sorted()
            .iter()
            .map(|t| t.kind)
            .collect();
        assert_eq!(kinds, vec![TrackKind::Video, TrackKind::Audio]);
    }

    #[test]
    fn malformed_session_reports_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_session(dir.path(), "{ not json");
        let err = Session::load(&path).unwrap_err();
        assert!(format!("{err:#}").contains("session.json"));
    }
}
