use cutline_core::types::{ClipId, MediaId, Timeline, TrackId};
use cutline_core::Editor;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{MediaError, Result};

/// Cuts closer than this (seconds) to each other are fused before export.
const MERGE_EPSILON_SECS: f64 = 0.005;
/// Degenerate cuts and slivers shorter than this (seconds) are dropped.
const MIN_CUT_SECS: f64 = 0.001;

/// One clip of the timeline as the exporter sees it, all times in seconds.
/// `start..end` is the in/out range within the source; `offset` is where it
/// sits on the timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipLayout {
    pub clip_id: ClipId,
    pub media_id: MediaId,
    pub track_id: TrackId,
    pub media_path: PathBuf,
    pub offset: f64,
    pub start: f64,
    pub end: f64,
}

impl ClipLayout {
    pub fn timeline_end(&self) -> f64 {
        self.offset + (self.end - self.start)
    }
}

/// Everything the export collaborator needs: the sources, the destination and
/// which timeline ranges to drop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportRequest {
    /// Source used when `layout` is empty; cuts then address it directly.
    pub media_path: PathBuf,
    pub output_path: PathBuf,
    /// Timeline ranges in seconds.
    pub ranges_to_cut: Vec<(f64, f64)>,
    /// Duration of `media_path` in seconds, when the probe already knows it.
    pub source_duration: Option<f64>,
    /// Clips ordered by track order, then offset. The first track holding
    /// clips is the one rendered.
    pub layout: Vec<ClipLayout>,
}

impl ExportRequest {
    pub fn from_editor(editor: &Editor, output_path: impl Into<PathBuf>) -> Result<Self> {
        Self::from_timeline(editor.timeline(), output_path)
    }

    /// Assemble a request from the accepted cut pool and the clip layout.
    pub fn from_timeline(timeline: &Timeline, output_path: impl Into<PathBuf>) -> Result<Self> {
        let mut layout = Vec::with_capacity(timeline.clips.len());
        for track in timeline.tracks_sorted() {
            for clip in timeline.clips_on_track(track.id) {
                let media = timeline
                    .media(clip.media_id)
                    .ok_or(MediaError::MediaNotFound(clip.media_id))?;
                layout.push(ClipLayout {
                    clip_id: clip.id,
                    media_id: clip.media_id,
                    track_id: clip.track_id,
                    media_path: media.path.clone(),
                    offset: clip.offset.as_seconds(),
                    start: clip.start_time.as_seconds(),
                    end: clip.end_time.as_seconds(),
                });
            }
        }

        let first = layout.first().ok_or(MediaError::NoClips)?;
        let source_duration = timeline
            .media(first.media_id)
            .and_then(|m| m.duration_us)
            .map(|d| d.as_seconds());

        Ok(Self {
            media_path: first.media_path.clone(),
            output_path: output_path.into(),
            ranges_to_cut: timeline.cuts.as_seconds_pairs(),
            source_duration,
            layout,
        })
    }
}

/// A stretch of one input that survives the cuts, in source seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourceSegment {
    pub input: usize,
    pub start: f64,
    pub end: f64,
}

/// A compiled ffmpeg invocation.
#[derive(Debug, Clone)]
pub struct ExportPlan {
    pub inputs: Vec<PathBuf>,
    pub segments: Vec<SourceSegment>,
    pub filter_graph: String,
}

/// Clamp to `[0, duration]`, order each pair, drop degenerate ranges, then
/// sort and merge ranges that touch within a few milliseconds.
pub fn normalize_cuts(cuts: &[(f64, f64)], duration: f64) -> Vec<(f64, f64)> {
    if duration <= 0.0 {
        return vec![];
    }
    let mut cuts: Vec<(f64, f64)> = cuts
        .iter()
        .map(|&(s, e)| if e < s { (e, s) } else { (s, e) })
        .map(|(s, e)| (s.max(0.0), e.min(duration)))
        .filter(|(s, e)| *e > *s + MIN_CUT_SECS)
        .collect();

    cuts.sort_by(|a, b| a.0.total_cmp(&b.0));
    let mut merged: Vec<(f64, f64)> = Vec::with_capacity(cuts.len());
    for (s, e) in cuts {
        match merged.last_mut() {
            Some(last) if s <= last.1 + MERGE_EPSILON_SECS => last.1 = last.1.max(e),
            _ => merged.push((s, e)),
        }
    }
    merged
}

/// Complement of normalized `cuts` over `[0, duration]`.
pub fn kept_segments(cuts: &[(f64, f64)], duration: f64) -> Vec<(f64, f64)> {
    if duration <= 0.0 {
        return vec![];
    }
    let mut kept = Vec::new();
    let mut t = 0.0;
    for &(s, e) in cuts {
        if s > t {
            kept.push((t, s));
        }
        t = e;
    }
    if t < duration {
        kept.push((t, duration));
    }
    kept
}

/// The clips that make up the output: the first track of the layout, or the
/// whole of `media_path` when there is no layout.
fn rendered_clips(request: &ExportRequest, source_duration: f64) -> Vec<ClipLayout> {
    match request.layout.first() {
        Some(first) => request
            .layout
            .iter()
            .filter(|c| c.track_id == first.track_id)
            .cloned()
            .collect(),
        None => vec![ClipLayout {
            clip_id: ClipId::nil(),
            media_id: MediaId::nil(),
            track_id: TrackId::nil(),
            media_path: request.media_path.clone(),
            offset: 0.0,
            start: 0.0,
            end: source_duration,
        }],
    }
}

/// Intersect each clip's timeline span with the kept timeline ranges and
/// translate the pieces into source time through the clip's offset and
/// in-point. Returns the distinct inputs and the segments in output order.
pub fn map_segments(
    clips: &[ClipLayout],
    cuts: &[(f64, f64)],
) -> (Vec<PathBuf>, Vec<SourceSegment>) {
    let timeline_end = clips.iter().map(ClipLayout::timeline_end).fold(0.0, f64::max);
    let kept = kept_segments(&normalize_cuts(cuts, timeline_end), timeline_end);

    let mut inputs: Vec<PathBuf> = Vec::new();
    let mut segments = Vec::new();
    for clip in clips {
        for &(ks, ke) in &kept {
            let s = ks.max(clip.offset);
            let e = ke.min(clip.timeline_end());
            if e - s <= MIN_CUT_SECS {
                continue;
            }
            let input = match inputs.iter().position(|p| *p == clip.media_path) {
                Some(i) => i,
                None => {
                    inputs.push(clip.media_path.clone());
                    inputs.len() - 1
                }
            };
            segments.push(SourceSegment {
                input,
                start: clip.start + (s - clip.offset),
                end: clip.start + (e - clip.offset),
            });
        }
    }
    (inputs, segments)
}

/// Trim every segment out of its input and concat them to `[outv][outa]`.
pub fn build_filter_graph(segments: &[SourceSegment]) -> String {
    let mut filters: Vec<String> = Vec::with_capacity(segments.len() * 2 + 1);
    let mut concat_inputs = String::new();

    for (i, seg) in segments.iter().enumerate() {
        let (input, start_s, end_s) = (seg.input, seg.start, seg.end);
        filters.push(format!(
            "[{input}:v]trim=start={start_s}:end={end_s},setpts=PTS-STARTPTS[v{i}]"
        ));
        filters.push(format!(
            "[{input}:a]atrim=start={start_s}:end={end_s},asetpts=PTS-STARTPTS,aresample=async=1:first_pts=0[a{i}]"
        ));
        concat_inputs.push_str(&format!("[v{i}][a{i}]"));
    }

    filters.push(format!(
        "{concat_inputs}concat=n={}:v=1:a=1[outv][outa]",
        segments.len()
    ));
    filters.join(";")
}

/// Compile a request. `source_duration` is the length of `media_path`.
/// `None` means the output equals that source untouched and it can be copied.
pub fn compile(request: &ExportRequest, source_duration: f64) -> Result<Option<ExportPlan>> {
    let clips = rendered_clips(request, source_duration);
    let (inputs, segments) = map_segments(&clips, &request.ranges_to_cut);
    if segments.is_empty() {
        return Err(MediaError::NothingKept);
    }

    let whole_source = match segments.as_slice() {
        [only] => {
            inputs[only.input] == request.media_path
                && only.start.abs() <= MIN_CUT_SECS
                && (only.end - source_duration).abs() <= MIN_CUT_SECS
        }
        _ => false,
    };
    if whole_source {
        return Ok(None);
    }

    Ok(Some(ExportPlan {
        filter_graph: build_filter_graph(&segments),
        inputs,
        segments,
    }))
}

/// ffmpeg arguments for a plan, writing to `output`.
pub fn build_ffmpeg_args(plan: &ExportPlan, output: &Path) -> Vec<String> {
    let mut args: Vec<String> = vec!["-v".into(), "error".into()];
    for input in &plan.inputs {
        args.push("-i".into());
        args.push(input.to_string_lossy().into_owned());
    }
    args.push("-filter_complex".into());
    args.push(plan.filter_graph.clone());
    args.extend(
        [
            "-map", "[outv]", "-map", "[outa]", "-c:v", "libx264", "-preset", "medium", "-crf",
            "20", "-pix_fmt", "yuv420p", "-c:a", "aac", "-b:a", "192k", "-movflags",
            "+faststart", "-y",
        ]
        .iter()
        .map(|s| s.to_string()),
    );
    args.push(output.to_string_lossy().into_owned());
    args
}

/// Sibling `name.tmp.ext` the encoder writes before the final rename.
pub fn temp_output_path(output: &Path) -> PathBuf {
    let parent = output.parent().unwrap_or_else(|| Path::new("."));
    let stem = output
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("out");
    let ext = output.extension().and_then(|s| s.to_str()).unwrap_or("mp4");
    parent.join(format!("{stem}.tmp.{ext}"))
}

/// Write the layout with the requested ranges removed. Blocking.
pub fn export_with_cuts(request: &ExportRequest) -> Result<()> {
    let input = &request.media_path;
    if let Some(missing) = std::iter::once(input)
        .chain(request.layout.iter().map(|c| &c.media_path))
        .find(|p| !p.exists())
    {
        return Err(MediaError::FileNotFound(missing.clone()));
    }

    let duration = match request.source_duration {
        Some(d) if d > 0.0 => d,
        _ => crate::probe::probe_media(input)?.duration_us.as_seconds(),
    };

    let Some(plan) = compile(request, duration)? else {
        tracing::info!(?input, output = ?request.output_path, "nothing to cut, copying source");
        std::fs::copy(input, &request.output_path)?;
        return Ok(());
    };

    let tmp = temp_output_path(&request.output_path);
    let args = build_ffmpeg_args(&plan, &tmp);
    tracing::info!(
        inputs = plan.inputs.len(),
        segments = plan.segments.len(),
        output = ?request.output_path,
        "exporting"
    );

    let output = std::process::Command::new("ffmpeg")
        .args(&args)
        .output()
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                MediaError::FfmpegNotFound
            } else {
                MediaError::Io(e)
            }
        })?;

    if !output.status.success() {
        let _ = std::fs::remove_file(&tmp);
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(MediaError::FfmpegFailed(stderr.into_owned()));
    }

    std::fs::rename(&tmp, &request.output_path)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use cutline_core::types::{MediaKind, MediaRef, Range, TimeUs, TrackKind};

    fn request(cuts: Vec<(f64, f64)>) -> ExportRequest {
        ExportRequest {
            media_path: PathBuf::from("/media/take.mp4"),
            output_path: PathBuf::from("/out/final.mp4"),
            ranges_to_cut: cuts,
            source_duration: Some(30.0),
            layout: vec![],
        }
    }

    #[test]
    fn normalize_orders_clamps_and_merges() {
        let cuts = normalize_cuts(&[(12.0, 8.0), (-1.0, 2.0), (7.999, 9.0), (40.0, 50.0)], 30.0);
        assert_eq!(cuts, vec![(0.0, 2.0), (7.999, 12.0)]);
    }

    #[test]
    fn normalize_drops_degenerate_cuts() {
        assert!(normalize_cuts(&[(5.0, 5.0005)], 30.0).is_empty());
        assert!(normalize_cuts(&[(1.0, 2.0)], 0.0).is_empty());
    }

    #[test]
    fn kept_segments_complement_cuts() {
        let kept = kept_segments(&[(0.0, 2.0), (10.0, 12.0)], 30.0);
        assert_eq!(kept, vec![(2.0, 10.0), (12.0, 30.0)]);
        assert_eq!(kept_segments(&[], 4.0), vec![(0.0, 4.0)]);
    }

    fn layout(path: &str, track: TrackId, offset: f64, start: f64, end: f64) -> ClipLayout {
        ClipLayout {
            clip_id: ClipId::new_v4(),
            media_id: MediaId::new_v4(),
            track_id: track,
            media_path: PathBuf::from(path),
            offset,
            start,
            end,
        }
    }

    #[test]
    fn filter_graph_concats_every_segment() {
        let graph = build_filter_graph(&[
            SourceSegment { input: 0, start: 2.0, end: 10.0 },
            SourceSegment { input: 1, start: 12.0, end: 30.0 },
        ]);
        assert!(graph.contains("[0:v]trim=start=2:end=10,setpts=PTS-STARTPTS[v0]"));
        assert!(graph.contains("[1:a]atrim=start=12:end=30"));
        assert!(graph.ends_with("[v0][a0][v1][a1]concat=n=2:v=1:a=1[outv][outa]"));
    }

    #[test]
    fn cuts_map_through_clip_offset_and_in_point() {
        // Source 4..14 placed at 10 s: timeline 10..20.
        let clip = layout("/media/b.mp4", TrackId::new_v4(), 10.0, 4.0, 14.0);
        let (inputs, segments) = map_segments(&[clip], &[(12.0, 15.0)]);
        assert_eq!(inputs, vec![PathBuf::from("/media/b.mp4")]);
        assert_eq!(
            segments,
            vec![
                SourceSegment { input: 0, start: 4.0, end: 6.0 },
                SourceSegment { input: 0, start: 9.0, end: 14.0 },
            ]
        );
    }

    #[test]
    fn offset_clip_exports_its_own_source_range() {
        let track = TrackId::new_v4();
        let mut req = request(vec![(12.0, 15.0)]);
        req.media_path = PathBuf::from("/media/a.mp4");
        req.layout = vec![
            layout("/media/a.mp4", track, 0.0, 0.0, 5.0),
            layout("/media/b.mp4", track, 10.0, 4.0, 14.0),
        ];

        let plan = compile(&req, 30.0).unwrap().unwrap();
        assert_eq!(
            plan.inputs,
            vec![PathBuf::from("/media/a.mp4"), PathBuf::from("/media/b.mp4")]
        );
        assert_eq!(
            plan.segments,
            vec![
                SourceSegment { input: 0, start: 0.0, end: 5.0 },
                SourceSegment { input: 1, start: 4.0, end: 6.0 },
                SourceSegment { input: 1, start: 9.0, end: 14.0 },
            ]
        );
        assert!(plan.filter_graph.contains("[1:v]trim=start=9:end=14"));

        let args = build_ffmpeg_args(&plan, Path::new("/o.mp4"));
        let sources: Vec<&str> = args
            .windows(2)
            .filter(|w| w[0] == "-i")
            .map(|w| w[1].as_str())
            .collect();
        assert_eq!(sources, vec!["/media/a.mp4", "/media/b.mp4"]);
    }

    #[test]
    fn only_the_first_track_is_rendered() {
        let (top, below) = (TrackId::new_v4(), TrackId::new_v4());
        let mut req = request(vec![]);
        req.layout = vec![
            layout("/media/take.mp4", top, 0.0, 2.0, 6.0),
            layout("/media/overlay.mp4", below, 0.0, 0.0, 30.0),
        ];
        let plan = compile(&req, 30.0).unwrap().unwrap();
        assert_eq!(plan.inputs, vec![PathBuf::from("/media/take.mp4")]);
        assert_eq!(plan.segments, vec![SourceSegment { input: 0, start: 2.0, end: 6.0 }]);
    }

    #[test]
    fn full_length_clip_without_cuts_is_copied() {
        let mut req = request(vec![]);
        req.layout = vec![layout("/media/take.mp4", TrackId::new_v4(), 0.0, 0.0, 30.0)];
        assert!(compile(&req, 30.0).unwrap().is_none());
    }

    #[test]
    fn compile_without_cuts_means_copy() {
        assert!(compile(&request(vec![]), 30.0).unwrap().is_none());
    }

    #[test]
    fn compile_everything_cut_is_an_error() {
        let result = compile(&request(vec![(0.0, 30.0)]), 30.0);
        assert!(matches!(result, Err(MediaError::NothingKept)));
    }

    #[test]
    fn ffmpeg_args_map_outputs() {
        let plan = compile(&request(vec![(5.0, 6.0)]), 30.0).unwrap().unwrap();
        let args = build_ffmpeg_args(&plan, Path::new("/o.tmp.mp4"));
        assert_eq!(args[3], "/media/take.mp4");
        assert!(args.windows(2).any(|w| w[0] == "-map" && w[1] == "[outv]"));
        assert!(args.windows(2).any(|w| w[0] == "-filter_complex" && w[1] == plan.filter_graph));
        assert_eq!(args.last().map(String::as_str), Some("/o.tmp.mp4"));
    }

    #[test]
    fn temp_path_is_a_sibling() {
        assert_eq!(
            temp_output_path(Path::new("/out/final.mov")),
            PathBuf::from("/out/final.tmp.mov")
        );
    }

    #[test]
    fn request_from_empty_timeline_has_no_clips() {
        let timeline = Timeline::new();
        assert!(matches!(
            ExportRequest::from_timeline(&timeline, "/out.mp4"),
            Err(MediaError::NoClips)
        ));
    }

    #[test]
    fn request_from_timeline_uses_accepted_cuts_and_ordered_layout() {
        let mut timeline = Timeline::new();
        let media = MediaRef::new(
            "take.mp4",
            "/media/take.mp4",
            MediaKind::Video,
            Some(TimeUs::from_seconds(20.0)),
        );
        let media_id = timeline.add_media(media);
        let top = timeline.add_track(TrackKind::Video);
        let below = timeline.add_track(TrackKind::Video);
        let late = timeline
            .add_clip(media_id, top.id, TimeUs::from_seconds(8.0), TimeUs::ZERO, TimeUs::from_seconds(2.0))
            .unwrap();
        let early = timeline
            .add_clip(media_id, top.id, TimeUs::ZERO, TimeUs::ZERO, TimeUs::from_seconds(2.0))
            .unwrap();
        let other = timeline
            .add_clip(media_id, below.id, TimeUs::ZERO, TimeUs::ZERO, TimeUs::from_seconds(1.0))
            .unwrap();
        timeline.cuts.add_cut(Range::from_seconds(3.0, 4.0)).unwrap();

        let req = ExportRequest::from_timeline(&timeline, "/out/final.mp4").unwrap();
        assert_eq!(req.media_path, PathBuf::from("/media/take.mp4"));
        assert_eq!(req.ranges_to_cut, vec![(3.0, 4.0)]);
        assert_eq!(req.source_duration, Some(20.0));
        let order: Vec<ClipId> = req.layout.iter().map(|c| c.clip_id).collect();
        assert_eq!(order, vec![early.id, late.id, other.id]);
        assert!(req.layout.iter().all(|c| c.media_path == req.media_path));
    }
}
