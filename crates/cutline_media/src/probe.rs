use cutline_core::types::{MediaKind, MediaRef, ProbeResult, TimeUs};
use serde::Deserialize;
use std::path::Path;

use crate::error::{MediaError, Result};

// ---------------------------------------------------------------------------
// ffprobe JSON output structures
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
    format: FfprobeFormat,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: String,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    channels: Option<u32>,
    sample_rate: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
    format_name: Option<String>,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Run ffprobe on a media file and parse the result into a `ProbeResult`.
pub fn probe_media(path: impl AsRef<Path>) -> Result<ProbeResult> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(MediaError::FileNotFound(path.to_path_buf()));
    }

    let output = std::process::Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path)
        .output()
        .map_err(|e| MediaError::FfprobeExec(e.to_string()))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(MediaError::FfprobeFailed(stderr.into_owned()));
    }

    let probe: FfprobeOutput = serde_json::from_slice(&output.stdout)?;
    Ok(parse_probe_output(&probe))
}

/// Probe a file and build the `MediaRef` to register with the editor.
pub fn import_media(path: impl AsRef<Path>) -> Result<MediaRef> {
    let path = path.as_ref();
    let probe = probe_media(path)?;
    let kind = detect_media_kind(path, &probe)?;

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "unknown".to_string());

    tracing::debug!(?path, ?kind, duration = %probe.duration_us, "media imported");
    Ok(MediaRef::from_probe(name, path, kind, probe))
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

fn parse_probe_output(probe: &FfprobeOutput) -> ProbeResult {
    let video_stream = probe.streams.iter().find(|s| s.codec_type == "video");
    let audio_stream = probe.streams.iter().find(|s| s.codec_type == "audio");

    let duration_us = probe
        .format
        .duration
        .as_deref()
        .and_then(|d| d.parse::<f64>().ok())
        .map(TimeUs::from_seconds)
        .unwrap_or(TimeUs::ZERO);

    let fps = video_stream
        .and_then(|s| s.r_frame_rate.as_deref())
        .and_then(parse_frame_rate)
        .unwrap_or(0.0);

    ProbeResult {
        duration_us,
        width: video_stream.and_then(|s| s.width).unwrap_or(0),
        height: video_stream.and_then(|s| s.height).unwrap_or(0),
        fps,
        audio_rate: audio_stream
            .and_then(|s| s.sample_rate.as_deref())
            .and_then(|r| r.parse::<u32>().ok())
            .unwrap_or(0),
        audio_channels: audio_stream
            .and_then(|s| s.channels)
            .map_or(0, |c| c.min(u8::MAX as u32) as u8),
        video_codec: video_stream
            .and_then(|s| s.codec_name.clone())
            .unwrap_or_default(),
        audio_codec: audio_stream
            .and_then(|s| s.codec_name.clone())
            .unwrap_or_default(),
        container: probe.format.format_name.clone().unwrap_or_default(),
    }
}

/// Parse ffprobe frame rate string like "30000/1001" or "30/1" into f64.
fn parse_frame_rate(rate: &str) -> Option<f64> {
    if let Some((num, den)) = rate.split_once('/') {
        let n: f64 = num.parse().ok()?;
        let d: f64 = den.parse().ok()?;
        if d == 0.0 {
            return None;
        }
        Some(n / d)
    } else {
        rate.parse().ok()
    }
}

/// Media kind from the file extension, falling back to what the probe found.
fn detect_media_kind(path: &Path, probe: &ProbeResult) -> Result<MediaKind> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    match ext.as_str() {
        "png" | "jpg" | "jpeg" | "gif" | "bmp" | "webp" | "tiff" => Ok(MediaKind::Image),
        "mp3" | "wav" | "flac" | "aac" | "ogg" | "m4a" | "wma" => Ok(MediaKind::Audio),
        _ if probe.width > 0 && probe.height > 0 => Ok(MediaKind::Video),
        _ if probe.audio_channels > 0 => Ok(MediaKind::Audio),
        _ => Err(MediaError::Unsupported(format!(
            "{} has neither video nor audio streams",
            path.display()
        ))),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_probe() -> ProbeResult {
        ProbeResult {
            duration_us: TimeUs::ZERO,
            width: 0,
            height: 0,
            fps: 0.0,
            audio_rate: 0,
            audio_channels: 0,
            video_codec: String::new(),
            audio_codec: String::new(),
            container: String::new(),
        }
    }

    #[test]
    fn parse_frame_rate_fraction() {
        assert!((parse_frame_rate("30000/1001").unwrap() - 29.97).abs() < 0.01);
        assert!((parse_frame_rate("25/1").unwrap() - 25.0).abs() < f64::EPSILON);
        assert!(parse_frame_rate("30/0").is_none());
        assert!((parse_frame_rate("23.976").unwrap() - 23.976).abs() < 1e-9);
    }

    #[test]
    fn detect_kind_by_extension() {
        let probe = empty_probe();
        assert_eq!(
            detect_media_kind(Path::new("still.PNG"), &probe).unwrap(),
            MediaKind::Image
        );
        assert_eq!(
            detect_media_kind(Path::new("voice.m4a"), &probe).unwrap(),
            MediaKind::Audio
        );
    }

    #[test]
    fn detect_kind_by_streams() {
        let video = ProbeResult {
            width: 1280,
            height: 720,
            audio_channels: 2,
            ..empty_probe()
        };
        assert_eq!(
            detect_media_kind(Path::new("take.mkv"), &video).unwrap(),
            MediaKind::Video
        );

        let audio = ProbeResult {
            audio_channels: 1,
            ..empty_probe()
        };
        assert_eq!(
            detect_media_kind(Path::new("take.bin"), &audio).unwrap(),
            MediaKind::Audio
        );

        assert!(matches!(
            detect_media_kind(Path::new("take.bin"), &empty_probe()),
            Err(MediaError::Unsupported(_))
        ));
    }

    #[test]
    fn parse_probe_output_video_and_audio() {
        let json = r#"{
            "streams": [
                {
                    "codec_type": "video",
                    "codec_name": "h264",
                    "width": 1920,
                    "height": 1080,
                    "r_frame_rate": "30/1"
                },
                {
                    "codec_type": "audio",
                    "codec_name": "aac",
                    "channels": 2,
                    "sample_rate": "48000"
                }
            ],
            "format": {
                "duration": "10.5",
                "format_name": "mov,mp4,m4a,3gp,3g2,mj2"
            }
        }"#;
        let output: FfprobeOutput = serde_json::from_str(json).unwrap();
        let result = parse_probe_output(&output);

        assert_eq!(result.width, 1920);
        assert_eq!(result.height, 1080);
        assert!((result.fps - 30.0).abs() < f64::EPSILON);
        assert_eq!(result.video_codec, "h264");
        assert_eq!(result.audio_codec, "aac");
        assert_eq!(result.audio_channels, 2);
        assert_eq!(result.audio_rate, 48000);
        assert_eq!(result.container, "mov,mp4,m4a,3gp,3g2,mj2");
        assert_eq!(result.duration_us, TimeUs::from_seconds(10.5));
    }

    #[test]
    fn parse_probe_output_audio_only() {
        let json = r#"{
            "streams": [
                {
                    "codec_type": "audio",
                    "codec_name": "mp3",
                    "channels": 2,
                    "sample_rate": "44100"
                }
            ],
            "format": { "duration": "180.0" }
        }"#;
        let output: FfprobeOutput = serde_json::from_str(json).unwrap();
        let result = parse_probe_output(&output);

        assert_eq!((result.width, result.height), (0, 0));
        assert_eq!(result.video_codec, "");
        assert_eq!(result.audio_codec, "mp3");
        assert_eq!(result.audio_rate, 44100);
        assert_eq!(result.duration_us, TimeUs(180_000_000));
    }

    #[test]
    fn parse_probe_output_missing_fields() {
        let output: FfprobeOutput = serde_json::from_str(r#"{ "format": {} }"#).unwrap();
        let result = parse_probe_output(&output);
        assert_eq!(result, empty_probe());
    }

    #[test]
    fn probe_nonexistent_file_returns_error() {
        let result = probe_media("/tmp/does_not_exist_cutline_probe_test.mp4");
        assert!(matches!(result, Err(MediaError::FileNotFound(_))));
    }
}
