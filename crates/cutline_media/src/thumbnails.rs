use std::path::Path;

use crate::error::{MediaError, Result};

/// Grab one frame at `time_seconds`, scaled to `width`, as PNG bytes.
pub fn extract_thumbnail(source_path: &Path, time_seconds: f64, width: u32) -> Result<Vec<u8>> {
    let output = std::process::Command::new("ffmpeg")
        .args([
            "-v",
            "error",
            "-ss",
            &format!("{time_seconds:.3}"),
            "-i",
            &source_path.to_string_lossy(),
            "-vframes",
            "1",
            "-vf",
            &format!("scale={width}:-1"),
            "-f",
            "image2pipe",
            "-vcodec",
            "png",
            "-",
        ])
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .output()
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => MediaError::FfmpegNotFound,
            _ => MediaError::Io(e),
        })?;

    if !output.status.success() {
        return Err(MediaError::FfmpegFailed(format!(
            "thumbnail at {time_seconds:.3}s failed: {}",
            String::from_utf8_lossy(&output.stderr)
        )));
    }
    Ok(output.stdout)
}

/// Extract `count` evenly spaced thumbnails across `duration_seconds`.
pub fn extract_thumbnails(
    source_path: &Path,
    duration_seconds: f64,
    count: usize,
    width: u32,
) -> Result<Vec<Vec<u8>>> {
    if !source_path.exists() {
        return Err(MediaError::FileNotFound(source_path.to_path_buf()));
    }
    thumbnail_times(duration_seconds, count)
        .into_iter()
        .map(|t| extract_thumbnail(source_path, t, width))
        .collect()
}

/// Start times of `count` equal slices of the duration.
fn thumbnail_times(duration_seconds: f64, count: usize) -> Vec<f64> {
    if count == 0 || !duration_seconds.is_finite() || duration_seconds <= 0.0 {
        return vec![];
    }
    let interval = duration_seconds / count as f64;
    (0..count).map(|i| i as f64 * interval).collect()
}
