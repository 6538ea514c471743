use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::{MediaError, Result};
use crate::export::temp_output_path;

/// Proxy width used when the caller passes 0.
pub const DEFAULT_PROXY_WIDTH: u32 = 960;

/// Shared proxy directory under the system temp dir.
pub fn default_proxy_dir() -> PathBuf {
    std::env::temp_dir().join("cutline-proxies")
}

/// `<dir>/<stem>_proxy.mp4` for a source file.
pub fn proxy_output_path(input: &Path, dir: &Path) -> Result<PathBuf> {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| MediaError::Unsupported(format!("no file name in {}", input.display())))?;
    Ok(dir.join(format!("{stem}_proxy.mp4")))
}

/// The proxy for `input` if one was already made.
pub fn existing_proxy(input: &Path, dir: &Path) -> Option<PathBuf> {
    proxy_output_path(input, dir).ok().filter(|p| p.exists())
}

/// Small H.264/AAC transcode, never wider than `max_width` and never upscaled.
/// The width is rounded down to even for yuv420p.
pub fn build_proxy_args(input: &Path, output: &Path, max_width: u32) -> Vec<String> {
    let width = if max_width == 0 { DEFAULT_PROXY_WIDTH } else { max_width };
    let mut args: Vec<String> = vec!["-v".into(), "error".into(), "-i".into()];
    args.push(input.to_string_lossy().into_owned());
    args.push("-vf".into());
    args.push(format!("scale='trunc(min({width},iw)/2)*2':-2"));
    args.extend(
        [
            "-c:v", "libx264", "-preset", "ultrafast", "-crf", "28", "-pix_fmt", "yuv420p",
            "-c:a", "aac", "-b:a", "96k", "-movflags", "+faststart", "-y",
        ]
        .iter()
        .map(|s| s.to_string()),
    );
    args.push(output.to_string_lossy().into_owned());
    args
}

/// Transcode a lightweight preview copy of `input` into `dir` and return its
/// path. An existing proxy is overwritten. Blocking.
pub fn make_preview_proxy(input: &Path, dir: &Path, max_width: u32) -> Result<PathBuf> {
    if !input.exists() {
        return Err(MediaError::FileNotFound(input.to_path_buf()));
    }
    std::fs::create_dir_all(dir)?;
    let output = proxy_output_path(input, dir)?;
    let tmp = temp_output_path(&output);

    tracing::info!(?input, ?output, max_width, "making preview proxy");
    let result = Command::new("ffmpeg")
        .args(build_proxy_args(input, &tmp, max_width))
        .output()
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                MediaError::FfmpegNotFound
            } else {
                MediaError::Io(e)
            }
        })?;

    if !result.status.success() {
        let _ = std::fs::remove_file(&tmp);
        let stderr = String::from_utf8_lossy(&result.stderr);
        return Err(MediaError::FfmpegFailed(stderr.into_owned()));
    }

    std::fs::rename(&tmp, &output)?;
    Ok(output)
}
