use std::path::Path;

use crate::error::{MediaError, Result};

/// Sample rate the audio is decoded at before peak reduction.
pub const PEAK_SAMPLE_RATE: u32 = 8000;

/// Decoded samples folded into one peak value.
pub const SAMPLES_PER_PEAK: usize = 100;

/// Extract a coarse amplitude envelope from a media file using ffmpeg.
/// Decodes to raw mono PCM, then reduces each window to its loudest sample.
pub fn extract_peaks(source_path: &Path) -> Result<Vec<i16>> {
    if !source_path.exists() {
        return Err(MediaError::FileNotFound(source_path.to_path_buf()));
    }

    let output = std::process::Command::new("ffmpeg")
        .args([
            "-v",
            "error",
            "-i",
            &source_path.to_string_lossy(),
            "-f",
            "s16le",
            "-ac",
            "1",
            "-ar",
            &PEAK_SAMPLE_RATE.to_string(),
            "-acodec",
            "pcm_s16le",
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
            "peak extraction failed: {}",
            String::from_utf8_lossy(&output.stderr)
        )));
    }

    let samples: Vec<i16> = output
        .stdout
        .chunks_exact(2)
        .map(|chunk| i16::from_le_bytes([chunk[0], chunk[1]]))
        .collect();

    Ok(compute_peaks(&samples, SAMPLES_PER_PEAK))
}

/// Loudest absolute sample per window. A trailing partial window still counts.
fn compute_peaks(samples: &[i16], samples_per_peak: usize) -> Vec<i16> {
    samples
        .chunks(samples_per_peak.max(1))
        .map(|chunk| {
            chunk
                .iter()
                .map(|s| s.saturating_abs())
                .max()
                .unwrap_or(0)
        })
        .collect()
}
