use cutline_core::types::ProbeResult;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::export::{self, ExportRequest};
use crate::{probe, proxy, thumbnails, waveform};

/// The media operations the editor delegates. Calls block, so
/// [`crate::jobs::MediaJobs`] runs them off the owner thread.
pub trait MediaBackend: Send + Sync + 'static {
    fn probe(&self, path: &Path) -> Result<ProbeResult>;

    /// Peak magnitudes for the waveform strip.
    fn peaks(&self, path: &Path) -> Result<Vec<i16>>;

    /// `count` PNG frames spread across the media, `width` pixels wide.
    fn thumbnails(&self, path: &Path, count: usize, width: u32) -> Result<Vec<Vec<u8>>>;

    /// Transcode a preview copy at most `max_width` pixels wide and return
    /// where it was written.
    fn proxy(&self, path: &Path, max_width: u32) -> Result<PathBuf>;

    fn export(&self, request: &ExportRequest) -> Result<()>;
}

/// Backend that shells out to `ffprobe` and `ffmpeg` on `PATH`. Proxies go
/// to `proxy_dir`, or the shared temp directory when unset.
#[derive(Debug, Clone, Default)]
pub struct FfmpegBackend {
    pub proxy_dir: Option<PathBuf>,
}

impl FfmpegBackend {
    pub fn with_proxy_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            proxy_dir: Some(dir.into()),
        }
    }
}

impl MediaBackend for FfmpegBackend {
    fn probe(&self, path: &Path) -> Result<ProbeResult> {
        probe::probe_media(path)
    }

    fn peaks(&self, path: &Path) -> Result<Vec<i16>> {
        waveform::extract_peaks(path)
    }

    fn thumbnails(&self, path: &Path, count: usize, width: u32) -> Result<Vec<Vec<u8>>> {
        let duration = probe::probe_media(path)?.duration_us.as_seconds();
        thumbnails::extract_thumbnails(path, duration, count, width)
    }

    fn proxy(&self, path: &Path, max_width: u32) -> Result<PathBuf> {
        let dir = self.proxy_dir.clone().unwrap_or_else(proxy::default_proxy_dir);
        proxy::make_preview_proxy(path, &dir, max_width)
    }

    fn export(&self, request: &ExportRequest) -> Result<()> {
        export::export_with_cuts(request)
    }
}
