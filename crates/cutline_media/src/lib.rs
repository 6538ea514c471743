//! Media collaborators for the cutline engine: ffprobe/ffmpeg backed probing,
//! waveform peaks, thumbnails, preview proxies and cut export, plus the async job runner that
//! feeds the presentation caches.

pub mod backend;
pub mod error;
pub mod export;
pub mod jobs;
pub mod probe;
pub mod proxy;
pub mod thumbnails;
pub mod waveform;

pub use backend::{FfmpegBackend, MediaBackend};
pub use error::{MediaError, Result};
pub use export::ExportRequest;
pub use jobs::{JobKind, MediaJobs, PresentationCache};
