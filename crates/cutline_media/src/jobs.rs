use cutline_core::types::{MediaId, MediaKind, MediaRef, ProbeResult};
use cutline_core::EditorEvent;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::backend::MediaBackend;
use crate::error::{MediaError, Result};
use crate::export::ExportRequest;

/// Thumbnails requested per media by [`MediaJobs::request_all`].
pub const DEFAULT_THUMBNAIL_COUNT: usize = 8;
pub const DEFAULT_THUMBNAIL_WIDTH: u32 = 160;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    Probe,
    Peaks,
    Thumbnails { count: usize, width: u32 },
    Proxy { max_width: u32 },
}

#[derive(Debug)]
enum JobOutput {
    Probe(ProbeResult),
    Peaks(Vec<i16>),
    Thumbnails(Vec<Vec<u8>>),
    Proxy(PathBuf),
}

#[derive(Debug)]
struct JobResult {
    media_id: MediaId,
    generation: u64,
    kind: JobKind,
    output: Result<JobOutput>,
}

// ---------------------------------------------------------------------------
// PresentationCache
// ---------------------------------------------------------------------------

/// Read-only presentation data keyed by media id. Only [`MediaJobs::drain`]
/// writes to it.
#[derive(Debug, Default)]
pub struct PresentationCache {
    probes: HashMap<MediaId, ProbeResult>,
    peaks: HashMap<MediaId, Vec<i16>>,
    thumbnails: HashMap<MediaId, Vec<Vec<u8>>>,
    proxies: HashMap<MediaId, PathBuf>,
    failures: HashMap<MediaId, String>,
}

impl PresentationCache {
    pub fn probe(&self, id: MediaId) -> Option<&ProbeResult> {
        self.probes.get(&id)
    }

    pub fn peaks(&self, id: MediaId) -> Option<&[i16]> {
        self.peaks.get(&id).map(Vec::as_slice)
    }

    pub fn thumbnails(&self, id: MediaId) -> Option<&[Vec<u8>]> {
        self.thumbnails.get(&id).map(Vec::as_slice)
    }

    /// Playback proxy, once [`JobKind::Proxy`] has finished.
    pub fn proxy(&self, id: MediaId) -> Option<&Path> {
        self.proxies.get(&id).map(PathBuf::as_path)
    }

    /// Last error reported for a media, if any job failed.
    pub fn failure(&self, id: MediaId) -> Option<&str> {
        self.failures.get(&id).map(String::as_str)
    }

    pub fn invalidate(&mut self, id: MediaId) {
        self.probes.remove(&id);
        self.peaks.remove(&id);
        self.thumbnails.remove(&id);
        self.proxies.remove(&id);
        self.failures.remove(&id);
    }

    pub fn is_empty(&self) -> bool {
        self.probes.is_empty()
            && self.peaks.is_empty()
            && self.thumbnails.is_empty()
            && self.proxies.is_empty()
    }

    fn merge(&mut self, media_id: MediaId, output: JobOutput) {
        self.failures.remove(&media_id);
        match output {
            JobOutput::Probe(probe) => {
                self.probes.insert(media_id, probe);
            }
            JobOutput::Peaks(peaks) => {
                self.peaks.insert(media_id, peaks);
            }
            JobOutput::Thumbnails(frames) => {
                self.thumbnails.insert(media_id, frames);
            }
            JobOutput::Proxy(path) => {
                self.proxies.insert(media_id, path);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// MediaJobs
// ---------------------------------------------------------------------------

/// Runs backend calls on the blocking pool and merges their results into a
/// [`PresentationCache`] when the owner calls [`drain`](Self::drain).
///
/// Spawning requires a Tokio runtime.
pub struct MediaJobs<B: MediaBackend> {
    backend: Arc<B>,
    tx: mpsc::UnboundedSender<JobResult>,
    rx: mpsc::UnboundedReceiver<JobResult>,
    generations: HashMap<MediaId, u64>,
    tasks: HashMap<MediaId, Vec<JoinHandle<()>>>,
    cache: PresentationCache,
}

impl<B: MediaBackend> MediaJobs<B> {
    pub fn new(backend: B) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            backend: Arc::new(backend),
            tx,
            rx,
            generations: HashMap::new(),
            tasks: HashMap::new(),
            cache: PresentationCache::default(),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn cache(&self) -> &PresentationCache {
        &self.cache
    }

    /// Number of spawned jobs that have not finished yet.
    pub fn pending(&self) -> usize {
        self.tasks
            .values()
            .flatten()
            .filter(|handle| !handle.is_finished())
            .count()
    }

    /// Queue one job for a media.
    pub fn request(&mut self, media: &MediaRef, kind: JobKind) {
        let media_id = media.id;
        let generation = *self.generations.entry(media_id).or_insert(0);
        let path = media.path.clone();
        let backend = Arc::clone(&self.backend);
        let tx = self.tx.clone();

        let handle = tokio::task::spawn_blocking(move || {
            let output = run_job(backend.as_ref(), path, kind);
            // Receiver gone means the owner was dropped.
            let _ = tx.send(JobResult {
                media_id,
                generation,
                kind,
                output,
            });
        });

        debug!(%media_id, ?kind, generation, "media job queued");
        let handles = self.tasks.entry(media_id).or_default();
        handles.retain(|h| !h.is_finished());
        handles.push(handle);
    }

    /// Queue everything the presentation layer shows for this kind of media.
    pub fn request_all(&mut self, media: &MediaRef) {
        self.request(media, JobKind::Probe);
        if media.kind != MediaKind::Image {
            self.request(media, JobKind::Peaks);
        }
        if media.kind != MediaKind::Audio {
            self.request(
                media,
                JobKind::Thumbnails {
                    count: DEFAULT_THUMBNAIL_COUNT,
                    width: DEFAULT_THUMBNAIL_WIDTH,
                },
            );
        }
    }

    /// Abort outstanding jobs for a media. Results already in flight are
    /// dropped at the next drain.
    pub fn cancel(&mut self, media_id: MediaId) {
        *self.generations.entry(media_id).or_insert(0) += 1;
        if let Some(handles) = self.tasks.remove(&media_id) {
            for handle in handles {
                handle.abort();
            }
        }
        debug!(%media_id, "media jobs cancelled");
    }

    /// Merge every finished result whose generation is still current.
    /// Returns how many results were merged.
    pub fn drain(&mut self) -> usize {
        let mut merged = 0;
        while let Ok(result) = self.rx.try_recv() {
            let current = self.generations.get(&result.media_id).copied();
            if current != Some(result.generation) {
                debug!(media_id = %result.media_id, kind = ?result.kind, "stale media job result dropped");
                continue;
            }
            match result.output {
                Ok(output) => {
                    self.cache.merge(result.media_id, output);
                    merged += 1;
                }
                Err(e) => {
                    warn!(media_id = %result.media_id, kind = ?result.kind, error = %e, "media job failed");
                    self.cache.failures.insert(result.media_id, e.to_string());
                }
            }
        }
        merged
    }

    /// Wait for every outstanding job, then drain. For hosts that can block
    /// on the media layer, such as the CLI and tests.
    pub async fn finish(&mut self) -> usize {
        let handles: Vec<JoinHandle<()>> = self.tasks.drain().flat_map(|(_, h)| h).collect();
        for handle in handles {
            if let Err(e) = handle.await {
                if !e.is_cancelled() {
                    warn!(error = %e, "media job panicked");
                }
            }
        }
        self.drain()
    }

    /// React to engine changes. Removing media cancels its jobs and
    /// empties its cache entries.
    pub fn handle_event(&mut self, event: &EditorEvent) {
        if let EditorEvent::MediaRemoved { media_id } = event {
            self.cancel(*media_id);
            self.cache.invalidate(*media_id);
        }
    }

    /// Run an export on the blocking pool.
    pub async fn export(&self, request: ExportRequest) -> Result<()> {
        let backend = Arc::clone(&self.backend);
        tokio::task::spawn_blocking(move || backend.export(&request))
            .await
            .map_err(|e| MediaError::Task(e.to_string()))?
    }
}

fn run_job<B: MediaBackend>(backend: &B, path: PathBuf, kind: JobKind) -> Result<JobOutput> {
    match kind {
        JobKind::Probe => backend.probe(&path).map(JobOutput::Probe),
        JobKind::Peaks => backend.peaks(&path).map(JobOutput::Peaks),
        JobKind::Thumbnails { count, width } => backend
            .thumbnails(&path, count, width)
            .map(JobOutput::Thumbnails),
        JobKind::Proxy { max_width } => backend.proxy(&path, max_width).map(JobOutput::Proxy),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
