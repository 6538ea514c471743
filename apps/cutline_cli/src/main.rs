mod session;

use anyhow::{Context, Result};
use clap::Parser;
use cutline_core::types::MediaKind;
use cutline_core::EngineConfig;
use cutline_media::{ExportRequest, FfmpegBackend, JobKind, MediaJobs};
use std::path::PathBuf;

/// Replay an editing session against the timeline engine and print the result
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Session script: media, tracks and input events as JSON
    #[arg(value_name = "SESSION")]
    session: PathBuf,

    /// Engine configuration JSON; defaults apply to missing keys
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Render the accepted cuts of the replayed session with ffmpeg
    #[arg(short = 'e', long = "export", value_name = "OUTPUT")]
    export: Option<PathBuf>,

    /// Write preview proxies for every video in the session to this directory
    #[arg(short = 'p', long = "proxies", value_name = "DIR")]
    proxies: Option<PathBuf>,

    /// Maximum proxy width in pixels
    #[arg(long = "proxy-width", value_name = "PX", default_value_t = 960)]
    proxy_width: u32,

    /// Print the snapshot as compact JSON
    #[arg(long = "compact")]
    compact: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => EngineConfig::load_from_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => EngineConfig::default(),
    };

    let session = session::Session::load(&args.session)?;
    let mut editor = session::replay(session, config)?;
    let changes = editor.drain_events();
    tracing::debug!(changes = changes.len(), "editor events");

    if let Some(dir) = &args.proxies {
        let mut jobs = MediaJobs::new(FfmpegBackend::with_proxy_dir(dir));
        let videos: Vec<_> = editor
            .timeline()
            .media
            .values()
            .filter(|m| m.kind == MediaKind::Video)
            .collect();
        for media in &videos {
            jobs.request(
                media,
                JobKind::Proxy {
                    max_width: args.proxy_width,
                },
            );
        }
        jobs.finish().await;
        for media in &videos {
            match (jobs.cache().proxy(media.id), jobs.cache().failure(media.id)) {
                (Some(path), _) => tracing::info!(name = %media.name, proxy = %path.display(), "proxy ready"),
                (None, Some(error)) => tracing::warn!(name = %media.name, %error, "proxy failed"),
                (None, None) => {}
            }
        }
    }

    if let Some(output) = &args.export {
        let request = ExportRequest::from_editor(&editor, output)?;
        tracing::info!(
            source = %request.media_path.display(),
            cuts = request.ranges_to_cut.len(),
            clips = request.layout.len(),
            "export requested"
        );
        MediaJobs::new(FfmpegBackend::default()).export(request).await?;
        tracing::info!(output = %output.display(), "export finished");
    }

    let snapshot = editor.snapshot();
    let json = if args.compact {
        serde_json::to_string(&snapshot)?
    } else {
        serde_json::to_string_pretty(&snapshot)?
    };
    println!("{json}");
    Ok(())
}
