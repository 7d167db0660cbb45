// media_meta - extract capture metadata from images and videos
// Prints one JSON record per input file on stdout

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use media_meta::{ExtractorConfig, MediaSource, MetadataExtractor};

#[derive(Parser)]
#[command(name = "media_meta", version, about = "Extract capture metadata from images and videos")]
struct Args {
    /// Media files to inspect
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Declared format (extension or MIME type) instead of sniffing
    #[arg(long)]
    format: Option<String>,

    /// ffprobe executable
    #[arg(long, env = "MEDIA_META_FFPROBE_PATH", default_value = "ffprobe")]
    ffprobe: PathBuf,

    /// ffmpeg executable, used for thumbnails
    #[arg(long, env = "MEDIA_META_FFMPEG_PATH", default_value = "ffmpeg")]
    ffmpeg: PathBuf,

    /// Timeout for each external tool invocation
    #[arg(long, env = "MEDIA_META_TIMEOUT_SECS", default_value_t = 30)]
    timeout_secs: u64,

    /// Seconds into the video the thumbnail is taken from
    #[arg(long, default_value_t = 1.0)]
    thumbnail_offset: f64,

    /// Write a JPEG thumbnail of the first file here
    #[arg(long)]
    thumbnail: Option<PathBuf>,

    /// Thumbnail width (0 keeps the aspect ratio)
    #[arg(long, default_value_t = 320)]
    width: u32,

    /// Thumbnail height (0 keeps the aspect ratio)
    #[arg(long, default_value_t = 0)]
    height: u32,

    /// Pretty-print JSON output
    #[arg(long)]
    pretty: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info"))
        )
        .init();

    let args = Args::parse();

    let offset = Duration::try_from_secs_f64(args.thumbnail_offset)
        .context("Invalid thumbnail offset")?;
    let config = ExtractorConfig::default()
        .with_ffprobe(&args.ffprobe)
        .with_ffmpeg(&args.ffmpeg)
        .with_timeout(Duration::from_secs(args.timeout_secs.max(1)))
        .with_thumbnail_offset(offset);
    let extractor = MetadataExtractor::new(config);

    if !extractor.prober().is_available().await {
        warn!(
            "{} is not available, video files will fail",
            args.ffprobe.display()
        );
    }

    for path in &args.files {
        let source = MediaSource::from_path(path);
        let metadata = extractor
            .extract(&source, args.format.as_deref())
            .await
            .with_context(|| format!("Failed to extract metadata from {}", path.display()))?;

        for miss in metadata.missing_fields() {
            info!(
                file = %path.display(),
                field = %miss.field,
                cause = %miss.cause,
                "Field not extracted"
            );
        }

        let json = if args.pretty {
            serde_json::to_string_pretty(&metadata)?
        } else {
            serde_json::to_string(&metadata)?
        };
        println!("{}", json);
    }

    if let Some(out) = &args.thumbnail {
        let first = &args.files[0];
        let source = MediaSource::from_path(first);
        let frame = extractor
            .thumbnail(&source, args.format.as_deref(), args.width, args.height)
            .await
            .with_context(|| format!("Failed to extract a frame from {}", first.display()))?;
        tokio::fs::write(out, &frame)
            .await
            .with_context(|| format!("Failed to write thumbnail to {}", out.display()))?;
        info!("Thumbnail written: {} ({} bytes)", out.display(), frame.len());
    }

    Ok(())
}
