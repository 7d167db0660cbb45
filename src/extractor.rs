//! Metadata extraction facade
//!
//! Classifies the input, routes it to the image or video path, and returns a
//! single [`Metadata`] record. Per-field misses are folded into the record;
//! only container-level and tool-level failures surface as errors.

use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{MediaError, Result};
use crate::ffmpeg::DEFAULT_TIMEOUT;
use crate::format::MediaFormat;
use crate::image::ImageMetadataDecoder;
use crate::metadata::Metadata;
use crate::probe::Prober;
use crate::source::MediaSource;
use crate::thumbnail::{ThumbnailExtractor, DEFAULT_OFFSET};
use crate::video::VideoMetadataDecoder;

/// Tool locations and limits for an extractor.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractorConfig {
    pub ffprobe_path: PathBuf,
    pub ffmpeg_path: PathBuf,
    /// Wall-clock bound on each tool invocation.
    pub timeout: Duration,
    /// Timeline position thumbnails are taken from.
    pub thumbnail_offset: Duration,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            ffprobe_path: PathBuf::from("ffprobe"),
            ffmpeg_path: PathBuf::from("ffmpeg"),
            timeout: DEFAULT_TIMEOUT,
            thumbnail_offset: DEFAULT_OFFSET,
        }
    }
}

impl ExtractorConfig {
    /// Defaults overridden by `MEDIA_META_FFPROBE_PATH`,
    /// `MEDIA_META_FFMPEG_PATH` and `MEDIA_META_TIMEOUT_SECS`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var_os(key))
    }

    /// Like [`from_env`](Self::from_env), reading variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<OsString>) -> Self {
        let mut config = Self::default();
        if let Some(path) = lookup("MEDIA_META_FFPROBE_PATH") {
            config.ffprobe_path = path.into();
        }
        if let Some(path) = lookup("MEDIA_META_FFMPEG_PATH") {
            config.ffmpeg_path = path.into();
        }
        if let Some(secs) = lookup("MEDIA_META_TIMEOUT_SECS") {
            let secs = secs.to_string_lossy();
            match secs.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => config.timeout = Duration::from_secs(secs),
                _ => warn!(value = %secs, "Ignoring invalid MEDIA_META_TIMEOUT_SECS"),
            }
        }
        config
    }

    pub fn with_ffprobe(mut self, path: impl Into<PathBuf>) -> Self {
        self.ffprobe_path = path.into();
        self
    }

    pub fn with_ffmpeg(mut self, path: impl Into<PathBuf>) -> Self {
        self.ffmpeg_path = path.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_thumbnail_offset(mut self, offset: Duration) -> Self {
        self.thumbnail_offset = offset;
        self
    }
}

/// Turns raw media into a [`Metadata`] record.
///
/// Holds configuration only; every call is independent.
#[derive(Debug, Clone)]
pub struct MetadataExtractor {
    prober: Prober,
    thumbnails: ThumbnailExtractor,
}

impl Default for MetadataExtractor {
    fn default() -> Self {
        Self::new(ExtractorConfig::default())
    }
}

impl MetadataExtractor {
    pub fn new(config: ExtractorConfig) -> Self {
        Self {
            prober: Prober::new(config.ffprobe_path, config.timeout),
            thumbnails: ThumbnailExtractor::new(config.ffmpeg_path)
                .with_timeout(config.timeout)
                .with_offset(config.thumbnail_offset),
        }
    }

    pub fn prober(&self) -> &Prober {
        &self.prober
    }

    pub fn thumbnails(&self) -> &ThumbnailExtractor {
        &self.thumbnails
    }

    /// Resolve the format: the declared one when given, else sniffed.
    pub fn classify(&self, source: &MediaSource, declared: Option<&str>) -> Result<MediaFormat> {
        match declared {
            Some(declared) => MediaFormat::classify(declared),
            None => source.sniff_format().ok_or_else(|| {
                MediaError::UnsupportedFormat(
                    source
                        .path()
                        .map(|p| p.display().to_string())
                        .unwrap_or_else(|| "<unrecognised bytes>".to_string()),
                )
            }),
        }
    }

    /// Extract metadata from `source`.
    ///
    /// `declared` is an extension or MIME type; when absent the format is
    /// sniffed from the path or leading bytes.
    pub async fn extract(&self, source: &MediaSource, declared: Option<&str>) -> Result<Metadata> {
        let format = self.classify(source, declared)?;
        debug!(format = format.extension, kind = ?format.kind, "Format classified");

        let metadata = if format.is_image() {
            let bytes = source.read_all().await?;
            ImageMetadataDecoder::decode(&bytes, &format)?
        } else {
            self.extract_video(source, &format).await?
        };

        debug!(
            format = metadata.format(),
            missing = metadata.missing_fields().len(),
            "Metadata assembled"
        );
        Ok(metadata)
    }

    async fn extract_video(&self, source: &MediaSource, format: &MediaFormat) -> Result<Metadata> {
        let staged = source.stage(format).await?;
        let probed = self.prober.probe(staged.input()).await;
        staged.finish();
        let probed = probed?;

        let size = match source.len().await {
            Ok(len) => Some(len),
            Err(e) => {
                warn!("Could not read input size, using container size: {}", e);
                None
            }
        };
        Ok(VideoMetadataDecoder::map(&probed, format, size))
    }

    /// Extract a single rescaled JPEG frame from `source`.
    pub async fn thumbnail(
        &self,
        source: &MediaSource,
        declared: Option<&str>,
        width: u32,
        height: u32,
    ) -> Result<Vec<u8>> {
        let format = self.classify(source, declared)?;
        self.thumbnails.extract_frame(source, &format, width, height).await
    }
}
