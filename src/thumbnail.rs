//! Single-frame extraction via FFmpeg

use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::error::{MediaError, Result};
use crate::ffmpeg::{self, FfmpegCommand, DEFAULT_TIMEOUT};
use crate::format::MediaFormat;
use crate::source::MediaSource;

/// Default position in the timeline the frame is taken from.
pub const DEFAULT_OFFSET: Duration = Duration::from_secs(1);

/// Pulls one JPEG frame out of a media source, rescaled.
#[derive(Debug, Clone)]
pub struct ThumbnailExtractor {
    ffmpeg: PathBuf,
    timeout: Duration,
    offset: Duration,
}

impl Default for ThumbnailExtractor {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl ThumbnailExtractor {
    pub fn new(ffmpeg: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            timeout: DEFAULT_TIMEOUT,
            offset: DEFAULT_OFFSET,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_offset(mut self, offset: Duration) -> Self {
        self.offset = offset;
        self
    }

    pub fn program(&self) -> &Path {
        &self.ffmpeg
    }

    /// Extract a single frame scaled to `width` x `height`.
    ///
    /// A zero dimension keeps the aspect ratio for that axis. Videos are
    /// sought to the configured offset; still images use their only frame.
    #[tracing::instrument(skip(self, source, format), fields(
        process.executable.path = %self.ffmpeg.display(),
        ffmpeg.operation = "thumbnail",
        format = format.extension
    ))]
    pub async fn extract_frame(
        &self,
        source: &MediaSource,
        format: &MediaFormat,
        width: u32,
        height: u32,
    ) -> Result<Vec<u8>> {
        let staged = source.stage(format).await?;

        let mut cmd = FfmpegCommand::new(&self.ffmpeg)
            .args(&["-hide_banner", "-loglevel", "error"])
            .timeout(self.timeout);
        if format.is_video() {
            cmd = cmd.args(&["-ss", &seek_position(self.offset)]);
        }
        let cmd = staged
            .input()
            .apply(cmd)
            .args(&[
                "-frames:v",
                "1",
                "-vf",
                &scale_filter(width, height),
                "-f",
                "image2pipe",
                "-c:v",
                "mjpeg",
            ])
            .output_pipe();

        let result = cmd.execute().await;
        staged.finish();

        let frame = result?.stdout;
        if frame.is_empty() {
            return Err(MediaError::EmptyFrame);
        }
        debug!(bytes = frame.len(), "Frame extracted");
        Ok(frame)
    }

    /// Check if the frame extraction executable can be launched.
    pub async fn is_available(&self) -> bool {
        ffmpeg::is_tool_available(&self.ffmpeg).await
    }
}

fn scale_filter(width: u32, height: u32) -> String {
    let axis = |v: u32| if v == 0 { "-2".to_string() } else { v.to_string() };
    format!("scale={}:{}", axis(width), axis(height))
}

fn seek_position(offset: Duration) -> String {
    format!("{:.3}", offset.as_secs_f64())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scale_filter_keeps_aspect_for_zero() {
        assert_eq!(scale_filter(320, 240), "scale=320:240");
        assert_eq!(scale_filter(320, 0), "scale=320:-2");
        assert_eq!(scale_filter(0, 0), "scale=-2:-2");
    }

    #[test]
    fn test_seek_position() {
        assert_eq!(seek_position(DEFAULT_OFFSET), "1.000");
        assert_eq!(seek_position(Duration::from_millis(2500)), "2.500");
    }

    #[tokio::test]
    async fn test_missing_ffmpeg() {
        let extractor = ThumbnailExtractor::new("media-meta-no-such-ffmpeg");
        let source = MediaSource::from_bytes(vec![0u8; 32]);
        let format = MediaFormat::classify("webm").unwrap();

        let err = extractor.extract_frame(&source, &format, 64, 64).await.unwrap_err();
        assert!(matches!(err, MediaError::ProbeNotFound { .. }));
        assert!(!extractor.is_available().await);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_empty_output_is_an_error() {
        // `true` ignores its arguments and writes nothing.
        let extractor = ThumbnailExtractor::new("true");
        let source = MediaSource::from_path("/uploads/clip.webm");
        let format = MediaFormat::classify("webm").unwrap();

        let err = extractor.extract_frame(&source, &format, 64, 0).await.unwrap_err();
        assert!(matches!(err, MediaError::EmptyFrame));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failed_extraction_is_an_error() {
        let extractor = ThumbnailExtractor::new("false");
        let source = MediaSource::from_bytes(vec![7u8; 64]);
        let format = MediaFormat::classify("mov").unwrap();

        let err = extractor.extract_frame(&source, &format, 64, 64).await.unwrap_err();
        assert!(matches!(err, MediaError::ProbeFailed { .. }));
    }
}
