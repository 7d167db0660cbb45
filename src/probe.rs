//! FFprobe wrapper for container metadata
//!
//! Runs `ffprobe` on a file path or piped stream and deserializes its JSON
//! output into a [`ProbeResult`]. Only stdout is parsed; stderr is kept for
//! diagnostics when the tool fails.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::error::{MediaError, Result};
use crate::ffmpeg::{self, FfmpegCommand};

/// Where a media tool reads its input from.
#[derive(Debug, Clone, Copy)]
pub enum ProbeInput<'a> {
    Path(&'a Path),
    Stdin(&'a [u8]),
}

impl<'a> ProbeInput<'a> {
    pub(crate) fn apply(self, cmd: FfmpegCommand<'a>) -> FfmpegCommand<'a> {
        match self {
            ProbeInput::Path(path) => cmd.input(path),
            ProbeInput::Stdin(bytes) => cmd.input_pipe(bytes),
        }
    }
}

/// Typed view of `ffprobe -show_format -show_streams` output.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ProbeResult {
    #[serde(default)]
    pub format: ProbeFormat,
    #[serde(default)]
    pub streams: Vec<ProbeStream>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ProbeFormat {
    pub format_name: Option<String>,
    pub duration: Option<String>,
    pub size: Option<String>,
    #[serde(default)]
    pub tags: ProbeTags,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ProbeTags {
    pub creation_time: Option<String>,
    /// Every other container tag, keyed as the tool reports it.
    #[serde(flatten)]
    pub other: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ProbeStream {
    pub index: Option<u32>,
    pub codec_type: Option<String>,
    pub codec_name: Option<String>,
    pub width: Option<i64>,
    pub height: Option<i64>,
}

impl ProbeResult {
    /// Parse tool output. The top level must be a JSON object.
    pub fn from_json(json: &[u8]) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_slice(json)?;
        if !value.is_object() {
            let err = <serde_json::Error as serde::de::Error>::custom(format!(
                "expected a JSON object at the top level, found {}",
                json_kind(&value)
            ));
            return Err(MediaError::BadProbeOutput(err));
        }
        Ok(serde_json::from_value(value)?)
    }

    /// The primary visual stream: the first video stream, else `streams[0]`.
    pub fn primary_stream(&self) -> Option<&ProbeStream> {
        self.streams
            .iter()
            .find(|s| s.codec_type.as_deref() == Some("video"))
            .or_else(|| self.streams.first())
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

impl ProbeTags {
    /// Look up a tag by key, ignoring ASCII case.
    pub fn get(&self, key: &str) -> Option<&str> {
        if key.eq_ignore_ascii_case("creation_time") {
            return self.creation_time.as_deref();
        }
        self.other
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }
}

/// Invokes the probing executable.
#[derive(Debug, Clone)]
pub struct Prober {
    program: PathBuf,
    timeout: Duration,
}

impl Prober {
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Probe `input` and parse the tool's JSON output.
    #[tracing::instrument(skip(self, input), fields(
        process.executable.path = %self.program.display(),
        ffmpeg.operation = "probe"
    ))]
    pub async fn probe(&self, input: ProbeInput<'_>) -> Result<ProbeResult> {
        let start = std::time::Instant::now();

        let cmd = FfmpegCommand::new(&self.program)
            .args(&[
                "-v",
                "error",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
            ])
            .timeout(self.timeout);
        let output = input.apply(cmd).execute().await?;

        let result = ProbeResult::from_json(&output.stdout)?;
        debug!(
            duration_ms = start.elapsed().as_millis() as u64,
            streams = result.streams.len(),
            "Probe completed"
        );
        Ok(result)
    }

    /// Check if the probe executable can be launched.
    pub async fn is_available(&self) -> bool {
        ffmpeg::is_tool_available(&self.program).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_probe_output() {
        let result = ProbeResult::from_json(
            br#"{
                "streams": [
                    {"index": 0, "codec_type": "audio", "codec_name": "aac"},
                    {"index": 1, "codec_type": "video", "codec_name": "h264", "width": 1920, "height": 1080}
                ],
                "format": {
                    "format_name": "mov,mp4,m4a,3gp,3g2,mj2",
                    "size": "1048576",
                    "tags": {
                        "creation_time": "2020-01-01T00:00:00.000000Z",
                        "com.apple.quicktime.location.ISO6709": "+55.6761-012.5683/"
                    }
                }
            }"#,
        )
        .unwrap();

        let stream = result.primary_stream().unwrap();
        assert_eq!(stream.codec_name.as_deref(), Some("h264"));
        assert_eq!((stream.width, stream.height), (Some(1920), Some(1080)));
        assert_eq!(
            result.format.tags.get("creation_time"),
            Some("2020-01-01T00:00:00.000000Z")
        );
        assert_eq!(
            result.format.tags.get("com.apple.quicktime.location.iso6709"),
            Some("+55.6761-012.5683/")
        );
        assert_eq!(result.format.size.as_deref(), Some("1048576"));
    }

    #[test]
    fn test_missing_sections_default() {
        let result = ProbeResult::from_json(b"{}").unwrap();
        assert!(result.streams.is_empty());
        assert!(result.primary_stream().is_none());
        assert_eq!(result.format.tags.get("creation_time"), None);
    }

    #[test]
    fn test_bad_shape_is_rejected() {
        for json in [
            &b"not json"[..],
            b"[]",
            b"[{}, []]",
            b"null",
            b"42",
            br#""{}""#,
            br#"{"streams": {"width": 1}}"#,
            br#"{"format": []}"#,
            b"",
        ] {
            let err = ProbeResult::from_json(json).unwrap_err();
            assert!(
                matches!(err, MediaError::BadProbeOutput(_)),
                "accepted {:?}",
                String::from_utf8_lossy(json)
            );
        }
    }

    #[tokio::test]
    async fn test_missing_probe_executable() {
        let prober = Prober::new("media-meta-no-such-ffprobe", Duration::from_secs(5));
        let err = prober
            .probe(ProbeInput::Path(Path::new("clip.mp4")))
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::ProbeNotFound { .. }));
        assert!(!prober.is_available().await);
    }
}
