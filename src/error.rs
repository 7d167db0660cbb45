use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Closed set of reasons an extraction step can fail.
///
/// The first three describe a single field that could not be read and end up
/// in [`MissingFields`](crate::MissingFields). The rest only ever describe a
/// fatal [`MediaError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCause {
    /// The source simply does not carry the field (or it is zero-valued).
    TagAbsent,
    /// The field is present but its value is unusable.
    Malformed,
    /// The surrounding structure could not be decoded.
    DecodeError,
    Timeout,
    ProcessNotFound,
    NonZeroExit,
    BadOutputShape,
}

impl FailureCause {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureCause::TagAbsent => "tag_absent",
            FailureCause::Malformed => "malformed",
            FailureCause::DecodeError => "decode_error",
            FailureCause::Timeout => "timeout",
            FailureCause::ProcessNotFound => "process_not_found",
            FailureCause::NonZeroExit => "non_zero_exit",
            FailureCause::BadOutputShape => "bad_output_shape",
        }
    }
}

impl std::fmt::Display for FailureCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that prevent a metadata record (or frame) from being produced at all.
#[derive(Error, Debug)]
pub enum MediaError {
    #[error("Unsupported media format: {0:?}")]
    UnsupportedFormat(String),

    #[error("Failed to decode media container: {0}")]
    Decode(String),

    #[error("Media tool not found: {}", program.display())]
    ProbeNotFound { program: PathBuf },

    #[error("{} exited with {status}: {diagnostics}", program.display())]
    ProbeFailed {
        program: PathBuf,
        status: String,
        diagnostics: String,
    },

    #[error("{} timed out after {timeout:?}", program.display())]
    ProbeTimeout { program: PathBuf, timeout: Duration },

    #[error("Unexpected probe output: {0}")]
    BadProbeOutput(#[from] serde_json::Error),

    #[error("Frame extraction produced no image data")]
    EmptyFrame,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MediaError {
    /// The failure cause this error is tagged with, if it maps onto one.
    pub fn cause(&self) -> Option<FailureCause> {
        match self {
            MediaError::UnsupportedFormat(_) | MediaError::Io(_) => None,
            MediaError::Decode(_) => Some(FailureCause::DecodeError),
            MediaError::ProbeNotFound { .. } => Some(FailureCause::ProcessNotFound),
            MediaError::ProbeFailed { .. } => Some(FailureCause::NonZeroExit),
            MediaError::ProbeTimeout { .. } => Some(FailureCause::Timeout),
            MediaError::BadProbeOutput(_) | MediaError::EmptyFrame => {
                Some(FailureCause::BadOutputShape)
            }
        }
    }
}

impl From<crate::ffmpeg::FfmpegError> for MediaError {
    fn from(err: crate::ffmpeg::FfmpegError) -> Self {
        use crate::ffmpeg::FfmpegError;

        match err {
            FfmpegError::NotInstalled { program } => MediaError::ProbeNotFound { program },
            FfmpegError::ExecutionFailed {
                program,
                status,
                diagnostics,
            } => MediaError::ProbeFailed {
                program,
                status,
                diagnostics,
            },
            FfmpegError::TimedOut { program, timeout } => {
                MediaError::ProbeTimeout { program, timeout }
            }
            FfmpegError::Io(e) => MediaError::Io(e),
        }
    }
}

pub type Result<T> = std::result::Result<T, MediaError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ffmpeg::FfmpegError;

    #[test]
    fn test_tool_errors_map_to_fatal_kinds() {
        let err: MediaError = FfmpegError::NotInstalled {
            program: PathBuf::from("ffprobe"),
        }
        .into();
        assert!(matches!(err, MediaError::ProbeNotFound { .. }));
        assert_eq!(err.cause(), Some(FailureCause::ProcessNotFound));

        let err: MediaError = FfmpegError::ExecutionFailed {
            program: PathBuf::from("ffprobe"),
            status: "exit status: 1".to_string(),
            diagnostics: "moov atom not found".to_string(),
        }
        .into();
        assert!(matches!(err, MediaError::ProbeFailed { .. }));
        assert_eq!(err.cause(), Some(FailureCause::NonZeroExit));
        assert!(err.to_string().contains("moov atom not found"));

        let err: MediaError = FfmpegError::TimedOut {
            program: PathBuf::from("ffmpeg"),
            timeout: Duration::from_secs(2),
        }
        .into();
        assert_eq!(err.cause(), Some(FailureCause::Timeout));
    }

    #[test]
    fn test_cause_names() {
        assert_eq!(FailureCause::TagAbsent.to_string(), "tag_absent");
        assert_eq!(FailureCause::BadOutputShape.as_str(), "bad_output_shape");
        assert_eq!(
            serde_json::to_string(&FailureCause::Malformed).unwrap(),
            "\"malformed\""
        );
    }
}
