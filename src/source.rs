//! Media input handling
//!
//! A source is either an in-memory buffer (an upload) or a file on disk.
//! Before a child process runs, the source is staged as a path, a stdin
//! pipe, or a temporary file for containers that need random access.

use std::borrow::Cow;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::format::MediaFormat;
use crate::probe::ProbeInput;

/// Raw media to extract from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaSource {
    Bytes(Vec<u8>),
    File(PathBuf),
}

impl MediaSource {
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        MediaSource::Bytes(bytes.into())
    }

    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        MediaSource::File(path.into())
    }

    /// Drain a readable stream into memory.
    pub fn from_reader(mut reader: impl Read) -> io::Result<Self> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        Ok(MediaSource::Bytes(bytes))
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            MediaSource::File(path) => Some(path),
            MediaSource::Bytes(_) => None,
        }
    }

    /// Best guess at the format when the caller did not declare one.
    pub fn sniff_format(&self) -> Option<MediaFormat> {
        match self {
            MediaSource::Bytes(bytes) => MediaFormat::sniff(bytes),
            MediaSource::File(path) => MediaFormat::from_path(path),
        }
    }

    /// Full length of the underlying byte stream.
    pub async fn len(&self) -> io::Result<u64> {
        match self {
            MediaSource::Bytes(bytes) => Ok(bytes.len() as u64),
            MediaSource::File(path) => Ok(tokio::fs::metadata(path).await?.len()),
        }
    }

    /// Entire contents, borrowed when already in memory.
    pub async fn read_all(&self) -> io::Result<Cow<'_, [u8]>> {
        match self {
            MediaSource::Bytes(bytes) => Ok(Cow::Borrowed(bytes)),
            MediaSource::File(path) => Ok(Cow::Owned(tokio::fs::read(path).await?)),
        }
    }

    /// Make the source readable by a media tool.
    pub(crate) async fn stage(&self, format: &MediaFormat) -> io::Result<StagedInput<'_>> {
        match self {
            MediaSource::File(path) => Ok(StagedInput::Path(path)),
            MediaSource::Bytes(bytes) if format.needs_random_access() => {
                let temp = tempfile::Builder::new()
                    .prefix("media-meta-")
                    .suffix(&format!(".{}", format.extension))
                    .tempfile()?;
                tokio::fs::write(temp.path(), bytes).await?;
                debug!(
                    path = %temp.path().display(),
                    len = bytes.len(),
                    "Staged upload in temp file"
                );
                Ok(StagedInput::Temp(temp))
            }
            MediaSource::Bytes(bytes) => Ok(StagedInput::Pipe(bytes)),
        }
    }
}

impl From<Vec<u8>> for MediaSource {
    fn from(bytes: Vec<u8>) -> Self {
        MediaSource::Bytes(bytes)
    }
}

impl From<PathBuf> for MediaSource {
    fn from(path: PathBuf) -> Self {
        MediaSource::File(path)
    }
}

/// A source ready to hand to a child process.
///
/// A temp file lives exactly as long as this value and is removed when it
/// is dropped, on success and error paths alike.
pub(crate) enum StagedInput<'a> {
    Path(&'a Path),
    Pipe(&'a [u8]),
    Temp(NamedTempFile),
}

impl<'a> StagedInput<'a> {
    /// How a media tool should read this input.
    pub fn input(&self) -> ProbeInput<'_> {
        match self {
            StagedInput::Path(path) => ProbeInput::Path(path),
            StagedInput::Pipe(bytes) => ProbeInput::Stdin(bytes),
            StagedInput::Temp(temp) => ProbeInput::Path(temp.path()),
        }
    }

    /// Remove any temp file now, reporting failures instead of ignoring them.
    pub fn finish(self) {
        if let StagedInput::Temp(temp) = self {
            let path = temp.path().to_path_buf();
            if let Err(e) = temp.close() {
                warn!(path = %path.display(), "Failed to remove staged temp file: {}", e);
            }
        }
    }
}
