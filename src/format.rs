//! Supported-format registry and classification
//!
//! Formats are matched exactly (case-insensitive) against two static sets.
//! Anything else is rejected before any decoding work starts.

use serde::Serialize;
use std::path::Path;

use crate::error::{MediaError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

/// A recognised media format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MediaFormat {
    /// Canonical extension, e.g. `"jpg"` for both `jpg` and `jpeg`.
    pub extension: &'static str,
    pub kind: MediaKind,
}

/// Accepted names (extensions and MIME subtypes) mapped to canonical extension.
const IMAGE_FORMATS: &[(&str, &str)] = &[
    ("jpg", "jpg"),
    ("jpeg", "jpg"),
    ("pjpeg", "jpg"),
    ("png", "png"),
    ("tif", "tiff"),
    ("tiff", "tiff"),
    ("heic", "heic"),
    ("heif", "heic"),
    ("webp", "webp"),
];

const VIDEO_FORMATS: &[(&str, &str)] = &[
    ("mp4", "mp4"),
    ("m4v", "mp4"),
    ("x-m4v", "mp4"),
    ("mov", "mov"),
    ("qt", "mov"),
    ("quicktime", "mov"),
    ("3gp", "3gp"),
    ("3gpp", "3gp"),
    ("webm", "webm"),
    ("mkv", "mkv"),
    ("x-matroska", "mkv"),
    ("avi", "avi"),
    ("x-msvideo", "avi"),
];

/// Containers whose index may sit at the end of the file and so cannot be
/// demuxed from a non-seekable pipe.
const RANDOM_ACCESS: &[&str] = &["mp4", "mov", "3gp"];

impl MediaFormat {
    /// Classify a declared format: an extension (`"JPG"`, `".mov"`) or a MIME
    /// type (`"video/quicktime"`).
    pub fn classify(declared: &str) -> Result<Self> {
        let name = normalize(declared);
        lookup(&name).ok_or_else(|| MediaError::UnsupportedFormat(declared.to_string()))
    }

    /// Identify a format from its leading magic bytes.
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        infer::get(bytes).and_then(|t| lookup(t.extension()))
    }

    /// Identify a format from a path: extension first, then file contents.
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(|e| lookup(&normalize(e)))
            .or_else(|| {
                infer::get_from_path(path)
                    .ok()
                    .flatten()
                    .and_then(|t| lookup(t.extension()))
            })
    }

    pub fn is_image(&self) -> bool {
        self.kind == MediaKind::Image
    }

    pub fn is_video(&self) -> bool {
        self.kind == MediaKind::Video
    }

    /// Whether the tools need a seekable file rather than a pipe.
    pub fn needs_random_access(&self) -> bool {
        RANDOM_ACCESS.contains(&self.extension)
    }
}

fn normalize(declared: &str) -> String {
    let declared = declared.trim();
    let declared = declared.split(';').next().unwrap_or(declared);
    let declared = declared.rsplit('/').next().unwrap_or(declared);
    declared.trim().trim_start_matches('.').to_lowercase()
}

fn lookup(name: &str) -> Option<MediaFormat> {
    find_in(IMAGE_FORMATS, name, MediaKind::Image)
        .or_else(|| find_in(VIDEO_FORMATS, name, MediaKind::Video))
}

fn find_in(table: &[(&str, &'static str)], name: &str, kind: MediaKind) -> Option<MediaFormat> {
    table
        .iter()
        .find(|(alias, _)| *alias == name)
        .map(|&(_, extension)| MediaFormat { extension, kind })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_extensions_and_mime() {
        let jpg = MediaFormat::classify("JPEG").unwrap();
        assert_eq!(jpg.extension, "jpg");
        assert!(jpg.is_image());

        let mov = MediaFormat::classify("video/QuickTime").unwrap();
        assert_eq!(mov.extension, "mov");
        assert!(mov.is_video());
        assert!(mov.needs_random_access());

        assert_eq!(MediaFormat::classify(".mp4").unwrap().extension, "mp4");
        assert_eq!(MediaFormat::classify("image/png; q=0.9").unwrap().extension, "png");
        assert!(!MediaFormat::classify("webm").unwrap().needs_random_access());
    }

    #[test]
    fn test_unknown_format_is_rejected() {
        for declared in ["gif", "", "mp3", "jpgx", "application/pdf"] {
            let err = MediaFormat::classify(declared).unwrap_err();
            assert!(matches!(err, MediaError::UnsupportedFormat(ref d) if d == declared));
        }
    }

    #[test]
    fn test_sniff_magic_bytes() {
        let jpeg = [0xFF, 0xD8, 0xFF, 0xE0, 0, 0x10, b'J', b'F', b'I', b'F', 0];
        assert_eq!(MediaFormat::sniff(&jpeg).map(|f| f.extension), Some("jpg"));

        let png = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
        assert_eq!(MediaFormat::sniff(&png).map(|f| f.extension), Some("png"));

        assert_eq!(MediaFormat::sniff(b"plain text, not media"), None);
    }

    #[test]
    fn test_from_path_uses_extension() {
        let format = MediaFormat::from_path(Path::new("/uploads/IMG_0001.MOV")).unwrap();
        assert_eq!(format.extension, "mov");
        assert_eq!(MediaFormat::from_path(Path::new("/uploads/notes.txt")), None);
    }
}
