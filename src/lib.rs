//! media_meta - unified metadata extraction for uploaded images and videos
//!
//! Images are read from their embedded EXIF tag table. Videos are probed by
//! shelling out to the system `ffprobe` binary, and thumbnails come from
//! `ffmpeg` (LGPL-safe, no linking). Either way the caller gets one
//! [`Metadata`] record plus the list of fields that could not be extracted
//! and why.

mod error;
mod extractor;
mod ffmpeg;
mod format;
mod image;
mod metadata;
mod probe;
mod rational;
mod source;
mod thumbnail;
mod video;

pub use self::image::ImageMetadataDecoder;
pub use error::{FailureCause, MediaError, Result};
pub use extractor::{ExtractorConfig, MetadataExtractor};
pub use ffmpeg::{FfmpegCommand, FfmpegError};
pub use format::{MediaFormat, MediaKind};
pub use metadata::{human_size, FieldMiss, Metadata, MetadataField, MissingFields};
pub use probe::{ProbeFormat, ProbeInput, ProbeResult, ProbeStream, ProbeTags, Prober};
pub use rational::{
    apply_hemisphere, decode_dms, dms_to_decimal, encode_dms, rational_to_f64, Hemisphere,
};
pub use source::MediaSource;
pub use thumbnail::ThumbnailExtractor;
pub use video::{parse_creation_time, parse_location, VideoMetadataDecoder};
