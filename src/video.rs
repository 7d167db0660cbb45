//! Video metadata mapping from probe output

use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

use crate::error::FailureCause;
use crate::format::MediaFormat;
use crate::metadata::{Metadata, MetadataBuilder};
use crate::probe::ProbeResult;

/// Container tags that may carry a location, in lookup order.
const LOCATION_KEYS: &[&str] = &[
    "com.apple.quicktime.location.ISO6709",
    "location",
    "location-eng",
];

/// One signed decimal number: optional sign, digits, optional fraction.
static COORDINATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[+-]?\d+(?:\.\d+)?").expect("coordinate pattern is valid")
});

/// Maps a [`ProbeResult`] onto the unified record.
pub struct VideoMetadataDecoder;

impl VideoMetadataDecoder {
    /// Build a record from probe output. `size` is the length of the probed
    /// input when known; otherwise the container's reported size is used.
    pub fn map(probe: &ProbeResult, format: &MediaFormat, size: Option<u64>) -> Metadata {
        let mut meta = MetadataBuilder::new(format.kind, format.extension);
        let tags = &probe.format.tags;

        meta.captured_at(match tags.get("creation_time") {
            Some(raw) => parse_creation_time(raw),
            None => Err(FailureCause::TagAbsent),
        });

        let location = LOCATION_KEYS
            .iter()
            .find_map(|key| tags.get(key).map(|v| (*key, v)));
        match location {
            Some((key, raw)) => {
                debug!(key, raw, "Resolving location tag");
                match parse_location(raw) {
                    Ok((lat, lon)) => {
                        meta.latitude(in_range(lat, 90.0))
                            .longitude(in_range(lon, 180.0));
                    }
                    Err(cause) => {
                        meta.latitude(Err(cause)).longitude(Err(cause));
                    }
                }
            }
            None => {
                meta.latitude(Err(FailureCause::TagAbsent))
                    .longitude(Err(FailureCause::TagAbsent));
            }
        }

        match probe.primary_stream() {
            Some(stream) => {
                meta.width(dimension(stream.width))
                    .height(dimension(stream.height));
                debug!(codec = ?stream.codec_name, "Primary stream selected");
            }
            None => {
                meta.width(Err(FailureCause::TagAbsent))
                    .height(Err(FailureCause::TagAbsent));
            }
        }

        let size = size.or_else(|| probe.format.size.as_deref().and_then(|s| s.parse().ok()));
        meta.size_bytes(size.ok_or(FailureCause::TagAbsent));

        meta.build()
    }
}

/// Parse a location string into `(latitude, longitude)`.
///
/// Takes the first two signed decimal numbers in order, so it accepts both
/// ISO 6709 packed strings (`"+55.6761-012.5683/"`) and plain pairs
/// (`"55.6761, -12.5683"`). Fewer than two numbers is malformed.
pub fn parse_location(raw: &str) -> Result<(f64, f64), FailureCause> {
    let mut numbers = COORDINATE
        .find_iter(raw)
        .map(|m| m.as_str().parse::<f64>());
    match (numbers.next(), numbers.next()) {
        (Some(Ok(lat)), Some(Ok(lon))) => Ok((lat, lon)),
        _ => Err(FailureCause::Malformed),
    }
}

/// Parse a container creation time into a UTC instant with whole
/// milliseconds. Zero or pre-epoch values count as absent.
pub fn parse_creation_time(raw: &str) -> Result<DateTime<Utc>, FailureCause> {
    let raw = raw.trim();
    let parsed = DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f").map(|dt| dt.and_utc())
        })
        .map_err(|_| FailureCause::Malformed)?;

    let millis = parsed.timestamp_millis();
    if millis <= 0 {
        return Err(FailureCause::TagAbsent);
    }
    DateTime::from_timestamp_millis(millis).ok_or(FailureCause::Malformed)
}

fn in_range(value: f64, limit: f64) -> Result<f64, FailureCause> {
    if value.is_finite() && value.abs() <= limit {
        Ok(value)
    } else {
        Err(FailureCause::Malformed)
    }
}

fn dimension(value: Option<i64>) -> Result<u32, FailureCause> {
    match value {
        None => Err(FailureCause::TagAbsent),
        Some(v) if v > 0 => u32::try_from(v).map_err(|_| FailureCause::Malformed),
        Some(_) => Err(FailureCause::Malformed),
    }
}
