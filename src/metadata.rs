//! Unified media metadata record
//!
//! Every attribute is independently optional. Attributes that could not be
//! read are listed in [`MissingFields`] together with the cause, so a caller
//! always gets a best-effort record instead of an error for a single bad tag.
//!
//! ## Example
//!
//! ```rust,ignore
//! let meta = extractor.extract(&source, Some("jpg")).await?;
//! if let Some((lat, lon)) = meta.coordinates() {
//!     println!("Taken at {lat}, {lon}");
//! }
//! for miss in meta.missing_fields() {
//!     println!("{} missing: {}", miss.field, miss.cause);
//! }
//! ```

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::FailureCause;
use crate::format::MediaKind;

// ============================================================================
// Core Metadata Types
// ============================================================================

/// Name of an extractable attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MetadataField {
    CapturedAt,
    Latitude,
    Longitude,
    Copyright,
    CameraModel,
    Width,
    Height,
    SizeBytes,
}

impl MetadataField {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetadataField::CapturedAt => "captured_at",
            MetadataField::Latitude => "latitude",
            MetadataField::Longitude => "longitude",
            MetadataField::Copyright => "copyright",
            MetadataField::CameraModel => "camera_model",
            MetadataField::Width => "width",
            MetadataField::Height => "height",
            MetadataField::SizeBytes => "size_bytes",
        }
    }
}

impl std::fmt::Display for MetadataField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One attribute that could not be extracted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FieldMiss {
    pub field: MetadataField,
    pub cause: FailureCause,
}

/// Ordered set of misses, at most one per field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct MissingFields(Vec<FieldMiss>);

impl MissingFields {
    /// Record a miss. The first cause recorded for a field wins; returns
    /// whether the entry was added.
    pub(crate) fn record(&mut self, field: MetadataField, cause: FailureCause) -> bool {
        if self.contains(field) {
            return false;
        }
        self.0.push(FieldMiss { field, cause });
        true
    }

    pub fn contains(&self, field: MetadataField) -> bool {
        self.0.iter().any(|m| m.field == field)
    }

    pub fn cause_of(&self, field: MetadataField) -> Option<FailureCause> {
        self.0.iter().find(|m| m.field == field).map(|m| m.cause)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FieldMiss> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'a> IntoIterator for &'a MissingFields {
    type Item = &'a FieldMiss;
    type IntoIter = std::slice::Iter<'a, FieldMiss>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Metadata extracted from one image or video.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Metadata {
    kind: MediaKind,
    format: &'static str,
    captured_at: Option<DateTime<Utc>>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    copyright: Option<String>,
    camera_model: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    size_bytes: Option<u64>,
    missing_fields: MissingFields,
}

impl Metadata {
    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    /// Canonical extension of the format the record was decoded as.
    pub fn format(&self) -> &'static str {
        self.format
    }

    /// Capture time in UTC, whole milliseconds.
    pub fn captured_at(&self) -> Option<DateTime<Utc>> {
        self.captured_at
    }

    pub fn captured_at_millis(&self) -> Option<i64> {
        self.captured_at.map(|t| t.timestamp_millis())
    }

    pub fn latitude(&self) -> Option<f64> {
        self.latitude
    }

    pub fn longitude(&self) -> Option<f64> {
        self.longitude
    }

    /// Both axes, when both were extracted.
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        Some((self.latitude?, self.longitude?))
    }

    pub fn copyright(&self) -> Option<&str> {
        self.copyright.as_deref()
    }

    pub fn camera_model(&self) -> Option<&str> {
        self.camera_model.as_deref()
    }

    pub fn width(&self) -> Option<u32> {
        self.width
    }

    pub fn height(&self) -> Option<u32> {
        self.height
    }

    pub fn size_bytes(&self) -> Option<u64> {
        self.size_bytes
    }

    pub fn missing_fields(&self) -> &MissingFields {
        &self.missing_fields
    }

    /// Size formatted with binary units, e.g. `"2.4 MB"`.
    pub fn human_size(&self) -> Option<String> {
        self.size_bytes.map(human_size)
    }

    /// Get aspect ratio as string (e.g., "16:9", "3:2")
    pub fn aspect_ratio(&self) -> Option<String> {
        let (w, h) = (self.width?, self.height?);
        let g = gcd(w, h);
        Some(format!("{}:{}", w / g, h / g))
    }
}

/// Format a byte count with 1024-based units.
pub fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

    if bytes < 1024 {
        return format!("{} B", bytes);
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}

/// GCD for aspect ratio calculation
fn gcd(a: u32, b: u32) -> u32 {
    if b == 0 { a.max(1) } else { gcd(b, a % b) }
}

// ============================================================================
// Assembly
// ============================================================================

/// Collects field values and misses during one decode call.
///
/// Each field is either set or recorded missing; the finished [`Metadata`]
/// is never touched again.
pub(crate) struct MetadataBuilder {
    meta: Metadata,
}

impl MetadataBuilder {
    pub fn new(kind: MediaKind, format: &'static str) -> Self {
        Self {
            meta: Metadata {
                kind,
                format,
                captured_at: None,
                latitude: None,
                longitude: None,
                copyright: None,
                camera_model: None,
                width: None,
                height: None,
                size_bytes: None,
                missing_fields: MissingFields::default(),
            },
        }
    }

    pub fn miss(&mut self, field: MetadataField, cause: FailureCause) {
        if !self.meta.missing_fields.record(field, cause) {
            tracing::debug!(%field, %cause, "Field already recorded missing");
        }
    }

    fn resolve<T>(&mut self, field: MetadataField, value: Result<T, FailureCause>) -> Option<T> {
        match value {
            Ok(v) => Some(v),
            Err(cause) => {
                self.miss(field, cause);
                None
            }
        }
    }

    pub fn captured_at(&mut self, value: Result<DateTime<Utc>, FailureCause>) -> &mut Self {
        self.meta.captured_at = self.resolve(MetadataField::CapturedAt, value);
        self
    }

    pub fn latitude(&mut self, value: Result<f64, FailureCause>) -> &mut Self {
        self.meta.latitude = self.resolve(MetadataField::Latitude, value);
        self
    }

    pub fn longitude(&mut self, value: Result<f64, FailureCause>) -> &mut Self {
        self.meta.longitude = self.resolve(MetadataField::Longitude, value);
        self
    }

    pub fn copyright(&mut self, value: Result<String, FailureCause>) -> &mut Self {
        self.meta.copyright = self.resolve(MetadataField::Copyright, value);
        self
    }

    pub fn camera_model(&mut self, value: Result<String, FailureCause>) -> &mut Self {
        self.meta.camera_model = self.resolve(MetadataField::CameraModel, value);
        self
    }

    pub fn width(&mut self, value: Result<u32, FailureCause>) -> &mut Self {
        self.meta.width = self.resolve(MetadataField::Width, value);
        self
    }

    pub fn height(&mut self, value: Result<u32, FailureCause>) -> &mut Self {
        self.meta.height = self.resolve(MetadataField::Height, value);
        self
    }

    pub fn size_bytes(&mut self, value: Result<u64, FailureCause>) -> &mut Self {
        self.meta.size_bytes = self.resolve(MetadataField::SizeBytes, value);
        self
    }

    pub fn build(self) -> Metadata {
        self.meta
    }
}

// ============================================================================
// Tests
// ============================================================================
