//! Image metadata decoding from the embedded EXIF tag table
//!
//! Parsing the container is all-or-nothing: bytes that are not a readable
//! image fail the whole call. Past that point every field is extracted on its
//! own and a bad tag only ever produces a [`FieldMiss`](crate::FieldMiss).

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use exif::{Exif, Field, In, Reader, Tag, Value};
use std::io::Cursor;
use tracing::{debug, warn};

use crate::error::{FailureCause, MediaError, Result};
use crate::format::MediaFormat;
use crate::metadata::{Metadata, MetadataBuilder};
use crate::rational::{self, Hemisphere};

/// Decoded tag table of one image. Lives only for one decode call.
struct TagTable {
    exif: Option<Exif>,
    /// Some IFD entries could not be decoded and were skipped.
    damaged: bool,
}

impl TagTable {
    fn parse(bytes: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(bytes);
        match Reader::new()
            .continue_on_error(true)
            .read_from_container(&mut cursor)
        {
            Ok(exif) => Ok(Self {
                exif: Some(exif),
                damaged: false,
            }),
            Err(exif::Error::PartialResult(partial)) => {
                let (exif, errors) = partial.into_inner();
                warn!(skipped = errors.len(), "EXIF table partially decoded");
                for e in &errors {
                    debug!("Skipped EXIF entry: {}", e);
                }
                Ok(Self {
                    exif: Some(exif),
                    damaged: true,
                })
            }
            // A valid container that simply carries no tag table.
            Err(exif::Error::NotFound(container)) => {
                debug!(container, "No EXIF table in image");
                Ok(Self {
                    exif: None,
                    damaged: false,
                })
            }
            Err(e) => Err(MediaError::Decode(e.to_string())),
        }
    }

    fn field(&self, tag: Tag) -> Option<&Field> {
        self.exif.as_ref()?.get_field(tag, In::PRIMARY)
    }

    /// Cause to report for a tag that is not in the table.
    fn absent(&self) -> FailureCause {
        if self.damaged {
            FailureCause::DecodeError
        } else {
            FailureCause::TagAbsent
        }
    }

    fn require(&self, tag: Tag) -> std::result::Result<&Field, FailureCause> {
        self.field(tag).ok_or_else(|| self.absent())
    }
}

/// Stateless decoder for still images.
pub struct ImageMetadataDecoder;

impl ImageMetadataDecoder {
    /// Decode `bytes` as an image of `format`.
    ///
    /// Returns an error only when the container itself cannot be parsed;
    /// missing or malformed tags are reported in the record's missing fields.
    #[tracing::instrument(skip(bytes, format), fields(len = bytes.len(), format = format.extension))]
    pub fn decode(bytes: &[u8], format: &MediaFormat) -> Result<Metadata> {
        let table = TagTable::parse(bytes)?;
        let mut meta = MetadataBuilder::new(format.kind, format.extension);

        meta.latitude(coordinate(&table, Axis::Latitude))
            .longitude(coordinate(&table, Axis::Longitude))
            .captured_at(captured_at(&table))
            .copyright(text(&table, Tag::Copyright))
            .camera_model(text(&table, Tag::Model));

        let mut width = dimension(&table, Tag::PixelXDimension, Tag::ImageWidth);
        let mut height = dimension(&table, Tag::PixelYDimension, Tag::ImageLength);
        if width.is_err() || height.is_err() {
            if let Some((w, h)) = header_dimensions(bytes) {
                debug!(w, h, "Using container header dimensions");
                width = width.or(Ok(w));
                height = height.or(Ok(h));
            }
        }
        meta.width(width)
            .height(height)
            .size_bytes(Ok(bytes.len() as u64));

        let meta = meta.build();
        debug!(missing = meta.missing_fields().len(), "Image decoded");
        Ok(meta)
    }
}

#[derive(Debug, Clone, Copy)]
enum Axis {
    Latitude,
    Longitude,
}

impl Axis {
    fn tags(self) -> (Tag, Tag) {
        match self {
            Axis::Latitude => (Tag::GPSLatitude, Tag::GPSLatitudeRef),
            Axis::Longitude => (Tag::GPSLongitude, Tag::GPSLongitudeRef),
        }
    }

    fn limit(self) -> f64 {
        match self {
            Axis::Latitude => 90.0,
            Axis::Longitude => 180.0,
        }
    }

    fn accepts(self, hemisphere: Hemisphere) -> bool {
        match self {
            Axis::Latitude => matches!(hemisphere, Hemisphere::North | Hemisphere::South),
            Axis::Longitude => matches!(hemisphere, Hemisphere::East | Hemisphere::West),
        }
    }
}

/// Signed decimal degrees for one axis.
///
/// An unreadable hemisphere reference keeps the unsigned magnitude.
fn coordinate(table: &TagTable, axis: Axis) -> std::result::Result<f64, FailureCause> {
    let (value_tag, ref_tag) = axis.tags();
    let field = table.require(value_tag)?;
    let triple: Vec<(u32, u32)> = match &field.value {
        Value::Rational(parts) => parts.iter().map(|r| (r.num, r.denom)).collect(),
        _ => return Err(FailureCause::Malformed),
    };
    let magnitude = rational::decode_dms(&triple)?;
    if magnitude > axis.limit() {
        return Err(FailureCause::Malformed);
    }

    let hemisphere = table
        .field(ref_tag)
        .and_then(ascii)
        .and_then(Hemisphere::from_ref)
        .filter(|h| axis.accepts(*h));
    if hemisphere.is_none() {
        warn!(?axis, "GPS reference unreadable, assuming positive hemisphere");
    }
    Ok(rational::apply_hemisphere(magnitude, hemisphere))
}

/// Capture time from `DateTimeOriginal` (or `DateTime`), shifted to UTC by
/// `OffsetTimeOriginal` when present and truncated to whole milliseconds.
fn captured_at(table: &TagTable) -> std::result::Result<DateTime<Utc>, FailureCause> {
    let (field, subsec_tag, offset_tag) = match table.field(Tag::DateTimeOriginal) {
        Some(f) => (f, Tag::SubSecTimeOriginal, Tag::OffsetTimeOriginal),
        None => (
            table.require(Tag::DateTime)?,
            Tag::SubSecTime,
            Tag::OffsetTime,
        ),
    };
    let raw = ascii(field).ok_or(FailureCause::Malformed)?;
    if is_zero_datetime(raw) {
        return Err(FailureCause::TagAbsent);
    }

    let mut dt = match exif::DateTime::from_ascii(raw) {
        Ok(dt) => dt,
        Err(exif::Error::BlankValue(_)) => return Err(FailureCause::TagAbsent),
        Err(_) => return Err(FailureCause::Malformed),
    };
    if let Some(subsec) = table.field(subsec_tag).and_then(ascii) {
        if dt.parse_subsec(subsec).is_err() {
            debug!("Ignoring malformed sub-second tag");
        }
    }
    if let Some(offset) = table.field(offset_tag).and_then(ascii) {
        if dt.parse_offset(offset).is_err() {
            debug!("Ignoring malformed offset tag, assuming UTC");
        }
    }

    let date = NaiveDate::from_ymd_opt(dt.year.into(), dt.month.into(), dt.day.into())
        .ok_or(FailureCause::Malformed)?;
    let time = NaiveTime::from_hms_nano_opt(
        dt.hour.into(),
        dt.minute.into(),
        dt.second.into(),
        dt.nanosecond.unwrap_or(0),
    )
    .ok_or(FailureCause::Malformed)?;
    let offset = chrono::Duration::minutes(dt.offset.map(i64::from).unwrap_or(0));
    let utc = date.and_time(time).and_utc() - offset;

    DateTime::from_timestamp_millis(utc.timestamp_millis()).ok_or(FailureCause::Malformed)
}

fn is_zero_datetime(raw: &[u8]) -> bool {
    let mut digits = raw.iter().filter(|b| b.is_ascii_digit()).peekable();
    digits.peek().is_some() && digits.all(|b| *b == b'0')
}

/// Free-text ASCII tag. NUL-separated parts are joined; a blank value counts
/// as absent.
fn text(table: &TagTable, tag: Tag) -> std::result::Result<String, FailureCause> {
    let field = table.require(tag)?;
    let Value::Ascii(parts) = &field.value else {
        return Err(FailureCause::Malformed);
    };
    let parts: Vec<String> = parts
        .iter()
        .map(|p| {
            String::from_utf8_lossy(p)
                .trim_matches(|c: char| c == '\0' || c.is_whitespace())
                .to_string()
        })
        .filter(|p| !p.is_empty())
        .collect();
    if parts.is_empty() {
        return Err(FailureCause::TagAbsent);
    }
    Ok(parts.join(", "))
}

fn dimension(
    table: &TagTable,
    primary: Tag,
    fallback: Tag,
) -> std::result::Result<u32, FailureCause> {
    let field = table
        .field(primary)
        .or_else(|| table.field(fallback))
        .ok_or_else(|| table.absent())?;
    match field.value.get_uint(0) {
        Some(0) | None => Err(FailureCause::Malformed),
        Some(v) => Ok(v),
    }
}

/// First string of an ASCII tag.
fn ascii(field: &Field) -> Option<&[u8]> {
    match &field.value {
        Value::Ascii(parts) => parts.first().map(Vec::as_slice),
        _ => None,
    }
}

/// Pixel dimensions from the container header, without decoding pixels.
fn header_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    let (w, h) = ::image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .ok()?
        .into_dimensions()
        .ok()?;
    (w > 0 && h > 0).then_some((w, h))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::MetadataField;
    use exif::experimental::Writer;
    use exif::Rational;

    fn field(tag: Tag, value: Value) -> Field {
        Field {
            tag,
            ifd_num: In::PRIMARY,
            value,
        }
    }

    fn rationals(parts: &[(u32, u32)]) -> Value {
        Value::Rational(
            parts
                .iter()
                .map(|&(num, denom)| Rational { num, denom })
                .collect(),
        )
    }

    fn ascii_value(s: &str) -> Value {
        Value::Ascii(vec![s.as_bytes().to_vec()])
    }

    fn tiff_with(fields: &[Field]) -> Vec<u8> {
        let mut writer = Writer::new();
        for f in fields {
            writer.push_field(f);
        }
        let mut buf = Cursor::new(Vec::new());
        writer.write(&mut buf, false).unwrap();
        buf.into_inner()
    }

    fn tiff() -> MediaFormat {
        MediaFormat::classify("tiff").unwrap()
    }

    fn full_fields() -> Vec<Field> {
        vec![
            field(Tag::Model, ascii_value("Pixel 7")),
            field(Tag::Copyright, ascii_value("Jane Doe")),
            field(Tag::DateTimeOriginal, ascii_value("2021:06:01 12:30:45")),
            field(Tag::PixelXDimension, Value::Long(vec![4000])),
            field(Tag::PixelYDimension, Value::Long(vec![3000])),
            field(Tag::GPSLatitudeRef, ascii_value("S")),
            field(Tag::GPSLatitude, rationals(&[(33, 1), (51, 1), (3108, 100)])),
            field(Tag::GPSLongitudeRef, ascii_value("W")),
            field(Tag::GPSLongitude, rationals(&[(70, 1), (39, 1), (0, 1)])),
        ]
    }

    #[test]
    fn test_full_tag_table() {
        let bytes = tiff_with(&full_fields());
        let meta = ImageMetadataDecoder::decode(&bytes, &tiff()).unwrap();

        assert!(meta.missing_fields().is_empty(), "{:?}", meta.missing_fields());
        assert_eq!(meta.camera_model(), Some("Pixel 7"));
        assert_eq!(meta.copyright(), Some("Jane Doe"));
        assert_eq!(meta.width(), Some(4000));
        assert_eq!(meta.height(), Some(3000));
        assert_eq!(meta.size_bytes(), Some(bytes.len() as u64));

        let lat = meta.latitude().unwrap();
        let lon = meta.longitude().unwrap();
        assert!((lat - -(33.0 + 51.0 / 60.0 + 31.08 / 3600.0)).abs() < 1e-9);
        assert!((lon - -(70.0 + 39.0 / 60.0)).abs() < 1e-9);

        let expected = NaiveDate::from_ymd_opt(2021, 6, 1)
            .unwrap()
            .and_hms_opt(12, 30, 45)
            .unwrap()
            .and_utc();
        assert_eq!(meta.captured_at(), Some(expected));
        assert_eq!(meta.captured_at_millis(), Some(expected.timestamp_millis()));
    }

    #[test]
    fn test_missing_tags_are_not_fatal() {
        let bytes = tiff_with(&[field(Tag::Make, ascii_value("Canon"))]);
        let meta = ImageMetadataDecoder::decode(&bytes, &tiff()).unwrap();

        let missing = meta.missing_fields();
        for f in [
            MetadataField::Latitude,
            MetadataField::Longitude,
            MetadataField::CapturedAt,
            MetadataField::Copyright,
            MetadataField::CameraModel,
            MetadataField::Width,
            MetadataField::Height,
        ] {
            assert_eq!(missing.cause_of(f), Some(FailureCause::TagAbsent), "{f}");
        }
        assert!(!missing.contains(MetadataField::SizeBytes));
        assert_eq!(meta.latitude(), None);
        assert_eq!(meta.camera_model(), None);
    }

    #[test]
    fn test_missing_hemisphere_ref_keeps_magnitude() {
        let bytes = tiff_with(&[
            field(Tag::GPSLatitude, rationals(&[(55, 1), (40, 1), (3396, 100)])),
            field(Tag::GPSLongitude, rationals(&[(12, 1), (34, 1), (588, 100)])),
            field(Tag::GPSLongitudeRef, ascii_value("N")),
        ]);
        let meta = ImageMetadataDecoder::decode(&bytes, &tiff()).unwrap();

        assert!((meta.latitude().unwrap() - 55.6761).abs() < 1e-4);
        // A latitude reference on the longitude axis is ignored.
        assert!((meta.longitude().unwrap() - 12.5683).abs() < 1e-4);
        assert!(!meta.missing_fields().contains(MetadataField::Latitude));
    }

    #[test]
    fn test_malformed_axis_is_flagged_independently() {
        let bytes = tiff_with(&[
            field(Tag::GPSLatitude, rationals(&[(55, 0), (40, 1), (0, 1)])),
            field(Tag::GPSLongitude, rationals(&[(12, 1), (30, 1), (0, 1)])),
            field(Tag::GPSLongitudeRef, ascii_value("E")),
            field(Tag::DateTimeOriginal, ascii_value("0000:00:00 00:00:00")),
            field(Tag::PixelXDimension, Value::Long(vec![0])),
        ]);
        let meta = ImageMetadataDecoder::decode(&bytes, &tiff()).unwrap();
        let missing = meta.missing_fields();

        assert_eq!(meta.latitude(), None);
        assert_eq!(missing.cause_of(MetadataField::Latitude), Some(FailureCause::Malformed));
        assert_eq!(meta.longitude(), Some(12.5));
        assert_eq!(missing.cause_of(MetadataField::CapturedAt), Some(FailureCause::TagAbsent));
        assert_eq!(missing.cause_of(MetadataField::Width), Some(FailureCause::Malformed));
    }

    #[test]
    fn test_offset_time_shifts_to_utc() {
        let bytes = tiff_with(&[
            field(Tag::DateTimeOriginal, ascii_value("2020:01:01 02:00:00")),
            field(Tag::SubSecTimeOriginal, ascii_value("250")),
            field(Tag::OffsetTimeOriginal, ascii_value("+02:00")),
        ]);
        let meta = ImageMetadataDecoder::decode(&bytes, &tiff()).unwrap();

        let expected = NaiveDate::from_ymd_opt(2020, 1, 1)
            .unwrap()
            .and_hms_milli_opt(0, 0, 0, 250)
            .unwrap()
            .and_utc();
        assert_eq!(meta.captured_at(), Some(expected));
    }

    #[test]
    fn test_pre_epoch_capture_time_is_kept() {
        let bytes = tiff_with(&[field(Tag::DateTimeOriginal, ascii_value("1965:07:04 10:00:00"))]);
        let meta = ImageMetadataDecoder::decode(&bytes, &tiff()).unwrap();

        let expected = NaiveDate::from_ymd_opt(1965, 7, 4)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap()
            .and_utc();
        assert_eq!(meta.captured_at(), Some(expected));
        assert!(meta.captured_at_millis().is_some_and(|ms| ms < 0));
        assert!(!meta.missing_fields().contains(MetadataField::CapturedAt));
    }

    #[test]
    fn test_jpeg_without_exif_uses_header_dimensions() {
        let mut buf = Cursor::new(Vec::new());
        ::image::RgbImage::new(8, 6)
            .write_to(&mut buf, ::image::ImageFormat::Jpeg)
            .unwrap();
        let bytes = buf.into_inner();

        let jpg = MediaFormat::classify("jpg").unwrap();
        let meta = ImageMetadataDecoder::decode(&bytes, &jpg).unwrap();

        assert_eq!(meta.width(), Some(8));
        assert_eq!(meta.height(), Some(6));
        assert_eq!(
            meta.missing_fields().cause_of(MetadataField::CapturedAt),
            Some(FailureCause::TagAbsent)
        );
        assert_eq!(meta.size_bytes(), Some(bytes.len() as u64));
    }

    #[test]
    fn test_unparseable_container_is_fatal() {
        let jpg = MediaFormat::classify("jpg").unwrap();
        let err = ImageMetadataDecoder::decode(b"definitely not an image", &jpg).unwrap_err();
        assert!(matches!(err, MediaError::Decode(_)));
        assert_eq!(err.cause(), Some(FailureCause::DecodeError));
    }

    #[test]
    fn test_decode_is_idempotent() {
        let bytes = tiff_with(&full_fields()[..4]);
        let first = ImageMetadataDecoder::decode(&bytes, &tiff()).unwrap();
        let second = ImageMetadataDecoder::decode(&bytes, &tiff()).unwrap();
        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[test]
    fn test_zero_datetime_detection() {
        assert!(is_zero_datetime(b"0000:00:00 00:00:00"));
        assert!(!is_zero_datetime(b"2020:00:00 00:00:00"));
        assert!(!is_zero_datetime(b"    :  :     :  :  "));
    }
}
