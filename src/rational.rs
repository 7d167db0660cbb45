//! Degree/minute/second rational conversion for GPS tags

use crate::error::FailureCause;

/// Hemisphere reference carried next to a GPS axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hemisphere {
    North,
    South,
    East,
    West,
}

impl Hemisphere {
    /// Parse a single-character reference tag (`N`, `S`, `E`, `W`).
    ///
    /// Surrounding whitespace and NUL padding are ignored; anything else is
    /// rejected.
    pub fn from_ref(raw: &[u8]) -> Option<Self> {
        let trimmed: Vec<u8> = raw
            .iter()
            .copied()
            .filter(|b| *b != 0 && !b.is_ascii_whitespace())
            .collect();
        match trimmed.as_slice() {
            [b'N'] | [b'n'] => Some(Hemisphere::North),
            [b'S'] | [b's'] => Some(Hemisphere::South),
            [b'E'] | [b'e'] => Some(Hemisphere::East),
            [b'W'] | [b'w'] => Some(Hemisphere::West),
            _ => None,
        }
    }

    pub fn is_negative(&self) -> bool {
        matches!(self, Hemisphere::South | Hemisphere::West)
    }
}

/// Convert an unsigned rational to a float, rejecting a zero denominator.
pub fn rational_to_f64(num: u32, denom: u32) -> Result<f64, FailureCause> {
    if denom == 0 {
        return Err(FailureCause::Malformed);
    }
    Ok(f64::from(num) / f64::from(denom))
}

/// `degrees + minutes/60 + seconds/3600`
pub fn dms_to_decimal(degrees: f64, minutes: f64, seconds: f64) -> f64 {
    degrees + minutes / 60.0 + seconds / 3600.0
}

/// Apply a hemisphere reference to an unsigned magnitude.
///
/// An unknown reference leaves the magnitude positive.
pub fn apply_hemisphere(magnitude: f64, hemisphere: Option<Hemisphere>) -> f64 {
    match hemisphere {
        Some(h) if h.is_negative() => -magnitude,
        _ => magnitude,
    }
}

/// Decode a `[degrees, minutes, seconds]` rational triple into unsigned
/// decimal degrees. Fewer than three components is malformed.
pub fn decode_dms(triple: &[(u32, u32)]) -> Result<f64, FailureCause> {
    let [(dn, dd), (mn, md), (sn, sd), ..] = triple else {
        return Err(FailureCause::Malformed);
    };
    let value = dms_to_decimal(
        rational_to_f64(*dn, *dd)?,
        rational_to_f64(*mn, *md)?,
        rational_to_f64(*sn, *sd)?,
    );
    if value.is_finite() {
        Ok(value)
    } else {
        Err(FailureCause::Malformed)
    }
}

/// Split signed decimal degrees into an unsigned rational triple plus the
/// sign, with seconds kept to `1/seconds_denom` precision.
pub fn encode_dms(value: f64, seconds_denom: u32) -> ([(u32, u32); 3], bool) {
    let negative = value < 0.0;
    let magnitude = value.abs();
    let degrees = magnitude.trunc();
    let minutes_full = (magnitude - degrees) * 60.0;
    let minutes = minutes_full.trunc();
    let seconds = (minutes_full - minutes) * 60.0;
    (
        [
            (degrees as u32, 1),
            (minutes as u32, 1),
            ((seconds * f64::from(seconds_denom)).round() as u32, seconds_denom),
        ],
        negative,
    )
}
