//! Repair of the latitude/longitude tokens of the vote table.
//!
//! The tokens come in many shapes: decimal commas, thousands separators used
//! as decimal points, or the decimal point missing altogether
//! (`-22432154` for `-22.432154`). The repair below is tuned to these
//! patterns and every known pattern has its own test case.

use log::debug;

use crate::config::*;

/// Why a record did not make it through sanitization.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum CoordinateRejection {
    /// One of the tokens has no usable digits.
    Unrecoverable,
    /// Both tokens parse, but the point is outside the bounding box.
    OutOfBounds,
}

const MAX_DEGREES: f64 = 180.0;

/// Turns a raw coordinate token into degrees.
///
/// A token that parses directly is kept as is, unless it is too large to be a
/// latitude or longitude, in which case it goes through the digit repair.
///
/// Returns `None` when the token cannot be recovered. The returned value is
/// always finite.
pub fn sanitize_coordinate(token: &str, repair: &DigitRepair) -> Option<f64> {
    let normalized = token.replace(',', ".");
    let s = normalized.trim();
    match s.parse::<f64>() {
        Ok(x) if x.is_finite() && x.abs() <= MAX_DEGREES => Some(x),
        // "inf", "NaN" and overflowing exponents parse, but are not coordinates.
        Ok(x) if !x.is_finite() => None,
        // Too large for degrees: the decimal point went missing.
        _ => repair_digits(s, repair),
    }
}

fn repair_digits(s: &str, repair: &DigitRepair) -> Option<f64> {
    let negative = s.starts_with('-');
    let digits: String = s.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    let split = if digits.len() > repair.long_run_threshold {
        repair.long_run_split
    } else {
        repair.short_run_split
    }
    .min(digits.len());
    let (integral, fractional) = digits.split_at(split);
    let rebuilt = format!(
        "{}{}.{}",
        if negative { "-" } else { "" },
        integral,
        fractional
    );
    debug!("repair_digits: {:?} -> {:?}", s, rebuilt);
    rebuilt.parse::<f64>().ok().filter(|x| x.is_finite())
}

/// Sanitizes both coordinates of a record.
///
/// The record is either returned with two valid coordinates, or rejected as a
/// whole.
pub fn sanitize_record(
    raw: &RawVoteRecord,
    repair: &DigitRepair,
    bounds: &BoundingBox,
) -> Result<SanitizedVoteRecord, CoordinateRejection> {
    let latitude = sanitize_coordinate(&raw.raw_latitude, repair);
    let longitude = sanitize_coordinate(&raw.raw_longitude, repair);
    match (latitude, longitude) {
        (Some(latitude), Some(longitude)) if bounds.contains(latitude, longitude) => {
            Ok(SanitizedVoteRecord {
                candidate: raw.candidate.clone(),
                location: raw.location.clone(),
                zone: raw.zone,
                votes: raw.votes,
                latitude,
                longitude,
            })
        }
        (Some(_), Some(_)) => Err(CoordinateRejection::OutOfBounds),
        _ => Err(CoordinateRejection::Unrecoverable),
    }
}

pub fn sanitize_records(
    raws: &[RawVoteRecord],
    repair: &DigitRepair,
    bounds: &BoundingBox,
) -> (Vec<SanitizedVoteRecord>, SanitizeReport) {
    let mut report = SanitizeReport {
        read: raws.len(),
        ..SanitizeReport::default()
    };
    let mut res: Vec<SanitizedVoteRecord> = Vec::with_capacity(raws.len());
    for raw in raws.iter() {
        match sanitize_record(raw, repair, bounds) {
            Ok(rec) => res.push(rec),
            Err(reason) => {
                debug!(
                    "sanitize_records: dropping {:?} / {:?} ({:?}, {:?}): {:?}",
                    raw.location, raw.candidate, raw.raw_latitude, raw.raw_longitude, reason
                );
                match reason {
                    CoordinateRejection::Unrecoverable => report.unrecoverable += 1,
                    CoordinateRejection::OutOfBounds => report.out_of_bounds += 1,
                }
            }
        }
    }
    report.kept = res.len();
    (res, report)
}
