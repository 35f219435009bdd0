//! Pick arrival-time parsing.
//!
//! Upstream pick sources publish the arrival time either as epoch seconds
//! or as a compact UTC calendar string (`YYYYMMDDhhmmss.ff`), sometimes as
//! a JSON number and sometimes as a string. The format is not declared, so
//! it is inferred from magnitude: a compact calendar string read as a
//! number is at least 1e13, far above any epoch-seconds value before the
//! year 2286.

use chrono::{DateTime, NaiveDateTime};

use crate::packet::LooseNumber;

/// Epoch seconds at 2286-11-20T17:46:40Z. Numeric values below this are
/// epoch seconds; values at or above it are compact calendar strings.
pub const EPOCH_SECONDS_LIMIT: f64 = 10_000_000_000.0;

/// Calendar layouts accepted for textual pick times, tried in order.
const CALENDAR_FORMATS: [&str; 2] = ["%Y%m%d%H%M%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Errors that can occur when parsing a pick time.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PickTimeError {
    /// The value is not finite or lies before the epoch.
    #[error("pick time out of range: {raw}")]
    OutOfRange {
        /// The offending value as received.
        raw: String,
    },

    /// The value matches none of the accepted formats.
    #[error("unrecognized pick time format: {raw}")]
    Unrecognized {
        /// The offending value as received.
        raw: String,
    },
}

/// Parse a pick time into epoch milliseconds.
///
/// # Errors
///
/// Returns [`PickTimeError`] if the value is non-finite, negative, or
/// matches none of the accepted formats.
pub fn parse_pick_time(raw: &LooseNumber) -> Result<i64, PickTimeError> {
    match raw {
        LooseNumber::Number(value) => parse_numeric(*value, &value.to_string()),
        LooseNumber::Text(text) => {
            let trimmed = text.trim();
            match trimmed.parse::<f64>() {
                Ok(value) if value < EPOCH_SECONDS_LIMIT => parse_numeric(value, trimmed),
                _ => parse_calendar(trimmed),
            }
        }
    }
}

/// Numeric branch: epoch seconds below the limit, calendar digits above.
fn parse_numeric(value: f64, raw: &str) -> Result<i64, PickTimeError> {
    if !value.is_finite() || value < 0.0 {
        return Err(PickTimeError::OutOfRange {
            raw: raw.to_owned(),
        });
    }
    if value < EPOCH_SECONDS_LIMIT {
        // Bounded by the limit check above, so the product fits in i64.
        #[allow(clippy::cast_possible_truncation)]
        let millis = (value * 1000.0).round() as i64;
        return Ok(millis);
    }
    parse_calendar(&format!("{value:.3}"))
}

/// Calendar branch: compact digits, a spaced layout, or RFC 3339.
fn parse_calendar(text: &str) -> Result<i64, PickTimeError> {
    for layout in CALENDAR_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(text, layout) {
            return Ok(parsed.and_utc().timestamp_millis());
        }
    }
    DateTime::parse_from_rfc3339(text)
        .map(|parsed| parsed.timestamp_millis())
        .map_err(|_err| PickTimeError::Unrecognized {
            raw: text.to_owned(),
        })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn epoch_seconds_number() {
        let ms = parse_pick_time(&LooseNumber::Number(1_732_070_774.12)).unwrap();
        assert_eq!(ms, 1_732_070_774_120);
    }

    #[test]
    fn epoch_seconds_string() {
        let ms = parse_pick_time(&LooseNumber::Text("1732070774.5".to_owned())).unwrap();
        assert_eq!(ms, 1_732_070_774_500);
    }

    #[test]
    fn compact_calendar_string() {
        let ms = parse_pick_time(&LooseNumber::Text("20241120023614.25".to_owned())).unwrap();
        // 2024-11-20T02:36:14.250Z
        assert_eq!(ms, 1_732_070_174_250);
    }

    #[test]
    fn compact_calendar_without_fraction() {
        let ms = parse_pick_time(&LooseNumber::Text("20241120023614".to_owned())).unwrap();
        assert_eq!(ms, 1_732_070_174_000);
    }

    #[test]
    fn compact_calendar_as_number() {
        let ms = parse_pick_time(&LooseNumber::Number(20_241_120_023_614.0)).unwrap();
        assert_eq!(ms, 1_732_070_174_000);
    }

    #[test]
    fn rfc3339_string() {
        let text = LooseNumber::Text("2024-11-20T02:36:14.250Z".to_owned());
        let ms = parse_pick_time(&text).unwrap();
        assert_eq!(ms, 1_732_070_174_250);
    }

    #[test]
    fn rejects_garbage() {
        let err = parse_pick_time(&LooseNumber::Text("soon".to_owned())).unwrap_err();
        assert!(matches!(err, PickTimeError::Unrecognized { .. }));
    }

    #[test]
    fn rejects_non_finite_and_negative() {
        assert!(parse_pick_time(&LooseNumber::Number(f64::NAN)).is_err());
        assert!(parse_pick_time(&LooseNumber::Number(-5.0)).is_err());
    }
}
