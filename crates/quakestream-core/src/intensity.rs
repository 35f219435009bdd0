//! Peak ground acceleration to intensity class.
//!
//! This is the only place a PGA value is turned into an
//! [`IntensityClass`]; every reader goes through [`classify_pga`].

use quakestream_types::{IntensityClass, PgaSample};

/// Lower PGA bound (gal, inclusive) of each class above `0`, ascending.
pub const INTENSITY_THRESHOLDS: [(f64, IntensityClass); 9] = [
    (0.8, IntensityClass::One),
    (2.5, IntensityClass::Two),
    (8.0, IntensityClass::Three),
    (25.0, IntensityClass::Four),
    (80.0, IntensityClass::FiveWeak),
    (140.0, IntensityClass::FiveStrong),
    (250.0, IntensityClass::SixWeak),
    (440.0, IntensityClass::SixStrong),
    (800.0, IntensityClass::Seven),
];

/// Intensity class for a PGA in gal. Non-finite or negative input is
/// class `0`.
pub fn classify_pga(pga: f64) -> IntensityClass {
    if !pga.is_finite() {
        return IntensityClass::Zero;
    }
    INTENSITY_THRESHOLDS
        .iter()
        .rev()
        .find(|(bound, _)| pga >= *bound)
        .map_or(IntensityClass::Zero, |(_, class)| *class)
}

/// Largest PGA among samples recorded at or after `cutoff`, or 0.
pub fn max_pga_since<'a>(history: impl IntoIterator<Item = &'a PgaSample>, cutoff: i64) -> f64 {
    history
        .into_iter()
        .filter(|sample| sample.timestamp >= cutoff)
        .map(|sample| sample.pga)
        .fold(0.0, f64::max)
}
