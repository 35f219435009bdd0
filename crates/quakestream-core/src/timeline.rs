//! Time-to-coordinate mapping for renderers.
//!
//! Two mappings, both pure functions of their arguments:
//!
//! - [`PixelTimeline`] places samples on a fixed pixel axis relative to a
//!   slowly-moving origin. Scrolling is done by subtracting a single
//!   [`camera_offset`](PixelTimeline::camera_offset) rather than by
//!   recomputing every sample's `x`.
//! - [`wrapped_longitude`] maps time onto a wrapped angle in `[-180, 180)`
//!   so an unbounded timeline never produces unbounded coordinates.

/// Full turn in degrees.
const FULL_TURN: f64 = 360.0;

/// Half turn in degrees; the upper (exclusive) bound of the wrapped range.
const HALF_TURN: f64 = 180.0;

/// Milliseconds between two timestamps as a float.
#[allow(clippy::cast_precision_loss)]
fn elapsed_ms(time_ms: i64, base_time_ms: i64) -> f64 {
    time_ms.saturating_sub(base_time_ms) as f64
}

/// Fixed-pixel timeline geometry.
///
/// A sample at `base_time` lands on the right edge of the trace area
/// (`x_offset + wave_width`); older samples lie to its left at
/// `wave_width / time_window_ms` pixels per millisecond.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelTimeline {
    /// Left edge of the trace area in pixels.
    pub x_offset: f64,
    /// Width of the trace area in pixels.
    pub wave_width: f64,
    /// Time span shown across `wave_width` (ms).
    pub time_window_ms: f64,
}

impl PixelTimeline {
    /// Create a timeline geometry.
    pub const fn new(x_offset: f64, wave_width: f64, time_window_ms: f64) -> Self {
        Self {
            x_offset,
            wave_width,
            time_window_ms,
        }
    }

    /// Pixels per millisecond. Zero for a degenerate window so every
    /// mapping stays finite.
    pub fn speed(&self) -> f64 {
        let speed = self.wave_width / self.time_window_ms;
        if self.time_window_ms > 0.0 && speed.is_finite() {
            speed
        } else {
            0.0
        }
    }

    /// Pixel position of a sample relative to `base_time_ms`.
    pub fn sample_x(&self, sample_time_ms: i64, base_time_ms: i64) -> f64 {
        elapsed_ms(sample_time_ms, base_time_ms).mul_add(
            self.speed(),
            self.x_offset + self.wave_width,
        )
    }

    /// Horizontal camera shift for the current time. Subtract it from
    /// [`sample_x`](Self::sample_x) to place the viewport.
    pub fn camera_offset(&self, now_ms: i64, base_time_ms: i64) -> f64 {
        elapsed_ms(now_ms, base_time_ms) * self.speed()
    }

    /// On-screen position of a sample at `now_ms`.
    pub fn screen_x(&self, sample_time_ms: i64, base_time_ms: i64, now_ms: i64) -> f64 {
        self.sample_x(sample_time_ms, base_time_ms) - self.camera_offset(now_ms, base_time_ms)
    }

    /// Whether a screen position falls inside the trace area.
    pub fn is_visible(&self, screen_x: f64) -> bool {
        screen_x >= self.x_offset && screen_x <= self.x_offset + self.wave_width
    }
}

/// Map a time onto a wrapped angle in `[-180, 180)`.
///
/// `degrees = ((time - base) / 1000 * degrees_per_second) mod 360`,
/// shifted down by 360 when it reaches 180. Times exactly
/// `360 / degrees_per_second` seconds apart map to the same angle.
/// Non-finite intermediate results map to 0.
pub fn wrapped_longitude(time_ms: i64, base_time_ms: i64, degrees_per_second: f64) -> f64 {
    let elapsed_seconds = elapsed_ms(time_ms, base_time_ms) / 1000.0;
    let raw = elapsed_seconds * degrees_per_second;
    if !raw.is_finite() {
        return 0.0;
    }
    let turned = raw.rem_euclid(FULL_TURN);
    if turned >= HALF_TURN {
        turned - FULL_TURN
    } else {
        turned
    }
}
