//! Adaptive sample stride for drawing long windows at bounded density.

/// Target samples drawn per visible pixel.
pub const DEFAULT_POINT_DENSITY: f64 = 0.5;

/// Sample stride for a window at the default density.
///
/// `stride = max(1, floor(window_seconds * sample_rate_hz / (width_px * 0.5)))`.
/// Consumers draw every `stride`-th sample. Non-finite or non-positive
/// inputs yield a stride of 1.
pub fn downsample_stride(window_seconds: f64, sample_rate_hz: f64, width_px: f64) -> usize {
    downsample_stride_with_density(window_seconds, sample_rate_hz, width_px, DEFAULT_POINT_DENSITY)
}

/// Sample stride for a window at `points_per_pixel` drawn samples per pixel.
pub fn downsample_stride_with_density(
    window_seconds: f64,
    sample_rate_hz: f64,
    width_px: f64,
    points_per_pixel: f64,
) -> usize {
    let total_points = window_seconds * sample_rate_hz;
    let target_points = width_px * points_per_pixel;
    let inputs_ok = [window_seconds, sample_rate_hz, width_px, points_per_pixel]
        .iter()
        .all(|v| v.is_finite() && *v > 0.0);
    if !inputs_ok || !total_points.is_finite() || target_points <= 0.0 {
        return 1;
    }
    let ratio = (total_points / target_points).floor();
    if ratio < 1.0 {
        return 1;
    }
    // Positive and finite; `as` saturates anything beyond usize::MAX.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let stride = ratio as usize;
    stride.max(1)
}
