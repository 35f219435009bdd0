//! Running window statistics for display amplitude auto-scaling.
//!
//! Each ingested packet contributes one [`StatPoint`] carrying its
//! sum of squares, maximum absolute value, and sample count. Totals for
//! the sum and the count are maintained incrementally; the maximum has
//! no inverse, so it is recomputed by scanning the remaining points
//! whenever eviction removes anything.

use std::collections::VecDeque;

/// One packet's contribution to the statistics window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatPoint {
    /// Time the contribution was recorded (epoch ms).
    pub timestamp: i64,
    /// Sum of squared sample values.
    pub sum_squares: f64,
    /// Largest absolute sample value.
    pub max_abs: f64,
    /// Number of samples.
    pub count: u64,
}

impl StatPoint {
    /// Summarize a run of sample values recorded at `timestamp`.
    pub fn from_values(timestamp: i64, values: &[f64]) -> Self {
        let (sum_squares, max_abs) = values
            .iter()
            .fold((0.0_f64, 0.0_f64), |(sum, max), v| (v.mul_add(*v, sum), max.max(v.abs())));
        Self {
            timestamp,
            sum_squares,
            max_abs,
            count: u64::try_from(values.len()).unwrap_or(u64::MAX),
        }
    }
}

/// Display amplitude constants: `max(rms * rms_gain, max_abs * max_abs_gain, floor)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleParams {
    /// Multiplier on the windowed RMS.
    pub rms_gain: f64,
    /// Multiplier on the windowed maximum absolute value.
    pub max_abs_gain: f64,
    /// Lower bound on the scale.
    pub floor: f64,
}

impl From<&crate::config::DisplayScaleConfig> for ScaleParams {
    fn from(config: &crate::config::DisplayScaleConfig) -> Self {
        Self {
            rms_gain: config.rms_gain,
            max_abs_gain: config.max_abs_gain,
            floor: config.floor,
        }
    }
}

/// Sliding-window accumulator of [`StatPoint`]s, ordered by timestamp.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunningWindowStats {
    points: VecDeque<StatPoint>,
    total_sum_squares: f64,
    total_count: u64,
    total_max_abs: f64,
}

impl RunningWindowStats {
    /// Create an empty accumulator.
    pub const fn new() -> Self {
        Self {
            points: VecDeque::new(),
            total_sum_squares: 0.0,
            total_count: 0,
            total_max_abs: 0.0,
        }
    }

    /// Add a point, keeping points in timestamp order.
    ///
    /// Points with equal timestamps keep their insertion order.
    pub fn add_point(&mut self, point: StatPoint) {
        let in_order = self
            .points
            .back()
            .is_none_or(|last| last.timestamp <= point.timestamp);
        if in_order {
            self.points.push_back(point);
        } else {
            let index = self
                .points
                .partition_point(|existing| existing.timestamp <= point.timestamp);
            self.points.insert(index, point);
        }
        self.total_sum_squares += point.sum_squares;
        self.total_count = self.total_count.saturating_add(point.count);
        self.total_max_abs = self.total_max_abs.max(point.max_abs);
    }

    /// Remove every point with `timestamp < cutoff`. Returns how many were
    /// removed.
    pub fn evict(&mut self, cutoff: i64) -> usize {
        let mut removed = 0_usize;
        while let Some(oldest) = self.points.front().copied() {
            if oldest.timestamp >= cutoff {
                break;
            }
            self.points.pop_front();
            self.total_sum_squares -= oldest.sum_squares;
            self.total_count = self.total_count.saturating_sub(oldest.count);
            removed = removed.saturating_add(1);
        }
        if removed > 0 {
            self.rescan_after_removal();
        }
        removed
    }

    /// Drop every point.
    pub fn clear(&mut self) {
        *self = Self::new();
    }

    fn rescan_after_removal(&mut self) {
        if self.points.is_empty() {
            // Exact zero instead of accumulated subtraction residue.
            self.total_sum_squares = 0.0;
            self.total_count = 0;
            self.total_max_abs = 0.0;
            return;
        }
        self.total_max_abs = self
            .points
            .iter()
            .map(|p| p.max_abs)
            .fold(0.0, f64::max);
    }

    /// Running sum of squares.
    pub const fn total_sum_squares(&self) -> f64 {
        self.total_sum_squares
    }

    /// Running sample count.
    pub const fn total_count(&self) -> u64 {
        self.total_count
    }

    /// Largest absolute value among the retained points.
    pub const fn total_max_abs(&self) -> f64 {
        self.total_max_abs
    }

    /// Number of retained points.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether no points are retained.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Retained points, oldest first.
    pub fn points(&self) -> impl Iterator<Item = &StatPoint> {
        self.points.iter()
    }

    /// Root mean square over the window, if any samples are retained.
    #[allow(clippy::cast_precision_loss)]
    pub fn rms(&self) -> Option<f64> {
        if self.total_count == 0 {
            return None;
        }
        let mean_square = (self.total_sum_squares / self.total_count as f64).max(0.0);
        Some(mean_square.sqrt())
    }

    /// Display scale for the current window, or `None` when empty.
    pub fn display_scale(&self, params: ScaleParams) -> Option<f64> {
        let rms = self.rms()?;
        Some(
            (rms * params.rms_gain)
                .max(self.total_max_abs * params.max_abs_gain)
                .max(params.floor),
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use super::*;

    const CANONICAL: ScaleParams = ScaleParams {
        rms_gain: 4.0,
        max_abs_gain: 0.3,
        floor: 0.05,
    };

    fn point(timestamp: i64, sum_squares: f64, max_abs: f64, count: u64) -> StatPoint {
        StatPoint {
            timestamp,
            sum_squares,
            max_abs,
            count,
        }
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() <= 1e-6 * a.abs().max(b.abs()).max(1.0)
    }

    #[test]
    fn constant_signal_scale() {
        let mut stats = RunningWindowStats::new();
        stats.add_point(StatPoint::from_values(1_000, &[0.1; 100]));
        let scale = stats.display_scale(CANONICAL).unwrap();
        assert!(close(scale, 0.4), "scale was {scale}");
    }

    #[test]
    fn quiet_signal_hits_floor() {
        let mut stats = RunningWindowStats::new();
        stats.add_point(StatPoint::from_values(1_000, &[0.001; 50]));
        assert!(close(stats.display_scale(CANONICAL).unwrap(), 0.05));
    }

    #[test]
    fn spike_dominates_through_max_abs_gain() {
        let mut stats = RunningWindowStats::new();
        let mut values = vec![0.0; 999];
        values.push(100.0);
        stats.add_point(StatPoint::from_values(1_000, &values));
        // rms = sqrt(10_000 / 1000) = 3.16 -> 12.65; max_abs 100 * 0.3 = 30.
        assert!(close(stats.display_scale(CANONICAL).unwrap(), 30.0));
    }

    #[test]
    fn empty_window_has_no_scale() {
        let stats = RunningWindowStats::new();
        assert!(stats.display_scale(CANONICAL).is_none());
        assert!(stats.rms().is_none());
    }

    #[test]
    fn out_of_order_points_are_sorted() {
        let mut stats = RunningWindowStats::new();
        stats.add_point(point(300, 1.0, 1.0, 1));
        stats.add_point(point(100, 1.0, 1.0, 1));
        stats.add_point(point(200, 1.0, 1.0, 1));
        let order: Vec<i64> = stats.points().map(|p| p.timestamp).collect();
        assert_eq!(order, vec![100, 200, 300]);
    }

    #[test]
    fn eviction_rescans_max() {
        let mut stats = RunningWindowStats::new();
        stats.add_point(point(100, 4.0, 9.0, 2));
        stats.add_point(point(200, 1.0, 2.0, 1));
        assert!(close(stats.total_max_abs(), 9.0));

        assert_eq!(stats.evict(150), 1);
        assert!(close(stats.total_max_abs(), 2.0));
        assert_eq!(stats.total_count(), 1);
        assert!(close(stats.total_sum_squares(), 1.0));
    }

    #[test]
    fn eviction_to_empty_resets_totals_exactly() {
        let mut stats = RunningWindowStats::new();
        stats.add_point(point(100, 0.1, 0.3, 3));
        stats.add_point(point(200, 0.2, 0.3, 3));
        stats.evict(1_000);
        assert!(stats.is_empty());
        assert_eq!(stats.total_count(), 0);
        assert!(stats.total_sum_squares().abs() < f64::EPSILON);
        assert!(stats.total_max_abs().abs() < f64::EPSILON);
    }

    #[test]
    fn cutoff_is_exclusive() {
        let mut stats = RunningWindowStats::new();
        stats.add_point(point(100, 1.0, 1.0, 1));
        assert_eq!(stats.evict(100), 0);
        assert_eq!(stats.evict(101), 1);
    }

    #[test]
    fn totals_match_retained_points_under_random_sequences() {
        let mut rng = StdRng::seed_from_u64(0x5EED);
        let mut stats = RunningWindowStats::new();
        let mut now: i64 = 0;

        for _ in 0..5_000 {
            if rng.random_bool(0.7) {
                let jitter = rng.random_range(-500..500);
                let len = rng.random_range(0..200);
                let values: Vec<f64> = (0..len).map(|_| rng.random_range(-50.0..50.0)).collect();
                stats.add_point(StatPoint::from_values(now + jitter, &values));
            } else {
                stats.evict(now - rng.random_range(0..10_000));
            }
            now += rng.random_range(0..300);

            let count: u64 = stats.points().map(|p| p.count).sum();
            let sum: f64 = stats.points().map(|p| p.sum_squares).sum();
            let max = stats.points().map(|p| p.max_abs).fold(0.0, f64::max);
            assert_eq!(stats.total_count(), count);
            assert!(close(stats.total_sum_squares(), sum));
            assert!(close(stats.total_max_abs(), max));
        }
    }
}
