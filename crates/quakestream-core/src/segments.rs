//! Per-station waveform segment buffer with gap markers.
//!
//! Segments are stored behind [`Arc`] so snapshots share sample buffers
//! with the buffer instead of copying them.

use std::collections::VecDeque;
use std::sync::Arc;

use quakestream_types::Segment;

/// Gap tolerance in sample intervals: a break longer than this many
/// intervals between packets is a discontinuity.
const GAP_INTERVALS: f64 = 2.0;

/// How a new segment relates to the end of the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Continuity {
    /// No previous packet.
    First,
    /// Starts within tolerance of the previous end.
    Contiguous,
    /// Starts after the previous end by more than the tolerance.
    Gap {
        /// End of the previous packet (epoch ms).
        from: i64,
        /// Start of the new packet (epoch ms).
        to: i64,
    },
    /// Starts before the previous end by more than the tolerance.
    Backward {
        /// How far before the previous end the packet starts (ms).
        behind_ms: i64,
    },
}

/// Maximum allowed break between packets at `sample_rate` Hz, in ms.
pub fn gap_tolerance_ms(sample_rate: f64) -> f64 {
    GAP_INTERVALS * 1000.0 / sample_rate
}

/// Ordered waveform segments for one station.
///
/// Data segments are ordered by start time. A gap segment is only ever
/// placed between two data segments; leading gaps are dropped on
/// eviction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SegmentBuffer {
    segments: VecDeque<Arc<Segment>>,
    last_end_time: Option<i64>,
    sample_count: usize,
}

impl SegmentBuffer {
    /// Create an empty buffer.
    pub const fn new() -> Self {
        Self {
            segments: VecDeque::new(),
            last_end_time: None,
            sample_count: 0,
        }
    }

    /// Classify a packet starting at `start_time` sampled at `sample_rate`.
    #[allow(clippy::cast_precision_loss)]
    pub fn continuity(&self, start_time: i64, sample_rate: f64) -> Continuity {
        let Some(last_end) = self.last_end_time else {
            return Continuity::First;
        };
        let delta = start_time.saturating_sub(last_end);
        if (delta as f64).abs() <= gap_tolerance_ms(sample_rate) {
            Continuity::Contiguous
        } else if delta > 0 {
            Continuity::Gap {
                from: last_end,
                to: start_time,
            }
        } else {
            Continuity::Backward {
                behind_ms: delta.saturating_neg(),
            }
        }
    }

    /// Append a data segment, inserting a gap marker first when the
    /// segment does not continue the previous one.
    ///
    /// The caller rejects [`Continuity::Backward`] segments before calling
    /// this; they are appended as-is if passed.
    pub fn append(&mut self, segment: Segment) -> Continuity {
        let continuity = self.continuity(segment.start_time, segment.sample_rate);
        if let Continuity::Gap { from, to } = continuity {
            self.segments
                .push_back(Arc::new(Segment::gap(from, to, segment.sample_rate)));
        }
        self.last_end_time = Some(segment.end_time);
        self.sample_count = self.sample_count.saturating_add(segment.len());
        self.segments.push_back(Arc::new(segment));
        continuity
    }

    /// Drop segments that ended before `cutoff`, then any gap left at the
    /// front. Returns the number of data segments removed.
    pub fn evict(&mut self, cutoff: i64) -> usize {
        let mut removed = 0_usize;
        while let Some(front) = self.segments.front() {
            let expired = front.end_time < cutoff;
            if !expired && !front.is_gap {
                break;
            }
            let Some(segment) = self.segments.pop_front() else {
                break;
            };
            if !segment.is_gap {
                self.sample_count = self.sample_count.saturating_sub(segment.len());
                removed = removed.saturating_add(1);
            }
        }
        removed
    }

    /// Drop all segments and forget the last end time.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Declared end time of the most recent packet (epoch ms).
    pub const fn last_end_time(&self) -> Option<i64> {
        self.last_end_time
    }

    /// Total samples across data segments.
    pub const fn sample_count(&self) -> usize {
        self.sample_count
    }

    /// Number of segments, gaps included.
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Whether no segments are retained.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Retained segments, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Segment> {
        self.segments.iter().map(Arc::as_ref)
    }

    /// Shared handles to the retained segments, oldest first.
    pub fn shared(&self) -> Vec<Arc<Segment>> {
        self.segments.iter().map(Arc::clone).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet(start: i64, end: i64) -> Segment {
        Segment::data(start, end, 100.0, vec![0.1; 100])
    }

    #[test]
    fn contiguous_packets_have_no_gap() {
        let mut buffer = SegmentBuffer::new();
        assert_eq!(buffer.append(packet(1_000_000, 1_000_990)), Continuity::First);
        assert_eq!(buffer.append(packet(1_001_000, 1_001_990)), Continuity::Contiguous);
        assert_eq!(buffer.len(), 2);
        assert!(buffer.iter().all(|s| !s.is_gap));
        assert_eq!(buffer.sample_count(), 200);
    }

    #[test]
    fn discontinuity_inserts_one_gap() {
        let mut buffer = SegmentBuffer::new();
        buffer.append(packet(1_000_000, 1_000_990));
        let continuity = buffer.append(packet(1_003_000, 1_003_990));
        assert_eq!(
            continuity,
            Continuity::Gap {
                from: 1_000_990,
                to: 1_003_000
            }
        );

        let gaps: Vec<&Segment> = buffer.iter().filter(|s| s.is_gap).collect();
        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps.first().map(|g| (g.start_time, g.end_time)), Some((1_000_990, 1_003_000)));
        assert!(gaps.iter().all(|g| g.values.is_empty()));
        assert_eq!(buffer.len(), 3);
    }

    #[test]
    fn tolerance_is_two_sample_intervals() {
        let mut buffer = SegmentBuffer::new();
        buffer.append(packet(1_000_000, 1_000_990));
        // 20 ms at 100 Hz is within tolerance, 21 ms is not.
        assert_eq!(buffer.continuity(1_001_010, 100.0), Continuity::Contiguous);
        assert!(matches!(buffer.continuity(1_001_011, 100.0), Continuity::Gap { .. }));
        assert_eq!(
            buffer.continuity(1_000_900, 100.0),
            Continuity::Backward { behind_ms: 90 }
        );
    }

    #[test]
    fn eviction_drops_expired_and_leading_gaps() {
        let mut buffer = SegmentBuffer::new();
        buffer.append(packet(1_000_000, 1_000_990));
        buffer.append(packet(1_003_000, 1_003_990));

        assert_eq!(buffer.evict(1_001_000), 1);
        assert_eq!(buffer.len(), 1);
        assert!(buffer.iter().all(|s| !s.is_gap));
        assert_eq!(buffer.sample_count(), 100);
    }

    #[test]
    fn eviction_keeps_last_end_time() {
        let mut buffer = SegmentBuffer::new();
        buffer.append(packet(1_000_000, 1_000_990));
        buffer.evict(2_000_000);
        assert!(buffer.is_empty());
        assert_eq!(buffer.last_end_time(), Some(1_000_990));
    }

    #[test]
    fn reset_forgets_everything() {
        let mut buffer = SegmentBuffer::new();
        buffer.append(packet(1_000_000, 1_000_990));
        buffer.reset();
        assert!(buffer.is_empty());
        assert_eq!(buffer.last_end_time(), None);
        assert_eq!(buffer.continuity(0, 100.0), Continuity::First);
    }
}
