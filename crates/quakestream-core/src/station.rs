//! Per-station aggregate: segments, statistics, picks, and PGA history.
//!
//! A [`StationState`] is the unit of ingestion and eviction. It validates
//! each packet on its own, so a bad packet only ever affects itself.

use std::collections::VecDeque;

use quakestream_types::{
    DisplayState, IntensityReading, PgaSample, Pick, Segment, StationCode, WaveformPacket,
};

use crate::clock::seconds_to_ms;
use crate::engine::IngestError;
use crate::intensity::{classify_pga, max_pga_since};
use crate::picks::{PickRegistry, UpsertOutcome};
use crate::segments::{Continuity, SegmentBuffer};
use crate::window_stats::{RunningWindowStats, ScaleParams, StatPoint};

/// What ingesting one waveform packet did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaveformOutcome {
    /// Appended without a discontinuity.
    Appended,
    /// Appended after a gap marker.
    AppendedAfterGap,
    /// The station history was reset and the packet started a new one.
    Restarted,
}

/// Items removed from one station by a single eviction pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvictionCounts {
    /// Data segments removed.
    pub segments: usize,
    /// PGA samples removed.
    pub pga_samples: usize,
    /// Picks removed.
    pub picks: usize,
    /// Statistics points removed.
    pub stat_points: usize,
}

impl EvictionCounts {
    /// Accumulate another station's counts.
    pub const fn add(&mut self, other: Self) {
        self.segments = self.segments.saturating_add(other.segments);
        self.pga_samples = self.pga_samples.saturating_add(other.pga_samples);
        self.picks = self.picks.saturating_add(other.picks);
        self.stat_points = self.stat_points.saturating_add(other.stat_points);
    }
}

/// Validated time fields of a waveform packet.
struct PacketTimes {
    start: i64,
    end: i64,
    sample_rate: f64,
}

/// All retained state for one station.
#[derive(Debug, Clone)]
pub struct StationState {
    code: StationCode,
    segments: SegmentBuffer,
    stats: RunningWindowStats,
    picks: PickRegistry,
    pga_history: VecDeque<PgaSample>,
    last_pga: Option<f64>,
    display_scale: f64,
    last_active: i64,
}

impl StationState {
    /// Create an empty station first seen at `now`.
    pub const fn new(code: StationCode, match_epsilon_ms: i64, empty_scale: f64, now: i64) -> Self {
        Self {
            code,
            segments: SegmentBuffer::new(),
            stats: RunningWindowStats::new(),
            picks: PickRegistry::new(match_epsilon_ms),
            pga_history: VecDeque::new(),
            last_pga: None,
            display_scale: empty_scale,
            last_active: now,
        }
    }

    /// Ingest one waveform packet received at `now`.
    ///
    /// A packet starting further before the previous end than the gap
    /// tolerance is rejected as out of order, unless it is more than
    /// `retention_ms` before it, in which case the upstream is taken to
    /// have restarted and the waveform history is reset first.
    pub fn ingest_waveform(
        &mut self,
        packet: &WaveformPacket,
        now: i64,
        retention_ms: i64,
    ) -> Result<WaveformOutcome, IngestError> {
        let times = validate_times(packet)?;
        if packet.waveform.iter().any(|v| !v.is_finite()) {
            return Err(IngestError::NonFinite { field: "waveform" });
        }
        let pga = packet_pga(packet)?;

        let mut restarted = false;
        if let Continuity::Backward { behind_ms } =
            self.segments.continuity(times.start, times.sample_rate)
        {
            if behind_ms <= retention_ms {
                return Err(IngestError::OutOfOrder {
                    station: self.code.clone(),
                    behind_ms,
                });
            }
            self.segments.reset();
            self.stats.clear();
            restarted = true;
        }

        let continuity = self.segments.append(Segment::data(
            times.start,
            times.end,
            times.sample_rate,
            packet.waveform.clone(),
        ));
        self.stats
            .add_point(StatPoint::from_values(now, &packet.waveform));
        self.pga_history.push_back(PgaSample { timestamp: now, pga });
        self.last_pga = Some(pga);
        self.touch(now);

        Ok(match continuity {
            _ if restarted => WaveformOutcome::Restarted,
            Continuity::Gap { .. } => WaveformOutcome::AppendedAfterGap,
            _ => WaveformOutcome::Appended,
        })
    }

    /// Record a pick received at `now`.
    pub fn upsert_pick(&mut self, pick: Pick, now: i64) -> UpsertOutcome {
        self.touch(now);
        self.picks.upsert(pick)
    }

    /// Drop segments, PGA samples, and picks older than `retention_cutoff`
    /// and statistics points older than `statistics_cutoff`.
    pub fn evict(&mut self, retention_cutoff: i64, statistics_cutoff: i64) -> EvictionCounts {
        let segments = self.segments.evict(retention_cutoff);
        let expired_pga = self
            .pga_history
            .partition_point(|sample| sample.timestamp < retention_cutoff);
        self.pga_history.drain(..expired_pga);
        let picks = self.picks.evict(retention_cutoff);
        let stat_points = self.stats.evict(statistics_cutoff);

        EvictionCounts {
            segments,
            pga_samples: expired_pga,
            picks,
            stat_points,
        }
    }

    /// Recompute the display scale from the statistics window.
    ///
    /// With no samples in the window the scale falls back to `empty_scale`
    /// once no segments remain, and otherwise holds its previous value.
    pub fn recompute_scale(&mut self, params: ScaleParams, empty_scale: f64) {
        if let Some(scale) = self.stats.display_scale(params) {
            self.display_scale = scale;
        } else if self.segments.is_empty() {
            self.display_scale = empty_scale;
        }
    }

    /// Snapshot for renderers, with PGA history limited to samples at or
    /// after `pga_cutoff`.
    pub fn display_state(&self, pga_cutoff: i64) -> DisplayState {
        DisplayState {
            station: self.code.clone(),
            segments: self.segments.shared(),
            picks: self.picks.as_slice().to_vec(),
            display_scale: self.display_scale,
            last_pga: self.last_pga,
            pga_history: self
                .pga_history
                .iter()
                .filter(|sample| sample.timestamp >= pga_cutoff)
                .copied()
                .collect(),
            last_end_time: self.segments.last_end_time(),
        }
    }

    /// Maximum PGA since `cutoff` and its intensity class.
    pub fn intensity(&self, cutoff: i64) -> IntensityReading {
        let pga = max_pga_since(&self.pga_history, cutoff);
        IntensityReading {
            station: self.code.clone(),
            pga,
            intensity: classify_pga(pga),
        }
    }

    const fn touch(&mut self, now: i64) {
        if now > self.last_active {
            self.last_active = now;
        }
    }

    /// Station code.
    pub const fn code(&self) -> &StationCode {
        &self.code
    }

    /// Current display scale. Always positive.
    pub const fn display_scale(&self) -> f64 {
        self.display_scale
    }

    /// Latest time anything was ingested for this station (epoch ms).
    pub const fn last_active(&self) -> i64 {
        self.last_active
    }

    /// Retained segments.
    pub const fn segments(&self) -> &SegmentBuffer {
        &self.segments
    }

    /// Statistics window.
    pub const fn stats(&self) -> &RunningWindowStats {
        &self.stats
    }

    /// Retained picks.
    pub const fn picks(&self) -> &PickRegistry {
        &self.picks
    }

    /// Retained PGA samples, oldest first.
    pub fn pga_history(&self) -> impl Iterator<Item = &PgaSample> {
        self.pga_history.iter()
    }
}

/// Check presence, finiteness, and ordering of the packet's time fields.
fn validate_times(packet: &WaveformPacket) -> Result<PacketTimes, IngestError> {
    let startt = packet.startt.ok_or(IngestError::MissingField { field: "startt" })?;
    let endt = packet.endt.ok_or(IngestError::MissingField { field: "endt" })?;
    let sample_rate = packet
        .samprate
        .ok_or(IngestError::MissingField { field: "samprate" })?;

    if !(sample_rate.is_finite() && sample_rate > 0.0) {
        return Err(IngestError::InvalidSampleRate { rate: sample_rate });
    }
    let start = seconds_to_ms(startt).ok_or(IngestError::NonFinite { field: "startt" })?;
    let end = seconds_to_ms(endt).ok_or(IngestError::NonFinite { field: "endt" })?;
    if end < start {
        return Err(IngestError::EndBeforeStart { start, end });
    }
    Ok(PacketTimes {
        start,
        end,
        sample_rate,
    })
}

/// Declared PGA, or the largest absolute sample when absent.
fn packet_pga(packet: &WaveformPacket) -> Result<f64, IngestError> {
    match packet.pga {
        Some(pga) if pga.is_finite() => Ok(pga.abs()),
        Some(_) => Err(IngestError::NonFinite { field: "pga" }),
        None => Ok(packet.waveform.iter().fold(0.0, |max, v| v.abs().max(max))),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use quakestream_types::PickId;

    use super::*;

    const RETENTION: i64 = 120_000;
    const SCALE: ScaleParams = ScaleParams {
        rms_gain: 4.0,
        max_abs_gain: 0.3,
        floor: 0.05,
    };

    fn station() -> StationState {
        StationState::new(StationCode::new("A024"), 100, 1.0, 0)
    }

    fn packet(startt: f64, value: f64) -> WaveformPacket {
        WaveformPacket {
            pga: None,
            startt: Some(startt),
            endt: Some(startt + 0.99),
            samprate: Some(100.0),
            waveform: vec![value; 100],
        }
    }

    fn pick(time: i64, update_seq: i64) -> Pick {
        Pick {
            time,
            id: PickId::new("SM.A024.01.HLZ"),
            channel: "HLZ".to_owned(),
            update_seq,
            latitude: Some(23.5),
            longitude: Some(121.2),
        }
    }

    #[test]
    fn first_packet_appends_and_records_pga() {
        let mut state = station();
        let outcome = state.ingest_waveform(&packet(1000.0, 0.1), 5_000, RETENTION).unwrap();
        assert_eq!(outcome, WaveformOutcome::Appended);
        assert_eq!(state.segments().len(), 1);
        assert_eq!(state.segments().last_end_time(), Some(1_000_990));
        assert_eq!(state.pga_history().count(), 1);
        let display = state.display_state(0);
        assert!((display.last_pga.unwrap() - 0.1).abs() < 1e-12);
        assert_eq!(state.last_active(), 5_000);
    }

    #[test]
    fn declared_pga_wins_over_samples() {
        let mut state = station();
        let mut p = packet(1000.0, 0.1);
        p.pga = Some(42.0);
        state.ingest_waveform(&p, 5_000, RETENTION).unwrap();
        assert!((state.intensity(0).pga - 42.0).abs() < f64::EPSILON);
    }

    #[test]
    fn malformed_packets_are_rejected() {
        let mut state = station();
        let mut missing = packet(1000.0, 0.1);
        missing.samprate = None;
        assert!(matches!(
            state.ingest_waveform(&missing, 0, RETENTION),
            Err(IngestError::MissingField { field: "samprate" })
        ));

        let mut nan = packet(1000.0, 0.1);
        nan.waveform.push(f64::NAN);
        assert!(matches!(
            state.ingest_waveform(&nan, 0, RETENTION),
            Err(IngestError::NonFinite { field: "waveform" })
        ));

        let mut zero_rate = packet(1000.0, 0.1);
        zero_rate.samprate = Some(0.0);
        assert!(matches!(
            state.ingest_waveform(&zero_rate, 0, RETENTION),
            Err(IngestError::InvalidSampleRate { .. })
        ));

        let mut reversed = packet(1000.0, 0.1);
        reversed.endt = Some(999.0);
        assert!(matches!(
            state.ingest_waveform(&reversed, 0, RETENTION),
            Err(IngestError::EndBeforeStart { .. })
        ));

        assert!(state.segments().is_empty());
        assert_eq!(state.pga_history().count(), 0);
    }

    #[test]
    fn backward_packet_is_out_of_order() {
        let mut state = station();
        state.ingest_waveform(&packet(1000.0, 0.1), 0, RETENTION).unwrap();
        state.ingest_waveform(&packet(1001.0, 0.1), 0, RETENTION).unwrap();
        let err = state.ingest_waveform(&packet(1000.5, 0.1), 0, RETENTION).unwrap_err();
        assert!(matches!(err, IngestError::OutOfOrder { behind_ms: 1_490, .. }));
        assert_eq!(state.segments().len(), 2);
    }

    #[test]
    fn far_backward_packet_restarts_history() {
        let mut state = station();
        state.ingest_waveform(&packet(5000.0, 0.1), 0, RETENTION).unwrap();
        let outcome = state.ingest_waveform(&packet(1000.0, 0.2), 10, RETENTION).unwrap();
        assert_eq!(outcome, WaveformOutcome::Restarted);
        assert_eq!(state.segments().len(), 1);
        assert_eq!(state.segments().last_end_time(), Some(1_000_990));
        assert_eq!(state.stats().len(), 1);
    }

    #[test]
    fn scale_tracks_window_then_resets() {
        let mut state = station();
        state.ingest_waveform(&packet(1000.0, 0.1), 1_000, RETENTION).unwrap();
        state.recompute_scale(SCALE, 1.0);
        assert!((state.display_scale() - 0.4).abs() < 1e-9);

        // Statistics window expires but segments remain: scale holds.
        state.evict(0, 20_000);
        state.recompute_scale(SCALE, 1.0);
        assert!((state.display_scale() - 0.4).abs() < 1e-9);

        // Everything expires: back to the empty scale.
        state.evict(2_000_000, 2_000_000);
        state.recompute_scale(SCALE, 1.0);
        assert!((state.display_scale() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn eviction_counts_each_collection() {
        let mut state = station();
        state.ingest_waveform(&packet(1000.0, 0.1), 1_000, RETENTION).unwrap();
        state.upsert_pick(pick(1_000_500, 1), 1_000);
        let counts = state.evict(1_500_000, 1_500_000);
        assert_eq!(
            counts,
            EvictionCounts {
                segments: 1,
                pga_samples: 1,
                picks: 1,
                stat_points: 1
            }
        );
    }

    #[test]
    fn intensity_uses_window_cutoff() {
        let mut state = station();
        let mut strong = packet(1000.0, 0.1);
        strong.pga = Some(100.0);
        state.ingest_waveform(&strong, 1_000, RETENTION).unwrap();
        let mut weak = packet(1001.0, 0.1);
        weak.pga = Some(3.0);
        state.ingest_waveform(&weak, 2_000, RETENTION).unwrap();

        assert_eq!(state.intensity(0).intensity.label(), "5-");
        assert_eq!(state.intensity(1_500).intensity.label(), "2");
        assert_eq!(state.display_state(1_500).pga_history.len(), 1);
    }
}
