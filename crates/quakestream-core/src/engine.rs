//! Ingestion engine: the single writer of every station state.
//!
//! The engine routes waveform and pick packets to their station, runs the
//! periodic eviction tick, and serves read-only snapshots. Every operation
//! takes "now" (epoch ms) as an argument, so a sequence of calls is fully
//! deterministic given its inputs:
//!
//! 1. **Ingest waveforms** -- filter by channel component, validate, detect
//!    gaps, append, record PGA, and feed the statistics window.
//! 2. **Ingest picks** -- parse the arrival time, drop stale picks, and
//!    upsert into the station's pick registry.
//! 3. **Tick** -- evict expired data, recompute display scales, and apply
//!    the whole-station idle and capacity policies.
//!
//! Malformed items are dropped one at a time and counted in an
//! [`IngestReport`]; a batch never aborts.

use std::collections::BTreeSet;

use quakestream_types::{
    channel_from_key, parse_pick_time, station_code_from_key, DisplayState, IntensityReading,
    LooseNumber, PacketError, Pick, PickId, PickPacket, PickTimeError, StationCode, WaveformBatch,
    WaveformPacket,
};
use tracing::{debug, info};

use crate::config::{DisplayScaleConfig, EngineConfig, QuakeConfig};
use crate::picks::UpsertOutcome;
use crate::station::{EvictionCounts, StationState, WaveformOutcome};
use crate::store::StationStore;
use crate::window_stats::ScaleParams;

/// Reasons a single packet is dropped.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum IngestError {
    /// The packet key or station field could not be decoded.
    #[error("packet error: {source}")]
    Packet {
        /// The underlying packet error.
        #[from]
        source: PacketError,
    },

    /// A required field is absent.
    #[error("missing field {field}")]
    MissingField {
        /// Wire name of the field.
        field: &'static str,
    },

    /// A numeric field holds NaN or infinity.
    #[error("non-finite value in {field}")]
    NonFinite {
        /// Wire name of the field.
        field: &'static str,
    },

    /// The sampling rate is not a positive number.
    #[error("invalid sample rate {rate}")]
    InvalidSampleRate {
        /// The rate as received.
        rate: f64,
    },

    /// The packet ends before it starts.
    #[error("end time {end} is before start time {start}")]
    EndBeforeStart {
        /// Start time (epoch ms).
        start: i64,
        /// End time (epoch ms).
        end: i64,
    },

    /// The packet starts before the previous packet of the station ended.
    #[error("out-of-order packet for {station}: starts {behind_ms} ms before the previous end")]
    OutOfOrder {
        /// The station the packet belongs to.
        station: StationCode,
        /// How far before the previous end the packet starts (ms).
        behind_ms: i64,
    },

    /// The pick time could not be parsed.
    #[error("pick time error: {source}")]
    PickTime {
        /// The underlying parse error.
        #[from]
        source: PickTimeError,
    },

    /// The pick is already older than the retention window.
    #[error("pick at {time} is older than retention cutoff {cutoff}")]
    StalePick {
        /// Pick time (epoch ms).
        time: i64,
        /// Retention cutoff at ingestion (epoch ms).
        cutoff: i64,
    },
}

/// Per-batch ingestion counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    /// Items applied to a station.
    pub accepted: usize,
    /// Malformed, out-of-order, or stale items.
    pub dropped: usize,
    /// Items skipped on purpose: other channel components and pick
    /// republishes that did not supersede anything.
    pub filtered: usize,
}

impl IngestReport {
    /// Fold another report into this one.
    pub const fn merge(&mut self, other: Self) {
        self.accepted = self.accepted.saturating_add(other.accepted);
        self.dropped = self.dropped.saturating_add(other.dropped);
        self.filtered = self.filtered.saturating_add(other.filtered);
    }

    /// Total items seen.
    pub const fn total(&self) -> usize {
        self.accepted
            .saturating_add(self.dropped)
            .saturating_add(self.filtered)
    }
}

/// Summary of a single tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickSummary {
    /// The time the tick evicted against (epoch ms).
    pub now: i64,
    /// Stations remaining after the tick.
    pub stations: usize,
    /// Items evicted across all stations.
    pub evicted: EvictionCounts,
    /// Stations removed by the idle or capacity policy.
    pub removed_stations: Vec<StationCode>,
}

/// The station-state engine.
#[derive(Debug, Clone)]
pub struct IngestionEngine {
    config: EngineConfig,
    scale: DisplayScaleConfig,
    store: StationStore,
    dirty: BTreeSet<StationCode>,
    last_tick: Option<i64>,
}

impl IngestionEngine {
    /// Create an engine with no stations.
    pub const fn new(config: EngineConfig, scale: DisplayScaleConfig) -> Self {
        Self {
            config,
            scale,
            store: StationStore::new(),
            dirty: BTreeSet::new(),
            last_tick: None,
        }
    }

    /// Create an engine from the top-level configuration.
    pub fn from_config(config: &QuakeConfig) -> Self {
        Self::new(config.engine.clone(), config.display_scale.clone())
    }

    // -----------------------------------------------------------------------
    // Waveforms
    // -----------------------------------------------------------------------

    /// Ingest a batch of waveform packets received at `now`.
    pub fn ingest_waveforms(&mut self, batch: &WaveformBatch, now: i64) -> IngestReport {
        let mut report = IngestReport::default();
        for (key, packet) in batch {
            if !self.accepts_channel(key) {
                report.filtered = report.filtered.saturating_add(1);
                continue;
            }
            match self.ingest_waveform(key, packet, now) {
                Ok(WaveformOutcome::Restarted) => {
                    info!(key = %key, "Waveform history reset after upstream restart");
                    report.accepted = report.accepted.saturating_add(1);
                }
                Ok(_) => report.accepted = report.accepted.saturating_add(1),
                Err(e) => {
                    debug!(key = %key, error = %e, "Dropped waveform packet");
                    report.dropped = report.dropped.saturating_add(1);
                }
            }
        }
        debug!(
            accepted = report.accepted,
            dropped = report.dropped,
            filtered = report.filtered,
            "Waveform batch ingested"
        );
        report
    }

    /// Ingest historical waveform batches in order, all at `now`.
    pub fn ingest_waveform_history(&mut self, batches: &[WaveformBatch], now: i64) -> IngestReport {
        let mut report = IngestReport::default();
        for batch in batches {
            report.merge(self.ingest_waveforms(batch, now));
        }
        info!(
            batches = batches.len(),
            accepted = report.accepted,
            dropped = report.dropped,
            "Waveform history ingested"
        );
        report
    }

    /// Whether a waveform key's channel feeds the segment buffer.
    ///
    /// Keys without a channel part are always accepted.
    pub fn accepts_channel(&self, key: &str) -> bool {
        let Some(component) = self.config.vertical_component else {
            return true;
        };
        channel_from_key(key).is_none_or(|channel| channel.ends_with(component))
    }

    fn ingest_waveform(
        &mut self,
        key: &str,
        packet: &WaveformPacket,
        now: i64,
    ) -> Result<WaveformOutcome, IngestError> {
        let code = station_code_from_key(key)?;
        let retention = self.config.retention_window_ms;
        let existed = self.store.get(code.as_str()).is_some();

        let state = self.station_mut(&code, now);
        match state.ingest_waveform(packet, now, retention) {
            Ok(outcome) => {
                self.dirty.insert(code);
                Ok(outcome)
            }
            Err(e) => {
                if !existed {
                    self.store.remove(code.as_str());
                }
                Err(e)
            }
        }
    }

    // -----------------------------------------------------------------------
    // Picks
    // -----------------------------------------------------------------------

    /// Ingest a batch of pick packets received at `now`.
    pub fn ingest_picks(&mut self, picks: &[PickPacket], now: i64) -> IngestReport {
        let mut report = IngestReport::default();
        for packet in picks {
            match self.ingest_pick(packet, now) {
                Ok(UpsertOutcome::Inserted | UpsertOutcome::Superseded) => {
                    report.accepted = report.accepted.saturating_add(1);
                }
                Ok(UpsertOutcome::Ignored) => {
                    report.filtered = report.filtered.saturating_add(1);
                }
                Err(e) => {
                    debug!(station = ?packet.station, error = %e, "Dropped pick packet");
                    report.dropped = report.dropped.saturating_add(1);
                }
            }
        }
        debug!(
            accepted = report.accepted,
            dropped = report.dropped,
            filtered = report.filtered,
            "Pick batch ingested"
        );
        report
    }

    /// Ingest historical pick batches in order, all at `now`.
    pub fn ingest_pick_history(&mut self, batches: &[Vec<PickPacket>], now: i64) -> IngestReport {
        let mut report = IngestReport::default();
        for batch in batches {
            report.merge(self.ingest_picks(batch, now));
        }
        info!(
            batches = batches.len(),
            accepted = report.accepted,
            dropped = report.dropped,
            "Pick history ingested"
        );
        report
    }

    fn ingest_pick(&mut self, packet: &PickPacket, now: i64) -> Result<UpsertOutcome, IngestError> {
        let raw_station = packet
            .station
            .as_deref()
            .ok_or(IngestError::MissingField { field: "station" })?;
        let code = station_code_from_key(raw_station)?;
        let channel = packet
            .channel
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .or_else(|| channel_from_key(raw_station))
            .unwrap_or_default()
            .to_owned();

        let raw_time = packet
            .pick_time
            .as_ref()
            .ok_or(IngestError::MissingField { field: "pick_time" })?;
        let time = parse_pick_time(raw_time)?;
        let cutoff = now.saturating_sub(self.config.retention_window_ms);
        if time < cutoff {
            return Err(IngestError::StalePick { time, cutoff });
        }

        let id = packet
            .pickid
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map_or_else(|| PickId::new(format!("{code}.{channel}")), PickId::new);
        let pick = Pick {
            time,
            id,
            channel,
            update_seq: packet
                .update_sec
                .as_ref()
                .and_then(LooseNumber::as_i64)
                .unwrap_or(0),
            latitude: finite(packet.lat.as_ref()),
            longitude: finite(packet.lon.as_ref()),
        };

        let outcome = self.station_mut(&code, now).upsert_pick(pick, now);
        if outcome != UpsertOutcome::Ignored {
            self.dirty.insert(code);
        }
        Ok(outcome)
    }

    fn station_mut(&mut self, code: &StationCode, now: i64) -> &mut StationState {
        let epsilon = self.config.pick_match_epsilon_ms;
        let empty_scale = self.scale.empty_scale;
        self.store.get_or_insert_with(code, || {
            debug!(station = %code, "New station");
            StationState::new(code.clone(), epsilon, empty_scale, now)
        })
    }

    // -----------------------------------------------------------------------
    // Tick
    // -----------------------------------------------------------------------

    /// Evict expired data against `now` and recompute display scales.
    ///
    /// Running the tick twice with the same `now` and nothing ingested in
    /// between leaves the state unchanged after the first run.
    pub fn tick(&mut self, now: i64) -> TickSummary {
        let retention_cutoff = now.saturating_sub(self.config.retention_window_ms);
        let statistics_cutoff = now.saturating_sub(self.config.statistics_window_ms);
        let params = ScaleParams::from(&self.scale);
        let empty_scale = self.scale.empty_scale;

        let mut evicted = EvictionCounts::default();
        for state in self.store.iter_mut() {
            evicted.add(state.evict(retention_cutoff, statistics_cutoff));
            state.recompute_scale(params, empty_scale);
        }

        let mut removed_stations = Vec::new();
        if let Some(timeout) = self.config.station_idle_timeout_ms {
            removed_stations.extend(self.store.remove_idle(now, timeout));
        }
        if let Some(max_stations) = self.config.max_stations {
            removed_stations.extend(self.store.enforce_capacity(max_stations));
        }
        for code in &removed_stations {
            self.dirty.remove(code);
        }
        if !removed_stations.is_empty() {
            info!(
                removed = removed_stations.len(),
                remaining = self.store.len(),
                "Stations evicted"
            );
        }

        self.last_tick = Some(now);
        debug!(
            now,
            stations = self.store.len(),
            segments = evicted.segments,
            picks = evicted.picks,
            pga_samples = evicted.pga_samples,
            "Tick complete"
        );

        TickSummary {
            now,
            stations: self.store.len(),
            evicted,
            removed_stations,
        }
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Display state of one station, with PGA history limited to the last
    /// `pga_window_ms` (the retention window when `None`).
    pub fn display_state(
        &self,
        code: &str,
        now: i64,
        pga_window_ms: Option<i64>,
    ) -> Option<DisplayState> {
        let cutoff = self.window_cutoff(now, pga_window_ms);
        self.store.get(code).map(|state| state.display_state(cutoff))
    }

    /// Display states of every station.
    pub fn display_states(&self, now: i64) -> Vec<DisplayState> {
        let cutoff = self.window_cutoff(now, None);
        self.store
            .iter()
            .map(|state| state.display_state(cutoff))
            .collect()
    }

    /// Maximum PGA and intensity class of one station over the last
    /// `window_ms` (the retention window when `None`).
    pub fn intensity(
        &self,
        code: &str,
        now: i64,
        window_ms: Option<i64>,
    ) -> Option<IntensityReading> {
        let cutoff = self.window_cutoff(now, window_ms);
        self.store.get(code).map(|state| state.intensity(cutoff))
    }

    /// Intensity readings of every station.
    pub fn intensities(&self, now: i64, window_ms: Option<i64>) -> Vec<IntensityReading> {
        let cutoff = self.window_cutoff(now, window_ms);
        self.store
            .iter()
            .map(|state| state.intensity(cutoff))
            .collect()
    }

    /// Take the set of stations changed by ingestion since the last call.
    pub fn take_dirty(&mut self) -> Vec<StationCode> {
        std::mem::take(&mut self.dirty).into_iter().collect()
    }

    /// Read access to a station's full state.
    pub fn station(&self, code: &str) -> Option<&StationState> {
        self.store.get(code)
    }

    /// Station codes in order.
    pub fn station_codes(&self) -> Vec<StationCode> {
        self.store.codes().cloned().collect()
    }

    /// Number of stations.
    pub fn station_count(&self) -> usize {
        self.store.len()
    }

    /// Time of the most recent tick (epoch ms).
    pub const fn last_tick(&self) -> Option<i64> {
        self.last_tick
    }

    /// Engine settings.
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Cutoff for a read window, clamped to the retention window.
    fn window_cutoff(&self, now: i64, window_ms: Option<i64>) -> i64 {
        let retention = self.config.retention_window_ms;
        let window = window_ms.map_or(retention, |w| w.clamp(0, retention));
        now.saturating_sub(window)
    }
}

/// A loose numeric field as a finite float.
fn finite(value: Option<&LooseNumber>) -> Option<f64> {
    value
        .and_then(LooseNumber::as_f64)
        .filter(|v| v.is_finite())
}
