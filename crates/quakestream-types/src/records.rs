//! Per-station records held by the engine and served to renderers.
//!
//! All timestamps are epoch milliseconds (`i64`). Sample values and PGA
//! are `f64` in the physical unit of the feed (gal for PGA).

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::enums::IntensityClass;
use crate::ids::{PickId, StationCode};

// ---------------------------------------------------------------------------
// Waveform segments
// ---------------------------------------------------------------------------

/// A contiguous run of waveform samples, or a gap marker.
///
/// A gap segment has no values and spans the discontinuity between the
/// previous segment's end and the next segment's start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Segment {
    /// Time of the first sample (epoch ms).
    pub start_time: i64,
    /// Time of the last sample (epoch ms). Never before `start_time`.
    pub end_time: i64,
    /// Sampling rate in Hz.
    pub sample_rate: f64,
    /// Sample values in time order. Empty for gaps.
    pub values: Vec<f64>,
    /// Whether this segment marks a discontinuity.
    pub is_gap: bool,
}

impl Segment {
    /// Build a data segment.
    pub const fn data(start_time: i64, end_time: i64, sample_rate: f64, values: Vec<f64>) -> Self {
        Self {
            start_time,
            end_time,
            sample_rate,
            values,
            is_gap: false,
        }
    }

    /// Build a value-less gap marker spanning `[start_time, end_time]`.
    pub const fn gap(start_time: i64, end_time: i64, sample_rate: f64) -> Self {
        Self {
            start_time,
            end_time,
            sample_rate,
            values: Vec::new(),
            is_gap: true,
        }
    }

    /// Number of samples carried by this segment.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the segment carries no samples.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

// ---------------------------------------------------------------------------
// PGA history
// ---------------------------------------------------------------------------

/// One peak-ground-acceleration observation, recorded per ingested packet.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct PgaSample {
    /// Local ingestion time (epoch ms).
    pub timestamp: i64,
    /// Peak ground acceleration, never negative.
    pub pga: f64,
}

// ---------------------------------------------------------------------------
// Picks
// ---------------------------------------------------------------------------

/// A P-wave arrival marker for one station channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Pick {
    /// Arrival time (epoch ms).
    pub time: i64,
    /// Upstream identity, display only.
    pub id: PickId,
    /// Channel code the arrival was detected on.
    pub channel: String,
    /// Republish counter; higher values supersede lower ones.
    pub update_seq: i64,
    /// Station latitude, when published.
    pub latitude: Option<f64>,
    /// Station longitude, when published.
    pub longitude: Option<f64>,
}

// ---------------------------------------------------------------------------
// Read models
// ---------------------------------------------------------------------------

/// Everything a renderer needs to draw one station.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct DisplayState {
    /// The station this state belongs to.
    pub station: StationCode,
    /// Retained waveform segments, oldest first, gaps included.
    pub segments: Vec<Arc<Segment>>,
    /// Retained picks, sorted by time.
    pub picks: Vec<Pick>,
    /// Amplitude that maps to full trace height. Always positive.
    pub display_scale: f64,
    /// PGA of the most recent packet.
    pub last_pga: Option<f64>,
    /// PGA samples inside the requested window, oldest first.
    pub pga_history: Vec<PgaSample>,
    /// Declared end time of the most recent packet (epoch ms).
    pub last_end_time: Option<i64>,
}

/// Peak acceleration and intensity class for map-style consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct IntensityReading {
    /// The station this reading belongs to.
    pub station: StationCode,
    /// Maximum PGA within the window (0 when the window is empty).
    pub pga: f64,
    /// Intensity class for `pga`.
    pub intensity: IntensityClass,
}
