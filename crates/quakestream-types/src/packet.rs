//! Inbound packet shapes as published by the transport layer.
//!
//! Wire fields are kept optional so that a packet missing a field can be
//! rejected on its own instead of failing the whole batch. Validation into
//! engine records happens in `quakestream-core`.
//!
//! # Shapes
//!
//! - Waveform batch: map of `NET.STA.LOC.CHA` key to
//!   `{pga, startt, endt, samprate, waveform}` (times in epoch seconds).
//! - Pick packet: `{station, channel, pick_time, pickid, update_sec, lat, lon}`
//!   where `pick_time` and the numeric fields may arrive as strings.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ids::StationCode;

/// Minimum column count of a text pick message.
const PICK_MESSAGE_COLUMNS: usize = 14;

/// Errors raised while decoding packets off the wire.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PacketError {
    /// The packet key or station field does not name a station.
    #[error("missing station code in {key:?}")]
    MissingStation {
        /// The key or field value that was inspected.
        key: String,
    },

    /// A batch entry could not be decoded into the packet shape.
    #[error("undecodable packet {key:?}: {reason}")]
    Undecodable {
        /// The batch key of the entry.
        key: String,
        /// Decoder message.
        reason: String,
    },

    /// A text pick message is a ring restart notice.
    #[error("pick ring restart notice")]
    RestartNotice,

    /// A text pick message has too few columns.
    #[error("pick message has {found} columns, expected at least {expected}")]
    ShortMessage {
        /// Columns present.
        found: usize,
        /// Columns required.
        expected: usize,
    },
}

// ---------------------------------------------------------------------------
// Loose numbers
// ---------------------------------------------------------------------------

/// A numeric field that may arrive as a JSON number or a string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LooseNumber {
    /// A JSON number.
    Number(f64),
    /// A string, usually holding digits.
    Text(String),
}

impl LooseNumber {
    /// Interpret the value as a float, if it holds one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(value) => Some(*value),
            Self::Text(text) => text.trim().parse().ok(),
        }
    }

    /// Interpret the value as an integer, truncating any fraction.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Text(text) if text.trim().parse::<i64>().is_ok() => text.trim().parse().ok(),
            _ => self.as_f64().filter(|value| value.is_finite()).map(|value| {
                // Saturating float-to-int conversion.
                #[allow(clippy::cast_possible_truncation)]
                let truncated = value.trunc() as i64;
                truncated
            }),
        }
    }
}

impl From<f64> for LooseNumber {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for LooseNumber {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Waveform packets
// ---------------------------------------------------------------------------

/// One waveform packet for a single station channel.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WaveformPacket {
    /// Peak ground acceleration of this packet. Derived from the samples
    /// when absent.
    #[serde(default)]
    pub pga: Option<f64>,
    /// Time of the first sample (epoch seconds).
    #[serde(default)]
    pub startt: Option<f64>,
    /// Time of the last sample (epoch seconds).
    #[serde(default)]
    pub endt: Option<f64>,
    /// Sampling rate in Hz.
    #[serde(default)]
    pub samprate: Option<f64>,
    /// Sample values.
    #[serde(default)]
    pub waveform: Vec<f64>,
}

/// A batch of waveform packets keyed by `NET.STA.LOC.CHA`.
pub type WaveformBatch = BTreeMap<String, WaveformPacket>;

/// Decode a waveform batch entry by entry.
///
/// Entries that fail to decode are returned as [`PacketError::Undecodable`]
/// next to the decoded ones so a single bad entry never discards its
/// neighbours. A `value` that is not a JSON object yields one error.
pub fn decode_waveform_batch(
    value: serde_json::Value,
) -> (WaveformBatch, Vec<PacketError>) {
    let mut batch = WaveformBatch::new();
    let mut errors = Vec::new();

    let serde_json::Value::Object(entries) = value else {
        errors.push(PacketError::Undecodable {
            key: String::new(),
            reason: "waveform batch is not an object".to_owned(),
        });
        return (batch, errors);
    };

    for (key, entry) in entries {
        match serde_json::from_value::<WaveformPacket>(entry) {
            Ok(packet) => {
                batch.insert(key, packet);
            }
            Err(e) => errors.push(PacketError::Undecodable {
                key,
                reason: e.to_string(),
            }),
        }
    }

    (batch, errors)
}

/// Extract the bare station code from a channel key.
///
/// `SM.A024.01.HLZ` and `SM.A024` yield `A024`; a key without dots is
/// taken as the station code itself.
///
/// # Errors
///
/// Returns [`PacketError::MissingStation`] if the station part is empty.
pub fn station_code_from_key(key: &str) -> Result<StationCode, PacketError> {
    let mut parts = key.split('.');
    let first = parts.next().unwrap_or_default();
    let code = parts.next().unwrap_or(first).trim();
    if code.is_empty() {
        return Err(PacketError::MissingStation {
            key: key.to_owned(),
        });
    }
    Ok(StationCode::new(code))
}

/// Extract the channel code (fourth part) from a channel key, if present.
pub fn channel_from_key(key: &str) -> Option<&str> {
    key.split('.').nth(3).map(str::trim).filter(|c| !c.is_empty())
}

// ---------------------------------------------------------------------------
// Pick packets
// ---------------------------------------------------------------------------

/// One pick publication. The same detection is republished with an
/// increasing `update_sec`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PickPacket {
    /// Station code (bare or as a channel key).
    #[serde(default)]
    pub station: Option<String>,
    /// Channel code.
    #[serde(default)]
    pub channel: Option<String>,
    /// Arrival time, epoch seconds or compact calendar string.
    #[serde(default)]
    pub pick_time: Option<LooseNumber>,
    /// Upstream identity.
    #[serde(default)]
    pub pickid: Option<String>,
    /// Seconds elapsed since the pick; the republish counter.
    #[serde(default)]
    pub update_sec: Option<LooseNumber>,
    /// Station latitude.
    #[serde(default)]
    pub lat: Option<LooseNumber>,
    /// Station longitude.
    #[serde(default)]
    pub lon: Option<LooseNumber>,
}

impl PickPacket {
    /// Decode a whitespace-separated pick ring message.
    ///
    /// Column order: station, channel, network, location, lon, lat, pga,
    /// pgv, pd, tc, `pick_time`, weight, instrument, `update_sec`. The pick
    /// id is the `NET.STA.LOC.CHA` composite.
    ///
    /// # Errors
    ///
    /// Returns [`PacketError::RestartNotice`] for ring restart lines and
    /// [`PacketError::ShortMessage`] for lines with too few columns.
    pub fn from_ring_message(line: &str) -> Result<Self, PacketError> {
        if line.contains("Restarting") {
            return Err(PacketError::RestartNotice);
        }
        let columns: Vec<&str> = line.split_whitespace().collect();
        let [
            station,
            channel,
            network,
            location,
            lon,
            lat,
            _pga,
            _pgv,
            _pd,
            _tc,
            pick_time,
            _weight,
            _instrument,
            update_sec,
            ..,
        ] = columns.as_slice()
        else {
            return Err(PacketError::ShortMessage {
                found: columns.len(),
                expected: PICK_MESSAGE_COLUMNS,
            });
        };

        Ok(Self {
            station: Some((*station).to_owned()),
            channel: Some((*channel).to_owned()),
            pick_time: Some(LooseNumber::from(*pick_time)),
            pickid: Some(format!("{network}.{station}.{location}.{channel}")),
            update_sec: Some(LooseNumber::from(*update_sec)),
            lat: Some(LooseNumber::from(*lat)),
            lon: Some(LooseNumber::from(*lon)),
        })
    }
}
