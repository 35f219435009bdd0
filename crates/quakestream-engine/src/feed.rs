//! Newline-delimited JSON feed adapter.
//!
//! Each input line is an envelope `{"event": ..., "data": ...}`:
//!
//! | `event` | `data` |
//! |---------|--------|
//! | `wave_packet` | object of channel key to waveform packet |
//! | `wave_history` | array of such objects, oldest first |
//! | `pick_packet` | one pick packet or an array of them |
//! | `pick_history` | array of pick packet arrays, oldest first |
//! | `pick_message` | one text pick ring message |
//!
//! Undecodable lines are logged and skipped; blank lines are ignored.

use quakestream_core::runner::{EngineCommand, EngineHandle};
use quakestream_types::{decode_waveform_batch, PacketError, PickPacket, WaveformBatch};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tracing::{debug, info, warn};

use crate::error::EngineError;

/// Errors raised while decoding one feed line.
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    /// The line is not a JSON envelope.
    #[error("malformed envelope: {source}")]
    Envelope {
        /// The underlying JSON error.
        #[from]
        source: serde_json::Error,
    },

    /// The envelope names an event this adapter does not handle.
    #[error("unknown event {event:?}")]
    UnknownEvent {
        /// The event name.
        event: String,
    },

    /// The payload does not have the shape its event requires.
    #[error("bad {event} payload: {reason}")]
    Payload {
        /// The event name.
        event: &'static str,
        /// What was wrong.
        reason: String,
    },

    /// A text pick message could not be decoded.
    #[error("pick message rejected: {source}")]
    PickMessage {
        /// The underlying packet error.
        #[from]
        source: PacketError,
    },
}

#[derive(Debug, serde::Deserialize)]
struct Envelope {
    event: String,
    #[serde(default)]
    data: Value,
}

/// Line counts for a finished feed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeedSummary {
    /// Non-blank lines read.
    pub lines: u64,
    /// Commands handed to the engine.
    pub commands: u64,
    /// Lines that failed to decode.
    pub rejected: u64,
}

/// Decode one feed line into an engine command.
///
/// Returns `Ok(None)` for blank lines.
///
/// # Errors
///
/// Returns a [`FeedError`] describing why the line was rejected.
pub fn decode_line(line: &str) -> Result<Option<EngineCommand>, FeedError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let envelope: Envelope = serde_json::from_str(line)?;

    let command = match envelope.event.as_str() {
        "wave_packet" => EngineCommand::Waveforms(waveform_batch(envelope.data)),
        "wave_history" => {
            let Value::Array(batches) = envelope.data else {
                return Err(payload("wave_history", "expected an array of batches"));
            };
            EngineCommand::WaveformHistory(batches.into_iter().map(waveform_batch).collect())
        }
        "pick_packet" => EngineCommand::Picks(pick_list("pick_packet", envelope.data)?),
        "pick_history" => {
            let Value::Array(batches) = envelope.data else {
                return Err(payload("pick_history", "expected an array of pick arrays"));
            };
            let batches = batches
                .into_iter()
                .map(|batch| pick_list("pick_history", batch))
                .collect::<Result<Vec<_>, _>>()?;
            EngineCommand::PickHistory(batches)
        }
        "pick_message" => {
            let Value::String(text) = envelope.data else {
                return Err(payload("pick_message", "expected a string"));
            };
            EngineCommand::Picks(vec![PickPacket::from_ring_message(&text)?])
        }
        other => {
            return Err(FeedError::UnknownEvent {
                event: other.to_owned(),
            });
        }
    };
    Ok(Some(command))
}

fn payload(event: &'static str, reason: &str) -> FeedError {
    FeedError::Payload {
        event,
        reason: reason.to_owned(),
    }
}

/// Decode a waveform batch, logging the entries that fail.
fn waveform_batch(data: Value) -> WaveformBatch {
    let (batch, errors) = decode_waveform_batch(data);
    for error in &errors {
        debug!(%error, "Waveform entry dropped");
    }
    batch
}

fn pick_list(event: &'static str, data: Value) -> Result<Vec<PickPacket>, FeedError> {
    let picks = match data {
        Value::Array(_) => serde_json::from_value(data),
        other => serde_json::from_value(other).map(|pick| vec![pick]),
    };
    picks.map_err(|e| payload(event, &e.to_string()))
}

/// Read feed lines from `input` until end of input, forwarding each
/// decoded command to the engine.
///
/// # Errors
///
/// Returns [`EngineError::Io`] if reading fails and
/// [`EngineError::Runner`] if the engine task has stopped.
pub async fn run_feed(
    input: impl AsyncRead + Unpin,
    handle: &EngineHandle,
) -> Result<FeedSummary, EngineError> {
    let mut lines = BufReader::new(input).lines();
    let mut summary = FeedSummary::default();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        summary.lines = summary.lines.saturating_add(1);
        match decode_line(&line) {
            Ok(Some(command)) => {
                if let Err(error) = handle.send(command).await {
                    warn!(%error, "Engine stopped before the feed ended");
                    return Err(error.into());
                }
                summary.commands = summary.commands.saturating_add(1);
            }
            Ok(None) => {}
            Err(error) => {
                warn!(line = summary.lines, %error, "Feed line skipped");
                summary.rejected = summary.rejected.saturating_add(1);
            }
        }
    }

    info!(
        lines = summary.lines,
        commands = summary.commands,
        rejected = summary.rejected,
        "Feed reached end of input"
    );
    Ok(summary)
}
