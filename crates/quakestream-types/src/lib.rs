//! Shared type definitions for the quakestream station engine.
//!
//! This crate is the single source of truth for the records that cross
//! crate boundaries: inbound packet shapes, the per-station records the
//! engine retains, and the read models served to renderers. Read-model
//! types flow to `TypeScript` via `ts-rs` for display clients.
//!
//! # Modules
//!
//! - [`ids`] -- Station code and pick id newtypes
//! - [`enums`] -- The intensity class scale
//! - [`records`] -- Segments, PGA samples, picks, and read models
//! - [`packet`] -- Wire shapes for waveform and pick packets
//! - [`pick_time`] -- Arrival-time parsing (epoch seconds or calendar string)

pub mod enums;
pub mod ids;
pub mod packet;
pub mod pick_time;
pub mod records;

// Re-export all public types at crate root for convenience.
pub use enums::IntensityClass;
pub use ids::{PickId, StationCode};
pub use packet::{
    channel_from_key, decode_waveform_batch, station_code_from_key, LooseNumber, PacketError,
    PickPacket, WaveformBatch, WaveformPacket,
};
pub use pick_time::{parse_pick_time, PickTimeError, EPOCH_SECONDS_LIMIT};
pub use records::{DisplayState, IntensityReading, PgaSample, Pick, Segment};
