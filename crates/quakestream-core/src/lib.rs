//! Streaming station-state engine for the quakestream seismic monitor.
//!
//! This crate keeps a bounded, query-ready state per seismic station:
//! a retained window of waveform segments with gap markers, a running
//! amplitude estimate for display auto-scaling, deduplicated pick markers,
//! and recent PGA history. It also provides the pure time-to-coordinate
//! and downsampling functions renderers use.
//!
//! # Modules
//!
//! - [`clock`] -- Engine time source and seconds-to-millisecond conversion.
//! - [`config`] -- Configuration loading from `quakestream-config.yaml`
//!   into strongly-typed structs.
//! - [`downsample`] -- Adaptive sample stride for drawing.
//! - [`engine`] -- [`IngestionEngine`]: ingestion, tick, and reads.
//! - [`intensity`] -- PGA to intensity class step function.
//! - [`picks`] -- Pick registry with republish supersession.
//! - [`runner`] -- Async loop owning the engine behind a bounded inbox.
//! - [`segments`] -- Segment buffer with gap detection.
//! - [`station`] -- Per-station aggregate.
//! - [`store`] -- Keyed map of stations with idle and capacity eviction.
//! - [`timeline`] -- Pixel and wrapped-longitude coordinate mapping.
//! - [`window_stats`] -- Running window statistics for display scaling.
//!
//! [`IngestionEngine`]: engine::IngestionEngine

pub mod clock;
pub mod config;
pub mod downsample;
pub mod engine;
pub mod intensity;
pub mod picks;
pub mod runner;
pub mod segments;
pub mod station;
pub mod store;
pub mod timeline;
pub mod window_stats;
