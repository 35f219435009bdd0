//! Read API server for the quakestream station engine.
//!
//! This crate provides an Axum HTTP server that exposes:
//!
//! - **REST endpoints** for station display states and intensity
//!   readings (`/api/stations`, `/api/stations/{code}`,
//!   `/api/stations/{code}/intensity`, `/api/health`)
//! - **`WebSocket` endpoints** streaming per-tick intensity readings
//!   (`/ws/intensity`) and snapshots of subscribed stations
//!   (`/ws/stations`) via [`tokio::sync::broadcast`]
//!
//! # Architecture
//!
//! The server reads from an in-memory [`StationBoard`] that only the
//! engine task writes. Each station snapshot is published whole, so
//! reads never observe a half-applied ingest, and the engine never
//! waits on a slow HTTP client.
//!
//! [`StationBoard`]: state::StationBoard

pub mod error;
pub mod handlers;
pub mod router;
pub mod server;
pub mod state;
pub mod subscription;
pub mod ws;

pub use router::build_router;
pub use server::{start_server, ServerConfig, ServerError};
pub use state::{AppState, IntensityBroadcast, StationBoard};
pub use subscription::{StationEvent, StationSubscription};
