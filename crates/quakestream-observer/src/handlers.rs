//! REST API endpoint handlers for the read API server.
//!
//! All handlers read from the in-memory [`StationBoard`] via the shared
//! [`AppState`]. Windows are measured back from the board's `as_of`
//! time, the engine time of the latest publication.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/api/health` | Station count and last tick |
//! | `GET` | `/api/stations` | Intensity reading for every station |
//! | `GET` | `/api/stations/{code}` | Display state of one station |
//! | `GET` | `/api/stations/{code}/intensity` | Intensity reading of one station |
//!
//! [`StationBoard`]: crate::state::StationBoard

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use quakestream_types::{DisplayState, IntensityReading};

use crate::error::ObserverError;
use crate::state::{reading_for, AppState};

// ---------------------------------------------------------------------------
// Query parameter structs
// ---------------------------------------------------------------------------

/// Query parameters for `GET /api/stations/{code}`.
#[derive(Debug, Default, serde::Deserialize)]
pub struct StationQuery {
    /// Only keep PGA samples from this many milliseconds back.
    pub pga_window_ms: Option<String>,
}

/// Query parameters for the intensity endpoints.
#[derive(Debug, Default, serde::Deserialize)]
pub struct IntensityQuery {
    /// Max-PGA window in milliseconds (defaults to the retention window).
    pub window_ms: Option<String>,
}

/// Response body for `GET /api/health`.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct HealthResponse {
    /// Always `"ok"` while the server runs.
    pub status: String,
    /// Stations on the board.
    pub stations: usize,
    /// Engine time of the latest publication.
    pub as_of: Option<i64>,
    /// Engine time of the latest tick.
    pub last_tick: Option<i64>,
}

/// Parse a window parameter and clamp it to the retention window.
///
/// An absent parameter means the whole retention window.
fn resolve_window(raw: Option<&str>, retention_ms: i64) -> Result<i64, ObserverError> {
    let Some(raw) = raw else {
        return Ok(retention_ms);
    };
    let window: i64 = raw.trim().parse().map_err(|e| {
        ObserverError::InvalidQuery(format!("window '{raw}' is not an integer: {e}"))
    })?;
    if window <= 0 {
        return Err(ObserverError::InvalidQuery(format!(
            "window must be positive, got {window}"
        )));
    }
    Ok(window.min(retention_ms))
}

// ---------------------------------------------------------------------------
// GET /api/health
// ---------------------------------------------------------------------------

/// Report how many stations are on the board and when it last changed.
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let board = state.board.read().await;
    Json(HealthResponse {
        status: String::from("ok"),
        stations: board.stations.len(),
        as_of: board.as_of,
        last_tick: board.last_tick,
    })
}

// ---------------------------------------------------------------------------
// GET /api/stations
// ---------------------------------------------------------------------------

/// List the intensity reading of every station, ordered by code.
pub async fn list_stations(
    State(state): State<Arc<AppState>>,
    Query(params): Query<IntensityQuery>,
) -> Result<Json<Vec<IntensityReading>>, ObserverError> {
    let window = resolve_window(params.window_ms.as_deref(), state.retention_window_ms)?;
    let board = state.board.read().await;
    let Some(as_of) = board.as_of else {
        return Ok(Json(Vec::new()));
    };
    let cutoff = as_of.saturating_sub(window);
    let readings = board
        .stations
        .values()
        .map(|snapshot| reading_for(snapshot, cutoff))
        .collect();
    Ok(Json(readings))
}

// ---------------------------------------------------------------------------
// GET /api/stations/{code}
// ---------------------------------------------------------------------------

/// Get the display state of one station.
///
/// With `pga_window_ms`, the returned `pga_history` only holds samples
/// inside that window.
pub async fn get_station(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
    Query(params): Query<StationQuery>,
) -> Result<Json<DisplayState>, ObserverError> {
    let window = params
        .pga_window_ms
        .as_deref()
        .map(|raw| resolve_window(Some(raw), state.retention_window_ms))
        .transpose()?;

    let (snapshot, as_of) = {
        let board = state.board.read().await;
        let snapshot = board
            .get(&code)
            .ok_or_else(|| ObserverError::NotFound(format!("station {code} not found")))?;
        (snapshot, board.as_of.unwrap_or_default())
    };

    let mut display = DisplayState::clone(&snapshot);
    if let Some(window) = window {
        let cutoff = as_of.saturating_sub(window);
        display.pga_history.retain(|sample| sample.timestamp >= cutoff);
    }
    Ok(Json(display))
}

// ---------------------------------------------------------------------------
// GET /api/stations/{code}/intensity
// ---------------------------------------------------------------------------

/// Get the max-PGA intensity of one station over `window_ms`.
pub async fn get_station_intensity(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
    Query(params): Query<IntensityQuery>,
) -> Result<Json<IntensityReading>, ObserverError> {
    let window = resolve_window(params.window_ms.as_deref(), state.retention_window_ms)?;
    let board = state.board.read().await;
    let snapshot = board
        .get(&code)
        .ok_or_else(|| ObserverError::NotFound(format!("station {code} not found")))?;
    let cutoff = board.as_of.unwrap_or_default().saturating_sub(window);
    Ok(Json(reading_for(&snapshot, cutoff)))
}
