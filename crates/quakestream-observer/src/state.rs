//! Shared application state for the read API server.
//!
//! [`AppState`] holds the broadcast channels for per-tick intensity
//! readings and per-station updates, and a [`StationBoard`] of
//! per-station snapshots that the REST endpoints serve. The engine task is the only writer; each
//! station's snapshot is an immutable [`Arc`] that is swapped whole,
//! so a reader always sees a station as of one publication.

use std::collections::BTreeMap;
use std::sync::Arc;

use quakestream_core::intensity::{classify_pga, max_pga_since};
use quakestream_types::{DisplayState, IntensityReading, StationCode};
use tokio::sync::{broadcast, RwLock};

/// Capacity of the broadcast channel for intensity updates.
///
/// If a subscriber falls behind by more than this many messages it will
/// receive a [`broadcast::error::RecvError::Lagged`] and skip to the
/// newest message.
const BROADCAST_CAPACITY: usize = 64;

/// Capacity of the broadcast channel for station updates.
///
/// Every published station passes through this channel, so it is sized
/// for a full tick of a large network. Each update is a complete
/// snapshot, so a lagged subscriber recovers on the station's next one.
const STATION_BROADCAST_CAPACITY: usize = 4096;

/// Retention window assumed when none is configured (ms).
const DEFAULT_RETENTION_WINDOW_MS: i64 = 120_000;

/// JSON message pushed over the `WebSocket` after every tick.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct IntensityBroadcast {
    /// Engine time of the tick (epoch ms).
    pub tick_time: i64,
    /// Number of stations after the tick.
    pub stations: usize,
    /// Per-station intensity over the retention window.
    pub readings: Vec<IntensityReading>,
}

/// Latest published snapshot of every station.
#[derive(Debug, Clone, Default)]
pub struct StationBoard {
    /// Display state per station.
    pub stations: BTreeMap<StationCode, Arc<DisplayState>>,
    /// Engine time of the most recent publication (epoch ms).
    pub as_of: Option<i64>,
    /// Engine time of the most recent tick (epoch ms).
    pub last_tick: Option<i64>,
}

impl StationBoard {
    /// Replace the snapshots of the given stations.
    pub fn apply_ingest(&mut self, now: i64, states: Vec<Arc<DisplayState>>) {
        for state in states {
            self.stations.insert(state.station.clone(), state);
        }
        self.advance(now);
    }

    /// Replace the whole board with a tick's snapshot. Stations missing
    /// from `states` were removed by the engine.
    pub fn apply_tick(&mut self, now: i64, states: Vec<Arc<DisplayState>>) {
        self.stations = states
            .into_iter()
            .map(|state| (state.station.clone(), state))
            .collect();
        self.last_tick = Some(now);
        self.advance(now);
    }

    fn advance(&mut self, now: i64) {
        self.as_of = Some(self.as_of.map_or(now, |prev| prev.max(now)));
    }

    /// Snapshot of one station.
    pub fn get(&self, code: &str) -> Option<Arc<DisplayState>> {
        self.stations.get(code).cloned()
    }
}

/// Shared state for the Axum application.
///
/// Wrapped in [`Arc`] and injected via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    /// Broadcast sender for intensity updates.
    pub tx: broadcast::Sender<IntensityBroadcast>,
    /// Broadcast sender for per-station snapshots.
    pub station_tx: broadcast::Sender<Arc<DisplayState>>,
    /// The current station board (updated by the engine).
    pub board: Arc<RwLock<StationBoard>>,
    /// Upper bound for read windows (ms).
    pub retention_window_ms: i64,
}

impl AppState {
    /// Create application state with an empty board.
    pub fn new(retention_window_ms: i64) -> Self {
        let (tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        let (station_tx, _) = broadcast::channel(STATION_BROADCAST_CAPACITY);
        Self {
            tx,
            station_tx,
            board: Arc::new(RwLock::new(StationBoard::default())),
            retention_window_ms,
        }
    }

    /// Subscribe to the intensity broadcast channel.
    pub fn subscribe(&self) -> broadcast::Receiver<IntensityBroadcast> {
        self.tx.subscribe()
    }

    /// Publish an intensity update to all connected clients.
    ///
    /// Returns the number of receivers. Zero receivers is not an error.
    pub fn broadcast(&self, update: &IntensityBroadcast) -> usize {
        self.tx.send(update.clone()).unwrap_or(0)
    }

    /// Subscribe to per-station snapshot updates.
    pub fn subscribe_stations(&self) -> broadcast::Receiver<Arc<DisplayState>> {
        self.station_tx.subscribe()
    }

    /// Publish one station's snapshot to `/ws/stations` clients.
    ///
    /// Returns the number of receivers.
    pub fn publish_station(&self, state: &Arc<DisplayState>) -> usize {
        self.station_tx.send(Arc::clone(state)).unwrap_or(0)
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(DEFAULT_RETENTION_WINDOW_MS)
    }
}

/// Intensity of a snapshot over PGA samples at or after `cutoff`.
pub fn reading_for(state: &DisplayState, cutoff: i64) -> IntensityReading {
    let pga = max_pga_since(&state.pga_history, cutoff);
    IntensityReading {
        station: state.station.clone(),
        pga,
        intensity: classify_pga(pga),
    }
}
