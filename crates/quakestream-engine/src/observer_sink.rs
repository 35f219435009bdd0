//! Snapshot sink that publishes engine output to the read API.
//!
//! Ingest publications replace the touched stations on the
//! [`StationBoard`]; tick publications replace the whole board and are
//! broadcast to `WebSocket` clients. Every published station snapshot
//! also goes to `/ws/stations` subscribers. The board is written with
//! `try_write` so the engine never waits on a reader. When the lock is
//! busy the snapshot is held back and applied on the next publication.
//!
//! [`StationBoard`]: quakestream_observer::StationBoard

use std::collections::BTreeMap;
use std::sync::Arc;

use quakestream_core::engine::TickSummary;
use quakestream_core::runner::SnapshotSink;
use quakestream_observer::{AppState, IntensityBroadcast};
use quakestream_types::{DisplayState, IntensityReading, StationCode};
use tracing::debug;

/// Sink bridging the engine task to the read API state.
pub struct ObserverSink {
    state: Arc<AppState>,
    pending_tick: Option<(i64, Vec<Arc<DisplayState>>)>,
    pending: BTreeMap<StationCode, Arc<DisplayState>>,
    pending_as_of: i64,
}

impl ObserverSink {
    /// Create a sink backed by the given app state.
    pub const fn new(state: Arc<AppState>) -> Self {
        Self {
            state,
            pending_tick: None,
            pending: BTreeMap::new(),
            pending_as_of: 0,
        }
    }

    /// Share each snapshot and hand it to station subscribers.
    fn publish(&self, states: Vec<DisplayState>) -> Vec<Arc<DisplayState>> {
        states
            .into_iter()
            .map(|state| {
                let state = Arc::new(state);
                self.state.publish_station(&state);
                state
            })
            .collect()
    }

    /// Apply everything held back, if the board is free.
    fn flush(&mut self) {
        let Ok(mut board) = self.state.board.try_write() else {
            debug!(
                held = self.pending.len(),
                "Station board busy, publication deferred"
            );
            return;
        };
        if let Some((now, states)) = self.pending_tick.take() {
            board.apply_tick(now, states);
        }
        if !self.pending.is_empty() {
            let states = std::mem::take(&mut self.pending).into_values().collect();
            board.apply_ingest(self.pending_as_of, states);
        }
    }
}

impl SnapshotSink for ObserverSink {
    fn on_ingest(&mut self, now: i64, states: Vec<DisplayState>) {
        for state in self.publish(states) {
            self.pending.insert(state.station.clone(), state);
        }
        self.pending_as_of = self.pending_as_of.max(now);
        self.flush();
    }

    fn on_tick(
        &mut self,
        summary: &TickSummary,
        states: Vec<DisplayState>,
        intensities: Vec<IntensityReading>,
    ) {
        // The tick covers every station, so held-back ingests are stale.
        self.pending.clear();
        self.pending_tick = Some((summary.now, self.publish(states)));
        self.flush();

        let update = IntensityBroadcast {
            tick_time: summary.now,
            stations: summary.stations,
            readings: intensities,
        };
        let receivers = self.state.broadcast(&update);
        debug!(tick_time = summary.now, receivers, "Intensity broadcast sent");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use quakestream_core::station::EvictionCounts;

    use super::*;

    fn state(code: &str, scale: f64) -> DisplayState {
        DisplayState {
            station: StationCode::new(code),
            segments: Vec::new(),
            picks: Vec::new(),
            display_scale: scale,
            last_pga: None,
            pga_history: Vec::new(),
            last_end_time: None,
        }
    }

    fn summary(now: i64, stations: usize) -> TickSummary {
        TickSummary {
            now,
            stations,
            evicted: EvictionCounts::default(),
            removed_stations: Vec::new(),
        }
    }

    #[test]
    fn ingest_reaches_board() {
        let app = Arc::new(AppState::default());
        let mut sink = ObserverSink::new(Arc::clone(&app));
        sink.on_ingest(100, vec![state("A024", 0.4)]);

        let board = app.board.try_read().unwrap();
        assert_eq!(board.as_of, Some(100));
        assert!(board.get("A024").is_some());
    }

    #[test]
    fn busy_board_defers_until_next_publication() {
        let app = Arc::new(AppState::default());
        let mut sink = ObserverSink::new(Arc::clone(&app));

        let guard = app.board.try_read().unwrap();
        sink.on_ingest(100, vec![state("A024", 0.4)]);
        drop(guard);
        assert!(app.board.try_read().unwrap().get("A024").is_none());

        sink.on_ingest(200, vec![state("B131", 0.2)]);
        let board = app.board.try_read().unwrap();
        assert!(board.get("A024").is_some());
        assert!(board.get("B131").is_some());
        assert_eq!(board.as_of, Some(200));
    }

    #[test]
    fn tick_replaces_board_and_broadcasts() {
        let app = Arc::new(AppState::default());
        let mut rx = app.subscribe();
        let mut sink = ObserverSink::new(Arc::clone(&app));

        sink.on_ingest(100, vec![state("A024", 0.4), state("B131", 0.2)]);
        sink.on_tick(&summary(1_000, 1), vec![state("B131", 0.3)], Vec::new());

        let board = app.board.try_read().unwrap();
        assert!(board.get("A024").is_none());
        assert_eq!(board.last_tick, Some(1_000));

        let update = rx.try_recv().unwrap();
        assert_eq!(update.tick_time, 1_000);
        assert_eq!(update.stations, 1);
    }

    #[test]
    fn station_subscribers_see_ingest_and_tick() {
        let app = Arc::new(AppState::default());
        let mut rx = app.subscribe_stations();
        let mut sink = ObserverSink::new(Arc::clone(&app));

        // Held back from the busy board but still pushed to subscribers.
        let guard = app.board.try_read().unwrap();
        sink.on_ingest(100, vec![state("A024", 0.4)]);
        drop(guard);
        sink.on_tick(&summary(1_000, 1), vec![state("A024", 0.5)], Vec::new());

        let first = rx.try_recv().unwrap();
        assert_eq!(first.station, StationCode::new("A024"));
        assert!((first.display_scale - 0.4).abs() < f64::EPSILON);
        let second = rx.try_recv().unwrap();
        assert!((second.display_scale - 0.5).abs() < f64::EPSILON);

        let board = app.board.try_read().unwrap();
        assert!(Arc::ptr_eq(&board.get("A024").unwrap(), &second));
    }
}
