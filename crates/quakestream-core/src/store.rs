//! Keyed map of station states.
//!
//! Stations are created lazily on first ingestion. Whole stations are
//! only removed by the idle and capacity policies, which are both off
//! unless configured.

use std::collections::BTreeMap;

use quakestream_types::StationCode;

use crate::station::StationState;

/// All station states, ordered by station code.
#[derive(Debug, Clone, Default)]
pub struct StationStore {
    stations: BTreeMap<StationCode, StationState>,
}

impl StationStore {
    /// Create an empty store.
    pub const fn new() -> Self {
        Self {
            stations: BTreeMap::new(),
        }
    }

    /// Fetch a station, creating it with `create` on first sight.
    pub fn get_or_insert_with(
        &mut self,
        code: &StationCode,
        create: impl FnOnce() -> StationState,
    ) -> &mut StationState {
        self.stations.entry(code.clone()).or_insert_with(create)
    }

    /// Look up a station by code.
    pub fn get(&self, code: &str) -> Option<&StationState> {
        self.stations.get(code)
    }

    /// Remove a station.
    pub fn remove(&mut self, code: &str) -> Option<StationState> {
        self.stations.remove(code)
    }

    /// Iterate every station in code order.
    pub fn iter(&self) -> impl Iterator<Item = &StationState> {
        self.stations.values()
    }

    /// Iterate every station mutably in code order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut StationState> {
        self.stations.values_mut()
    }

    /// Station codes in order.
    pub fn codes(&self) -> impl Iterator<Item = &StationCode> {
        self.stations.keys()
    }

    /// Number of stations.
    pub fn len(&self) -> usize {
        self.stations.len()
    }

    /// Whether the store holds no stations.
    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }

    /// Remove stations with no activity since `now - idle_timeout_ms`.
    pub fn remove_idle(&mut self, now: i64, idle_timeout_ms: i64) -> Vec<StationCode> {
        let cutoff = now.saturating_sub(idle_timeout_ms);
        let idle: Vec<StationCode> = self
            .stations
            .iter()
            .filter(|(_, state)| state.last_active() < cutoff)
            .map(|(code, _)| code.clone())
            .collect();
        for code in &idle {
            self.stations.remove(code);
        }
        idle
    }

    /// Remove the least recently active stations until at most
    /// `max_stations` remain. Ties go by station code.
    pub fn enforce_capacity(&mut self, max_stations: usize) -> Vec<StationCode> {
        let excess = self.stations.len().saturating_sub(max_stations);
        if excess == 0 {
            return Vec::new();
        }
        let mut by_activity: Vec<(i64, &StationCode)> = self
            .stations
            .iter()
            .map(|(code, state)| (state.last_active(), code))
            .collect();
        by_activity.sort_unstable();
        let evicted: Vec<StationCode> = by_activity
            .into_iter()
            .take(excess)
            .map(|(_, code)| code.clone())
            .collect();
        for code in &evicted {
            self.stations.remove(code);
        }
        evicted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn insert(store: &mut StationStore, code: &str, now: i64) {
        let code = StationCode::new(code);
        let key = code.clone();
        store.get_or_insert_with(&key, || StationState::new(code, 100, 1.0, now));
    }

    #[test]
    fn stations_are_created_once() {
        let mut store = StationStore::new();
        insert(&mut store, "A024", 0);
        insert(&mut store, "A024", 50);
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("A024").map(StationState::last_active), Some(0));
        assert!(store.get("B131").is_none());
    }

    #[test]
    fn idle_stations_are_removed() {
        let mut store = StationStore::new();
        insert(&mut store, "A024", 0);
        insert(&mut store, "B131", 50_000);
        let removed = store.remove_idle(100_000, 60_000);
        assert_eq!(removed, vec![StationCode::new("A024")]);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn capacity_drops_least_recently_active() {
        let mut store = StationStore::new();
        insert(&mut store, "C001", 300);
        insert(&mut store, "A024", 100);
        insert(&mut store, "B131", 200);
        let removed = store.enforce_capacity(1);
        assert_eq!(removed, vec![StationCode::new("A024"), StationCode::new("B131")]);
        let codes: Vec<&str> = store.codes().map(StationCode::as_str).collect();
        assert_eq!(codes, vec!["C001"]);
    }

    #[test]
    fn capacity_under_limit_is_noop() {
        let mut store = StationStore::new();
        insert(&mut store, "A024", 0);
        assert!(store.enforce_capacity(10).is_empty());
        assert_eq!(store.len(), 1);
    }
}
