//! Per-connection station subscriptions for `/ws/stations`.
//!
//! A client sends
//! `{"event": "subscribe_stations", "data": {"stations": ["A024", ...]}}`
//! and from then on receives a `station_update` event carrying the full
//! [`DisplayState`] of each subscribed station whenever the engine
//! publishes it. Every request replaces the previous set; an empty list
//! unsubscribes from everything. Keys may be bare codes (`A024`) or
//! channel keys (`SM.A024.01.HLZ`).
//!
//! Nothing here touches the socket, so the protocol is testable without
//! a live connection.

use std::collections::BTreeSet;
use std::sync::Arc;

use quakestream_types::packet::station_code_from_key;
use quakestream_types::{DisplayState, StationCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ObserverError;
use crate::state::AppState;

/// Events the server pushes on `/ws/stations`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum StationEvent {
    /// Sent once after the upgrade; the client may subscribe now.
    ConnectInit,
    /// Acknowledges a subscription with the normalized codes.
    Subscribed {
        /// Codes now subscribed, sorted.
        stations: Vec<StationCode>,
    },
    /// Latest display state of a subscribed station.
    StationUpdate(Arc<DisplayState>),
    /// The last client message could not be handled.
    Error {
        /// Human-readable reason.
        message: String,
    },
}

/// Messages a client may send on `/ws/stations`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientRequest {
    /// Replace the subscribed station set.
    SubscribeStations(SubscribeStations),
}

/// Payload of a `subscribe_stations` request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubscribeStations {
    /// Station codes or channel keys.
    #[serde(default)]
    pub stations: Vec<String>,
}

/// Parse one client text frame.
///
/// # Errors
///
/// Returns [`ObserverError::Serialization`] for malformed JSON or an
/// unknown event.
pub fn parse_request(text: &str) -> Result<ClientRequest, ObserverError> {
    Ok(serde_json::from_str(text)?)
}

/// Encode a server event as a JSON text frame.
///
/// # Errors
///
/// Returns [`ObserverError::Serialization`] if encoding fails.
pub fn encode_event(event: &StationEvent) -> Result<String, ObserverError> {
    Ok(serde_json::to_string(event)?)
}

/// The set of stations one connection listens to.
#[derive(Debug, Clone, Default)]
pub struct StationSubscription {
    codes: BTreeSet<StationCode>,
}

impl StationSubscription {
    /// Replace the subscribed set with the codes named by `keys`.
    ///
    /// Keys without a station part are skipped. Returns the new set,
    /// sorted.
    pub fn replace(&mut self, keys: &[String]) -> Vec<StationCode> {
        self.codes = keys
            .iter()
            .filter_map(|key| station_code_from_key(key).ok())
            .collect();
        self.codes.iter().cloned().collect()
    }

    /// Whether updates for `code` should be forwarded.
    pub fn wants(&self, code: &StationCode) -> bool {
        self.codes.contains(code)
    }

    /// Whether nothing is subscribed.
    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    /// The event to forward for a published snapshot, if subscribed.
    pub fn update_for(&self, update: &Arc<DisplayState>) -> Option<StationEvent> {
        self.wants(&update.station)
            .then(|| StationEvent::StationUpdate(Arc::clone(update)))
    }

    /// Handle one client text frame.
    ///
    /// A subscription is acknowledged and followed by the current board
    /// snapshot of every subscribed station already known, so a client
    /// can draw before the next publication arrives.
    pub async fn handle_text(&mut self, state: &AppState, text: &str) -> Vec<StationEvent> {
        let request = match parse_request(text) {
            Ok(request) => request,
            Err(e) => {
                debug!("Rejected station subscription message: {e}");
                return vec![StationEvent::Error {
                    message: e.to_string(),
                }];
            }
        };

        let ClientRequest::SubscribeStations(SubscribeStations { stations }) = request;
        let codes = self.replace(&stations);
        debug!(stations = codes.len(), "Station subscription replaced");

        let board = state.board.read().await;
        let snapshots: Vec<StationEvent> = codes
            .iter()
            .filter_map(|code| board.get(code.as_str()))
            .map(StationEvent::StationUpdate)
            .collect();
        drop(board);

        let mut events = Vec::with_capacity(snapshots.len().saturating_add(1));
        events.push(StationEvent::Subscribed { stations: codes });
        events.extend(snapshots);
        events
    }
}
