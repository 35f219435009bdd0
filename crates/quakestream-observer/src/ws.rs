//! `WebSocket` handlers for intensity and station streaming.
//!
//! Clients connect to `GET /ws/intensity` and receive a JSON-encoded
//! [`IntensityBroadcast`] each time the engine completes a tick. All
//! connected clients share one [`broadcast`] channel; a client that
//! falls behind skips to the most recent tick.
//!
//! Clients of `GET /ws/stations` pick stations with a
//! `subscribe_stations` message and receive each published snapshot of
//! those stations (see [`subscription`](crate::subscription)).
//!
//! [`IntensityBroadcast`]: crate::state::IntensityBroadcast
//! [`broadcast`]: tokio::sync::broadcast

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use crate::state::AppState;
use crate::subscription::{encode_event, StationEvent, StationSubscription};

/// Upgrade an HTTP request to a `WebSocket` connection and begin
/// streaming intensity readings.
///
/// # Route
///
/// `GET /ws/intensity`
pub async fn ws_intensity(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_ws(socket, state))
}

async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>) {
    debug!("WebSocket client connected");

    let mut rx = state.subscribe();

    loop {
        tokio::select! {
            result = rx.recv() => {
                match result {
                    Ok(update) => {
                        let json = match serde_json::to_string(&update) {
                            Ok(j) => j,
                            Err(e) => {
                                warn!("Failed to serialize intensity broadcast: {e}");
                                continue;
                            }
                        };
                        if socket.send(Message::Text(json.into())).await.is_err() {
                            debug!("WebSocket client disconnected (send failed)");
                            return;
                        }
                    }
                    Err(RecvError::Lagged(n)) => {
                        debug!(skipped = n, "WebSocket client lagged, skipping ahead");
                    }
                    Err(RecvError::Closed) => {
                        debug!("Broadcast channel closed, shutting down WebSocket");
                        return;
                    }
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => {
                        debug!("WebSocket client disconnected");
                        return;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            debug!("WebSocket client disconnected (pong failed)");
                            return;
                        }
                    }
                    Some(Err(e)) => {
                        debug!("WebSocket error: {e}");
                        return;
                    }
                    // Client text and binary frames are ignored.
                    _ => {}
                }
            }
        }
    }
}

/// Upgrade an HTTP request to a `WebSocket` connection that streams
/// snapshots of subscribed stations.
///
/// # Route
///
/// `GET /ws/stations`
pub async fn ws_stations(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_station_ws(socket, state))
}

async fn handle_station_ws(mut socket: WebSocket, state: Arc<AppState>) {
    debug!("Station WebSocket client connected");

    let mut rx = state.subscribe_stations();
    let mut subscription = StationSubscription::default();
    if !send_event(&mut socket, &StationEvent::ConnectInit).await {
        return;
    }

    loop {
        tokio::select! {
            result = rx.recv() => {
                match result {
                    Ok(update) => {
                        let Some(event) = subscription.update_for(&update) else {
                            continue;
                        };
                        if !send_event(&mut socket, &event).await {
                            debug!("Station WebSocket client disconnected (send failed)");
                            return;
                        }
                    }
                    Err(RecvError::Lagged(n)) => {
                        debug!(skipped = n, "Station WebSocket client lagged, skipping ahead");
                    }
                    Err(RecvError::Closed) => {
                        debug!("Station channel closed, shutting down WebSocket");
                        return;
                    }
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        for event in subscription.handle_text(&state, text.as_str()).await {
                            if !send_event(&mut socket, &event).await {
                                debug!("Station WebSocket client disconnected (send failed)");
                                return;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        debug!("Station WebSocket client disconnected");
                        return;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            debug!("Station WebSocket client disconnected (pong failed)");
                            return;
                        }
                    }
                    Some(Err(e)) => {
                        debug!("Station WebSocket error: {e}");
                        return;
                    }
                    _ => {}
                }
            }
        }
    }
}

/// Send one event. Returns `false` once the client is gone.
async fn send_event(socket: &mut WebSocket, event: &StationEvent) -> bool {
    let json = match encode_event(event) {
        Ok(j) => j,
        Err(e) => {
            warn!("Failed to serialize station event: {e}");
            return true;
        }
    };
    socket.send(Message::Text(json.into())).await.is_ok()
}
