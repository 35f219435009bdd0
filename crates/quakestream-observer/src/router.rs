//! Axum router construction for the read API.

use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;
use crate::ws;

/// Build the complete Axum router.
///
/// The router includes:
/// - `GET /api/health` -- station count and last tick
/// - `GET /api/stations` -- intensity of every station
/// - `GET /api/stations/{code}` -- display state of one station
/// - `GET /api/stations/{code}/intensity` -- intensity of one station
/// - `GET /ws/intensity` -- `WebSocket` stream of per-tick intensity
/// - `GET /ws/stations` -- `WebSocket` stream of subscribed stations
///
/// CORS allows any origin so browser renderers on other hosts can read.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/ws/intensity", get(ws::ws_intensity))
        .route("/ws/stations", get(ws::ws_stations))
        .route("/api/health", get(handlers::health))
        .route("/api/stations", get(handlers::list_stations))
        .route("/api/stations/{code}", get(handlers::get_station))
        .route(
            "/api/stations/{code}/intensity",
            get(handlers::get_station_intensity),
        )
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
