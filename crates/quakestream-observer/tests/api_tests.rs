//! Integration tests for the read API endpoints.
//!
//! Tests drive the `Router` directly via `tower::ServiceExt` without
//! starting a TCP server. The board is filled from a real engine so the
//! served snapshots match what the runner publishes.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use quakestream_core::config::{DisplayScaleConfig, EngineConfig};
use quakestream_core::engine::IngestionEngine;
use quakestream_observer::router::build_router;
use quakestream_observer::state::AppState;
use quakestream_observer::subscription::{encode_event, StationEvent, StationSubscription};
use quakestream_types::{StationCode, WaveformBatch, WaveformPacket};
use serde_json::Value;
use tower::ServiceExt;

const T0: i64 = 1_700_000_010_000;
const LATER: i64 = T0 + 20_000;

fn batch(key: &str, startt: f64, pga: f64) -> WaveformBatch {
    let packet = WaveformPacket {
        pga: Some(pga),
        startt: Some(startt),
        endt: Some(startt + 0.99),
        samprate: Some(100.0),
        waveform: vec![0.1; 100],
    };
    [(key.to_owned(), packet)].into_iter().collect()
}

async fn make_test_state() -> Arc<AppState> {
    let mut engine = IngestionEngine::new(EngineConfig::default(), DisplayScaleConfig::default());
    engine.ingest_waveforms(&batch("SM.A024.01.HLZ", 1_700_000_000.0, 90.0), T0);
    engine.ingest_waveforms(&batch("SM.A024.01.HLZ", 1_700_000_019.0, 1.0), LATER);
    engine.ingest_waveforms(&batch("SM.B131.01.HLZ", 1_700_000_019.0, 3.0), LATER);
    engine.tick(LATER);

    let state = Arc::new(AppState::new(engine.config().retention_window_ms));
    let states = engine.display_states(LATER).into_iter().map(Arc::new).collect();
    state.board.write().await.apply_tick(LATER, states);
    state
}

async fn get(state: Arc<AppState>, path: &str) -> (StatusCode, Value) {
    let response = build_router(state)
        .oneshot(Request::get(path).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn health_reports_board() {
    let (status, json) = get(make_test_state().await, "/api/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["stations"], 2);
    assert_eq!(json["last_tick"], LATER);
}

#[tokio::test]
async fn health_on_empty_board() {
    let (status, json) = get(Arc::new(AppState::default()), "/api/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["stations"], 0);
    assert!(json["as_of"].is_null());
}

#[tokio::test]
async fn list_stations_returns_intensity_per_station() {
    let (status, json) = get(make_test_state().await, "/api/stations").await;
    assert_eq!(status, StatusCode::OK);
    let readings = json.as_array().unwrap();
    assert_eq!(readings.len(), 2);
    assert_eq!(readings[0]["station"], "A024");
    assert_eq!(readings[0]["intensity"], "5-");
    assert_eq!(readings[1]["station"], "B131");
    assert_eq!(readings[1]["intensity"], "2");
}

#[tokio::test]
async fn station_display_state() {
    let (status, json) = get(make_test_state().await, "/api/stations/A024").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["station"], "A024");
    assert_eq!(json["pga_history"].as_array().unwrap().len(), 2);
    let segments = json["segments"].as_array().unwrap();
    assert_eq!(segments.len(), 3);
    assert_eq!(segments[1]["is_gap"], true);
}

#[tokio::test]
async fn station_pga_window_narrows_history() {
    let (status, json) = get(
        make_test_state().await,
        "/api/stations/A024?pga_window_ms=5000",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let history = json["pga_history"].as_array().unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0]["timestamp"], LATER);
}

#[tokio::test]
async fn station_intensity_window() {
    let state = make_test_state().await;

    let (status, json) = get(Arc::clone(&state), "/api/stations/A024/intensity").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["intensity"], "5-");

    let (status, json) = get(state, "/api/stations/A024/intensity?window_ms=10000").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["intensity"], "1");
}

#[tokio::test]
async fn unknown_station_is_not_found() {
    let (status, json) = get(make_test_state().await, "/api/stations/Z999").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["status"], 404);
    assert!(json["error"].as_str().unwrap().contains("Z999"));

    let (status, _) = get(make_test_state().await, "/api/stations/Z999/intensity").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn invalid_window_is_bad_request() {
    for path in [
        "/api/stations/A024/intensity?window_ms=0",
        "/api/stations/A024/intensity?window_ms=soon",
        "/api/stations/A024?pga_window_ms=-1",
        "/api/stations?window_ms=abc",
    ] {
        let (status, json) = get(make_test_state().await, path).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{path}");
        assert_eq!(json["status"], 400);
    }
}

#[tokio::test]
async fn unknown_route_is_not_found() {
    let response = build_router(make_test_state().await)
        .oneshot(Request::get("/api/nothing").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn station_socket_route_requires_upgrade() {
    let response = build_router(make_test_state().await)
        .oneshot(Request::get("/ws/stations").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    assert_ne!(status, StatusCode::NOT_FOUND);
    assert!(status.is_client_error(), "{status}");
}

#[tokio::test]
async fn station_subscription_sends_board_then_filtered_updates() {
    let state = make_test_state().await;
    let mut subscription = StationSubscription::default();

    let request = r#"{"event":"subscribe_stations","data":{"stations":["A024","SM.Z999.01.HLZ"]}}"#;
    let events = subscription.handle_text(&state, request).await;
    assert_eq!(events.len(), 2, "{events:?}");
    let expected = vec![StationCode::new("A024"), StationCode::new("Z999")];
    assert!(matches!(&events[0], StationEvent::Subscribed { stations } if *stations == expected));
    // Z999 is not on the board, so only A024 gets an initial snapshot.
    assert!(matches!(
        &events[1],
        StationEvent::StationUpdate(initial)
            if initial.station.as_str() == "A024" && initial.segments.len() == 3
    ));

    let mut rx = state.subscribe_stations();
    let (a024, b131) = {
        let board = state.board.read().await;
        (board.get("A024").unwrap(), board.get("B131").unwrap())
    };
    state.publish_station(&b131);
    state.publish_station(&a024);

    let forwarded: Vec<StationEvent> = [rx.recv().await.unwrap(), rx.recv().await.unwrap()]
        .iter()
        .filter_map(|update| subscription.update_for(update))
        .collect();
    assert_eq!(forwarded.len(), 1);
    let json: Value = serde_json::from_str(&encode_event(&forwarded[0]).unwrap()).unwrap();
    assert_eq!(json["event"], "station_update");
    assert_eq!(json["data"]["station"], "A024");
    assert_eq!(json["data"]["segments"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn empty_subscription_stops_updates() {
    let state = make_test_state().await;
    let mut subscription = StationSubscription::default();
    subscription
        .handle_text(&state, r#"{"event":"subscribe_stations","data":{"stations":["A024"]}}"#)
        .await;

    let events = subscription
        .handle_text(&state, r#"{"event":"subscribe_stations","data":{"stations":[]}}"#)
        .await;
    assert!(matches!(
        events.as_slice(),
        [StationEvent::Subscribed { stations }] if stations.is_empty()
    ));

    let a024 = state.board.read().await.get("A024").unwrap();
    assert!(subscription.update_for(&a024).is_none());
}
