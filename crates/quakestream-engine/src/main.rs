//! Station engine binary for quakestream.
//!
//! Wires the ingestion engine, its async runner, the read API server,
//! and a newline-delimited JSON feed read from stdin.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `quakestream-config.yaml`
//!    (or the path in `QUAKESTREAM_CONFIG`)
//! 2. Initialize structured logging (tracing)
//! 3. Create the engine and its bounded inbox
//! 4. Start the read API server
//! 5. Spawn the engine task with the observer sink
//! 6. Run the stdin feed to end of input
//! 7. Serve reads until interrupted, then stop the engine

mod error;
mod feed;
mod observer_sink;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use quakestream_core::clock::SystemClock;
use quakestream_core::config::QuakeConfig;
use quakestream_core::engine::IngestionEngine;
use quakestream_core::runner::{engine_channel, run_engine};
use quakestream_observer::{start_server, AppState, ServerConfig, ServerError};
use tokio::task::JoinError;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::error::EngineError;
use crate::observer_sink::ObserverSink;

/// Default configuration file, relative to the working directory.
const DEFAULT_CONFIG_PATH: &str = "quakestream-config.yaml";

/// Application entry point for the station engine.
///
/// # Errors
///
/// Returns an error if configuration is invalid, the server cannot
/// start, or reading the feed fails.
#[tokio::main]
async fn main() -> Result<(), EngineError> {
    // 1. Load configuration.
    let config_path = config_path();
    let config = load_config(&config_path)?;

    // 2. Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .with_target(true)
        .init();

    info!("quakestream-engine starting");
    info!(
        path = %config_path.display(),
        found = config_path.exists(),
        retention_window_ms = config.engine.retention_window_ms,
        statistics_window_ms = config.engine.statistics_window_ms,
        tick_interval_ms = config.engine.tick_interval_ms,
        "Configuration loaded"
    );

    // 3. Create the engine and its inbox.
    let engine = IngestionEngine::from_config(&config);
    let (handle, inbox) = engine_channel(config.engine.inbox_capacity);
    let tick_interval = Duration::from_millis(config.engine.tick_interval_ms);

    // 4. Start the read API server.
    let app_state = Arc::new(AppState::new(config.engine.retention_window_ms));
    let server_config = ServerConfig::from(&config.observer);
    let server_state = Arc::clone(&app_state);
    let mut server_task =
        tokio::spawn(async move { start_server(&server_config, server_state).await });

    // 5. Spawn the engine task.
    let mut sink = ObserverSink::new(app_state);
    let engine_task = tokio::spawn(async move {
        let mut engine = engine;
        run_engine(&mut engine, inbox, &SystemClock, tick_interval, &mut sink).await
    });

    // 6. Run the feed.
    tokio::select! {
        result = feed::run_feed(tokio::io::stdin(), &handle) => {
            let summary = result?;
            info!(
                commands = summary.commands,
                rejected = summary.rejected,
                "Feed finished, serving reads until interrupted"
            );
        }
        joined = &mut server_task => return Err(server_exit(joined)),
    }

    // 7. Serve until interrupted.
    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal?;
            info!("Interrupt received, shutting down");
        }
        joined = &mut server_task => return Err(server_exit(joined)),
    }

    drop(handle);
    let summary = engine_task.await?;
    info!(
        commands = summary.commands,
        ticks = summary.ticks,
        accepted = summary.report.accepted,
        dropped = summary.report.dropped,
        filtered = summary.report.filtered,
        "quakestream-engine shutdown complete"
    );
    server_task.abort();

    Ok(())
}

/// Resolve the configuration path from `QUAKESTREAM_CONFIG`.
fn config_path() -> PathBuf {
    std::env::var_os("QUAKESTREAM_CONFIG")
        .map_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from)
}

/// Load the configuration, falling back to defaults when the file is
/// absent.
fn load_config(path: &Path) -> Result<QuakeConfig, EngineError> {
    let config = if path.exists() {
        QuakeConfig::from_file(path)?
    } else {
        QuakeConfig::parse("")?
    };
    Ok(config)
}

/// Turn an early server exit into an error.
fn server_exit(joined: Result<Result<(), ServerError>, JoinError>) -> EngineError {
    match joined {
        Ok(Ok(())) => EngineError::from(ServerError::Serve(String::from(
            "server stopped unexpectedly",
        ))),
        Ok(Err(e)) => e.into(),
        Err(e) => e.into(),
    }
}
