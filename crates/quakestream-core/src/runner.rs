//! Async engine loop: one task owns the engine.
//!
//! [`run_engine`] drains a bounded inbox of [`EngineCommand`]s interleaved
//! with a fixed-interval eviction tick. Every mutation happens on this
//! one task, so per-station ordering is the order commands were sent.
//!
//! - After each command, the display states of the stations it touched
//!   are handed to the [`SnapshotSink`]. Segments in a display state are
//!   shared with the engine, so a publication costs one pointer per
//!   retained segment rather than a copy of its samples.
//! - After each tick, every station's display state and intensity reading
//!   are handed over together with the [`TickSummary`].
//! - Missed ticks are skipped rather than queued, and each tick evicts
//!   against the clock's current time.
//!
//! The loop ends when every [`EngineHandle`] has been dropped.

use std::time::Duration;

use quakestream_types::{DisplayState, IntensityReading, PickPacket, WaveformBatch};
use tokio::sync::mpsc;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::clock::Clock;
use crate::engine::{IngestReport, IngestionEngine, TickSummary};

/// Errors raised when handing a command to the engine task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RunnerError {
    /// The engine task has stopped.
    #[error("engine inbox is closed")]
    Closed,

    /// The inbox is at capacity.
    #[error("engine inbox is full")]
    Full,
}

/// A unit of work for the engine task.
#[derive(Debug, Clone)]
pub enum EngineCommand {
    /// A live waveform batch.
    Waveforms(WaveformBatch),
    /// Historical waveform batches, applied in order.
    WaveformHistory(Vec<WaveformBatch>),
    /// Live pick packets.
    Picks(Vec<PickPacket>),
    /// Historical pick batches, applied in order.
    PickHistory(Vec<Vec<PickPacket>>),
}

/// Receiver of engine snapshots.
///
/// Implementations update whatever read boundary serves renderers.
pub trait SnapshotSink: Send {
    /// Called after a command with the stations it changed.
    fn on_ingest(&mut self, now: i64, states: Vec<DisplayState>);

    /// Called after a tick with every station.
    fn on_tick(
        &mut self,
        summary: &TickSummary,
        states: Vec<DisplayState>,
        intensities: Vec<IntensityReading>,
    );
}

/// A sink that discards everything.
pub struct NoOpSink;

impl SnapshotSink for NoOpSink {
    fn on_ingest(&mut self, _now: i64, _states: Vec<DisplayState>) {}

    fn on_tick(
        &mut self,
        _summary: &TickSummary,
        _states: Vec<DisplayState>,
        _intensities: Vec<IntensityReading>,
    ) {
    }
}

/// Sending half of the engine inbox.
#[derive(Debug, Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineCommand>,
}

impl EngineHandle {
    /// Queue a command, waiting for inbox space.
    pub async fn send(&self, command: EngineCommand) -> Result<(), RunnerError> {
        self.tx
            .send(command)
            .await
            .map_err(|_closed| RunnerError::Closed)
    }

    /// Queue a command without waiting.
    pub fn try_send(&self, command: EngineCommand) -> Result<(), RunnerError> {
        self.tx.try_send(command).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => RunnerError::Full,
            mpsc::error::TrySendError::Closed(_) => RunnerError::Closed,
        })
    }
}

/// Create a bounded engine inbox holding up to `capacity` commands.
pub fn engine_channel(capacity: usize) -> (EngineHandle, mpsc::Receiver<EngineCommand>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (EngineHandle { tx }, rx)
}

/// Totals for a completed engine run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Commands applied.
    pub commands: u64,
    /// Ticks executed.
    pub ticks: u64,
    /// Ingestion counts across all commands.
    pub report: IngestReport,
}

/// Apply one command at `now`.
pub fn apply_command(
    engine: &mut IngestionEngine,
    command: &EngineCommand,
    now: i64,
) -> IngestReport {
    match command {
        EngineCommand::Waveforms(batch) => engine.ingest_waveforms(batch, now),
        EngineCommand::WaveformHistory(batches) => engine.ingest_waveform_history(batches, now),
        EngineCommand::Picks(picks) => engine.ingest_picks(picks, now),
        EngineCommand::PickHistory(batches) => engine.ingest_pick_history(batches, now),
    }
}

/// Run the engine until every [`EngineHandle`] is dropped.
///
/// The first tick fires one `tick_interval` after the call.
pub async fn run_engine(
    engine: &mut IngestionEngine,
    mut inbox: mpsc::Receiver<EngineCommand>,
    clock: &dyn Clock,
    tick_interval: Duration,
    sink: &mut dyn SnapshotSink,
) -> RunSummary {
    let mut summary = RunSummary::default();
    let start = Instant::now();
    let first_tick = start.checked_add(tick_interval).unwrap_or(start);
    let mut ticker = time::interval_at(first_tick, tick_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(
        tick_interval = ?tick_interval,
        stations = engine.station_count(),
        "Engine loop starting"
    );

    loop {
        tokio::select! {
            command = inbox.recv() => {
                let Some(command) = command else {
                    break;
                };
                let now = clock.now_ms();
                summary.report.merge(apply_command(engine, &command, now));
                summary.commands = summary.commands.saturating_add(1);

                let touched: Vec<DisplayState> = engine
                    .take_dirty()
                    .iter()
                    .filter_map(|code| engine.display_state(code.as_str(), now, None))
                    .collect();
                if !touched.is_empty() {
                    sink.on_ingest(now, touched);
                }
            }
            _ = ticker.tick() => {
                let now = clock.now_ms();
                let tick = engine.tick(now);
                // The tick publishes every station, so pending changes are covered.
                engine.take_dirty();
                sink.on_tick(&tick, engine.display_states(now), engine.intensities(now, None));
                summary.ticks = summary.ticks.saturating_add(1);
            }
        }
    }

    info!(
        commands = summary.commands,
        ticks = summary.ticks,
        accepted = summary.report.accepted,
        dropped = summary.report.dropped,
        "Engine inbox closed, loop stopped"
    );
    debug!(stations = engine.station_count(), "Final station count");
    summary
}
