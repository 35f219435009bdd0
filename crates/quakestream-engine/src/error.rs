//! Error types for the engine binary.
//!
//! [`EngineError`] is the top-level error type that wraps all possible
//! failure modes during startup and while the feed runs.

/// Top-level error for the engine binary.
///
/// Each variant wraps a specific subsystem error, providing a single
/// error type that `main` can propagate with `?`.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: quakestream_core::config::ConfigError,
    },

    /// The read API server failed to start or stopped.
    #[error("server error: {source}")]
    Server {
        /// The underlying server error.
        #[from]
        source: quakestream_observer::ServerError,
    },

    /// The engine task stopped while the feed was still sending.
    #[error("runner error: {source}")]
    Runner {
        /// The underlying runner error.
        #[from]
        source: quakestream_core::runner::RunnerError,
    },

    /// Reading the feed failed.
    #[error("I/O error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// A spawned task panicked or was cancelled.
    #[error("task error: {source}")]
    Task {
        /// The underlying join error.
        #[from]
        source: tokio::task::JoinError,
    },
}
