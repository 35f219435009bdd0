//! Configuration loading and typed config structures for the station engine.
//!
//! The canonical configuration lives in `quakestream-config.yaml`. This
//! module defines strongly-typed structs that mirror the YAML structure,
//! and provides a loader that reads and validates the file. Every field
//! has a default, so an empty document is a valid configuration.

use std::path::Path;

use serde::Deserialize;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// The configuration parsed but violates a constraint.
    #[error("invalid configuration: {reason}")]
    Invalid {
        /// Explanation of what is wrong with the configuration.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level configuration.
///
/// Mirrors the structure of `quakestream-config.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct QuakeConfig {
    /// Retention, statistics, and tick settings.
    #[serde(default)]
    pub engine: EngineConfig,

    /// Display amplitude auto-scaling constants.
    #[serde(default)]
    pub display_scale: DisplayScaleConfig,

    /// Read API listener settings.
    #[serde(default)]
    pub observer: ObserverConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl QuakeConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// The `OBSERVER_PORT` environment variable overrides
    /// `observer.port` when set to a valid port number.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if the content is not valid YAML, or
    /// [`ConfigError::Invalid`] if validation fails.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML, or
    /// [`ConfigError::Invalid`] if validation fails.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let mut config: Self = if yaml.trim().is_empty() {
            Self::default()
        } else {
            serde_yml::from_str(yaml)?
        };
        config.observer.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first violated constraint.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let engine = &self.engine;
        if engine.retention_window_ms <= 0 {
            return Err(invalid("engine.retention_window_ms must be positive"));
        }
        if engine.statistics_window_ms <= 0 {
            return Err(invalid("engine.statistics_window_ms must be positive"));
        }
        if engine.statistics_window_ms > engine.retention_window_ms {
            return Err(invalid(
                "engine.statistics_window_ms must not exceed engine.retention_window_ms",
            ));
        }
        if engine.tick_interval_ms == 0 {
            return Err(invalid("engine.tick_interval_ms must be at least 1"));
        }
        if engine.pick_match_epsilon_ms < 0 {
            return Err(invalid("engine.pick_match_epsilon_ms must not be negative"));
        }
        if engine.inbox_capacity == 0 {
            return Err(invalid("engine.inbox_capacity must be at least 1"));
        }
        if engine.max_stations == Some(0) {
            return Err(invalid("engine.max_stations must be at least 1"));
        }
        if engine.station_idle_timeout_ms.is_some_and(|ms| ms <= 0) {
            return Err(invalid("engine.station_idle_timeout_ms must be positive"));
        }

        let scale = &self.display_scale;
        let gains_ok = scale.rms_gain.is_finite()
            && scale.rms_gain >= 0.0
            && scale.max_abs_gain.is_finite()
            && scale.max_abs_gain >= 0.0;
        if !gains_ok {
            return Err(invalid("display_scale gains must be finite and non-negative"));
        }
        if !(scale.floor.is_finite() && scale.floor > 0.0) {
            return Err(invalid("display_scale.floor must be positive"));
        }
        if !(scale.empty_scale.is_finite() && scale.empty_scale > 0.0) {
            return Err(invalid("display_scale.empty_scale must be positive"));
        }
        Ok(())
    }
}

/// Build a [`ConfigError::Invalid`] from a static reason.
fn invalid(reason: &str) -> ConfigError {
    ConfigError::Invalid {
        reason: reason.to_owned(),
    }
}

/// Retention, statistics, and tick configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EngineConfig {
    /// Maximum age of segments, PGA samples, and picks (ms).
    #[serde(default = "default_retention_window_ms")]
    pub retention_window_ms: i64,

    /// Trailing window used for amplitude auto-scaling (ms).
    #[serde(default = "default_statistics_window_ms")]
    pub statistics_window_ms: i64,

    /// Real-time milliseconds between eviction ticks.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Two picks on one channel closer than this are the same arrival (ms).
    #[serde(default = "default_pick_match_epsilon_ms")]
    pub pick_match_epsilon_ms: i64,

    /// Channel component that feeds the waveform buffer (last character of
    /// the channel code). `None` accepts every channel.
    #[serde(default = "default_vertical_component")]
    pub vertical_component: Option<char>,

    /// Remove stations that received nothing for this long (ms).
    #[serde(default)]
    pub station_idle_timeout_ms: Option<i64>,

    /// Keep at most this many stations, dropping the least recently active.
    #[serde(default)]
    pub max_stations: Option<usize>,

    /// Bounded capacity of the engine command inbox.
    #[serde(default = "default_inbox_capacity")]
    pub inbox_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            retention_window_ms: default_retention_window_ms(),
            statistics_window_ms: default_statistics_window_ms(),
            tick_interval_ms: default_tick_interval_ms(),
            pick_match_epsilon_ms: default_pick_match_epsilon_ms(),
            vertical_component: default_vertical_component(),
            station_idle_timeout_ms: None,
            max_stations: None,
            inbox_capacity: default_inbox_capacity(),
        }
    }
}

/// Display amplitude auto-scaling constants.
///
/// `scale = max(rms * rms_gain, max_abs * max_abs_gain, floor)` over the
/// statistics window; `empty_scale` when no data remains. Setting
/// `max_abs_gain` to 0 gives the RMS-only variant.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DisplayScaleConfig {
    /// Multiplier on the windowed RMS (K).
    #[serde(default = "default_rms_gain")]
    pub rms_gain: f64,

    /// Multiplier on the windowed maximum absolute value (Kmax).
    #[serde(default = "default_max_abs_gain")]
    pub max_abs_gain: f64,

    /// Lower bound on the scale.
    #[serde(default = "default_floor")]
    pub floor: f64,

    /// Scale reported for a station with no retained data.
    #[serde(default = "default_empty_scale")]
    pub empty_scale: f64,
}

impl Default for DisplayScaleConfig {
    fn default() -> Self {
        Self {
            rms_gain: default_rms_gain(),
            max_abs_gain: default_max_abs_gain(),
            floor: default_floor(),
            empty_scale: default_empty_scale(),
        }
    }
}

/// Read API listener configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ObserverConfig {
    /// Host address to bind.
    #[serde(default = "default_observer_host")]
    pub host: String,

    /// TCP port to listen on.
    #[serde(default = "default_observer_port")]
    pub port: u16,
}

impl ObserverConfig {
    /// Override the port with `OBSERVER_PORT` when it is set and valid.
    pub fn apply_env_overrides(&mut self) {
        if let Some(port) = std::env::var("OBSERVER_PORT")
            .ok()
            .and_then(|val| val.parse().ok())
        {
            self.port = port;
        }
    }
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            host: default_observer_host(),
            port: default_observer_port(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error), used when `RUST_LOG`
    /// is not set.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

const fn default_retention_window_ms() -> i64 {
    120_000
}

const fn default_statistics_window_ms() -> i64 {
    10_000
}

const fn default_tick_interval_ms() -> u64 {
    1_000
}

const fn default_pick_match_epsilon_ms() -> i64 {
    100
}

#[allow(clippy::unnecessary_wraps)]
const fn default_vertical_component() -> Option<char> {
    Some('Z')
}

const fn default_inbox_capacity() -> usize {
    1_024
}

const fn default_rms_gain() -> f64 {
    4.0
}

const fn default_max_abs_gain() -> f64 {
    0.3
}

const fn default_floor() -> f64 {
    0.05
}

const fn default_empty_scale() -> f64 {
    1.0
}

fn default_observer_host() -> String {
    "0.0.0.0".to_owned()
}

const fn default_observer_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_owned()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config = QuakeConfig::parse("").unwrap();
        assert_eq!(config.engine.retention_window_ms, 120_000);
        assert_eq!(config.engine.statistics_window_ms, 10_000);
        assert_eq!(config.engine.tick_interval_ms, 1_000);
        assert_eq!(config.engine.pick_match_epsilon_ms, 100);
        assert_eq!(config.engine.vertical_component, Some('Z'));
        assert!((config.display_scale.rms_gain - 4.0).abs() < f64::EPSILON);
        assert!((config.display_scale.max_abs_gain - 0.3).abs() < f64::EPSILON);
        assert!((config.display_scale.floor - 0.05).abs() < f64::EPSILON);
    }

    #[test]
    fn partial_document_overrides_fields() {
        let yaml = r"
engine:
  retention_window_ms: 60000
  vertical_component: null
  max_stations: 500
display_scale:
  rms_gain: 5.0
  max_abs_gain: 0.0
";
        let config = QuakeConfig::parse(yaml).unwrap();
        assert_eq!(config.engine.retention_window_ms, 60_000);
        assert_eq!(config.engine.statistics_window_ms, 10_000);
        assert_eq!(config.engine.vertical_component, None);
        assert_eq!(config.engine.max_stations, Some(500));
        assert!((config.display_scale.rms_gain - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn statistics_window_larger_than_retention_is_rejected() {
        let yaml = r"
engine:
  retention_window_ms: 5000
  statistics_window_ms: 10000
";
        let err = QuakeConfig::parse(yaml).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn non_positive_floor_is_rejected() {
        let yaml = r"
display_scale:
  floor: 0.0
";
        assert!(matches!(
            QuakeConfig::parse(yaml),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn zero_max_stations_is_rejected() {
        let yaml = r"
engine:
  max_stations: 0
";
        let err = QuakeConfig::parse(yaml).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
        assert!(QuakeConfig::parse("engine:\n  max_stations: 1\n").is_ok());
    }

    #[test]
    fn shipped_config_matches_defaults() {
        let shipped = QuakeConfig::parse(include_str!("../../../quakestream-config.yaml")).unwrap();
        assert_eq!(shipped, QuakeConfig::parse("").unwrap());
    }

    #[test]
    fn malformed_yaml_is_a_yaml_error() {
        let err = QuakeConfig::parse("engine: [unterminated").unwrap_err();
        assert!(matches!(err, ConfigError::Yaml { .. }));
    }
}
