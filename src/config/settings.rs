//! Runtime settings for the `trackflow` binary.
//!
//! Settings are separate from the graph description: they control logging
//! and how the engine dispatches push events, not what the graph computes.
//!
//! ```toml
//! dispatch = "worker"
//! run_seconds = 30.0
//!
//! [logging]
//! filter = "info,trackflow=debug"
//! directory = "logs"
//! ```

use crate::dataflow::scheduler::DispatchMode;
use crate::error::{Result, TrackflowError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default `EnvFilter` directive when neither `RUST_LOG` nor the settings
/// file name one.
pub const DEFAULT_LOG_FILTER: &str = "info,trackflow=debug";

/// Default prefix of rolling log files.
pub const DEFAULT_LOG_FILE_PREFIX: &str = "trackflow.log";

/// Logging sinks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// `EnvFilter` directive.
    pub filter: String,

    /// Also write daily rolling log files into this directory.
    pub directory: Option<PathBuf>,

    pub file_prefix: String,

    /// Use ANSI colors on the terminal.
    pub ansi: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            filter: DEFAULT_LOG_FILTER.to_string(),
            directory: None,
            file_prefix: DEFAULT_LOG_FILE_PREFIX.to_string(),
            ansi: true,
        }
    }
}

/// Settings for one run of a graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub logging: LoggingSettings,

    /// How push events are delivered.
    pub dispatch: DispatchMode,

    /// Stop the network after this many seconds; run until stdin closes
    /// when unset.
    pub run_seconds: Option<f64>,
}

impl Settings {
    /// `run_seconds` as a duration. Negative, non-finite or overlong values
    /// are a configuration error.
    pub fn run_duration(&self) -> Result<Option<Duration>> {
        self.run_seconds
            .map(|secs| {
                Duration::try_from_secs_f64(secs)
                    .map_err(|e| TrackflowError::Config(format!("invalid run_seconds {secs}: {e}")))
            })
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.dispatch, DispatchMode::Inline);
        assert_eq!(settings.logging.filter, DEFAULT_LOG_FILTER);
        assert!(settings.run_seconds.is_none());
    }

    #[test]
    fn test_partial_toml() {
        let settings: Settings = toml::from_str(
            "dispatch = \"worker\"\n[logging]\ndirectory = \"logs\"\n",
        )
        .unwrap();
        assert_eq!(settings.dispatch, DispatchMode::Worker);
        assert_eq!(settings.logging.directory, Some(PathBuf::from("logs")));
        assert_eq!(settings.logging.file_prefix, DEFAULT_LOG_FILE_PREFIX);
    }

    #[test]
    fn test_run_duration() {
        let settings: Settings = toml::from_str("run_seconds = 2.5").unwrap();
        assert_eq!(settings.run_duration().unwrap(), Some(Duration::from_millis(2500)));
        assert_eq!(Settings::default().run_duration().unwrap(), None);
    }

    #[test]
    fn test_invalid_run_seconds_is_error() {
        for text in ["run_seconds = -1.0", "run_seconds = nan", "run_seconds = inf", "run_seconds = 1e300"] {
            let settings: Settings = toml::from_str(text).unwrap();
            assert!(
                matches!(settings.run_duration(), Err(TrackflowError::Config(_))),
                "{text} accepted"
            );
        }
    }
}
