//! Configuration for trackflow.
//!
//! This module handles:
//! - Graph descriptions (`.toml` or `.json`) listing component instances,
//!   their attributes and edges
//! - Typed attribute access for component constructors
//! - Runtime settings of the binary (logging, dispatch mode)
//!
//! # Example
//!
//! ```ignore
//! use trackflow::config::{GraphConfig, Settings};
//!
//! let graph = GraphConfig::load("tracking.toml")?;
//! let settings = Settings::load("settings.toml")?;
//! ```

pub mod attributes;
pub mod graph;
pub mod settings;

pub use attributes::{AttributeValue, Attributes};
pub use graph::{EdgeConfig, EdgeDirection, EdgeMode, EdgeRef, GraphConfig, SubgraphConfig};
pub use settings::{LoggingSettings, Settings};

use crate::error::{Result, TrackflowError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;

/// UDP port network modules listen on when `networkPort` is not set.
pub const DEFAULT_NETWORK_PORT: u16 = 0x5554;

/// Minimum interval between two writes of a calibration file.
pub const CALIB_WRITE_INTERVAL_NS: u64 = 975_000_000;

/// Delay between starting the player module and the first replayed event.
pub const PLAYBACK_START_DELAY_MS: u64 = 2000;

/// Samples kept by interpolation components.
pub const INTERPOLATION_HISTORY: usize = 50;

/// Serialization format, chosen by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Toml,
    Json,
}

impl FileFormat {
    pub fn from_path(path: &Path) -> Result<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Ok(FileFormat::Toml),
            Some("json") => Ok(FileFormat::Json),
            _ => Err(TrackflowError::Config(format!(
                "Unsupported file extension for {:?} (expected .toml or .json)",
                path
            ))),
        }
    }
}

fn load_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let format = FileFormat::from_path(path)?;
    let content = std::fs::read_to_string(path)
        .map_err(|e| TrackflowError::Config(format!("Failed to read {:?}: {}", path, e)))?;

    match format {
        FileFormat::Toml => toml::from_str(&content)
            .map_err(|e| TrackflowError::Config(format!("Failed to parse {:?}: {}", path, e))),
        FileFormat::Json => serde_json::from_str(&content)
            .map_err(|e| TrackflowError::Config(format!("Failed to parse {:?}: {}", path, e))),
    }
}

fn save_file<T: Serialize>(value: &T, path: &Path) -> Result<()> {
    let content = match FileFormat::from_path(path)? {
        FileFormat::Toml => toml::to_string_pretty(value)
            .map_err(|e| TrackflowError::Serialization(e.to_string()))?,
        FileFormat::Json => serde_json::to_string_pretty(value)
            .map_err(|e| TrackflowError::Serialization(e.to_string()))?,
    };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| {
                TrackflowError::Config(format!("Failed to create directory {:?}: {}", parent, e))
            })?;
        }
    }

    std::fs::write(path, content)
        .map_err(|e| TrackflowError::Config(format!("Failed to write {:?}: {}", path, e)))
}

impl GraphConfig {
    /// Load a graph description; the format follows the file extension.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        load_file(path.as_ref())
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        save_file(self, path.as_ref())
    }
}

impl Settings {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let settings: Self = load_file(path.as_ref())?;
        settings.run_duration()?;
        Ok(settings)
    }

    /// Load settings, returning defaults on any error.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load settings, using defaults: {}", e);
            Self::default()
        })
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        save_file(self, path.as_ref())
    }
}
