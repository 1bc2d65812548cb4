//! Error handling for trackflow
//!
//! This module defines the crate-level error type and a Result alias used by
//! configuration loading and the binary. Errors raised inside the dataflow
//! engine are [`DataflowError`]s and convert into [`TrackflowError`].

use crate::dataflow::error::DataflowError;
use thiserror::Error;

/// Main error type for trackflow operations
#[derive(Error, Debug)]
pub enum TrackflowError {
    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// Errors raised while building or running a network
    #[error("Dataflow error: {0}")]
    Dataflow(#[from] DataflowError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<TrackflowError>,
    },
}

impl TrackflowError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        TrackflowError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }
}

/// Result type alias for trackflow operations
pub type Result<T> = std::result::Result<T, TrackflowError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, DataflowError> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| TrackflowError::from(e).with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| TrackflowError::from(e).with_context(f()))
    }
}
