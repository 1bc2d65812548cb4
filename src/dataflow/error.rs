//! Error types for the dataflow engine.
//!
//! Errors fall into three categories which determine how they are reported:
//! configuration errors abort graph construction or a component's current
//! operation, data errors are local to one push or pull, and I/O errors come
//! from files and sockets.

use std::fmt;
use thiserror::Error;

/// Coarse classification used as the `category` field in log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Data,
    Io,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Configuration => write!(f, "configuration"),
            ErrorCategory::Data => write!(f, "data"),
            ErrorCategory::Io => write!(f, "io"),
        }
    }
}

/// Errors raised while building or running a dataflow network.
#[derive(Error, Debug)]
pub enum DataflowError {
    // -- configuration --
    #[error("component {component}: missing attribute '{attribute}'")]
    MissingAttribute { component: String, attribute: String },

    #[error("component {component}: invalid attribute '{attribute}': {message}")]
    InvalidAttribute {
        component: String,
        attribute: String,
        message: String,
    },

    #[error("unknown component type '{0}'")]
    UnknownComponentType(String),

    #[error("unknown component '{0}'")]
    UnknownComponent(String),

    #[error("component {component} has no port '{port}'")]
    NoSuchPort { component: String, port: String },

    #[error("type mismatch on {port}: expected {expected}, found {found}")]
    TypeMismatch {
        port: String,
        expected: String,
        found: String,
    },

    #[error("cannot connect {from} to {to}: {message}")]
    ModeMismatch {
        from: String,
        to: String,
        message: String,
    },

    #[error("port {0} is already connected")]
    AlreadyConnected(String),

    // -- data --
    #[error("empty measurement")]
    EmptyMeasurement,

    #[error("port {0} is not connected")]
    NotConnected(String),

    #[error("no data: {0}")]
    NoData(String),

    #[error("too old: {0}")]
    TooOld(String),

    #[error("not enough data: {0}")]
    NotEnoughData(String),

    #[error("list size not 1 (got {0})")]
    ListSize(usize),

    #[error("Illegal number of correspondences: {0}")]
    IllegalCorrespondences(String),

    #[error("computation failed: {0}")]
    Compute(String),

    // -- I/O --
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("network error: {0}")]
    Network(String),
}

impl DataflowError {
    pub fn category(&self) -> ErrorCategory {
        use DataflowError::*;
        match self {
            MissingAttribute { .. }
            | InvalidAttribute { .. }
            | UnknownComponentType(_)
            | UnknownComponent(_)
            | NoSuchPort { .. }
            | TypeMismatch { .. }
            | ModeMismatch { .. }
            | AlreadyConnected(_)
            | IllegalCorrespondences(_) => ErrorCategory::Configuration,
            EmptyMeasurement
            | NotConnected(_)
            | NoData(_)
            | TooOld(_)
            | NotEnoughData(_)
            | ListSize(_)
            | Compute(_) => ErrorCategory::Data,
            Io(_) | Serialization(_) | Network(_) => ErrorCategory::Io,
        }
    }

    pub fn invalid_attribute(
        component: impl Into<String>,
        attribute: impl Into<String>,
        message: impl fmt::Display,
    ) -> Self {
        DataflowError::InvalidAttribute {
            component: component.into(),
            attribute: attribute.into(),
            message: message.to_string(),
        }
    }
}

impl From<serde_json::Error> for DataflowError {
    fn from(err: serde_json::Error) -> Self {
        DataflowError::Serialization(err.to_string())
    }
}

/// Result type alias for dataflow operations.
pub type DataflowResult<T> = std::result::Result<T, DataflowError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DataflowError::ListSize(2);
        assert_eq!(err.to_string(), "list size not 1 (got 2)");

        let err = DataflowError::TooOld("buffered measurement too old".into());
        assert!(err.to_string().contains("too old"));
    }

    #[test]
    fn test_error_categories() {
        assert_eq!(
            DataflowError::EmptyMeasurement.category(),
            ErrorCategory::Data
        );
        assert_eq!(
            DataflowError::UnknownComponentType("Foo".into()).category(),
            ErrorCategory::Configuration
        );
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert_eq!(DataflowError::from(io).category(), ErrorCategory::Io);
    }

    #[test]
    fn test_correspondence_message() {
        let err = DataflowError::IllegalCorrespondences("3 vs 4".into());
        assert!(err
            .to_string()
            .starts_with("Illegal number of correspondences"));
    }
}
