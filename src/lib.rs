//! # trackflow: event propagation for tracking dataflows
//!
//! A runtime-configured graph of components exchanging timestamped
//! measurements (poses, positions, rotations, matrices) through typed push
//! and pull ports.
//!
//! ## Architecture
//!
//! - **measurement**: payload types, timestamps and the text codec
//! - **config**: graph descriptions, typed attribute access, binary settings
//! - **dataflow**: ports, the event queue, trigger components, expansion,
//!   modules, the factory and the built [`dataflow::Network`]
//! - **components**: leaf components (buffers, samplers, algebra, ...)
//! - **io**: calibration files, recordings and UDP transport
//!
//! ## Example
//!
//! ```ignore
//! use trackflow::{
//!     config::GraphConfig,
//!     dataflow::{ComponentFactory, DispatchMode, Network},
//! };
//!
//! let graph = GraphConfig::load("tracking.toml")?;
//! let factory = ComponentFactory::with_builtins();
//! let network = Network::build(&graph, &factory, DispatchMode::Inline)?;
//! network.start()?;
//! // ...
//! network.stop();
//! ```

pub mod components;
pub mod config;
pub mod dataflow;
pub mod error;
pub mod io;
pub mod measurement;

pub use config::{GraphConfig, Settings, SubgraphConfig};
pub use dataflow::{Component, ComponentFactory, DataflowError, DataflowResult, Network};
pub use error::{Result, TrackflowError};
pub use measurement::{Measurement, Timestamp};
