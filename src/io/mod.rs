//! File and network adapters.
//!
//! These components move measurements across the process boundary: single
//! calibration values kept in files, recordings replayed at their original
//! pace, and UDP datagrams. All of them use the text encoding of
//! [`crate::measurement::codec`].

pub mod calib;
pub mod network;
pub mod player;
pub mod recorder;

use crate::config::SubgraphConfig;
use crate::dataflow::{ComponentFactory, DataflowError, DataflowResult};
use std::path::PathBuf;

/// Register every file and network component.
pub fn register_all(factory: &mut ComponentFactory) {
    calib::register(factory);
    recorder::register(factory);
    player::register(factory);
    network::register(factory);
}

/// The `file` attribute of `edge`, or of the component itself.
pub(crate) fn file_attribute(config: &SubgraphConfig, edge: &str) -> DataflowResult<PathBuf> {
    config
        .edge_text(edge, "file")
        .or_else(|| config.attributes.text("file"))
        .filter(|f| !f.trim().is_empty())
        .map(PathBuf::from)
        .ok_or_else(|| DataflowError::MissingAttribute {
            component: config.id.clone(),
            attribute: "file".to_string(),
        })
}
