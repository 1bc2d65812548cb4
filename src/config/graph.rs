//! Graph description consumed by component constructors.
//!
//! A [`GraphConfig`] lists component instances. Each [`SubgraphConfig`] names
//! its class (the factory key), carries an attribute bag and declares its
//! edges. Input edges name the producing component's output edge in
//! `source`, which is how the network wires ports together.
//!
//! ```toml
//! [[component]]
//! id = "buffer"
//! class = "PoseBuffer"
//! attributes = { maxAge = 100 }
//!
//! [[component.edge]]
//! name = "Input"
//! direction = "input"
//! mode = "push"
//! source = "tracker.Output"
//!
//! [[component.edge]]
//! name = "Output"
//! direction = "output"
//! mode = "pull"
//! ```

use super::attributes::{AttributeValue, Attributes};
use crate::dataflow::error::{DataflowError, DataflowResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Whether an edge enters or leaves the component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeDirection {
    Input,
    Output,
}

/// Push or pull delivery on an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeMode {
    Push,
    Pull,
}

impl fmt::Display for EdgeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EdgeMode::Push => write!(f, "push"),
            EdgeMode::Pull => write!(f, "pull"),
        }
    }
}

/// Reference to an edge of another component, written `component.edge`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EdgeRef {
    pub component: String,
    pub edge: String,
}

impl EdgeRef {
    pub fn new(component: impl Into<String>, edge: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            edge: edge.into(),
        }
    }
}

impl TryFrom<String> for EdgeRef {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.rsplit_once('.') {
            Some((component, edge)) if !component.is_empty() && !edge.is_empty() => {
                Ok(EdgeRef::new(component, edge))
            }
            _ => Err(format!("edge reference '{value}' is not of the form component.edge")),
        }
    }
}

impl From<EdgeRef> for String {
    fn from(value: EdgeRef) -> Self {
        value.to_string()
    }
}

impl fmt::Display for EdgeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.component, self.edge)
    }
}

/// One edge of a component instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeConfig {
    pub name: String,
    pub direction: EdgeDirection,
    pub mode: EdgeMode,
    /// Producing edge, for inputs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<EdgeRef>,
    /// Input edge that must be delivered before this one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<EdgeRef>,
    #[serde(default, skip_serializing_if = "Attributes::is_empty")]
    pub attributes: Attributes,
}

/// Configuration of one component instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubgraphConfig {
    pub id: String,
    pub class: String,
    #[serde(default, skip_serializing_if = "Attributes::is_empty")]
    pub attributes: Attributes,
    #[serde(default, rename = "edge")]
    pub edges: Vec<EdgeConfig>,
}

impl SubgraphConfig {
    pub fn new(id: impl Into<String>, class: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            class: class.into(),
            attributes: Attributes::new(),
            edges: Vec::new(),
        }
    }

    pub fn with_attribute(mut self, key: &str, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(key, value);
        self
    }

    /// Add an input edge fed from `source` (`component.edge`).
    pub fn with_input(mut self, name: &str, mode: EdgeMode, source: &str) -> Self {
        self.edges.push(EdgeConfig {
            name: name.to_string(),
            direction: EdgeDirection::Input,
            mode,
            source: EdgeRef::try_from(source.to_string()).ok(),
            after: None,
            attributes: Attributes::new(),
        });
        self
    }

    /// Add an input edge without a producer.
    pub fn with_open_input(mut self, name: &str, mode: EdgeMode) -> Self {
        self.edges.push(EdgeConfig {
            name: name.to_string(),
            direction: EdgeDirection::Input,
            mode,
            source: None,
            after: None,
            attributes: Attributes::new(),
        });
        self
    }

    pub fn with_output(mut self, name: &str, mode: EdgeMode) -> Self {
        self.edges.push(EdgeConfig {
            name: name.to_string(),
            direction: EdgeDirection::Output,
            mode,
            source: None,
            after: None,
            attributes: Attributes::new(),
        });
        self
    }

    /// Attach an attribute to the most recently added edge.
    pub fn with_edge_attribute(mut self, key: &str, value: impl Into<AttributeValue>) -> Self {
        if let Some(edge) = self.edges.last_mut() {
            edge.attributes.insert(key, value);
        }
        self
    }

    /// Mark the most recently added edge as delivered after `after`.
    pub fn delivered_after(mut self, after: &str) -> Self {
        if let Some(edge) = self.edges.last_mut() {
            edge.after = EdgeRef::try_from(after.to_string()).ok();
        }
        self
    }

    pub fn edge(&self, name: &str) -> Option<&EdgeConfig> {
        self.edges.iter().find(|e| e.name == name)
    }

    pub fn has_edge(&self, name: &str) -> bool {
        self.edge(name).is_some()
    }

    pub fn inputs(&self) -> impl Iterator<Item = &EdgeConfig> {
        self.edges
            .iter()
            .filter(|e| e.direction == EdgeDirection::Input)
    }

    pub fn outputs(&self) -> impl Iterator<Item = &EdgeConfig> {
        self.edges
            .iter()
            .filter(|e| e.direction == EdgeDirection::Output)
    }

    /// Mode of a named edge, or `default` if the edge is not configured.
    pub fn edge_mode(&self, name: &str, default: EdgeMode) -> EdgeMode {
        self.edge(name).map_or(default, |e| e.mode)
    }

    fn invalid(&self, key: &str, message: String) -> DataflowError {
        DataflowError::invalid_attribute(&self.id, key, message)
    }

    /// Optional typed attribute.
    pub fn attr<T>(&self, key: &str) -> DataflowResult<Option<T>>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        self.attributes
            .parse(key)
            .map_err(|message| self.invalid(key, message))
    }

    /// Typed attribute with a default.
    pub fn attr_or<T>(&self, key: &str, default: T) -> DataflowResult<T>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        Ok(self.attr(key)?.unwrap_or(default))
    }

    /// Required typed attribute.
    pub fn require<T>(&self, key: &str) -> DataflowResult<T>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        self.attr(key)?
            .ok_or_else(|| DataflowError::MissingAttribute {
                component: self.id.clone(),
                attribute: key.to_string(),
            })
    }

    /// First character of a text attribute, e.g. button keys.
    pub fn attr_char(&self, key: &str, default: char) -> DataflowResult<char> {
        match self.attributes.text(key) {
            None => Ok(default),
            Some(text) => text
                .chars()
                .next()
                .ok_or_else(|| self.invalid(key, "empty value".to_string())),
        }
    }

    /// Attribute of an edge, falling back to `default` if either is absent.
    pub fn edge_attr_or<T>(&self, edge: &str, key: &str, default: T) -> DataflowResult<T>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        match self.edge(edge) {
            None => Ok(default),
            Some(e) => Ok(e
                .attributes
                .parse(key)
                .map_err(|message| self.invalid(key, message))?
                .unwrap_or(default)),
        }
    }

    /// Text attribute of an edge.
    pub fn edge_text(&self, edge: &str, key: &str) -> Option<String> {
        self.edge(edge).and_then(|e| e.attributes.text(key))
    }

    /// Whitespace separated numbers from an edge attribute, falling back to
    /// the component attribute of the same key.
    pub fn numbers(&self, edge: &str, key: &str) -> DataflowResult<Option<Vec<f64>>> {
        let from_edge = match self.edge(edge) {
            Some(e) => e
                .attributes
                .numbers(key)
                .map_err(|message| self.invalid(key, message))?,
            None => None,
        };
        match from_edge {
            Some(values) => Ok(Some(values)),
            None => self
                .attributes
                .numbers(key)
                .map_err(|message| self.invalid(key, message)),
        }
    }
}

/// A complete dataflow graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphConfig {
    #[serde(default, rename = "component")]
    pub components: Vec<SubgraphConfig>,
}

impl GraphConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, component: SubgraphConfig) -> Self {
        self.components.push(component);
        self
    }

    pub fn component(&self, id: &str) -> Option<&SubgraphConfig> {
        self.components.iter().find(|c| c.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GRAPH: &str = r#"
[[component]]
id = "buffer"
class = "PoseBuffer"
attributes = { maxAge = 100 }

[[component.edge]]
name = "Input"
direction = "input"
mode = "push"
source = "tracker.Output"

[[component.edge]]
name = "Output"
direction = "output"
mode = "pull"
"#;

    #[test]
    fn test_parse_toml_graph() {
        let graph: GraphConfig = toml::from_str(GRAPH).unwrap();
        let buffer = graph.component("buffer").unwrap();
        assert_eq!(buffer.class, "PoseBuffer");
        assert_eq!(buffer.require::<u64>("maxAge").unwrap(), 100);

        let input = buffer.edge("Input").unwrap();
        assert_eq!(input.mode, EdgeMode::Push);
        assert_eq!(input.source, Some(EdgeRef::new("tracker", "Output")));
        assert_eq!(buffer.outputs().count(), 1);
    }

    #[test]
    fn test_edge_ref_rejects_malformed() {
        assert!(EdgeRef::try_from("nodot".to_string()).is_err());
        assert!(EdgeRef::try_from(".Output".to_string()).is_err());
        let r = EdgeRef::try_from("a.b.Output".to_string()).unwrap();
        assert_eq!(r.component, "a.b");
        assert_eq!(r.edge, "Output");
    }

    #[test]
    fn test_missing_attribute() {
        let cfg = SubgraphConfig::new("writer", "PoseCalibWriter");
        let err = cfg.require::<String>("file").unwrap_err();
        assert!(matches!(err, DataflowError::MissingAttribute { .. }));
        assert!(err.to_string().contains("writer"));
    }

    #[test]
    fn test_builder_and_json_round_trip() {
        let graph = GraphConfig::new().with(
            SubgraphConfig::new("player", "PlayerPose")
                .with_output("Output", EdgeMode::Push)
                .with_edge_attribute("file", "poses.log")
                .with_edge_attribute("speedup", 2.0),
        );
        let json = serde_json::to_string(&graph).unwrap();
        let back: GraphConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, graph);
        let player = back.component("player").unwrap();
        assert_eq!(player.edge_text("Output", "file").as_deref(), Some("poses.log"));
        assert_eq!(player.edge_attr_or("Output", "speedup", 1.0).unwrap(), 2.0);
    }

    #[test]
    fn test_attr_char() {
        let cfg = SubgraphConfig::new("gate", "PoseGate").with_attribute("button", "x");
        assert_eq!(cfg.attr_char("button", ' ').unwrap(), 'x');
        assert_eq!(cfg.attr_char("other", ' ').unwrap(), ' ');
    }
}
