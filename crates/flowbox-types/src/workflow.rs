//! Workflow domain types for flowbox.
//!
//! Defines the parsed description structure handed over by the loading
//! collaborator (`ParsedWorkflow`), the box and connection definitions it is
//! made of, and the render-ready projection (`WorkflowView`) returned to the
//! presentation layer after a successful load.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A JSON object keyed by string. Box inputs and outputs are always mappings.
pub type ValueMap = serde_json::Map<String, serde_json::Value>;

/// Display-only positions keyed by box id. Never interpreted by the engine.
pub type Layout = BTreeMap<String, LayoutPosition>;

// ---------------------------------------------------------------------------
// Parsed description
// ---------------------------------------------------------------------------

/// The parsed workflow description.
///
/// Produced by the description-loading collaborator and treated as lexically
/// valid. Structural validation happens when the graph is built.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedWorkflow {
    /// Boxes in declaration order. Declaration order is the execution tie-break.
    #[serde(default)]
    pub boxes: Vec<BoxDefinition>,
    /// Connections in declaration order.
    #[serde(default)]
    pub connections: Vec<ConnectionDefinition>,
    /// Optional canvas positions, round-tripped opaquely.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub layout: Layout,
}

/// A named unit of work with declared inputs and a code body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoxDefinition {
    /// Unique, case-sensitive identifier.
    pub id: String,
    /// Declared input names. Order is for display only.
    #[serde(default)]
    pub inputs: Vec<String>,
    /// Opaque code body evaluated by the box engine.
    pub code: String,
    /// Free-form description shown next to the box.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

impl BoxDefinition {
    pub fn new(id: impl Into<String>, inputs: &[&str], code: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            inputs: inputs.iter().map(|s| s.to_string()).collect(),
            code: code.into(),
            description: String::new(),
        }
    }

    /// Whether `name` is among this box's declared inputs.
    pub fn declares_input(&self, name: &str) -> bool {
        self.inputs.iter().any(|i| i == name)
    }
}

/// A directed data binding: the whole output of `source` feeds `target_input`
/// of `target`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionDefinition {
    pub source: String,
    pub target: String,
    pub target_input: String,
}

impl ConnectionDefinition {
    pub fn new(
        source: impl Into<String>,
        target: impl Into<String>,
        target_input: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            target_input: target_input.into(),
        }
    }
}

/// Canvas position of a box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LayoutPosition {
    pub x: f64,
    pub y: f64,
}

// ---------------------------------------------------------------------------
// Render-ready projection
// ---------------------------------------------------------------------------

/// What the presentation layer receives after a successful load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowView {
    pub nodes: Vec<NodeView>,
    pub edges: Vec<EdgeView>,
    pub layout: Layout,
}

/// A box as shown on the canvas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeView {
    pub id: String,
    pub inputs: Vec<String>,
    pub code: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// Input name -> source box id, for every bound input.
    pub input_sources: BTreeMap<String, String>,
    /// Boxes fed by this one, in declaration order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub downstream: Vec<String>,
}

/// A connection as shown on the canvas.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeView {
    pub source: String,
    pub target: String,
    pub target_input: String,
}

impl From<&ConnectionDefinition> for EdgeView {
    fn from(c: &ConnectionDefinition) -> Self {
        Self {
            source: c.source.clone(),
            target: c.target.clone(),
            target_input: c.target_input.clone(),
        }
    }
}
