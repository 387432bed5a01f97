//! Workflow definition: the immutable graph handed to a run.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// WorkflowDefinition: top-level graph
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    /// Workflow identifier.
    #[serde(default = "default_id")]
    pub id: String,

    /// Human-readable name.
    #[serde(default)]
    pub name: String,

    /// Nodes in definition order.
    pub nodes: Vec<NodeDefinition>,

    /// Edges connecting nodes.
    #[serde(default)]
    pub edges: Vec<EdgeDefinition>,
}

fn default_id() -> String {
    Uuid::new_v4().to_string()
}

impl Default for WorkflowDefinition {
    fn default() -> Self {
        Self {
            id: default_id(),
            name: String::new(),
            nodes: Vec::new(),
            edges: Vec::new(),
        }
    }
}

impl WorkflowDefinition {
    pub fn node(&self, node_id: &str) -> Option<&NodeDefinition> {
        self.nodes.iter().find(|n| n.id == node_id)
    }

    /// Edges whose target is `node_id`, in definition order.
    pub fn incoming_edges<'a>(
        &'a self,
        node_id: &'a str,
    ) -> impl Iterator<Item = &'a EdgeDefinition> + 'a {
        self.edges.iter().filter(move |e| e.target == node_id)
    }
}

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDefinition {
    pub id: String,

    /// Node type tag (e.g. "llm", "http", "condition").
    #[serde(rename = "type")]
    pub node_type: String,

    /// UI-only position hint.
    #[serde(default)]
    pub position: Option<Position>,

    /// Opaque node configuration.
    #[serde(default, alias = "data")]
    pub config: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

// ---------------------------------------------------------------------------
// Edge
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeDefinition {
    #[serde(default = "default_id")]
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(default, rename = "sourceHandle", alias = "source_handle")]
    pub source_handle: Option<String>,
    #[serde(default, rename = "targetHandle", alias = "target_handle")]
    pub target_handle: Option<String>,
    /// Opaque edge payload.
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
