//! Knowledge graph model for a project's codebase.
//!
//! Nodes are keyed by identifier; edges reference nodes by identifier and are only
//! meaningful when both endpoints exist in the current node set. An edge with a
//! missing endpoint is dangling and must never reach the layout or rendering stage.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Kind of code entity a node stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GraphNodeType {
    File,
    Module,
    Component,
    Service,
    Function,
    Class,
}

impl GraphNodeType {
    /// Every node type, in display order.
    pub const ALL: [GraphNodeType; 6] = [
        GraphNodeType::File,
        GraphNodeType::Module,
        GraphNodeType::Component,
        GraphNodeType::Service,
        GraphNodeType::Function,
        GraphNodeType::Class,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            GraphNodeType::File => "file",
            GraphNodeType::Module => "module",
            GraphNodeType::Component => "component",
            GraphNodeType::Service => "service",
            GraphNodeType::Function => "function",
            GraphNodeType::Class => "class",
        }
    }
}

impl fmt::Display for GraphNodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A node in the knowledge graph.
///
/// Position and velocity belong to the layout service; the channel and reducers
/// carry them through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    pub label: String,
    #[serde(rename = "type")]
    pub node_type: GraphNodeType,
    /// Free-form metadata, e.g. `{"lines": 120}`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Map<String, serde_json::Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vx: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vy: Option<f64>,
}

impl GraphNode {
    /// Create a node with no metadata and no position.
    pub fn new(id: impl Into<String>, label: impl Into<String>, node_type: GraphNodeType) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            node_type,
            meta: None,
            x: None,
            y: None,
            vx: None,
            vy: None,
        }
    }

    /// Line count from metadata, when present.
    pub fn lines(&self) -> Option<u64> {
        self.meta.as_ref()?.get("lines")?.as_u64()
    }
}

/// A directed edge between two nodes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GraphEdge {
    pub from: String,
    pub to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl GraphEdge {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            label: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// The node and edge sets for one project.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeGraph {
    #[serde(default)]
    pub nodes: Vec<GraphNode>,
    #[serde(default)]
    pub edges: Vec<GraphEdge>,
}

impl KnowledgeGraph {
    pub fn new(nodes: Vec<GraphNode>, edges: Vec<GraphEdge>) -> Self {
        Self { nodes, edges }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }

    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn contains_node(&self, id: &str) -> bool {
        self.nodes.iter().any(|n| n.id == id)
    }

    /// Edges whose endpoints both exist in the node set.
    pub fn valid_edges(&self) -> Vec<&GraphEdge> {
        let ids: HashSet<&str> = self.nodes.iter().map(|n| n.id.as_str()).collect();
        self.edges
            .iter()
            .filter(|e| ids.contains(e.from.as_str()) && ids.contains(e.to.as_str()))
            .collect()
    }

    /// Number of edges that reference a missing node.
    pub fn dangling_edge_count(&self) -> usize {
        self.edges.len() - self.valid_edges().len()
    }

    /// Copy of this graph with dangling edges dropped and repeated node ids
    /// collapsed to their first occurrence, fit for layout and rendering.
    pub fn renderable(&self) -> KnowledgeGraph {
        let mut seen = HashSet::new();
        KnowledgeGraph {
            nodes: self
                .nodes
                .iter()
                .filter(|n| seen.insert(n.id.as_str()))
                .cloned()
                .collect(),
            edges: self.valid_edges().into_iter().cloned().collect(),
        }
    }
}
