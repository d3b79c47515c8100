//! Knowledge-graph reducer and node selection.

use tracing::debug;

use super::Reducer;
use crate::layout::LayoutService;
use crate::live::ChannelEvent;
use crate::models::{GraphNode, KnowledgeGraph};
use crate::{Error, Result};

/// Latest graph snapshot for a project plus the locally selected node.
///
/// Each `graph:update` replaces the held graph wholesale. Selection survives a
/// replacement only while the selected node is still in the new snapshot.
#[derive(Debug, Clone)]
pub struct GraphReducer {
    project_id: String,
    graph: KnowledgeGraph,
    selected: Option<String>,
    snapshots: u64,
}

impl GraphReducer {
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            graph: KnowledgeGraph::default(),
            selected: None,
            snapshots: 0,
        }
    }

    /// Replace the held graph.
    pub fn replace(&mut self, graph: KnowledgeGraph) {
        if let Some(id) = &self.selected {
            if !graph.contains_node(id) {
                debug!(project_id = %self.project_id, node = %id, "selected node left the graph");
                self.selected = None;
            }
        }
        self.graph = graph;
        self.snapshots += 1;
    }

    /// The graph exactly as last received, dangling edges included.
    pub fn graph(&self) -> &KnowledgeGraph {
        &self.graph
    }

    /// Snapshots applied so far
    pub fn snapshots(&self) -> u64 {
        self.snapshots
    }

    /// What may be handed to layout and rendering.
    pub fn render_graph(&self) -> KnowledgeGraph {
        self.graph.renderable()
    }

    /// Position the renderable graph with `layout`.
    pub fn layout(&self, layout: &mut dyn LayoutService) -> KnowledgeGraph {
        layout.layout(&self.render_graph())
    }

    pub fn selected_id(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    pub fn selected_node(&self) -> Option<&GraphNode> {
        self.graph.node(self.selected.as_deref()?)
    }

    pub fn select_node(&mut self, node_id: &str) -> Result<()> {
        if !self.graph.contains_node(node_id) {
            return Err(Error::NotFound(format!("node {}", node_id)));
        }
        self.selected = Some(node_id.to_string());
        Ok(())
    }

    /// Select `node_id`, or clear the selection if it is already selected.
    ///
    /// Returns the selection afterwards.
    pub fn toggle_node(&mut self, node_id: &str) -> Result<Option<&str>> {
        if self.selected.as_deref() == Some(node_id) {
            self.selected = None;
        } else {
            self.select_node(node_id)?;
        }
        Ok(self.selected_id())
    }

    pub fn clear_selection(&mut self) {
        self.selected = None;
    }
}

impl Reducer for GraphReducer {
    fn project_id(&self) -> &str {
        &self.project_id
    }

    fn apply(&mut self, event: &ChannelEvent) {
        if let ChannelEvent::GraphUpdate(update) = event {
            if update.project_id == self.project_id {
                self.replace(update.graph.clone());
            }
        }
    }
}
