//! Node positioning for the knowledge graph.
//!
//! The reducers treat layout as an opaque service: they hand over a renderable graph
//! (no dangling edges) and get the same graph back with `x`/`y`/`vx`/`vy` filled in.
//! [`ForceLayout`] is the bundled implementation, a small force-directed simulation:
//!
//! - gravity pulls every node toward the center
//! - nodes repel each other (inverse square)
//! - edges act as springs around a resting length
//! - velocity is damped and capped each step
//!
//! Module nodes are heavy anchors: weak gravity, low speed cap. Positions persist
//! across calls so a growing graph settles incrementally instead of jumping.

use std::collections::HashMap;

use crate::models::{GraphNodeType, KnowledgeGraph};

/// Opaque node-positioning service.
pub trait LayoutService {
    /// Return `graph` with every node positioned.
    fn layout(&mut self, graph: &KnowledgeGraph) -> KnowledgeGraph;
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Vec2 {
    pub x: f64,
    pub y: f64,
}

impl Vec2 {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn length(&self) -> f64 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    pub fn distance(&self, other: &Vec2) -> f64 {
        Vec2::new(other.x - self.x, other.y - self.y).length()
    }
}

/// Tuning for [`ForceLayout`].
#[derive(Debug, Clone, PartialEq)]
pub struct ForceConfig {
    pub damping: f64,
    pub gravity: f64,
    pub center: Vec2,
    pub repulsion: f64,
    pub spring: f64,
    pub rest_length: f64,
    pub max_speed: f64,
    /// Speed under which a node counts as settled
    pub settle_speed: f64,
    /// Upper bound on steps per `layout` call
    pub max_steps: usize,
    /// Radius of the ring new nodes are placed on
    pub spawn_radius: f64,
}

impl Default for ForceConfig {
    fn default() -> Self {
        Self {
            damping: 0.92,
            gravity: 0.05,
            center: Vec2::default(),
            repulsion: 2500.0,
            spring: 0.08,
            rest_length: 200.0,
            max_speed: 3.0,
            settle_speed: 0.1,
            max_steps: 300,
            spawn_radius: 150.0,
        }
    }
}

#[derive(Debug, Clone)]
struct Body {
    position: Vec2,
    velocity: Vec2,
    anchor: bool,
}

impl Body {
    fn speed(&self) -> f64 {
        self.velocity.length()
    }
}

/// Force-directed [`LayoutService`].
#[derive(Debug, Default)]
pub struct ForceLayout {
    config: ForceConfig,
    bodies: HashMap<String, Body>,
    spawned: usize,
}

impl ForceLayout {
    pub fn new(config: ForceConfig) -> Self {
        Self {
            config,
            bodies: HashMap::new(),
            spawned: 0,
        }
    }

    pub fn config(&self) -> &ForceConfig {
        &self.config
    }

    /// Last computed position of a node.
    pub fn position(&self, id: &str) -> Option<Vec2> {
        self.bodies.get(id).map(|b| b.position)
    }

    /// Place new nodes on a golden-angle spiral so no two start on top of each other.
    fn spawn_point(&mut self) -> Vec2 {
        const GOLDEN_ANGLE: f64 = 2.399_963_229_728_653;
        let n = self.spawned as f64;
        self.spawned += 1;
        let radius = self.config.spawn_radius * (1.0 + n).sqrt() / 2.0;
        let angle = n * GOLDEN_ANGLE;
        Vec2::new(
            self.config.center.x + radius * angle.cos(),
            self.config.center.y + radius * angle.sin(),
        )
    }

    /// Make the body set match `graph`'s nodes, keeping known positions.
    fn sync(&mut self, graph: &KnowledgeGraph) -> Vec<String> {
        let ids: Vec<String> = graph.nodes.iter().map(|n| n.id.clone()).collect();
        self.bodies.retain(|id, _| ids.contains(id));
        for node in &graph.nodes {
            if self.bodies.contains_key(&node.id) {
                continue;
            }
            let position = match (node.x, node.y) {
                (Some(x), Some(y)) => Vec2::new(x, y),
                _ => self.spawn_point(),
            };
            let velocity = Vec2::new(node.vx.unwrap_or(0.0), node.vy.unwrap_or(0.0));
            self.bodies.insert(
                node.id.clone(),
                Body {
                    position,
                    velocity,
                    anchor: node.node_type == GraphNodeType::Module,
                },
            );
        }
        ids
    }

    /// One simulation step over `order`, returning the fastest node's speed.
    fn step(&mut self, order: &[String], springs: &[(usize, usize)]) -> f64 {
        let cfg = &self.config;
        let mut bodies: Vec<Body> = order
            .iter()
            .filter_map(|id| self.bodies.get(id).cloned())
            .collect();
        let n = bodies.len();
        let mut force = vec![Vec2::default(); n];

        for (i, body) in bodies.iter().enumerate() {
            let dx = cfg.center.x - body.position.x;
            let dy = cfg.center.y - body.position.y;
            let dist = (dx * dx + dy * dy).sqrt();
            if dist > 0.0 {
                let pull = if body.anchor { cfg.gravity * 0.1 } else { cfg.gravity };
                force[i].x += dx / dist * pull;
                force[i].y += dy / dist * pull;
            }
        }

        for i in 0..n {
            for j in (i + 1)..n {
                let dx = bodies[j].position.x - bodies[i].position.x;
                let dy = bodies[j].position.y - bodies[i].position.y;
                let dist_sq = dx * dx + dy * dy;
                if dist_sq == 0.0 {
                    continue;
                }
                let dist = dist_sq.sqrt();
                let push = cfg.repulsion / dist_sq;
                let (fx, fy) = (dx / dist * push, dy / dist * push);
                force[i].x -= fx;
                force[i].y -= fy;
                force[j].x += fx;
                force[j].y += fy;
            }
        }

        for &(a, b) in springs {
            let dx = bodies[b].position.x - bodies[a].position.x;
            let dy = bodies[b].position.y - bodies[a].position.y;
            let dist = (dx * dx + dy * dy).sqrt();
            if dist == 0.0 {
                continue;
            }
            let pull = cfg.spring * (dist - cfg.rest_length);
            let (fx, fy) = (dx / dist * pull, dy / dist * pull);
            force[a].x += fx;
            force[a].y += fy;
            force[b].x -= fx;
            force[b].y -= fy;
        }

        let mut fastest: f64 = 0.0;
        for (body, f) in bodies.iter_mut().zip(&force) {
            body.velocity.x = (body.velocity.x + f.x) * cfg.damping;
            body.velocity.y = (body.velocity.y + f.y) * cfg.damping;
            let cap = if body.anchor {
                cfg.max_speed * 0.3
            } else {
                cfg.max_speed
            };
            let speed = body.speed();
            if speed > cap {
                body.velocity.x = body.velocity.x / speed * cap;
                body.velocity.y = body.velocity.y / speed * cap;
            }
            body.position.x += body.velocity.x;
            body.position.y += body.velocity.y;
            fastest = fastest.max(body.speed());
        }

        for (id, body) in order.iter().zip(bodies) {
            self.bodies.insert(id.clone(), body);
        }
        fastest
    }

    /// Run until every node settles or `max_steps` is hit. Returns steps taken.
    pub fn settle(&mut self, graph: &KnowledgeGraph) -> usize {
        let order = self.sync(graph);
        let index: HashMap<&str, usize> = order
            .iter()
            .enumerate()
            .map(|(i, id)| (id.as_str(), i))
            .collect();
        let springs: Vec<(usize, usize)> = graph
            .edges
            .iter()
            .filter_map(|e| Some((*index.get(e.from.as_str())?, *index.get(e.to.as_str())?)))
            .filter(|(a, b)| a != b)
            .collect();

        for step in 0..self.config.max_steps {
            if self.step(&order, &springs) < self.config.settle_speed {
                return step + 1;
            }
        }
        self.config.max_steps
    }
}

impl LayoutService for ForceLayout {
    fn layout(&mut self, graph: &KnowledgeGraph) -> KnowledgeGraph {
        self.settle(graph);
        let mut out = graph.clone();
        for node in &mut out.nodes {
            if let Some(body) = self.bodies.get(&node.id) {
                node.x = Some(body.position.x);
                node.y = Some(body.position.y);
                node.vx = Some(body.velocity.x);
                node.vy = Some(body.velocity.y);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{GraphEdge, GraphNode};

    fn file(id: &str) -> GraphNode {
        GraphNode::new(id, id, GraphNodeType::File)
    }

    fn placed(id: &str, node_type: GraphNodeType, x: f64, y: f64) -> GraphNode {
        let mut node = GraphNode::new(id, id, node_type);
        node.x = Some(x);
        node.y = Some(y);
        node
    }

    #[test]
    fn test_layout_positions_every_node() {
        let graph = KnowledgeGraph::new(
            vec![file("a"), file("b"), file("c")],
            vec![GraphEdge::new("a", "b")],
        );
        let mut layout = ForceLayout::default();
        let out = layout.layout(&graph);
        assert_eq!(out.nodes.len(), 3);
        assert!(out.nodes.iter().all(|n| n.x.is_some() && n.y.is_some()));
        assert_eq!(out.edges, graph.edges);
    }

    #[test]
    fn test_spawned_nodes_do_not_overlap() {
        let graph = KnowledgeGraph::new(vec![file("a"), file("b")], vec![]);
        let mut layout = ForceLayout::new(ForceConfig {
            max_steps: 0,
            ..Default::default()
        });
        layout.layout(&graph);
        let a = layout.position("a").unwrap();
        let b = layout.position("b").unwrap();
        assert!(a.distance(&b) > 1.0);
    }

    #[test]
    fn test_repulsion_separates_close_nodes() {
        let graph = KnowledgeGraph::new(
            vec![
                placed("a", GraphNodeType::File, 0.0, 0.0),
                placed("b", GraphNodeType::File, 10.0, 0.0),
            ],
            vec![],
        );
        let mut layout = ForceLayout::new(ForceConfig {
            max_steps: 10,
            ..Default::default()
        });
        layout.layout(&graph);
        let d = layout.position("a").unwrap().distance(&layout.position("b").unwrap());
        assert!(d > 10.0, "nodes should repel: {}", d);
    }

    #[test]
    fn test_spring_pulls_distant_neighbors_together() {
        let graph = KnowledgeGraph::new(
            vec![
                placed("a", GraphNodeType::File, 0.0, 0.0),
                placed("b", GraphNodeType::File, 800.0, 0.0),
            ],
            vec![GraphEdge::new("a", "b")],
        );
        let mut layout = ForceLayout::new(ForceConfig {
            max_steps: 20,
            ..Default::default()
        });
        layout.layout(&graph);
        let d = layout.position("a").unwrap().distance(&layout.position("b").unwrap());
        assert!(d < 800.0, "spring should contract: {}", d);
    }

    #[test]
    fn test_module_nodes_are_heavy() {
        let anchor = KnowledgeGraph::new(
            vec![placed("m", GraphNodeType::Module, 100.0, 0.0)],
            vec![],
        );
        let normal = KnowledgeGraph::new(vec![placed("f", GraphNodeType::File, 100.0, 0.0)], vec![]);
        let config = ForceConfig {
            max_steps: 1,
            ..Default::default()
        };
        let mut a = ForceLayout::new(config.clone());
        let mut b = ForceLayout::new(config);
        let moved_anchor = 100.0 - a.layout(&anchor).nodes[0].x.unwrap();
        let moved_normal = 100.0 - b.layout(&normal).nodes[0].x.unwrap();
        assert!(moved_anchor < moved_normal);
    }

    #[test]
    fn test_positions_persist_across_snapshots() {
        let mut layout = ForceLayout::new(ForceConfig {
            max_steps: 0,
            ..Default::default()
        });
        let first = KnowledgeGraph::new(vec![placed("a", GraphNodeType::File, 42.0, 7.0)], vec![]);
        layout.layout(&first);

        // Snapshots from the stream carry no positions.
        let second = KnowledgeGraph::new(vec![file("a"), file("b")], vec![]);
        let out = layout.layout(&second);
        assert_eq!(out.nodes[0].x, Some(42.0));
        assert_eq!(out.nodes[0].y, Some(7.0));
    }

    #[test]
    fn test_removed_nodes_are_forgotten() {
        let mut layout = ForceLayout::default();
        layout.layout(&KnowledgeGraph::new(vec![file("a"), file("b")], vec![]));
        layout.layout(&KnowledgeGraph::new(vec![file("b")], vec![]));
        assert!(layout.position("a").is_none());
        assert!(layout.position("b").is_some());
    }

    #[test]
    fn test_settles_before_step_limit() {
        let graph = KnowledgeGraph::new(
            vec![
                placed("a", GraphNodeType::File, 100.0, 0.0),
                placed("b", GraphNodeType::File, -100.0, 0.0),
            ],
            vec![],
        );
        let mut layout = ForceLayout::new(ForceConfig {
            max_steps: 1000,
            ..Default::default()
        });
        let steps = layout.settle(&graph);
        assert!(steps < 1000, "should settle: {} steps", steps);
    }
}
