//! Per-floor graph model and its rendered projection.
//!
//! A floor is never diffed against its previous render: every reload clears
//! the floor and repopulates it, rebuilding the id -> position lookup from
//! scratch.
use std::collections::{BTreeMap, HashMap, HashSet};

use floorgraph_shared::models::{
    Edge, EdgeId, EdgeKey, Floor, FloorImage, GraphPayload, Node, NodeId,
};
use floorgraph_shared::style;
use floorgraph_shared::transform::{self, ImageSize, RenderCoord};

/// Ids of every node the server has confirmed, across all floors.
#[derive(Debug, Clone, Default)]
pub struct ConfirmedNodeIds(HashSet<NodeId>);

impl ConfirmedNodeIds {
    pub fn contains(&self, id: NodeId) -> bool {
        self.0.contains(&id)
    }

    pub fn confirm(&mut self, id: NodeId) {
        self.0.insert(id);
    }
}

/// A node marker as handed to the rendering surface.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedNode {
    pub id: NodeId,
    pub position: RenderCoord,
    pub radius: f64,
    pub color: &'static str,
    pub label: String,
}

impl RenderedNode {
    fn from_node(node: &Node, image_height: u32) -> Self {
        RenderedNode {
            id: node.id,
            position: transform::pixel_to_render(node.x, node.y, image_height),
            radius: style::node_radius(node.current_occupancy, node.capacity),
            color: style::node_color(node.current_occupancy, node.capacity),
            label: format!(
                "Node {} ({}, Occ: {})",
                node.id, node.node_type, node.current_occupancy
            ),
        }
    }
}

/// A polyline between two rendered node positions.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedEdge {
    pub key: EdgeKey,
    pub id: Option<EdgeId>,
    pub from: RenderCoord,
    pub to: RenderCoord,
}

#[derive(Debug, Clone)]
pub struct FloorGraph {
    image: FloorImage,
    nodes: BTreeMap<NodeId, Node>,
    edges: Vec<Edge>,
    positions: HashMap<NodeId, RenderCoord>,
    markers: BTreeMap<NodeId, RenderedNode>,
    lines: Vec<RenderedEdge>,
    generation: u64,
}

impl FloorGraph {
    pub fn new(image: FloorImage) -> Self {
        FloorGraph {
            image,
            nodes: BTreeMap::new(),
            edges: Vec::new(),
            positions: HashMap::new(),
            markers: BTreeMap::new(),
            lines: Vec::new(),
            generation: 0,
        }
    }

    pub fn floor(&self) -> Floor {
        self.image.floor
    }

    pub fn image(&self) -> &FloorImage {
        &self.image
    }

    pub fn image_size(&self) -> ImageSize {
        self.image.size()
    }

    pub fn image_height(&self) -> u32 {
        self.image.height
    }

    /// Drop every node, edge, marker and line.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.edges.clear();
        self.positions.clear();
        self.markers.clear();
        self.lines.clear();
    }

    /// Replace the floor's content with a freshly fetched graph.
    pub fn populate(&mut self, payload: GraphPayload) {
        self.clear();
        if payload.image_width > 0 && payload.image_height > 0 {
            self.image.width = payload.image_width;
            self.image.height = payload.image_height;
        }
        for node in payload.nodes {
            self.add_node(node);
        }
        for edge in payload.arcs {
            self.add_edge(edge);
        }
    }

    /// Add a node and draw its marker. Nodes not visible on this floor are
    /// ignored. Re-adding an id replaces its marker.
    pub fn add_node(&mut self, node: Node) -> bool {
        if !node.floor.contains(self.floor()) {
            return false;
        }
        let marker = RenderedNode::from_node(&node, self.image.height);
        self.positions.insert(node.id, marker.position);
        self.markers.insert(node.id, marker);
        self.nodes.insert(node.id, node);
        true
    }

    /// Add an edge to the model. Returns `true` if a line was drawn: inactive
    /// edges and edges with an endpoint missing from this floor stay in the
    /// model only.
    pub fn add_edge(&mut self, edge: Edge) -> bool {
        if edge.floor != self.floor() {
            return false;
        }
        let line = if edge.active {
            match (self.node_position(edge.from), self.node_position(edge.to)) {
                (Some(from), Some(to)) => Some(RenderedEdge {
                    key: edge.key(),
                    id: edge.id,
                    from,
                    to,
                }),
                _ => None,
            }
        } else {
            None
        };
        self.edges.push(edge);
        match line {
            Some(line) => {
                self.lines.push(line);
                true
            }
            None => false,
        }
    }

    pub fn node_position(&self, id: NodeId) -> Option<RenderCoord> {
        self.positions.get(&id).copied()
    }

    pub fn has_marker(&self, id: NodeId) -> bool {
        self.markers.contains_key(&id)
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn has_edge_id(&self, id: EdgeId) -> bool {
        self.edges.iter().any(|e| e.id == Some(id))
    }

    pub fn has_line(&self, key: EdgeKey) -> bool {
        self.lines.iter().any(|l| l.key == key)
    }

    /// Mark an edge inactive and remove its line. One-way.
    pub fn deactivate_edge(&mut self, id: EdgeId) -> bool {
        let Some(edge) = self
            .edges
            .iter_mut()
            .find(|e| e.id == Some(id) && e.active)
        else {
            return false;
        };
        edge.active = false;
        self.lines.retain(|l| l.id != Some(id));
        true
    }

    /// Start a graph fetch and return its generation.
    pub fn begin_fetch(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }

    /// Whether a fetch result belongs to the most recent request.
    pub fn is_current_fetch(&self, generation: u64) -> bool {
        generation == self.generation
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn markers(&self) -> impl Iterator<Item = &RenderedNode> {
        self.markers.values()
    }

    pub fn lines(&self) -> &[RenderedEdge] {
        &self.lines
    }
}

/// All displayed floors plus the graph-wide confirmation set.
#[derive(Debug, Clone, Default)]
pub struct GraphStore {
    floors: BTreeMap<Floor, FloorGraph>,
    confirmed: ConfirmedNodeIds,
}

impl GraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Display a floor. Returns `false` if it is already displayed.
    pub fn register(&mut self, image: FloorImage) -> bool {
        if self.floors.contains_key(&image.floor) {
            return false;
        }
        self.floors.insert(image.floor, FloorGraph::new(image));
        true
    }

    pub fn is_displayed(&self, floor: Floor) -> bool {
        self.floors.contains_key(&floor)
    }

    pub fn floor(&self, floor: Floor) -> Option<&FloorGraph> {
        self.floors.get(&floor)
    }

    pub fn floor_mut(&mut self, floor: Floor) -> Option<&mut FloorGraph> {
        self.floors.get_mut(&floor)
    }

    pub fn floor_ids(&self) -> Vec<Floor> {
        self.floors.keys().copied().collect()
    }

    pub fn floors(&self) -> impl Iterator<Item = &FloorGraph> {
        self.floors.values()
    }

    pub fn confirmed(&self) -> &ConfirmedNodeIds {
        &self.confirmed
    }

    /// Replace one floor with a fetched graph. Every loaded node is
    /// server-canonical and therefore confirmed.
    pub fn load(&mut self, floor: Floor, payload: GraphPayload) -> bool {
        let Some(graph) = self.floors.get_mut(&floor) else {
            return false;
        };
        for node in &payload.nodes {
            self.confirmed.confirm(node.id);
        }
        graph.populate(payload);
        true
    }

    /// Clear a floor whose fetch failed rather than leave it half-drawn.
    pub fn fail(&mut self, floor: Floor) {
        if let Some(graph) = self.floors.get_mut(&floor) {
            graph.clear();
        }
    }

    /// Confirm a node and draw it on every displayed floor it belongs to.
    /// Returns the floors that changed.
    pub fn add_node(&mut self, node: Node) -> Vec<Floor> {
        self.confirmed.confirm(node.id);
        let mut changed = Vec::new();
        for floor in node.floor.iter() {
            if let Some(graph) = self.floors.get_mut(&floor) {
                if graph.add_node(node.clone()) {
                    changed.push(floor);
                }
            }
        }
        changed
    }

    /// Add an edge to its floor. Returns `true` if a line was drawn.
    pub fn add_edge(&mut self, edge: Edge) -> bool {
        match self.floors.get_mut(&edge.floor) {
            Some(graph) => graph.add_edge(edge),
            None => false,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use floorgraph_shared::models::FloorSet;

    pub(crate) fn image(floor: Floor) -> FloorImage {
        FloorImage {
            file_name: format!("floor{}.png", floor),
            floor,
            width: 1200,
            height: 800,
        }
    }

    pub(crate) fn node(id: NodeId, floor: Floor, x: i64, y: i64) -> Node {
        Node {
            id,
            floor: FloorSet::One(floor),
            node_type: "room".to_string(),
            x,
            y,
            capacity: 10,
            current_occupancy: 0,
        }
    }

    pub(crate) fn edge(id: Option<EdgeId>, floor: Floor, from: NodeId, to: NodeId) -> Edge {
        Edge {
            id,
            floor,
            from,
            to,
            active: true,
        }
    }

    pub(crate) fn payload(floor: Floor, nodes: Vec<Node>, arcs: Vec<Edge>) -> GraphPayload {
        GraphPayload {
            image: format!("img/floor{}.png", floor),
            image_width: 1200,
            image_height: 800,
            nodes,
            arcs,
        }
    }

    #[test]
    fn test_add_node_converts_to_render_space() {
        let mut g = FloorGraph::new(image(1));
        assert!(g.add_node(node(1, 1, 100, 200)));
        let pos = g.node_position(1).unwrap();
        assert_eq!(pos.lat, 600.0);
        assert_eq!(pos.lng, 100.0);
    }

    #[test]
    fn test_add_node_for_other_floor_is_ignored() {
        let mut g = FloorGraph::new(image(1));
        assert!(!g.add_node(node(1, 2, 100, 200)));
        assert!(g.node_position(1).is_none());
    }

    #[test]
    fn test_multi_floor_node_renders_on_each_floor() {
        let mut store = GraphStore::new();
        store.register(image(1));
        store.register(image(2));
        let mut stairs = node(9, 1, 10, 10);
        stairs.floor = FloorSet::Many(vec![1, 2, 3]);
        let changed = store.add_node(stairs);
        assert_eq!(changed, vec![1, 2]);
        assert!(store.confirmed().contains(9));
    }

    #[test]
    fn test_marker_style_follows_occupancy() {
        let mut g = FloorGraph::new(image(1));
        let mut n = node(1, 1, 0, 0);
        n.current_occupancy = 6;
        g.add_node(n);
        let marker = g.markers().next().unwrap();
        assert_eq!(marker.color, "#F44336");
        assert!((marker.radius - 14.0).abs() < 1e-9);
        assert_eq!(marker.label, "Node 1 (room, Occ: 6)");
    }

    #[test]
    fn test_edge_between_rendered_nodes_is_drawn() {
        let mut g = FloorGraph::new(image(1));
        g.add_node(node(1, 1, 0, 0));
        g.add_node(node(2, 1, 10, 10));
        assert!(g.add_edge(edge(Some(5), 1, 1, 2)));
        assert_eq!(g.lines().len(), 1);
        assert!(g.has_line(EdgeKey::new(2, 1)));
    }

    #[test]
    fn test_inactive_edge_is_kept_but_not_drawn() {
        let mut g = FloorGraph::new(image(1));
        g.add_node(node(1, 1, 0, 0));
        g.add_node(node(2, 1, 10, 10));
        let mut e = edge(Some(5), 1, 1, 2);
        e.active = false;
        assert!(!g.add_edge(e));
        assert_eq!(g.edges().len(), 1);
        assert!(g.lines().is_empty());
    }

    #[test]
    fn test_edge_with_missing_endpoint_is_not_drawn() {
        let mut g = FloorGraph::new(image(1));
        g.add_node(node(1, 1, 0, 0));
        assert!(!g.add_edge(edge(None, 1, 1, 99)));
        assert_eq!(g.edges().len(), 1);
        assert!(g.lines().is_empty());
    }

    #[test]
    fn test_populate_clears_previous_content() {
        let mut g = FloorGraph::new(image(1));
        g.add_node(node(1, 1, 0, 0));
        g.add_node(node(2, 1, 5, 5));
        g.add_edge(edge(None, 1, 1, 2));

        g.populate(payload(1, vec![node(3, 1, 7, 7)], vec![]));

        assert!(g.node_position(1).is_none());
        assert!(g.node_position(2).is_none());
        assert!(g.lines().is_empty());
        assert_eq!(g.markers().count(), 1);
    }

    #[test]
    fn test_populate_adopts_payload_image_height() {
        let mut g = FloorGraph::new(image(1));
        let mut p = payload(1, vec![node(1, 1, 0, 100)], vec![]);
        p.image_height = 1000;
        g.populate(p);
        assert_eq!(g.image_height(), 1000);
        assert_eq!(g.node_position(1).unwrap().lat, 900.0);
    }

    #[test]
    fn test_deactivate_edge_removes_line_once() {
        let mut g = FloorGraph::new(image(1));
        g.add_node(node(1, 1, 0, 0));
        g.add_node(node(2, 1, 10, 10));
        g.add_edge(edge(Some(5), 1, 1, 2));
        assert!(g.deactivate_edge(5));
        assert!(g.lines().is_empty());
        assert!(!g.edges()[0].active);
        assert!(!g.deactivate_edge(5));
    }

    #[test]
    fn test_fetch_generation_tracks_latest_request() {
        let mut g = FloorGraph::new(image(1));
        let first = g.begin_fetch();
        let second = g.begin_fetch();
        assert!(!g.is_current_fetch(first));
        assert!(g.is_current_fetch(second));
    }

    #[test]
    fn test_load_confirms_nodes() {
        let mut store = GraphStore::new();
        store.register(image(1));
        assert!(store.load(1, payload(1, vec![node(4, 1, 1, 1)], vec![])));
        assert!(store.confirmed().contains(4));
    }

    #[test]
    fn test_load_unknown_floor_is_rejected() {
        let mut store = GraphStore::new();
        assert!(!store.load(7, payload(7, vec![node(4, 7, 1, 1)], vec![])));
        assert!(!store.confirmed().contains(4));
    }

    #[test]
    fn test_fail_only_clears_that_floor() {
        let mut store = GraphStore::new();
        store.register(image(1));
        store.register(image(2));
        store.load(1, payload(1, vec![node(1, 1, 1, 1)], vec![]));
        store.load(2, payload(2, vec![node(2, 2, 1, 1)], vec![]));

        store.fail(1);

        assert_eq!(store.floor(1).unwrap().markers().count(), 0);
        assert_eq!(store.floor(2).unwrap().markers().count(), 1);
    }

    #[test]
    fn test_register_twice_keeps_first() {
        let mut store = GraphStore::new();
        assert!(store.register(image(1)));
        assert!(!store.register(image(1)));
        assert_eq!(store.floor_ids(), vec![1]);
    }
}
