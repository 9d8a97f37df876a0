//! Graph operations shared by the GraphQL mutations and the websocket
//! intent handler. Every change invalidates the cached floors it touches and
//! is announced on the hub.
use std::path::{Path, PathBuf};
use std::sync::Arc;

use floorgraph_shared::models::{Edge, EdgeId, Floor, FloorSet, GraphPayload, Node, NodeId};
use floorgraph_shared::protocol::{ClientIntent, ServerEvent};

use crate::assets::Assets;
use crate::cache::GraphCache;
use crate::hub::Hub;
use crate::storage::{NewNode, Storage};

#[derive(Debug, Clone)]
pub struct CreateNode {
    pub floor: Floor,
    /// Further floors a stairwell or lift also belongs to.
    pub extra_floors: Vec<Floor>,
    pub x_px: i64,
    pub y_px: i64,
    pub node_type: String,
    /// Height the client converted with, if it reported one.
    pub image_height: Option<u32>,
}

pub struct GraphService {
    pub assets: Arc<Assets>,
    pub storage: Arc<Storage>,
    pub hub: Hub,
    cache: GraphCache,
    /// Where `export_graph` writes `floor<N>.json`.
    export_dir: PathBuf,
}

impl GraphService {
    pub fn new(
        assets: Arc<Assets>,
        storage: Arc<Storage>,
        hub: Hub,
        export_dir: &Path,
    ) -> Arc<Self> {
        Arc::new(GraphService {
            assets,
            storage,
            hub,
            cache: GraphCache::new(),
            export_dir: export_dir.to_path_buf(),
        })
    }

    /// Graph of one floor, `None` for a floor without an image.
    pub fn graph(&self, floor: Floor) -> Result<Option<Arc<GraphPayload>>, String> {
        let Some(image) = self.assets.find_floor(floor) else {
            return Ok(None);
        };
        self.cache
            .get_or_build(floor, || {
                Ok(GraphPayload {
                    image: format!("/static/{}", image.file_name),
                    image_width: image.width,
                    image_height: image.height,
                    nodes: self.storage.nodes_on_floor(floor)?,
                    arcs: self.storage.arcs_on_floor(floor)?,
                })
            })
            .map(Some)
    }

    /// Write the graph of one floor to `floor<N>.json` in the export
    /// directory and return the written path with the graph.
    pub fn export_graph(&self, floor: Floor) -> Result<(PathBuf, Arc<GraphPayload>), String> {
        let graph = self
            .graph(floor)?
            .ok_or_else(|| format!("Unknown floor: {}", floor))?;
        std::fs::create_dir_all(&self.export_dir)
            .map_err(|e| format!("Failed to create {}: {}", self.export_dir.display(), e))?;
        let path = self.export_dir.join(format!("floor{}.json", floor));
        let json = serde_json::to_string_pretty(graph.as_ref()).map_err(|e| e.to_string())?;
        std::fs::write(&path, json)
            .map_err(|e| format!("Failed to write {}: {}", path.display(), e))?;
        tracing::info!(
            floor,
            path = %path.display(),
            nodes = graph.nodes.len(),
            arcs = graph.arcs.len(),
            "Graph exported"
        );
        Ok((path, graph))
    }

    pub fn create_node(&self, input: CreateNode) -> Result<Node, String> {
        let image = self
            .assets
            .find_floor(input.floor)
            .ok_or_else(|| format!("Unknown floor: {}", input.floor))?;
        let capacity = self
            .assets
            .find_node_type(&input.node_type)?
            .map(|t| t.capacity)
            .unwrap_or(0);
        if let Some(height) = input.image_height {
            if height != image.height {
                tracing::warn!(
                    floor = input.floor,
                    client_height = height,
                    image_height = image.height,
                    "Client converted with a different image height"
                );
            }
        }
        if !(0..=image.width as i64).contains(&input.x_px)
            || !(0..=image.height as i64).contains(&input.y_px)
        {
            return Err(format!(
                "Position ({}, {}) is outside the {}x{} image of floor {}",
                input.x_px, input.y_px, image.width, image.height, input.floor
            ));
        }
        let mut floors = input.extra_floors;
        floors.push(input.floor);
        if let Some(unknown) = floors.iter().find(|f| self.assets.find_floor(**f).is_none()) {
            return Err(format!("Unknown floor: {}", unknown));
        }
        let floor_set = FloorSet::from_floors(floors);

        let node = self.storage.insert_node(NewNode {
            floor: floor_set.clone(),
            node_type: input.node_type,
            x: input.x_px,
            y: input.y_px,
            capacity,
        })?;
        tracing::info!(id = node.id, floor = %floor_set, node_type = %node.node_type, "Node created");

        self.cache.invalidate(floor_set.iter());
        self.hub.publish(ServerEvent::NodeCreated(node.clone()));
        Ok(node)
    }

    pub fn create_edge(&self, floor: Floor, from: NodeId, to: NodeId) -> Result<Edge, String> {
        if from == to {
            return Err(format!("An edge needs two different nodes (got {} twice)", from));
        }
        let endpoint = |id: NodeId| -> Result<Node, String> {
            self.storage
                .get_node(id)?
                .ok_or_else(|| format!("Unknown node: {}", id))
        };
        let a = endpoint(from)?;
        let b = endpoint(to)?;
        if !a.floor.contains(floor) || !b.floor.contains(floor) {
            return Err(format!(
                "Nodes {} and {} are not both on floor {}",
                from, to, floor
            ));
        }
        let key = floorgraph_shared::models::EdgeKey::new(from, to);
        if self
            .storage
            .arcs_on_floor(floor)?
            .iter()
            .any(|e| e.active && e.key() == key)
        {
            return Err(format!("Nodes {} and {} are already connected", from, to));
        }

        let edge = self.storage.insert_arc(floor, from, to)?;
        tracing::info!(id = ?edge.id, floor, from, to, "Edge created");

        self.cache.invalidate([floor]);
        self.hub.publish(ServerEvent::EdgeCreated(edge.clone()));
        Ok(edge)
    }

    /// One-way: an inactive edge stays inactive.
    pub fn disable_edge(&self, id: EdgeId) -> Result<bool, String> {
        let edge = self
            .storage
            .get_arc(id)?
            .ok_or_else(|| format!("Unknown edge: {}", id))?;
        let now = chrono::Utc::now().to_rfc3339();
        let changed = self.storage.deactivate_arc(id, &now)?;
        if changed {
            tracing::info!(id, floor = edge.floor, "Edge disabled");
            self.cache.invalidate([edge.floor]);
            self.hub.publish(ServerEvent::Reload);
        }
        Ok(changed)
    }

    pub fn set_occupancy(&self, id: NodeId, occupancy: u32) -> Result<Node, String> {
        let node = self
            .storage
            .get_node(id)?
            .ok_or_else(|| format!("Unknown node: {}", id))?;
        if node.capacity > 0 && occupancy > node.capacity {
            return Err(format!(
                "Occupancy {} exceeds capacity {} of node {}",
                occupancy, node.capacity, id
            ));
        }
        let node = self
            .storage
            .set_occupancy(id, occupancy)?
            .ok_or_else(|| format!("Unknown node: {}", id))?;
        tracing::debug!(id, occupancy, "Occupancy updated");
        self.cache.invalidate(node.floor.iter());
        self.hub.publish(ServerEvent::Reload);
        Ok(node)
    }

    pub fn reload(&self) {
        self.cache.invalidate_all();
        self.hub.publish(ServerEvent::Reload);
    }

    /// Apply an intent received over the websocket. Returns the stored node
    /// for a node intent.
    pub fn apply_intent(&self, intent: ClientIntent) -> Result<Option<Node>, String> {
        match intent {
            ClientIntent::NewNode {
                x_px,
                y_px,
                floor,
                node_type,
                image_height,
            } => self
                .create_node(CreateNode {
                    floor,
                    extra_floors: vec![],
                    x_px,
                    y_px,
                    node_type,
                    image_height: Some(image_height),
                })
                .map(Some),
            ClientIntent::CreateEdge { from, to, floor } => {
                self.create_edge(floor, from, to).map(|_| None)
            }
        }
    }
}
