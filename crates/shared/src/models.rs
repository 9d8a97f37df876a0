use serde::{Deserialize, Serialize};

use crate::transform::ImageSize;

pub type NodeId = i64;
pub type EdgeId = i64;
pub type Floor = i32;

/// The floor(s) a node is visible on. A stairwell belongs to several.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FloorSet {
    One(Floor),
    Many(Vec<Floor>),
}

impl FloorSet {
    pub fn contains(&self, floor: Floor) -> bool {
        match self {
            FloorSet::One(f) => *f == floor,
            FloorSet::Many(fs) => fs.contains(&floor),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = Floor> + '_ {
        let slice: &[Floor] = match self {
            FloorSet::One(f) => std::slice::from_ref(f),
            FloorSet::Many(fs) => fs,
        };
        slice.iter().copied()
    }

    /// Collapse a list into the narrowest representation.
    pub fn from_floors(mut floors: Vec<Floor>) -> Self {
        floors.sort_unstable();
        floors.dedup();
        if floors.len() == 1 {
            FloorSet::One(floors[0])
        } else {
            FloorSet::Many(floors)
        }
    }
}

impl From<Floor> for FloorSet {
    fn from(floor: Floor) -> Self {
        FloorSet::One(floor)
    }
}

impl std::fmt::Display for FloorSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FloorSet::One(floor) => write!(f, "{}", floor),
            FloorSet::Many(floors) => {
                let parts: Vec<String> = floors.iter().map(|x| x.to_string()).collect();
                write!(f, "{}", parts.join("+"))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    #[serde(alias = "node_id")]
    pub id: NodeId,
    #[serde(alias = "floor_level")]
    pub floor: FloorSet,
    pub node_type: String,
    /// Image pixel column.
    pub x: i64,
    /// Image pixel row, counted from the top.
    pub y: i64,
    #[serde(default)]
    pub capacity: u32,
    #[serde(default)]
    pub current_occupancy: u32,
}

/// Undirected identity of an edge: the endpoint pair, smaller id first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeKey(NodeId, NodeId);

impl EdgeKey {
    pub fn new(a: NodeId, b: NodeId) -> Self {
        if a <= b {
            EdgeKey(a, b)
        } else {
            EdgeKey(b, a)
        }
    }

    pub fn low(&self) -> NodeId {
        self.0
    }

    pub fn high(&self) -> NodeId {
        self.1
    }
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    #[serde(default, alias = "arc_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<EdgeId>,
    pub floor: Floor,
    #[serde(alias = "initial_node")]
    pub from: NodeId,
    #[serde(alias = "final_node")]
    pub to: NodeId,
    #[serde(default = "default_active")]
    pub active: bool,
}

impl Edge {
    pub fn key(&self) -> EdgeKey {
        EdgeKey::new(self.from, self.to)
    }
}

/// Entry of the node type catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeType {
    #[serde(rename = "type")]
    pub node_type: String,
    pub display_name: String,
}

/// A floor plan image and its native pixel dimensions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FloorImage {
    pub file_name: String,
    pub floor: Floor,
    pub width: u32,
    pub height: u32,
}

impl FloorImage {
    pub fn size(&self) -> ImageSize {
        ImageSize::new(self.width, self.height)
    }
}

/// Full graph of one floor as returned by the graph fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphPayload {
    pub image: String,
    pub image_width: u32,
    pub image_height: u32,
    pub nodes: Vec<Node>,
    pub arcs: Vec<Edge>,
}

/// Extract `N` from a `floor<N>` pattern anywhere in a file name,
/// case-insensitively.
pub fn floor_from_filename(name: &str) -> Option<Floor> {
    let lower = name.to_ascii_lowercase();
    let mut rest = lower.as_str();
    while let Some(pos) = rest.find("floor") {
        let after = &rest[pos + "floor".len()..];
        let digits: String = after.chars().take_while(|c| c.is_ascii_digit()).collect();
        if !digits.is_empty() {
            return digits.parse().ok();
        }
        rest = after;
    }
    None
}
