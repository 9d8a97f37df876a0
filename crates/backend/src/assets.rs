use floorgraph_shared::models::{floor_from_filename, Floor, FloorImage};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FloorEntry {
    file_name: String,
    width: u32,
    height: u32,
}

/// Node type catalog entry. `capacity` seeds new nodes of this type.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeTypeEntry {
    #[serde(rename = "type")]
    pub node_type: String,
    pub display_name: String,
    #[serde(default)]
    pub capacity: u32,
}

pub struct Assets {
    pub floors: Vec<FloorImage>,
    pub node_types: Vec<NodeTypeEntry>,
}

impl Assets {
    pub fn load(assets_dir: &Path) -> Result<Self, String> {
        let floors_path = assets_dir.join("floors.json");
        let node_types_path = assets_dir.join("node_types.json");

        let floors_data = std::fs::read_to_string(&floors_path)
            .map_err(|e| format!("Failed to read {}: {}", floors_path.display(), e))?;
        let node_types_data = std::fs::read_to_string(&node_types_path)
            .map_err(|e| format!("Failed to read {}: {}", node_types_path.display(), e))?;

        let entries: Vec<FloorEntry> = serde_json::from_str(&floors_data)
            .map_err(|e| format!("Failed to parse floors.json: {}", e))?;
        let node_types: Vec<NodeTypeEntry> = serde_json::from_str(&node_types_data)
            .map_err(|e| format!("Failed to parse node_types.json: {}", e))?;

        let mut floors = Vec::new();
        for entry in entries {
            let Some(floor) = floor_from_filename(&entry.file_name) else {
                tracing::warn!(file = %entry.file_name, "Skipping image without a floor<N> name");
                continue;
            };
            if floors.iter().any(|f: &FloorImage| f.floor == floor) {
                return Err(format!("Floor {} has more than one image", floor));
            }
            floors.push(FloorImage {
                file_name: entry.file_name,
                floor,
                width: entry.width,
                height: entry.height,
            });
        }
        floors.sort_by_key(|f| f.floor);

        tracing::info!(floors = floors.len(), node_types = node_types.len(), "Loaded floor assets");

        Ok(Assets { floors, node_types })
    }

    pub fn find_floor(&self, floor: Floor) -> Option<&FloorImage> {
        self.floors.iter().find(|f| f.floor == floor)
    }

    /// Unknown types are refused only when a catalog is configured.
    pub fn find_node_type(&self, node_type: &str) -> Result<Option<&NodeTypeEntry>, String> {
        if self.node_types.is_empty() {
            return Ok(None);
        }
        self.node_types
            .iter()
            .find(|t| t.node_type == node_type)
            .map(Some)
            .ok_or_else(|| format!("Unknown node type: {}", node_type))
    }
}
