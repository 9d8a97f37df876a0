use floorgraph_shared::models::{Edge, EdgeId, Floor, FloorSet, Node, NodeId};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

const NODES_TABLE: TableDefinition<i64, &[u8]> = TableDefinition::new("nodes");
const ARCS_TABLE: TableDefinition<i64, &[u8]> = TableDefinition::new("arcs");
const COUNTERS_TABLE: TableDefinition<&str, i64> = TableDefinition::new("counters");
const ARC_STATUS_LOG_TABLE: TableDefinition<i64, &[u8]> = TableDefinition::new("arc_status_log");

const NODE_COUNTER: &str = "node";
const ARC_COUNTER: &str = "arc";
const ARC_STATUS_COUNTER: &str = "arc_status";

/// Fields of a node before the store assigns its id.
#[derive(Debug, Clone)]
pub struct NewNode {
    pub floor: FloorSet,
    pub node_type: String,
    pub x: i64,
    pub y: i64,
    pub capacity: u32,
}

/// One recorded change of an arc's active flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArcStatusEntry {
    pub arc_id: EdgeId,
    pub active: bool,
    pub changed_at: String,
}

pub struct Storage {
    db: Database,
}

fn next_id(counters: &mut redb::Table<&str, i64>, name: &str) -> Result<i64, String> {
    let current = counters
        .get(name)
        .map_err(|e| e.to_string())?
        .map(|v| v.value())
        .unwrap_or(0);
    let next = current + 1;
    counters.insert(name, next).map_err(|e| e.to_string())?;
    Ok(next)
}

impl Storage {
    pub fn open(path: &Path) -> Result<Arc<Self>, String> {
        let db = Database::create(path)
            .map_err(|e| format!("Failed to open database at {}: {}", path.display(), e))?;

        // Ensure tables exist
        let write_txn = db.begin_write().map_err(|e| e.to_string())?;
        {
            write_txn.open_table(NODES_TABLE).map_err(|e| e.to_string())?;
            write_txn.open_table(ARCS_TABLE).map_err(|e| e.to_string())?;
            write_txn.open_table(COUNTERS_TABLE).map_err(|e| e.to_string())?;
            write_txn
                .open_table(ARC_STATUS_LOG_TABLE)
                .map_err(|e| e.to_string())?;
        }
        write_txn.commit().map_err(|e| e.to_string())?;

        Ok(Arc::new(Storage { db }))
    }

    pub fn insert_node(&self, new: NewNode) -> Result<Node, String> {
        let write_txn = self.db.begin_write().map_err(|e| e.to_string())?;
        let node = {
            let mut counters = write_txn.open_table(COUNTERS_TABLE).map_err(|e| e.to_string())?;
            let mut nodes = write_txn.open_table(NODES_TABLE).map_err(|e| e.to_string())?;
            let node = Node {
                id: next_id(&mut counters, NODE_COUNTER)?,
                floor: new.floor,
                node_type: new.node_type,
                x: new.x,
                y: new.y,
                capacity: new.capacity,
                current_occupancy: 0,
            };
            let json = serde_json::to_vec(&node).map_err(|e| e.to_string())?;
            nodes
                .insert(node.id, json.as_slice())
                .map_err(|e| e.to_string())?;
            node
        };
        write_txn.commit().map_err(|e| e.to_string())?;
        Ok(node)
    }

    pub fn get_node(&self, id: NodeId) -> Result<Option<Node>, String> {
        let read_txn = self.db.begin_read().map_err(|e| e.to_string())?;
        let table = read_txn.open_table(NODES_TABLE).map_err(|e| e.to_string())?;

        match table.get(id).map_err(|e| e.to_string())? {
            Some(value) => {
                let node: Node =
                    serde_json::from_slice(value.value()).map_err(|e| e.to_string())?;
                Ok(Some(node))
            }
            None => Ok(None),
        }
    }

    pub fn list_nodes(&self) -> Result<Vec<Node>, String> {
        let read_txn = self.db.begin_read().map_err(|e| e.to_string())?;
        let table = read_txn.open_table(NODES_TABLE).map_err(|e| e.to_string())?;
        let mut nodes = Vec::new();
        for entry in table.iter().map_err(|e| e.to_string())? {
            let (_, value) = entry.map_err(|e| e.to_string())?;
            nodes.push(serde_json::from_slice(value.value()).map_err(|e| e.to_string())?);
        }
        Ok(nodes)
    }

    /// Nodes visible on `floor`, including those spanning several floors.
    pub fn nodes_on_floor(&self, floor: Floor) -> Result<Vec<Node>, String> {
        Ok(self
            .list_nodes()?
            .into_iter()
            .filter(|n| n.floor.contains(floor))
            .collect())
    }

    /// Overwrite a node's occupancy. Returns the updated node.
    pub fn set_occupancy(&self, id: NodeId, occupancy: u32) -> Result<Option<Node>, String> {
        let write_txn = self.db.begin_write().map_err(|e| e.to_string())?;
        let updated = {
            let mut table = write_txn.open_table(NODES_TABLE).map_err(|e| e.to_string())?;
            let existing: Option<Node> = match table.get(id).map_err(|e| e.to_string())? {
                Some(value) => {
                    Some(serde_json::from_slice(value.value()).map_err(|e| e.to_string())?)
                }
                None => None,
            };
            match existing {
                Some(mut node) => {
                    node.current_occupancy = occupancy;
                    let json = serde_json::to_vec(&node).map_err(|e| e.to_string())?;
                    table
                        .insert(id, json.as_slice())
                        .map_err(|e| e.to_string())?;
                    Some(node)
                }
                None => None,
            }
        };
        write_txn.commit().map_err(|e| e.to_string())?;
        Ok(updated)
    }

    pub fn insert_arc(&self, floor: Floor, from: NodeId, to: NodeId) -> Result<Edge, String> {
        let write_txn = self.db.begin_write().map_err(|e| e.to_string())?;
        let arc = {
            let mut counters = write_txn.open_table(COUNTERS_TABLE).map_err(|e| e.to_string())?;
            let mut arcs = write_txn.open_table(ARCS_TABLE).map_err(|e| e.to_string())?;
            let id = next_id(&mut counters, ARC_COUNTER)?;
            let arc = Edge {
                id: Some(id),
                floor,
                from,
                to,
                active: true,
            };
            let json = serde_json::to_vec(&arc).map_err(|e| e.to_string())?;
            arcs.insert(id, json.as_slice()).map_err(|e| e.to_string())?;
            arc
        };
        write_txn.commit().map_err(|e| e.to_string())?;
        Ok(arc)
    }

    pub fn get_arc(&self, id: EdgeId) -> Result<Option<Edge>, String> {
        let read_txn = self.db.begin_read().map_err(|e| e.to_string())?;
        let table = read_txn.open_table(ARCS_TABLE).map_err(|e| e.to_string())?;

        match table.get(id).map_err(|e| e.to_string())? {
            Some(value) => Ok(Some(
                serde_json::from_slice(value.value()).map_err(|e| e.to_string())?,
            )),
            None => Ok(None),
        }
    }

    pub fn arcs_on_floor(&self, floor: Floor) -> Result<Vec<Edge>, String> {
        let read_txn = self.db.begin_read().map_err(|e| e.to_string())?;
        let table = read_txn.open_table(ARCS_TABLE).map_err(|e| e.to_string())?;
        let mut arcs = Vec::new();
        for entry in table.iter().map_err(|e| e.to_string())? {
            let (_, value) = entry.map_err(|e| e.to_string())?;
            let arc: Edge = serde_json::from_slice(value.value()).map_err(|e| e.to_string())?;
            if arc.floor == floor {
                arcs.push(arc);
            }
        }
        Ok(arcs)
    }

    /// Deactivate an arc and record the change. Returns `false` if the arc
    /// does not exist or is already inactive.
    pub fn deactivate_arc(&self, id: EdgeId, changed_at: &str) -> Result<bool, String> {
        let write_txn = self.db.begin_write().map_err(|e| e.to_string())?;
        let changed = {
            let mut arcs = write_txn.open_table(ARCS_TABLE).map_err(|e| e.to_string())?;
            let existing: Option<Edge> = match arcs.get(id).map_err(|e| e.to_string())? {
                Some(value) => {
                    Some(serde_json::from_slice(value.value()).map_err(|e| e.to_string())?)
                }
                None => None,
            };
            match existing {
                Some(mut arc) if arc.active => {
                    arc.active = false;
                    let json = serde_json::to_vec(&arc).map_err(|e| e.to_string())?;
                    arcs.insert(id, json.as_slice()).map_err(|e| e.to_string())?;

                    let mut counters =
                        write_txn.open_table(COUNTERS_TABLE).map_err(|e| e.to_string())?;
                    let mut log = write_txn
                        .open_table(ARC_STATUS_LOG_TABLE)
                        .map_err(|e| e.to_string())?;
                    let entry = ArcStatusEntry {
                        arc_id: id,
                        active: false,
                        changed_at: changed_at.to_string(),
                    };
                    let seq = next_id(&mut counters, ARC_STATUS_COUNTER)?;
                    let json = serde_json::to_vec(&entry).map_err(|e| e.to_string())?;
                    log.insert(seq, json.as_slice()).map_err(|e| e.to_string())?;
                    true
                }
                _ => false,
            }
        };
        write_txn.commit().map_err(|e| e.to_string())?;
        Ok(changed)
    }

    /// Status changes of one arc, oldest first.
    pub fn arc_status_log(&self, id: EdgeId) -> Result<Vec<ArcStatusEntry>, String> {
        let read_txn = self.db.begin_read().map_err(|e| e.to_string())?;
        let table = read_txn
            .open_table(ARC_STATUS_LOG_TABLE)
            .map_err(|e| e.to_string())?;
        let mut entries = Vec::new();
        for entry in table.iter().map_err(|e| e.to_string())? {
            let (_, value) = entry.map_err(|e| e.to_string())?;
            let entry: ArcStatusEntry =
                serde_json::from_slice(value.value()).map_err(|e| e.to_string())?;
            if entry.arc_id == id {
                entries.push(entry);
            }
        }
        Ok(entries)
    }
}
