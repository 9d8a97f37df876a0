//! Decides whether a pushed or returned entity is already represented.
//!
//! Node and edge confirmations may arrive through the direct response to a
//! creation call, through the realtime broadcast, or both, in either order.
//! Every path goes through these checks so each entity is drawn once.
use floorgraph_shared::models::{Edge, Node};

use crate::store::GraphStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admit,
    Duplicate,
    /// None of the entity's floors are displayed.
    NotDisplayed,
}

/// A node is a duplicate iff its id is already confirmed and every displayed
/// floor it belongs to shows its marker. A reload that raced the creation can
/// leave a confirmed node undrawn; the next confirmation draws it again.
pub fn node_admission(store: &GraphStore, node: &Node) -> Admission {
    if store.confirmed().contains(node.id) {
        let undrawn = node
            .floor
            .iter()
            .filter_map(|f| store.floor(f))
            .any(|graph| !graph.has_marker(node.id));
        return if undrawn {
            Admission::Admit
        } else {
            Admission::Duplicate
        };
    }
    if node.floor.iter().any(|f| store.is_displayed(f)) {
        Admission::Admit
    } else {
        Admission::NotDisplayed
    }
}

/// An edge is a duplicate iff its id is already in the floor's model, or a
/// line already joins the same two endpoints (in either order).
pub fn edge_admission(store: &GraphStore, edge: &Edge) -> Admission {
    let Some(graph) = store.floor(edge.floor) else {
        return Admission::NotDisplayed;
    };
    if let Some(id) = edge.id {
        if graph.has_edge_id(id) {
            return Admission::Duplicate;
        }
    }
    if graph.has_line(edge.key()) {
        return Admission::Duplicate;
    }
    Admission::Admit
}
