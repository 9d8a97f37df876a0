//! What a pointer click means.
//!
//! One gesture is active at a time across every displayed floor. A node
//! creation that has been sent but not yet confirmed locks out every further
//! node placement and endpoint selection until it resolves.
use floorgraph_shared::models::{EdgeId, Floor, NodeId, NodeType};
use floorgraph_shared::protocol::ClientIntent;
use floorgraph_shared::transform::{self, ImageSize, RenderCoord};
use thiserror::Error;

/// A map position waiting for the operator to pick a node type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeCandidate {
    pub floor: Floor,
    pub x_px: i64,
    pub y_px: i64,
    /// Height of the clicked floor's image, captured with the click.
    pub image_height: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeIntent {
    pub floor: Floor,
    pub x_px: i64,
    pub y_px: i64,
    pub node_type: String,
    pub image_height: u32,
}

impl From<&NodeIntent> for ClientIntent {
    fn from(intent: &NodeIntent) -> Self {
        ClientIntent::NewNode {
            x_px: intent.x_px,
            y_px: intent.y_px,
            floor: intent.floor,
            node_type: intent.node_type.clone(),
            image_height: intent.image_height,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeIntent {
    pub floor: Floor,
    pub from: NodeId,
    pub to: NodeId,
}

impl From<&EdgeIntent> for ClientIntent {
    fn from(intent: &EdgeIntent) -> Self {
        ClientIntent::CreateEdge {
            from: intent.from,
            to: intent.to,
            floor: intent.floor,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeEndpoint {
    pub node: NodeId,
    pub floor: Floor,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Gesture {
    #[default]
    Idle,
    AwaitingNodeType(NodeCandidate),
    /// Edge mode, holding zero or one picked endpoint.
    CollectingEdgeEndpoints(Option<EdgeEndpoint>),
}

/// Result of a node click that was not rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeProgress {
    /// Node clicks mean nothing outside edge mode.
    Ignored,
    FirstEndpoint(NodeId),
    Complete(EdgeIntent),
}

/// A gesture step refused locally, before any network call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("Wait for the new node to be confirmed before selecting.")]
    CreationPending,
    #[error("Edge mode is active: node placement is disabled.")]
    EdgeModeActive,
    #[error("No map position is selected.")]
    NoCandidate,
    #[error("Unknown node type '{0}'.")]
    UnknownNodeType(String),
    #[error("Node {0} is not confirmed by the server yet, please wait.")]
    Unconfirmed(NodeId),
    #[error("An edge needs two different nodes (node {0} was picked twice).")]
    SameNode(NodeId),
    #[error("Both nodes must be on the same floor (floor {0} and floor {1}).")]
    CrossFloor(Floor, Floor),
    #[error("Edge {0} is not an active edge of floor {1}.")]
    UnknownEdge(EdgeId, Floor),
    #[error("Floor {0} is not displayed.")]
    UnknownFloor(Floor),
}

#[derive(Debug, Clone, Default)]
pub struct InteractionState {
    gesture: Gesture,
    pending: Option<NodeIntent>,
}

impl InteractionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gesture(&self) -> &Gesture {
        &self.gesture
    }

    pub fn pending(&self) -> Option<&NodeIntent> {
        self.pending.as_ref()
    }

    pub fn is_locked(&self) -> bool {
        self.pending.is_some()
    }

    pub fn in_edge_mode(&self) -> bool {
        matches!(self.gesture, Gesture::CollectingEdgeEndpoints(_))
    }

    /// Endpoints picked so far in edge mode.
    pub fn collected_endpoints(&self) -> usize {
        match self.gesture {
            Gesture::CollectingEdgeEndpoints(Some(_)) => 1,
            _ => 0,
        }
    }

    /// A click on empty map space. Converts the render coordinate with the
    /// clicked floor's own image height and opens the node type selection.
    /// A second click while the selection is open moves the candidate.
    pub fn map_click(
        &mut self,
        floor: Floor,
        at: RenderCoord,
        image: ImageSize,
    ) -> Result<NodeCandidate, Rejection> {
        if self.is_locked() {
            return Err(Rejection::CreationPending);
        }
        if self.in_edge_mode() {
            return Err(Rejection::EdgeModeActive);
        }
        let (x, y) = transform::to_image_space(at, image.height as f64);
        let (x_px, y_px) = image.clamp_pixel(x, y);
        let candidate = NodeCandidate {
            floor,
            x_px,
            y_px,
            image_height: image.height,
        };
        self.gesture = Gesture::AwaitingNodeType(candidate.clone());
        Ok(candidate)
    }

    /// Confirm the node type for the held candidate. Locks further gestures
    /// until [`release`](Self::release).
    pub fn choose_node_type(
        &mut self,
        node_type: &str,
        catalog: &[NodeType],
    ) -> Result<NodeIntent, Rejection> {
        let Gesture::AwaitingNodeType(candidate) = &self.gesture else {
            return Err(Rejection::NoCandidate);
        };
        if !catalog.is_empty() && !catalog.iter().any(|t| t.node_type == node_type) {
            return Err(Rejection::UnknownNodeType(node_type.to_string()));
        }
        let intent = NodeIntent {
            floor: candidate.floor,
            x_px: candidate.x_px,
            y_px: candidate.y_px,
            node_type: node_type.to_string(),
            image_height: candidate.image_height,
        };
        self.gesture = Gesture::Idle;
        self.pending = Some(intent.clone());
        Ok(intent)
    }

    /// Discard the held candidate. Returns `false` if there was none.
    pub fn cancel_node_type(&mut self) -> bool {
        if matches!(self.gesture, Gesture::AwaitingNodeType(_)) {
            self.gesture = Gesture::Idle;
            true
        } else {
            false
        }
    }

    /// Enter or leave edge mode, dropping any picked endpoint. Returns whether
    /// edge mode is now active.
    pub fn toggle_edge_mode(&mut self) -> bool {
        self.gesture = match self.gesture {
            Gesture::CollectingEdgeEndpoints(_) => Gesture::Idle,
            Gesture::Idle | Gesture::AwaitingNodeType(_) => Gesture::CollectingEdgeEndpoints(None),
        };
        self.in_edge_mode()
    }

    /// A click on a node marker.
    pub fn node_click(
        &mut self,
        floor: Floor,
        node: NodeId,
        confirmed: impl Fn(NodeId) -> bool,
    ) -> Result<EdgeProgress, Rejection> {
        if self.is_locked() {
            return Err(Rejection::CreationPending);
        }
        let Gesture::CollectingEdgeEndpoints(first) = self.gesture else {
            return Ok(EdgeProgress::Ignored);
        };
        if !confirmed(node) {
            return Err(Rejection::Unconfirmed(node));
        }
        let Some(first) = first else {
            self.gesture = Gesture::CollectingEdgeEndpoints(Some(EdgeEndpoint { node, floor }));
            return Ok(EdgeProgress::FirstEndpoint(node));
        };
        if first.node == node {
            self.gesture = Gesture::CollectingEdgeEndpoints(None);
            return Err(Rejection::SameNode(node));
        }
        if first.floor != floor {
            self.gesture = Gesture::CollectingEdgeEndpoints(None);
            return Err(Rejection::CrossFloor(first.floor, floor));
        }
        // Leave edge mode now; success and failure of the call both end the gesture.
        self.gesture = Gesture::Idle;
        Ok(EdgeProgress::Complete(EdgeIntent {
            floor,
            from: first.node,
            to: node,
        }))
    }

    /// The pending creation reached a terminal outcome on its own call or
    /// socket. Broadcast creations never release it, since an identical
    /// placement by another client would look the same.
    pub fn release(&mut self) -> Option<NodeIntent> {
        self.pending.take()
    }
}
