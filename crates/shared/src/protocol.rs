//! Realtime channel messages.
//!
//! The server pushes reload signals and creation notifications; clients that
//! route intents over the same socket send `new_node` / `create_edge`. On
//! their own socket only they get `node_accepted` with the stored node, or
//! `intent_rejected` when an intent fails.
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{Edge, Floor, Node, NodeId};

/// Bare words that mean "reload every displayed floor".
const RELOAD_WORDS: [&str; 3] = ["reload", "refresh", "update"];

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unrecognised signal: {0}")]
    UnknownSignal(String),
}

/// Server -> client push event.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    Reload,
    NodeCreated(Node),
    EdgeCreated(Edge),
    /// The node this socket asked for was stored. Never broadcast.
    NodeAccepted(Node),
    /// An intent this socket sent was refused. Never broadcast.
    IntentRejected { intent: ClientIntent, reason: String },
}

#[derive(Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum TaggedEvent {
    Reload,
    Refresh,
    Update,
    NodeCreated { node: Node },
    EdgeCreated { edge: Edge },
    NodeAccepted { node: Node },
    IntentRejected { intent: ClientIntent, reason: String },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum WireEvent {
    Signal(String),
    Tagged(TaggedEvent),
}

impl ServerEvent {
    /// Decode one text frame.
    pub fn decode(text: &str) -> Result<Self, DecodeError> {
        let trimmed = text.trim();
        if RELOAD_WORDS.contains(&trimmed) {
            return Ok(ServerEvent::Reload);
        }
        match serde_json::from_str::<WireEvent>(trimmed)? {
            WireEvent::Signal(word) if RELOAD_WORDS.contains(&word.as_str()) => {
                Ok(ServerEvent::Reload)
            }
            WireEvent::Signal(word) => Err(DecodeError::UnknownSignal(word)),
            WireEvent::Tagged(TaggedEvent::NodeCreated { node }) => {
                Ok(ServerEvent::NodeCreated(node))
            }
            WireEvent::Tagged(TaggedEvent::EdgeCreated { edge }) => {
                Ok(ServerEvent::EdgeCreated(edge))
            }
            WireEvent::Tagged(TaggedEvent::NodeAccepted { node }) => {
                Ok(ServerEvent::NodeAccepted(node))
            }
            WireEvent::Tagged(TaggedEvent::IntentRejected { intent, reason }) => {
                Ok(ServerEvent::IntentRejected { intent, reason })
            }
            WireEvent::Tagged(_) => Ok(ServerEvent::Reload),
        }
    }

    /// Encode as the text frame the server broadcasts.
    pub fn encode(&self) -> String {
        let result = match self {
            ServerEvent::Reload => serde_json::to_string("reload"),
            ServerEvent::NodeCreated(node) => serde_json::to_string(&TaggedEvent::NodeCreated {
                node: node.clone(),
            }),
            ServerEvent::EdgeCreated(edge) => serde_json::to_string(&TaggedEvent::EdgeCreated {
                edge: edge.clone(),
            }),
            ServerEvent::NodeAccepted(node) => serde_json::to_string(&TaggedEvent::NodeAccepted {
                node: node.clone(),
            }),
            ServerEvent::IntentRejected { intent, reason } => {
                serde_json::to_string(&TaggedEvent::IntentRejected {
                    intent: intent.clone(),
                    reason: reason.clone(),
                })
            }
        };
        // Serializing these plain structs into a String cannot fail.
        result.unwrap_or_default()
    }
}

/// Client -> server creation intent, for deployments that route intents over
/// the realtime channel instead of request/response calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ClientIntent {
    NewNode {
        x_px: i64,
        y_px: i64,
        floor: Floor,
        node_type: String,
        image_height: u32,
    },
    CreateEdge {
        from: NodeId,
        to: NodeId,
        floor: Floor,
    },
}

impl ClientIntent {
    pub fn decode(text: &str) -> Result<Self, DecodeError> {
        Ok(serde_json::from_str(text.trim())?)
    }

    pub fn encode(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}
