//! The client engine.
//!
//! [`SyncClient`] never awaits. Every operator action, pushed event and
//! finished network call is fed through [`SyncClient::handle`], which updates
//! the floor store and gesture state and returns the network work to start as
//! [`Command`]s. Handlers run to completion one at a time, so a dedup check
//! and the insertion it guards can never interleave with another handler.
use std::collections::{BTreeSet, HashSet};
use std::fmt;

use floorgraph_shared::models::{Edge, EdgeId, Floor, FloorImage, GraphPayload, Node, NodeId, NodeType};
use floorgraph_shared::protocol::{ClientIntent, ServerEvent};
use floorgraph_shared::transform::RenderCoord;
use tracing::{debug, info, warn};

use crate::dedup::{self, Admission};
use crate::error::ClientError;
use crate::interaction::{EdgeIntent, EdgeProgress, InteractionState, NodeCandidate, NodeIntent, Rejection};
use crate::store::GraphStore;

/// Something the operator did.
#[derive(Debug, Clone, PartialEq)]
pub enum UserAction {
    MapClick { floor: Floor, at: RenderCoord },
    ChooseNodeType(String),
    CancelNodeType,
    ToggleEdgeMode,
    NodeClick { floor: Floor, node: NodeId },
    DisableEdge { floor: Floor, edge: EdgeId },
    ReloadGraph,
}

/// Network work requested by the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    FetchGraph { image: FloorImage, generation: u64 },
    CreateNode(NodeIntent),
    CreateEdge(EdgeIntent),
    DisableEdge { floor: Floor, edge: EdgeId },
    TriggerReload,
}

/// Outcome of a [`Command`].
#[derive(Debug)]
pub enum Completion {
    GraphFetched {
        floor: Floor,
        generation: u64,
        result: Result<GraphPayload, ClientError>,
    },
    NodeCreated {
        intent: NodeIntent,
        result: Result<Node, ClientError>,
    },
    /// `Ok(None)` is a successful call whose response carried no edge record.
    EdgeCreated {
        intent: EdgeIntent,
        result: Result<Option<Edge>, ClientError>,
    },
    EdgeDisabled {
        floor: Floor,
        edge: EdgeId,
        result: Result<(), ClientError>,
    },
    ReloadTriggered(Result<(), ClientError>),
}

#[derive(Debug)]
pub enum Input {
    Action(UserAction),
    Event(ServerEvent),
    Done(Completion),
}

/// Operator-facing feedback.
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    /// Show the node type selection for this position.
    ChooseNodeType(NodeCandidate),
    EdgeMode(bool),
    EdgeEndpointPicked(NodeId),
    Rejected(Rejection),
    Failed { what: String, reason: String },
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::ChooseNodeType(c) => write!(
                f,
                "Choose a node type for ({}, {}) on floor {}",
                c.x_px, c.y_px, c.floor
            ),
            Notice::EdgeMode(true) => write!(f, "Edge mode on: pick two nodes"),
            Notice::EdgeMode(false) => write!(f, "Edge mode off"),
            Notice::EdgeEndpointPicked(id) => write!(f, "Node {} selected, pick the second node", id),
            Notice::Rejected(r) => write!(f, "{}", r),
            Notice::Failed { what, reason } => write!(f, "Failed to {}: {}", what, reason),
        }
    }
}

/// What one handled input produced.
#[derive(Debug, Default)]
pub struct Reaction {
    pub commands: Vec<Command>,
    /// Floors whose rendered content changed.
    pub redraw: BTreeSet<Floor>,
    pub notices: Vec<Notice>,
}

impl Reaction {
    fn reject(&mut self, rejection: Rejection) {
        debug!("gesture rejected: {}", rejection);
        self.notices.push(Notice::Rejected(rejection));
    }

    fn fail(&mut self, what: String, error: &ClientError) {
        warn!("failed to {}: {}", what, error);
        self.notices.push(Notice::Failed {
            what,
            reason: error.to_string(),
        });
    }
}

pub struct SyncClient {
    store: GraphStore,
    interaction: InteractionState,
    node_types: Vec<NodeType>,
}

impl SyncClient {
    pub fn new(node_types: Vec<NodeType>) -> Self {
        SyncClient {
            store: GraphStore::new(),
            interaction: InteractionState::new(),
            node_types,
        }
    }

    pub fn store(&self) -> &GraphStore {
        &self.store
    }

    pub fn interaction(&self) -> &InteractionState {
        &self.interaction
    }

    pub fn node_types(&self) -> &[NodeType] {
        &self.node_types
    }

    /// Start displaying a floor and request its graph.
    pub fn display_floor(&mut self, image: FloorImage) -> Reaction {
        let mut reaction = Reaction::default();
        let floor = image.floor;
        if self.store.register(image) {
            info!("displaying floor {}", floor);
            self.fetch(floor, &mut reaction);
        }
        reaction
    }

    pub fn handle(&mut self, input: Input) -> Reaction {
        let mut reaction = Reaction::default();
        match input {
            Input::Action(action) => self.on_action(action, &mut reaction),
            Input::Event(event) => self.on_event(event, &mut reaction),
            Input::Done(completion) => self.on_completion(completion, &mut reaction),
        }
        reaction
    }

    fn on_action(&mut self, action: UserAction, reaction: &mut Reaction) {
        match action {
            UserAction::MapClick { floor, at } => {
                let Some(graph) = self.store.floor(floor) else {
                    reaction.reject(Rejection::UnknownFloor(floor));
                    return;
                };
                match self.interaction.map_click(floor, at, graph.image_size()) {
                    Ok(candidate) => reaction.notices.push(Notice::ChooseNodeType(candidate)),
                    Err(rejection) => reaction.reject(rejection),
                }
            }
            UserAction::ChooseNodeType(node_type) => {
                match self.interaction.choose_node_type(&node_type, &self.node_types) {
                    Ok(intent) => {
                        debug!(
                            "creating {} node at ({}, {}) on floor {}",
                            intent.node_type, intent.x_px, intent.y_px, intent.floor
                        );
                        reaction.commands.push(Command::CreateNode(intent));
                    }
                    Err(rejection) => reaction.reject(rejection),
                }
            }
            UserAction::CancelNodeType => {
                self.interaction.cancel_node_type();
            }
            UserAction::ToggleEdgeMode => {
                let on = self.interaction.toggle_edge_mode();
                reaction.notices.push(Notice::EdgeMode(on));
            }
            UserAction::NodeClick { floor, node } => {
                let store = &self.store;
                let progress = self
                    .interaction
                    .node_click(floor, node, |id| store.confirmed().contains(id));
                match progress {
                    Ok(EdgeProgress::Ignored) => {}
                    Ok(EdgeProgress::FirstEndpoint(id)) => {
                        reaction.notices.push(Notice::EdgeEndpointPicked(id));
                    }
                    Ok(EdgeProgress::Complete(intent)) => {
                        debug!(
                            "creating edge {} -> {} on floor {}",
                            intent.from, intent.to, intent.floor
                        );
                        reaction.commands.push(Command::CreateEdge(intent));
                        reaction.notices.push(Notice::EdgeMode(false));
                    }
                    Err(rejection) => reaction.reject(rejection),
                }
            }
            UserAction::DisableEdge { floor, edge } => {
                let active = self.store.floor(floor).is_some_and(|g| {
                    g.edges().iter().any(|e| e.id == Some(edge) && e.active)
                });
                if active {
                    reaction.commands.push(Command::DisableEdge { floor, edge });
                } else {
                    reaction.reject(Rejection::UnknownEdge(edge, floor));
                }
            }
            UserAction::ReloadGraph => reaction.commands.push(Command::TriggerReload),
        }
    }

    fn on_event(&mut self, event: ServerEvent, reaction: &mut Reaction) {
        match event {
            ServerEvent::Reload => {
                debug!("reload signal");
                self.fetch_all(reaction);
            }
            ServerEvent::NodeCreated(node) => self.admit_node(node, reaction),
            ServerEvent::NodeAccepted(node) => {
                if self.interaction.release().is_some() {
                    debug!("pending node accepted as node {}", node.id);
                }
                self.admit_node(node, reaction);
            }
            ServerEvent::EdgeCreated(edge) => self.admit_edge(edge, reaction),
            ServerEvent::IntentRejected { intent, reason } => {
                self.on_completion(rejected_intent(intent, reason), reaction)
            }
        }
    }

    fn on_completion(&mut self, completion: Completion, reaction: &mut Reaction) {
        match completion {
            Completion::GraphFetched {
                floor,
                generation,
                result,
            } => self.on_graph_fetched(floor, generation, result, reaction),
            Completion::NodeCreated { intent, result } => {
                self.interaction.release();
                match result {
                    Ok(node) => self.admit_node(node, reaction),
                    Err(e) => reaction.fail(
                        format!("create {} node on floor {}", intent.node_type, intent.floor),
                        &e,
                    ),
                }
            }
            Completion::EdgeCreated { intent, result } => match result {
                Ok(edge) => {
                    let edge = edge.unwrap_or(Edge {
                        id: None,
                        floor: intent.floor,
                        from: intent.from,
                        to: intent.to,
                        active: true,
                    });
                    self.admit_edge(edge, reaction);
                }
                Err(e) => reaction.fail(
                    format!("create edge {} -> {}", intent.from, intent.to),
                    &e,
                ),
            },
            Completion::EdgeDisabled {
                floor,
                edge,
                result,
            } => match result {
                Ok(()) => {
                    if let Some(graph) = self.store.floor_mut(floor) {
                        if graph.deactivate_edge(edge) {
                            reaction.redraw.insert(floor);
                        }
                    }
                }
                Err(e) => reaction.fail(format!("disable edge {}", edge), &e),
            },
            Completion::ReloadTriggered(result) => match result {
                Ok(()) => self.fetch_all(reaction),
                Err(e) => reaction.fail("reload the graph".to_string(), &e),
            },
        }
    }

    fn on_graph_fetched(
        &mut self,
        floor: Floor,
        generation: u64,
        result: Result<GraphPayload, ClientError>,
        reaction: &mut Reaction,
    ) {
        let Some(graph) = self.store.floor(floor) else {
            return;
        };
        if !graph.is_current_fetch(generation) {
            debug!("discarding stale graph for floor {} (generation {})", floor, generation);
            return;
        }
        let result = result.and_then(|payload| {
            validate_payload(floor, &payload).map_err(ClientError::Malformed)?;
            Ok(payload)
        });
        match result {
            Ok(payload) => {
                debug!(
                    "floor {} loaded: {} nodes, {} arcs",
                    floor,
                    payload.nodes.len(),
                    payload.arcs.len()
                );
                self.store.load(floor, payload);
            }
            Err(e) => {
                self.store.fail(floor);
                reaction.fail(format!("load floor {}", floor), &e);
            }
        }
        reaction.redraw.insert(floor);
    }

    fn fetch(&mut self, floor: Floor, reaction: &mut Reaction) {
        if let Some(graph) = self.store.floor_mut(floor) {
            let generation = graph.begin_fetch();
            reaction.commands.push(Command::FetchGraph {
                image: graph.image().clone(),
                generation,
            });
        }
    }

    fn fetch_all(&mut self, reaction: &mut Reaction) {
        for floor in self.store.floor_ids() {
            self.fetch(floor, reaction);
        }
    }

    fn admit_node(&mut self, node: Node, reaction: &mut Reaction) {
        match dedup::node_admission(&self.store, &node) {
            Admission::Duplicate => debug!("node {} already shown", node.id),
            Admission::Admit | Admission::NotDisplayed => {
                reaction.redraw.extend(self.store.add_node(node));
            }
        }
    }

    fn admit_edge(&mut self, edge: Edge, reaction: &mut Reaction) {
        match dedup::edge_admission(&self.store, &edge) {
            Admission::Admit => {
                let floor = edge.floor;
                if self.store.add_edge(edge) {
                    reaction.redraw.insert(floor);
                }
            }
            Admission::Duplicate => debug!("edge {} -> {} already shown", edge.from, edge.to),
            Admission::NotDisplayed => {}
        }
    }
}

/// A refusal of a channel-routed intent ends it exactly like a failed call.
fn rejected_intent(intent: ClientIntent, reason: String) -> Completion {
    match intent {
        ClientIntent::NewNode {
            x_px,
            y_px,
            floor,
            node_type,
            image_height,
        } => Completion::NodeCreated {
            intent: NodeIntent {
                floor,
                x_px,
                y_px,
                node_type,
                image_height,
            },
            result: Err(ClientError::Server(reason)),
        },
        ClientIntent::CreateEdge { from, to, floor } => Completion::EdgeCreated {
            intent: EdgeIntent { floor, from, to },
            result: Err(ClientError::Server(reason)),
        },
    }
}

/// Reject payloads that cannot be a consistent graph of `floor`.
fn validate_payload(floor: Floor, payload: &GraphPayload) -> Result<(), String> {
    let mut seen = HashSet::new();
    for node in &payload.nodes {
        if !seen.insert(node.id) {
            return Err(format!("node {} appears twice", node.id));
        }
    }
    if let Some(edge) = payload.arcs.iter().find(|e| e.floor != floor) {
        return Err(format!(
            "edge {} -> {} belongs to floor {}",
            edge.from, edge.to, edge.floor
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::{edge, image, node, payload};
    use floorgraph_shared::transform::pixel_to_render;

    fn catalog() -> Vec<NodeType> {
        vec![
            NodeType {
                node_type: "room".to_string(),
                display_name: "Room".to_string(),
            },
            NodeType {
                node_type: "stairs".to_string(),
                display_name: "Stairs".to_string(),
            },
        ]
    }

    fn generation_of(reaction: &Reaction, floor: Floor) -> u64 {
        reaction
            .commands
            .iter()
            .find_map(|c| match c {
                Command::FetchGraph { image, generation } if image.floor == floor => Some(*generation),
                _ => None,
            })
            .expect("no fetch for floor")
    }

    /// Client with floors 1 and 2 loaded: floor 1 has nodes 1..=3 and edge 10
    /// between 1 and 2, floor 2 has nodes 20 and 21 joined by edge 30.
    fn loaded_client() -> SyncClient {
        let mut client = SyncClient::new(catalog());
        for (floor, nodes, arcs) in [
            (
                1,
                vec![node(1, 1, 0, 0), node(2, 1, 10, 10), node(3, 1, 20, 20)],
                vec![edge(Some(10), 1, 1, 2)],
            ),
            (
                2,
                vec![node(20, 2, 0, 0), node(21, 2, 5, 5)],
                vec![edge(Some(30), 2, 20, 21)],
            ),
        ] {
            let r = client.display_floor(image(floor));
            let generation = generation_of(&r, floor);
            client.handle(Input::Done(Completion::GraphFetched {
                floor,
                generation,
                result: Ok(payload(floor, nodes, arcs)),
            }));
        }
        client
    }

    fn action(client: &mut SyncClient, action: UserAction) -> Reaction {
        client.handle(Input::Action(action))
    }

    fn marker_count(client: &SyncClient, floor: Floor) -> usize {
        client.store().floor(floor).unwrap().markers().count()
    }

    fn line_count(client: &SyncClient, floor: Floor) -> usize {
        client.store().floor(floor).unwrap().lines().len()
    }

    /// Place a room on floor 1 at pixel (100, 200) and return its intent.
    fn place_room(client: &mut SyncClient) -> NodeIntent {
        let at = pixel_to_render(100, 200, 800);
        let r = action(client, UserAction::MapClick { floor: 1, at });
        assert!(matches!(r.notices[0], Notice::ChooseNodeType(_)));
        let r = action(client, UserAction::ChooseNodeType("room".to_string()));
        match &r.commands[..] {
            [Command::CreateNode(intent)] => intent.clone(),
            other => panic!("unexpected commands {:?}", other),
        }
    }

    fn server_record(intent: &NodeIntent, id: NodeId) -> Node {
        let mut n = node(id, intent.floor, intent.x_px, intent.y_px);
        n.node_type = intent.node_type.clone();
        n
    }

    fn pick_edge(client: &mut SyncClient, from: NodeId, to: NodeId) -> Reaction {
        action(client, UserAction::ToggleEdgeMode);
        action(client, UserAction::NodeClick { floor: 1, node: from });
        action(client, UserAction::NodeClick { floor: 1, node: to })
    }

    #[test]
    fn test_display_floor_requests_graph_once() {
        let mut client = SyncClient::new(vec![]);
        let r = client.display_floor(image(1));
        assert_eq!(r.commands.len(), 1);
        assert!(client.display_floor(image(1)).commands.is_empty());
    }

    #[test]
    fn test_loaded_nodes_are_drawn_and_confirmed() {
        let client = loaded_client();
        assert_eq!(marker_count(&client, 1), 3);
        assert_eq!(line_count(&client, 1), 1);
        assert!(client.store().confirmed().contains(21));
    }

    #[test]
    fn test_node_created_twice_draws_one_marker() {
        let mut client = loaded_client();
        let event = ServerEvent::NodeCreated(node(4, 1, 50, 50));
        let first = client.handle(Input::Event(event.clone()));
        let second = client.handle(Input::Event(event));
        assert!(first.redraw.contains(&1));
        assert!(second.redraw.is_empty());
        assert_eq!(marker_count(&client, 1), 4);
    }

    #[test]
    fn test_edge_created_twice_in_either_order_draws_one_line() {
        let mut client = loaded_client();
        client.handle(Input::Event(ServerEvent::EdgeCreated(edge(Some(11), 1, 2, 3))));
        client.handle(Input::Event(ServerEvent::EdgeCreated(edge(Some(11), 1, 2, 3))));
        client.handle(Input::Event(ServerEvent::EdgeCreated(edge(None, 1, 3, 2))));
        assert_eq!(line_count(&client, 1), 2);
    }

    #[test]
    fn test_direct_response_then_broadcast_draws_once() {
        let mut client = loaded_client();
        let intent = place_room(&mut client);
        let record = server_record(&intent, 4);

        client.handle(Input::Done(Completion::NodeCreated {
            intent: intent.clone(),
            result: Ok(record.clone()),
        }));
        assert!(!client.interaction().is_locked());
        client.handle(Input::Event(ServerEvent::NodeCreated(record)));

        assert_eq!(marker_count(&client, 1), 4);
    }

    #[test]
    fn test_broadcast_then_direct_response_draws_once() {
        let mut client = loaded_client();
        let intent = place_room(&mut client);
        let record = server_record(&intent, 4);

        client.handle(Input::Event(ServerEvent::NodeCreated(record.clone())));
        assert!(client.interaction().is_locked());
        client.handle(Input::Done(Completion::NodeCreated {
            intent,
            result: Ok(record),
        }));

        assert!(!client.interaction().is_locked());
        assert_eq!(marker_count(&client, 1), 4);
    }

    #[test]
    fn test_broadcast_redraws_node_dropped_by_older_reload() {
        let mut client = loaded_client();
        let r = client.handle(Input::Event(ServerEvent::Reload));
        let generation = generation_of(&r, 1);
        let intent = place_room(&mut client);
        let record = server_record(&intent, 4);

        client.handle(Input::Done(Completion::NodeCreated {
            intent,
            result: Ok(record.clone()),
        }));
        assert_eq!(marker_count(&client, 1), 4);

        // The reload was answered before node 4 was stored.
        client.handle(Input::Done(Completion::GraphFetched {
            floor: 1,
            generation,
            result: Ok(payload(
                1,
                vec![node(1, 1, 0, 0), node(2, 1, 10, 10), node(3, 1, 20, 20)],
                vec![edge(Some(10), 1, 1, 2)],
            )),
        }));
        assert_eq!(marker_count(&client, 1), 3);

        let r = client.handle(Input::Event(ServerEvent::NodeCreated(record)));
        assert!(r.redraw.contains(&1));
        assert!(client.store().floor(1).unwrap().has_marker(4));
        assert_eq!(marker_count(&client, 1), 4);
    }

    #[test]
    fn test_lock_blocks_gestures_until_confirmation() {
        let mut client = loaded_client();
        let intent = place_room(&mut client);

        let r = action(
            &mut client,
            UserAction::MapClick {
                floor: 2,
                at: pixel_to_render(1, 1, 800),
            },
        );
        assert_eq!(r.notices, vec![Notice::Rejected(Rejection::CreationPending)]);

        action(&mut client, UserAction::ToggleEdgeMode);
        let r = action(&mut client, UserAction::NodeClick { floor: 1, node: 1 });
        assert!(r.notices.contains(&Notice::Rejected(Rejection::CreationPending)));
        assert!(r.commands.is_empty());

        // Creations by other clients do not release the lock.
        client.handle(Input::Event(ServerEvent::NodeCreated(node(99, 2, 3, 3))));
        assert!(client.interaction().is_locked());

        client.handle(Input::Done(Completion::NodeCreated {
            intent: intent.clone(),
            result: Ok(server_record(&intent, 4)),
        }));
        assert!(!client.interaction().is_locked());
        let r = action(&mut client, UserAction::NodeClick { floor: 1, node: 4 });
        assert_eq!(r.notices, vec![Notice::EdgeEndpointPicked(4)]);
    }

    #[test]
    fn test_identical_placement_elsewhere_keeps_lock() {
        let mut client = loaded_client();
        let intent = place_room(&mut client);

        // Same floor, pixel and type, placed by another client.
        let r = client.handle(Input::Event(ServerEvent::NodeCreated(server_record(&intent, 98))));
        assert!(r.redraw.contains(&1));
        assert!(client.interaction().is_locked());
        let r = action(&mut client, UserAction::NodeClick { floor: 1, node: 98 });
        assert!(r.notices.contains(&Notice::Rejected(Rejection::CreationPending)));

        client.handle(Input::Event(ServerEvent::NodeAccepted(server_record(&intent, 99))));
        assert!(!client.interaction().is_locked());
        assert_eq!(marker_count(&client, 1), 5);
    }

    #[test]
    fn test_accepted_node_after_its_broadcast_draws_once() {
        let mut client = loaded_client();
        let intent = place_room(&mut client);
        let record = server_record(&intent, 4);

        client.handle(Input::Event(ServerEvent::NodeCreated(record.clone())));
        let r = client.handle(Input::Event(ServerEvent::NodeAccepted(record)));
        assert!(r.redraw.is_empty());
        assert!(!client.interaction().is_locked());
        assert_eq!(marker_count(&client, 1), 4);
    }

    #[test]
    fn test_failed_creation_releases_lock_and_notifies() {
        let mut client = loaded_client();
        let intent = place_room(&mut client);
        let r = client.handle(Input::Done(Completion::NodeCreated {
            intent,
            result: Err(ClientError::Server("boom".to_string())),
        }));
        assert!(!client.interaction().is_locked());
        assert!(matches!(r.notices[0], Notice::Failed { .. }));
        assert_eq!(marker_count(&client, 1), 3);
    }

    #[test]
    fn test_refused_channel_intent_releases_lock() {
        let mut client = loaded_client();
        let intent = place_room(&mut client);
        let r = client.handle(Input::Event(ServerEvent::IntentRejected {
            intent: ClientIntent::from(&intent),
            reason: "Unknown node type: room".to_string(),
        }));
        assert!(!client.interaction().is_locked());
        assert_eq!(
            r.notices,
            vec![Notice::Failed {
                what: "create room node on floor 1".to_string(),
                reason: "Unknown node type: room".to_string(),
            }]
        );
        let r = action(
            &mut client,
            UserAction::MapClick {
                floor: 1,
                at: pixel_to_render(5, 5, 800),
            },
        );
        assert!(matches!(r.notices[0], Notice::ChooseNodeType(_)));
    }

    #[test]
    fn test_refused_channel_edge_is_reported() {
        let mut client = loaded_client();
        let r = client.handle(Input::Event(ServerEvent::IntentRejected {
            intent: ClientIntent::CreateEdge { from: 1, to: 3, floor: 1 },
            reason: "Nodes 1 and 3 are already connected".to_string(),
        }));
        assert!(matches!(&r.notices[0], Notice::Failed { reason, .. } if reason.contains("already connected")));
        assert_eq!(line_count(&client, 1), 1);
    }

    #[test]
    fn test_unknown_node_type_is_rejected_without_a_call() {
        let mut client = loaded_client();
        action(
            &mut client,
            UserAction::MapClick {
                floor: 1,
                at: pixel_to_render(5, 5, 800),
            },
        );
        let r = action(&mut client, UserAction::ChooseNodeType("lift".to_string()));
        assert!(r.commands.is_empty());
        assert!(!client.interaction().is_locked());
    }

    #[test]
    fn test_cancel_node_type_sends_nothing() {
        let mut client = loaded_client();
        action(
            &mut client,
            UserAction::MapClick {
                floor: 1,
                at: pixel_to_render(5, 5, 800),
            },
        );
        let r = action(&mut client, UserAction::CancelNodeType);
        assert!(r.commands.is_empty());
        let r = action(&mut client, UserAction::ChooseNodeType("room".to_string()));
        assert_eq!(r.notices, vec![Notice::Rejected(Rejection::NoCandidate)]);
    }

    #[test]
    fn test_map_click_on_hidden_floor_is_rejected() {
        let mut client = loaded_client();
        let r = action(
            &mut client,
            UserAction::MapClick {
                floor: 7,
                at: pixel_to_render(5, 5, 800),
            },
        );
        assert_eq!(r.notices, vec![Notice::Rejected(Rejection::UnknownFloor(7))]);
    }

    #[test]
    fn test_self_selection_aborts_without_a_call() {
        let mut client = loaded_client();
        let r = pick_edge(&mut client, 2, 2);
        assert!(r.commands.is_empty());
        assert!(r.notices.contains(&Notice::Rejected(Rejection::SameNode(2))));
        assert_eq!(client.interaction().collected_endpoints(), 0);
        assert!(client.interaction().in_edge_mode());
    }

    #[test]
    fn test_unconfirmed_endpoint_is_rejected() {
        let mut client = loaded_client();
        action(&mut client, UserAction::ToggleEdgeMode);
        let r = action(&mut client, UserAction::NodeClick { floor: 1, node: 77 });
        assert_eq!(r.notices, vec![Notice::Rejected(Rejection::Unconfirmed(77))]);
        assert!(client.interaction().in_edge_mode());
    }

    #[test]
    fn test_edge_success_draws_immediately() {
        let mut client = loaded_client();
        let r = pick_edge(&mut client, 2, 3);
        let Some(Command::CreateEdge(intent)) = r.commands.first().cloned() else {
            panic!("no edge command");
        };
        assert!(r.notices.contains(&Notice::EdgeMode(false)));

        let r = client.handle(Input::Done(Completion::EdgeCreated {
            intent,
            result: Ok(Some(edge(Some(11), 1, 2, 3))),
        }));
        assert!(r.redraw.contains(&1));
        assert_eq!(line_count(&client, 1), 2);

        client.handle(Input::Event(ServerEvent::EdgeCreated(edge(Some(11), 1, 2, 3))));
        assert_eq!(line_count(&client, 1), 2);
    }

    #[test]
    fn test_edge_success_without_record_is_synthesised() {
        let mut client = loaded_client();
        let intent = EdgeIntent { floor: 1, from: 1, to: 3 };
        client.handle(Input::Done(Completion::EdgeCreated {
            intent,
            result: Ok(None),
        }));
        assert!(client
            .store()
            .floor(1)
            .unwrap()
            .has_line(floorgraph_shared::models::EdgeKey::new(3, 1)));

        // The broadcast carries the id; the endpoint pair still matches.
        client.handle(Input::Event(ServerEvent::EdgeCreated(edge(Some(12), 1, 3, 1))));
        assert_eq!(line_count(&client, 1), 2);
    }

    #[test]
    fn test_edge_failure_draws_nothing() {
        let mut client = loaded_client();
        let intent = EdgeIntent { floor: 1, from: 1, to: 3 };
        let r = client.handle(Input::Done(Completion::EdgeCreated {
            intent,
            result: Err(ClientError::Status(reqwest::StatusCode::INTERNAL_SERVER_ERROR)),
        }));
        assert_eq!(line_count(&client, 1), 1);
        assert!(matches!(r.notices[0], Notice::Failed { .. }));
    }

    #[test]
    fn test_reload_signal_refetches_every_floor() {
        let mut client = loaded_client();
        let r = client.handle(Input::Event(ServerEvent::Reload));
        assert_eq!(r.commands.len(), 2);
        generation_of(&r, 1);
        generation_of(&r, 2);
    }

    #[test]
    fn test_reload_of_one_floor_leaves_other_floor_intact() {
        let mut client = loaded_client();
        // Edge creation in flight on floor 1.
        let r = pick_edge(&mut client, 2, 3);
        assert_eq!(r.commands.len(), 1);
        let before: Vec<_> = client.store().floor(1).unwrap().lines().to_vec();

        // Floor 2 reloads with a different graph.
        let generation = client.store.floor_mut(2).unwrap().begin_fetch();
        let r = client.handle(Input::Done(Completion::GraphFetched {
            floor: 2,
            generation,
            result: Ok(payload(2, vec![node(22, 2, 1, 1)], vec![])),
        }));

        assert_eq!(r.redraw.iter().copied().collect::<Vec<_>>(), vec![2]);
        assert_eq!(client.store().floor(1).unwrap().lines(), &before[..]);
        assert_eq!(marker_count(&client, 1), 3);
        assert_eq!(marker_count(&client, 2), 1);
    }

    #[test]
    fn test_stale_fetch_is_discarded() {
        let mut client = loaded_client();
        let r1 = client.handle(Input::Event(ServerEvent::Reload));
        let r2 = client.handle(Input::Event(ServerEvent::Reload));
        let old = generation_of(&r1, 1);
        let new = generation_of(&r2, 1);

        client.handle(Input::Done(Completion::GraphFetched {
            floor: 1,
            generation: new,
            result: Ok(payload(1, vec![node(1, 1, 0, 0)], vec![])),
        }));
        let r = client.handle(Input::Done(Completion::GraphFetched {
            floor: 1,
            generation: old,
            result: Ok(payload(1, vec![node(5, 1, 0, 0), node(6, 1, 1, 1)], vec![])),
        }));

        assert!(r.redraw.is_empty());
        assert_eq!(marker_count(&client, 1), 1);
    }

    #[test]
    fn test_malformed_payload_clears_only_its_floor() {
        let mut client = loaded_client();
        let r = client.handle(Input::Event(ServerEvent::Reload));
        let generation = generation_of(&r, 1);
        let r = client.handle(Input::Done(Completion::GraphFetched {
            floor: 1,
            generation,
            result: Ok(payload(1, vec![node(1, 1, 0, 0), node(1, 1, 5, 5)], vec![])),
        }));
        assert!(matches!(r.notices[0], Notice::Failed { .. }));
        assert_eq!(marker_count(&client, 1), 0);
        assert_eq!(line_count(&client, 1), 0);
        assert_eq!(marker_count(&client, 2), 2);
        assert_eq!(line_count(&client, 2), 1);
    }

    #[test]
    fn test_transport_failure_clears_floor() {
        let mut client = loaded_client();
        let r = client.handle(Input::Event(ServerEvent::Reload));
        let generation = generation_of(&r, 2);
        client.handle(Input::Done(Completion::GraphFetched {
            floor: 2,
            generation,
            result: Err(ClientError::ChannelClosed),
        }));
        assert_eq!(marker_count(&client, 2), 0);
        assert_eq!(marker_count(&client, 1), 3);
    }

    #[test]
    fn test_disable_edge_flow() {
        let mut client = loaded_client();
        let r = action(&mut client, UserAction::DisableEdge { floor: 1, edge: 10 });
        assert_eq!(r.commands, vec![Command::DisableEdge { floor: 1, edge: 10 }]);

        let r = client.handle(Input::Done(Completion::EdgeDisabled {
            floor: 1,
            edge: 10,
            result: Ok(()),
        }));
        assert!(r.redraw.contains(&1));
        assert_eq!(line_count(&client, 1), 0);

        let r = action(&mut client, UserAction::DisableEdge { floor: 1, edge: 10 });
        assert!(r.commands.is_empty());
        assert_eq!(r.notices, vec![Notice::Rejected(Rejection::UnknownEdge(10, 1))]);
    }

    #[test]
    fn test_reload_graph_action_refetches_after_success() {
        let mut client = loaded_client();
        let r = action(&mut client, UserAction::ReloadGraph);
        assert_eq!(r.commands, vec![Command::TriggerReload]);
        let r = client.handle(Input::Done(Completion::ReloadTriggered(Ok(()))));
        assert_eq!(r.commands.len(), 2);
    }

    #[test]
    fn test_notice_messages() {
        assert_eq!(
            Notice::Rejected(Rejection::SameNode(3)).to_string(),
            Rejection::SameNode(3).to_string()
        );
        assert_eq!(
            Notice::Failed {
                what: "load floor 1".to_string(),
                reason: "timeout".to_string()
            }
            .to_string(),
            "Failed to load floor 1: timeout"
        );
    }
}
