//! Realtime fan-out.
//!
//! Every socket subscribes to one broadcast channel. Text frames from a
//! socket are read as [`ClientIntent`]s and applied like the matching
//! mutation. Success comes back to everyone through the broadcast. The
//! sender alone also gets the stored node, or the refusal.
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use floorgraph_shared::protocol::{ClientIntent, ServerEvent};
use futures::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

use crate::service::GraphService;

const HUB_CAPACITY: usize = 256;

#[derive(Clone)]
pub struct Hub {
    tx: broadcast::Sender<ServerEvent>,
}

impl Hub {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(HUB_CAPACITY);
        Hub { tx }
    }

    /// Send to every connected socket. Having none is not an error.
    pub fn publish(&self, event: ServerEvent) {
        let receivers = self.tx.send(event).unwrap_or(0);
        tracing::debug!(receivers, "Published event");
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.tx.subscribe()
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new()
    }
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(service): State<Arc<GraphService>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, service))
}

async fn handle_socket(socket: WebSocket, service: Arc<GraphService>) {
    let session = Uuid::new_v4();
    tracing::info!(%session, "Client connected");
    let (mut sink, mut stream) = socket.split();
    let mut rx = service.hub.subscribe();
    let (direct_tx, mut direct_rx) = mpsc::unbounded_channel::<ServerEvent>();

    let mut send_task = tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                Some(event) = direct_rx.recv() => event,
                received = rx.recv() => match received {
                    Ok(event) => event,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        // Missed events: make the client refetch everything.
                        tracing::warn!(%session, skipped, "Client lagged behind the hub");
                        ServerEvent::Reload
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            };
            if sink.send(Message::Text(event.encode().into())).await.is_err() {
                break;
            }
        }
    });

    let recv_service = Arc::clone(&service);
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(message)) = stream.next().await {
            match message {
                Message::Text(text) => {
                    if let Some(reply) = handle_intent(&recv_service, session, text.as_str()) {
                        if direct_tx.send(reply).is_err() {
                            break;
                        }
                    }
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }
    tracing::info!(%session, "Client disconnected");
}

/// Apply one intent frame. Returns the event to send back to this socket
/// alone: the stored node of a node intent, or the refusal.
fn handle_intent(service: &GraphService, session: Uuid, text: &str) -> Option<ServerEvent> {
    let intent = match ClientIntent::decode(text) {
        Ok(intent) => intent,
        Err(e) => {
            tracing::warn!(%session, error = %e, "Dropping undecodable intent");
            return None;
        }
    };
    match service.apply_intent(intent.clone()) {
        Ok(Some(node)) => Some(ServerEvent::NodeAccepted(node)),
        Ok(None) => None,
        Err(reason) => {
            tracing::warn!(%session, error = %reason, "Intent rejected");
            Some(ServerEvent::IntentRejected { intent, reason })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::tests::test_service;

    #[test]
    fn test_publish_without_subscribers() {
        Hub::new().publish(ServerEvent::Reload);
    }

    #[test]
    fn test_every_subscriber_receives() {
        let hub = Hub::new();
        let mut a = hub.subscribe();
        let mut b = hub.clone().subscribe();
        hub.publish(ServerEvent::Reload);
        assert_eq!(a.try_recv().unwrap(), ServerEvent::Reload);
        assert_eq!(b.try_recv().unwrap(), ServerEvent::Reload);
    }

    #[test]
    fn test_node_intent_is_broadcast_and_acknowledged_to_sender() {
        let (_dir, service) = test_service();
        let mut rx = service.hub.subscribe();
        let frame = r#"{"action":"new_node","x_px":5,"y_px":6,"floor":1,"node_type":"room","image_height":800}"#;
        let reply = handle_intent(&service, Uuid::new_v4(), frame);
        let broadcast = rx.try_recv().unwrap();
        match (reply, broadcast) {
            (Some(ServerEvent::NodeAccepted(accepted)), ServerEvent::NodeCreated(created)) => {
                assert_eq!(accepted, created);
                assert_eq!((accepted.x, accepted.y), (5, 6));
            }
            other => panic!("unexpected events {:?}", other),
        }
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_edge_intent_is_only_broadcast() {
        let (_dir, service) = test_service();
        let a = service.create_node(crate::service::tests::room(1, 1, 1)).unwrap();
        let b = service.create_node(crate::service::tests::room(1, 2, 2)).unwrap();
        let mut rx = service.hub.subscribe();
        let frame = ClientIntent::CreateEdge { from: a.id, to: b.id, floor: 1 }.encode();
        assert_eq!(handle_intent(&service, Uuid::new_v4(), &frame), None);
        assert!(matches!(rx.try_recv().unwrap(), ServerEvent::EdgeCreated(_)));
    }

    #[test]
    fn test_undecodable_frame_is_dropped() {
        let (_dir, service) = test_service();
        assert_eq!(handle_intent(&service, Uuid::new_v4(), "hello"), None);
    }

    #[test]
    fn test_refused_node_is_answered_to_sender_only() {
        let (_dir, service) = test_service();
        let mut rx = service.hub.subscribe();
        let frame = r#"{"action":"new_node","x_px":5,"y_px":6,"floor":1,"node_type":"no_such_type","image_height":800}"#;
        match handle_intent(&service, Uuid::new_v4(), frame) {
            Some(ServerEvent::IntentRejected { intent, reason }) => {
                assert!(matches!(intent, ClientIntent::NewNode { x_px: 5, y_px: 6, .. }));
                assert!(reason.contains("Unknown node type"));
            }
            other => panic!("unexpected reply {:?}", other),
        }
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_refused_edge_is_answered() {
        let (_dir, service) = test_service();
        let unknown_nodes = r#"{"action":"create_edge","from":1,"to":2,"floor":1}"#;
        let reply = handle_intent(&service, Uuid::new_v4(), unknown_nodes);
        assert!(matches!(
            reply,
            Some(ServerEvent::IntentRejected { intent: ClientIntent::CreateEdge { from: 1, to: 2, floor: 1 }, .. })
        ));
    }
}
