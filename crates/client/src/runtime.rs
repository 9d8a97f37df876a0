//! Async shell around [`SyncClient`].
//!
//! Server events, operator actions and completed calls are multiplexed into
//! one loop. Each [`Command`] runs on its own task and reports back through a
//! completion channel, so a slow fetch never blocks gesture handling.
use std::sync::Arc;

use floorgraph_shared::protocol::{ClientIntent, ServerEvent};
use tokio::sync::mpsc;

use crate::api::GraphBackend;
use crate::channel::ChannelSender;
use crate::error::Result;
use crate::store::FloorGraph;
use crate::sync::{Command, Completion, Input, Notice, Reaction, SyncClient, UserAction};

/// Where the engine's output goes.
pub trait Surface: Send {
    /// Redraw one floor from scratch.
    fn render(&mut self, floor: &FloorGraph);
    fn notify(&mut self, notice: &Notice);
}

/// Transport for creation intents.
#[derive(Clone)]
pub enum Dispatch {
    Http,
    Channel(ChannelSender),
}

pub struct Runtime<B: GraphBackend> {
    client: SyncClient,
    backend: Arc<B>,
    dispatch: Dispatch,
    done_tx: mpsc::UnboundedSender<Completion>,
    done_rx: mpsc::UnboundedReceiver<Completion>,
}

impl<B: GraphBackend + 'static> Runtime<B> {
    /// Load the node type catalog and build the engine. A missing catalog
    /// leaves node type choice unrestricted.
    pub async fn connect(backend: Arc<B>, dispatch: Dispatch) -> Self {
        let node_types = match backend.node_types().await {
            Ok(types) => types,
            Err(e) => {
                tracing::error!(error = %e, "Failed to load node types");
                Vec::new()
            }
        };
        tracing::info!(node_types = node_types.len(), "Loaded node type catalog");
        let (done_tx, done_rx) = mpsc::unbounded_channel();
        Runtime {
            client: SyncClient::new(node_types),
            backend,
            dispatch,
            done_tx,
            done_rx,
        }
    }

    pub fn client(&self) -> &SyncClient {
        &self.client
    }

    /// Display every floor the backend knows, then process inputs until the
    /// operator's action stream ends.
    pub async fn run<S: Surface>(
        mut self,
        mut events: mpsc::Receiver<ServerEvent>,
        mut actions: mpsc::Receiver<UserAction>,
        surface: &mut S,
    ) -> Result<()> {
        let images = self.backend.images().await?;
        tracing::info!(floors = images.len(), "Loaded floor images");
        for image in images {
            let reaction = self.client.display_floor(image);
            self.apply(reaction, surface);
        }

        let mut events_open = true;
        loop {
            let input = tokio::select! {
                event = events.recv(), if events_open => match event {
                    Some(event) => Input::Event(event),
                    None => {
                        tracing::warn!("Realtime channel ended, continuing without updates");
                        events_open = false;
                        continue;
                    }
                },
                action = actions.recv() => match action {
                    Some(action) => Input::Action(action),
                    None => break,
                },
                Some(done) = self.done_rx.recv() => Input::Done(done),
            };
            let reaction = self.client.handle(input);
            self.apply(reaction, surface);
        }
        tracing::info!("Operator input closed, stopping");
        Ok(())
    }

    fn apply<S: Surface>(&mut self, reaction: Reaction, surface: &mut S) {
        let Reaction {
            commands,
            redraw,
            notices,
        } = reaction;
        for command in commands {
            self.spawn(command);
        }
        for floor in redraw {
            if let Some(graph) = self.client.store().floor(floor) {
                surface.render(graph);
            }
        }
        for notice in &notices {
            surface.notify(notice);
        }
    }

    fn spawn(&self, command: Command) {
        let backend = Arc::clone(&self.backend);
        let done = self.done_tx.clone();
        match command {
            Command::FetchGraph { image, generation } => {
                tokio::spawn(async move {
                    let floor = image.floor;
                    let result = backend.graph(floor).await;
                    let _ = done.send(Completion::GraphFetched {
                        floor,
                        generation,
                        result,
                    });
                });
            }
            Command::CreateNode(intent) => match &self.dispatch {
                Dispatch::Http => {
                    tokio::spawn(async move {
                        let result = backend.create_node(&intent).await;
                        let _ = done.send(Completion::NodeCreated { intent, result });
                    });
                }
                Dispatch::Channel(sender) => {
                    let sender = sender.clone();
                    tokio::spawn(async move {
                        // The outcome comes back on the socket.
                        if let Err(e) = sender.send(&ClientIntent::from(&intent)).await {
                            let _ = done.send(Completion::NodeCreated {
                                intent,
                                result: Err(e),
                            });
                        }
                    });
                }
            },
            Command::CreateEdge(intent) => match &self.dispatch {
                Dispatch::Http => {
                    tokio::spawn(async move {
                        let result = backend.create_edge(&intent).await;
                        let _ = done.send(Completion::EdgeCreated { intent, result });
                    });
                }
                Dispatch::Channel(sender) => {
                    let sender = sender.clone();
                    tokio::spawn(async move {
                        if let Err(e) = sender.send(&ClientIntent::from(&intent)).await {
                            let _ = done.send(Completion::EdgeCreated {
                                intent,
                                result: Err(e),
                            });
                        }
                    });
                }
            },
            Command::DisableEdge { floor, edge } => {
                tokio::spawn(async move {
                    let result = backend.disable_edge(edge).await;
                    let _ = done.send(Completion::EdgeDisabled {
                        floor,
                        edge,
                        result,
                    });
                });
            }
            Command::TriggerReload => {
                tokio::spawn(async move {
                    let result = backend.reload_graph().await;
                    let _ = done.send(Completion::ReloadTriggered(result));
                });
            }
        }
    }
}
