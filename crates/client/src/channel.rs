//! Realtime websocket channel.
//!
//! One reader task turns text frames into [`ServerEvent`]s. Frames that do
//! not decode are logged and dropped. The connection is not re-established
//! once it closes.
use std::sync::Arc;

use floorgraph_shared::protocol::{ClientIntent, ServerEvent};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::error::{ClientError, Result};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// Buffered server events not yet picked up by the engine.
const EVENT_BUFFER: usize = 256;

/// Write half of the channel, for intents routed over the socket.
#[derive(Clone)]
pub struct ChannelSender {
    sink: Arc<Mutex<WsSink>>,
}

impl ChannelSender {
    /// Send one intent. A write failure is final for that intent.
    pub async fn send(&self, intent: &ClientIntent) -> Result<()> {
        let mut sink = self.sink.lock().await;
        sink.send(Message::Text(intent.encode()))
            .await
            .map_err(send_error)
    }
}

fn send_error(e: WsError) -> ClientError {
    match e {
        WsError::ConnectionClosed | WsError::AlreadyClosed => ClientError::ChannelClosed,
        other => ClientError::Channel(other),
    }
}

/// Open the channel. Events arrive on the returned receiver until the socket
/// closes.
pub async fn connect(url: &str) -> Result<(ChannelSender, mpsc::Receiver<ServerEvent>)> {
    let (socket, _) = tokio_tungstenite::connect_async(url).await?;
    tracing::info!(url, "Realtime channel connected");
    let (sink, mut stream) = socket.split();
    let (tx, rx) = mpsc::channel(EVENT_BUFFER);

    tokio::spawn(async move {
        while let Some(frame) = stream.next().await {
            let message = match frame {
                Ok(message) => message,
                Err(e) => {
                    tracing::warn!(error = %e, "Realtime channel read failed");
                    break;
                }
            };
            if message.is_close() {
                break;
            }
            let Some(event) = decode_frame(&message) else {
                continue;
            };
            if tx.send(event).await.is_err() {
                break;
            }
        }
        tracing::info!("Realtime channel closed");
    });

    Ok((
        ChannelSender {
            sink: Arc::new(Mutex::new(sink)),
        },
        rx,
    ))
}

/// Decode a data frame. Control frames yield nothing.
pub fn decode_frame(message: &Message) -> Option<ServerEvent> {
    let text = match message {
        Message::Text(text) => text.as_str(),
        Message::Binary(bytes) => match std::str::from_utf8(bytes) {
            Ok(text) => text,
            Err(_) => {
                tracing::warn!(len = bytes.len(), "Dropping non-UTF-8 binary frame");
                return None;
            }
        },
        _ => return None,
    };
    match ServerEvent::decode(text) {
        Ok(event) => Some(event),
        Err(e) => {
            tracing::warn!(error = %e, frame = text, "Dropping undecodable frame");
            None
        }
    }
}
