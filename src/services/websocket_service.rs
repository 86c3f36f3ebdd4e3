use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dto::ws::{ClientMessage, ServerMessage},
    services::engine::EngineCommand,
    state::SharedState,
};

/// The writer task of the socket is gone.
#[derive(Debug, Error)]
#[error("connection closed")]
struct ConnectionClosed;

/// Handle the full lifecycle of one player socket.
pub async fn handle_socket(state: SharedState, socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

    // Dedicated writer task keeps outbound messages flowing even while we await inbound frames.
    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    let connection_id = Uuid::new_v4();
    state.hub.register(connection_id, outbound_tx.clone());
    info!(%connection_id, "socket connected");

    if send_message_to_websocket(&outbound_tx, &ServerMessage::Connected { connection_id }).is_err()
    {
        state.hub.unregister(connection_id);
        finalize(writer_task, outbound_tx).await;
        return;
    }

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => {
                debug!(%connection_id, payload = %text, "received message");
                match ClientMessage::from_json_str(&text) {
                    Ok(message) => {
                        let command = EngineCommand::Inbound {
                            connection_id,
                            message,
                        };
                        if !state.engine.dispatch(command) {
                            warn!(%connection_id, "engine is gone; closing socket");
                            let _ = outbound_tx.send(Message::Close(None));
                            break;
                        }
                    }
                    Err(err) => {
                        warn!(%connection_id, error = %err, "failed to parse or validate message");
                        let reply = ServerMessage::GameError {
                            message: err.to_string(),
                        };
                        if send_message_to_websocket(&outbound_tx, &reply).is_err() {
                            break;
                        }
                    }
                }
            }
            Ok(Message::Ping(payload)) => {
                let _ = outbound_tx.send(Message::Pong(payload));
            }
            Ok(Message::Close(frame)) => {
                info!(%connection_id, "socket closed by peer");
                let _ = outbound_tx.send(Message::Close(frame));
                break;
            }
            Ok(Message::Binary(_)) => {
                debug!(%connection_id, "ignoring binary frame");
            }
            Ok(Message::Pong(_)) => {}
            Err(err) => {
                warn!(%connection_id, error = %err, "websocket error");
                break;
            }
        }
    }

    state
        .engine
        .dispatch(EngineCommand::Disconnected { connection_id });
    state.hub.unregister(connection_id);
    info!(%connection_id, "socket disconnected");

    finalize(writer_task, outbound_tx).await;
}

/// Serialize a payload and push it onto the provided WebSocket sender.
///
/// Serialization failure is a bug in the DTOs and is only logged. A closed writer
/// is reported to the caller so it can stop reading.
fn send_message_to_websocket<T>(
    tx: &mpsc::UnboundedSender<Message>,
    value: &T,
) -> Result<(), ConnectionClosed>
where
    T: ?Sized + serde::Serialize + std::fmt::Debug,
{
    let payload = match serde_json::to_string(value) {
        Ok(payload) => payload,
        Err(err) => {
            warn!(error = %err, "failed to serialize message `{value:?}`");
            return Ok(());
        }
    };

    tx.send(Message::Text(payload.into()))
        .map_err(|_| ConnectionClosed)
}

/// Ensure the writer task winds down before we return from the socket handler.
async fn finalize(writer_task: JoinHandle<()>, outbound_tx: mpsc::UnboundedSender<Message>) {
    drop(outbound_tx);
    let _ = writer_task.await;
}
