use std::collections::HashSet;

use axum::extract::ws::Message;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::{
    dto::ws::ServerMessage,
    services::gateway::Gateway,
    state::{registry::ConnectionId, session::SessionId},
};

/// Registry of live sockets and the broadcast groups they joined.
#[derive(Default)]
pub struct ConnectionHub {
    connections: DashMap<ConnectionId, mpsc::UnboundedSender<Message>>,
    groups: DashMap<SessionId, HashSet<ConnectionId>>,
}

impl ConnectionHub {
    /// Hub with no connections or groups.
    pub fn new() -> Self {
        Self::default()
    }

    /// Track the writer channel of a freshly accepted socket.
    pub fn register(&self, connection_id: ConnectionId, tx: mpsc::UnboundedSender<Message>) {
        self.connections.insert(connection_id, tx);
    }

    /// Forget a socket. Group membership is released by the engine on disconnect.
    pub fn unregister(&self, connection_id: ConnectionId) {
        self.connections.remove(&connection_id);
    }

    /// Number of live sockets.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Members of a broadcast group.
    pub fn group_members(&self, session_id: SessionId) -> Vec<ConnectionId> {
        self.groups
            .get(&session_id)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default()
    }

    fn send_text(&self, connection_id: ConnectionId, payload: &str) {
        let Some(tx) = self
            .connections
            .get(&connection_id)
            .map(|entry| entry.value().clone())
        else {
            debug!(%connection_id, "dropping message for unknown connection");
            return;
        };

        if tx.send(Message::Text(payload.to_owned().into())).is_err() {
            warn!(%connection_id, "send failed (writer closed), removing connection");
            self.connections.remove(&connection_id);
        }
    }
}

/// Serialize a message once for fan-out.
///
/// Serialization failure is a bug in the DTOs, so it is logged and the message dropped.
fn encode(message: &ServerMessage) -> Option<String> {
    match serde_json::to_string(message) {
        Ok(payload) => Some(payload),
        Err(err) => {
            warn!(event = message.name(), error = %err, "failed to serialize message");
            None
        }
    }
}

impl Gateway for ConnectionHub {
    fn emit_to(&self, connection_id: ConnectionId, message: &ServerMessage) {
        if let Some(payload) = encode(message) {
            self.send_text(connection_id, &payload);
        }
    }

    fn broadcast_to_group(&self, session_id: SessionId, message: &ServerMessage) {
        let Some(payload) = encode(message) else {
            return;
        };
        for connection_id in self.group_members(session_id) {
            self.send_text(connection_id, &payload);
        }
    }

    fn join_group(&self, connection_id: ConnectionId, session_id: SessionId) {
        self.groups
            .entry(session_id)
            .or_default()
            .insert(connection_id);
    }

    fn leave_group(&self, connection_id: ConnectionId, session_id: SessionId) {
        let now_empty = match self.groups.get_mut(&session_id) {
            Some(mut members) => {
                members.remove(&connection_id);
                members.is_empty()
            }
            None => false,
        };
        if now_empty {
            self.groups
                .remove_if(&session_id, |_, members| members.is_empty());
        }
    }
}
