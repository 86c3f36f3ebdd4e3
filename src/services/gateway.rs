use crate::{
    dto::ws::ServerMessage,
    state::{registry::ConnectionId, session::SessionId},
};

/// Outbound side of the transport: private emits, group broadcasts and group membership.
pub trait Gateway: Send + Sync {
    /// Send a message to one connection.
    fn emit_to(&self, connection_id: ConnectionId, message: &ServerMessage);
    /// Send a message to every member of a session group.
    fn broadcast_to_group(&self, session_id: SessionId, message: &ServerMessage);
    /// Add a connection to a session group.
    fn join_group(&self, connection_id: ConnectionId, session_id: SessionId);
    /// Remove a connection from a session group.
    fn leave_group(&self, connection_id: ConnectionId, session_id: SessionId);
}
