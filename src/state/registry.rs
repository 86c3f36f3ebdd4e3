use std::collections::HashMap;

use uuid::Uuid;

use crate::error::ProtocolError;

/// Caller-supplied stable player identifier.
pub type PlayerId = String;
/// Identifier allocated to each accepted WebSocket connection.
pub type ConnectionId = Uuid;

/// Presence record for a connected player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
    /// Stable identifier supplied by the client.
    pub id: PlayerId,
    /// Display name shown to opponents.
    pub name: String,
    /// Connection currently bound to this player.
    pub connection_id: ConnectionId,
    /// Queued for matchmaking.
    pub pending: bool,
    /// Inside an active session.
    pub playing: bool,
}

/// Result of a presence announcement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Announce {
    /// First announcement for this player id.
    Registered,
    /// The player id was already known on another connection.
    Rebound {
        /// Connection the player was bound to before.
        previous: ConnectionId,
    },
    /// Exact (player, connection) pair already registered.
    Unchanged,
}

/// Connected players keyed by id, with a connection index for O(1) lookups.
#[derive(Debug, Default)]
pub struct PlayerRegistry {
    players: HashMap<PlayerId, Player>,
    by_connection: HashMap<ConnectionId, PlayerId>,
}

impl PlayerRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or rebind a player. Idempotent for an identical pair.
    ///
    /// A connection already bound to a different player id is refused so one socket
    /// can never speak for two players.
    pub fn announce(
        &mut self,
        player_id: &str,
        name: &str,
        connection_id: ConnectionId,
    ) -> Result<Announce, ProtocolError> {
        if let Some(bound) = self.by_connection.get(&connection_id) {
            if bound != player_id {
                return Err(ProtocolError::ConnectionAlreadyBound);
            }
        }

        match self.players.get_mut(player_id) {
            Some(player) if player.connection_id == connection_id => Ok(Announce::Unchanged),
            Some(player) => {
                let previous = player.connection_id;
                player.connection_id = connection_id;
                player.name = name.to_string();
                self.by_connection.remove(&previous);
                self.by_connection
                    .insert(connection_id, player_id.to_string());
                Ok(Announce::Rebound { previous })
            }
            None => {
                self.players.insert(
                    player_id.to_string(),
                    Player {
                        id: player_id.to_string(),
                        name: name.to_string(),
                        connection_id,
                        pending: false,
                        playing: false,
                    },
                );
                self.by_connection
                    .insert(connection_id, player_id.to_string());
                Ok(Announce::Registered)
            }
        }
    }

    /// Queue the connection's player for matchmaking.
    pub fn mark_pending(&mut self, connection_id: ConnectionId) -> Result<(), ProtocolError> {
        let player = self
            .by_connection_mut(connection_id)
            .ok_or(ProtocolError::UnregisteredConnection)?;
        if player.playing || player.pending {
            return Err(ProtocolError::AlreadyBusy);
        }
        player.pending = true;
        Ok(())
    }

    /// Withdraw the connection's player from matchmaking.
    pub fn clear_pending(&mut self, connection_id: ConnectionId) -> Result<(), ProtocolError> {
        let player = self
            .by_connection_mut(connection_id)
            .ok_or(ProtocolError::UnregisteredConnection)?;
        player.pending = false;
        Ok(())
    }

    /// Remove the player bound to `connection_id`, returning it for forfeiture handling.
    ///
    /// Connections that were superseded by a rebind resolve to nothing.
    pub fn on_disconnect(&mut self, connection_id: ConnectionId) -> Option<Player> {
        let player_id = self.by_connection.remove(&connection_id)?;
        self.players.remove(&player_id)
    }

    /// Lazy, restartable view of players waiting for an opponent.
    pub fn eligible_for_match(&self) -> impl Iterator<Item = &Player> + Clone + '_ {
        self.players
            .values()
            .filter(|player| player.pending && !player.playing)
    }

    /// Player registered under `player_id`.
    pub fn get(&self, player_id: &str) -> Option<&Player> {
        self.players.get(player_id)
    }

    /// Mutable access to the player registered under `player_id`.
    pub fn get_mut(&mut self, player_id: &str) -> Option<&mut Player> {
        self.players.get_mut(player_id)
    }

    /// Player currently bound to `connection_id`.
    pub fn by_connection(&self, connection_id: ConnectionId) -> Option<&Player> {
        self.by_connection
            .get(&connection_id)
            .and_then(|player_id| self.players.get(player_id))
    }

    fn by_connection_mut(&mut self, connection_id: ConnectionId) -> Option<&mut Player> {
        let player_id = self.by_connection.get(&connection_id)?;
        self.players.get_mut(player_id)
    }

    /// Number of connected players.
    pub fn len(&self) -> usize {
        self.players.len()
    }

    /// Whether no player is connected.
    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }
}
