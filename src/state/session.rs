use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use indexmap::IndexMap;
use tokio::task::AbortHandle;
use uuid::Uuid;

use crate::{
    dao::models::{Word, WordId},
    state::{
        registry::PlayerId,
        state_machine::{SessionStateMachine, SessionStatus},
    },
};

/// Identifier of a matched session, also used as its broadcast group name.
pub type SessionId = Uuid;

/// Correctly solved words of one player within one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    /// Session the progress belongs to.
    pub session_id: SessionId,
    /// Player the progress belongs to.
    pub player_id: PlayerId,
    /// Insertion-ordered; its length is the player's round index.
    pub correct_word_ids: Vec<WordId>,
    /// When the latest word was solved, used to break ties between leaders.
    pub last_solved_at: Instant,
}

impl Progress {
    /// Round index of the player (number of solved words).
    pub fn round_index(&self) -> usize {
        self.correct_word_ids.len()
    }
}

/// A matched pair of players racing through a shared round plan.
#[derive(Debug)]
pub struct Session {
    /// Session id, also the broadcast group.
    pub id: SessionId,
    /// Players still in the session, in pairing order.
    pub players: Vec<PlayerId>,
    /// Round plan; empty until the session starts.
    pub words: Vec<Word>,
    /// Time allowed once the session is active.
    pub round_duration: Duration,
    /// One entry per player that solved at least one word.
    pub progress: IndexMap<PlayerId, Progress>,
    /// Lifecycle status and pending plan.
    pub machine: SessionStateMachine,
    deadline: Option<AbortHandle>,
}

impl Session {
    /// Build a forming session for the given players.
    pub fn new(players: Vec<PlayerId>, round_duration: Duration) -> Self {
        Self {
            id: Uuid::new_v4(),
            players,
            words: Vec::new(),
            round_duration,
            progress: IndexMap::new(),
            machine: SessionStateMachine::new(),
            deadline: None,
        }
    }

    /// Current lifecycle status.
    pub fn status(&self) -> SessionStatus {
        self.machine.status()
    }

    /// Whether `player_id` is still in the session.
    pub fn is_member(&self, player_id: &str) -> bool {
        self.players.iter().any(|id| id == player_id)
    }

    /// Round index of `player_id` (0 before the first correct answer).
    pub fn round_index(&self, player_id: &str) -> usize {
        self.progress
            .get(player_id)
            .map(Progress::round_index)
            .unwrap_or(0)
    }

    /// Word the player has to solve next, if any remain.
    pub fn current_word(&self, player_id: &str) -> Option<&Word> {
        self.words.get(self.round_index(player_id))
    }

    /// Append a solved word to the player's progress, returning the new round index.
    ///
    /// The index never exceeds the round plan length.
    pub fn record_correct(&mut self, player_id: &str, word_id: WordId) -> usize {
        let session_id = self.id;
        let total = self.words.len();
        let entry = self
            .progress
            .entry(player_id.to_string())
            .or_insert_with(|| Progress {
                session_id,
                player_id: player_id.to_string(),
                correct_word_ids: Vec::new(),
                last_solved_at: Instant::now(),
            });
        if entry.correct_word_ids.len() < total {
            entry.correct_word_ids.push(word_id);
            entry.last_solved_at = Instant::now();
        }
        entry.correct_word_ids.len()
    }

    /// Keep the abort handle of the armed deadline timer.
    pub fn arm_deadline(&mut self, handle: AbortHandle) {
        if let Some(previous) = self.deadline.replace(handle) {
            previous.abort();
        }
    }

    /// Cancel the deadline timer if one is armed.
    pub fn cancel_deadline(&mut self) {
        if let Some(handle) = self.deadline.take() {
            handle.abort();
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.cancel_deadline();
    }
}

/// Active sessions keyed by id, with a player index enforcing one session per player.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: HashMap<SessionId, Session>,
    by_player: HashMap<PlayerId, SessionId>,
}

impl SessionStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a session, indexing its players. Returns `false` (and stores nothing)
    /// when one of the players already belongs to another session.
    pub fn insert(&mut self, session: Session) -> bool {
        if session
            .players
            .iter()
            .any(|player_id| self.by_player.contains_key(player_id))
        {
            return false;
        }
        for player_id in &session.players {
            self.by_player.insert(player_id.clone(), session.id);
        }
        self.sessions.insert(session.id, session);
        true
    }

    /// Session with the given id.
    pub fn get(&self, id: SessionId) -> Option<&Session> {
        self.sessions.get(&id)
    }

    /// Mutable access to the session with the given id.
    pub fn get_mut(&mut self, id: SessionId) -> Option<&mut Session> {
        self.sessions.get_mut(&id)
    }

    /// Session the player currently belongs to.
    pub fn session_of(&self, player_id: &str) -> Option<SessionId> {
        self.by_player.get(player_id).copied()
    }

    /// Remove a player from a session's list, returning how many players remain.
    pub fn remove_player(&mut self, id: SessionId, player_id: &str) -> Option<usize> {
        let session = self.sessions.get_mut(&id)?;
        session.players.retain(|member| member != player_id);
        if self.by_player.get(player_id) == Some(&id) {
            self.by_player.remove(player_id);
        }
        Some(session.players.len())
    }

    /// Remove a session and release its players from the index.
    pub fn remove(&mut self, id: SessionId) -> Option<Session> {
        let session = self.sessions.remove(&id)?;
        for player_id in &session.players {
            if self.by_player.get(player_id) == Some(&id) {
                self.by_player.remove(player_id);
            }
        }
        Some(session)
    }

    /// Number of stored sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no session is stored.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
