use thiserror::Error;

use crate::{
    dao::storage::StorageError,
    state::state_machine::{AbortError, ApplyError, PlanError},
};

/// Malformed or out-of-sequence client events. Never fatal, never mutate state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// The payload could not be parsed or failed validation.
    #[error("invalid message: {0}")]
    InvalidPayload(String),
    /// The connection has not announced a player yet.
    #[error("connection has no registered player")]
    UnregisteredConnection,
    /// The connection already speaks for a different player.
    #[error("connection is already bound to another player")]
    ConnectionAlreadyBound,
    /// The player is already queued or inside a session.
    #[error("you are already playing or looking for an opponent")]
    AlreadyBusy,
    /// The session does not exist (or was already torn down).
    #[error("game does not exist or has already finished")]
    UnknownSession,
    /// The session exists but is not accepting this event in its current status.
    #[error("game is not in progress")]
    SessionNotActive,
    /// The player is not part of the named session.
    #[error("player is not part of this game")]
    NotInSession,
    /// The submission names a word other than the player's current one.
    #[error("word `{0}` is not your current word")]
    UnexpectedWord(String),
    /// More letters were submitted than the target word holds.
    #[error("submitted {submitted} letters for a {expected}-letter word")]
    SubmissionTooLong {
        /// Length of the target word.
        expected: usize,
        /// Number of letters received.
        submitted: usize,
    },
}

impl ProtocolError {
    /// Errors that are only logged, without notifying the client.
    pub fn is_silent(&self) -> bool {
        matches!(self, ProtocolError::UnregisteredConnection)
    }
}

/// Errors that can occur in engine operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The client sent something it should not have.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    /// The word source failed.
    #[error("word source unavailable")]
    Unavailable(#[source] StorageError),
    /// The word source did not answer in time.
    #[error("operation timed out")]
    Timeout,
    /// Operation cannot be performed in the current state.
    #[error("invalid state: {0}")]
    InvalidState(String),
    /// Internal bookkeeping disagrees with itself.
    #[error("invariant violated: {0}")]
    Invariant(String),
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        ServiceError::Unavailable(err)
    }
}

impl ServiceError {
    /// Message safe to show to the connection that triggered the error.
    pub fn client_message(&self) -> String {
        match self {
            ServiceError::Protocol(err) => err.to_string(),
            ServiceError::Unavailable(_) | ServiceError::Timeout => {
                "words are unavailable right now, please try again".into()
            }
            ServiceError::InvalidState(_) | ServiceError::Invariant(_) => {
                "an error occurred while processing the request".into()
            }
        }
    }
}

impl From<PlanError> for ServiceError {
    fn from(err: PlanError) -> Self {
        match err {
            PlanError::AlreadyPending => {
                ServiceError::InvalidState("a transition is already pending".into())
            }
            PlanError::InvalidTransition(_) => ProtocolError::SessionNotActive.into(),
        }
    }
}

impl From<ApplyError> for ServiceError {
    fn from(err: ApplyError) -> Self {
        match err {
            ApplyError::NoPending => ServiceError::InvalidState("no transition is pending".into()),
            ApplyError::IdMismatch { .. } => {
                ServiceError::InvalidState("pending transition does not match".into())
            }
            ApplyError::StatusMismatch { expected, actual } => ServiceError::InvalidState(format!(
                "session changed during transition (expected {expected:?}, got {actual:?})"
            )),
        }
    }
}

impl From<AbortError> for ServiceError {
    fn from(err: AbortError) -> Self {
        match err {
            AbortError::NoPending => ServiceError::InvalidState("no pending transition".into()),
            AbortError::IdMismatch { .. } => {
                ServiceError::InvalidState("transition plan does not match".into())
            }
        }
    }
}
