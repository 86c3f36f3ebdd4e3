use thiserror::Error;
use uuid::Uuid;

/// Lifecycle status of a matched session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// Players are paired and joined to the group; no words issued yet.
    Forming,
    /// Words are issued and the deadline is armed.
    Active,
    /// The session produced its outcome and is waiting for teardown.
    Finished(FinishReason),
}

/// Why a session reached [`SessionStatus::Finished`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    /// A player solved every word of the round plan.
    Completed,
    /// The round deadline elapsed.
    TimeUp,
    /// One player left and the other was awarded the win.
    Forfeit,
    /// Every player left; no result was produced.
    Abandoned,
    /// The round plan could not be fetched.
    StartFailed,
}

/// Events that can be applied to a session state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// Players are ready and the round plan is available.
    Start,
    /// A player answered the whole round plan.
    Complete,
    /// The deadline fired while active.
    TimeUp,
    /// A player left, leaving exactly one behind.
    Forfeit,
    /// The last player left.
    Abandon,
    /// The round plan fetch failed.
    StartFailed,
}

impl SessionEvent {
    /// Terminal events supersede a pending plan.
    fn is_terminal(self) -> bool {
        !matches!(self, SessionEvent::Start)
    }
}

/// Error returned when attempting to apply an invalid transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while in {from:?}")]
pub struct InvalidTransition {
    /// The status the session was in when the invalid event was received.
    pub from: SessionStatus,
    /// The event that cannot be applied from this status.
    pub event: SessionEvent,
}

/// Errors that can occur when planning a session transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    /// A transition is already pending and must be applied or aborted.
    AlreadyPending,
    /// The requested transition is not valid from the current status.
    InvalidTransition(InvalidTransition),
}

/// Errors that can occur when applying a planned session transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyError {
    /// No transition is currently pending.
    NoPending,
    /// Plan ID does not match the pending plan.
    IdMismatch {
        /// Expected plan ID.
        expected: PlanId,
        /// Provided plan ID.
        got: PlanId,
    },
    /// Session status changed since the plan was created.
    StatusMismatch {
        /// Status when plan was created.
        expected: SessionStatus,
        /// Current status.
        actual: SessionStatus,
    },
}

/// Errors that can occur when aborting a planned session transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortError {
    /// No transition is currently pending.
    NoPending,
    /// Plan ID does not match the pending plan.
    IdMismatch {
        /// Expected plan ID.
        expected: PlanId,
        /// Provided plan ID.
        got: PlanId,
    },
}

/// Unique identifier for a planned session transition.
pub type PlanId = Uuid;

/// A planned transition that has been validated but not yet applied.
#[derive(Debug, Clone)]
pub struct Plan {
    /// Unique identifier for this plan.
    pub id: PlanId,
    /// Status the session is currently in.
    pub from: SessionStatus,
    /// Status the session will transition to.
    pub to: SessionStatus,
}

/// State machine guarding a single session's lifecycle.
#[derive(Debug, Clone)]
pub struct SessionStateMachine {
    status: SessionStatus,
    version: usize,
    pending: Option<Plan>,
}

impl Default for SessionStateMachine {
    fn default() -> Self {
        Self {
            status: SessionStatus::Forming,
            version: 0,
            pending: None,
        }
    }
}

impl SessionStateMachine {
    /// Create a new state machine in the forming status.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inspect the current status.
    pub fn status(&self) -> SessionStatus {
        self.status
    }

    /// Number of transitions applied so far.
    pub fn version(&self) -> usize {
        self.version
    }

    /// Plan currently awaiting apply/abort, if any.
    pub fn pending(&self) -> Option<&Plan> {
        self.pending.as_ref()
    }

    /// Validate that `event` can be applied and park it as the pending plan.
    pub fn plan(&mut self, event: SessionEvent) -> Result<Plan, PlanError> {
        if self.pending.is_some() {
            return Err(PlanError::AlreadyPending);
        }

        let next = self
            .compute_transition(event)
            .map_err(PlanError::InvalidTransition)?;

        let plan = Plan {
            id: Uuid::new_v4(),
            from: self.status,
            to: next,
        };

        self.pending = Some(plan.clone());

        Ok(plan)
    }

    /// Apply a planned transition, returning the new status.
    pub fn apply(&mut self, plan_id: PlanId) -> Result<SessionStatus, ApplyError> {
        let plan = self.pending.take().ok_or(ApplyError::NoPending)?;

        if plan.id != plan_id {
            let expected_plan_id = plan.id;
            self.pending = Some(plan);
            return Err(ApplyError::IdMismatch {
                expected: expected_plan_id,
                got: plan_id,
            });
        }

        if self.status != plan.from {
            return Err(ApplyError::StatusMismatch {
                expected: plan.from,
                actual: self.status,
            });
        }

        self.status = plan.to;
        self.version += 1;

        Ok(self.status)
    }

    /// Drop a planned transition without applying it.
    pub fn abort(&mut self, plan_id: PlanId) -> Result<(), AbortError> {
        let plan = self.pending.as_ref().ok_or(AbortError::NoPending)?;

        if plan.id != plan_id {
            return Err(AbortError::IdMismatch {
                expected: plan.id,
                got: plan_id,
            });
        }

        self.pending = None;
        Ok(())
    }

    /// Apply an immediate transition. Terminal events discard any pending plan first.
    pub fn transition(&mut self, event: SessionEvent) -> Result<SessionStatus, PlanError> {
        if self.pending.is_some() && !event.is_terminal() {
            return Err(PlanError::AlreadyPending);
        }

        let next = self
            .compute_transition(event)
            .map_err(PlanError::InvalidTransition)?;

        self.pending = None;
        self.status = next;
        self.version += 1;

        Ok(next)
    }

    fn compute_transition(&self, event: SessionEvent) -> Result<SessionStatus, InvalidTransition> {
        let next = match (self.status, event) {
            (SessionStatus::Forming, SessionEvent::Start) => SessionStatus::Active,
            (SessionStatus::Forming, SessionEvent::StartFailed) => {
                SessionStatus::Finished(FinishReason::StartFailed)
            }
            (SessionStatus::Active, SessionEvent::Complete) => {
                SessionStatus::Finished(FinishReason::Completed)
            }
            (SessionStatus::Active, SessionEvent::TimeUp) => {
                SessionStatus::Finished(FinishReason::TimeUp)
            }
            (SessionStatus::Forming | SessionStatus::Active, SessionEvent::Forfeit) => {
                SessionStatus::Finished(FinishReason::Forfeit)
            }
            (SessionStatus::Forming | SessionStatus::Active, SessionEvent::Abandon) => {
                SessionStatus::Finished(FinishReason::Abandoned)
            }
            (from, event) => return Err(InvalidTransition { from, event }),
        };

        Ok(next)
    }
}
