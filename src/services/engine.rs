//! Session engine: the single owner of player presence and session state.
//!
//! Socket events, matchmaking ticks, word fetch completions and round deadlines all
//! arrive as [`EngineCommand`]s on one mailbox and are processed to completion one at
//! a time, so no two mutations ever interleave.

use std::sync::Arc;

use rand::{SeedableRng, rngs::StdRng};
use tokio::{
    sync::{mpsc, oneshot},
    time::{sleep, timeout},
};
use tracing::{debug, error, info, warn};

use crate::{
    config::AppConfig,
    dao::{
        models::Word,
        storage::StorageError,
        word_store::{WordSource, load_round_plan},
    },
    dto::{
        common::{PlayerSummary, ProgressSummary, letters_to_wire},
        ws::{ClientMessage, PlayerJoinRequest, ServerMessage, WordSubmitRequest},
    },
    error::{ProtocolError, ServiceError},
    services::{
        gateway::Gateway,
        letters::{scramble, verify},
        matchmaking,
        outcome::{DeadlineOutcome, resolve_deadline},
    },
    state::{
        registry::{Announce, ConnectionId, PlayerId, PlayerRegistry},
        session::{Session, SessionId, SessionStore},
        state_machine::{PlanId, SessionEvent, SessionStatus},
    },
};

/// Everything the engine reacts to.
#[derive(Debug)]
pub enum EngineCommand {
    /// A parsed message from a player socket.
    Inbound {
        /// Socket the message arrived on.
        connection_id: ConnectionId,
        /// Parsed and validated payload.
        message: ClientMessage,
    },
    /// The socket closed or errored.
    Disconnected {
        /// Socket that went away.
        connection_id: ConnectionId,
    },
    /// Periodic pairing pass.
    MatchmakingTick,
    /// The round plan fetch started by `game-start` finished.
    RoundPlanLoaded {
        /// Session being started.
        session_id: SessionId,
        /// Pending start plan the fetch belongs to.
        plan_id: PlanId,
        /// Fetched words, or why the fetch failed.
        result: Result<Vec<Word>, ServiceError>,
    },
    /// The round timer of a session fired.
    DeadlineElapsed {
        /// Session whose timer fired.
        session_id: SessionId,
    },
    /// Read-only counters for the health endpoint.
    Stats {
        /// Channel receiving the snapshot.
        reply: oneshot::Sender<EngineStats>,
    },
}

/// Counters exposed by the health endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    /// Players with a live connection.
    pub online_players: usize,
    /// Players waiting in the matchmaking queue.
    pub pending_players: usize,
    /// Sessions that are forming or active.
    pub active_sessions: usize,
}

/// Cloneable sender side of the engine mailbox.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::UnboundedSender<EngineCommand>,
}

impl EngineHandle {
    /// Queue a command. Returns `false` once the engine task is gone.
    pub fn dispatch(&self, command: EngineCommand) -> bool {
        self.tx.send(command).is_ok()
    }

    /// Ask the engine for its counters; `None` when it no longer answers.
    pub async fn stats(&self) -> Option<EngineStats> {
        let (reply, rx) = oneshot::channel();
        if !self.dispatch(EngineCommand::Stats { reply }) {
            return None;
        }
        rx.await.ok()
    }
}

/// Start the engine task and its matchmaking scheduler.
pub fn spawn(
    config: Arc<AppConfig>,
    gateway: Arc<dyn Gateway>,
    words: Arc<dyn WordSource>,
) -> EngineHandle {
    let (tx, rx) = mpsc::unbounded_channel();
    let period = config.matchmaking_interval;
    let engine = Engine::new(config, gateway, words, StdRng::from_os_rng(), tx.clone());
    tokio::spawn(engine.run(rx));

    let handle = EngineHandle { tx };
    tokio::spawn(matchmaking::run_scheduler(handle.clone(), period));
    handle
}

/// Owner of the player registry and the session store.
pub struct Engine {
    config: Arc<AppConfig>,
    registry: PlayerRegistry,
    sessions: SessionStore,
    gateway: Arc<dyn Gateway>,
    words: Arc<dyn WordSource>,
    rng: StdRng,
    mailbox: mpsc::UnboundedSender<EngineCommand>,
}

impl Engine {
    /// Build an engine; `mailbox` must feed the receiver later passed to [`Engine::run`].
    pub fn new(
        config: Arc<AppConfig>,
        gateway: Arc<dyn Gateway>,
        words: Arc<dyn WordSource>,
        rng: StdRng,
        mailbox: mpsc::UnboundedSender<EngineCommand>,
    ) -> Self {
        Self {
            config,
            registry: PlayerRegistry::new(),
            sessions: SessionStore::new(),
            gateway,
            words,
            rng,
            mailbox,
        }
    }

    /// Process commands until every sender is dropped.
    pub async fn run(mut self, mut rx: mpsc::UnboundedReceiver<EngineCommand>) {
        info!("session engine started");
        while let Some(command) = rx.recv().await {
            self.handle(command);
        }
        info!("session engine stopped");
    }

    /// Process one command to completion.
    pub fn handle(&mut self, command: EngineCommand) {
        match command {
            EngineCommand::Inbound {
                connection_id,
                message,
            } => {
                if let Err(err) = self.handle_message(connection_id, message) {
                    self.report(connection_id, err);
                }
            }
            EngineCommand::Disconnected { connection_id } => self.handle_disconnect(connection_id),
            EngineCommand::MatchmakingTick => self.run_matchmaking(),
            EngineCommand::RoundPlanLoaded {
                session_id,
                plan_id,
                result,
            } => {
                if let Err(err) = self.complete_start(session_id, plan_id, result) {
                    debug!(%session_id, error = %err, "stale round plan ignored");
                }
            }
            EngineCommand::DeadlineElapsed { session_id } => self.expire_session(session_id),
            EngineCommand::Stats { reply } => {
                let _ = reply.send(self.stats());
            }
        }
    }

    fn stats(&self) -> EngineStats {
        EngineStats {
            online_players: self.registry.len(),
            pending_players: self.registry.eligible_for_match().count(),
            active_sessions: self.sessions.len(),
        }
    }

    /// Tell the offending connection what went wrong, unless the error is log-only.
    fn report(&self, connection_id: ConnectionId, err: ServiceError) {
        match &err {
            ServiceError::Protocol(protocol) if protocol.is_silent() => {
                warn!(%connection_id, error = %err, "ignoring event from connection");
                return;
            }
            ServiceError::Invariant(_) => {
                error!(%connection_id, error = %err, "skipping action after internal inconsistency");
                return;
            }
            ServiceError::Protocol(_) => {
                warn!(%connection_id, error = %err, "protocol error");
            }
            _ => warn!(%connection_id, error = %err, "request failed"),
        }

        self.gateway.emit_to(
            connection_id,
            &ServerMessage::GameError {
                message: err.client_message(),
            },
        );
    }

    fn handle_message(
        &mut self,
        connection_id: ConnectionId,
        message: ClientMessage,
    ) -> Result<(), ServiceError> {
        match message {
            ClientMessage::PlayerJoin(request) => self.announce(connection_id, request),
            ClientMessage::FindOpponent => {
                self.registry.mark_pending(connection_id)?;
                debug!(%connection_id, "player queued for matchmaking");
                Ok(())
            }
            ClientMessage::StopFindOpponent => {
                self.registry.clear_pending(connection_id)?;
                debug!(%connection_id, "player left the matchmaking queue");
                Ok(())
            }
            ClientMessage::GameStart { session_id } => self.start_session(connection_id, session_id),
            ClientMessage::WordSubmit(request) => self.submit_word(connection_id, request),
            ClientMessage::ConfirmGameResult { session_id } => {
                let finished = self
                    .sessions
                    .get(session_id)
                    .is_some_and(|session| matches!(session.status(), SessionStatus::Finished(_)));
                if finished {
                    self.teardown(session_id);
                } else {
                    debug!(%session_id, "result confirmation for a session already closed");
                }
                Ok(())
            }
            ClientMessage::ExitGame { session_id } => self.exit_session(connection_id, session_id),
            ClientMessage::Unknown => {
                Err(ProtocolError::InvalidPayload("unknown event".into()).into())
            }
        }
    }

    fn player_id_of(&self, connection_id: ConnectionId) -> Result<PlayerId, ProtocolError> {
        self.registry
            .by_connection(connection_id)
            .map(|player| player.id.clone())
            .ok_or(ProtocolError::UnregisteredConnection)
    }

    fn announce(
        &mut self,
        connection_id: ConnectionId,
        request: PlayerJoinRequest,
    ) -> Result<(), ServiceError> {
        let PlayerJoinRequest {
            player_id,
            player_name,
        } = request;

        match self
            .registry
            .announce(&player_id, &player_name, connection_id)?
        {
            Announce::Unchanged => {
                debug!(%player_id, %connection_id, "duplicate presence announcement");
                return Ok(());
            }
            Announce::Registered => {
                info!(%player_id, %connection_id, "player joined");
            }
            Announce::Rebound { previous } => {
                info!(%player_id, %connection_id, %previous, "player rebound to a new connection");
                if let Some(session_id) = self.sessions.session_of(&player_id) {
                    self.gateway.leave_group(previous, session_id);
                    self.gateway.join_group(connection_id, session_id);
                }
            }
        }

        self.gateway.emit_to(
            connection_id,
            &ServerMessage::PlayerJoin {
                player_id,
                player_name,
                connection_id,
            },
        );
        Ok(())
    }

    fn run_matchmaking(&mut self) {
        let Some((first, second)) =
            matchmaking::pick_pair(self.registry.eligible_for_match(), &mut self.rng)
        else {
            return;
        };

        if let Err(err) = self.form_session(first, second) {
            error!(error = %err, "failed to form session");
        }
    }

    /// Pair two players into a forming session and notify the new group.
    fn form_session(&mut self, first: PlayerId, second: PlayerId) -> Result<(), ServiceError> {
        let pair = [&first, &second];
        if pair.iter().any(|player_id| self.registry.get(player_id).is_none()) {
            return Err(ServiceError::Invariant(
                "paired player missing from registry".into(),
            ));
        }

        let session = Session::new(vec![first.clone(), second.clone()], self.config.round_duration);
        let session_id = session.id;
        if !self.sessions.insert(session) {
            return Err(ServiceError::Invariant(
                "paired player already belongs to a session".into(),
            ));
        }

        let mut summaries = Vec::with_capacity(pair.len());
        for player_id in pair {
            if let Some(player) = self.registry.get_mut(player_id) {
                player.pending = false;
                player.playing = true;
                self.gateway.join_group(player.connection_id, session_id);
                summaries.push(PlayerSummary::from(&*player));
            }
        }

        info!(%session_id, %first, %second, "players paired");
        self.gateway.broadcast_to_group(
            session_id,
            &ServerMessage::OpponentFound {
                session_id,
                players: summaries,
            },
        );
        Ok(())
    }

    /// Plan the start transition and fetch the round plan off the engine task.
    ///
    /// The session stays in `Forming` until [`EngineCommand::RoundPlanLoaded`] comes back.
    fn start_session(
        &mut self,
        connection_id: ConnectionId,
        session_id: SessionId,
    ) -> Result<(), ServiceError> {
        let player_id = self.player_id_of(connection_id)?;
        let session = self
            .sessions
            .get_mut(session_id)
            .ok_or(ProtocolError::UnknownSession)?;
        if !session.is_member(&player_id) {
            return Err(ProtocolError::NotInSession.into());
        }
        if session.machine.pending().is_some() || session.status() == SessionStatus::Active {
            debug!(%session_id, %player_id, "start already requested");
            return Ok(());
        }

        let plan = session.machine.plan(SessionEvent::Start)?;
        let words = Arc::clone(&self.words);
        let count = self.config.round_count;
        let limit = self.config.word_fetch_timeout;
        let mailbox = self.mailbox.clone();

        tokio::spawn(async move {
            let result = match timeout(limit, load_round_plan(words, count)).await {
                Ok(Ok(plan)) => Ok(plan),
                Ok(Err(err)) => Err(ServiceError::from(err)),
                Err(_) => Err(ServiceError::Timeout),
            };
            let _ = mailbox.send(EngineCommand::RoundPlanLoaded {
                session_id,
                plan_id: plan.id,
                result,
            });
        });

        info!(%session_id, %player_id, "fetching round plan");
        Ok(())
    }

    fn complete_start(
        &mut self,
        session_id: SessionId,
        plan_id: PlanId,
        result: Result<Vec<Word>, ServiceError>,
    ) -> Result<(), ServiceError> {
        let Some(session) = self.sessions.get_mut(session_id) else {
            debug!(%session_id, "round plan arrived for a session that is gone");
            return Ok(());
        };

        let result = match result {
            Ok(words) if words.is_empty() => Err(ServiceError::from(StorageError::Empty)),
            other => other,
        };

        let words = match result {
            Ok(words) => words,
            Err(err) => {
                session.machine.abort(plan_id)?;
                if let Err(transition_err) = session.machine.transition(SessionEvent::StartFailed) {
                    error!(%session_id, error = ?transition_err, "failed to record start failure");
                }
                warn!(%session_id, error = %err, "round start failed; releasing players");
                self.gateway.broadcast_to_group(
                    session_id,
                    &ServerMessage::GameError {
                        message: err.client_message(),
                    },
                );
                self.teardown(session_id);
                return Ok(());
            }
        };

        session.machine.apply(plan_id)?;
        session.words = words;

        for player_id in &session.players {
            if let Some(player) = self.registry.get_mut(player_id) {
                player.playing = true;
            }
        }

        let first = session.words[0].clone();
        let letters = scramble(&first.text, &mut self.rng);

        let mailbox = self.mailbox.clone();
        let duration = session.round_duration;
        let timer = tokio::spawn(async move {
            sleep(duration).await;
            let _ = mailbox.send(EngineCommand::DeadlineElapsed { session_id });
        });
        session.arm_deadline(timer.abort_handle());

        info!(
            %session_id,
            words = session.words.len(),
            duration_secs = duration.as_secs(),
            "session started"
        );
        self.gateway.broadcast_to_group(
            session_id,
            &ServerMessage::GameStarted {
                session_id,
                word_id: first.id,
                letters: letters_to_wire(&letters),
            },
        );
        Ok(())
    }

    fn submit_word(
        &mut self,
        connection_id: ConnectionId,
        request: WordSubmitRequest,
    ) -> Result<(), ServiceError> {
        let player = self
            .registry
            .by_connection(connection_id)
            .ok_or(ProtocolError::UnregisteredConnection)?;
        let winner = PlayerSummary::from(player);
        let player_id = player.id.clone();
        let session_id = request.session_id;

        let session = self
            .sessions
            .get_mut(session_id)
            .ok_or(ProtocolError::UnknownSession)?;
        if session.status() != SessionStatus::Active {
            return Err(ProtocolError::SessionNotActive.into());
        }
        if !session.is_member(&player_id) {
            return Err(ProtocolError::NotInSession.into());
        }

        let target = session.current_word(&player_id).cloned().ok_or_else(|| {
            ServiceError::Invariant(format!(
                "player `{player_id}` has no word left in active session `{session_id}`"
            ))
        })?;
        if target.id != request.word_id {
            return Err(ProtocolError::UnexpectedWord(request.word_id).into());
        }

        let verification = verify(&target.letters(), &request.letters())?;
        let result = ServerMessage::WordSubmitResult {
            word_id: target.id.clone(),
            is_correct: verification.is_correct,
            letters: verification.letters.into_iter().map(Into::into).collect(),
        };

        if !verification.is_correct {
            self.gateway.emit_to(connection_id, &result);
            return Ok(());
        }

        let solved = session.record_correct(&player_id, target.id);
        if solved == session.words.len() {
            session.machine.transition(SessionEvent::Complete)?;
            info!(%session_id, %player_id, "player solved every word");
            let message = format!("{} won the game", winner.name);
            self.gateway.broadcast_to_group(
                session_id,
                &ServerMessage::GameFinish {
                    session_id,
                    winner,
                    message,
                },
            );
            self.teardown(session_id);
            return Ok(());
        }

        self.gateway.emit_to(connection_id, &result);

        let progress = session
            .players
            .iter()
            .map(|member| match session.progress.get(member) {
                Some(entry) => ProgressSummary::from(entry),
                None => ProgressSummary {
                    player_id: member.clone(),
                    correct_count: 0,
                    correct_word_ids: Vec::new(),
                },
            })
            .collect();
        self.gateway.broadcast_to_group(
            session_id,
            &ServerMessage::CorrectWord {
                session_id,
                progress,
            },
        );

        let next = session.words.get(solved).cloned().ok_or_else(|| {
            ServiceError::Invariant(format!("round {solved} missing in session `{session_id}`"))
        })?;
        let letters = scramble(&next.text, &mut self.rng);
        self.gateway.emit_to(
            connection_id,
            &ServerMessage::SetNextWord {
                word_id: next.id,
                letters: letters_to_wire(&letters),
            },
        );
        Ok(())
    }

    fn expire_session(&mut self, session_id: SessionId) {
        let Some(session) = self.sessions.get_mut(session_id) else {
            debug!(%session_id, "deadline fired for a session that is gone");
            return;
        };
        if session.status() != SessionStatus::Active {
            debug!(%session_id, status = ?session.status(), "deadline ignored");
            return;
        }

        let outcome = resolve_deadline(&session.players, &session.progress);
        if let Err(err) = session.machine.transition(SessionEvent::TimeUp) {
            error!(%session_id, error = ?err, "failed to close session at deadline");
            return;
        }

        let (winner, message) = match outcome {
            DeadlineOutcome::Draw => (None, "The game ended in a draw".to_string()),
            DeadlineOutcome::Winner(player_id) => {
                let winner = self.registry.get(&player_id).map(PlayerSummary::from);
                let message = match &winner {
                    Some(summary) => format!("Time is up, {} won the game", summary.name),
                    None => "Time is up".to_string(),
                };
                (winner, message)
            }
        };

        info!(%session_id, winner = ?winner.as_ref().map(|summary| &summary.id), "session deadline reached");
        self.gateway.broadcast_to_group(
            session_id,
            &ServerMessage::GameTimeEnd {
                session_id,
                winner,
                message,
            },
        );
        self.teardown(session_id);
    }

    fn handle_disconnect(&mut self, connection_id: ConnectionId) {
        let Some(player) = self.registry.on_disconnect(connection_id) else {
            debug!(%connection_id, "connection closed without a bound player");
            return;
        };
        info!(player_id = %player.id, %connection_id, "player disconnected");

        if let Some(session_id) = self.sessions.session_of(&player.id) {
            self.depart(session_id, &player.id, connection_id);
        }
    }

    fn exit_session(
        &mut self,
        connection_id: ConnectionId,
        session_id: SessionId,
    ) -> Result<(), ServiceError> {
        let player_id = self.player_id_of(connection_id)?;
        let session = self
            .sessions
            .get(session_id)
            .ok_or(ProtocolError::UnknownSession)?;
        if !session.is_member(&player_id) {
            return Err(ProtocolError::NotInSession.into());
        }

        if let Some(player) = self.registry.get_mut(&player_id) {
            player.playing = false;
            player.pending = false;
        }
        info!(%session_id, %player_id, "player left the session");
        self.depart(session_id, &player_id, connection_id);
        Ok(())
    }

    /// Remove a departing player and resolve what is left of the session.
    fn depart(&mut self, session_id: SessionId, player_id: &str, connection_id: ConnectionId) {
        let Some(remaining) = self.sessions.remove_player(session_id, player_id) else {
            return;
        };
        self.gateway.leave_group(connection_id, session_id);

        match remaining {
            0 => {
                if let Some(session) = self.sessions.get_mut(session_id) {
                    if let Err(err) = session.machine.transition(SessionEvent::Abandon) {
                        error!(%session_id, error = ?err, "failed to record abandonment");
                    }
                }
                info!(%session_id, "session abandoned");
                self.teardown(session_id);
            }
            1 => self.forfeit(session_id),
            _ => debug!(%session_id, remaining, "player left; session continues"),
        }
    }

    /// Award the win to the only player left and close the session.
    fn forfeit(&mut self, session_id: SessionId) {
        let Some(session) = self.sessions.get_mut(session_id) else {
            return;
        };
        if let Err(err) = session.machine.transition(SessionEvent::Forfeit) {
            error!(%session_id, error = ?err, "failed to record forfeit");
        }

        let winner = session
            .players
            .first()
            .and_then(|winner_id| self.registry.get(winner_id));
        match winner {
            Some(player) => {
                info!(%session_id, winner = %player.id, "opponent left; awarding win by forfeit");
                self.gateway.emit_to(
                    player.connection_id,
                    &ServerMessage::GameFinish {
                        session_id,
                        winner: PlayerSummary::from(player),
                        message: format!("Your opponent gave up, {} won the game", player.name),
                    },
                );
            }
            None => warn!(%session_id, "forfeit winner is no longer connected"),
        }

        self.teardown(session_id);
    }

    /// Release every remaining player, dissolve the group and drop the session.
    fn teardown(&mut self, session_id: SessionId) {
        let Some(mut session) = self.sessions.remove(session_id) else {
            return;
        };
        session.cancel_deadline();

        for player_id in &session.players {
            match self.registry.get_mut(player_id) {
                Some(player) => {
                    player.playing = false;
                    player.pending = false;
                    self.gateway.leave_group(player.connection_id, session_id);
                }
                None => debug!(%session_id, %player_id, "stale player reference during teardown"),
            }
        }

        info!(%session_id, status = ?session.status(), "session closed");
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashSet, time::Duration};

    use futures::future::{self, BoxFuture};
    use uuid::Uuid;

    use super::*;
    use crate::{
        dao::{
            models::WordId,
            storage::StorageResult,
            word_store::InMemoryWordSource,
        },
        services::gateway::recording::{Delivery, RecordingGateway},
        state::state_machine::SessionStatus,
    };

    struct OfflineWords;

    impl WordSource for OfflineWords {
        fn random_word(&self) -> BoxFuture<'static, StorageResult<Word>> {
            Box::pin(future::ready(Err(StorageError::unavailable(
                "corpus offline".into(),
                std::io::Error::other("offline"),
            ))))
        }

        fn word_by_id(&self, _id: WordId) -> BoxFuture<'static, StorageResult<Option<Word>>> {
            Box::pin(future::ready(Ok(None)))
        }
    }

    struct StalledWords;

    impl WordSource for StalledWords {
        fn random_word(&self) -> BoxFuture<'static, StorageResult<Word>> {
            Box::pin(future::pending())
        }

        fn word_by_id(&self, _id: WordId) -> BoxFuture<'static, StorageResult<Option<Word>>> {
            Box::pin(future::pending())
        }
    }

    struct Harness {
        engine: Engine,
        gateway: Arc<RecordingGateway>,
        rx: mpsc::UnboundedReceiver<EngineCommand>,
    }

    fn config() -> AppConfig {
        AppConfig {
            round_count: 2,
            round_duration: Duration::from_secs(30),
            words: vec![
                Word::new("w1", "CAT"),
                Word::new("w2", "DOG"),
                Word::new("w3", "EMU"),
            ],
            ..AppConfig::default()
        }
    }

    fn harness_with(words: Arc<dyn WordSource>) -> Harness {
        let (tx, rx) = mpsc::unbounded_channel();
        let gateway = Arc::new(RecordingGateway::default());
        let engine = Engine::new(
            Arc::new(config()),
            gateway.clone(),
            words,
            StdRng::seed_from_u64(42),
            tx,
        );
        Harness {
            engine,
            gateway,
            rx,
        }
    }

    fn harness() -> Harness {
        harness_with(Arc::new(InMemoryWordSource::new(config().words)))
    }

    impl Harness {
        fn send(&mut self, connection_id: ConnectionId, message: ClientMessage) {
            self.engine.handle(EngineCommand::Inbound {
                connection_id,
                message,
            });
        }

        fn join(&mut self, player_id: &str) -> ConnectionId {
            let connection_id = Uuid::new_v4();
            self.send(
                connection_id,
                ClientMessage::PlayerJoin(PlayerJoinRequest {
                    player_id: player_id.into(),
                    player_name: format!("Name {player_id}"),
                }),
            );
            connection_id
        }

        /// Join and queue two players, then run one matchmaking pass.
        fn pair(&mut self) -> (SessionId, ConnectionId, ConnectionId) {
            let a = self.join("a");
            let b = self.join("b");
            self.send(a, ClientMessage::FindOpponent);
            self.send(b, ClientMessage::FindOpponent);
            self.engine.handle(EngineCommand::MatchmakingTick);
            let session_id = self.engine.sessions.session_of("a").unwrap();
            self.gateway.take();
            (session_id, a, b)
        }

        async fn pump(&mut self) {
            let command = self.rx.recv().await.unwrap();
            self.engine.handle(command);
        }

        async fn start(&mut self) -> (SessionId, ConnectionId, ConnectionId) {
            let (session_id, a, b) = self.pair();
            self.send(a, ClientMessage::GameStart { session_id });
            self.pump().await;
            self.gateway.take();
            (session_id, a, b)
        }

        fn session(&self, session_id: SessionId) -> &Session {
            self.engine.sessions.get(session_id).unwrap()
        }

        fn current_word(&self, session_id: SessionId, player_id: &str) -> Word {
            self.session(session_id)
                .current_word(player_id)
                .cloned()
                .unwrap()
        }

        fn submit(&mut self, connection_id: ConnectionId, session_id: SessionId, word_id: &str, letters: &str) {
            self.send(
                connection_id,
                ClientMessage::WordSubmit(WordSubmitRequest {
                    session_id,
                    word_id: word_id.into(),
                    letters: letters.chars().map(String::from).collect(),
                }),
            );
        }

        fn solve_current(&mut self, connection_id: ConnectionId, session_id: SessionId, player_id: &str) {
            let word = self.current_word(session_id, player_id);
            self.submit(connection_id, session_id, &word.id, &word.text);
        }
    }

    fn is_game_error(delivery: &Delivery, connection_id: ConnectionId) -> bool {
        matches!(
            delivery,
            Delivery::Private(target, ServerMessage::GameError { .. }) if *target == connection_id
        )
    }

    #[tokio::test]
    async fn join_is_acknowledged_once() {
        let mut h = harness();
        let conn = h.join("a");
        h.send(
            conn,
            ClientMessage::PlayerJoin(PlayerJoinRequest {
                player_id: "a".into(),
                player_name: "Name a".into(),
            }),
        );

        let deliveries = h.gateway.take();
        assert_eq!(deliveries.len(), 1);
        assert!(matches!(
            &deliveries[0],
            Delivery::Private(target, ServerMessage::PlayerJoin { player_id, .. })
                if *target == conn && player_id == "a"
        ));
    }

    #[tokio::test]
    async fn matchmaking_pairs_two_pending_players() {
        let mut h = harness();
        let a = h.join("a");
        let b = h.join("b");
        h.send(a, ClientMessage::FindOpponent);
        h.send(b, ClientMessage::FindOpponent);
        h.gateway.take();

        h.engine.handle(EngineCommand::MatchmakingTick);

        let session_id = h.engine.sessions.session_of("a").unwrap();
        assert_eq!(h.engine.sessions.session_of("b"), Some(session_id));
        assert_eq!(h.session(session_id).status(), SessionStatus::Forming);
        for id in ["a", "b"] {
            let player = h.engine.registry.get(id).unwrap();
            assert!(player.playing && !player.pending);
        }

        let deliveries = h.gateway.take();
        let joined: HashSet<_> = deliveries
            .iter()
            .filter_map(|delivery| match delivery {
                Delivery::Joined(conn, sid) if *sid == session_id => Some(*conn),
                _ => None,
            })
            .collect();
        assert_eq!(joined, HashSet::from([a, b]));
        assert!(deliveries.iter().any(|delivery| matches!(
            delivery,
            Delivery::Group(sid, ServerMessage::OpponentFound { players, .. })
                if *sid == session_id && players.len() == 2
        )));
    }

    #[tokio::test]
    async fn lone_pending_player_is_not_matched() {
        let mut h = harness();
        let a = h.join("a");
        h.join("idle");
        h.send(a, ClientMessage::FindOpponent);
        h.engine.handle(EngineCommand::MatchmakingTick);
        assert!(h.engine.sessions.is_empty());
    }

    #[tokio::test]
    async fn stopped_search_is_not_matched() {
        let mut h = harness();
        let a = h.join("a");
        let b = h.join("b");
        h.send(a, ClientMessage::FindOpponent);
        h.send(b, ClientMessage::FindOpponent);
        h.send(b, ClientMessage::StopFindOpponent);
        h.engine.handle(EngineCommand::MatchmakingTick);
        assert!(h.engine.sessions.is_empty());
    }

    #[tokio::test]
    async fn find_opponent_from_unregistered_connection_is_silent() {
        let mut h = harness();
        h.send(Uuid::new_v4(), ClientMessage::FindOpponent);
        assert!(h.gateway.take().is_empty());
    }

    #[tokio::test]
    async fn find_opponent_while_playing_is_rejected() {
        let mut h = harness();
        let (_, a, _) = h.pair();
        h.send(a, ClientMessage::FindOpponent);
        let deliveries = h.gateway.take();
        assert!(deliveries.iter().any(|delivery| is_game_error(delivery, a)));
    }

    #[tokio::test]
    async fn start_activates_session_and_broadcasts_first_word() {
        let mut h = harness();
        let (session_id, a, _) = h.pair();

        h.send(a, ClientMessage::GameStart { session_id });
        assert_eq!(h.session(session_id).status(), SessionStatus::Forming);
        h.pump().await;

        let session = h.session(session_id);
        assert_eq!(session.status(), SessionStatus::Active);
        assert_eq!(session.words.len(), 2);
        let first = session.words[0].clone();

        let deliveries = h.gateway.take();
        let started = deliveries
            .iter()
            .find_map(|delivery| match delivery {
                Delivery::Group(sid, ServerMessage::GameStarted { word_id, letters, .. })
                    if *sid == session_id =>
                {
                    Some((word_id.clone(), letters.clone()))
                }
                _ => None,
            })
            .unwrap();
        assert_eq!(started.0, first.id);
        let mut scrambled: Vec<String> = started.1;
        scrambled.sort();
        let mut expected: Vec<String> = first.text.chars().map(String::from).collect();
        expected.sort();
        assert_eq!(scrambled, expected);
    }

    #[tokio::test]
    async fn duplicate_start_is_ignored() {
        let mut h = harness();
        let (session_id, a, b) = h.pair();
        h.send(a, ClientMessage::GameStart { session_id });
        h.send(b, ClientMessage::GameStart { session_id });
        h.pump().await;
        h.send(b, ClientMessage::GameStart { session_id });

        assert!(h.rx.try_recv().is_err());
        let started = h
            .gateway
            .take()
            .into_iter()
            .filter(|delivery| {
                matches!(delivery, Delivery::Group(_, ServerMessage::GameStarted { .. }))
            })
            .count();
        assert_eq!(started, 1);
    }

    #[tokio::test]
    async fn correct_answer_advances_only_the_submitter() {
        let mut h = harness();
        let (session_id, a, _) = h.start().await;
        let first = h.current_word(session_id, "a");
        let second = h.session(session_id).words[1].clone();

        h.solve_current(a, session_id, "a");

        assert_eq!(h.session(session_id).round_index("a"), 1);
        assert_eq!(h.session(session_id).round_index("b"), 0);

        let deliveries = h.gateway.take();
        assert_eq!(deliveries.len(), 3);
        assert!(matches!(
            &deliveries[0],
            Delivery::Private(conn, ServerMessage::WordSubmitResult { word_id, is_correct: true, .. })
                if *conn == a && *word_id == first.id
        ));
        match &deliveries[1] {
            Delivery::Group(sid, ServerMessage::CorrectWord { progress, .. }) => {
                assert_eq!(*sid, session_id);
                let mut counts: Vec<_> = progress
                    .iter()
                    .map(|entry| (entry.player_id.as_str(), entry.correct_count))
                    .collect();
                counts.sort();
                assert_eq!(counts, vec![("a", 1), ("b", 0)]);
            }
            other => panic!("unexpected delivery: {other:?}"),
        }
        assert!(matches!(
            &deliveries[2],
            Delivery::Private(conn, ServerMessage::SetNextWord { word_id, .. })
                if *conn == a && *word_id == second.id
        ));
    }

    #[tokio::test]
    async fn wrong_answer_is_reported_privately_without_progress() {
        let mut h = harness();
        let (session_id, a, _) = h.start().await;
        let word = h.current_word(session_id, "a");

        h.submit(a, session_id, &word.id, "ZZZ");

        assert_eq!(h.session(session_id).round_index("a"), 0);
        let deliveries = h.gateway.take();
        assert_eq!(deliveries.len(), 1);
        assert!(matches!(
            &deliveries[0],
            Delivery::Private(conn, ServerMessage::WordSubmitResult { is_correct: false, letters, .. })
                if *conn == a && letters.iter().all(|letter| !letter.is_matched)
        ));
    }

    #[tokio::test]
    async fn overlong_submission_is_a_protocol_error() {
        let mut h = harness();
        let (session_id, a, _) = h.start().await;
        let word = h.current_word(session_id, "a");

        h.submit(a, session_id, &word.id, &format!("{}X", word.text));

        assert_eq!(h.session(session_id).round_index("a"), 0);
        let deliveries = h.gateway.take();
        assert_eq!(deliveries.len(), 1);
        assert!(is_game_error(&deliveries[0], a));
    }

    #[tokio::test]
    async fn submitting_a_future_word_is_rejected() {
        let mut h = harness();
        let (session_id, a, _) = h.start().await;
        let second = h.session(session_id).words[1].clone();

        h.submit(a, session_id, &second.id, &second.text);

        assert_eq!(h.session(session_id).round_index("a"), 0);
        assert!(is_game_error(&h.gateway.take()[0], a));
    }

    #[tokio::test]
    async fn submitting_before_start_or_to_unknown_session_is_rejected() {
        let mut h = harness();
        let (session_id, a, _) = h.pair();
        h.submit(a, session_id, "w1", "CAT");
        h.submit(a, Uuid::new_v4(), "w1", "CAT");

        let deliveries = h.gateway.take();
        assert_eq!(deliveries.len(), 2);
        assert!(deliveries.iter().all(|delivery| is_game_error(delivery, a)));
    }

    #[tokio::test]
    async fn solving_every_word_finishes_the_session() {
        let mut h = harness();
        let (session_id, a, _) = h.start().await;

        h.solve_current(a, session_id, "a");
        h.gateway.take();
        h.solve_current(a, session_id, "a");

        assert!(h.engine.sessions.get(session_id).is_none());
        for id in ["a", "b"] {
            let player = h.engine.registry.get(id).unwrap();
            assert!(!player.playing && !player.pending);
        }

        let deliveries = h.gateway.take();
        assert!(deliveries.iter().any(|delivery| matches!(
            delivery,
            Delivery::Group(sid, ServerMessage::GameFinish { winner, .. })
                if *sid == session_id && winner.id == "a"
        )));
        assert_eq!(
            deliveries
                .iter()
                .filter(|delivery| matches!(delivery, Delivery::Left(_, sid) if *sid == session_id))
                .count(),
            2
        );

        // The armed deadline is cancelled; a late expiry is a no-op.
        h.engine.handle(EngineCommand::DeadlineElapsed { session_id });
        assert!(h.gateway.take().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_with_equal_progress_is_a_draw() {
        let mut h = harness();
        let (session_id, _, _) = h.start().await;

        h.pump().await;

        assert!(h.engine.sessions.get(session_id).is_none());
        let deliveries = h.gateway.take();
        assert!(deliveries.iter().any(|delivery| matches!(
            delivery,
            Delivery::Group(sid, ServerMessage::GameTimeEnd { winner: None, .. })
                if *sid == session_id
        )));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_awards_the_player_with_more_words() {
        let mut h = harness();
        let (session_id, _, b) = h.start().await;
        h.solve_current(b, session_id, "b");
        h.gateway.take();

        h.pump().await;

        let deliveries = h.gateway.take();
        assert!(deliveries.iter().any(|delivery| matches!(
            delivery,
            Delivery::Group(sid, ServerMessage::GameTimeEnd { winner: Some(winner), .. })
                if *sid == session_id && winner.id == "b"
        )));
        let player = h.engine.registry.get("b").unwrap();
        assert!(!player.playing);
    }

    #[tokio::test]
    async fn disconnect_awards_forfeit_to_remaining_player() {
        let mut h = harness();
        let (session_id, a, b) = h.start().await;

        h.engine.handle(EngineCommand::Disconnected { connection_id: a });

        assert!(h.engine.sessions.get(session_id).is_none());
        assert!(h.engine.registry.get("a").is_none());
        let survivor = h.engine.registry.get("b").unwrap();
        assert!(!survivor.playing && !survivor.pending);

        let deliveries = h.gateway.take();
        assert!(deliveries.iter().any(|delivery| matches!(
            delivery,
            Delivery::Private(conn, ServerMessage::GameFinish { winner, .. })
                if *conn == b && winner.id == "b"
        )));
        assert!(
            !deliveries
                .iter()
                .any(|delivery| matches!(delivery, Delivery::Private(conn, _) if *conn == a))
        );
    }

    #[tokio::test]
    async fn exit_game_awards_forfeit_and_frees_the_leaver() {
        let mut h = harness();
        let (session_id, a, b) = h.pair();

        h.send(b, ClientMessage::ExitGame { session_id });

        assert!(h.engine.sessions.get(session_id).is_none());
        assert!(!h.engine.registry.get("b").unwrap().playing);
        let deliveries = h.gateway.take();
        assert!(deliveries.contains(&Delivery::Left(b, session_id)));
        assert!(deliveries.iter().any(|delivery| matches!(
            delivery,
            Delivery::Private(conn, ServerMessage::GameFinish { winner, .. })
                if *conn == a && winner.id == "a"
        )));
    }

    #[tokio::test]
    async fn last_player_leaving_discards_session_without_result() {
        let mut h = harness();
        let (session_id, a, _) = h.start().await;
        h.engine.sessions.remove_player(session_id, "b");

        h.engine.handle(EngineCommand::Disconnected { connection_id: a });

        assert!(h.engine.sessions.is_empty());
        let deliveries = h.gateway.take();
        assert!(!deliveries.iter().any(|delivery| matches!(
            delivery,
            Delivery::Private(_, ServerMessage::GameFinish { .. })
                | Delivery::Group(_, ServerMessage::GameFinish { .. })
        )));
    }

    #[tokio::test]
    async fn exit_from_a_foreign_session_is_rejected() {
        let mut h = harness();
        let (session_id, _, _) = h.pair();
        let outsider = h.join("c");
        h.gateway.take();

        h.send(outsider, ClientMessage::ExitGame { session_id });

        assert!(h.engine.sessions.get(session_id).is_some());
        assert!(is_game_error(&h.gateway.take()[0], outsider));
    }

    #[tokio::test]
    async fn word_source_failure_releases_players() {
        let mut h = harness_with(Arc::new(OfflineWords));
        let (session_id, a, _) = h.pair();

        h.send(a, ClientMessage::GameStart { session_id });
        h.pump().await;

        assert!(h.engine.sessions.get(session_id).is_none());
        for id in ["a", "b"] {
            let player = h.engine.registry.get(id).unwrap();
            assert!(!player.playing && !player.pending);
        }
        let deliveries = h.gateway.take();
        assert!(deliveries.iter().any(|delivery| matches!(
            delivery,
            Delivery::Group(sid, ServerMessage::GameError { .. }) if *sid == session_id
        )));
    }

    #[tokio::test(start_paused = true)]
    async fn word_fetch_timeout_releases_players() {
        let mut h = harness_with(Arc::new(StalledWords));
        let (session_id, a, _) = h.pair();

        h.send(a, ClientMessage::GameStart { session_id });
        h.pump().await;

        assert!(h.engine.sessions.get(session_id).is_none());
        for id in ["a", "b"] {
            let player = h.engine.registry.get(id).unwrap();
            assert!(!player.playing && !player.pending);
        }
        let deliveries = h.gateway.take();
        assert!(matches!(
            &deliveries[0],
            Delivery::Group(sid, ServerMessage::GameError { message })
                if *sid == session_id && *message == ServiceError::Timeout.client_message()
        ));
        assert_eq!(
            deliveries
                .iter()
                .filter(|delivery| matches!(delivery, Delivery::Left(_, sid) if *sid == session_id))
                .count(),
            2
        );
    }

    #[tokio::test(start_paused = true)]
    async fn round_plan_for_a_forfeited_session_is_dropped() {
        let mut h = harness();
        let (session_id, a, b) = h.pair();

        h.send(a, ClientMessage::GameStart { session_id });
        h.engine.handle(EngineCommand::Disconnected { connection_id: a });
        h.pump().await;

        assert!(h.engine.sessions.is_empty());
        let survivor = h.engine.registry.get("b").unwrap();
        assert!(!survivor.playing && !survivor.pending);

        let deliveries = h.gateway.take();
        assert!(deliveries.iter().any(|delivery| matches!(
            delivery,
            Delivery::Private(conn, ServerMessage::GameFinish { winner, .. })
                if *conn == b && winner.id == "b"
        )));
        assert!(!deliveries.iter().any(|delivery| matches!(
            delivery,
            Delivery::Group(_, ServerMessage::GameStarted { .. })
        )));
    }

    #[tokio::test]
    async fn round_plan_for_another_plan_is_ignored() {
        let mut h = harness();
        let (session_id, a, _) = h.pair();
        h.send(a, ClientMessage::GameStart { session_id });

        h.engine.handle(EngineCommand::RoundPlanLoaded {
            session_id,
            plan_id: Uuid::new_v4(),
            result: Ok(config().words),
        });

        let session = h.session(session_id);
        assert_eq!(session.status(), SessionStatus::Forming);
        assert!(session.machine.pending().is_some());
        assert!(session.words.is_empty());
        assert!(h.gateway.take().is_empty());

        h.pump().await;
        assert_eq!(h.session(session_id).status(), SessionStatus::Active);
    }

    #[tokio::test]
    async fn rebinding_moves_group_membership() {
        let mut h = harness();
        let (session_id, a, _) = h.pair();
        let fresh = Uuid::new_v4();

        h.send(
            fresh,
            ClientMessage::PlayerJoin(PlayerJoinRequest {
                player_id: "a".into(),
                player_name: "Name a".into(),
            }),
        );

        let deliveries = h.gateway.take();
        assert!(deliveries.contains(&Delivery::Left(a, session_id)));
        assert!(deliveries.contains(&Delivery::Joined(fresh, session_id)));

        // The superseded socket closing must not forfeit the session.
        h.engine.handle(EngineCommand::Disconnected { connection_id: a });
        assert!(h.engine.sessions.get(session_id).is_some());
    }

    #[tokio::test]
    async fn stats_reflect_registry_and_store() {
        let mut h = harness();
        h.pair();
        let c = h.join("c");
        h.send(c, ClientMessage::FindOpponent);

        assert_eq!(
            h.engine.stats(),
            EngineStats {
                online_players: 3,
                pending_players: 1,
                active_sessions: 1,
            }
        );
    }
}
