use std::time::Duration;

use rand::{Rng, seq::IndexedRandom};
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info};

use crate::{
    services::engine::{EngineCommand, EngineHandle},
    state::registry::{Player, PlayerId},
};

/// Pick two distinct players uniformly at random from the eligible view.
///
/// Sampling is without replacement, so a player is never paired with itself.
pub fn pick_pair<'a, R>(
    eligible: impl Iterator<Item = &'a Player>,
    rng: &mut R,
) -> Option<(PlayerId, PlayerId)>
where
    R: Rng + ?Sized,
{
    let candidates: Vec<&PlayerId> = eligible.map(|player| &player.id).collect();
    if candidates.len() < 2 {
        return None;
    }

    let mut picked = candidates.choose_multiple(rng, 2);
    match (picked.next(), picked.next()) {
        (Some(first), Some(second)) => Some(((*first).clone(), (*second).clone())),
        _ => None,
    }
}

/// Post a matchmaking tick into the engine mailbox on a fixed period.
///
/// Ticks go through the same mailbox as socket events so pairing never interleaves
/// with other mutations.
pub async fn run_scheduler(engine: EngineHandle, period: Duration) {
    info!(period_secs = period.as_secs(), "matchmaking scheduler started");
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        if !engine.dispatch(EngineCommand::MatchmakingTick) {
            debug!("engine mailbox closed; stopping matchmaking scheduler");
            break;
        }
    }
}
