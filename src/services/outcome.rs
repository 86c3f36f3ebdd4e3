use indexmap::IndexMap;

use crate::state::{registry::PlayerId, session::Progress};

/// Result of a session whose deadline elapsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeadlineOutcome {
    /// Every remaining player solved the same number of words (including none).
    Draw,
    /// The player with the most solved words.
    Winner(PlayerId),
}

/// Decide the deadline outcome from the players still in the session.
///
/// With more than two players, leaders sharing the top count are separated by who
/// reached that count first.
pub fn resolve_deadline(
    players: &[PlayerId],
    progress: &IndexMap<PlayerId, Progress>,
) -> DeadlineOutcome {
    let count = |player_id: &PlayerId| {
        progress
            .get(player_id)
            .map(Progress::round_index)
            .unwrap_or(0)
    };

    let Some(best) = players.iter().map(count).max() else {
        return DeadlineOutcome::Draw;
    };
    if players.iter().all(|player_id| count(player_id) == best) {
        return DeadlineOutcome::Draw;
    }

    players
        .iter()
        .filter(|player_id| count(*player_id) == best)
        .filter_map(|player_id| progress.get(player_id))
        .min_by_key(|entry| entry.last_solved_at)
        .map(|entry| DeadlineOutcome::Winner(entry.player_id.clone()))
        .unwrap_or(DeadlineOutcome::Draw)
}
