use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    services::letters::LetterMatch,
    state::{registry::Player, session::Progress},
};

/// Public view of a player shared with the opponent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PlayerSummary {
    /// Player id.
    pub id: String,
    /// Display name.
    pub name: String,
}

impl From<&Player> for PlayerSummary {
    fn from(player: &Player) -> Self {
        Self {
            id: player.id.clone(),
            name: player.name.clone(),
        }
    }
}

/// Per-position verification result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct LetterResult {
    /// Submitted letter.
    pub letter: String,
    /// Whether the target holds it at this position.
    pub is_matched: bool,
}

impl From<LetterMatch> for LetterResult {
    fn from(value: LetterMatch) -> Self {
        Self {
            letter: value.letter.to_string(),
            is_matched: value.is_matched,
        }
    }
}

/// Aggregate progress of one player, broadcast after each correct answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ProgressSummary {
    /// Player the progress belongs to.
    pub player_id: String,
    /// Number of solved words.
    pub correct_count: usize,
    /// Solved word ids in answer order.
    pub correct_word_ids: Vec<String>,
}

impl From<&Progress> for ProgressSummary {
    fn from(progress: &Progress) -> Self {
        Self {
            player_id: progress.player_id.clone(),
            correct_count: progress.round_index(),
            correct_word_ids: progress.correct_word_ids.clone(),
        }
    }
}

/// Letters as sent over the wire (one string per character).
pub fn letters_to_wire(letters: &[char]) -> Vec<String> {
    letters.iter().map(char::to_string).collect()
}
