use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dto::{
        common::{LetterResult, PlayerSummary, ProgressSummary},
        validation::{validate_identifier, validate_letters},
    },
    error::ProtocolError,
};

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
/// Messages accepted from player WebSocket clients.
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum ClientMessage {
    /// Bind a player id to this connection.
    PlayerJoin(PlayerJoinRequest),
    /// Enter the matchmaking queue.
    FindOpponent,
    /// Leave the matchmaking queue.
    StopFindOpponent,
    /// Ask for the round plan of a forming session.
    GameStart {
        /// Session to start.
        session_id: Uuid,
    },
    /// Answer the current word.
    WordSubmit(WordSubmitRequest),
    /// Acknowledge the result of a finished session.
    ConfirmGameResult {
        /// Session whose result was shown.
        session_id: Uuid,
    },
    /// Leave a session, handing the win to the opponent.
    ExitGame {
        /// Session to leave.
        session_id: Uuid,
    },
    /// Any event name this server does not know.
    #[serde(other)]
    Unknown,
}

impl ClientMessage {
    /// Parse a text frame and validate its payload.
    pub fn from_json_str(text: &str) -> Result<Self, ProtocolError> {
        let message: Self = serde_json::from_str(text)
            .map_err(|err| ProtocolError::InvalidPayload(err.to_string()))?;

        let validation = match &message {
            Self::PlayerJoin(request) => request.validate(),
            Self::WordSubmit(request) => request.validate(),
            _ => Ok(()),
        };
        validation.map_err(|err| ProtocolError::InvalidPayload(err.to_string()))?;

        Ok(message)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema, Validate)]
/// Presence announcement binding a player id to the connection.
pub struct PlayerJoinRequest {
    /// Stable player identifier chosen by the client.
    #[validate(length(min = 1, max = 64), custom(function = "validate_identifier"))]
    pub player_id: String,
    /// Display name shown to the opponent.
    #[validate(length(min = 1, max = 32))]
    pub player_name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema, Validate)]
/// Attempt at the player's current word.
pub struct WordSubmitRequest {
    /// Session the answer belongs to.
    pub session_id: Uuid,
    /// Word being answered.
    #[validate(length(min = 1, max = 64))]
    pub word_id: String,
    /// One single-character string per position.
    #[validate(length(min = 1), custom(function = "validate_letters"))]
    pub letters: Vec<String>,
}

impl WordSubmitRequest {
    /// Submitted letters as characters. Validation guarantees one char per entry.
    pub fn letters(&self) -> Vec<char> {
        self.letters
            .iter()
            .filter_map(|letter| letter.chars().next())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, ToSchema)]
/// Messages pushed to player WebSocket clients.
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum ServerMessage {
    /// Sent once when the socket is accepted.
    Connected {
        /// Id assigned to the socket.
        connection_id: Uuid,
    },
    /// Acknowledges a presence announcement.
    PlayerJoin {
        /// Announced player id.
        player_id: String,
        /// Announced display name.
        player_name: String,
        /// Connection now bound to the player.
        connection_id: Uuid,
    },
    /// Both players were paired into a session.
    OpponentFound {
        /// New session, also the broadcast group.
        session_id: Uuid,
        /// Both players, in pairing order.
        players: Vec<PlayerSummary>,
    },
    /// The session is active; first word of the plan, scrambled.
    GameStarted {
        /// Session that became active.
        session_id: Uuid,
        /// First word of the plan.
        word_id: String,
        /// Its letters, scrambled.
        letters: Vec<String>,
    },
    /// Verification outcome, sent privately to the submitter.
    WordSubmitResult {
        /// Word that was answered.
        word_id: String,
        /// Whether the whole word matched.
        is_correct: bool,
        /// Per-position outcome.
        letters: Vec<LetterResult>,
    },
    /// Group-wide progress after a correct answer.
    CorrectWord {
        /// Session the answer was made in.
        session_id: Uuid,
        /// Progress of every player that solved a word.
        progress: Vec<ProgressSummary>,
    },
    /// The submitter's next word, scrambled.
    SetNextWord {
        /// Next word of the plan.
        word_id: String,
        /// Its letters, scrambled.
        letters: Vec<String>,
    },
    /// The deadline elapsed; `winner` is null on a draw.
    GameTimeEnd {
        /// Session that ran out of time.
        session_id: Uuid,
        /// Leader at the deadline.
        winner: Option<PlayerSummary>,
        /// Human readable summary.
        message: String,
    },
    /// A player won by completion or forfeiture.
    GameFinish {
        /// Session that ended.
        session_id: Uuid,
        /// Player awarded the win.
        winner: PlayerSummary,
        /// Human readable summary.
        message: String,
    },
    /// Something the client sent could not be processed.
    GameError {
        /// Client-safe description.
        message: String,
    },
}

impl ServerMessage {
    /// Wire name of the event, used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Connected { .. } => "connected",
            Self::PlayerJoin { .. } => "player-join",
            Self::OpponentFound { .. } => "opponent-found",
            Self::GameStarted { .. } => "game-started",
            Self::WordSubmitResult { .. } => "word-submit-result",
            Self::CorrectWord { .. } => "correct-word",
            Self::SetNextWord { .. } => "set-next-word",
            Self::GameTimeEnd { .. } => "game-time-end",
            Self::GameFinish { .. } => "game-finish",
            Self::GameError { .. } => "game-error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_unit_events() {
        assert!(matches!(
            ClientMessage::from_json_str(r#"{"event":"find-opponent"}"#).unwrap(),
            ClientMessage::FindOpponent
        ));
        assert!(matches!(
            ClientMessage::from_json_str(r#"{"event":"stop-find-opponent"}"#).unwrap(),
            ClientMessage::StopFindOpponent
        ));
    }

    #[test]
    fn parses_word_submit() {
        let session_id = Uuid::new_v4();
        let text = format!(
            r#"{{"event":"word-submit","session_id":"{session_id}","word_id":"w1","letters":["C","A","T"]}}"#
        );
        match ClientMessage::from_json_str(&text).unwrap() {
            ClientMessage::WordSubmit(request) => {
                assert_eq!(request.session_id, session_id);
                assert_eq!(request.letters(), vec!['C', 'A', 'T']);
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn rejects_multi_character_letters() {
        let text = format!(
            r#"{{"event":"word-submit","session_id":"{}","word_id":"w1","letters":["CA","T"]}}"#,
            Uuid::new_v4()
        );
        assert!(matches!(
            ClientMessage::from_json_str(&text),
            Err(ProtocolError::InvalidPayload(_))
        ));
    }

    #[test]
    fn rejects_blank_player_join() {
        let text = r#"{"event":"player-join","player_id":"","player_name":"Alice"}"#;
        assert!(ClientMessage::from_json_str(text).is_err());
    }

    #[test]
    fn unknown_events_are_tolerated() {
        assert!(matches!(
            ClientMessage::from_json_str(r#"{"event":"dance"}"#).unwrap(),
            ClientMessage::Unknown
        ));
    }

    #[test]
    fn outbound_uses_kebab_case_tags() {
        let json = serde_json::to_value(ServerMessage::GameTimeEnd {
            session_id: Uuid::nil(),
            winner: None,
            message: "draw".into(),
        })
        .unwrap();
        assert_eq!(json["event"], "game-time-end");
        assert!(json["winner"].is_null());
    }
}
