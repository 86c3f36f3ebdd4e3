use serde::{Deserialize, Serialize};

/// Identifier of a word inside the corpus.
pub type WordId = String;

/// A target answer for one round. Immutable once fetched from the word source.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Word {
    /// Stable identifier of the word.
    pub id: WordId,
    /// Letters the players must reconstruct.
    pub text: String,
}

impl Word {
    /// Build a word from its identifier and text.
    pub fn new(id: impl Into<WordId>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
        }
    }

    /// Letters of the word in order.
    pub fn letters(&self) -> Vec<char> {
        self.text.chars().collect()
    }
}
