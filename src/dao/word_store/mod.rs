mod memory;

use std::{collections::HashSet, sync::Arc};

use futures::future::BoxFuture;

use crate::dao::{
    models::{Word, WordId},
    storage::StorageResult,
};

pub use self::memory::InMemoryWordSource;

/// Abstraction over the corpus supplying round words.
pub trait WordSource: Send + Sync {
    /// Any word of the corpus.
    fn random_word(&self) -> BoxFuture<'static, StorageResult<Word>>;
    /// Look a word up by id.
    fn word_by_id(&self, id: WordId) -> BoxFuture<'static, StorageResult<Option<Word>>>;
}

/// Fetch the word sequence for a session.
///
/// Distinct words are preferred; once the retry allowance is spent (small corpus)
/// the remaining rounds accept repeats so the plan always has `count` entries.
pub async fn load_round_plan(
    source: Arc<dyn WordSource>,
    count: usize,
) -> StorageResult<Vec<Word>> {
    let mut plan = Vec::with_capacity(count);
    let mut seen: HashSet<WordId> = HashSet::with_capacity(count);
    let mut retries_left = count * 3;

    while plan.len() < count {
        let word = source.random_word().await?;
        if seen.insert(word.id.clone()) || retries_left == 0 {
            plan.push(word);
        } else {
            retries_left -= 1;
        }
    }

    Ok(plan)
}
