use std::{collections::HashMap, sync::Arc};

use futures::future::{self, BoxFuture};
use rand::seq::IndexedRandom;

use crate::dao::{
    models::{Word, WordId},
    storage::{StorageError, StorageResult},
    word_store::WordSource,
};

/// Word source backed by a corpus loaded once at startup.
#[derive(Clone)]
pub struct InMemoryWordSource {
    inner: Arc<Corpus>,
}

struct Corpus {
    words: Vec<Word>,
    index: HashMap<WordId, usize>,
}

impl InMemoryWordSource {
    /// Build the source from a list of words. Later duplicates of an id win the lookup slot.
    pub fn new(words: Vec<Word>) -> Self {
        let index = words
            .iter()
            .enumerate()
            .map(|(position, word)| (word.id.clone(), position))
            .collect();
        Self {
            inner: Arc::new(Corpus { words, index }),
        }
    }
}

impl WordSource for InMemoryWordSource {
    fn random_word(&self) -> BoxFuture<'static, StorageResult<Word>> {
        let picked = self
            .inner
            .words
            .choose(&mut rand::rng())
            .cloned()
            .ok_or(StorageError::Empty);
        Box::pin(future::ready(picked))
    }

    fn word_by_id(&self, id: WordId) -> BoxFuture<'static, StorageResult<Option<Word>>> {
        let found = self
            .inner
            .index
            .get(&id)
            .and_then(|position| self.inner.words.get(*position))
            .cloned();
        Box::pin(future::ready(Ok(found)))
    }
}
