/// Domain records supplied by the word corpus.
pub mod models;
/// Storage abstraction layer errors.
pub mod storage;
/// Word corpus access.
pub mod word_store;
