//! Application-level configuration loading, including the built-in word corpus.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

use crate::dao::models::Word;

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "WORD_DUEL_BACK_CONFIG_PATH";

const DEFAULT_MATCHMAKING_INTERVAL: Duration = Duration::from_secs(10);
const DEFAULT_ROUND_COUNT: usize = 5;
const DEFAULT_ROUND_DURATION: Duration = Duration::from_secs(60);
const DEFAULT_WORD_FETCH_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    /// Period of the matchmaking scheduler.
    pub matchmaking_interval: Duration,
    /// Number of words in a session's round plan.
    pub round_count: usize,
    /// Time players have to solve the round plan once a session is active.
    pub round_duration: Duration,
    /// Upper bound on the word source fetch performed at round start.
    pub word_fetch_timeout: Duration,
    /// Corpus served by the in-memory word source.
    pub words: Vec<Word>,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => match AppConfig::try_from(raw) {
                    Ok(app_config) => {
                        info!(
                            path = %path.display(),
                            words = app_config.words.len(),
                            round_count = app_config.round_count,
                            "loaded configuration"
                        );
                        app_config
                    }
                    Err(reason) => {
                        warn!(
                            path = %path.display(),
                            reason,
                            "rejected config; falling back to defaults"
                        );
                        Self::default()
                    }
                },
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            matchmaking_interval: DEFAULT_MATCHMAKING_INTERVAL,
            round_count: DEFAULT_ROUND_COUNT,
            round_duration: DEFAULT_ROUND_DURATION,
            word_fetch_timeout: DEFAULT_WORD_FETCH_TIMEOUT,
            words: default_words(),
        }
    }
}

#[derive(Debug, Deserialize)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    matchmaking_interval_secs: Option<u64>,
    round_count: Option<usize>,
    round_duration_secs: Option<u64>,
    word_fetch_timeout_secs: Option<u64>,
    words: Option<Vec<RawWord>>,
}

#[derive(Debug, Deserialize)]
/// JSON representation of a single corpus entry.
struct RawWord {
    id: String,
    text: String,
}

impl TryFrom<RawConfig> for AppConfig {
    type Error = &'static str;

    fn try_from(value: RawConfig) -> Result<Self, Self::Error> {
        let defaults = AppConfig::default();

        let matchmaking_interval = positive_secs(value.matchmaking_interval_secs)
            .ok_or("matchmaking interval must be positive")?
            .unwrap_or(defaults.matchmaking_interval);
        let round_duration = positive_secs(value.round_duration_secs)
            .ok_or("round duration must be positive")?
            .unwrap_or(defaults.round_duration);
        let word_fetch_timeout = positive_secs(value.word_fetch_timeout_secs)
            .ok_or("word fetch timeout must be positive")?
            .unwrap_or(defaults.word_fetch_timeout);

        let round_count = value.round_count.unwrap_or(defaults.round_count);
        if round_count == 0 {
            return Err("round count must be positive");
        }

        let words = match value.words {
            Some(words) => words
                .into_iter()
                .map(|raw| Word::new(raw.id, raw.text.trim()))
                .filter(|word| !word.text.is_empty())
                .collect::<Vec<_>>(),
            None => defaults.words,
        };
        if words.is_empty() {
            return Err("word corpus must not be empty");
        }

        Ok(Self {
            matchmaking_interval,
            round_count,
            round_duration,
            word_fetch_timeout,
            words,
        })
    }
}

/// `None` when the value is present but zero, `Some(None)` when absent.
fn positive_secs(value: Option<u64>) -> Option<Option<Duration>> {
    match value {
        Some(0) => None,
        Some(secs) => Some(Some(Duration::from_secs(secs))),
        None => Some(None),
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Built-in corpus shipped with the binary.
fn default_words() -> Vec<Word> {
    [
        "APPLE", "BRIDGE", "CANDLE", "DRAGON", "ENGINE", "FOREST", "GARDEN", "HARBOR", "ISLAND",
        "JUNGLE", "KETTLE", "LANTERN", "MARKET", "NEEDLE", "ORANGE", "PLANET", "QUARTZ",
        "RIVER", "SILVER", "TURTLE", "VELVET", "WINDOW", "YELLOW", "ZIPPER",
    ]
    .into_iter()
    .enumerate()
    .map(|(index, text)| Word::new(format!("w{:03}", index + 1), text))
    .collect()
}
