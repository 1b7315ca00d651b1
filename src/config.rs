//! Application-level configuration loading: scoring constants, display limits,
//! keepalive timing and the round sequence.

use std::{
    env, fs,
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::info;

use crate::state::{players::ScoreSettings, rounds::RoundSpec};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/quiz.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "PUB_QUIZ_CONFIG_PATH";
/// Upper bound for either heartbeat setting: one day.
pub const MAX_HEARTBEAT_SECS: u64 = 86_400;

/// Errors raised while loading the configuration. All of them are fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file exists but could not be read.
    #[error("failed to read config `{path}`: {source}")]
    Read {
        /// File that was read.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: io::Error,
    },
    /// The file is not valid JSON or misses a required key.
    #[error("failed to parse config `{path}`: {source}")]
    Parse {
        /// File that was parsed.
        path: PathBuf,
        /// Underlying deserialization failure.
        #[source]
        source: serde_json::Error,
    },
    /// Values parsed but do not make sense together.
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Keepalive timing applied to every managed connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct HeartbeatConfig {
    /// Seconds between protocol pings.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Seconds without inbound traffic before the connection is closed.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl HeartbeatConfig {
    /// Delay between keepalive ticks.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Silence after which a connection is closed.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_interval_secs() -> u64 {
    15
}

fn default_timeout_secs() -> u64 {
    45
}

fn default_big_screen_top_n() -> usize {
    10
}

/// Immutable runtime configuration shared across the application.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Score given to players when they join.
    pub start_score: i64,
    /// Lowest score left after a rebalancing pass.
    pub reset_score: i64,
    /// Roster entries shown on the big screen.
    #[serde(default = "default_big_screen_top_n")]
    pub big_screen_top_n: usize,
    #[serde(default)]
    pub heartbeat: HeartbeatConfig,
    /// Ordered round sequence.
    pub rounds: Vec<RoundSpec>,
}

impl AppConfig {
    /// Load the configuration from disk, falling back to the demo game when the file is absent.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&resolve_config_path())
    }

    /// Load the configuration from `path`.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using the built-in demo game"
                );
                return Ok(Self::demo());
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        let config = Self::from_json_str(&contents).map_err(|err| match err {
            ConfigError::Parse { source, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })?;
        info!(
            path = %path.display(),
            rounds = config.rounds.len(),
            "loaded quiz config"
        );
        Ok(config)
    }

    /// Parse and check a JSON document.
    pub fn from_json_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(contents).map_err(|source| ConfigError::Parse {
                path: PathBuf::new(),
                source,
            })?;
        config.check()?;
        Ok(config)
    }

    /// Scoring constants handed to the roster.
    pub fn score_settings(&self) -> ScoreSettings {
        ScoreSettings {
            start_score: self.start_score,
            reset_score: self.reset_score,
        }
    }

    /// Built-in game used when no configuration file exists.
    pub fn demo() -> Self {
        Self {
            start_score: 0,
            reset_score: 0,
            big_screen_top_n: default_big_screen_top_n(),
            heartbeat: HeartbeatConfig::default(),
            rounds: vec![
                RoundSpec::new("lobby", json!({ "title": "Welcome to the pub quiz" })),
                RoundSpec::new(
                    "question",
                    json!({ "question": "What is the capital of France?", "answer": "Paris" }),
                ),
                RoundSpec::new(
                    "question",
                    json!({ "question": "How many legs does a spider have?", "answer": "8", "points": 2 }),
                ),
                RoundSpec::new("scoreboard", json!({ "title": "Final scores" })),
            ],
        }
    }

    fn check(&self) -> Result<(), ConfigError> {
        if self.heartbeat.interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "heartbeat.interval_secs must be positive".into(),
            ));
        }
        if self.heartbeat.interval_secs > MAX_HEARTBEAT_SECS
            || self.heartbeat.timeout_secs > MAX_HEARTBEAT_SECS
        {
            return Err(ConfigError::Invalid(format!(
                "heartbeat settings must not exceed {MAX_HEARTBEAT_SECS} seconds"
            )));
        }
        if self.heartbeat.timeout_secs < self.heartbeat.interval_secs {
            return Err(ConfigError::Invalid(
                "heartbeat.timeout_secs must not be shorter than heartbeat.interval_secs".into(),
            ));
        }
        Ok(())
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
