//! Round variants and the registry building them from configuration.

mod answers;
mod lobby;
mod question;
mod scoreboard;

use indexmap::IndexMap;
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

use crate::state::{bus::Payload, state_machine::GameState};

pub use self::answers::AnswerCollector;
pub use self::lobby::Lobby;
pub use self::question::Question;
pub use self::scoreboard::Scoreboard;

/// Errors produced while building or driving a round.
#[derive(Debug, Error)]
pub enum RoundError {
    /// No factory is registered under this tag.
    #[error("unknown round type `{0}`")]
    UnknownKind(String),
    /// The factory rejected the configured parameters.
    #[error("invalid parameters for round type `{kind}`: {source}")]
    InvalidParams {
        /// Tag of the round being built.
        kind: String,
        /// Underlying deserialization failure.
        #[source]
        source: serde_json::Error,
    },
    /// The active round does not accept player messages.
    #[error("round `{round}` does not accept player messages")]
    Unsupported {
        /// Name of the active round.
        round: String,
    },
    /// The active round refused the message.
    #[error("{0}")]
    Rejected(String),
}

/// Configuration entry describing one round: `{ "type": <tag>, ...params }`.
#[derive(Debug, Clone, Deserialize)]
pub struct RoundSpec {
    /// Registry tag selecting the variant.
    #[serde(rename = "type")]
    pub kind: String,
    /// Remaining keys, handed to the factory.
    #[serde(flatten)]
    pub params: Payload,
}

impl RoundSpec {
    /// Build a spec from a tag and a JSON object of parameters.
    pub fn new(kind: impl Into<String>, params: Value) -> Self {
        let params = match params {
            Value::Object(map) => map,
            _ => Payload::new(),
        };
        Self {
            kind: kind.into(),
            params,
        }
    }
}

/// Factory turning parameters into a concrete round.
pub type RoundFactory =
    Box<dyn Fn(&RoundSpec) -> Result<Box<dyn GameState>, RoundError> + Send + Sync>;

/// Tag → factory table, assembled once at startup and passed to the engine.
#[derive(Default)]
pub struct RoundRegistry {
    factories: IndexMap<String, RoundFactory>,
}

impl RoundRegistry {
    /// Registry without any variants.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the lobby, question and scoreboard variants.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(Lobby::KIND, |spec| {
            Ok(Box::new(Lobby::new(parse_params(spec)?)) as Box<dyn GameState>)
        });
        registry.register(Question::KIND, |spec| {
            Ok(Box::new(Question::new(parse_params(spec)?)) as Box<dyn GameState>)
        });
        registry.register(Scoreboard::KIND, |spec| {
            Ok(Box::new(Scoreboard::new(parse_params(spec)?)) as Box<dyn GameState>)
        });
        registry
    }

    /// Register a factory under `kind`. Returns `false` if the tag is taken.
    pub fn register<F>(&mut self, kind: &str, factory: F) -> bool
    where
        F: Fn(&RoundSpec) -> Result<Box<dyn GameState>, RoundError> + Send + Sync + 'static,
    {
        if self.factories.contains_key(kind) {
            warn!(kind, "round type already registered; keeping the original");
            return false;
        }
        self.factories.insert(kind.to_string(), Box::new(factory));
        info!(kind, "round type registered");
        true
    }

    /// Registered tags, in registration order.
    pub fn kinds(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    /// Build a single round from its spec.
    pub fn build(&self, spec: &RoundSpec) -> Result<Box<dyn GameState>, RoundError> {
        let factory = self
            .factories
            .get(&spec.kind)
            .ok_or_else(|| RoundError::UnknownKind(spec.kind.clone()))?;
        factory(spec)
    }

    /// Build every round in order, stopping at the first failure.
    pub fn build_all(&self, specs: &[RoundSpec]) -> Result<Vec<Box<dyn GameState>>, RoundError> {
        specs.iter().map(|spec| self.build(spec)).collect()
    }
}

/// Deserialize a round's parameters into its typed settings.
fn parse_params<T: DeserializeOwned>(spec: &RoundSpec) -> Result<T, RoundError> {
    serde_json::from_value(Value::Object(spec.params.clone())).map_err(|source| {
        RoundError::InvalidParams {
            kind: spec.kind.clone(),
            source,
        }
    })
}

/// Wrap a `general_info` object into a status payload.
fn general_info(info: Value) -> Payload {
    let mut payload = Payload::new();
    payload.insert("general_info".to_string(), info);
    payload
}
