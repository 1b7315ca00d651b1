use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_with::skip_serializing_none;
use thiserror::Error;
use utoipa::ToSchema;
use validator::{Validate, ValidationErrors};

use crate::dto::validation::validate_player_name;

/// Reserved application-level ping sent by clients.
pub const PING_TOKEN: &str = "__ping__";
/// Reserved reply to [`PING_TOKEN`].
pub const PONG_TOKEN: &str = "__pong__";

/// Status value flagging a user-facing error.
pub const STATUS_FAILURE: &str = "failure";
/// Status value for a plain acknowledgement.
pub const STATUS_OK: &str = "ok";

/// Failure or informational event pushed to a single connection.
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct StatusMessage {
    /// `failure` for errors to surface, anything else is informational.
    pub status: String,
    /// Text of a `failure`.
    pub error_msg: Option<String>,
    /// Optional detail attached to any other status.
    pub info_msg: Option<String>,
}

impl StatusMessage {
    /// Plain acknowledgement.
    pub fn ok() -> Self {
        Self::info(STATUS_OK, None::<String>)
    }

    /// Informational event with an optional human-readable message.
    pub fn info(status: impl Into<String>, message: Option<impl Into<String>>) -> Self {
        Self {
            status: status.into(),
            error_msg: None,
            info_msg: message.map(Into::into),
        }
    }

    /// User-facing error shown as a pop-up by clients.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            status: STATUS_FAILURE.to_string(),
            error_msg: Some(message.into()),
            info_msg: None,
        }
    }
}

/// Errors raised while decoding an inbound WebSocket text frame.
#[derive(Debug, Error)]
pub enum InboundError {
    /// Payload was not valid JSON or did not match any known message.
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
    /// Payload parsed but failed field validation.
    #[error("invalid message: {0}")]
    Invalid(#[from] ValidationErrors),
}

/// Identification sent by a player connection.
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct JoinRequest {
    /// Requested display name, trimmed before use.
    pub name: String,
}

impl Validate for JoinRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if let Err(e) = validate_player_name(&self.name) {
            errors.add("name", e);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Empty body for commands that carry no arguments.
#[derive(Debug, Clone, Default, Deserialize, Serialize, ToSchema)]
pub struct Empty {}

/// Messages accepted from player connections, tagged by their top-level key.
#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerInboundMessage {
    /// `{"join": {"name": "..."}}`
    Join(JoinRequest),
    /// `{"leave": {}}`
    Leave(Empty),
    /// `{"round": {...}}`, forwarded to the active round.
    Round(Value),
}

impl PlayerInboundMessage {
    /// Decode a text frame, validating the join name when present.
    pub fn from_json_str(text: &str) -> Result<Self, InboundError> {
        let message: Self = serde_json::from_str(text)?;
        if let Self::Join(request) = &message {
            request.validate()?;
        }
        Ok(message)
    }
}

/// Commands accepted from the admin console, over WebSocket or HTTP.
#[derive(Debug, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AdminCommand {
    /// Move the active round, absolutely or relative to the current one.
    Advance {
        idx: i64,
        #[serde(default)]
        relative: bool,
    },
    /// Apply score deltas (or absolute scores when `additive` is false).
    UpdateScores {
        deltas: HashMap<String, i64>,
        #[serde(default = "default_additive")]
        additive: bool,
    },
    /// Flag players as active or eliminated.
    SetPlaying { names: Vec<String>, isplaying: bool },
    /// Add a player on behalf of someone without a device.
    AddPlayer(JoinRequest),
    /// Remove a player from the roster.
    RemovePlayer { name: String },
}

fn default_additive() -> bool {
    true
}

impl AdminCommand {
    /// Decode a text frame into a command.
    pub fn from_json_str(text: &str) -> Result<Self, InboundError> {
        let command: Self = serde_json::from_str(text)?;
        if let Self::AddPlayer(request) = &command {
            request.validate()?;
        }
        Ok(command)
    }

    /// Decode an already-parsed JSON body into a command.
    pub fn from_value(value: Value) -> Result<Self, InboundError> {
        let command: Self = serde_json::from_value(value)?;
        if let Self::AddPlayer(request) = &command {
            request.validate()?;
        }
        Ok(command)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn failure_status_serializes_without_info() {
        let value = serde_json::to_value(StatusMessage::failure("boom")).unwrap();
        assert_eq!(value, json!({ "status": "failure", "error_msg": "boom" }));
    }

    #[test]
    fn player_messages_are_tagged_by_top_level_key() {
        let join = PlayerInboundMessage::from_json_str(r#"{"join":{"name":"Ada"}}"#).unwrap();
        assert!(matches!(join, PlayerInboundMessage::Join(JoinRequest { name }) if name == "Ada"));

        let round =
            PlayerInboundMessage::from_json_str(r#"{"round":{"answer":"Paris"}}"#).unwrap();
        match round {
            PlayerInboundMessage::Round(value) => assert_eq!(value, json!({ "answer": "Paris" })),
            other => panic!("unexpected message {other:?}"),
        }

        assert!(matches!(
            PlayerInboundMessage::from_json_str(r#"{"leave":{}}"#).unwrap(),
            PlayerInboundMessage::Leave(_)
        ));
    }

    #[test]
    fn invalid_join_name_is_rejected() {
        let err = PlayerInboundMessage::from_json_str(r#"{"join":{"name":"   "}}"#).unwrap_err();
        assert!(matches!(err, InboundError::Invalid(_)));

        let err = PlayerInboundMessage::from_json_str("not json").unwrap_err();
        assert!(matches!(err, InboundError::Malformed(_)));
    }

    #[test]
    fn admin_update_scores_defaults_to_additive() {
        let command =
            AdminCommand::from_json_str(r#"{"update_scores":{"deltas":{"A":-65,"B":0}}}"#)
                .unwrap();
        match command {
            AdminCommand::UpdateScores { deltas, additive } => {
                assert!(additive);
                assert_eq!(deltas.get("A"), Some(&-65));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn admin_advance_defaults_to_absolute() {
        let command = AdminCommand::from_value(json!({ "advance": { "idx": 2 } })).unwrap();
        assert!(matches!(
            command,
            AdminCommand::Advance {
                idx: 2,
                relative: false
            }
        ));
    }
}
