use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use thiserror::Error;

use crate::{
    config::ConfigError,
    dto::ws::InboundError,
    state::{players::ScoreError, rounds::RoundError, state_machine::EngineError},
};

/// Errors that can occur in service layer operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Invalid input provided by the client.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Operation cannot be performed in the current state.
    #[error("invalid state: {0}")]
    InvalidState(String),
    /// Requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// The route does not support this kind of request.
    #[error("unsupported: {0}")]
    Unsupported(String),
}

impl From<InboundError> for ServiceError {
    fn from(err: InboundError) -> Self {
        ServiceError::InvalidInput(err.to_string())
    }
}

impl From<EngineError> for ServiceError {
    fn from(err: EngineError) -> Self {
        ServiceError::InvalidState(err.to_string())
    }
}

impl From<ScoreError> for ServiceError {
    fn from(err: ScoreError) -> Self {
        ServiceError::InvalidInput(err.to_string())
    }
}

/// Fatal problems while assembling the game at startup.
#[derive(Debug, Error)]
pub enum StartupError {
    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// A configured round could not be built.
    #[error("failed to build rounds: {0}")]
    Round(#[from] RoundError),
    /// The round sequence could not begin.
    #[error("failed to begin the game: {0}")]
    Engine(#[from] EngineError),
}

/// Application-level errors that are converted to HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    /// Bad request with invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),
    /// Requested resource not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// Conflict with current state.
    #[error("conflict: {0}")]
    Conflict(String),
    /// Method not supported by the target route.
    #[error("method not allowed: {0}")]
    MethodNotAllowed(String),
    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::InvalidInput(message) => AppError::BadRequest(message),
            ServiceError::InvalidState(message) => AppError::Conflict(message),
            ServiceError::NotFound(message) => AppError::NotFound(message),
            ServiceError::Unsupported(message) => AppError::MethodNotAllowed(message),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let payload = Json(ErrorBody {
            message: self.to_string(),
        });

        (status, payload).into_response()
    }
}
