use crate::{dto::health::HealthResponse, state::SharedState};

/// Respond with a static health payload listing the bound routes.
pub fn health_status(state: &SharedState) -> HealthResponse {
    HealthResponse::ok(state.router().routes())
}
