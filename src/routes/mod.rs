use axum::Router;

use crate::state::SharedState;

/// `/api/{route}` request dispatch.
pub mod channel;
/// Swagger UI and the OpenAPI document.
pub mod docs;
/// `/healthcheck`.
pub mod health;
/// `/ws/{token}` upgrades.
pub mod websocket;

/// Compose all route trees, wiring in shared state and documentation routes.
pub fn router(state: SharedState) -> Router<()> {
    let api_router = health::router()
        .merge(websocket::router())
        .merge(channel::router());

    let docs_router = docs::router(state.clone());

    api_router.merge(docs_router).with_state(state)
}
