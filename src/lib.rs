//! Library crate for pub-quiz-back, exposing modules for binaries and integration tests.

pub mod config;
/// Wire types shared by HTTP and WebSocket clients.
pub mod dto;
/// Service, HTTP and startup errors.
pub mod error;
/// axum route trees.
pub mod routes;
/// Handlers and the connection plumbing behind the routes.
pub mod services;
/// The game engine and shared application state.
pub mod state;

use axum::Router;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Build the top-level router and attach cross-cutting middleware layers.
pub fn build_router(state: state::SharedState) -> Router<()> {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
