use axum::{
    Json, Router,
    extract::{Path, State},
    routing::get,
};
use serde_json::Value;

use crate::{
    dto::{game::GameStatusResponse, ws::{AdminCommand, StatusMessage}},
    error::AppError,
    services::router::{RouteRequest, RouteResponse},
    state::SharedState,
};

/// Routes forwarding plain HTTP requests to the handler bound to a route token.
pub fn router() -> Router<SharedState> {
    Router::new().route("/api/{route}", get(read_channel).post(post_channel))
}

/// Read the current view of a route handler.
#[utoipa::path(
    get,
    path = "/api/{route}",
    tag = "channels",
    params(("route" = String, Path, description = "Route token")),
    responses(
        (status = 200, description = "Handler view; `big_screen` and `admin` answer with a game status", body = GameStatusResponse),
        (status = 404, description = "No handler is bound to the route")
    )
)]
pub async fn read_channel(
    State(state): State<SharedState>,
    Path(route): Path<String>,
) -> Result<Json<Value>, AppError> {
    dispatch(&state, &route, RouteRequest::Get)
}

/// Submit a JSON body to a route handler, e.g. an admin command.
#[utoipa::path(
    post,
    path = "/api/{route}",
    tag = "channels",
    params(("route" = String, Path, description = "Route token")),
    request_body = AdminCommand,
    responses(
        (status = 200, description = "Command applied", body = StatusMessage),
        (status = 400, description = "Malformed command"),
        (status = 404, description = "No handler is bound to the route"),
        (status = 405, description = "The handler does not accept submissions"),
        (status = 409, description = "Command refused in the current game state")
    )
)]
pub async fn post_channel(
    State(state): State<SharedState>,
    Path(route): Path<String>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, AppError> {
    dispatch(&state, &route, RouteRequest::Post(body))
}

fn dispatch(
    state: &SharedState,
    route: &str,
    request: RouteRequest,
) -> Result<Json<Value>, AppError> {
    let response: RouteResponse = state
        .router()
        .on_request(route, request)
        .ok_or_else(|| AppError::NotFound(format!("no handler bound to route `{route}`")))?;
    Ok(Json(response?))
}
