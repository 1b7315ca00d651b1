use axum::{
    Router,
    extract::{Path, State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
};

use crate::{services::websocket_service, state::SharedState};

#[utoipa::path(
    get,
    path = "/ws/{token}",
    tag = "channels",
    params(("token" = String, Path, description = "Route token: `big_screen`, `player` or `admin`")),
    responses((status = 101, description = "Switching protocols to WebSocket"))
)]
/// Upgrade the HTTP connection into a WebSocket bound to the given route.
///
/// Unknown tokens are accepted at the HTTP level and immediately closed with
/// code 1002.
pub async fn ws_handler(
    State(state): State<SharedState>,
    Path(token): Path<String>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| websocket_service::handle_socket(state, token, socket))
}

/// Configure the WebSocket endpoint.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/ws/{token}", get(ws_handler))
}
