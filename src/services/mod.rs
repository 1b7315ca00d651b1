/// Admin console handler and command execution.
pub mod admin_service;
/// Big screen broadcast handler.
pub mod big_screen_service;
/// Connection bookkeeping shared by the handlers.
pub mod broadcast;
/// Managed connections with heartbeat handling.
pub mod connection;
/// OpenAPI documentation generation.
pub mod documentation;
/// Startup assembly of the game and its routes.
pub mod game_service;
/// Health check service.
pub mod health_service;
/// Player device handler.
pub mod player_service;
/// Route-token dispatch.
pub mod router;
/// WebSocket frame pump between sockets and managed connections.
pub mod websocket_service;
