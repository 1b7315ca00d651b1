/// Roster and game status payloads.
pub mod game;
/// Health check payload.
pub mod health;
pub mod validation;
/// WebSocket messages and admin commands.
pub mod ws;
