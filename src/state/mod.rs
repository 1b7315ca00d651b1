pub mod bus;
/// The running game facade.
pub mod game;
pub mod players;
pub mod rounds;
/// Round sequencing.
pub mod state_machine;

use std::sync::Arc;

use parking_lot::Mutex;

use crate::{config::AppConfig, services::router::ConnectionRouter, state::game::Game};

/// The single running game, shared by every handler.
///
/// Locked for the whole of each engine operation; never held across an `.await`.
pub type GameHandle = Arc<Mutex<Game>>;

/// Handle to [`AppState`] passed to every axum handler.
pub type SharedState = Arc<AppState>;

/// Central application state: the game, the route table and the loaded configuration.
pub struct AppState {
    game: GameHandle,
    router: ConnectionRouter,
    config: AppConfig,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    pub fn new(game: GameHandle, router: ConnectionRouter, config: AppConfig) -> SharedState {
        Arc::new(Self {
            game,
            router,
            config,
        })
    }

    /// The running game.
    pub fn game(&self) -> &GameHandle {
        &self.game
    }

    /// Route table consulted by the HTTP and WebSocket boundaries.
    pub fn router(&self) -> &ConnectionRouter {
        &self.router
    }

    /// Configuration the game was built from.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }
}
