//! Startup assembly: build the rounds, wire the handlers, begin the game.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::info;

use crate::{
    config::AppConfig,
    error::StartupError,
    services::{
        admin_service::{ADMIN_ROUTE, AdminHandler},
        big_screen_service::{BIG_SCREEN_ROUTE, BigScreenHandler},
        player_service::{PLAYER_ROUTE, PlayerHandler},
        router::ConnectionRouter,
    },
    state::{AppState, GameHandle, SharedState, game::Game, rounds::RoundRegistry},
};

/// Build the shared state from `config`, using `registry` to turn round specs into rounds.
///
/// Handlers subscribe before the game begins so the opening announcement goes
/// through the same path as every later one.
pub fn bootstrap(config: AppConfig, registry: &RoundRegistry) -> Result<SharedState, StartupError> {
    let rounds = registry.build_all(&config.rounds)?;
    info!(kinds = ?registry.kinds(), rounds = rounds.len(), "rounds built");

    let mut game = Game::new(config.score_settings());
    for round in rounds {
        game.append(round);
    }
    let game: GameHandle = Arc::new(Mutex::new(game));

    let router = ConnectionRouter::new();
    router.register(
        BIG_SCREEN_ROUTE,
        BigScreenHandler::install(&game, config.big_screen_top_n),
    );
    router.register(PLAYER_ROUTE, PlayerHandler::install(&game));
    router.register(ADMIN_ROUTE, AdminHandler::install(&game));

    game.lock().begin()?;
    info!(
        rounds = game.lock().rounds().len(),
        routes = ?router.routes(),
        "game ready"
    );

    Ok(AppState::new(game, router, config))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::state::rounds::{RoundError, RoundSpec};

    #[test]
    fn demo_config_boots_with_all_routes() {
        let state = bootstrap(AppConfig::demo(), &RoundRegistry::with_builtin()).unwrap();
        assert_eq!(state.router().routes(), vec!["admin", "big_screen", "player"]);
        let game = state.game().lock();
        assert!(game.rounds().is_started());
        assert_eq!(game.rounds().current_index(), 0);
    }

    #[test]
    fn empty_round_list_is_fatal() {
        let mut config = AppConfig::demo();
        config.rounds.clear();
        let err = bootstrap(config, &RoundRegistry::with_builtin()).err().unwrap();
        assert!(matches!(err, StartupError::Engine(_)));
    }

    #[test]
    fn unknown_round_type_is_fatal() {
        let mut config = AppConfig::demo();
        config.rounds.push(RoundSpec::new("karaoke", json!({})));
        let err = bootstrap(config, &RoundRegistry::with_builtin()).err().unwrap();
        assert!(matches!(err, StartupError::Round(RoundError::UnknownKind(_))));
    }
}
