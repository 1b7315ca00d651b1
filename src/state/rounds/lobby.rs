use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::state::{
    bus::Payload,
    players::PlayerRegistry,
    rounds::general_info,
    state_machine::{GameState, RoundContext},
};

/// Settings accepted by the `lobby` round.
#[derive(Debug, Clone, Deserialize)]
pub struct LobbySettings {
    #[serde(default = "default_title")]
    pub title: String,
}

fn default_title() -> String {
    "Waiting for players".to_string()
}

/// Pre-game waiting room listing who has joined.
pub struct Lobby {
    settings: LobbySettings,
}

impl Lobby {
    /// Registry tag.
    pub const KIND: &'static str = "lobby";

    pub fn new(settings: LobbySettings) -> Self {
        Self { settings }
    }
}

impl GameState for Lobby {
    fn name(&self) -> &str {
        Self::KIND
    }

    fn begin_active(&mut self, ctx: &mut RoundContext<'_>) {
        info!(
            title = %self.settings.title,
            players = ctx.players().len(),
            "lobby open"
        );
    }

    fn end_active(&mut self, _ctx: &mut RoundContext<'_>) {}

    fn status_message(&self, players: &PlayerRegistry) -> Payload {
        let mut names = players.names(Some(true));
        names.sort();
        general_info(json!({
            "title": self.settings.title,
            "players": names,
        }))
    }
}
