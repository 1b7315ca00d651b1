use serde::Deserialize;
use serde_json::json;

use crate::state::{
    bus::Payload,
    players::PlayerRegistry,
    rounds::general_info,
    state_machine::{GameState, RoundContext},
};

#[derive(Debug, Clone, Deserialize)]
pub struct ScoreboardSettings {
    #[serde(default = "default_title")]
    pub title: String,
    /// How many leaders the display highlights; everyone when absent.
    #[serde(default)]
    pub top: Option<usize>,
}

fn default_title() -> String {
    "Scores".to_string()
}

/// Intermediate or final standings. Clients render the roster update stream.
pub struct Scoreboard {
    settings: ScoreboardSettings,
}

impl Scoreboard {
    /// Registry tag.
    pub const KIND: &'static str = "scoreboard";

    pub fn new(settings: ScoreboardSettings) -> Self {
        Self { settings }
    }
}

impl GameState for Scoreboard {
    fn name(&self) -> &str {
        Self::KIND
    }

    fn begin_active(&mut self, _ctx: &mut RoundContext<'_>) {}

    fn end_active(&mut self, _ctx: &mut RoundContext<'_>) {}

    fn status_message(&self, players: &PlayerRegistry) -> Payload {
        let leaders: Vec<String> = players
            .snapshot()
            .into_iter()
            .take(self.settings.top.unwrap_or(usize::MAX))
            .map(|player| player.name)
            .collect();
        general_info(json!({
            "title": self.settings.title,
            "top": self.settings.top,
            "leaders": leaders,
        }))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::state::{bus::NotificationBus, players::ScoreSettings};

    #[test]
    fn leaders_follow_roster_order_and_limit() {
        let mut players = PlayerRegistry::new(
            ScoreSettings {
                start_score: 0,
                reset_score: 0,
            },
            Arc::new(NotificationBus::new()),
        );
        for name in ["A", "B", "C"] {
            players.add(name);
        }
        players.update_scores([("C", 5), ("B", 2)], true).unwrap();

        let board = Scoreboard::new(
            serde_json::from_value(json!({ "title": "Half time", "top": 2 })).unwrap(),
        );
        let status = board.status_message(&players);
        assert_eq!(status["general_info"]["title"], json!("Half time"));
        assert_eq!(status["general_info"]["leaders"], json!(["C", "B"]));
    }
}
