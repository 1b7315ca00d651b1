use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::state::{bus::Payload, players::Player};

/// Public view of a single roster entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PlayerSummary {
    /// Display name.
    pub name: String,
    /// Current score.
    pub score: i64,
    /// `false` once eliminated.
    pub isplaying: bool,
}

impl From<&Player> for PlayerSummary {
    fn from(player: &Player) -> Self {
        Self {
            name: player.name.clone(),
            score: player.score,
            isplaying: player.isplaying,
        }
    }
}

/// Roster update pushed to every connected surface.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PlayerUpdate {
    /// Players ordered active first, then by score, then by name.
    pub player_update: Vec<PlayerSummary>,
}

impl PlayerUpdate {
    /// Wrap a roster snapshot, keeping at most `limit` entries when provided.
    pub fn new(roster: &[PlayerSummary], limit: Option<usize>) -> Self {
        let take = limit.unwrap_or(roster.len());
        Self {
            player_update: roster.iter().take(take).cloned().collect(),
        }
    }
}

/// Snapshot of the game returned by HTTP status requests.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct GameStatusResponse {
    /// Display template of the active round.
    pub widget_name: String,
    /// Zero-based position of the active round.
    pub current_index: usize,
    /// Total number of rounds.
    pub length: usize,
    /// Round display names in order, for progress indicators.
    pub rounds: Vec<String>,
    /// Status message of the active round.
    #[schema(value_type = Object)]
    pub status: Payload,
    /// Roster in display order.
    pub players: Vec<PlayerSummary>,
}
