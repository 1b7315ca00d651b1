//! Player roster with scoring and rebalancing rules.

use std::{cmp::Reverse, sync::Arc};

use indexmap::IndexMap;
use thiserror::Error;
use tracing::{info, warn};

use crate::{dto::game::PlayerSummary, state::bus::NotificationBus};

/// Player info tracked during the game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
    /// Unique display name, immutable once joined.
    pub name: String,
    /// Current score.
    pub score: i64,
    /// `false` once the player has been eliminated.
    pub isplaying: bool,
}

/// Scoring constants taken from the configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoreSettings {
    /// Score assigned to a player on join.
    pub start_score: i64,
    /// Lowest score left after a rebalancing pass.
    pub reset_score: i64,
}

/// Score updates refused as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ScoreError {
    /// Lifting every player by `-min + reset_score` leaves the `i64` range.
    #[error("rebalancing from a minimum of {min} would overflow the score range")]
    RebalanceOverflow {
        /// Lowest score after the deltas were applied.
        min: i64,
    },
}

/// Owns every player and announces each roster change on the player topic.
pub struct PlayerRegistry {
    players: IndexMap<String, Player>,
    settings: ScoreSettings,
    bus: Arc<NotificationBus>,
}

impl PlayerRegistry {
    /// Create an empty roster announcing on `bus`.
    pub fn new(settings: ScoreSettings, bus: Arc<NotificationBus>) -> Self {
        Self {
            players: IndexMap::new(),
            settings,
            bus,
        }
    }

    /// Scoring constants in use.
    pub fn settings(&self) -> ScoreSettings {
        self.settings
    }

    /// Add a player with the starting score.
    ///
    /// Returns `false` without touching the roster when the name is taken.
    pub fn add(&mut self, name: &str) -> bool {
        if self.players.contains_key(name) {
            return false;
        }

        self.players.insert(
            name.to_string(),
            Player {
                name: name.to_string(),
                score: self.settings.start_score,
                isplaying: true,
            },
        );
        info!(player = name, score = self.settings.start_score, "player added");
        self.announce();
        true
    }

    /// Remove a player, announcing only when someone was actually removed.
    pub fn remove(&mut self, name: &str) -> bool {
        if self.players.shift_remove(name).is_none() {
            warn!(player = name, "cannot remove unknown player");
            return false;
        }

        info!(player = name, "player removed");
        self.announce();
        true
    }

    /// Apply score changes, then lift everyone if any score went negative.
    ///
    /// With `additive` each delta is added to the current score, otherwise it
    /// replaces it. Unknown names and deltas that overflow are skipped. When
    /// the lowest score across the whole roster ends up negative, every player
    /// receives `-min + reset_score`, which leaves the lowest player exactly at
    /// `reset_score` and keeps relative ordering intact.
    ///
    /// Returns whether that rebalancing happened. One announcement is sent
    /// regardless of how many entries were applied. If the lift itself would
    /// overflow, nothing changes, nothing is announced and the update fails.
    pub fn update_scores<I, K>(&mut self, deltas: I, additive: bool) -> Result<bool, ScoreError>
    where
        I: IntoIterator<Item = (K, i64)>,
        K: AsRef<str>,
    {
        let mut next: Vec<i64> = self.players.values().map(|player| player.score).collect();
        let mut applied = Vec::new();
        for (name, delta) in deltas {
            let name = name.as_ref();
            let Some(index) = self.players.get_index_of(name) else {
                warn!(player = name, delta, "ignoring score update for unknown player");
                continue;
            };
            let before = next[index];
            let after = if additive {
                before.checked_add(delta)
            } else {
                Some(delta)
            };
            match after {
                Some(after) => {
                    next[index] = after;
                    applied.push((index, before, after));
                }
                None => warn!(
                    player = name,
                    before,
                    delta,
                    "ignoring score update outside the score range"
                ),
            }
        }

        let mut rebalance = None;
        if let Some(min) = next.iter().copied().min().filter(|min| *min < 0) {
            let lifted = min
                .checked_neg()
                .and_then(|lift| lift.checked_add(self.settings.reset_score))
                .and_then(|boost| {
                    next.iter()
                        .map(|score| score.checked_add(boost))
                        .collect::<Option<Vec<i64>>>()
                        .map(|scores| (boost, scores))
                });
            let Some((boost, scores)) = lifted else {
                warn!(
                    min,
                    reset_score = self.settings.reset_score,
                    "refusing score update whose rebalancing overflows"
                );
                return Err(ScoreError::RebalanceOverflow { min });
            };
            next = scores;
            rebalance = Some((min, boost));
        }

        for (player, score) in self.players.values_mut().zip(next) {
            player.score = score;
        }
        for (index, before, after) in applied {
            if let Some((name, _)) = self.players.get_index(index) {
                info!(player = %name, before, after, additive, "score updated");
            }
        }
        if let Some((min, boost)) = rebalance {
            info!(min, boost, "scores rebalanced");
        }

        self.announce();
        Ok(rebalance.is_some())
    }

    /// Set the playing flag for a batch of players, announcing once.
    pub fn set_playing<I, K>(&mut self, names: I, isplaying: bool)
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        for name in names {
            let name = name.as_ref();
            match self.players.get_mut(name) {
                Some(player) => {
                    player.isplaying = isplaying;
                    info!(player = name, isplaying, "playing flag updated");
                }
                None => warn!(player = name, "ignoring playing flag for unknown player"),
            }
        }

        self.announce();
    }

    /// Every player in display order: active first, then score descending,
    /// then name ascending.
    pub fn snapshot(&self) -> Vec<Player> {
        let mut players: Vec<Player> = self.players.values().cloned().collect();
        players.sort_by(|a, b| {
            (Reverse(a.isplaying), Reverse(a.score), &a.name).cmp(&(
                Reverse(b.isplaying),
                Reverse(b.score),
                &b.name,
            ))
        });
        players
    }

    /// Snapshot converted to the wire representation.
    pub fn summaries(&self) -> Vec<PlayerSummary> {
        self.snapshot().iter().map(PlayerSummary::from).collect()
    }

    /// Player names, optionally restricted to those with the given flag.
    pub fn names(&self, isplaying: Option<bool>) -> Vec<String> {
        self.players
            .values()
            .filter(|player| isplaying.is_none_or(|flag| player.isplaying == flag))
            .map(|player| player.name.clone())
            .collect()
    }

    /// Look up a single player.
    pub fn get(&self, name: &str) -> Option<&Player> {
        self.players.get(name)
    }

    /// Whether `name` is on the roster.
    pub fn contains(&self, name: &str) -> bool {
        self.players.contains_key(name)
    }

    /// Number of players on the roster.
    pub fn len(&self) -> usize {
        self.players.len()
    }

    /// Whether the roster is empty.
    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    fn announce(&self) {
        self.bus.publish_players(self.summaries());
    }
}
