use std::sync::Arc;

use serde_json::Value;

use crate::{
    dto::game::GameStatusResponse,
    state::{
        bus::{NotificationBus, Payload},
        players::{PlayerRegistry, ScoreSettings},
        rounds::RoundError,
        state_machine::{EngineError, GameState, GameStateMachine},
    },
};

/// The single running quiz: round sequence, roster and the bus they announce on.
///
/// Everything that mutates the game goes through this type while the caller
/// holds the game lock, so transitions and score changes are totally ordered.
pub struct Game {
    bus: Arc<NotificationBus>,
    rounds: GameStateMachine,
    players: PlayerRegistry,
}

impl Game {
    /// Empty game with its own bus; rounds are appended before [`begin`](Self::begin).
    pub fn new(settings: ScoreSettings) -> Self {
        let bus = Arc::new(NotificationBus::new());
        Self {
            rounds: GameStateMachine::new(Arc::clone(&bus)),
            players: PlayerRegistry::new(settings, Arc::clone(&bus)),
            bus,
        }
    }

    /// Bus shared by the machine and the roster.
    pub fn bus(&self) -> &Arc<NotificationBus> {
        &self.bus
    }

    /// The roster.
    pub fn players(&self) -> &PlayerRegistry {
        &self.players
    }

    /// Mutable roster, for joins, leaves and score changes.
    pub fn players_mut(&mut self) -> &mut PlayerRegistry {
        &mut self.players
    }

    /// The round sequence.
    pub fn rounds(&self) -> &GameStateMachine {
        &self.rounds
    }

    /// Append a round; ignored once the game began.
    pub fn append(&mut self, round: Box<dyn GameState>) {
        self.rounds.append(round);
    }

    /// Activate the first round.
    pub fn begin(&mut self) -> Result<(), EngineError> {
        self.rounds.begin(&mut self.players)
    }

    /// See [`GameStateMachine::advance`].
    pub fn advance(&mut self, idx: i64, relative: bool) -> bool {
        self.rounds.advance(idx, relative, &mut self.players)
    }

    /// Announcement payload of the active round.
    pub fn status(&self) -> Result<Payload, EngineError> {
        self.rounds.status(&self.players)
    }

    /// Full snapshot for HTTP status requests.
    pub fn status_response(&self) -> Result<GameStatusResponse, EngineError> {
        let status = self.status()?;
        let widget_name = status
            .get("widget_name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        Ok(GameStatusResponse {
            widget_name,
            current_index: self.rounds.current_index(),
            length: self.rounds.len(),
            rounds: self.rounds.names(),
            status,
            players: self.players.summaries(),
        })
    }

    /// Forward a round-specific player message to the active round.
    pub fn player_message(&mut self, player: &str, message: &Value) -> Result<(), RoundError> {
        self.rounds.player_message(&mut self.players, player, message)
    }
}
