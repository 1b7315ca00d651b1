use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

use crate::state::{
    bus::{NotificationBus, Payload, WIDGET_NAME_KEY},
    players::PlayerRegistry,
    rounds::RoundError,
};

/// One unit of the game: the lobby, a question, a scoreboard...
///
/// Implementations are built by the round registry and owned by the
/// [`GameStateMachine`] for the whole game.
pub trait GameState: Send {
    /// Display template clients switch to while this state is active.
    fn name(&self) -> &str;

    /// Called when this state becomes the active one.
    fn begin_active(&mut self, ctx: &mut RoundContext<'_>);

    /// Called when this state stops being the active one.
    fn end_active(&mut self, ctx: &mut RoundContext<'_>);

    /// Status fields merged into the announcement, `widget_name` excluded.
    fn status_message(&self, players: &PlayerRegistry) -> Payload;

    /// Handle a round-specific message from a player while active.
    fn on_player_message(
        &mut self,
        _ctx: &mut RoundContext<'_>,
        _player: &str,
        _message: &Value,
    ) -> Result<(), RoundError> {
        Err(RoundError::Unsupported {
            round: self.name().to_string(),
        })
    }
}

/// What a round may touch while one of its callbacks runs.
pub struct RoundContext<'a> {
    players: &'a mut PlayerRegistry,
    bus: &'a NotificationBus,
}

impl<'a> RoundContext<'a> {
    pub(crate) fn new(players: &'a mut PlayerRegistry, bus: &'a NotificationBus) -> Self {
        Self { players, bus }
    }

    /// Roster, for score updates and eligibility checks.
    pub fn players(&mut self) -> &mut PlayerRegistry {
        self.players
    }

    /// Publish an extra game update, stamped with the active round's name.
    pub fn publish(&self, payload: Payload) {
        self.bus.publish_game(payload);
    }
}

/// Errors raised by the state machine for conditions callers must handle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// `begin` was called without any state to activate.
    #[error("cannot begin a game without any rounds")]
    EmptySequence,
    /// `begin` was called a second time.
    #[error("game has already begun")]
    AlreadyStarted,
    /// No state exists to act on.
    #[error("no round is active")]
    NoActiveState,
}

/// Ordered sequence of game states with exactly one active entry once begun.
pub struct GameStateMachine {
    states: Vec<Box<dyn GameState>>,
    index: usize,
    started: bool,
    bus: Arc<NotificationBus>,
}

impl GameStateMachine {
    /// Create an empty sequence announcing transitions on `bus`.
    pub fn new(bus: Arc<NotificationBus>) -> Self {
        Self {
            states: Vec::new(),
            index: 0,
            started: false,
            bus,
        }
    }

    /// Add a state at the end of the sequence. Only allowed before [`begin`](Self::begin).
    pub fn append(&mut self, state: Box<dyn GameState>) {
        if self.started {
            warn!(
                round = state.name(),
                "ignoring round appended after the game began"
            );
            return;
        }
        self.states.push(state);
    }

    /// Activate the first state and announce it.
    pub fn begin(&mut self, players: &mut PlayerRegistry) -> Result<(), EngineError> {
        if self.started {
            return Err(EngineError::AlreadyStarted);
        }
        if self.states.is_empty() {
            return Err(EngineError::EmptySequence);
        }

        self.index = 0;
        self.started = true;
        let name = self.states[0].name().to_string();
        self.bus.set_active_round(&name);
        {
            let mut ctx = RoundContext::new(players, &self.bus);
            self.states[0].begin_active(&mut ctx);
        }
        info!(round = %name, rounds = self.states.len(), "game began");
        self.announce(players);
        Ok(())
    }

    /// Move the active state, absolutely or relative to the current index.
    ///
    /// Targets outside the sequence are rejected with a warning and leave the
    /// machine untouched. Targeting the current index re-enters it. Returns
    /// whether a transition happened.
    pub fn advance(&mut self, idx: i64, relative: bool, players: &mut PlayerRegistry) -> bool {
        if !self.started {
            warn!(idx, relative, "ignoring transition before the game began");
            return false;
        }

        let target = if relative {
            (self.index as i64).checked_add(idx)
        } else {
            Some(idx)
        };
        let Some(next) = target
            .and_then(|target| usize::try_from(target).ok())
            .filter(|target| *target < self.states.len())
        else {
            warn!(
                idx,
                relative,
                current = self.index,
                rounds = self.states.len(),
                "ignoring transition to an index outside the game"
            );
            return false;
        };

        let previous = self.index;
        let previous_name = self.states[previous].name().to_string();
        {
            let mut ctx = RoundContext::new(players, &self.bus);
            self.states[previous].end_active(&mut ctx);
        }

        self.index = next;
        let next_name = self.states[next].name().to_string();
        self.bus.set_active_round(&next_name);
        {
            let mut ctx = RoundContext::new(players, &self.bus);
            self.states[next].begin_active(&mut ctx);
        }

        info!(
            from = previous,
            from_round = %previous_name,
            to = next,
            to_round = %next_name,
            "round transition"
        );
        self.announce(players);
        true
    }

    /// The active state (the pending one before the game began).
    pub fn current(&self) -> Result<&dyn GameState, EngineError> {
        self.states
            .get(self.index)
            .map(|state| state.as_ref())
            .ok_or(EngineError::NoActiveState)
    }

    /// Mutable access to the active state (the pending one before the game began).
    pub fn current_mut(&mut self) -> Result<&mut dyn GameState, EngineError> {
        match self.states.get_mut(self.index) {
            Some(state) => Ok(state.as_mut()),
            None => Err(EngineError::NoActiveState),
        }
    }

    /// Index of the active state.
    pub fn current_index(&self) -> usize {
        self.index
    }

    /// Number of states in the sequence.
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Whether the sequence has no states.
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Whether [`begin`](Self::begin) has run.
    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Names of all states in round order.
    pub fn names(&self) -> Vec<String> {
        self.states
            .iter()
            .map(|state| state.name().to_string())
            .collect()
    }

    /// Announcement payload describing the active state.
    pub fn status(&self, players: &PlayerRegistry) -> Result<Payload, EngineError> {
        let state = self.current()?;
        let mut payload = state.status_message(players);
        payload.insert(
            WIDGET_NAME_KEY.to_string(),
            Value::String(state.name().to_string()),
        );
        Ok(payload)
    }

    /// Publish on the game topic under the active state's name.
    pub fn publish(&self, payload: Payload) {
        if !self.started {
            warn!("dropping game update published before the game began");
            return;
        }
        self.bus.publish_game(payload);
    }

    /// Route a player message to the active state.
    pub fn player_message(
        &mut self,
        players: &mut PlayerRegistry,
        player: &str,
        message: &Value,
    ) -> Result<(), RoundError> {
        if !self.started {
            return Err(RoundError::Rejected("the game has not begun".into()));
        }
        let bus = Arc::clone(&self.bus);
        let state = self
            .current_mut()
            .map_err(|err| RoundError::Rejected(err.to_string()))?;
        let mut ctx = RoundContext::new(players, &bus);
        state.on_player_message(&mut ctx, player, message)
    }

    fn announce(&self, players: &PlayerRegistry) {
        let Ok(state) = self.current() else {
            return;
        };
        self.bus.publish_game(state.status_message(players));
    }
}
