//! Admin console surface. Commands arrive over the WebSocket or `POST /api/admin`
//! and run against the game under its lock; every outcome is reported back as a
//! status message.

use std::sync::{Arc, Weak};

use serde_json::Value;
use tracing::{info, warn};

use crate::{
    dto::{
        game::{PlayerSummary, PlayerUpdate},
        ws::{AdminCommand, StatusMessage},
    },
    error::ServiceError,
    services::{
        broadcast::{ConnectionSet, send_status},
        connection::ManagedConnection,
        router::{RouteHandler, RouteRequest, RouteResponse},
    },
    state::{GameHandle, bus::Payload},
};

/// Route token of the admin surface.
pub const ADMIN_ROUTE: &str = "admin";

/// Apply one admin command to the game.
pub fn execute(game: &GameHandle, command: AdminCommand) -> Result<StatusMessage, ServiceError> {
    let mut game = game.lock();
    match command {
        AdminCommand::Advance { idx, relative } => {
            if !game.advance(idx, relative) {
                return Err(ServiceError::InvalidState(format!(
                    "cannot move to round {idx}{} from round {}",
                    if relative { " (relative)" } else { "" },
                    game.rounds().current_index()
                )));
            }
            let round = game
                .rounds()
                .current()
                .map(|state| state.name().to_string())
                .map_err(ServiceError::from)?;
            Ok(StatusMessage::info(
                "advanced",
                Some(format!("round {} ({round})", game.rounds().current_index())),
            ))
        }
        AdminCommand::UpdateScores { deltas, additive } => {
            let rebalanced = game.players_mut().update_scores(deltas, additive)?;
            Ok(StatusMessage::info(
                "scores_updated",
                rebalanced.then_some("scores were rebalanced"),
            ))
        }
        AdminCommand::SetPlaying { names, isplaying } => {
            game.players_mut().set_playing(&names, isplaying);
            Ok(StatusMessage::ok())
        }
        AdminCommand::AddPlayer(request) => {
            let name = request.name.trim();
            if !game.players_mut().add(name) {
                return Err(ServiceError::InvalidInput(format!(
                    "player `{name}` already exists"
                )));
            }
            Ok(StatusMessage::info("player_added", Some(name)))
        }
        AdminCommand::RemovePlayer { name } => {
            if !game.players_mut().remove(&name) {
                return Err(ServiceError::NotFound(format!("player `{name}` not found")));
            }
            Ok(StatusMessage::info("player_removed", Some(name)))
        }
    }
}

/// Forwards every update unchanged to admin consoles and runs their commands.
pub struct AdminHandler {
    game: GameHandle,
    connections: ConnectionSet,
}

impl AdminHandler {
    /// Create the handler and subscribe it to the game's bus.
    pub fn install(game: &GameHandle) -> Arc<Self> {
        let handler = Arc::new(Self {
            game: Arc::clone(game),
            connections: ConnectionSet::new(),
        });

        let bus = Arc::clone(game.lock().bus());
        let weak: Weak<Self> = Arc::downgrade(&handler);
        bus.game().subscribe(move |payload: &Payload| {
            if let Some(handler) = weak.upgrade() {
                handler.connections.broadcast_json(payload);
            }
        });
        let weak: Weak<Self> = Arc::downgrade(&handler);
        bus.player().subscribe(move |roster: &Vec<PlayerSummary>| {
            if let Some(handler) = weak.upgrade() {
                handler
                    .connections
                    .broadcast_json(&PlayerUpdate::new(roster, None));
            }
        });
        handler
    }

    fn on_inbound(&self, connection: &ManagedConnection, text: &str) {
        let reply = match AdminCommand::from_json_str(text) {
            Ok(command) => {
                info!(connection = %connection.id(), ?command, "admin command");
                execute(&self.game, command).unwrap_or_else(|err| {
                    warn!(error = %err, "admin command refused");
                    StatusMessage::failure(err.to_string())
                })
            }
            Err(err) => {
                warn!(connection = %connection.id(), error = %err, "rejecting admin message");
                StatusMessage::failure(err.to_string())
            }
        };
        send_status(connection, &reply);
    }
}

impl RouteHandler for AdminHandler {
    fn handle_request(&self, request: RouteRequest) -> RouteResponse {
        let to_value = |value: Result<Value, serde_json::Error>| {
            value.map_err(|err| ServiceError::InvalidState(err.to_string()))
        };
        match request {
            RouteRequest::Get => {
                let response = self.game.lock().status_response()?;
                to_value(serde_json::to_value(response))
            }
            RouteRequest::Post(body) => {
                let command = AdminCommand::from_value(body)?;
                info!(?command, "admin command over HTTP");
                let reply = execute(&self.game, command)?;
                to_value(serde_json::to_value(reply))
            }
        }
    }

    fn handle_connection(self: Arc<Self>, connection: ManagedConnection) {
        {
            let game = self.game.lock();
            match game.status() {
                Ok(status) => {
                    let _ = connection.send_json(&status);
                }
                Err(err) => warn!(error = %err, "no game status for new admin console"),
            }
            let _ = connection.send_json(&PlayerUpdate::new(&game.players().summaries(), None));
            self.connections.insert(connection.clone());
        }

        let weak = Arc::downgrade(&self);
        connection.on_message(move |conn, text| {
            if let Some(handler) = weak.upgrade() {
                handler.on_inbound(conn, text);
            }
        });
        let weak = Arc::downgrade(&self);
        connection.on_close(move |conn| {
            if let Some(handler) = weak.upgrade() {
                handler.connections.remove(conn.id());
            }
            info!(connection = %conn.id(), "admin console disconnected");
        });
        info!(connection = %connection.id(), "admin console connected");
    }
}
