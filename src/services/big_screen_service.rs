//! Read-only surface for the venue display.

use std::sync::{Arc, Weak};

use tracing::{debug, info, warn};

use crate::{
    dto::game::{PlayerSummary, PlayerUpdate},
    error::ServiceError,
    services::{
        broadcast::ConnectionSet,
        connection::ManagedConnection,
        router::{RouteHandler, RouteRequest, RouteResponse},
    },
    state::{GameHandle, bus::Payload},
};

/// Route token of the big screen surface.
pub const BIG_SCREEN_ROUTE: &str = "big_screen";

const PLAYER_SPECIFIC_KEY: &str = "player_specific_info";

/// Fans game and roster updates out to big screen displays.
pub struct BigScreenHandler {
    game: GameHandle,
    connections: ConnectionSet,
    top_n: usize,
}

impl BigScreenHandler {
    /// Create the handler and subscribe it to the game's bus.
    pub fn install(game: &GameHandle, top_n: usize) -> Arc<Self> {
        let handler = Arc::new(Self {
            game: Arc::clone(game),
            connections: ConnectionSet::new(),
            top_n,
        });

        let bus = Arc::clone(game.lock().bus());
        let weak: Weak<Self> = Arc::downgrade(&handler);
        bus.game().subscribe(move |payload: &Payload| {
            if let Some(handler) = weak.upgrade() {
                handler
                    .connections
                    .broadcast_json(&public_view(payload));
            }
        });
        let weak: Weak<Self> = Arc::downgrade(&handler);
        bus.player().subscribe(move |roster: &Vec<PlayerSummary>| {
            if let Some(handler) = weak.upgrade() {
                handler
                    .connections
                    .broadcast_json(&PlayerUpdate::new(roster, Some(handler.top_n)));
            }
        });
        handler
    }
}

impl RouteHandler for BigScreenHandler {
    fn handle_request(&self, request: RouteRequest) -> RouteResponse {
        match request {
            RouteRequest::Get => {
                let mut response = self.game.lock().status_response()?;
                response.status = public_view(&response.status);
                response.players.truncate(self.top_n);
                serde_json::to_value(response)
                    .map_err(|err| ServiceError::InvalidState(err.to_string()))
            }
            RouteRequest::Post(_) => Err(ServiceError::Unsupported(
                "the big screen is read-only".into(),
            )),
        }
    }

    fn handle_connection(self: Arc<Self>, connection: ManagedConnection) {
        {
            // Held until the connection is tracked so no update slips in between.
            let game = self.game.lock();
            match game.status() {
                Ok(status) => {
                    let _ = connection.send_json(&public_view(&status));
                }
                Err(err) => warn!(error = %err, "no game status for new big screen"),
            }
            let _ = connection.send_json(&PlayerUpdate::new(
                &game.players().summaries(),
                Some(self.top_n),
            ));
            self.connections.insert(connection.clone());
        }

        connection.on_message(|conn, text| {
            debug!(connection = %conn.id(), payload = %text, "ignoring big screen message");
        });
        let weak = Arc::downgrade(&self);
        connection.on_close(move |conn| {
            if let Some(handler) = weak.upgrade() {
                handler.connections.remove(conn.id());
            }
            info!(connection = %conn.id(), "big screen disconnected");
        });
        info!(connection = %connection.id(), screens = self.connections.len(), "big screen connected");
    }
}

/// Game payload without per-player details.
fn public_view(payload: &Payload) -> Payload {
    let mut view = payload.clone();
    view.remove(PLAYER_SPECIFIC_KEY);
    view
}

#[cfg(test)]
mod tests {
    use axum::extract::ws::Message;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use serde_json::{Value, json};
    use tokio::sync::mpsc;

    use super::*;
    use crate::state::{
        game::Game,
        players::ScoreSettings,
        rounds::{RoundRegistry, RoundSpec},
    };

    fn game() -> GameHandle {
        let registry = RoundRegistry::with_builtin();
        let mut game = Game::new(ScoreSettings {
            start_score: 0,
            reset_score: 0,
        });
        game.append(
            registry
                .build(&RoundSpec::new("question", json!({ "question": "?" })))
                .unwrap(),
        );
        game.begin().unwrap();
        Arc::new(Mutex::new(game))
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<Message>) -> Vec<Value> {
        let mut out = Vec::new();
        while let Ok(Message::Text(text)) = rx.try_recv() {
            out.push(serde_json::from_str(text.as_str()).unwrap());
        }
        out
    }

    #[test]
    fn connect_sends_status_then_truncated_roster() {
        let game = game();
        for name in ["A", "B", "C"] {
            game.lock().players_mut().add(name);
        }
        let handler = BigScreenHandler::install(&game, 2);
        let (tx, mut rx) = mpsc::unbounded_channel();
        handler.clone().handle_connection(ManagedConnection::new(BIG_SCREEN_ROUTE, tx));

        let sent = drain(&mut rx);
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0]["widget_name"], json!("question"));
        assert!(sent[0].get("player_specific_info").is_none());
        assert_eq!(sent[1]["player_update"].as_array().map(Vec::len), Some(2));
    }

    #[test]
    fn updates_strip_player_specific_info() {
        let game = game();
        game.lock().players_mut().add("A");
        let handler = BigScreenHandler::install(&game, 10);
        let (tx, mut rx) = mpsc::unbounded_channel();
        handler.clone().handle_connection(ManagedConnection::new(BIG_SCREEN_ROUTE, tx));
        drain(&mut rx);

        game.lock()
            .player_message("A", &json!({ "answer": "secret" }))
            .unwrap();

        let sent = drain(&mut rx);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0]["general_info"]["answers_received"], json!(1));
        assert!(sent[0].get("player_specific_info").is_none());
    }

    #[test]
    fn closed_screens_are_forgotten() {
        let game = game();
        let handler = BigScreenHandler::install(&game, 10);
        let (tx, _rx) = mpsc::unbounded_channel();
        let connection = ManagedConnection::new(BIG_SCREEN_ROUTE, tx);
        handler.clone().handle_connection(connection.clone());
        assert_eq!(handler.connections.len(), 1);

        connection.release();
        assert!(handler.connections.is_empty());
    }

    #[test]
    fn http_status_is_public_and_post_is_rejected() {
        let game = game();
        game.lock().players_mut().add("A");
        let handler = BigScreenHandler::install(&game, 10);

        let status = handler.handle_request(RouteRequest::Get).unwrap();
        assert_eq!(status["widget_name"], json!("question"));
        assert!(status["status"].get("player_specific_info").is_none());
        assert!(matches!(
            handler.handle_request(RouteRequest::Post(json!({}))),
            Err(ServiceError::Unsupported(_))
        ));
    }
}
