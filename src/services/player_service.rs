//! Surface for player devices: joining, leaving and round interaction.

use std::sync::{Arc, Weak};

use dashmap::DashMap;
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    dto::{
        game::{PlayerSummary, PlayerUpdate},
        ws::{PlayerInboundMessage, StatusMessage},
    },
    error::ServiceError,
    services::{
        broadcast::{ConnectionSet, send_status},
        connection::ManagedConnection,
        router::{RouteHandler, RouteRequest, RouteResponse},
    },
    state::{GameHandle, bus::Payload},
};

/// Route token of the player surface.
pub const PLAYER_ROUTE: &str = "player";

const PLAYER_SPECIFIC_KEY: &str = "player_specific_info";

/// Tracks player connections and which roster entry each one speaks for.
pub struct PlayerHandler {
    game: GameHandle,
    connections: ConnectionSet,
    identities: DashMap<Uuid, String>,
}

impl PlayerHandler {
    /// Create the handler and subscribe it to the game's bus.
    pub fn install(game: &GameHandle) -> Arc<Self> {
        let handler = Arc::new(Self {
            game: Arc::clone(game),
            connections: ConnectionSet::new(),
            identities: DashMap::new(),
        });

        let bus = Arc::clone(game.lock().bus());
        let weak: Weak<Self> = Arc::downgrade(&handler);
        bus.game().subscribe(move |payload: &Payload| {
            if let Some(handler) = weak.upgrade() {
                handler.forward_game_update(payload);
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

    /// Name the connection joined as, if any.
    pub fn identity(&self, connection: Uuid) -> Option<String> {
        self.identities.get(&connection).map(|entry| entry.value().clone())
    }

    fn forward_game_update(&self, payload: &Payload) {
        self.connections.for_each(|connection| {
            let name = self.identity(connection.id());
            let _ = connection.send_json(&tailored_view(payload, name.as_deref()));
        });
    }

    fn on_inbound(&self, connection: &ManagedConnection, text: &str) {
        let message = match PlayerInboundMessage::from_json_str(text) {
            Ok(message) => message,
            Err(err) => {
                warn!(connection = %connection.id(), error = %err, "rejecting player message");
                send_status(connection, &StatusMessage::failure(err.to_string()));
                return;
            }
        };

        let reply = match message {
            PlayerInboundMessage::Join(request) => self.join(connection, request.name.trim()),
            PlayerInboundMessage::Leave(_) => self.leave(connection),
            PlayerInboundMessage::Round(body) => self.round_message(connection, &body),
        };
        send_status(connection, &reply);
    }

    fn join(&self, connection: &ManagedConnection, name: &str) -> StatusMessage {
        let mut game = self.game.lock();

        if let Some(current) = self.identity(connection.id()) {
            return StatusMessage::failure(format!("already joined as `{current}`"));
        }
        let owned_elsewhere = self
            .identities
            .iter()
            .any(|entry| entry.value() == name && *entry.key() != connection.id());
        if owned_elsewhere {
            return StatusMessage::failure(format!("name `{name}` is already taken"));
        }

        let reclaimed = game.players().contains(name);
        self.identities.insert(connection.id(), name.to_string());
        if reclaimed {
            info!(connection = %connection.id(), player = name, "player reconnected");
        } else {
            game.players_mut().add(name);
            info!(connection = %connection.id(), player = name, "player joined");
        }

        // The regular fan-out ran before the identity existed; resend tailored.
        match game.status() {
            Ok(status) => {
                let _ = connection.send_json(&tailored_view(&status, Some(name)));
            }
            Err(err) => warn!(error = %err, "no game status after join"),
        }
        let status = if reclaimed { "rejoined" } else { "joined" };
        StatusMessage::info(status, Some(name))
    }

    fn leave(&self, connection: &ManagedConnection) -> StatusMessage {
        let mut game = self.game.lock();
        let Some((_, name)) = self.identities.remove(&connection.id()) else {
            return StatusMessage::failure("join before leaving");
        };
        game.players_mut().remove(&name);
        info!(connection = %connection.id(), player = %name, "player left");
        StatusMessage::info("left", Some(name))
    }

    fn round_message(&self, connection: &ManagedConnection, body: &Value) -> StatusMessage {
        let mut game = self.game.lock();
        let Some(name) = self.identity(connection.id()) else {
            return StatusMessage::failure("join before playing");
        };
        match game.player_message(&name, body) {
            Ok(()) => StatusMessage::ok(),
            Err(err) => {
                warn!(player = %name, error = %err, "round refused player message");
                StatusMessage::failure(err.to_string())
            }
        }
    }
}

impl RouteHandler for PlayerHandler {
    fn handle_request(&self, request: RouteRequest) -> RouteResponse {
        match request {
            RouteRequest::Get => {
                let roster = self.game.lock().players().summaries();
                serde_json::to_value(PlayerUpdate::new(&roster, None))
                    .map_err(|err| ServiceError::InvalidState(err.to_string()))
            }
            RouteRequest::Post(_) => Err(ServiceError::Unsupported(
                "players interact over the WebSocket".into(),
            )),
        }
    }

    fn handle_connection(self: Arc<Self>, connection: ManagedConnection) {
        {
            let game = self.game.lock();
            match game.status() {
                Ok(status) => {
                    let _ = connection.send_json(&tailored_view(&status, None));
                }
                Err(err) => warn!(error = %err, "no game status for new player connection"),
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
                // The roster entry stays so the player can reconnect.
                if let Some((_, name)) = handler.identities.remove(&conn.id()) {
                    info!(connection = %conn.id(), player = %name, "player connection closed");
                }
            }
        });
        info!(connection = %connection.id(), "player connection opened");
    }
}

/// Game payload with `player_specific_info` narrowed to `player`'s entry.
fn tailored_view(payload: &Payload, player: Option<&str>) -> Payload {
    let mut view = payload.clone();
    let specific = view.remove(PLAYER_SPECIFIC_KEY);
    if let (Some(Value::Object(mut entries)), Some(player)) = (specific, player) {
        if let Some(own) = entries.remove(player) {
            view.insert(PLAYER_SPECIFIC_KEY.to_string(), own);
        }
    }
    view
}

#[cfg(test)]
mod tests {
    use axum::extract::ws::Message;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tokio::sync::mpsc;

    use super::*;
    use crate::state::{
        game::Game,
        players::ScoreSettings,
        rounds::{RoundRegistry, RoundSpec},
    };

    struct Client {
        connection: ManagedConnection,
        rx: mpsc::UnboundedReceiver<Message>,
    }

    impl Client {
        fn send(&self, text: &str) {
            self.connection.deliver(text);
        }

        fn drain(&mut self) -> Vec<Value> {
            let mut out = Vec::new();
            while let Ok(Message::Text(text)) = self.rx.try_recv() {
                out.push(serde_json::from_str(text.as_str()).unwrap());
            }
            out
        }
    }

    fn setup() -> (GameHandle, Arc<PlayerHandler>) {
        let registry = RoundRegistry::with_builtin();
        let mut game = Game::new(ScoreSettings {
            start_score: 5,
            reset_score: 0,
        });
        for spec in [
            RoundSpec::new("lobby", json!({})),
            RoundSpec::new("question", json!({ "question": "?", "answer": "42" })),
        ] {
            game.append(registry.build(&spec).unwrap());
        }
        game.begin().unwrap();
        let game = Arc::new(Mutex::new(game));
        let handler = PlayerHandler::install(&game);
        (game, handler)
    }

    fn connect(handler: &Arc<PlayerHandler>) -> Client {
        let (tx, rx) = mpsc::unbounded_channel();
        let connection = ManagedConnection::new(PLAYER_ROUTE, tx);
        Arc::clone(handler).handle_connection(connection.clone());
        Client { connection, rx }
    }

    fn last_status(messages: &[Value]) -> Value {
        messages
            .iter()
            .rev()
            .find(|message| message.get("status").is_some_and(Value::is_string))
            .cloned()
            .unwrap()
    }

    #[test]
    fn join_adds_player_and_acknowledges() {
        let (game, handler) = setup();
        let mut client = connect(&handler);
        client.drain();

        client.send(r#"{"join":{"name":"  Ada "}}"#);

        let messages = client.drain();
        assert_eq!(
            last_status(&messages),
            json!({ "status": "joined", "info_msg": "Ada" })
        );
        assert_eq!(game.lock().players().get("Ada").map(|p| p.score), Some(5));
        assert_eq!(handler.identity(client.connection.id()).as_deref(), Some("Ada"));
    }

    #[test]
    fn name_owned_by_live_connection_is_refused_until_it_closes() {
        let (game, handler) = setup();
        let first = connect(&handler);
        first.send(r#"{"join":{"name":"Ada"}}"#);

        let mut second = connect(&handler);
        second.drain();
        second.send(r#"{"join":{"name":"Ada"}}"#);
        assert_eq!(last_status(&second.drain())["status"], json!("failure"));

        first.connection.release();
        assert_eq!(game.lock().players().len(), 1);

        second.send(r#"{"join":{"name":"Ada"}}"#);
        assert_eq!(last_status(&second.drain())["status"], json!("rejoined"));
        assert_eq!(game.lock().players().len(), 1);
    }

    #[test]
    fn game_updates_only_carry_own_player_info() {
        let (game, handler) = setup();
        let mut ada = connect(&handler);
        let mut bob = connect(&handler);
        ada.send(r#"{"join":{"name":"Ada"}}"#);
        bob.send(r#"{"join":{"name":"Bob"}}"#);
        game.lock().advance(1, false);
        ada.send(r#"{"round":{"answer":"42"}}"#);
        ada.drain();

        bob.send(r#"{"round":{"answer":"7"}}"#);

        let to_ada: Vec<Value> = ada
            .drain()
            .into_iter()
            .filter(|m| m.get("widget_name").is_some())
            .collect();
        assert_eq!(to_ada.len(), 1);
        assert_eq!(to_ada[0]["player_specific_info"], json!({ "answer": "42" }));

        let to_bob = bob.drain();
        let update = to_bob
            .iter()
            .filter(|m| m.get("widget_name").is_some())
            .last()
            .unwrap();
        assert_eq!(update["player_specific_info"], json!({ "answer": "7" }));
        assert_eq!(last_status(&to_bob), json!({ "status": "ok" }));
    }

    #[test]
    fn round_messages_require_join() {
        let (_game, handler) = setup();
        let mut client = connect(&handler);
        client.send(r#"{"round":{"answer":"x"}}"#);
        assert_eq!(
            last_status(&client.drain()),
            json!({ "status": "failure", "error_msg": "join before playing" })
        );
    }

    #[test]
    fn malformed_message_keeps_connection_open() {
        let (_game, handler) = setup();
        let mut client = connect(&handler);
        client.drain();
        client.send("{oops");
        assert_eq!(last_status(&client.drain())["status"], json!("failure"));
        assert!(client.connection.is_open());
    }

    #[test]
    fn leave_removes_player_from_roster() {
        let (game, handler) = setup();
        let mut client = connect(&handler);
        client.send(r#"{"join":{"name":"Ada"}}"#);
        client.send(r#"{"leave":{}}"#);

        assert!(game.lock().players().is_empty());
        assert_eq!(
            last_status(&client.drain()),
            json!({ "status": "left", "info_msg": "Ada" })
        );
        assert!(handler.identity(client.connection.id()).is_none());
    }

    #[test]
    fn http_get_lists_full_roster() {
        let (game, handler) = setup();
        game.lock().players_mut().add("Ada");
        let roster = handler.handle_request(RouteRequest::Get).unwrap();
        assert_eq!(
            roster,
            json!({ "player_update": [ { "name": "Ada", "score": 5, "isplaying": true } ] })
        );
    }
}
