//! Change-notification fan-out shared by the state machine, the roster and the
//! broadcast handlers.

use std::{
    collections::VecDeque,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, warn};

use crate::dto::game::PlayerSummary;

/// JSON object carried on the game topic.
pub type Payload = serde_json::Map<String, Value>;

/// Key overlaid on every game topic payload.
pub const WIDGET_NAME_KEY: &str = "widget_name";

/// Handle returned by [`Topic::subscribe`], used to unsubscribe later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Dispatch<T> {
    queue: VecDeque<T>,
    active: bool,
}

/// A single ordered listener list with synchronous fan-out.
///
/// Delivery iterates over a snapshot of the listeners taken when a payload
/// starts going out, so listeners may subscribe or unsubscribe from inside
/// their own callback. Payloads published while another one is being
/// delivered are queued and go out afterwards, in issue order.
pub struct Topic<T> {
    name: &'static str,
    next_id: AtomicU64,
    listeners: Mutex<Vec<(ListenerId, Listener<T>)>>,
    dispatch: Mutex<Dispatch<T>>,
}

impl<T> Topic<T> {
    /// Create an empty topic. `name` only shows up in logs.
    fn new(name: &'static str) -> Self {
        Self {
            name,
            next_id: AtomicU64::new(1),
            listeners: Mutex::new(Vec::new()),
            dispatch: Mutex::new(Dispatch {
                queue: VecDeque::new(),
                active: false,
            }),
        }
    }

    /// Append a listener; it receives every payload published from now on.
    pub fn subscribe<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.lock().push((id, Arc::new(listener)));
        debug!(topic = self.name, listener = id.0, "listener subscribed");
        id
    }

    /// Remove the first listener registered under `id`.
    ///
    /// Returns `false` (and logs) when no such listener exists.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        match listeners.iter().position(|(existing, _)| *existing == id) {
            Some(position) => {
                listeners.remove(position);
                debug!(topic = self.name, listener = id.0, "listener unsubscribed");
                true
            }
            None => {
                warn!(
                    topic = self.name,
                    listener = id.0,
                    "ignoring unsubscribe of unknown listener"
                );
                false
            }
        }
    }

    /// Number of currently subscribed listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    /// Deliver `payload` to every subscribed listener, in subscription order.
    ///
    /// Only the bus publishes, so game updates always carry the overlay.
    fn publish(&self, payload: T) {
        {
            let mut dispatch = self.dispatch.lock();
            dispatch.queue.push_back(payload);
            if dispatch.active {
                // Re-entrant publish: the outer call drains the queue.
                return;
            }
            dispatch.active = true;
        }

        let _reset = ResetOnUnwind(&self.dispatch);
        loop {
            let next = {
                let mut dispatch = self.dispatch.lock();
                match dispatch.queue.pop_front() {
                    Some(next) => next,
                    None => {
                        dispatch.active = false;
                        return;
                    }
                }
            };
            self.deliver(&next);
        }
    }

    fn deliver(&self, payload: &T) {
        let snapshot: Vec<Listener<T>> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        debug!(
            topic = self.name,
            listeners = snapshot.len(),
            "fanning out payload"
        );
        for listener in snapshot {
            listener(payload);
        }
    }
}

/// Clears the dispatch state if a listener panics, so the topic keeps working.
struct ResetOnUnwind<'a, T>(&'a Mutex<Dispatch<T>>);

impl<T> Drop for ResetOnUnwind<'_, T> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            let mut dispatch = self.0.lock();
            dispatch.queue.clear();
            dispatch.active = false;
        }
    }
}

/// The two independent channels every surface listens to.
///
/// The bus tracks the active round's name and stamps it onto every game
/// update; the state machine moves it on `begin` and `advance`.
pub struct NotificationBus {
    game: Topic<Payload>,
    player: Topic<Vec<PlayerSummary>>,
    active_round: Mutex<Option<String>>,
}

impl Default for NotificationBus {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationBus {
    /// Create a bus with empty listener lists.
    pub fn new() -> Self {
        Self {
            game: Topic::new("game"),
            player: Topic::new("player"),
            active_round: Mutex::new(None),
        }
    }

    /// Topic carrying game-state updates.
    pub fn game(&self) -> &Topic<Payload> {
        &self.game
    }

    /// Topic carrying roster snapshots.
    pub fn player(&self) -> &Topic<Vec<PlayerSummary>> {
        &self.player
    }

    /// Name of the round game updates are currently stamped with.
    pub fn active_round(&self) -> Option<String> {
        self.active_round.lock().clone()
    }

    pub(crate) fn set_active_round(&self, name: &str) {
        *self.active_round.lock() = Some(name.to_string());
    }

    /// Publish on the game topic after stamping the active round's name as
    /// `widget_name`.
    ///
    /// Any `widget_name` provided by the caller is overwritten. Updates
    /// published before a round became active are dropped.
    pub fn publish_game(&self, mut payload: Payload) {
        let Some(widget_name) = self.active_round() else {
            warn!("dropping game update published before any round became active");
            return;
        };
        payload.insert(WIDGET_NAME_KEY.to_string(), Value::String(widget_name));
        self.game.publish(payload);
    }

    /// Publish a roster snapshot on the player topic.
    pub fn publish_players(&self, roster: Vec<PlayerSummary>) {
        self.player.publish(roster);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::OnceLock;

    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    fn recorder() -> (Arc<Mutex<Vec<String>>>, impl Fn(&str) -> Box<dyn Fn(&u32) + Send + Sync>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let shared = Arc::clone(&log);
        let make = move |label: &str| -> Box<dyn Fn(&u32) + Send + Sync> {
            let log = Arc::clone(&shared);
            let label = label.to_string();
            Box::new(move |value: &u32| log.lock().push(format!("{label}:{value}")))
        };
        (log, make)
    }

    #[test]
    fn publishes_reach_listeners_in_subscription_order() {
        let topic = Topic::<u32>::new("test");
        let (log, make) = recorder();
        for label in ["l1", "l2", "l3"] {
            let listener = make(label);
            topic.subscribe(move |value| listener(value));
        }

        topic.publish(1);
        topic.publish(2);

        assert_eq!(
            *log.lock(),
            vec!["l1:1", "l2:1", "l3:1", "l1:2", "l2:2", "l3:2"]
        );
    }

    #[test]
    fn unsubscribe_unknown_listener_is_noop() {
        let topic = Topic::<u32>::new("test");
        let id = topic.subscribe(|_| {});
        assert!(topic.unsubscribe(id));
        assert!(!topic.unsubscribe(id));
        assert_eq!(topic.listener_count(), 0);
    }

    #[test]
    fn unsubscribe_from_own_callback_keeps_iteration_intact() {
        let topic = Arc::new(Topic::<u32>::new("test"));
        let (log, make) = recorder();

        let first = make("first");
        topic.subscribe(move |value| first(value));

        let own_id: Arc<OnceLock<ListenerId>> = Arc::new(OnceLock::new());
        let quitter_log = Arc::clone(&log);
        let weak_topic = Arc::downgrade(&topic);
        let quitter_id = Arc::clone(&own_id);
        let id = topic.subscribe(move |value| {
            quitter_log.lock().push(format!("quitter:{value}"));
            if let (Some(topic), Some(id)) = (weak_topic.upgrade(), quitter_id.get()) {
                topic.unsubscribe(*id);
            }
        });
        own_id.set(id).unwrap();

        let last = make("last");
        topic.subscribe(move |value| last(value));

        topic.publish(1);
        topic.publish(2);

        assert_eq!(
            *log.lock(),
            vec!["first:1", "quitter:1", "last:1", "first:2", "last:2"]
        );
    }

    #[test]
    fn nested_publish_is_delivered_after_current_payload() {
        let topic = Arc::new(Topic::<u32>::new("test"));
        let log = Arc::new(Mutex::new(Vec::new()));

        let weak_topic = Arc::downgrade(&topic);
        let echo_log = Arc::clone(&log);
        topic.subscribe(move |value| {
            echo_log.lock().push(format!("a:{value}"));
            if *value == 1 {
                if let Some(topic) = weak_topic.upgrade() {
                    topic.publish(2);
                }
            }
        });
        let tail_log = Arc::clone(&log);
        topic.subscribe(move |value| tail_log.lock().push(format!("b:{value}")));

        topic.publish(1);

        assert_eq!(*log.lock(), vec!["a:1", "b:1", "a:2", "b:2"]);
    }

    #[test]
    fn game_publish_overlays_widget_name() {
        let bus = NotificationBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        bus.game()
            .subscribe(move |payload: &Payload| sink.lock().push(payload.clone()));

        let mut payload = Payload::new();
        payload.insert("widget_name".into(), json!("stale"));
        payload.insert("general_info".into(), json!({ "title": "Round 1" }));
        bus.set_active_round("question");
        bus.publish_game(payload);

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0]["widget_name"], json!("question"));
        assert_eq!(seen[0]["general_info"], json!({ "title": "Round 1" }));
    }

    #[test]
    fn game_publish_without_active_round_is_dropped() {
        let bus = NotificationBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        bus.game()
            .subscribe(move |payload: &Payload| sink.lock().push(payload.clone()));

        let mut forged = Payload::new();
        forged.insert("widget_name".into(), json!("scoreboard"));
        bus.publish_game(forged.clone());
        assert!(seen.lock().is_empty());

        bus.set_active_round("lobby");
        bus.publish_game(forged);
        bus.set_active_round("question");
        bus.publish_game(Payload::new());

        let names: Vec<Value> = seen
            .lock()
            .iter()
            .map(|payload| payload["widget_name"].clone())
            .collect();
        assert_eq!(names, vec![json!("lobby"), json!("question")]);
    }

    #[test]
    fn topics_are_independent() {
        let bus = NotificationBus::new();
        let hits = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&hits);
        bus.player().subscribe(move |_| {
            counter.fetch_add(1, Ordering::Relaxed);
        });

        bus.set_active_round("lobby");
        bus.publish_game(Payload::new());
        assert_eq!(hits.load(Ordering::Relaxed), 0);

        bus.publish_players(Vec::new());
        assert_eq!(hits.load(Ordering::Relaxed), 1);
    }
}
