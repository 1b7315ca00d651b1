//! Managed WebSocket connections with the heartbeat overlay and keepalive timer.

use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use axum::{
    body::Bytes,
    extract::ws::{CloseFrame, Message},
};
use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
    time::{Instant, MissedTickBehavior},
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::dto::ws::{PING_TOKEN, PONG_TOKEN};

/// Close code sent when the keepalive deadline passes.
pub const HEARTBEAT_TIMEOUT_CODE: u16 = axum::extract::ws::close_code::AWAY;
/// Close reason sent when the keepalive deadline passes.
pub const HEARTBEAT_TIMEOUT_REASON: &str = "heartbeat timeout";

/// Errors returned when pushing onto a connection.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConnectionError {
    /// The connection is closed or its writer task is gone.
    #[error("connection closed")]
    Closed,
}

type MessageCallback = Arc<dyn Fn(&ManagedConnection, &str) + Send + Sync>;
type CloseCallback = Box<dyn FnOnce(&ManagedConnection) + Send>;

struct Inner {
    id: Uuid,
    route: String,
    tx: mpsc::UnboundedSender<Message>,
    open: AtomicBool,
    closed: watch::Sender<bool>,
    last_seen: Mutex<Instant>,
    on_message: Mutex<Option<MessageCallback>>,
    on_close: Mutex<Option<CloseCallback>>,
}

/// A live client connection as seen by route handlers.
///
/// Cloning is cheap and every clone refers to the same connection. The reserved
/// `__ping__` text is answered with `__pong__` before any message callback
/// runs, whatever callback is installed.
#[derive(Clone)]
pub struct ManagedConnection {
    inner: Arc<Inner>,
}

impl fmt::Debug for ManagedConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagedConnection")
            .field("id", &self.inner.id)
            .field("route", &self.inner.route)
            .field("open", &self.is_open())
            .finish()
    }
}

impl ManagedConnection {
    /// Wrap the outbound half of a transport bound to `route`.
    pub fn new(route: &str, tx: mpsc::UnboundedSender<Message>) -> Self {
        let (closed, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                id: Uuid::new_v4(),
                route: route.to_string(),
                tx,
                open: AtomicBool::new(true),
                closed,
                last_seen: Mutex::new(Instant::now()),
                on_message: Mutex::new(None),
                on_close: Mutex::new(None),
            }),
        }
    }

    /// Identifier assigned when the socket was accepted.
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    /// Route token the connection was accepted on.
    pub fn route(&self) -> &str {
        &self.inner.route
    }

    /// Whether [`close`](Self::close) has not run yet.
    pub fn is_open(&self) -> bool {
        self.inner.open.load(Ordering::Acquire)
    }

    /// Install the callback receiving inbound text, replacing any previous one.
    pub fn on_message<F>(&self, callback: F)
    where
        F: Fn(&ManagedConnection, &str) + Send + Sync + 'static,
    {
        *self.inner.on_message.lock() = Some(Arc::new(callback));
    }

    /// Install the callback fired once when the connection closes.
    ///
    /// Fires immediately when the connection is already closed.
    pub fn on_close<F>(&self, callback: F)
    where
        F: FnOnce(&ManagedConnection) + Send + 'static,
    {
        if !self.is_open() {
            callback(self);
            return;
        }
        *self.inner.on_close.lock() = Some(Box::new(callback));
        // Closed while installing: make sure the callback still runs.
        if !self.is_open() {
            self.fire_close();
        }
    }

    /// Feed one inbound text frame through the heartbeat overlay.
    pub fn deliver(&self, text: &str) {
        self.touch();
        if !self.is_open() {
            return;
        }
        if text == PING_TOKEN {
            let _ = self.send_text(PONG_TOKEN);
            return;
        }

        let callback = self.inner.on_message.lock().clone();
        match callback {
            Some(callback) => callback(self, text),
            None => debug!(
                connection = %self.inner.id,
                route = %self.inner.route,
                "dropping message without a handler"
            ),
        }
    }

    /// Record inbound activity for the keepalive timer.
    pub fn touch(&self) {
        *self.inner.last_seen.lock() = Instant::now();
    }

    /// Queue a text frame.
    pub fn send_text(&self, text: &str) -> Result<(), ConnectionError> {
        self.send_frame(Message::Text(text.to_string().into()))
    }

    /// Serialize `value` and queue it as a text frame.
    ///
    /// Serialization failures are logged and swallowed; there is nothing the
    /// peer could do about them.
    pub fn send_json<T>(&self, value: &T) -> Result<(), ConnectionError>
    where
        T: ?Sized + Serialize,
    {
        match serde_json::to_string(value) {
            Ok(payload) => self.send_frame(Message::Text(payload.into())),
            Err(err) => {
                warn!(connection = %self.inner.id, error = %err, "failed to serialize message");
                Ok(())
            }
        }
    }

    pub(crate) fn send_frame(&self, message: Message) -> Result<(), ConnectionError> {
        if !self.is_open() {
            return Err(ConnectionError::Closed);
        }
        self.inner
            .tx
            .send(message)
            .map_err(|_| ConnectionError::Closed)
    }

    /// Send a close frame and mark the connection closed. Idempotent.
    pub fn close(&self, code: u16, reason: &str) {
        if !self.mark_closed() {
            return;
        }
        info!(
            connection = %self.inner.id,
            route = %self.inner.route,
            code,
            reason,
            "closing connection"
        );
        let _ = self.inner.tx.send(Message::Close(Some(CloseFrame {
            code,
            reason: reason.to_string().into(),
        })));
        self.fire_close();
    }

    /// Mark the connection closed after the peer went away. Idempotent.
    pub fn release(&self) {
        if !self.mark_closed() {
            return;
        }
        debug!(connection = %self.inner.id, route = %self.inner.route, "connection released");
        // Lets the writer task stop even though this handle keeps the sender alive.
        let _ = self.inner.tx.send(Message::Close(None));
        self.fire_close();
    }

    /// Resolves once the connection is closed.
    pub async fn closed(&self) {
        let mut rx = self.inner.closed.subscribe();
        let _ = rx.wait_for(|closed| *closed).await;
    }

    /// One keepalive step: close on timeout, otherwise send a protocol ping.
    ///
    /// Returns whether the timer should keep running.
    pub fn heartbeat_tick(&self, timeout: Duration) -> bool {
        if !self.is_open() {
            return false;
        }
        let idle = self.inner.last_seen.lock().elapsed();
        if idle >= timeout {
            warn!(
                connection = %self.inner.id,
                route = %self.inner.route,
                idle_ms = idle.as_millis() as u64,
                "keepalive deadline passed"
            );
            self.close(HEARTBEAT_TIMEOUT_CODE, HEARTBEAT_TIMEOUT_REASON);
            return false;
        }
        self.send_frame(Message::Ping(Bytes::new())).is_ok()
    }

    /// Run [`heartbeat_tick`](Self::heartbeat_tick) every `interval` until it stops.
    pub fn spawn_heartbeat(&self, interval: Duration, timeout: Duration) -> JoinHandle<()> {
        let connection = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if !connection.heartbeat_tick(timeout) {
                            break;
                        }
                    }
                    _ = connection.closed() => break,
                }
            }
        })
    }

    fn mark_closed(&self) -> bool {
        let was_open = self.inner.open.swap(false, Ordering::AcqRel);
        if was_open {
            self.inner.closed.send_replace(true);
            self.inner.on_message.lock().take();
        }
        was_open
    }

    fn fire_close(&self) {
        let callback = self.inner.on_close.lock().take();
        if let Some(callback) = callback {
            callback(self);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use pretty_assertions::assert_eq;

    use super::*;

    fn connection() -> (ManagedConnection, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ManagedConnection::new("player", tx), rx)
    }

    fn texts(rx: &mut mpsc::UnboundedReceiver<Message>) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(message) = rx.try_recv() {
            if let Message::Text(text) = message {
                out.push(text.to_string());
            }
        }
        out
    }

    #[test]
    fn ping_is_answered_before_any_callback() {
        let (conn, mut rx) = connection();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        conn.on_message(move |_, text| sink.lock().push(text.to_string()));

        conn.deliver(PING_TOKEN);
        conn.deliver("hello");

        assert_eq!(texts(&mut rx), vec![PONG_TOKEN]);
        assert_eq!(*seen.lock(), vec!["hello"]);
    }

    #[test]
    fn replacing_the_callback_keeps_the_overlay() {
        let (conn, mut rx) = connection();
        conn.deliver(PING_TOKEN);

        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        conn.on_message(move |conn, text| {
            counter.fetch_add(1, Ordering::Relaxed);
            let _ = conn.send_text(&format!("echo:{text}"));
        });
        conn.deliver(PING_TOKEN);
        conn.deliver("x");

        assert_eq!(texts(&mut rx), vec![PONG_TOKEN, PONG_TOKEN, "echo:x"]);
        assert_eq!(hits.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn close_is_idempotent_and_fires_callback_once() {
        let (conn, mut rx) = connection();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        conn.on_close(move |_| {
            counter.fetch_add(1, Ordering::Relaxed);
        });

        conn.close(4000, "bye");
        conn.close(4000, "bye");
        conn.release();

        assert_eq!(fired.load(Ordering::Relaxed), 1);
        match rx.try_recv() {
            Ok(Message::Close(Some(frame))) => {
                assert_eq!(frame.code, 4000);
                assert_eq!(frame.reason.as_str(), "bye");
            }
            other => panic!("expected close frame, got {other:?}"),
        }
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn closed_connection_ignores_traffic() {
        let (conn, mut rx) = connection();
        conn.release();
        let _ = rx.try_recv();

        assert_eq!(conn.send_text("late"), Err(ConnectionError::Closed));
        conn.deliver(PING_TOKEN);
        assert!(rx.try_recv().is_err());

        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);
        conn.on_close(move |_| flag.store(true, Ordering::Relaxed));
        assert!(fired.load(Ordering::Relaxed));
    }

    #[test]
    fn heartbeat_tick_pings_while_fresh_and_closes_when_stale() {
        let (conn, mut rx) = connection();

        assert!(conn.heartbeat_tick(Duration::from_secs(60)));
        assert!(matches!(rx.try_recv(), Ok(Message::Ping(_))));

        assert!(!conn.heartbeat_tick(Duration::ZERO));
        match rx.try_recv() {
            Ok(Message::Close(Some(frame))) => {
                assert_eq!(frame.code, HEARTBEAT_TIMEOUT_CODE);
                assert_eq!(frame.reason.as_str(), HEARTBEAT_TIMEOUT_REASON);
            }
            other => panic!("expected close frame, got {other:?}"),
        }

        assert!(!conn.heartbeat_tick(Duration::from_secs(60)));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn closed_future_resolves_after_release() {
        let (conn, _rx) = connection();
        let waiter = {
            let conn = conn.clone();
            tokio::spawn(async move { conn.closed().await })
        };
        conn.release();
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn heartbeat_task_stops_on_close() {
        let (conn, _rx) = connection();
        let task = conn.spawn_heartbeat(Duration::from_secs(3600), Duration::from_secs(7200));
        conn.close(1000, "done");
        task.await.unwrap();
    }
}
