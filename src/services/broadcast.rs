//! Connection bookkeeping shared by the broadcast handlers.

use dashmap::DashMap;
use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    dto::ws::StatusMessage,
    services::connection::{ConnectionError, ManagedConnection},
};

/// Connections currently attached to one handler.
#[derive(Default)]
pub struct ConnectionSet {
    connections: DashMap<Uuid, ManagedConnection>,
}

impl ConnectionSet {
    /// Empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a connection until it is removed.
    pub fn insert(&self, connection: ManagedConnection) {
        self.connections.insert(connection.id(), connection);
    }

    /// Stop tracking a connection, returning it if it was present.
    pub fn remove(&self, id: Uuid) -> Option<ManagedConnection> {
        self.connections.remove(&id).map(|(_, connection)| connection)
    }

    /// Number of tracked connections.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Whether no connection is tracked.
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Serialize `value` once and send it to every connection.
    pub fn broadcast_json<T>(&self, value: &T)
    where
        T: ?Sized + Serialize,
    {
        let payload = match serde_json::to_string(value) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(error = %err, "failed to serialize broadcast");
                return;
            }
        };
        debug!(connections = self.connections.len(), "broadcasting");
        self.for_each(|connection| {
            let _ = connection.send_text(&payload);
        });
    }

    /// Run `f` on every connection.
    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(&ManagedConnection),
    {
        for entry in self.connections.iter() {
            f(entry.value());
        }
    }
}

/// Reply to a single connection with a status message.
pub fn send_status(connection: &ManagedConnection, status: &StatusMessage) {
    if let Err(ConnectionError::Closed) = connection.send_json(status) {
        debug!(connection = %connection.id(), "status dropped on closed connection");
    }
}
