//! Route-token dispatch for HTTP requests and WebSocket connections.

use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message, close_code};
use dashmap::{DashMap, mapref::entry::Entry};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::{error::ServiceError, services::connection::ManagedConnection};

/// HTTP request forwarded to a route handler.
#[derive(Debug, Clone, PartialEq)]
pub enum RouteRequest {
    /// Read the handler's current view.
    Get,
    /// Submit a JSON body.
    Post(Value),
}

/// What a handler answers to a [`RouteRequest`].
pub type RouteResponse = Result<Value, ServiceError>;

/// A surface bound to a route token.
pub trait RouteHandler: Send + Sync {
    /// Answer a plain HTTP request.
    fn handle_request(&self, request: RouteRequest) -> RouteResponse;

    /// Take ownership of a freshly accepted connection.
    ///
    /// The handler installs its callbacks and tracks the connection until it closes.
    fn handle_connection(self: Arc<Self>, connection: ManagedConnection);
}

/// Maps route tokens to handlers. Bindings are one-shot.
#[derive(Default)]
pub struct ConnectionRouter {
    routes: DashMap<String, Arc<dyn RouteHandler>>,
}

impl ConnectionRouter {
    /// Router with no bound tokens.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `handler` to `route`. A second binding is refused and the first one stays.
    pub fn register(&self, route: &str, handler: Arc<dyn RouteHandler>) -> bool {
        match self.routes.entry(route.to_string()) {
            Entry::Occupied(_) => {
                warn!(route, "route already bound; keeping the original handler");
                false
            }
            Entry::Vacant(entry) => {
                entry.insert(handler);
                info!(route, "route bound");
                true
            }
        }
    }

    /// Dispatch an HTTP request, `None` when nothing is bound to `route`.
    pub fn on_request(&self, route: &str, request: RouteRequest) -> Option<RouteResponse> {
        let handler = self.handler(route)?;
        Some(handler.handle_request(request))
    }

    /// Accept a transport on `token`.
    ///
    /// Unbound tokens get a protocol-error close frame on `transport` and `None`.
    pub fn on_connection(
        &self,
        token: &str,
        transport: mpsc::UnboundedSender<Message>,
    ) -> Option<ManagedConnection> {
        let Some(handler) = self.handler(token) else {
            warn!(token, "rejecting connection on unbound route");
            let _ = transport.send(Message::Close(Some(CloseFrame {
                code: close_code::PROTOCOL,
                reason: format!("invalid route token `{token}`").into(),
            })));
            return None;
        };

        let connection = ManagedConnection::new(token, transport);
        info!(route = token, connection = %connection.id(), "connection accepted");
        handler.handle_connection(connection.clone());
        Some(connection)
    }

    /// Bound route tokens, sorted.
    pub fn routes(&self) -> Vec<String> {
        let mut routes: Vec<String> = self.routes.iter().map(|entry| entry.key().clone()).collect();
        routes.sort();
        routes
    }

    fn handler(&self, route: &str) -> Option<Arc<dyn RouteHandler>> {
        // Clone out of the map so no shard lock is held while the handler runs.
        self.routes.get(route).map(|entry| Arc::clone(entry.value()))
    }
}
