use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, info, warn};

use crate::state::SharedState;

/// Handle the full lifecycle of a WebSocket accepted on `token`.
///
/// The router decides which handler owns the connection; this function only
/// pumps frames between the socket and the managed connection.
pub async fn handle_socket(state: SharedState, token: String, socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

    // Dedicated writer task keeps outbound messages flowing even while we await inbound frames.
    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            let closing = matches!(message, Message::Close(_));
            if sender.send(message).await.is_err() || closing {
                break;
            }
        }
    });

    let Some(connection) = state.router().on_connection(&token, outbound_tx.clone()) else {
        finalize(writer_task, outbound_tx).await;
        return;
    };

    let heartbeat = state.config().heartbeat;
    let keepalive = connection.spawn_heartbeat(heartbeat.interval(), heartbeat.timeout());

    loop {
        let message = tokio::select! {
            _ = connection.closed() => break,
            message = receiver.next() => message,
        };
        let Some(message) = message else {
            break;
        };

        match message {
            Ok(Message::Text(text)) => {
                debug!(connection = %connection.id(), route = %token, payload = %text, "received message");
                connection.deliver(text.as_str());
            }
            Ok(Message::Ping(payload)) => {
                connection.touch();
                let _ = connection.send_frame(Message::Pong(payload));
            }
            Ok(Message::Pong(_)) => connection.touch(),
            Ok(Message::Binary(_)) => {
                connection.touch();
                debug!(connection = %connection.id(), "ignoring binary frame");
            }
            Ok(Message::Close(_)) => {
                info!(connection = %connection.id(), route = %token, "peer closed");
                break;
            }
            Err(err) => {
                warn!(connection = %connection.id(), error = %err, "websocket error");
                break;
            }
        }
    }

    connection.release();
    keepalive.abort();
    info!(connection = %connection.id(), route = %token, "connection finished");

    finalize(writer_task, outbound_tx).await;
}

/// Ensure the writer task winds down before we return from the socket handler.
async fn finalize(writer_task: JoinHandle<()>, outbound_tx: mpsc::UnboundedSender<Message>) {
    drop(outbound_tx);
    let _ = writer_task.await;
}
