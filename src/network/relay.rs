use std::future::Future;
use std::io;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use futures::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::common::{ClientEvent, ServerEvent};

const RELAY_BUFFER: usize = 1024;

/// Stateless fan-out hub: every published event goes to every connection,
/// the publisher included. Nothing is stored.
#[derive(Clone)]
pub struct Relay {
    hub: broadcast::Sender<ServerEvent>,
}

impl Default for Relay {
    fn default() -> Self {
        Self::new()
    }
}

impl Relay {
    pub fn new() -> Self {
        let (hub, _) = broadcast::channel(RELAY_BUFFER);
        Self { hub }
    }

    /// Rebroadcasts `event`; returns how many connections it was handed to.
    pub fn publish(&self, event: ClientEvent) -> usize {
        self.hub.send(ServerEvent::from(event)).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.hub.subscribe()
    }

    pub fn connection_count(&self) -> usize {
        self.hub.receiver_count()
    }
}

pub fn router(relay: Relay) -> Router {
    Router::new()
        .route("/healthz", get(health_handler))
        .route("/ws", get(ws_handler))
        .with_state(relay)
}

/// Serves the relay on `listener` until `shutdown` resolves.
pub async fn serve(
    listener: TcpListener,
    relay: Relay,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        log::info!("Relay listening on {addr}");
    }
    axum::serve(listener, router(relay))
        .with_graceful_shutdown(shutdown)
        .await
}

async fn health_handler(State(relay): State<Relay>) -> impl IntoResponse {
    Json(json!({ "status": "ok", "connections": relay.connection_count() }))
}

async fn ws_handler(State(relay): State<Relay>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, relay))
}

async fn handle_connection(socket: WebSocket, relay: Relay) {
    let connection_id = Uuid::new_v4();
    log::info!("A user connected: {connection_id}");

    let mut hub = relay.subscribe();
    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            event = hub.recv() => match event {
                Ok(event) => {
                    let frame = match serde_json::to_string(&event) {
                        Ok(frame) => frame,
                        Err(err) => {
                            log::error!("Failed to encode relay event: {err}");
                            continue;
                        }
                    };
                    if sink.send(Message::Text(frame)).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    log::warn!("Connection {connection_id} lagged; {skipped} events skipped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => match serde_json::from_str::<ClientEvent>(&text) {
                    Ok(event) => {
                        log::debug!("Relaying {event:?} from {connection_id}");
                        relay.publish(event);
                    }
                    Err(err) => log::warn!("Dropping unrecognised frame from {connection_id}: {err}"),
                },
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    log::warn!("Connection {connection_id} failed: {err}");
                    break;
                }
            },
        }
    }

    log::info!("User disconnected: {connection_id}");
}
