use std::sync::Mutex;

use futures::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use crate::common::{ClientEvent, ServerEvent};

use super::relay::Relay;

/// Events buffered per channel before slow subscribers start skipping.
const EVENT_BUFFER: usize = 256;

#[derive(Debug, thiserror::Error)]
pub enum PushError {
    #[error("push channel is closed")]
    Closed,
    #[error("failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("failed to connect to relay: {0}")]
    Connect(#[from] tungstenite::Error),
}

/// A connection to the relay.
///
/// Lifecycle: connect (constructor) → `subscribe` / drop the `Subscription`
/// any number of times → `close`. Delivery is best effort and unordered
/// across senders; nothing sent before a subscription exists is replayed.
pub trait PushChannel: Send + Sync {
    fn emit(&self, event: ClientEvent) -> Result<(), PushError>;
    /// Registers a handler. Dropping the returned value deregisters it.
    fn subscribe(&self) -> Subscription;
    /// Number of live subscriptions.
    fn subscriber_count(&self) -> usize;
    fn close(&self);
}

/// A registered event handler on a `PushChannel`.
pub struct Subscription {
    receiver: broadcast::Receiver<ServerEvent>,
}

impl Subscription {
    fn new(receiver: broadcast::Receiver<ServerEvent>) -> Self {
        Self { receiver }
    }

    /// Next event, or `None` once the channel can never deliver again.
    pub async fn recv(&mut self) -> Option<ServerEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    log::warn!("Push subscriber lagged; {skipped} events skipped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// Websocket connection to a relay server.
pub struct RelayClient {
    outbound: Mutex<Option<mpsc::UnboundedSender<String>>>,
    inbound: broadcast::Sender<ServerEvent>,
}

impl RelayClient {
    pub async fn connect(url: &str) -> Result<Self, PushError> {
        let (ws_stream, _) = connect_async(url).await?;
        log::info!("Connected to relay at {url}");

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound, _) = broadcast::channel(EVENT_BUFFER);
        tokio::spawn(pump(ws_stream, outbound_rx, inbound.clone()));

        Ok(Self {
            outbound: Mutex::new(Some(outbound_tx)),
            inbound,
        })
    }
}

impl PushChannel for RelayClient {
    fn emit(&self, event: ClientEvent) -> Result<(), PushError> {
        let frame = serde_json::to_string(&event)?;
        let outbound = self
            .outbound
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match outbound.as_ref() {
            Some(sender) => sender.send(frame).map_err(|_| PushError::Closed),
            None => Err(PushError::Closed),
        }
    }

    fn subscribe(&self) -> Subscription {
        Subscription::new(self.inbound.subscribe())
    }

    fn subscriber_count(&self) -> usize {
        self.inbound.receiver_count()
    }

    fn close(&self) {
        // Dropping the sender makes the pump send a close frame and exit.
        self.outbound
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
    }
}

/// Moves frames between the websocket and the client's channels.
async fn pump(
    ws_stream: WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>,
    mut outbound: mpsc::UnboundedReceiver<String>,
    inbound: broadcast::Sender<ServerEvent>,
) {
    let (mut sink, mut stream) = ws_stream.split();

    loop {
        tokio::select! {
            frame = outbound.recv() => match frame {
                Some(text) => {
                    if let Err(err) = sink.send(Message::Text(text)).await {
                        log::warn!("Failed to send frame to relay: {err}");
                        break;
                    }
                }
                None => {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
            },
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => match serde_json::from_str::<ServerEvent>(&text) {
                    // No subscribers means nobody is mounted; the event is simply missed.
                    Ok(event) => {
                        let _ = inbound.send(event);
                    }
                    Err(err) => log::warn!("Ignoring unrecognised relay frame: {err}"),
                },
                Some(Ok(Message::Close(_))) | None => {
                    log::info!("Relay closed the connection");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    log::warn!("Relay connection error: {err}");
                    break;
                }
            },
        }
    }
}

/// In-process connection to a `Relay`, with the same semantics as a
/// websocket connection.
pub struct LoopbackChannel {
    relay: Relay,
    inbound: broadcast::Sender<ServerEvent>,
    forwarder: Mutex<Option<JoinHandle<()>>>,
}

impl LoopbackChannel {
    pub fn connect(relay: &Relay) -> Self {
        let mut hub = relay.subscribe();
        let (inbound, _) = broadcast::channel(EVENT_BUFFER);
        let local = inbound.clone();
        let forwarder = tokio::spawn(async move {
            loop {
                match hub.recv().await {
                    Ok(event) => {
                        let _ = local.send(event);
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        log::warn!("Loopback connection lagged; {skipped} events skipped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        Self {
            relay: relay.clone(),
            inbound,
            forwarder: Mutex::new(Some(forwarder)),
        }
    }

    fn is_open(&self) -> bool {
        self.forwarder
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .is_some()
    }
}

impl PushChannel for LoopbackChannel {
    fn emit(&self, event: ClientEvent) -> Result<(), PushError> {
        if !self.is_open() {
            return Err(PushError::Closed);
        }
        self.relay.publish(event);
        Ok(())
    }

    fn subscribe(&self) -> Subscription {
        Subscription::new(self.inbound.subscribe())
    }

    fn subscriber_count(&self) -> usize {
        self.inbound.receiver_count()
    }

    fn close(&self) {
        if let Some(forwarder) = self
            .forwarder
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
        {
            forwarder.abort();
        }
    }
}

impl Drop for LoopbackChannel {
    fn drop(&mut self) {
        self.close();
    }
}
