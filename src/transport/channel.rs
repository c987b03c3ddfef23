//! One Socket.IO namespace over a WebSocket, reconnecting with backoff.
//!
//! The channel task owns the socket. It answers pings, forwards events in
//! arrival order over an mpsc channel and reports (re)connects so the
//! consumer can resynchronize. It stops when the shutdown broadcast fires
//! or every receiver is gone.

use futures_util::{SinkExt, StreamExt};
use rand::Rng;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use super::protocol::Packet;
use super::{TransportError, TransportResult};

/// What the channel reports to its consumer
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// The namespace is connected. `reconnect` is false only the first time.
    Connected { reconnect: bool },
    Event { name: String, data: serde_json::Value },
    Disconnected,
}

/// Reconnect backoff settings
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    pub base: Duration,
    pub max: Duration,
}

impl Backoff {
    /// Exponential delay for the given attempt with up to 50% jitter
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.min(16)).unwrap_or(u32::MAX);
        let ceiling = self.base.saturating_mul(factor).min(self.max);
        let ceiling_ms = ceiling.as_millis() as u64;
        let jittered = rand::thread_rng().gen_range(ceiling_ms / 2..=ceiling_ms);
        Duration::from_millis(jittered)
    }
}

enum Exit {
    Shutdown,
    Closed,
}

/// Handle on a running channel task
pub struct SocketChannel {
    namespace: String,
    handle: JoinHandle<()>,
}

impl SocketChannel {
    /// Start the channel task; events arrive on the returned receiver
    pub fn spawn(
        url: String,
        namespace: String,
        backoff: Backoff,
        shutdown: broadcast::Receiver<()>,
    ) -> (Self, mpsc::UnboundedReceiver<ChannelEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = ChannelTask {
            url,
            namespace: namespace.clone(),
            backoff,
            tx,
            connected_before: false,
        };
        let handle = tokio::spawn(task.run(shutdown));
        (Self { namespace, handle }, rx)
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the task to stop after shutdown
    pub async fn join(self) {
        if let Err(err) = self.handle.await {
            warn!("Channel task for {} failed: {}", self.namespace, err);
        }
    }

    pub fn abort(&self) {
        self.handle.abort();
    }
}

struct ChannelTask {
    url: String,
    namespace: String,
    backoff: Backoff,
    tx: mpsc::UnboundedSender<ChannelEvent>,
    connected_before: bool,
}

impl ChannelTask {
    async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        let mut attempt = 0u32;
        loop {
            match self.connect_once(&mut shutdown).await {
                Ok(Exit::Shutdown) => break,
                Ok(Exit::Closed) => {
                    info!("Channel {} closed by server", self.namespace);
                    attempt = 0;
                }
                Err(TransportError::ReceiverGone) => break,
                Err(err) => {
                    warn!("Channel {} failed: {}", self.namespace, err);
                }
            }
            if self.tx.send(ChannelEvent::Disconnected).is_err() {
                break;
            }

            let delay = self.backoff.delay(attempt);
            attempt = attempt.saturating_add(1);
            debug!("Reconnecting {} in {:?}", self.namespace, delay);
            tokio::select! {
                _ = shutdown.recv() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }
        debug!("Channel task for {} ended", self.namespace);
    }

    fn emit(&self, event: ChannelEvent) -> TransportResult<()> {
        self.tx.send(event).map_err(|_| TransportError::ReceiverGone)
    }

    async fn connect_once(&mut self, shutdown: &mut broadcast::Receiver<()>) -> TransportResult<Exit> {
        let (ws, _) = tokio::select! {
            _ = shutdown.recv() => return Ok(Exit::Shutdown),
            connected = connect_async(self.url.as_str()) => connected?,
        };
        let (mut sink, mut stream) = ws.split();
        debug!("WebSocket open for {}", self.namespace);

        loop {
            let frame = tokio::select! {
                _ = shutdown.recv() => {
                    let _ = sink.send(Message::Text(Packet::disconnect(self.namespace.as_str()).encode())).await;
                    let _ = sink.close().await;
                    return Ok(Exit::Shutdown);
                }
                frame = stream.next() => frame,
            };

            let text = match frame {
                Some(Ok(Message::Text(text))) => text,
                Some(Ok(Message::Close(_))) | None => return Ok(Exit::Closed),
                Some(Ok(_)) => continue,
                Some(Err(err)) => return Err(err.into()),
            };

            let packet = match Packet::decode(&text) {
                Ok(packet) => packet,
                Err(err) => {
                    warn!("Skipping frame on {}: {}", self.namespace, err);
                    continue;
                }
            };

            match packet {
                Packet::Open(_) => {
                    sink.send(Message::Text(Packet::connect(self.namespace.as_str()).encode()))
                        .await?;
                }
                Packet::Ping => {
                    sink.send(Message::Text(Packet::Pong.encode())).await?;
                }
                Packet::Close => return Ok(Exit::Closed),
                Packet::Connect { ref namespace, .. } if *namespace == self.namespace => {
                    info!(
                        "Connected to {}{}",
                        self.namespace,
                        if self.connected_before { " (reconnect)" } else { "" }
                    );
                    let reconnect = self.connected_before;
                    self.connected_before = true;
                    self.emit(ChannelEvent::Connected { reconnect })?;
                }
                Packet::Disconnect { ref namespace } if *namespace == self.namespace => {
                    return Ok(Exit::Closed);
                }
                Packet::ConnectError { namespace, message } if namespace == self.namespace => {
                    return Err(TransportError::Refused { namespace, message });
                }
                Packet::Event { namespace, name, data } if namespace == self.namespace => {
                    self.emit(ChannelEvent::Event { name, data })?;
                }
                other => debug!("Ignoring {:?} on {}", other, self.namespace),
            }
        }
    }
}
