//! Chat client connection with a bounded retry budget.
//!
//! This is the main entry point for SDK consumers. [`connect`] spawns a task
//! that opens the transport, performs the Engine.IO/Socket.IO handshake and
//! then pumps packets both ways. The consumer talks to it through a
//! [`ClientHandle`] and listens on the returned event receiver.
//!
//! ## Connection budget
//!
//! Transports are tried in preference order (websocket, then polling) within
//! one attempt, and each attempt is bounded by [`TransportOptions::timeout`].
//! A failed attempt is retried up to [`TransportOptions::reconnection_attempts`]
//! times, [`TransportOptions::reconnection_delay`] apart. A
//! [`ServerEvent::ReconnectAttempt`] precedes every retry; once the budget is
//! spent a single [`ServerEvent::ConnectError`] is emitted and the task ends.
//!
//! Once connected, a dropped connection is reported as
//! [`ServerEvent::Disconnect`] and the task ends. Resuming a session is up to
//! the consumer.

use std::collections::VecDeque;
use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::endpoint::Endpoint;
use crate::error::TransportError;
use crate::event::{ClientEvent, ServerEvent};
use crate::packet::{self, EnginePacket, Handshake, SocketPacket};
use crate::{polling, websocket};

/// Underlying transport kinds, in the order they may be preferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Websocket,
    Polling,
}

/// Connection parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportOptions {
    /// Retries after the first failed attempt.
    pub reconnection_attempts: u32,
    /// Pause between attempts.
    pub reconnection_delay: Duration,
    /// Upper bound for a single attempt (all transports included).
    pub timeout: Duration,
    /// Transports to try, most preferred first.
    pub transports: Vec<TransportKind>,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            reconnection_attempts: 3,
            reconnection_delay: Duration::from_millis(1000),
            timeout: Duration::from_millis(20000),
            transports: vec![TransportKind::Websocket, TransportKind::Polling],
        }
    }
}

/// Commands the consumer can send to the connection task.
#[derive(Debug)]
enum Command {
    Emit(ClientEvent),
    Close,
}

/// A handle to a running connection.
///
/// Sending never blocks: events are queued and written by the connection
/// task in order. Events emitted before the connection is open are held back
/// and flushed right after [`ServerEvent::Open`].
#[derive(Debug, Clone)]
pub struct ClientHandle {
    cmd_tx: mpsc::UnboundedSender<Command>,
}

impl ClientHandle {
    pub fn emit(&self, event: ClientEvent) -> Result<(), TransportError> {
        self.cmd_tx
            .send(Command::Emit(event))
            .map_err(|_| TransportError::Closed)
    }

    /// Close the connection. Idempotent; a closed task simply ignores it.
    pub fn close(&self) {
        let _ = self.cmd_tx.send(Command::Close);
    }

    /// Whether the connection task has ended.
    pub fn is_closed(&self) -> bool {
        self.cmd_tx.is_closed()
    }
}

/// Connect to a chat server.
///
/// Fails only if `address` cannot be turned into transport URLs; everything
/// else is reported through the event receiver. Must be called from within a
/// tokio runtime.
pub fn connect(
    address: &str,
    options: TransportOptions,
) -> Result<(ClientHandle, mpsc::Receiver<ServerEvent>), TransportError> {
    let endpoint = Endpoint::parse(address)?;
    let (event_tx, event_rx) = mpsc::channel(4096);
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();

    tokio::spawn(run_client(endpoint, options, event_tx, cmd_rx));

    Ok((ClientHandle { cmd_tx }, event_rx))
}

async fn run_client(
    endpoint: Endpoint,
    options: TransportOptions,
    event_tx: mpsc::Sender<ServerEvent>,
    mut cmd_rx: mpsc::UnboundedReceiver<Command>,
) {
    let mut pending: Vec<ClientEvent> = Vec::new();
    let mut failures: u32 = 0;

    let mut link = loop {
        let attempt = tokio::time::timeout(options.timeout, establish(&endpoint, &options.transports));
        let Some(outcome) = until_closed(attempt, &mut cmd_rx, &mut pending).await else {
            tracing::debug!("Connection closed by consumer while connecting");
            return;
        };
        let error = match outcome {
            Ok(Ok(link)) => break link,
            Ok(Err(e)) => e,
            Err(_) => TransportError::Timeout(options.timeout),
        };

        failures += 1;
        if failures > options.reconnection_attempts {
            tracing::warn!(error = %error, attempts = failures, "Giving up on connection");
            let _ = event_tx
                .send(ServerEvent::ConnectError {
                    error: error.to_string(),
                })
                .await;
            return;
        }
        tracing::warn!(
            error = %error,
            attempt = failures,
            delay_ms = options.reconnection_delay.as_millis() as u64,
            "Connection attempt failed, retrying"
        );
        let delay = tokio::time::sleep(options.reconnection_delay);
        if until_closed(delay, &mut cmd_rx, &mut pending).await.is_none() {
            return;
        }
        let _ = event_tx
            .send(ServerEvent::ReconnectAttempt { attempt: failures })
            .await;
    };

    tracing::info!(
        transport = ?link.kind(),
        sid = %link.handshake.sid,
        namespace = %endpoint.namespace,
        "Connected"
    );
    if event_tx.send(ServerEvent::Open).await.is_err() {
        link.close().await;
        return;
    }

    let reason = match flush_and_pump(&mut link, &endpoint.namespace, pending, &event_tx, &mut cmd_rx).await {
        Ok(reason) => reason.to_string(),
        Err(e) => {
            tracing::warn!(error = %e, "Transport failed");
            "transport error".to_string()
        }
    };
    tracing::info!(reason = %reason, "Disconnected");
    let _ = event_tx.send(ServerEvent::Disconnect { reason }).await;
}

/// Drive `fut` while buffering emitted events. Returns `None` if the
/// consumer closed the handle first.
async fn until_closed<F: Future>(
    fut: F,
    cmd_rx: &mut mpsc::UnboundedReceiver<Command>,
    pending: &mut Vec<ClientEvent>,
) -> Option<F::Output> {
    tokio::pin!(fut);
    loop {
        tokio::select! {
            out = &mut fut => return Some(out),
            cmd = cmd_rx.recv() => match cmd {
                Some(Command::Emit(event)) => pending.push(event),
                Some(Command::Close) | None => return None,
            },
        }
    }
}

/// One connection attempt: each transport in order until one completes the
/// Socket.IO connect.
async fn establish(endpoint: &Endpoint, transports: &[TransportKind]) -> Result<Link, TransportError> {
    let mut last_error = TransportError::Handshake("no transports configured".to_string());
    for &kind in transports {
        let opened = match kind {
            TransportKind::Websocket => websocket::open(endpoint)
                .await
                .map(|(link, handshake)| Link::new(Channel::Websocket(link), handshake, Vec::new())),
            TransportKind::Polling => polling::open(endpoint)
                .await
                .map(|(link, handshake, extra)| Link::new(Channel::Polling(link), handshake, extra)),
        };
        let mut link = match opened {
            Ok(link) => link,
            Err(e) => {
                tracing::debug!(transport = ?kind, error = %e, "Transport unavailable");
                last_error = e;
                continue;
            }
        };
        match join_namespace(&mut link, &endpoint.namespace).await {
            Ok(()) => return Ok(link),
            Err(e) => {
                tracing::debug!(transport = ?kind, error = %e, "Socket.IO connect failed");
                link.close().await;
                last_error = e;
            }
        }
    }
    Err(last_error)
}

/// Send the Socket.IO CONNECT and wait for the server's answer.
async fn join_namespace(link: &mut Link, namespace: &str) -> Result<(), TransportError> {
    link.send(&EnginePacket::Message(SocketPacket::Connect(None).encode(namespace)))
        .await?;

    let mut deferred = Vec::new();
    loop {
        let Some(packet) = link.recv().await? else {
            return Err(TransportError::Handshake(
                "connection closed before connect ack".to_string(),
            ));
        };
        match packet {
            EnginePacket::Ping(data) => link.send(&EnginePacket::Pong(data)).await?,
            EnginePacket::Close => {
                return Err(TransportError::Handshake(
                    "server closed the connection during connect".to_string(),
                ));
            }
            EnginePacket::Message(data) => match SocketPacket::decode(&data)? {
                (nsp, SocketPacket::Connect(_)) if nsp == namespace => {
                    for packet in deferred.into_iter().rev() {
                        link.backlog.push_front(packet);
                    }
                    return Ok(());
                }
                (nsp, SocketPacket::ConnectError(data)) if nsp == namespace => {
                    return Err(TransportError::Rejected(packet::connect_error_message(&data)));
                }
                _ => deferred.push(EnginePacket::Message(data)),
            },
            EnginePacket::Open(_) | EnginePacket::Pong(_) | EnginePacket::Upgrade | EnginePacket::Noop => {}
        }
    }
}

async fn flush_and_pump(
    link: &mut Link,
    namespace: &str,
    pending: Vec<ClientEvent>,
    event_tx: &mpsc::Sender<ServerEvent>,
    cmd_rx: &mut mpsc::UnboundedReceiver<Command>,
) -> anyhow::Result<&'static str> {
    for event in pending {
        emit(link, namespace, event).await?;
    }

    let handshake = &link.handshake;
    let ping_window = Duration::from_millis(handshake.ping_interval + handshake.ping_timeout);
    let mut deadline = Instant::now() + ping_window;

    loop {
        tokio::select! {
            packet = link.recv() => {
                let Some(packet) = packet? else {
                    return Ok("transport close");
                };
                match packet {
                    EnginePacket::Ping(data) => {
                        deadline = Instant::now() + ping_window;
                        link.send(&EnginePacket::Pong(data)).await?;
                    }
                    EnginePacket::Close => return Ok("transport close"),
                    EnginePacket::Message(data) => match SocketPacket::decode(&data) {
                        Ok((nsp, _)) if nsp != namespace => {
                            tracing::debug!(namespace = %nsp, "Ignoring packet for another namespace");
                        }
                        Ok((_, SocketPacket::Event { name, args, .. })) => {
                            match ServerEvent::from_event(&name, &args) {
                                Some(event) => {
                                    if event_tx.send(event).await.is_err() {
                                        link.close().await;
                                        return Ok("io client disconnect");
                                    }
                                }
                                None => tracing::debug!(event = %name, "Ignoring unknown server event"),
                            }
                        }
                        Ok((_, SocketPacket::Disconnect)) => return Ok("io server disconnect"),
                        Ok((_, other)) => tracing::debug!(packet = ?other, "Ignoring socket packet"),
                        Err(e) => tracing::warn!(error = %e, "Dropping malformed packet"),
                    },
                    EnginePacket::Open(_) | EnginePacket::Pong(_) | EnginePacket::Upgrade | EnginePacket::Noop => {}
                }
            }
            cmd = cmd_rx.recv() => match cmd {
                Some(Command::Emit(event)) => emit(link, namespace, event).await?,
                Some(Command::Close) | None => {
                    let goodbye = EnginePacket::Message(SocketPacket::Disconnect.encode(namespace));
                    let _ = link.send(&goodbye).await;
                    link.close().await;
                    return Ok("io client disconnect");
                }
            },
            _ = tokio::time::sleep_until(deadline) => {
                link.close().await;
                return Ok("ping timeout");
            }
        }
    }
}

async fn emit(link: &mut Link, namespace: &str, event: ClientEvent) -> Result<(), TransportError> {
    tracing::debug!(event = event.name(), "Emitting");
    let packet = SocketPacket::event(event.name(), event.args());
    link.send(&EnginePacket::Message(packet.encode(namespace))).await
}

enum Channel {
    Websocket(websocket::WebsocketLink),
    Polling(polling::PollingLink),
}

/// An open transport plus packets already read but not yet consumed.
struct Link {
    channel: Channel,
    handshake: Handshake,
    backlog: VecDeque<EnginePacket>,
}

impl Link {
    fn new(channel: Channel, handshake: Handshake, extra: Vec<EnginePacket>) -> Self {
        Self {
            channel,
            handshake,
            backlog: extra.into(),
        }
    }

    fn kind(&self) -> TransportKind {
        match self.channel {
            Channel::Websocket(_) => TransportKind::Websocket,
            Channel::Polling(_) => TransportKind::Polling,
        }
    }

    async fn send(&mut self, packet: &EnginePacket) -> Result<(), TransportError> {
        match &mut self.channel {
            Channel::Websocket(ws) => ws.send(packet).await,
            Channel::Polling(poll) => poll.send(packet).await,
        }
    }

    async fn recv(&mut self) -> Result<Option<EnginePacket>, TransportError> {
        if let Some(packet) = self.backlog.pop_front() {
            return Ok(Some(packet));
        }
        match &mut self.channel {
            Channel::Websocket(ws) => ws.recv().await,
            Channel::Polling(poll) => poll.recv().await,
        }
    }

    async fn close(&mut self) {
        match &mut self.channel {
            Channel::Websocket(ws) => ws.close().await,
            Channel::Polling(poll) => poll.close().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let options = TransportOptions::default();
        assert_eq!(options.reconnection_attempts, 3);
        assert_eq!(options.reconnection_delay, Duration::from_millis(1000));
        assert_eq!(options.timeout, Duration::from_millis(20000));
        assert_eq!(
            options.transports,
            vec![TransportKind::Websocket, TransportKind::Polling]
        );
    }

    #[tokio::test]
    async fn test_connect_rejects_invalid_address() {
        let err = connect("not an address", TransportOptions::default()).unwrap_err();
        assert!(matches!(err, TransportError::InvalidAddress { .. }));
    }

    #[tokio::test]
    async fn test_handle_reports_closed_task() {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        drop(cmd_rx);
        let handle = ClientHandle { cmd_tx };
        assert!(handle.is_closed());
        assert!(matches!(
            handle.emit(ClientEvent::Logout),
            Err(TransportError::Closed)
        ));
    }
}
