//! Session driver: the single task that owns the [`ConnectionManager`].
//!
//! UI commands, transport events and the session timer are multiplexed with
//! `select!` and applied one at a time, so no two transitions are ever in
//! flight. The shell talks to the task through a cloneable [`SessionHandle`].

use std::sync::Arc;

use dapai_sdk::event::ServerEvent;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::bridge::SessionPreferences;
use crate::error::ClientError;
use crate::manager::ConnectionManager;
use crate::session::{LoginRequest, SessionSnapshot};

/// Commands the shell can send to the driver.
#[derive(Debug)]
enum SessionCommand {
    Connect {
        server_address: String,
        nickname: String,
        reply: oneshot::Sender<Result<(), ClientError>>,
    },
    SendMessage {
        text: String,
        reply: oneshot::Sender<bool>,
    },
    Logout,
    State {
        reply: oneshot::Sender<SessionSnapshot>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// A handle to a running session driver.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    cmd_tx: mpsc::Sender<SessionCommand>,
}

impl SessionHandle {
    /// Validate and start a session. Returns once the transport is opening;
    /// the outcome of the login arrives as notifications.
    pub async fn connect(&self, server_address: &str, nickname: &str) -> Result<(), ClientError> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionCommand::Connect {
            server_address: server_address.to_string(),
            nickname: nickname.to_string(),
            reply,
        })
        .await?;
        rx.await.map_err(|_| ClientError::DriverClosed)?
    }

    /// Returns whether the message was sent.
    pub async fn send_message(&self, text: &str) -> Result<bool, ClientError> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionCommand::SendMessage {
            text: text.to_string(),
            reply,
        })
        .await?;
        rx.await.map_err(|_| ClientError::DriverClosed)
    }

    pub async fn logout(&self) -> Result<(), ClientError> {
        self.send(SessionCommand::Logout).await
    }

    pub async fn state(&self) -> Result<SessionSnapshot, ClientError> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionCommand::State { reply }).await?;
        rx.await.map_err(|_| ClientError::DriverClosed)
    }

    /// Log out if authenticated, wait for the teardown, then stop the
    /// driver.
    pub async fn shutdown(&self) -> Result<(), ClientError> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionCommand::Shutdown { reply }).await?;
        rx.await.map_err(|_| ClientError::DriverClosed)
    }

    async fn send(&self, command: SessionCommand) -> Result<(), ClientError> {
        self.cmd_tx
            .send(command)
            .await
            .map_err(|_| ClientError::DriverClosed)
    }
}

/// Spawn the driver task. When `prefs` is given, validated logins are
/// remembered there before the transport opens.
pub fn spawn(
    manager: ConnectionManager,
    prefs: Option<Arc<Mutex<SessionPreferences>>>,
) -> (SessionHandle, JoinHandle<()>) {
    let (cmd_tx, cmd_rx) = mpsc::channel(64);
    let task = tokio::spawn(run(manager, cmd_rx, prefs));
    (SessionHandle { cmd_tx }, task)
}

async fn run(
    mut manager: ConnectionManager,
    mut cmd_rx: mpsc::Receiver<SessionCommand>,
    prefs: Option<Arc<Mutex<SessionPreferences>>>,
) {
    let mut events: Option<mpsc::Receiver<ServerEvent>> = None;
    let mut shutdown_reply: Option<oneshot::Sender<()>> = None;

    loop {
        let deadline = manager.next_deadline();
        tokio::select! {
            cmd = cmd_rx.recv(), if shutdown_reply.is_none() => match cmd {
                Some(SessionCommand::Connect { server_address, nickname, reply }) => {
                    let outcome = start_session(&mut manager, prefs.as_ref(), &server_address, &nickname)
                        .map(|receiver| events = Some(receiver));
                    let _ = reply.send(outcome);
                }
                Some(SessionCommand::SendMessage { text, reply }) => {
                    let _ = reply.send(manager.send_message(&text));
                }
                Some(SessionCommand::Logout) => manager.logout(Instant::now()),
                Some(SessionCommand::State { reply }) => {
                    let _ = reply.send(manager.session().snapshot());
                }
                Some(SessionCommand::Shutdown { reply }) => {
                    manager.logout(Instant::now());
                    if manager.state().is_live() {
                        tracing::debug!("Shutdown waiting for logout teardown");
                        shutdown_reply = Some(reply);
                    } else {
                        let _ = reply.send(());
                        break;
                    }
                }
                None => {
                    tracing::debug!("All session handles dropped");
                    manager.abort();
                    break;
                }
            },
            event = next_event(&mut events) => match event {
                Some(event) => manager.handle_event(event, Instant::now()),
                None => events = None,
            },
            _ = sleep_until(deadline) => {
                manager.fire_timers(Instant::now());
                if let Some(reply) = shutdown_reply.take_if(|_| !manager.state().is_live()) {
                    let _ = reply.send(());
                    break;
                }
            }
        }
    }
    tracing::debug!("Session driver stopped");
}

fn start_session(
    manager: &mut ConnectionManager,
    prefs: Option<&Arc<Mutex<SessionPreferences>>>,
    server_address: &str,
    nickname: &str,
) -> Result<mpsc::Receiver<ServerEvent>, ClientError> {
    let request = LoginRequest::new(server_address, nickname)?;
    let state = manager.state();
    if state.is_live() {
        return Err(ClientError::SessionActive { state });
    }
    if let Some(prefs) = prefs {
        prefs.lock().remember_login(&request);
    }
    manager.open_session(request)
}

async fn next_event(events: &mut Option<mpsc::Receiver<ServerEvent>>) -> Option<ServerEvent> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
