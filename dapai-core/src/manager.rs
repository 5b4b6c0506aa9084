//! ConnectionManager: the session state machine.
//!
//! ```text
//! Idle -> Connecting             [connect()]
//! Connecting -> AwaitingLogin    [transport open]
//! Connecting -> Disconnected     [connect_error]
//! AwaitingLogin -> Authenticated [login_success]
//! AwaitingLogin -> Disconnected  [login_error]
//! Authenticated -> LoggingOut    [logout()]
//! Authenticated -> Disconnected  [unexpected disconnect/connect_error]
//! LoggingOut -> Disconnected     [grace timer elapses]
//! ```
//!
//! The manager never awaits. Time is passed in explicitly and the pending
//! deadline is exposed through [`ConnectionManager::next_deadline`]; the
//! driver task sleeps until it and calls [`ConnectionManager::fire_timers`].
//! All methods take `&mut self`, so transitions are serialized by
//! construction.

use dapai_sdk::event::{ClientEvent, ServerEvent};
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::envelope::Notifier;
use crate::error::ClientError;
use crate::event::{
    CONNECTION_FAILED_MESSAGE, CONNECTION_LOST_MESSAGE, DisplayMessage, FailureKind,
    LOGIN_REJECTED_FALLBACK, Notification,
};
use crate::message::InboundMessage;
use crate::presence::PresenceSnapshot;
use crate::render::{MessageRenderer, system_notice_html};
use crate::session::{LoginRequest, Session, SessionState, SessionTimings, UserIdentity};
use crate::transport::Connector;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// Announce the chat view after login.
    ViewSwap,
    /// Force-close after `logout` was sent.
    LogoutTeardown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTimer {
    pub deadline: Instant,
    pub kind: TimerKind,
}

pub struct ConnectionManager {
    connector: Box<dyn Connector>,
    renderer: MessageRenderer,
    timings: SessionTimings,
    notifier: Notifier,
    session: Session,
    timer: Option<SessionTimer>,
    generation: u64,
}

impl ConnectionManager {
    pub fn new(
        connector: impl Connector + 'static,
        renderer: MessageRenderer,
        timings: SessionTimings,
        notifier: Notifier,
    ) -> Self {
        Self {
            connector: Box::new(connector),
            renderer,
            timings,
            notifier,
            session: Session::default(),
            timer: None,
            generation: 0,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn state(&self) -> SessionState {
        self.session.state
    }

    pub fn timings(&self) -> SessionTimings {
        self.timings
    }

    /// Validate the input and start a session.
    pub fn connect(
        &mut self,
        server_address: &str,
        nickname: &str,
    ) -> Result<mpsc::Receiver<ServerEvent>, ClientError> {
        let request = LoginRequest::new(server_address, nickname)?;
        self.open_session(request)
    }

    /// Start a session for an already validated request. The returned
    /// receiver carries this session's transport events; feed them to
    /// [`handle_event`](Self::handle_event).
    pub fn open_session(
        &mut self,
        request: LoginRequest,
    ) -> Result<mpsc::Receiver<ServerEvent>, ClientError> {
        let current = self.session.state;
        if current.is_live() {
            return Err(ClientError::SessionActive { state: current });
        }

        self.generation += 1;
        self.timer = None;
        self.session = Session {
            state: current,
            pending_nickname: Some(request.nickname.clone()),
            server_address: Some(request.server_address.clone()),
            generation: self.generation,
            ..Session::default()
        };
        tracing::info!(
            generation = self.generation,
            server = %request.server_address,
            nickname = %request.nickname,
            "Connecting"
        );
        self.transition(SessionState::Connecting);

        match self.connector.open(&request.server_address) {
            Ok((transport, events)) => {
                self.session.transport = Some(transport);
                Ok(events)
            }
            Err(e) => {
                tracing::warn!(generation = self.generation, error = %e, "Could not open transport");
                self.teardown();
                self.transition(SessionState::Disconnected);
                self.notifier.notify(Notification::LoginFailed {
                    kind: FailureKind::Transport,
                    message: CONNECTION_FAILED_MESSAGE.to_string(),
                    detail: Some(e.to_string()),
                });
                Err(e.into())
            }
        }
    }

    /// Apply one transport event.
    pub fn handle_event(&mut self, event: ServerEvent, now: Instant) {
        let state = self.session.state;
        match event {
            ServerEvent::Open if state == SessionState::Connecting => {
                self.transition(SessionState::AwaitingLogin);
                let login = ClientEvent::Login {
                    nickname: self.session.pending_nickname.clone().unwrap_or_default(),
                    server_address: self.session.server_address.clone().unwrap_or_default(),
                };
                self.emit(login);
            }
            ServerEvent::ReconnectAttempt { attempt } if state.is_live() => {
                tracing::info!(generation = self.generation, attempt, "Reconnecting");
                self.session.reconnect_attempts_used = attempt;
            }
            ServerEvent::ConnectionEstablished { client_id } if state.is_live() => {
                tracing::debug!(generation = self.generation, client_id = %client_id, "Server greeting");
                self.session.client_id = Some(client_id);
            }
            ServerEvent::LoginSuccess if state == SessionState::AwaitingLogin => {
                let nickname = self.session.pending_nickname.take().unwrap_or_default();
                let identity = UserIdentity::new(nickname);
                self.session.identity = Some(identity.clone());
                self.transition(SessionState::Authenticated);
                self.notifier.notify(Notification::SessionReady { identity });
                self.timer = Some(SessionTimer {
                    deadline: now + self.timings.view_swap_delay,
                    kind: TimerKind::ViewSwap,
                });
            }
            ServerEvent::LoginError { message } if state == SessionState::AwaitingLogin => {
                tracing::info!(generation = self.generation, message = ?message, "Login rejected");
                self.teardown();
                self.transition(SessionState::Disconnected);
                self.notifier.notify(Notification::LoginFailed {
                    kind: FailureKind::Protocol,
                    message: message.unwrap_or_else(|| LOGIN_REJECTED_FALLBACK.to_string()),
                    detail: None,
                });
            }
            ServerEvent::NewMessage(payload) if self.forwards_traffic() => {
                let message = InboundMessage::from(payload);
                let is_own = self.own_nickname() == Some(message.sender.as_str());
                let content = self.renderer.render(&message);
                self.notifier
                    .notify(Notification::Message(DisplayMessage { content, is_own }));
            }
            ServerEvent::UserJoined { message } | ServerEvent::UserLeft { message }
                if self.forwards_traffic() =>
            {
                self.notifier.notify(Notification::SystemNotice {
                    html: system_notice_html(&message),
                    text: message,
                });
            }
            ServerEvent::UsersList { users } if self.forwards_traffic() => {
                let snapshot = PresenceSnapshot::new(users, self.own_nickname());
                self.notifier.notify(Notification::Presence(snapshot));
            }
            ServerEvent::Disconnect { reason } => match state {
                SessionState::LoggingOut => {
                    tracing::debug!(generation = self.generation, reason = %reason, "Disconnect during logout");
                }
                SessionState::Connecting | SessionState::AwaitingLogin | SessionState::Authenticated => {
                    tracing::warn!(generation = self.generation, reason = %reason, "Connection lost");
                    self.teardown();
                    self.transition(SessionState::Disconnected);
                    self.notifier.notify(Notification::UnexpectedDisconnect {
                        reason,
                        message: CONNECTION_LOST_MESSAGE.to_string(),
                    });
                }
                SessionState::Idle | SessionState::Disconnected => {
                    tracing::debug!(reason = %reason, "Disconnect without a session");
                }
            },
            ServerEvent::ConnectError { error } => match state {
                SessionState::LoggingOut => {
                    tracing::debug!(generation = self.generation, error = %error, "Connect error during logout");
                }
                SessionState::Connecting | SessionState::AwaitingLogin | SessionState::Authenticated => {
                    tracing::warn!(generation = self.generation, error = %error, "Connection failed");
                    self.teardown();
                    self.transition(SessionState::Disconnected);
                    self.notifier.notify(Notification::LoginFailed {
                        kind: FailureKind::Transport,
                        message: CONNECTION_FAILED_MESSAGE.to_string(),
                        detail: Some(error),
                    });
                }
                SessionState::Idle | SessionState::Disconnected => {
                    tracing::debug!(error = %error, "Connect error without a session");
                }
            },
            other => {
                tracing::debug!(state = ?state, event = ?other, "Ignoring event in this state");
            }
        }
    }

    /// Begin logging out. From `Authenticated` this sends `logout` and
    /// schedules the teardown after the grace period, without waiting for
    /// any acknowledgment. A session still connecting is closed at once.
    pub fn logout(&mut self, now: Instant) {
        match self.session.state {
            SessionState::Authenticated => {
                self.transition(SessionState::LoggingOut);
                self.emit(ClientEvent::Logout);
                self.timer = Some(SessionTimer {
                    deadline: now + self.timings.logout_grace,
                    kind: TimerKind::LogoutTeardown,
                });
            }
            SessionState::Connecting | SessionState::AwaitingLogin => {
                tracing::info!(generation = self.generation, "Abandoning login");
                self.teardown();
                self.transition(SessionState::Disconnected);
            }
            state => tracing::debug!(state = ?state, "Logout ignored"),
        }
    }

    /// Close any live session immediately, skipping the logout grace.
    pub fn abort(&mut self) {
        if self.session.state.is_live() {
            self.teardown();
            self.transition(SessionState::Disconnected);
        }
    }

    /// Send a chat message. Returns whether anything was sent: empty text,
    /// a session that is not `Authenticated`, or a missing transport make
    /// this a silent no-op.
    pub fn send_message(&mut self, text: &str) -> bool {
        let text = text.trim();
        if text.is_empty() || self.session.state != SessionState::Authenticated {
            return false;
        }
        let Some(transport) = self.session.transport.as_mut() else {
            return false;
        };
        match transport.emit(ClientEvent::SendMessage {
            message: text.to_string(),
        }) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(generation = self.generation, error = %e, "Failed to send message");
                false
            }
        }
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.timer.map(|t| t.deadline)
    }

    pub fn pending_timer(&self) -> Option<SessionTimer> {
        self.timer
    }

    /// Run the pending timer if its deadline has passed.
    pub fn fire_timers(&mut self, now: Instant) {
        let Some(timer) = self.timer else {
            return;
        };
        if timer.deadline > now {
            return;
        }
        self.timer = None;
        match (timer.kind, self.session.state) {
            (TimerKind::ViewSwap, SessionState::Authenticated) => {
                self.notifier.notify(Notification::ChatViewReady);
            }
            (TimerKind::LogoutTeardown, SessionState::LoggingOut) => {
                tracing::info!(generation = self.generation, "Logout complete");
                self.teardown();
                self.transition(SessionState::Disconnected);
            }
            (kind, state) => tracing::debug!(?kind, ?state, "Stale timer"),
        }
    }

    fn forwards_traffic(&self) -> bool {
        matches!(
            self.session.state,
            SessionState::AwaitingLogin | SessionState::Authenticated | SessionState::LoggingOut
        )
    }

    fn own_nickname(&self) -> Option<&str> {
        self.session
            .identity
            .as_ref()
            .map(|i| i.nickname.as_str())
            .or(self.session.pending_nickname.as_deref())
    }

    fn emit(&mut self, event: ClientEvent) {
        let name = event.name();
        match self.session.transport.as_mut() {
            Some(transport) => {
                if let Err(e) = transport.emit(event) {
                    tracing::warn!(generation = self.generation, event = name, error = %e, "Emit failed");
                }
            }
            None => tracing::debug!(event = name, "No transport to emit on"),
        }
    }

    /// Close the transport and forget the identity and any timer.
    fn teardown(&mut self) {
        if let Some(mut transport) = self.session.transport.take() {
            transport.close();
        }
        self.session.identity = None;
        self.session.pending_nickname = None;
        self.timer = None;
    }

    fn transition(&mut self, to: SessionState) {
        let from = self.session.state;
        if from == to {
            return;
        }
        self.session.state = to;
        tracing::info!(generation = self.generation, ?from, ?to, "Session state changed");
        self.notifier.notify(Notification::StateChanged { from, to });
    }
}
