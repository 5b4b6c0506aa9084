//! Session data: state, identity and login requests.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::transport::Transport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Connecting,
    AwaitingLogin,
    Authenticated,
    LoggingOut,
    Disconnected,
}

impl SessionState {
    /// A session in this state owns a transport.
    pub fn is_live(self) -> bool {
        !matches!(self, SessionState::Idle | SessionState::Disconnected)
    }
}

/// First two characters of `nickname`, upper-cased.
pub fn avatar_text(nickname: &str) -> String {
    nickname.chars().take(2).flat_map(char::to_uppercase).collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub nickname: String,
    pub avatar_text: String,
}

impl UserIdentity {
    pub fn new(nickname: impl Into<String>) -> Self {
        let nickname = nickname.into();
        let avatar_text = avatar_text(&nickname);
        Self {
            nickname,
            avatar_text,
        }
    }
}

/// A validated login: both fields trimmed and non-empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginRequest {
    pub server_address: String,
    pub nickname: String,
}

impl LoginRequest {
    pub fn new(server_address: &str, nickname: &str) -> Result<Self, ValidationError> {
        let nickname = nickname.trim();
        let server_address = server_address.trim();
        if nickname.is_empty() {
            return Err(ValidationError::EmptyNickname);
        }
        if server_address.is_empty() {
            return Err(ValidationError::EmptyServerAddress);
        }
        Ok(Self {
            server_address: server_address.to_string(),
            nickname: nickname.to_string(),
        })
    }
}

/// Delays the state machine waits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTimings {
    /// Wait after sending `logout` before the transport is force-closed.
    pub logout_grace: Duration,
    /// Wait after `login_success` before the chat view is announced.
    pub view_swap_delay: Duration,
}

impl Default for SessionTimings {
    fn default() -> Self {
        Self {
            logout_grace: Duration::from_millis(500),
            view_swap_delay: Duration::from_millis(100),
        }
    }
}

/// One connection lifecycle, owned by the `ConnectionManager`.
pub struct Session {
    pub state: SessionState,
    /// Set on `login_success`, cleared on teardown.
    pub identity: Option<UserIdentity>,
    /// Nickname sent with `login`, before the server accepted it.
    pub pending_nickname: Option<String>,
    pub server_address: Option<String>,
    pub reconnect_attempts_used: u32,
    /// Greeting id from `connection_established`.
    pub client_id: Option<String>,
    /// Which `connect()` this session belongs to.
    pub generation: u64,
    pub(crate) transport: Option<Box<dyn Transport>>,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            state: SessionState::Idle,
            identity: None,
            pending_nickname: None,
            server_address: None,
            reconnect_attempts_used: 0,
            client_id: None,
            generation: 0,
            transport: None,
        }
    }
}

impl Session {
    /// A read-only copy for callers outside the manager.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state,
            identity: self.identity.clone(),
            server_address: self.server_address.clone(),
            reconnect_attempts_used: self.reconnect_attempts_used,
            client_id: self.client_id.clone(),
            generation: self.generation,
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state)
            .field("identity", &self.identity)
            .field("server_address", &self.server_address)
            .field("generation", &self.generation)
            .field("has_transport", &self.transport.is_some())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub identity: Option<UserIdentity>,
    pub server_address: Option<String>,
    pub reconnect_attempts_used: u32,
    pub client_id: Option<String>,
    pub generation: u64,
}
