//! Error taxonomy for the client core.
//!
//! Nothing here is fatal to the process. Validation, session and transport
//! open errors are returned to the caller. A rejected login only reaches the
//! shell as a `login_failed` notification; catalog and storage failures are
//! resolved to a default value and logged.

use crate::session::SessionState;

/// Input rejected before any network action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("nickname must not be empty")]
    EmptyNickname,
    #[error("server address must not be empty")]
    EmptyServerAddress,
}

/// Preference persistence failures.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("preference file i/o failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("preference value could not be serialized: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The write would grow the medium past its byte limit.
    #[error("preference quota exceeded ({needed} bytes needed, limit {limit})")]
    QuotaExceeded { limit: usize, needed: usize },
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A session is already live; it must reach `Disconnected` first.
    #[error("a session is already active (state: {state:?})")]
    SessionActive { state: SessionState },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("could not load configuration: {0}")]
    ConfigLoad(String),

    /// The session driver task is gone.
    #[error("session driver has shut down")]
    DriverClosed,
}

impl From<dapai_sdk::error::TransportError> for ClientError {
    fn from(e: dapai_sdk::error::TransportError) -> Self {
        ClientError::Transport(e.to_string())
    }
}
