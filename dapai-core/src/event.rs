//! Notifications delivered to the UI shell.
//!
//! Serialized with `#[serde(tag = "type", content = "data")]` so a shell can
//! switch on `type` and decode `data` accordingly.

use serde::Serialize;

use crate::presence::PresenceSnapshot;
use crate::render::RenderedContent;
use crate::session::{SessionState, UserIdentity};

/// Shown when `login_error` carries no message.
pub const LOGIN_REJECTED_FALLBACK: &str = "Login failed, please try again";
/// Shown when the connection could not be established.
pub const CONNECTION_FAILED_MESSAGE: &str = "Could not connect to the server, check the address";
/// Shown when an established connection drops.
pub const CONNECTION_LOST_MESSAGE: &str = "Connection to the server was lost";

/// Which side refused a login.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The server answered with `login_error`.
    Protocol,
    /// No connection could be made.
    Transport,
}

/// A rendered chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisplayMessage {
    #[serde(flatten)]
    pub content: RenderedContent,
    /// Sent by the local user.
    pub is_own: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Notification {
    StateChanged {
        from: SessionState,
        to: SessionState,
    },
    SessionReady {
        identity: UserIdentity,
    },
    /// The view-swap delay after login has elapsed.
    ChatViewReady,
    LoginFailed {
        kind: FailureKind,
        message: String,
        detail: Option<String>,
    },
    UnexpectedDisconnect {
        reason: String,
        message: String,
    },
    Message(DisplayMessage),
    /// Join/leave notice. `text` is verbatim from the server, `html` its
    /// escaped paragraph form.
    SystemNotice {
        text: String,
        html: String,
    },
    Presence(PresenceSnapshot),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_changed_serialization() {
        let event = Notification::StateChanged {
            from: SessionState::AwaitingLogin,
            to: SessionState::Authenticated,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "state_changed");
        assert_eq!(json["data"]["from"], "awaiting_login");
        assert_eq!(json["data"]["to"], "authenticated");
    }

    #[test]
    fn test_unit_variant_has_no_data() {
        let json = serde_json::to_value(Notification::ChatViewReady).unwrap();
        assert_eq!(json["type"], "chat_view_ready");
        assert!(json.get("data").is_none());
    }

    #[test]
    fn test_login_failed_serialization() {
        let event = Notification::LoginFailed {
            kind: FailureKind::Transport,
            message: CONNECTION_FAILED_MESSAGE.to_string(),
            detail: Some("connection refused".to_string()),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "login_failed");
        assert_eq!(json["data"]["kind"], "transport");
        assert_eq!(json["data"]["detail"], "connection refused");
    }

    #[test]
    fn test_message_is_flattened() {
        let content = crate::render::MessageRenderer::default().render(&crate::message::InboundMessage {
            sender: "bob".to_string(),
            message: "hi".to_string(),
            timestamp: 0,
            kind: crate::message::MessageKind::Plain,
        });
        let json = serde_json::to_value(Notification::Message(DisplayMessage {
            content,
            is_own: false,
        }))
        .unwrap();
        assert_eq!(json["type"], "message");
        assert_eq!(json["data"]["sender"], "bob");
        assert_eq!(json["data"]["is_own"], false);
        assert_eq!(json["data"]["fragments"][0]["kind"], "text");
        assert_eq!(json["data"]["kind"]["type"], "plain");
    }
}
