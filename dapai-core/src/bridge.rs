//! Login and theme choices persisted between runs.

use serde::{Deserialize, Serialize};

use crate::catalog::ServerDescriptor;
use crate::prefs::PreferenceStore;
use crate::session::LoginRequest;

pub const THEME_KEY: &str = "dapai_chat_theme";
pub const LAST_NICKNAME_KEY: &str = "dapai_chat_nickname";
pub const LAST_SERVER_KEY: &str = "dapai_chat_server";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl Theme {
    pub fn toggled(self) -> Self {
        match self {
            Theme::Light => Theme::Dark,
            Theme::Dark => Theme::Light,
        }
    }
}

/// What the login view is pre-filled with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoginDefaults {
    pub nickname: String,
    /// Saved server if it is still in the catalog, else the first entry.
    pub server_address: Option<String>,
}

pub struct SessionPreferences {
    store: PreferenceStore,
}

impl SessionPreferences {
    pub fn new(store: PreferenceStore) -> Self {
        Self { store }
    }

    /// Record a login attempt that passed validation.
    pub fn remember_login(&mut self, request: &LoginRequest) {
        self.store.set(LAST_NICKNAME_KEY, request.nickname.as_str());
        self.store.set(LAST_SERVER_KEY, request.server_address.as_str());
    }

    pub fn last_nickname(&self) -> String {
        self.store.get(LAST_NICKNAME_KEY, String::new())
    }

    pub fn last_server(&self) -> Option<String> {
        self.store.get(LAST_SERVER_KEY, None)
    }

    pub fn login_defaults(&self, servers: &[ServerDescriptor]) -> LoginDefaults {
        let saved = self.last_server();
        let server_address = saved
            .filter(|address| servers.iter().any(|s| &s.address == address))
            .or_else(|| servers.first().map(|s| s.address.clone()));
        LoginDefaults {
            nickname: self.last_nickname(),
            server_address,
        }
    }

    pub fn theme(&self) -> Theme {
        self.store.get(THEME_KEY, Theme::Light)
    }

    pub fn set_theme(&mut self, theme: Theme) {
        self.store.set(THEME_KEY, &theme);
    }

    pub fn toggle_theme(&mut self) -> Theme {
        let theme = self.theme().toggled();
        self.set_theme(theme);
        theme
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prefs::MemoryMedium;

    fn catalog() -> Vec<ServerDescriptor> {
        vec![
            ServerDescriptor {
                name: "Lobby".to_string(),
                address: "http://10.0.0.5:5000".to_string(),
            },
            ServerDescriptor {
                name: "Backup".to_string(),
                address: "http://10.0.0.6:5000".to_string(),
            },
        ]
    }

    #[test]
    fn test_fresh_defaults() {
        let prefs = SessionPreferences::new(PreferenceStore::new(MemoryMedium::new()));
        let defaults = prefs.login_defaults(&catalog());
        assert_eq!(defaults.nickname, "");
        assert_eq!(defaults.server_address.as_deref(), Some("http://10.0.0.5:5000"));
        assert_eq!(prefs.theme(), Theme::Light);
        assert_eq!(prefs.login_defaults(&[]).server_address, None);
    }

    #[test]
    fn test_remembered_login_is_restored() {
        let medium = MemoryMedium::new();
        let mut prefs = SessionPreferences::new(PreferenceStore::new(medium.clone()));
        prefs.remember_login(&LoginRequest::new("http://10.0.0.6:5000", "ann").unwrap());
        assert_eq!(medium.raw(LAST_NICKNAME_KEY).as_deref(), Some("\"ann\""));

        let restored = SessionPreferences::new(PreferenceStore::new(medium));
        assert_eq!(
            restored.login_defaults(&catalog()),
            LoginDefaults {
                nickname: "ann".to_string(),
                server_address: Some("http://10.0.0.6:5000".to_string()),
            }
        );
    }

    #[test]
    fn test_unknown_saved_server_falls_back_to_first() {
        let mut prefs = SessionPreferences::new(PreferenceStore::new(MemoryMedium::new()));
        prefs.remember_login(&LoginRequest::new("http://gone:5000", "ann").unwrap());
        assert_eq!(
            prefs.login_defaults(&catalog()).server_address.as_deref(),
            Some("http://10.0.0.5:5000")
        );
    }

    #[test]
    fn test_theme_toggle_persists() {
        let medium = MemoryMedium::new();
        let mut prefs = SessionPreferences::new(PreferenceStore::new(medium.clone()));
        assert_eq!(prefs.toggle_theme(), Theme::Dark);
        assert_eq!(medium.raw(THEME_KEY).as_deref(), Some("\"dark\""));

        let restored = SessionPreferences::new(PreferenceStore::new(medium.clone()));
        assert_eq!(restored.theme(), Theme::Dark);

        medium.insert_raw(THEME_KEY, "\"purple\"");
        assert_eq!(restored.theme(), Theme::Light);
    }
}
