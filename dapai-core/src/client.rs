//! ChatClient: everything a UI shell needs, wired together.
//!
//! ```no_run
//! # async fn demo() -> Result<(), dapai_core::error::ClientError> {
//! use dapai_core::client::ChatClient;
//! use dapai_core::config::ClientConfig;
//!
//! let (mut client, mut notifications) = ChatClient::start(ClientConfig::load());
//! let view = client.startup().await;
//! if let Some(server) = &view.login.server_address {
//!     client.session().connect(server, "ann").await?;
//! }
//! while let Some(envelope) = notifications.recv().await {
//!     println!("{}", serde_json::to_string(&envelope).unwrap_or_default());
//! }
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::bridge::{LoginDefaults, SessionPreferences, Theme};
use crate::catalog::{ServerCatalog, ServerDescriptor};
use crate::config::ClientConfig;
use crate::driver::{self, SessionHandle};
use crate::envelope::{EventEnvelope, Notifier};
use crate::manager::ConnectionManager;
use crate::prefs::{FileMedium, PreferenceMedium, PreferenceStore};
use crate::render::MessageRenderer;
use crate::transport::{Connector, SdkConnector};

/// Everything the login view needs at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StartupView {
    pub servers: Vec<ServerDescriptor>,
    pub login: LoginDefaults,
    pub theme: Theme,
}

pub struct ChatClient {
    config: ClientConfig,
    catalog: ServerCatalog,
    prefs: Arc<Mutex<SessionPreferences>>,
    session: SessionHandle,
    driver: JoinHandle<()>,
}

impl ChatClient {
    /// Start with the real transport and the per-origin preference file.
    /// Must be called from within a tokio runtime.
    pub fn start(config: ClientConfig) -> (Self, mpsc::UnboundedReceiver<EventEnvelope>) {
        let connector = SdkConnector::new(config.transport_options());
        let medium = FileMedium::for_origin(&config.origin);
        Self::start_with(config, connector, medium)
    }

    pub fn start_with(
        config: ClientConfig,
        connector: impl Connector + 'static,
        medium: impl PreferenceMedium + 'static,
    ) -> (Self, mpsc::UnboundedReceiver<EventEnvelope>) {
        let (notifier, notifications) = Notifier::channel();
        let manager = ConnectionManager::new(
            connector,
            MessageRenderer::new(config.resolver_base.clone()),
            config.session_timings(),
            notifier,
        );
        let prefs = Arc::new(Mutex::new(SessionPreferences::new(PreferenceStore::new(medium))));
        let (session, driver) = driver::spawn(manager, Some(prefs.clone()));
        tracing::info!(origin = %config.origin, "Chat client started");

        let client = Self {
            catalog: ServerCatalog::from_config(&config),
            config,
            prefs,
            session,
            driver,
        };
        (client, notifications)
    }

    /// Load the server catalog and the saved login and theme choices.
    pub async fn startup(&mut self) -> StartupView {
        let servers = self.catalog.load().await.to_vec();
        let prefs = self.prefs.lock();
        StartupView {
            login: prefs.login_defaults(&servers),
            theme: prefs.theme(),
            servers,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    pub fn catalog(&self) -> &ServerCatalog {
        &self.catalog
    }

    pub fn theme(&self) -> Theme {
        self.prefs.lock().theme()
    }

    /// Flip and persist the theme; returns the new one.
    pub fn toggle_theme(&self) -> Theme {
        self.prefs.lock().toggle_theme()
    }

    /// Log out (waiting for the teardown) and stop the driver.
    pub async fn shutdown(self) {
        if let Err(e) = self.session.shutdown().await {
            tracing::debug!(error = %e, "Driver already stopped");
        }
        if let Err(e) = self.driver.await {
            tracing::warn!(error = %e, "Session driver task failed");
        }
    }
}
