//! Client core for dapai chat.
//!
//! A UI shell drives this crate through a small surface:
//!
//! - [`client::ChatClient`] wires everything up and hands out a
//!   [`driver::SessionHandle`] plus a stream of [`envelope::EventEnvelope`]s.
//! - [`manager::ConnectionManager`] is the session state machine; the
//!   [`driver`] task feeds it commands, transport events and timers.
//! - [`render::MessageRenderer`] turns untrusted messages into escaped
//!   fragments.
//! - [`catalog::ServerCatalog`], [`prefs::PreferenceStore`] and
//!   [`bridge::SessionPreferences`] cover the login view.
//!
//! The wire protocol lives in `dapai_sdk`.

pub mod bridge;
pub mod catalog;
pub mod client;
pub mod config;
pub mod driver;
pub mod envelope;
pub mod error;
pub mod event;
pub mod logging;
pub mod manager;
pub mod message;
pub mod presence;
pub mod prefs;
pub mod render;
pub mod session;
pub mod transport;

pub use client::ChatClient;
pub use error::ClientError;
