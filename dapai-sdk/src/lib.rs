//! Client transport for the dapai chat protocol.
//!
//! The server speaks Socket.IO (v5 packets inside Engine.IO v4 framing).
//! This crate opens the persistent connection, preferring a websocket and
//! falling back to HTTP long-polling, applies the connection retry budget,
//! and exposes the chat protocol as typed events:
//!
//! - [`client::connect`] returns a [`client::ClientHandle`] for outbound
//!   [`event::ClientEvent`]s and a receiver of inbound [`event::ServerEvent`]s.
//! - [`packet`] holds the wire codec; [`endpoint`] derives the transport URLs
//!   from a server address.

pub mod client;
pub mod endpoint;
pub mod error;
pub mod event;
pub mod packet;

mod polling;
mod websocket;
