//! The seam between the state machine and the wire.
//!
//! The manager only needs to emit events and close; opening a connection is
//! a separate [`Connector`] so tests can substitute a scripted transport.

use dapai_sdk::client::{self, ClientHandle, TransportOptions};
use dapai_sdk::error::TransportError;
use dapai_sdk::event::{ClientEvent, ServerEvent};
use tokio::sync::mpsc;

/// An open connection, exclusively owned by one session.
pub trait Transport: Send {
    fn emit(&mut self, event: ClientEvent) -> Result<(), TransportError>;
    /// Force-close. Must be idempotent.
    fn close(&mut self);
}

/// Opens transports.
pub trait Connector: Send {
    /// Start connecting to `server_address`. Progress and inbound traffic
    /// arrive on the returned receiver.
    fn open(
        &mut self,
        server_address: &str,
    ) -> Result<(Box<dyn Transport>, mpsc::Receiver<ServerEvent>), TransportError>;
}

impl Transport for ClientHandle {
    fn emit(&mut self, event: ClientEvent) -> Result<(), TransportError> {
        ClientHandle::emit(self, event)
    }

    fn close(&mut self) {
        ClientHandle::close(self);
    }
}

/// Connects through `dapai_sdk`.
#[derive(Debug, Clone, Default)]
pub struct SdkConnector {
    options: TransportOptions,
}

impl SdkConnector {
    pub fn new(options: TransportOptions) -> Self {
        Self { options }
    }
}

impl Connector for SdkConnector {
    fn open(
        &mut self,
        server_address: &str,
    ) -> Result<(Box<dyn Transport>, mpsc::Receiver<ServerEvent>), TransportError> {
        let (handle, events) = client::connect(server_address, self.options.clone())?;
        Ok((Box::new(handle), events))
    }
}
