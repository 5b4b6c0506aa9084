//! Server address → transport endpoint URLs.
//!
//! A server address is the chat server's origin, e.g. `http://10.0.0.5:5000`.
//! A non-root path selects a Socket.IO namespace, the way browser clients
//! treat `io("http://host/ns")`. Both endpoints live under `/socket.io/`.

use reqwest::Url;

use crate::error::TransportError;
use crate::packet::DEFAULT_NAMESPACE;

/// Engine.IO protocol revision spoken by this client.
pub const ENGINE_IO_VERSION: &str = "4";

/// Resolved transport endpoints for one server address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// `http(s)://host[:port]/socket.io/?EIO=4&transport=polling`
    pub polling: Url,
    /// `ws(s)://host[:port]/socket.io/?EIO=4&transport=websocket`
    pub websocket: Url,
    pub namespace: String,
}

impl Endpoint {
    pub fn parse(address: &str) -> Result<Self, TransportError> {
        let invalid = |reason: String| TransportError::InvalidAddress {
            address: address.to_string(),
            reason,
        };

        let base = Url::parse(address.trim()).map_err(|e| invalid(e.to_string()))?;
        let (http_scheme, ws_scheme) = match base.scheme() {
            "http" | "ws" => ("http", "ws"),
            "https" | "wss" => ("https", "wss"),
            other => return Err(invalid(format!("unsupported scheme '{other}'"))),
        };
        let Some(host) = base.host_str() else {
            return Err(invalid("missing host".to_string()));
        };
        let authority = match base.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };

        let namespace = match base.path().trim_end_matches('/') {
            "" => DEFAULT_NAMESPACE.to_string(),
            path => path.to_string(),
        };

        // Url::set_scheme refuses http <-> ws swaps, so rebuild from the authority.
        let build = |scheme: &str, transport: &str| -> Result<Url, TransportError> {
            let mut url = Url::parse(&format!("{scheme}://{authority}/socket.io/"))
                .map_err(|e| invalid(e.to_string()))?;
            url.query_pairs_mut()
                .append_pair("EIO", ENGINE_IO_VERSION)
                .append_pair("transport", transport);
            Ok(url)
        };

        Ok(Self {
            polling: build(http_scheme, "polling")?,
            websocket: build(ws_scheme, "websocket")?,
            namespace,
        })
    }

    /// Polling URL bound to an Engine.IO session id.
    pub fn polling_session(&self, sid: &str) -> Url {
        let mut url = self.polling.clone();
        url.query_pairs_mut().append_pair("sid", sid);
        url
    }
}
