//! Server catalog: the list of servers a user can pick at login.
//!
//! The list is fetched from a JSON document next to the client's origin:
//!
//! ```json
//! { "servers": [ { "name": "Lobby", "address": "http://10.0.0.5:5000" } ] }
//! ```
//!
//! Loading never fails outward. Any problem (network, status, body, or an
//! empty list) yields a single fallback entry pointing at the origin itself.

use std::time::Duration;

use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::config::ClientConfig;
use crate::error::ClientError;

/// Display name of the fallback entry.
pub const FALLBACK_SERVER_NAME: &str = "Default server";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerDescriptor {
    pub name: String,
    pub address: String,
}

#[derive(Debug, Default, Deserialize)]
struct CatalogDocument {
    #[serde(default)]
    servers: Vec<ServerDescriptor>,
}

pub struct ServerCatalog {
    http: reqwest::Client,
    origin: String,
    url: Option<Url>,
    servers: Vec<ServerDescriptor>,
}

impl ServerCatalog {
    pub fn new(origin: &str, catalog_path: &str, timeout: Duration) -> Self {
        let url = Url::parse(origin)
            .and_then(|base| base.join(catalog_path))
            .map_err(|e| tracing::warn!(origin, catalog_path, error = %e, "Invalid catalog URL"))
            .ok();
        let http = match reqwest::Client::builder().timeout(timeout).build() {
            Ok(http) => http,
            Err(e) => {
                tracing::warn!(error = %e, "Can't configure catalog HTTP client, using defaults");
                reqwest::Client::new()
            }
        };
        Self {
            http,
            origin: origin.to_string(),
            url,
            servers: Vec::new(),
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(&config.origin, &config.catalog_path, config.catalog_timeout())
    }

    pub fn url(&self) -> Option<&Url> {
        self.url.as_ref()
    }

    /// Fetch the catalog, replacing the cached list wholesale. Always
    /// returns at least one descriptor.
    pub async fn load(&mut self) -> &[ServerDescriptor] {
        self.servers = match self.fetch().await {
            Ok(servers) if !servers.is_empty() => {
                tracing::info!(count = servers.len(), "Loaded server catalog");
                servers
            }
            Ok(_) => {
                tracing::warn!("Server catalog is empty, using the default server");
                vec![self.fallback()]
            }
            Err(e) => {
                tracing::warn!(error = %e, "Using the default server");
                vec![self.fallback()]
            }
        };
        &self.servers
    }

    async fn fetch(&self) -> Result<Vec<ServerDescriptor>, ClientError> {
        let url = self
            .url
            .clone()
            .ok_or_else(|| ClientError::ConfigLoad(format!("no catalog URL for origin {}", self.origin)))?;
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| ClientError::ConfigLoad(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::ConfigLoad(format!("catalog request returned {status}")));
        }
        let document: CatalogDocument = response
            .json()
            .await
            .map_err(|e| ClientError::ConfigLoad(format!("malformed catalog: {e}")))?;
        Ok(document.servers)
    }

    fn fallback(&self) -> ServerDescriptor {
        ServerDescriptor {
            name: FALLBACK_SERVER_NAME.to_string(),
            address: self.origin.clone(),
        }
    }

    /// The list from the last [`load`](Self::load); empty before the first.
    pub fn servers(&self) -> &[ServerDescriptor] {
        &self.servers
    }

    pub fn find_by_address(&self, address: &str) -> Option<&ServerDescriptor> {
        self.servers.iter().find(|s| s.address == address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one canned HTTP response and return the origin to use.
    async fn serve_once(status: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let mut request = Vec::new();
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            let response = format!(
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            let _ = socket.shutdown().await;
        });
        format!("http://{addr}")
    }

    fn catalog(origin: &str) -> ServerCatalog {
        ServerCatalog::new(origin, "config/server_config.json", Duration::from_secs(5))
    }

    #[test]
    fn test_catalog_url_joins_origin() {
        let catalog = catalog("http://localhost:5000");
        assert_eq!(
            catalog.url().unwrap().as_str(),
            "http://localhost:5000/config/server_config.json"
        );
    }

    #[tokio::test]
    async fn test_load_servers() {
        let origin = serve_once(
            "200 OK",
            r#"{"servers":[{"name":"Lobby","address":"http://10.0.0.5:5000"},{"name":"Backup","address":"http://10.0.0.6:5000"}]}"#,
        )
        .await;
        let mut catalog = catalog(&origin);
        let servers = catalog.load().await.to_vec();
        assert_eq!(servers.len(), 2);
        assert_eq!(servers[0].name, "Lobby");
        assert_eq!(
            catalog.find_by_address("http://10.0.0.6:5000").map(|s| s.name.as_str()),
            Some("Backup")
        );
        assert!(catalog.find_by_address("http://nowhere").is_none());
    }

    #[tokio::test]
    async fn test_fetch_failure_falls_back_to_origin() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let origin = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let mut catalog = catalog(&origin);
        let servers = catalog.load().await;
        assert_eq!(servers.len(), 1);
        assert_eq!(servers[0].address, origin);
        assert_eq!(servers[0].name, FALLBACK_SERVER_NAME);
    }

    #[tokio::test]
    async fn test_error_status_falls_back() {
        let origin = serve_once("404 Not Found", "{}").await;
        let mut catalog = catalog(&origin);
        assert_eq!(catalog.load().await.len(), 1);
        assert_eq!(catalog.servers()[0].address, origin);
    }

    #[tokio::test]
    async fn test_malformed_body_falls_back() {
        let origin = serve_once("200 OK", "<html>oops</html>").await;
        let mut catalog = catalog(&origin);
        assert_eq!(catalog.load().await[0].address, origin);
    }

    #[tokio::test]
    async fn test_missing_servers_key_falls_back() {
        let origin = serve_once("200 OK", r#"{"other":true}"#).await;
        let mut catalog = catalog(&origin);
        let servers = catalog.load().await;
        assert_eq!(servers.len(), 1);
        assert_eq!(servers[0].name, FALLBACK_SERVER_NAME);
    }
}
