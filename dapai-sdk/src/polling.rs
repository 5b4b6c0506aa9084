//! HTTP long-polling transport.
//!
//! A background task keeps one GET outstanding and forwards the decoded
//! packets over a channel, so reading stays cancel-safe inside `select!`.
//! Outbound packets are POSTed one request per packet.

use reqwest::Url;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::endpoint::Endpoint;
use crate::error::TransportError;
use crate::packet::{self, EnginePacket, Handshake};

pub(crate) struct PollingLink {
    http: reqwest::Client,
    session_url: Url,
    inbound: mpsc::Receiver<Result<EnginePacket, String>>,
    reader: JoinHandle<()>,
}

/// Perform the polling handshake. Returns the link, the handshake and any
/// packets that arrived in the same response as the `open` packet.
pub(crate) async fn open(
    endpoint: &Endpoint,
) -> Result<(PollingLink, Handshake, Vec<EnginePacket>), TransportError> {
    tracing::debug!(url = %endpoint.polling, "Opening polling transport");
    let http = reqwest::Client::new();
    let body = http
        .get(endpoint.polling.clone())
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?;

    let mut packets = packet::decode_payload(&body)?.into_iter();
    let handshake = match packets.next() {
        Some(EnginePacket::Open(handshake)) => handshake,
        other => {
            return Err(TransportError::Handshake(format!(
                "expected open packet, got {other:?}"
            )));
        }
    };
    let extra: Vec<EnginePacket> = packets.collect();
    tracing::debug!(sid = %handshake.sid, "Polling handshake received");

    let session_url = endpoint.polling_session(&handshake.sid);
    let (tx, inbound) = mpsc::channel(256);
    let reader = tokio::spawn(poll_loop(http.clone(), session_url.clone(), tx));

    Ok((
        PollingLink {
            http,
            session_url,
            inbound,
            reader,
        },
        handshake,
        extra,
    ))
}

async fn poll_loop(
    http: reqwest::Client,
    url: Url,
    tx: mpsc::Sender<Result<EnginePacket, String>>,
) {
    loop {
        let body = match fetch(&http, &url).await {
            Ok(body) => body,
            Err(e) => {
                let _ = tx.send(Err(e.to_string())).await;
                return;
            }
        };
        let packets = match packet::decode_payload(&body) {
            Ok(packets) => packets,
            Err(e) => {
                let _ = tx.send(Err(e.to_string())).await;
                return;
            }
        };
        for packet in packets {
            let closing = packet == EnginePacket::Close;
            if tx.send(Ok(packet)).await.is_err() || closing {
                return;
            }
        }
    }
}

async fn fetch(http: &reqwest::Client, url: &Url) -> Result<String, reqwest::Error> {
    http.get(url.clone())
        .send()
        .await?
        .error_for_status()?
        .text()
        .await
}

impl PollingLink {
    pub(crate) async fn send(&mut self, packet: &EnginePacket) -> Result<(), TransportError> {
        self.http
            .post(self.session_url.clone())
            .header(reqwest::header::CONTENT_TYPE, "text/plain;charset=UTF-8")
            .body(packet.encode())
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    pub(crate) async fn recv(&mut self) -> Result<Option<EnginePacket>, TransportError> {
        match self.inbound.recv().await {
            Some(Ok(packet)) => Ok(Some(packet)),
            Some(Err(reason)) => Err(TransportError::Poll(reason)),
            None => Ok(None),
        }
    }

    pub(crate) async fn close(&mut self) {
        let _ = self.send(&EnginePacket::Close).await;
        self.reader.abort();
    }
}

impl Drop for PollingLink {
    fn drop(&mut self) {
        self.reader.abort();
    }
}
