//! Websocket transport: one Engine.IO packet per text frame.

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::endpoint::Endpoint;
use crate::error::TransportError;
use crate::packet::{EnginePacket, Handshake};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub(crate) struct WebsocketLink {
    sink: SplitSink<WsStream, Message>,
    stream: SplitStream<WsStream>,
}

/// Open the websocket and read the Engine.IO `open` packet.
pub(crate) async fn open(endpoint: &Endpoint) -> Result<(WebsocketLink, Handshake), TransportError> {
    tracing::debug!(url = %endpoint.websocket, "Opening websocket");
    let (ws, _) = tokio_tungstenite::connect_async(endpoint.websocket.as_str()).await?;
    let (sink, stream) = ws.split();
    let mut link = WebsocketLink { sink, stream };

    match link.recv().await? {
        Some(EnginePacket::Open(handshake)) => {
            tracing::debug!(sid = %handshake.sid, "Websocket handshake received");
            Ok((link, handshake))
        }
        Some(other) => Err(TransportError::Handshake(format!(
            "expected open packet, got {other:?}"
        ))),
        None => Err(TransportError::Handshake(
            "websocket closed before the open packet".to_string(),
        )),
    }
}

impl WebsocketLink {
    pub(crate) async fn send(&mut self, packet: &EnginePacket) -> Result<(), TransportError> {
        self.sink.send(Message::Text(packet.encode())).await?;
        Ok(())
    }

    /// Next engine packet, or `None` once the socket is closed.
    pub(crate) async fn recv(&mut self) -> Result<Option<EnginePacket>, TransportError> {
        while let Some(message) = self.stream.next().await {
            match message? {
                Message::Text(text) => return EnginePacket::decode(&text).map(Some),
                Message::Close(_) => return Ok(None),
                Message::Binary(_) => {
                    return Err(TransportError::Packet(
                        "binary websocket frames are not supported".to_string(),
                    ));
                }
                // Control frames are answered by tungstenite itself.
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
            }
        }
        Ok(None)
    }

    pub(crate) async fn close(&mut self) {
        let _ = self.sink.send(Message::Close(None)).await;
        let _ = self.sink.close().await;
    }
}
