//! Connection tests against an in-process Socket.IO server over websocket.
//!
//! Tests cover:
//! - Handshake, namespace connect and the connection_established greeting
//! - Events emitted before the connection opens are flushed after `Open`
//! - Request/response round trips for login and send_message
//! - Server-side and client-side disconnect reasons
//! - CONNECT_ERROR rejection and the retry budget against a closed port

use std::time::Duration;

use axum::Router;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use axum::routing::get;
use serde_json::{Value, json};
use tokio::sync::mpsc;

use dapai_sdk::client::{TransportKind, TransportOptions, connect};
use dapai_sdk::event::{ClientEvent, ServerEvent};

const OPEN: &str =
    r#"0{"sid":"ws-1","upgrades":[],"pingInterval":25000,"pingTimeout":20000,"maxPayload":1000000}"#;

/// Canned server behaviour, one engine frame in, zero or more frames out.
fn respond(frame: &str) -> Vec<String> {
    match frame {
        "40" => vec![
            r#"40{"sid":"sock-1"}"#.to_string(),
            r#"42["connection_established",{"client_id":"c-1"}]"#.to_string(),
        ],
        "40/private," => vec![r#"44/private,{"message":"not allowed"}"#.to_string()],
        "2" => vec!["3".to_string()],
        _ => {
            let Some(body) = frame.strip_prefix("42") else {
                return Vec::new();
            };
            let Ok(packet) = serde_json::from_str::<Value>(body) else {
                return Vec::new();
            };
            match packet[0].as_str() {
                Some("login") => vec![r#"42["login_success"]"#.to_string()],
                Some("send_message") => vec![format!(
                    "42{}",
                    json!(["new_message", {
                        "sender": packet[1]["nickname"].as_str().unwrap_or("ann"),
                        "message": packet[1]["message"],
                        "timestamp": "2024-01-01 10:00:00",
                        "type": "text",
                    }])
                )],
                Some("logout") => vec!["41".to_string()],
                _ => Vec::new(),
            }
        }
    }
}

async fn upgrade(ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(serve_socket)
}

async fn serve_socket(mut socket: WebSocket) {
    if socket.send(Message::Text(OPEN.into())).await.is_err() {
        return;
    }
    while let Some(Ok(message)) = socket.recv().await {
        let Message::Text(text) = message else {
            continue;
        };
        for reply in respond(text.as_str()) {
            if socket.send(Message::Text(reply.into())).await.is_err() {
                return;
            }
        }
    }
}

async fn spawn_server() -> String {
    let app = Router::new().route("/socket.io/", get(upgrade));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

async fn next(rx: &mut mpsc::Receiver<ServerEvent>) -> ServerEvent {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

fn websocket_only() -> TransportOptions {
    TransportOptions {
        transports: vec![TransportKind::Websocket],
        ..TransportOptions::default()
    }
}

#[tokio::test]
async fn connects_and_receives_greeting() {
    let address = spawn_server().await;
    let (_handle, mut events) = connect(&address, websocket_only()).unwrap();

    assert_eq!(next(&mut events).await, ServerEvent::Open);
    assert_eq!(
        next(&mut events).await,
        ServerEvent::ConnectionEstablished {
            client_id: "c-1".to_string()
        }
    );
}

#[tokio::test]
async fn queued_login_is_sent_after_open() {
    let address = spawn_server().await;
    let (handle, mut events) = connect(&address, websocket_only()).unwrap();
    handle
        .emit(ClientEvent::Login {
            nickname: "ann".to_string(),
            server_address: address.clone(),
        })
        .unwrap();

    assert_eq!(next(&mut events).await, ServerEvent::Open);
    assert!(matches!(
        next(&mut events).await,
        ServerEvent::ConnectionEstablished { .. }
    ));
    assert_eq!(next(&mut events).await, ServerEvent::LoginSuccess);
}

#[tokio::test]
async fn send_message_round_trip() {
    let address = spawn_server().await;
    let (handle, mut events) = connect(&address, websocket_only()).unwrap();
    assert_eq!(next(&mut events).await, ServerEvent::Open);
    let _greeting = next(&mut events).await;

    handle
        .emit(ClientEvent::SendMessage {
            message: "hello <there>".to_string(),
        })
        .unwrap();

    let ServerEvent::NewMessage(payload) = next(&mut events).await else {
        panic!("expected new_message");
    };
    assert_eq!(payload.message, "hello <there>");
    assert_eq!(payload.kind, "text");
    assert_eq!(payload.timestamp, json!("2024-01-01 10:00:00"));
}

#[tokio::test]
async fn server_disconnect_after_logout() {
    let address = spawn_server().await;
    let (handle, mut events) = connect(&address, websocket_only()).unwrap();
    assert_eq!(next(&mut events).await, ServerEvent::Open);
    let _greeting = next(&mut events).await;

    handle.emit(ClientEvent::Logout).unwrap();
    assert_eq!(
        next(&mut events).await,
        ServerEvent::Disconnect {
            reason: "io server disconnect".to_string()
        }
    );
    // The connection task is finished.
    assert!(events.recv().await.is_none());
}

#[tokio::test]
async fn client_close_reports_disconnect() {
    let address = spawn_server().await;
    let (handle, mut events) = connect(&address, websocket_only()).unwrap();
    assert_eq!(next(&mut events).await, ServerEvent::Open);
    let _greeting = next(&mut events).await;

    handle.close();
    assert_eq!(
        next(&mut events).await,
        ServerEvent::Disconnect {
            reason: "io client disconnect".to_string()
        }
    );
}

#[tokio::test]
async fn rejected_namespace_exhausts_budget() {
    let address = spawn_server().await;
    let options = TransportOptions {
        reconnection_attempts: 0,
        ..websocket_only()
    };
    let (_handle, mut events) = connect(&format!("{address}/private"), options).unwrap();

    let ServerEvent::ConnectError { error } = next(&mut events).await else {
        panic!("expected connect_error");
    };
    assert!(error.contains("not allowed"), "unexpected error: {error}");
}

#[tokio::test]
async fn retry_budget_against_closed_port() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let options = TransportOptions {
        reconnection_attempts: 3,
        reconnection_delay: Duration::from_millis(20),
        timeout: Duration::from_secs(2),
        transports: vec![TransportKind::Websocket, TransportKind::Polling],
    };
    let (_handle, mut events) = connect(&format!("http://{addr}"), options).unwrap();

    for attempt in 1..=3 {
        assert_eq!(
            next(&mut events).await,
            ServerEvent::ReconnectAttempt { attempt }
        );
    }
    assert!(matches!(
        next(&mut events).await,
        ServerEvent::ConnectError { .. }
    ));
    assert!(events.recv().await.is_none());
}
