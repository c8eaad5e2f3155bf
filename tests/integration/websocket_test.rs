//! Result stream tests against a local WebSocket server.
//!
//! Exercises the real `HttpBackend` channel with the collector on top.

use std::time::Duration;

use fleet_probe::config::ServerConfig;
use fleet_probe::error::CollectionError;
use fleet_probe::fleet::{Campaign, HttpBackend, PayloadRule, ResultCollector, Session};
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::protocol::Message;

/// What the fake server does after reading the two client messages.
enum Script {
    Send(Vec<String>),
    SendThenClose(Vec<String>),
    Silent,
}

/// Starts a one-connection server; the handle yields the client messages it read.
async fn serve(script: Script) -> (u16, JoinHandle<Vec<Value>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let handle = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();

        let mut received: Vec<Value> = Vec::new();
        while received.len() < 2 {
            match ws.next().await {
                Some(Ok(Message::Text(text))) => {
                    received.push(serde_json::from_str(&text).unwrap())
                }
                Some(Ok(_)) => continue,
                _ => return received,
            }
        }

        match script {
            Script::Send(messages) => {
                for message in messages {
                    let _ = ws.send(Message::Text(message)).await;
                }
            }
            Script::SendThenClose(messages) => {
                for message in messages {
                    let _ = ws.send(Message::Text(message)).await;
                }
                let _ = ws.close(None).await;
            }
            Script::Silent => {}
        }

        // Drain until the client closes its side.
        while let Some(Ok(message)) = ws.next().await {
            if message.is_close() {
                break;
            }
        }
        received
    });

    (port, handle)
}

fn backend(port: u16) -> HttpBackend {
    HttpBackend::new(&ServerConfig {
        url: Some(format!("http://127.0.0.1:{port}")),
        ..Default::default()
    })
    .unwrap()
}

fn stream(rows: Value) -> Vec<String> {
    vec![
        json!({"type": "totals", "data": {"count": 1, "online": 1}}).to_string(),
        json!({"type": "status", "data": {"status": "pending"}}).to_string(),
        json!({"type": "result", "data": {"rows": rows}}).to_string(),
    ]
}

#[tokio::test]
async fn test_collects_rows_over_websocket() {
    let (port, server) = serve(Script::Send(stream(json!([
        {"path": "/usr/bin/ssh", "md5": "abc"}
    ]))))
    .await;
    let backend = backend(port);
    let session = Session::with_token("local", "tok-ws");

    let rows = ResultCollector::new(&backend, &session)
        .collect(&Campaign::Id(7))
        .await
        .unwrap();

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["path"], "/usr/bin/ssh");

    let received = server.await.unwrap();
    assert_eq!(
        received,
        vec![
            json!({"type": "auth", "data": {"token": "tok-ws"}}),
            json!({"type": "select_campaign", "data": {"campaign_id": 7}}),
        ]
    );
}

#[tokio::test]
async fn test_empty_rows_over_websocket() {
    let (port, server) = serve(Script::Send(stream(json!([])))).await;
    let backend = backend(port);
    let session = Session::with_token("local", "tok");

    let rows = ResultCollector::new(&backend, &session)
        .collect(&Campaign::Id(3))
        .await
        .unwrap();

    assert!(rows.is_empty());
    // The server task only finishes once the client closed the connection.
    tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("client did not close the stream")
        .unwrap();
}

#[tokio::test]
async fn test_server_close_before_payload() {
    let (port, _server) = serve(Script::SendThenClose(vec![
        json!({"type": "totals", "data": {"count": 1}}).to_string(),
    ]))
    .await;
    let backend = backend(port);
    let session = Session::with_token("local", "tok");

    let err = ResultCollector::new(&backend, &session)
        .collect(&Campaign::Id(3))
        .await
        .unwrap_err();

    assert!(err.to_string().starts_with("cannot get response from Fleet"));
}

#[tokio::test]
async fn test_silent_server_times_out() {
    let (port, server) = serve(Script::Silent).await;
    let backend = backend(port);
    let session = Session::with_token("local", "tok");

    let err = ResultCollector::new(&backend, &session)
        .with_rule(PayloadRule::Classified { max_messages: 4 })
        .with_timeout(Duration::from_millis(300))
        .collect(&Campaign::Id(3))
        .await
        .unwrap_err();

    assert_eq!(err, CollectionError::Unreachable);
    tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("client did not close the stream")
        .unwrap();
}

#[tokio::test]
async fn test_no_server() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let backend = backend(port);
    let session = Session::with_token("local", "tok");

    let err = ResultCollector::new(&backend, &session)
        .collect(&Campaign::Id(3))
        .await
        .unwrap_err();

    assert_eq!(err, CollectionError::Unreachable);
}
