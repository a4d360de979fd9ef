//! WebSocket gateway tests over a real socket.
//!
//! Each test serves `gateway_router` on an ephemeral port and talks to it with
//! a `tokio-tungstenite` client, the way a browser would.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]

use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use poll_service::gateway::gateway_router;
use poll_test_utils::TestSession;
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

async fn serve(session: &TestSession) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = gateway_router(session.handle.clone());
    let shutdown = session.handle.child_token();
    tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
            .unwrap();
    });
    addr
}

/// Connect and consume the catch-up frames up to and including `presence`.
///
/// Receiving catch-up means the connection is subscribed to notifications.
async fn connect(addr: SocketAddr) -> (Client, Vec<Value>) {
    let (mut ws, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();
    let mut catch_up = Vec::new();
    loop {
        let frame = recv(&mut ws).await;
        let done = frame["type"] == "presence";
        catch_up.push(frame);
        if done {
            return (ws, catch_up);
        }
    }
}

async fn send(ws: &mut Client, frame: Value) {
    ws.send(Message::text(frame.to_string())).await.unwrap();
}

async fn recv(ws: &mut Client) -> Value {
    loop {
        let message = tokio::time::timeout(RECV_TIMEOUT, ws.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("socket closed")
            .unwrap();
        if let Message::Text(text) = message {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

/// Skip frames until one of type `kind` arrives.
async fn recv_type(ws: &mut Client, kind: &str) -> Value {
    loop {
        let frame = recv(ws).await;
        if frame["type"] == kind {
            return frame;
        }
    }
}

fn start_round() -> Value {
    json!({
        "type": "start_round",
        "prompt": "2+2?",
        "options": ["3", "4"],
        "timer_seconds": 30,
        "correct_option": "4"
    })
}

#[tokio::test]
async fn test_round_flow_over_websocket() {
    let session = TestSession::spawn();
    let addr = serve(&session).await;

    let (mut moderator, catch_up) = connect(addr).await;
    assert_eq!(catch_up, vec![json!({"type": "presence", "participants": []})]);
    let (mut student, _) = connect(addr).await;

    send(&mut student, json!({"type": "join", "name": "Ana"})).await;
    assert_eq!(recv(&mut student).await, json!({"type": "joined", "name": "Ana"}));
    assert_eq!(
        recv(&mut moderator).await,
        json!({"type": "presence", "participants": [{"name": "Ana", "voted": false}]})
    );

    send(&mut moderator, start_round()).await;
    assert_eq!(
        recv(&mut moderator).await,
        json!({"type": "round_accepted", "round_id": 1, "correct_option": "4"})
    );

    let announced = recv_type(&mut student, "round_started").await;
    assert_eq!(
        announced,
        json!({
            "type": "round_started",
            "round_id": 1,
            "prompt": "2+2?",
            "options": ["3", "4"],
            "timer_seconds": 30
        }),
        "the correct option is withheld until the end"
    );
    recv_type(&mut student, "presence").await;

    send(&mut student, json!({"type": "cast_vote", "option": "4"})).await;
    assert_eq!(
        recv(&mut student).await,
        json!({"type": "presence", "participants": [{"name": "Ana", "voted": true}]})
    );
    assert_eq!(
        recv(&mut student).await,
        json!({"type": "partial_result", "round_id": 1, "options": {"3": 0.0, "4": 100.0}})
    );
    let expected_final = json!({
        "type": "final_result",
        "round_id": 1,
        "options": {"3": 0.0, "4": 100.0},
        "correct_option": "4"
    });
    assert_eq!(recv(&mut student).await, expected_final);

    // The moderator never sees the student's partial view
    let moderator_frame = recv_type(&mut moderator, "final_result").await;
    assert_eq!(moderator_frame, expected_final);

    // A late connection catches up on the finished round
    let (_late, catch_up) = connect(addr).await;
    let kinds: Vec<_> = catch_up.iter().map(|f| f["type"].clone()).collect();
    assert_eq!(kinds, vec!["round_started", "final_result", "presence"]);
    assert_eq!(catch_up[0]["timer_seconds"], 0, "no time left on a finished round");
    assert_eq!(catch_up[1], expected_final);
}

#[tokio::test]
async fn test_invalid_round_reports_error_to_sender_only() {
    let session = TestSession::spawn();
    let addr = serve(&session).await;
    let (mut moderator, _) = connect(addr).await;

    send(
        &mut moderator,
        json!({"type": "start_round", "prompt": "Pick", "options": ["A", "A"], "timer_seconds": 30}),
    )
    .await;

    let reply = recv(&mut moderator).await;
    assert_eq!(reply["type"], "error");
    assert_eq!(reply["code"], 3);
}

#[tokio::test]
async fn test_malformed_frames_are_ignored() {
    let session = TestSession::spawn();
    let addr = serve(&session).await;
    let (mut client, _) = connect(addr).await;

    client.send(Message::text("{not json")).await.unwrap();
    send(&mut client, json!({"type": "dance"})).await;
    send(&mut client, json!({"type": "cast_vote", "option": "4"})).await;

    // The connection is still usable and nothing was sent back for the above
    send(&mut client, json!({"type": "join", "name": "Ana"})).await;
    assert_eq!(recv(&mut client).await, json!({"type": "joined", "name": "Ana"}));
}

#[tokio::test]
async fn test_disconnect_leaves_session() {
    let session = TestSession::spawn();
    let addr = serve(&session).await;
    let (mut moderator, _) = connect(addr).await;
    let (mut student, _) = connect(addr).await;

    send(&mut student, json!({"type": "join", "name": "Ana"})).await;
    recv_type(&mut moderator, "presence").await;

    student.close(None).await.unwrap();

    assert_eq!(
        recv_type(&mut moderator, "presence").await,
        json!({"type": "presence", "participants": []})
    );
}
