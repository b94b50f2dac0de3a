//! End-to-end chat flow tests.
//!
//! Drives a real server over TCP with `tokio-tungstenite` clients, so the
//! hand-rolled handshake and codec are exercised against an independent
//! WebSocket implementation — masked client frames included.

mod fixtures;

use fixtures::TestServer;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time::{Duration, timeout};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn connect(server: &TestServer) -> Client {
    let (client, _response) = connect_async(server.ws_url())
        .await
        .expect("failed to connect");
    client
}

/// Connect and send the username (the first message names the client).
async fn join(server: &TestServer, name: &str) -> Client {
    let mut client = connect(server).await;
    client
        .send(Message::text(name))
        .await
        .expect("failed to send username");
    client
}

async fn recv_text(client: &mut Client) -> String {
    let msg = timeout(Duration::from_secs(2), client.next())
        .await
        .expect("timed out waiting for message")
        .expect("stream ended unexpectedly")
        .expect("websocket error");
    msg.into_text().expect("expected a text message").to_string()
}

async fn expect_silence(client: &mut Client) {
    let res = timeout(Duration::from_millis(300), client.next()).await;
    assert!(res.is_err(), "expected no message, got {:?}", res.unwrap());
}

#[tokio::test]
async fn first_message_names_the_client_and_announces_it() {
    let server = TestServer::start().await;

    let mut alice = join(&server, "alice").await;
    // The sender is part of the broadcast audience.
    assert_eq!(recv_text(&mut alice).await, "[Server]: alice joined the chat");

    let mut bob = join(&server, "bob").await;
    assert_eq!(recv_text(&mut alice).await, "[Server]: bob joined the chat");
    assert_eq!(recv_text(&mut bob).await, "[Server]: bob joined the chat");
}

#[tokio::test]
async fn chat_messages_are_broadcast_with_sender_prefix() {
    let server = TestServer::start().await;

    let mut alice = join(&server, "alice").await;
    recv_text(&mut alice).await;
    let mut bob = join(&server, "bob").await;
    recv_text(&mut alice).await;
    recv_text(&mut bob).await;

    alice.send(Message::text("hello bob")).await.unwrap();
    assert_eq!(recv_text(&mut bob).await, "[alice]: hello bob");
    assert_eq!(recv_text(&mut alice).await, "[alice]: hello bob");

    bob.send(Message::text("hi alice")).await.unwrap();
    assert_eq!(recv_text(&mut alice).await, "[bob]: hi alice");
    assert_eq!(recv_text(&mut bob).await, "[bob]: hi alice");
}

#[tokio::test]
async fn ping_is_answered_with_matching_pong() {
    let server = TestServer::start().await;
    let mut alice = join(&server, "alice").await;
    recv_text(&mut alice).await;

    alice
        .send(Message::Ping(b"are you there".to_vec().into()))
        .await
        .unwrap();

    let msg = timeout(Duration::from_secs(2), alice.next())
        .await
        .expect("timed out waiting for pong")
        .unwrap()
        .unwrap();
    match msg {
        Message::Pong(payload) => assert_eq!(&payload[..], b"are you there"),
        other => panic!("expected pong, got {other:?}"),
    }
}

#[tokio::test]
async fn closing_client_produces_exactly_one_left_notice() {
    let server = TestServer::start().await;

    let mut alice = join(&server, "alice").await;
    recv_text(&mut alice).await;
    let mut bob = join(&server, "bob").await;
    recv_text(&mut alice).await;
    recv_text(&mut bob).await;

    bob.close(None).await.unwrap();

    assert_eq!(recv_text(&mut alice).await, "[Server]: bob left the chat");
    expect_silence(&mut alice).await;

    // Chat keeps working for the remaining client.
    alice.send(Message::text("anyone?")).await.unwrap();
    assert_eq!(recv_text(&mut alice).await, "[alice]: anyone?");
}

#[tokio::test]
async fn abrupt_drop_produces_no_left_notice() {
    let server = TestServer::start().await;

    let mut alice = join(&server, "alice").await;
    recv_text(&mut alice).await;
    let bob = join(&server, "bob").await;
    assert_eq!(recv_text(&mut alice).await, "[Server]: bob joined the chat");

    // Drop the TCP connection without a close frame. The server only
    // announces departures that arrive as close frames.
    drop(bob);
    expect_silence(&mut alice).await;

    // The dead peer was still cleaned up: broadcasts keep flowing.
    alice.send(Message::text("still here")).await.unwrap();
    assert_eq!(recv_text(&mut alice).await, "[alice]: still here");
}

#[tokio::test]
async fn user_named_server_is_indistinguishable_from_notices() {
    // The system identity has no collision guard: a user who takes the
    // name "Server" can forge lines that look exactly like notices.
    let server = TestServer::start().await;

    let mut impostor = join(&server, "Server").await;
    assert_eq!(recv_text(&mut impostor).await, "[Server]: Server joined the chat");

    let mut alice = join(&server, "alice").await;
    recv_text(&mut impostor).await;
    recv_text(&mut alice).await;

    impostor
        .send(Message::text("alice left the chat"))
        .await
        .unwrap();
    // Same shape as a genuine departure notice.
    assert_eq!(recv_text(&mut alice).await, "[Server]: alice left the chat");
}

#[tokio::test]
async fn plain_http_request_is_rejected() {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let server = TestServer::start().await;
    let addr = server.ws_url();
    let addr = addr
        .strip_prefix("ws://")
        .and_then(|rest| rest.strip_suffix("/ws"))
        .unwrap();

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n")
        .await
        .unwrap();

    let mut response = vec![0u8; 256];
    let n = stream.read(&mut response).await.unwrap();
    assert!(response[..n].starts_with(b"HTTP/1.1 400 Bad Request"));
}

#[tokio::test]
async fn large_messages_survive_the_extended_length_forms() {
    let server = TestServer::start().await;

    let mut alice = join(&server, "alice").await;
    recv_text(&mut alice).await;
    let mut bob = join(&server, "bob").await;
    recv_text(&mut alice).await;
    recv_text(&mut bob).await;

    // Crosses the 16-bit length boundary once prefixed with "[alice]: ".
    let big = "x".repeat(70_000);
    alice.send(Message::text(big.clone())).await.unwrap();
    assert_eq!(recv_text(&mut bob).await, format!("[alice]: {big}"));
}
