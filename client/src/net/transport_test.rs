use super::*;
use envelope::ChatMessage;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::time::{Duration, sleep, timeout};

use crate::{ChatClient, ClientConfig, ClientSession, ConnectionState};

// =============================================================================
// HELPERS
// =============================================================================

async fn listen() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind test listener");
    let url = format!("ws://{}", listener.local_addr().expect("local addr"));
    (listener, url)
}

async fn accept(listener: &TcpListener) -> WebSocketStream<TcpStream> {
    let (stream, _) = listener.accept().await.expect("accept tcp");
    tokio_tungstenite::accept_async(stream).await.expect("websocket handshake")
}

async fn next_event(link: &mut Link) -> TransportEvent {
    timeout(Duration::from_secs(2), link.rx.recv())
        .await
        .expect("timed out waiting for transport event")
        .expect("event channel closed before Closed")
}

async fn closed_port_url() -> String {
    let (listener, url) = listen().await;
    drop(listener);
    url
}

async fn wait_for(mut done: impl FnMut() -> bool) {
    timeout(Duration::from_secs(2), async {
        while !done() {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

// =============================================================================
// WS CONNECTOR
// =============================================================================

#[tokio::test]
async fn server_close_ends_link_with_closed() {
    let (listener, url) = listen().await;
    let server = tokio::spawn(async move {
        let mut ws = accept(&listener).await;
        ws.send(Message::text("hello")).await.expect("send text");
        ws.close(None).await.expect("send close");
        while ws.next().await.is_some() {}
    });

    let mut link = WsConnector.open(&url).await.expect("open link");
    assert_eq!(next_event(&mut link).await, TransportEvent::Message("hello".into()));
    assert_eq!(next_event(&mut link).await, TransportEvent::Closed);
    server.await.expect("server task");
}

#[tokio::test]
async fn outbound_close_completes_handshake() {
    let (listener, url) = listen().await;
    let (seen_tx, seen_rx) = oneshot::channel();
    tokio::spawn(async move {
        let mut ws = accept(&listener).await;
        let mut seen = Vec::new();
        while let Some(Ok(msg)) = ws.next().await {
            seen.push(msg);
        }
        let _ = seen_tx.send(seen);
    });

    let mut link = WsConnector.open(&url).await.expect("open link");
    link.tx.send(Outbound::Text("hi".into())).expect("queue text");
    link.tx.send(Outbound::Close).expect("queue close");

    // A clean handshake produces no error before the final Closed.
    assert_eq!(next_event(&mut link).await, TransportEvent::Closed);

    let seen = timeout(Duration::from_secs(2), seen_rx)
        .await
        .expect("server did not finish")
        .expect("server dropped result");
    assert_eq!(seen.first(), Some(&Message::text("hi")));
    assert!(matches!(seen.get(1), Some(Message::Close(_))), "got {seen:?}");
}

#[tokio::test]
async fn abrupt_drop_reports_error_then_closed() {
    let (listener, url) = listen().await;
    tokio::spawn(async move {
        let mut ws = accept(&listener).await;
        ws.send(Message::text("bye")).await.expect("send text");
        drop(ws);
    });

    let mut link = WsConnector.open(&url).await.expect("open link");
    assert_eq!(next_event(&mut link).await, TransportEvent::Message("bye".into()));
    assert!(matches!(next_event(&mut link).await, TransportEvent::Error(_)));
    assert_eq!(next_event(&mut link).await, TransportEvent::Closed);
}

#[tokio::test]
async fn open_against_closed_port_is_connect_error() {
    let url = closed_port_url().await;
    let result = WsConnector.open(&url).await;
    assert!(matches!(result, Err(ClientError::Connect(_))));
}

// =============================================================================
// CHAT CLIENT OVER A REAL SOCKET
// =============================================================================

#[tokio::test]
async fn establishment_failure_reports_error_and_schedules_retry() {
    let config = ClientConfig { url: closed_port_url().await, reconnect_delay: Duration::from_secs(60) };
    let session = ClientSession::new();
    let client = ChatClient::websocket(config, &session).mount();

    wait_for(|| client.state() == ConnectionState::Closed).await;
    assert_eq!(client.error().as_deref(), Some("failed to establish websocket connection"));
    assert!(!client.is_connected());
    assert!(client.reconnect_pending());
}

#[tokio::test]
async fn client_receives_sends_and_disconnects_cleanly() {
    let (listener, url) = listen().await;
    let (seen_tx, seen_rx) = oneshot::channel();
    tokio::spawn(async move {
        let mut ws = accept(&listener).await;
        let welcome = envelope::encode(&ChatMessage::system("Welcome, User1!")).expect("encode");
        ws.send(Message::text(welcome)).await.expect("send welcome");
        let mut seen = Vec::new();
        while let Some(Ok(msg)) = ws.next().await {
            seen.push(msg);
        }
        let _ = seen_tx.send(seen);
    });

    let session = ClientSession::new();
    let client = ChatClient::websocket(ClientConfig::with_url(url), &session).mount();
    wait_for(|| client.messages().len() == 1).await;
    assert!(client.is_connected());
    assert_eq!(client.messages()[0].data, "Welcome, User1!");

    assert!(client.send_message("hi"));
    client.disconnect();
    wait_for(|| client.state() == ConnectionState::Closed).await;
    assert!(!client.is_connected());
    assert!(!client.reconnect_pending());

    let seen = timeout(Duration::from_secs(2), seen_rx)
        .await
        .expect("server did not finish")
        .expect("server dropped result");
    assert_eq!(seen.first(), Some(&Message::text(r#"{"kind":"chat","data":"hi"}"#)));
    assert!(matches!(seen.get(1), Some(Message::Close(_))), "got {seen:?}");
}
