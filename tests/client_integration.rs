//! End-to-end tests over a real WebSocket link to an in-process detection service.

use chess_vision::capture::MockCamera;
use chess_vision::config::Config;
use chess_vision::connection::{ConnectionState, WebSocketConnector};
use chess_vision::coordinator::Coordinator;
use chess_vision::defaults;
use chess_vision::speech::{RecordingSynthesizer, SpeechQueue};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

fn detections(position: &str) -> String {
    format!(r#"{{"detected_pieces":[{{"piece":"P1","position":"{position}","confidence":0.93}}]}}"#)
}

fn test_config(port: u16) -> Config {
    let mut config = Config::default();
    config.connection.endpoint = format!("ws://127.0.0.1:{port}/ws");
    config.connection.base_delay_ms = 100;
    config.connection.max_delay_ms = 500;
    config.connection.connect_timeout_ms = 2000;
    config.announce.debounce_ms = 200;
    config
}

async fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {what}"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

async fn bind() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

fn start_client(config: &Config, synth: &RecordingSynthesizer) -> (Coordinator, Arc<SpeechQueue>) {
    let speech = Arc::new(SpeechQueue::new(Box::new(synth.clone())));
    let coordinator = Coordinator::start(
        config,
        Arc::new(WebSocketConnector),
        Box::new(MockCamera::new()),
        Arc::clone(&speech),
    );
    (coordinator, speech)
}

#[tokio::test]
async fn test_moves_are_announced_over_websocket() {
    let (listener, port) = bind().await;

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();

        // First message is a frame payload without data URL header.
        let first = loop {
            match ws.next().await {
                Some(Ok(Message::Text(frame))) => break frame,
                Some(Ok(_)) => continue,
                other => panic!("expected a frame, got {other:?}"),
            }
        };

        ws.send(Message::Text(detections("e2"))).await.unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;
        ws.send(Message::Text(detections("e4"))).await.unwrap();

        // Keep draining frames until the client hangs up.
        while let Some(Ok(_)) = ws.next().await {}
        first
    });

    let synth = RecordingSynthesizer::new();
    let (coordinator, _speech) = start_client(&test_config(port), &synth);

    wait_until("move announcement", || synth.spoken().len() >= 2).await;
    assert_eq!(
        synth.spoken(),
        vec![defaults::CONNECTED_NOTICE, "P1 moved from e2 to e4"]
    );
    assert_eq!(coordinator.latest_detections().borrow().pieces()[0].square(), Some("e4"));

    let handle = coordinator.handle();
    coordinator.shutdown().await;
    assert_eq!(handle.state(), ConnectionState::Disconnected);
    assert!(handle.stats().frames_sent >= 1);

    let first_frame = tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("server did not finish")
        .unwrap();
    assert_eq!(first_frame, "/9j/4AAQSkZJRg==");
}

#[tokio::test]
async fn test_client_reconnects_after_service_drops_link() {
    let (listener, port) = bind().await;
    let accepted = Arc::new(AtomicUsize::new(0));

    let server_accepted = Arc::clone(&accepted);
    let server = tokio::spawn(async move {
        // First session is closed by the service right away.
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        server_accepted.fetch_add(1, Ordering::SeqCst);
        ws.close(None).await.unwrap();
        drop(ws);

        // Second session stays up until the client leaves.
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        server_accepted.fetch_add(1, Ordering::SeqCst);
        while let Some(Ok(_)) = ws.next().await {}
    });

    let synth = RecordingSynthesizer::new();
    let (coordinator, _speech) = start_client(&test_config(port), &synth);
    let handle = coordinator.handle();

    wait_until("second session", || accepted.load(Ordering::SeqCst) == 2).await;
    wait_until("reconnect", || handle.state() == ConnectionState::Connected).await;
    wait_until("notices", || synth.spoken().len() >= 3).await;

    assert_eq!(
        synth.spoken(),
        vec![
            defaults::CONNECTED_NOTICE,
            defaults::DISCONNECTED_NOTICE,
            defaults::CONNECTED_NOTICE
        ]
    );
    assert_eq!(handle.stats().retries, 0);

    coordinator.shutdown().await;
    tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("server did not finish")
        .unwrap();
}

#[tokio::test]
async fn test_malformed_message_keeps_link_open() {
    let (listener, port) = bind().await;
    let accepted = Arc::new(AtomicUsize::new(0));

    let server_accepted = Arc::clone(&accepted);
    let server = tokio::spawn(async move {
        loop {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            server_accepted.fetch_add(1, Ordering::SeqCst);

            ws.send(Message::Text(detections("d2"))).await.unwrap();
            ws.send(Message::Text("{not json".to_string())).await.unwrap();
            ws.send(Message::Text(r#"{"status":"warming up"}"#.to_string()))
                .await
                .unwrap();
            while let Some(Ok(_)) = ws.next().await {}
        }
    });

    let synth = RecordingSynthesizer::new();
    let (coordinator, _speech) = start_client(&test_config(port), &synth);
    let handle = coordinator.handle();

    wait_until("malformed messages", || handle.stats().malformed_messages == 2).await;
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(handle.state(), ConnectionState::Connected);
    assert_eq!(handle.latest_detections().pieces()[0].square(), Some("d2"));
    assert_eq!(accepted.load(Ordering::SeqCst), 1);

    coordinator.shutdown().await;
    server.abort();
}

#[tokio::test]
async fn test_unreachable_service_keeps_retrying() {
    // Reserve a port, then free it so nothing is listening.
    let (listener, port) = bind().await;
    drop(listener);

    let synth = RecordingSynthesizer::new();
    let (coordinator, _speech) = start_client(&test_config(port), &synth);
    let handle = coordinator.handle();

    wait_until("retries", || handle.stats().connect_attempts >= 3).await;
    assert_eq!(handle.state(), ConnectionState::Disconnected);
    assert!(handle.stats().retries >= 2);
    assert!(!handle.send("frame".to_string()));

    coordinator.shutdown().await;
    assert!(
        synth
            .spoken()
            .iter()
            .all(|text| text == defaults::DISCONNECTED_NOTICE)
    );
}
