// End-to-end tests against an in-process WebSocket server
//
// The server echoes every audio chunk back as its processed version, which
// lets these tests assert the full pipeline: capture batches → segmenter →
// WAV codec → transport → dispatch → final assembly, plus the message
// ordering guarantees around stop_recording.

use anyhow::Result;
use calmwave_stream::audio::{decode, f32_to_i16, CaptureBackend};
use calmwave_stream::{events, ClientEvent, SessionConfig, SessionState, StreamingClient};
use futures::{SinkExt, StreamExt};
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

/// Spawn a protocol-speaking echo server on an ephemeral port.
///
/// Every received JSON message is forwarded to the returned channel; audio
/// chunks are answered with an `audio_processed` message echoing the chunk
/// bytes as the processed payload.
async fn spawn_echo_server() -> (String, mpsc::UnboundedReceiver<serde_json::Value>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (seen_tx, seen_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        let (mut ws_tx, mut ws_rx) = ws.split();

        ws_tx
            .send(Message::Text(
                json!({"type": "connection_established"}).to_string(),
            ))
            .await
            .unwrap();

        while let Some(Ok(msg)) = ws_rx.next().await {
            let text = match msg {
                Message::Text(text) => text,
                Message::Close(_) => break,
                _ => continue,
            };

            let value: serde_json::Value = serde_json::from_str(&text).unwrap();
            let _ = seen_tx.send(value.clone());

            let reply = match value["type"].as_str() {
                Some("start_session") => Some(json!({
                    "type": "session_started",
                    "session_id": value["session_id"],
                })),
                Some("audio_chunk") => Some(json!({
                    "type": "audio_processed",
                    "status": "done",
                    "message": "chunk processed",
                    "processed_audio_data": value["audio_data"],
                })),
                Some("ping") => Some(json!({"type": "pong"})),
                _ => None,
            };

            if let Some(reply) = reply {
                if ws_tx.send(Message::Text(reply.to_string())).await.is_err() {
                    break;
                }
            }
        }
    });

    (format!("ws://{}", addr), seen_rx)
}

/// Capture backend that plays out a fixed set of batches, then idles with
/// empty batches until stopped.
///
/// The channel has capacity 1, so once the first idle batch has been sent
/// every scripted batch is known to have reached the capture loop; `drained`
/// reports that point.
struct ScriptedCapture {
    batches: Vec<Vec<f32>>,
    running: Arc<AtomicBool>,
    drained: Arc<AtomicBool>,
}

impl ScriptedCapture {
    fn new(batches: Vec<Vec<f32>>) -> Self {
        Self {
            batches,
            running: Arc::new(AtomicBool::new(false)),
            drained: Arc::new(AtomicBool::new(false)),
        }
    }

    fn drained_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.drained)
    }
}

#[async_trait::async_trait]
impl CaptureBackend for ScriptedCapture {
    async fn start(&mut self) -> Result<mpsc::Receiver<Vec<f32>>> {
        let (tx, rx) = mpsc::channel(1);
        let batches = self.batches.clone();
        let running = Arc::clone(&self.running);
        let drained = Arc::clone(&self.drained);
        running.store(true, Ordering::SeqCst);

        tokio::spawn(async move {
            for batch in batches {
                if !running.load(Ordering::SeqCst) {
                    return;
                }
                if tx.send(batch).await.is_err() {
                    return;
                }
            }
            if tx.send(Vec::new()).await.is_err() {
                return;
            }
            drained.store(true, Ordering::SeqCst);

            // Keep the stream alive so the capture loop can observe its
            // cooperative stop flag.
            while running.load(Ordering::SeqCst) {
                if tx.send(Vec::new()).await.is_err() {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        });

        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        "scripted-capture"
    }
}

fn test_session_config(url: String) -> SessionConfig {
    SessionConfig {
        server_url: url,
        sample_rate: 1000,
        channels: 1,
        chunk_duration: Duration::from_secs(1), // 1000 samples per chunk
    }
}

/// Poll the client until its stats satisfy `check` or a few seconds elapse.
async fn wait_for_stats<F>(client: &StreamingClient, mut check: F) -> bool
where
    F: FnMut(&calmwave_stream::SessionStats) -> bool,
{
    for _ in 0..200 {
        if check(&client.stats().await) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    false
}

#[tokio::test]
async fn full_session_round_trip() {
    let (url, mut seen_rx) = spawn_echo_server().await;
    let (events_tx, mut events_rx) = events::channel();

    let client = Arc::new(StreamingClient::new(test_session_config(url), events_tx));
    client.connect().await.unwrap();
    assert_eq!(client.state().await, SessionState::Connected);

    // 2500 samples at 1000 samples per chunk => two full chunks plus a
    // 500-sample terminal chunk.
    let input: Vec<f32> = (0..2500).map(|i| ((i % 100) as f32 / 100.0) - 0.5).collect();
    let batches: Vec<Vec<f32>> = input.chunks(700).map(|b| b.to_vec()).collect();

    let capture = ScriptedCapture::new(batches);
    let drained = capture.drained_flag();

    client.start_recording(Box::new(capture)).await.unwrap();
    assert_eq!(client.state().await, SessionState::Recording);

    // Every scripted batch reaches the capture loop, which means both full
    // chunks have gone out while recording is still live.
    assert!(
        wait_for_stats(&client, |_| drained.load(Ordering::SeqCst)).await,
        "capture batches were not drained"
    );
    assert!(
        wait_for_stats(&client, |stats| stats.chunks_sent >= 2).await,
        "full chunks were not sent"
    );

    client.stop_recording().await.unwrap();
    assert_eq!(client.state().await, SessionState::Connected);

    // All three processed chunks (including the terminal one) come back.
    assert!(
        wait_for_stats(&client, |stats| stats.chunks_processed >= 3).await,
        "processed chunks did not arrive"
    );

    // The server saw: start_session, three chunks, stop_session, with the
    // terminal chunk strictly before stop_session.
    let mut seen = Vec::new();
    for _ in 0..200 {
        while let Ok(value) = seen_rx.try_recv() {
            seen.push(value);
        }
        if seen.len() >= 5 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }

    let types: Vec<&str> = seen.iter().map(|v| v["type"].as_str().unwrap()).collect();
    assert_eq!(
        types,
        vec![
            "start_session",
            "audio_chunk",
            "audio_chunk",
            "audio_chunk",
            "stop_session"
        ]
    );

    let chunks: Vec<&serde_json::Value> =
        seen.iter().filter(|v| v["type"] == "audio_chunk").collect();
    assert_eq!(chunks[0]["chunk_id"], "chunk_1");
    assert_eq!(chunks[1]["chunk_id"], "chunk_2");
    assert_eq!(chunks[2]["chunk_id"], "chunk_3");
    assert_eq!(chunks[0]["is_final"], false);
    assert_eq!(chunks[1]["is_final"], false);
    assert_eq!(chunks[2]["is_final"], true);
    for chunk in &chunks {
        assert_eq!(chunk["format"], "wav");
        assert_eq!(chunk["sample_rate"], 1000);
        assert_eq!(chunk["channels"], 1);
        assert_eq!(chunk["bits_per_sample"], 16);
    }

    let session_id = client.session_id().await.unwrap();
    assert_eq!(seen[0]["session_id"], session_id.as_str());
    assert_eq!(seen[4]["session_id"], session_id.as_str());

    // The assembled artifact is the whole capture, in order.
    let artifact = client.assemble().await.unwrap();
    let decoded = decode(&artifact).unwrap();
    assert_eq!(decoded.samples, f32_to_i16(&input));
    assert_eq!(decoded.sample_rate, 1000);
    assert_eq!(decoded.channels, 1);

    // Events surfaced the session acknowledgement from the server.
    let mut saw_session_started = false;
    while let Ok(event) = events_rx.try_recv() {
        if let ClientEvent::SessionStarted { session_id: id } = event {
            assert_eq!(id, session_id);
            saw_session_started = true;
        }
    }
    assert!(saw_session_started);

    client.disconnect().await.unwrap();
    assert_eq!(client.state().await, SessionState::Idle);
}

#[tokio::test]
async fn recording_rejected_while_not_connected() {
    let (events_tx, _events_rx) = events::channel();
    let client = StreamingClient::new(test_session_config("ws://unused".into()), events_tx);

    let result = client
        .start_recording(Box::new(ScriptedCapture::new(Vec::new())))
        .await;

    assert!(result.is_err());
    assert_eq!(client.state().await, SessionState::Idle);
}

#[tokio::test]
async fn connect_rejected_while_already_connected() {
    let (url, _seen_rx) = spawn_echo_server().await;
    let (events_tx, _events_rx) = events::channel();

    let client = StreamingClient::new(test_session_config(url), events_tx);
    client.connect().await.unwrap();

    assert!(client.connect().await.is_err());
    assert_eq!(client.state().await, SessionState::Connected);

    client.disconnect().await.unwrap();
}

#[tokio::test]
async fn connection_failure_settles_back_in_idle() {
    let (events_tx, mut events_rx) = events::channel();

    // Nothing listens on this port.
    let client = StreamingClient::new(
        test_session_config("ws://127.0.0.1:1".into()),
        events_tx,
    );

    assert!(client.connect().await.is_err());
    assert_eq!(client.state().await, SessionState::Idle);

    let mut saw_disconnect = false;
    while let Ok(event) = events_rx.try_recv() {
        if matches!(event, ClientEvent::Disconnected { .. }) {
            saw_disconnect = true;
        }
    }
    assert!(saw_disconnect);
}

#[tokio::test]
async fn remote_close_transitions_to_idle() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    // Server that accepts the handshake and immediately closes.
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        let (mut ws_tx, _) = ws.split();
        let _ = ws_tx.send(Message::Close(None)).await;
    });

    let (events_tx, mut events_rx) = events::channel();
    let client = Arc::new(StreamingClient::new(
        test_session_config(format!("ws://{}", addr)),
        events_tx,
    ));
    client.connect().await.unwrap();

    assert!(
        wait_for_stats(&client, |stats| stats.state == SessionState::Idle).await,
        "client did not settle in Idle after remote close"
    );

    let mut saw_disconnect = false;
    while let Ok(event) = events_rx.try_recv() {
        if matches!(event, ClientEvent::Disconnected { .. }) {
            saw_disconnect = true;
        }
    }
    assert!(saw_disconnect);
}

#[tokio::test]
async fn unknown_message_types_are_not_fatal() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        let (mut ws_tx, mut ws_rx) = ws.split();

        // Unknown type, then junk, then answer pings normally.
        ws_tx
            .send(Message::Text(
                json!({"type": "telemetry", "cpu": 0.5}).to_string(),
            ))
            .await
            .unwrap();
        ws_tx
            .send(Message::Text("{ not json".to_string()))
            .await
            .unwrap();

        while let Some(Ok(msg)) = ws_rx.next().await {
            if let Message::Text(text) = msg {
                let value: serde_json::Value = serde_json::from_str(&text).unwrap();
                if value["type"] == "ping" {
                    ws_tx
                        .send(Message::Text(json!({"type": "pong"}).to_string()))
                        .await
                        .unwrap();
                }
            }
        }
    });

    let (events_tx, mut events_rx) = events::channel();
    let client = StreamingClient::new(test_session_config(format!("ws://{}", addr)), events_tx);
    client.connect().await.unwrap();

    // The connection survives both messages and still answers pings.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(client.state().await, SessionState::Connected);
    client.ping().await.unwrap();

    let mut saw_pong = false;
    for _ in 0..100 {
        match events_rx.try_recv() {
            Ok(ClientEvent::Pong) => {
                saw_pong = true;
                break;
            }
            Ok(_) => continue,
            Err(_) => tokio::time::sleep(Duration::from_millis(25)).await,
        }
    }
    assert!(saw_pong);

    client.disconnect().await.unwrap();
}
