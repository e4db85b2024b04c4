use anyhow::{bail, Context, Result};
use base64::Engine;
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{error, info, warn};

use super::messages::{InboundMessage, OutboundMessage};
use crate::audio::wav::EncodedChunk;

/// Longest the capture path will wait to hand a message to the writer task.
/// A stalled connection surfaces as an error here instead of blocking capture.
const SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Outbound queue depth between callers and the writer task
const OUTBOUND_BUFFER: usize = 32;

/// Events delivered to the session dispatch loop.
///
/// One reader task produces these, so they arrive in receive order and no
/// two messages are ever dispatched concurrently with each other.
#[derive(Debug)]
pub enum TransportEvent {
    Message(InboundMessage),
    Disconnected { reason: String },
}

/// WebSocket client for the audio streaming protocol.
///
/// Owns the connection through two tasks: a writer that holds the sink and
/// drains an outbound channel, and a reader that decodes inbound JSON frames
/// and forwards them as `TransportEvent`s. Connection failures of any kind
/// end in a `Disconnected` event, never a panic.
pub struct WsClient {
    outbound_tx: mpsc::Sender<Message>,
}

impl WsClient {
    /// Connect to the streaming endpoint and start the reader/writer tasks.
    pub async fn connect(
        url: &str,
        event_tx: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<Self> {
        info!("Connecting to {}", url);

        let (stream, _) = connect_async(url)
            .await
            .with_context(|| format!("Failed to connect to {}", url))?;

        info!("WebSocket connected");

        let (mut ws_tx, mut ws_rx) = stream.split();
        let (outbound_tx, mut outbound_rx) = mpsc::channel::<Message>(OUTBOUND_BUFFER);

        // Writer task: sole owner of the sink.
        tokio::spawn(async move {
            while let Some(msg) = outbound_rx.recv().await {
                let is_close = matches!(msg, Message::Close(_));
                if let Err(e) = ws_tx.send(msg).await {
                    error!("WebSocket send failed: {}", e);
                    break;
                }
                if is_close {
                    break;
                }
            }
            let _ = ws_tx.close().await;
        });

        // Reader task: single delivery sequence for inbound messages.
        tokio::spawn(async move {
            let reason = loop {
                match ws_rx.next().await {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<InboundMessage>(&text) {
                            Ok(msg) => {
                                if event_tx.send(TransportEvent::Message(msg)).is_err() {
                                    break "event listener dropped".to_string();
                                }
                            }
                            Err(e) => {
                                // Protocol error: log and ignore, connection stays open
                                warn!("Ignoring unparseable inbound message: {}", e);
                            }
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        break match frame {
                            Some(f) => format!("closed by remote: {} {}", f.code, f.reason),
                            None => "closed by remote".to_string(),
                        };
                    }
                    // The protocol is text-only; control frames are handled
                    // by tungstenite and binary frames carry nothing for us.
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => break format!("socket error: {}", e),
                    None => break "connection closed".to_string(),
                }
            };

            info!("WebSocket reader stopped: {}", reason);
            let _ = event_tx.send(TransportEvent::Disconnected { reason });
        });

        Ok(Self { outbound_tx })
    }

    /// Serialize and queue one message, waiting at most `SEND_TIMEOUT`.
    pub async fn send(&self, message: &OutboundMessage) -> Result<()> {
        let payload =
            serde_json::to_string(message).context("Failed to serialize outbound message")?;

        match tokio::time::timeout(SEND_TIMEOUT, self.outbound_tx.send(Message::Text(payload)))
            .await
        {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => bail!("Connection is closed"),
            Err(_) => bail!(
                "Timed out queueing outbound message after {}s",
                SEND_TIMEOUT.as_secs()
            ),
        }
    }

    /// Send one encoded audio chunk, consuming it.
    pub async fn send_chunk(&self, session_id: &str, chunk: EncodedChunk) -> Result<()> {
        let sequence = chunk.sequence;
        let byte_len = chunk.data.len();
        let is_final = chunk.is_final;

        let message = OutboundMessage::AudioChunk {
            session_id: session_id.to_string(),
            chunk_id: format!("chunk_{}", sequence),
            audio_data: base64::engine::general_purpose::STANDARD.encode(chunk.data),
            is_final,
            format: "wav".to_string(),
            sample_rate: chunk.sample_rate,
            channels: chunk.channels,
            bits_per_sample: chunk.bits_per_sample,
        };

        self.send(&message).await?;

        info!(
            "Sent audio chunk {} ({} bytes, final={})",
            sequence, byte_len, is_final
        );

        Ok(())
    }

    /// Close the connection. Idempotent and safe to call when not connected.
    pub fn close(&self) {
        // A full or already-closed outbound channel means the writer is
        // stalled or gone; either way there is nothing further to do.
        let _ = self.outbound_tx.try_send(Message::Close(None));
    }
}
