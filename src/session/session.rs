use anyhow::{Context, Result};
use base64::Engine;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::config::SessionConfig;
use super::state::{SessionState, StateMachine};
use super::stats::SessionStats;
use crate::audio::segmenter::{ChunkSegmenter, RawChunk};
use crate::audio::{self, wav, CaptureBackend, FinalAssembly, LivePlayer, PlaybackQueue, PlaybackSink};
use crate::events::{ClientEvent, EventSender};
use crate::ws::{InboundMessage, OutboundMessage, TransportEvent, WsClient};

/// Longest disconnect will wait for the dispatch loop to wind down
const DISPATCH_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Coordinates one audio streaming client across its whole lifecycle.
///
/// Three activities run concurrently during an active session: the capture
/// loop (batches → segmenter → codec → transport), the dispatch loop
/// (inbound messages → final-assembly log + live queue), and the playback
/// loop draining the live queue. The only mutable state they share is the
/// log and the queue; everything else travels through channels or atomics.
pub struct StreamingClient {
    config: SessionConfig,
    events: EventSender,

    /// Gate for every user intent
    state: Arc<Mutex<StateMachine>>,

    /// Active connection, present while Connected or beyond
    transport: Arc<Mutex<Option<Arc<WsClient>>>>,

    /// Identifier of the current recording session
    session_id: Arc<Mutex<Option<String>>>,

    /// Cooperative stop flag polled by the capture loop
    is_recording: Arc<AtomicBool>,

    chunks_sent: Arc<AtomicUsize>,
    chunks_processed: Arc<AtomicUsize>,

    /// Append-only log of processed chunks (cleared on new session only)
    assembly: Arc<Mutex<FinalAssembly>>,

    /// FIFO feeding the live playback loop
    live_queue: Arc<PlaybackQueue>,
    player: LivePlayer,

    capture_task: Mutex<Option<JoinHandle<()>>>,
    dispatch_task: Mutex<Option<JoinHandle<()>>>,
}

impl StreamingClient {
    pub fn new(config: SessionConfig, events: EventSender) -> Self {
        let live_queue = Arc::new(PlaybackQueue::new());
        let player = LivePlayer::new(Arc::clone(&live_queue), events.clone());

        Self {
            config,
            events,
            state: Arc::new(Mutex::new(StateMachine::new())),
            transport: Arc::new(Mutex::new(None)),
            session_id: Arc::new(Mutex::new(None)),
            is_recording: Arc::new(AtomicBool::new(false)),
            chunks_sent: Arc::new(AtomicUsize::new(0)),
            chunks_processed: Arc::new(AtomicUsize::new(0)),
            assembly: Arc::new(Mutex::new(FinalAssembly::new())),
            live_queue,
            player,
            capture_task: Mutex::new(None),
            dispatch_task: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub async fn state(&self) -> SessionState {
        self.state.lock().await.state()
    }

    pub async fn session_id(&self) -> Option<String> {
        self.session_id.lock().await.clone()
    }

    /// Open the connection to the remote processor.
    ///
    /// Rejected while already Connecting or Connected. A failed attempt
    /// settles back in Idle and reports the reason.
    pub async fn connect(&self) -> Result<()> {
        self.state.lock().await.begin_connect()?;
        self.emit_state(SessionState::Connecting);

        let (transport_tx, mut transport_rx) = mpsc::unbounded_channel();

        let client = match WsClient::connect(&self.config.server_url, transport_tx).await {
            Ok(client) => Arc::new(client),
            Err(e) => {
                self.state.lock().await.connection_lost();
                self.emit_state(SessionState::Idle);
                let _ = self.events.send(ClientEvent::Disconnected {
                    reason: format!("{:#}", e),
                });
                return Err(e);
            }
        };

        *self.transport.lock().await = Some(Arc::clone(&client));
        self.state.lock().await.connection_established()?;
        self.emit_state(SessionState::Connected);

        // Dispatch loop: the single consumer of inbound messages.
        let state = Arc::clone(&self.state);
        let transport_slot = Arc::clone(&self.transport);
        let is_recording = Arc::clone(&self.is_recording);
        let assembly = Arc::clone(&self.assembly);
        let live_queue = Arc::clone(&self.live_queue);
        let chunks_processed = Arc::clone(&self.chunks_processed);
        let events = self.events.clone();

        let task = tokio::spawn(async move {
            while let Some(event) = transport_rx.recv().await {
                match event {
                    TransportEvent::Message(message) => {
                        dispatch_message(message, &assembly, &live_queue, &chunks_processed, &events)
                            .await;
                    }
                    TransportEvent::Disconnected { reason } => {
                        warn!("Connection lost: {}", reason);
                        is_recording.store(false, Ordering::SeqCst);
                        state.lock().await.connection_lost();
                        transport_slot.lock().await.take();
                        let _ = events.send(ClientEvent::StateChanged(SessionState::Idle));
                        let _ = events.send(ClientEvent::Disconnected { reason });
                        break;
                    }
                }
            }
        });

        *self.dispatch_task.lock().await = Some(task);

        Ok(())
    }

    /// Close the connection. Safe to call when not connected.
    ///
    /// An active recording is stopped first so the terminal chunk and
    /// `stop_session` go out before the socket does.
    pub async fn disconnect(&self) -> Result<()> {
        if self.state.lock().await.state() == SessionState::Recording {
            if let Err(e) = self.stop_recording().await {
                warn!("Failed to stop recording during disconnect: {:#}", e);
            }
        }

        let client = self.transport.lock().await.take();
        if let Some(client) = client {
            client.close();
        }

        // The dispatch loop ends once the reader observes the close; a peer
        // that never completes the handshake must not hang the caller.
        if let Some(task) = self.dispatch_task.lock().await.take() {
            match tokio::time::timeout(DISPATCH_SHUTDOWN_TIMEOUT, task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("Dispatch task panicked: {}", e),
                Err(_) => warn!(
                    "Dispatch loop did not stop within {}s, abandoning it",
                    DISPATCH_SHUTDOWN_TIMEOUT.as_secs()
                ),
            }
        }

        self.state.lock().await.connection_lost();
        *self.session_id.lock().await = None;
        self.emit_state(SessionState::Idle);
        info!("Disconnected");

        Ok(())
    }

    /// Begin a new recording session, streaming chunks as they fill.
    ///
    /// Only legal while Connected. All per-session state is reset first so
    /// nothing from an earlier session leaks into this one.
    pub async fn start_recording(&self, mut backend: Box<dyn CaptureBackend>) -> Result<()> {
        self.state.lock().await.begin_recording()?;
        self.emit_state(SessionState::Recording);

        let session_id = SessionConfig::new_session_id();
        *self.session_id.lock().await = Some(session_id.clone());
        self.chunks_sent.store(0, Ordering::SeqCst);
        self.chunks_processed.store(0, Ordering::SeqCst);
        self.assembly.lock().await.clear();
        self.live_queue.clear().await;
        self.player.stop().await;

        let client = self.transport_handle().await?;
        client
            .send(&OutboundMessage::StartSession {
                session_id: session_id.clone(),
            })
            .await
            .context("Failed to send start_session")?;

        info!(
            "Recording started: session {} ({} samples per chunk at {}Hz)",
            session_id,
            self.config.chunk_size(),
            self.config.sample_rate
        );

        self.is_recording.store(true, Ordering::SeqCst);

        let is_recording = Arc::clone(&self.is_recording);
        let chunks_sent = Arc::clone(&self.chunks_sent);
        let events = self.events.clone();
        let sample_rate = self.config.sample_rate;
        let channels = self.config.channels;
        let chunk_size = self.config.chunk_size();

        let task = tokio::spawn(async move {
            let mut rx = match backend.start().await {
                Ok(rx) => rx,
                Err(e) => {
                    error!("Capture backend '{}' failed to start: {:#}", backend.name(), e);
                    let _ = events.send(ClientEvent::Log {
                        message: format!("Capture failed: {:#}", e),
                    });
                    is_recording.store(false, Ordering::SeqCst);
                    return;
                }
            };

            let mut segmenter = ChunkSegmenter::new(chunk_size);

            while let Some(batch) = rx.recv().await {
                if !is_recording.load(Ordering::SeqCst) {
                    break;
                }

                let samples = wav::f32_to_i16(&batch);
                for chunk in segmenter.feed(&samples) {
                    deliver_chunk(
                        &client,
                        &session_id,
                        chunk,
                        sample_rate,
                        channels,
                        &chunks_sent,
                        &events,
                    )
                    .await;
                }
            }

            // Whatever is left in the carry buffer becomes the terminal
            // chunk; an empty buffer means the session ended exactly on a
            // chunk boundary and nothing more is sent.
            if let Some(chunk) = segmenter.finalize() {
                deliver_chunk(
                    &client,
                    &session_id,
                    chunk,
                    sample_rate,
                    channels,
                    &chunks_sent,
                    &events,
                )
                .await;
            }

            if let Err(e) = backend.stop().await {
                error!("Failed to stop capture backend: {:#}", e);
            }

            info!("Capture loop stopped");
        });

        *self.capture_task.lock().await = Some(task);

        Ok(())
    }

    /// Stop the active recording.
    ///
    /// Flushes the segmenter (terminal chunk first, then `stop_session`)
    /// before settling back in Connected.
    pub async fn stop_recording(&self) -> Result<()> {
        self.state.lock().await.begin_stopping()?;
        self.emit_state(SessionState::Stopping);

        info!("Stopping recording...");
        self.is_recording.store(false, Ordering::SeqCst);

        if let Some(task) = self.capture_task.lock().await.take() {
            if let Err(e) = task.await {
                error!("Capture task panicked: {}", e);
            }
        }

        // The capture task has flushed the terminal chunk by this point;
        // the session close message must follow it on the wire.
        let session_id = self.session_id.lock().await.clone();
        if let Some(session_id) = session_id {
            match self.transport_handle().await {
                Ok(client) => {
                    if let Err(e) = client
                        .send(&OutboundMessage::StopSession { session_id })
                        .await
                    {
                        warn!("Failed to send stop_session: {:#}", e);
                        let _ = self.events.send(ClientEvent::Log {
                            message: format!("stop_session not sent: {:#}", e),
                        });
                    }
                }
                Err(_) => warn!("Connection already gone, stop_session not sent"),
            }
        }

        self.state.lock().await.recording_stopped()?;
        self.emit_state(SessionState::Connected);
        info!("Recording stopped, awaiting remaining processed chunks");

        Ok(())
    }

    /// Start live playback of processed chunks. No-op while already playing.
    pub async fn start_live_playback(&self, sink: Arc<dyn PlaybackSink>) {
        self.player.start(sink).await;
    }

    /// Stop live playback. Queued chunks and the assembly log are kept.
    pub async fn stop_live_playback(&self) {
        self.player.stop().await;
    }

    /// Flip live playback, returning whether it is now active.
    pub async fn toggle_live_playback(&self, sink: Arc<dyn PlaybackSink>) -> bool {
        self.player.toggle(sink).await
    }

    pub fn is_live_playing(&self) -> bool {
        self.player.is_playing()
    }

    /// Concatenate every processed chunk into one WAV container.
    pub async fn assemble(&self) -> Result<Vec<u8>> {
        self.assembly.lock().await.assemble(self.config.sample_rate)
    }

    /// Write the assembled artifact, defaulting to a timestamped filename.
    pub async fn save_final(&self, path: Option<PathBuf>) -> Result<PathBuf> {
        let path = path.unwrap_or_else(|| PathBuf::from(audio::suggested_filename()));
        self.assembly
            .lock()
            .await
            .save(&path, self.config.sample_rate)?;
        Ok(path)
    }

    /// Send a ping carrying the current time.
    pub async fn ping(&self) -> Result<()> {
        let client = self.transport_handle().await?;
        let timestamp = chrono::Utc::now().timestamp_millis() as f64 / 1000.0;
        client.send(&OutboundMessage::Ping { timestamp }).await?;
        info!("Ping sent");
        Ok(())
    }

    /// Snapshot of the client's progress for display.
    pub async fn stats(&self) -> SessionStats {
        SessionStats {
            state: self.state.lock().await.state(),
            session_id: self.session_id.lock().await.clone(),
            chunks_sent: self.chunks_sent.load(Ordering::SeqCst),
            chunks_processed: self.chunks_processed.load(Ordering::SeqCst),
            live_queue_len: self.live_queue.len().await,
            live_playing: self.player.is_playing(),
        }
    }

    async fn transport_handle(&self) -> Result<Arc<WsClient>> {
        self.transport
            .lock()
            .await
            .clone()
            .context("Not connected")
    }

    fn emit_state(&self, state: SessionState) {
        let _ = self.events.send(ClientEvent::StateChanged(state));
    }
}

/// Encode one raw chunk and hand it to the transport.
///
/// An encode failure drops the chunk; its sequence number is already spent,
/// so the remote sees a gap rather than a corrupt frame.
async fn deliver_chunk(
    client: &WsClient,
    session_id: &str,
    chunk: RawChunk,
    sample_rate: u32,
    channels: u16,
    chunks_sent: &AtomicUsize,
    events: &EventSender,
) {
    let sequence = chunk.sequence;
    let is_final = chunk.is_final;

    let encoded = match wav::encode_chunk(chunk, sample_rate, channels) {
        Ok(encoded) => encoded,
        Err(e) => {
            warn!("Dropping chunk {}: {:#}", sequence, e);
            let _ = events.send(ClientEvent::Log {
                message: format!("Chunk {} dropped: {:#}", sequence, e),
            });
            return;
        }
    };

    let bytes = encoded.data.len();
    match client.send_chunk(session_id, encoded).await {
        Ok(()) => {
            chunks_sent.fetch_add(1, Ordering::SeqCst);
            let _ = events.send(ClientEvent::ChunkSent {
                sequence,
                bytes,
                is_final,
            });
        }
        Err(e) => {
            error!("Failed to send chunk {}: {:#}", sequence, e);
            let _ = events.send(ClientEvent::Log {
                message: format!("Chunk {} not sent: {:#}", sequence, e),
            });
        }
    }
}

/// Apply one inbound message to the shared session data.
async fn dispatch_message(
    message: InboundMessage,
    assembly: &Mutex<FinalAssembly>,
    live_queue: &PlaybackQueue,
    chunks_processed: &AtomicUsize,
    events: &EventSender,
) {
    match message {
        InboundMessage::ConnectionEstablished => {
            info!("Server acknowledged the connection");
            let _ = events.send(ClientEvent::Log {
                message: "Connection established".to_string(),
            });
        }
        InboundMessage::SessionStarted { session_id } => {
            info!("Session started by server: {}", session_id);
            let _ = events.send(ClientEvent::SessionStarted { session_id });
        }
        InboundMessage::AudioProcessed {
            status,
            message,
            processed_audio_data,
        } => {
            let Some(encoded) = processed_audio_data else {
                match status.as_str() {
                    "processing" => info!("Chunk received by server, processing..."),
                    "error" => {
                        error!("Server processing error: {}", message);
                        let _ = events.send(ClientEvent::ServerError { message });
                    }
                    _ => {
                        info!("Server status: {} - {}", status, message);
                        let _ = events.send(ClientEvent::Log {
                            message: format!("{}: {}", status, message),
                        });
                    }
                }
                return;
            };

            let bytes = match base64::engine::general_purpose::STANDARD.decode(encoded.as_bytes())
            {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!("Failed to decode processed audio payload: {}", e);
                    let _ = events.send(ClientEvent::Log {
                        message: format!("Undecodable processed chunk: {}", e),
                    });
                    return;
                }
            };

            if bytes.is_empty() {
                warn!("Ignoring empty processed chunk");
                return;
            }

            let byte_len = bytes.len();
            assembly.lock().await.append(bytes.clone());
            live_queue.push(bytes).await;

            let index = chunks_processed.fetch_add(1, Ordering::SeqCst) + 1;
            info!("Processed chunk {} logged ({} bytes)", index, byte_len);
            let _ = events.send(ClientEvent::ChunkProcessed {
                index,
                bytes: byte_len,
            });
        }
        InboundMessage::Error { message } => {
            error!("Server error: {}", message);
            let _ = events.send(ClientEvent::ServerError { message });
        }
        InboundMessage::Pong => {
            info!("Pong received");
            let _ = events.send(ClientEvent::Pong);
        }
        InboundMessage::Unknown => {
            warn!("Unrecognized message type from server");
            let _ = events.send(ClientEvent::Log {
                message: "Unrecognized message from server".to_string(),
            });
        }
    }
}
