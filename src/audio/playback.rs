use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::backend::PlaybackSink;
use super::wav;
use crate::events::{ClientEvent, EventSender};

/// How long the playback loop sleeps when the queue is empty
const IDLE_POLL: Duration = Duration::from_millis(100);

/// FIFO of processed chunk containers awaiting live playback.
///
/// Appended by the message-dispatch path, drained only by the playback loop.
pub struct PlaybackQueue {
    queue: Mutex<VecDeque<Vec<u8>>>,
}

impl PlaybackQueue {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
        }
    }

    pub async fn push(&self, chunk: Vec<u8>) {
        self.queue.lock().await.push_back(chunk);
    }

    pub async fn pop(&self) -> Option<Vec<u8>> {
        self.queue.lock().await.pop_front()
    }

    pub async fn len(&self) -> usize {
        self.queue.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.queue.lock().await.is_empty()
    }

    pub async fn clear(&self) {
        self.queue.lock().await.clear();
    }
}

impl Default for PlaybackQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Drives sequential playback of queued chunks through a `PlaybackSink`.
///
/// One chunk renders at a time: the loop pops the head, decodes it, and
/// blocks until the sink reports completion before popping the next. Stopping
/// is a cooperative flag checked each iteration, so stop latency is bounded
/// by one chunk plus one poll interval.
pub struct LivePlayer {
    queue: Arc<PlaybackQueue>,
    playing: Arc<AtomicBool>,
    task_handle: Mutex<Option<JoinHandle<()>>>,
    events: EventSender,
}

impl LivePlayer {
    pub fn new(queue: Arc<PlaybackQueue>, events: EventSender) -> Self {
        Self {
            queue,
            playing: Arc::new(AtomicBool::new(false)),
            task_handle: Mutex::new(None),
            events,
        }
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }

    /// Start the playback loop. A no-op when already playing.
    pub async fn start(&self, sink: Arc<dyn PlaybackSink>) {
        if self.playing.swap(true, Ordering::SeqCst) {
            warn!("Live playback already active");
            return;
        }

        info!("Starting live playback through sink '{}'", sink.name());
        let _ = self.events.send(ClientEvent::LivePlayback { active: true });

        let queue = Arc::clone(&self.queue);
        let playing = Arc::clone(&self.playing);
        let events = self.events.clone();

        let task = tokio::spawn(async move {
            while playing.load(Ordering::SeqCst) {
                let Some(bytes) = queue.pop().await else {
                    tokio::time::sleep(IDLE_POLL).await;
                    continue;
                };

                match wav::decode(&bytes) {
                    Ok(audio) => {
                        if let Err(e) = sink.play(&audio.samples, audio.sample_rate).await {
                            error!("Playback device error: {:#}", e);
                            let _ = events.send(ClientEvent::Log {
                                message: format!("Playback stopped: {:#}", e),
                            });
                            break;
                        }
                    }
                    Err(e) => {
                        // Drop the chunk; the assembly log still holds it.
                        warn!("Skipping undecodable chunk in live queue: {:#}", e);
                    }
                }
            }

            playing.store(false, Ordering::SeqCst);
            let _ = events.send(ClientEvent::LivePlayback { active: false });
            info!("Live playback loop stopped");
        });

        *self.task_handle.lock().await = Some(task);
    }

    /// Stop the playback loop and wait for it to wind down.
    ///
    /// Queued-but-unplayed chunks stay in the queue; the final-assembly log
    /// is untouched either way.
    pub async fn stop(&self) {
        if !self.playing.swap(false, Ordering::SeqCst) {
            return;
        }

        if let Some(task) = self.task_handle.lock().await.take() {
            if let Err(e) = task.await {
                error!("Playback task panicked: {}", e);
            }
        }
    }

    /// Toggle between playing and stopped, returning the new state.
    pub async fn toggle(&self, sink: Arc<dyn PlaybackSink>) -> bool {
        if self.is_playing() {
            self.stop().await;
            false
        } else {
            self.start(sink).await;
            true
        }
    }
}
